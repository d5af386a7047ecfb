use core::fmt::Debug;

use log::{error, info};

/// Long running component started and stopped as a whole
#[allow(async_fn_in_trait)]
pub trait Node {
    const NAME: &'static str;

    type Error: Debug;

    async fn init(&mut self) -> Result<(), Self::Error>;

    async fn term(&mut self);
}

/// Node together with its active flag
pub struct Registered<N> {
    node: N,
    active: bool,
}

impl<N: Node> Registered<N> {
    pub fn new(node: N) -> Self {
        Self {
            node,
            active: false,
        }
    }

    /// Initializes the node unless it is already active
    pub async fn init(&mut self) -> Result<(), N::Error> {
        if self.active {
            return Ok(());
        }

        match self.node.init().await {
            Ok(()) => {
                info!("Initialization of {} is done.", N::NAME);
                self.active = true;
                Ok(())
            }
            Err(err) => {
                error!("Initialization of {} is failed: {err:?}", N::NAME);
                Err(err)
            }
        }
    }

    /// Terminates the node if it is active
    pub async fn term(&mut self) {
        if !self.active {
            return;
        }

        self.node.term().await;
        self.active = false;
        info!("{} is terminated.", N::NAME);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut N {
        &mut self.node
    }
}
