//! Synchronous publish/subscribe topics.
//!
//! A [`Topic`] is an ordered list of plain function callbacks. [`Event`] puts
//! one behind a critical section mutex so it can live in a `static` and be
//! shared between tasks.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use heapless::Vec;

pub type Callback<T> = fn(&T);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeError {
    /// Topic already holds its maximum number of callbacks
    Full,
    /// Subscription list modified while a publish runs its callbacks
    Busy,
}

pub struct Topic<T, const N: usize> {
    subscribers: Vec<Callback<T>, N>,
}

impl<T, const N: usize> Topic<T, N> {
    pub const fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Calls every callback in subscription order
    pub fn publish(&self, payload: &T) {
        for callback in &self.subscribers {
            callback(payload);
        }
    }

    /// Appends `callback`, the same callback may be subscribed more than once
    pub fn subscribe(&mut self, callback: Callback<T>) -> Result<(), SubscribeError> {
        self.subscribers
            .push(callback)
            .map_err(|_| SubscribeError::Full)
    }

    /// Removes every occurrence of `callback`
    pub fn unsubscribe(&mut self, callback: Callback<T>) {
        self.subscribers
            .retain(|&subscriber| !core::ptr::fn_addr_eq(subscriber, callback));
    }

    pub fn unsubscribe_all(&mut self) {
        self.subscribers.clear();
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl<T, const N: usize> Default for Topic<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Topic`] shared through a critical section
pub struct Event<T, const N: usize> {
    shared: Mutex<CriticalSectionRawMutex, RefCell<Shared<T, N>>>,
}

struct Shared<T, const N: usize> {
    topic: Topic<T, N>,
    /// Publishes currently running their callbacks
    publishing: usize,
}

/// Marks the end of a publish, even if a callback unwinds
struct Publishing<'a, T, const N: usize>(&'a Event<T, N>);

impl<T, const N: usize> Drop for Publishing<'_, T, N> {
    fn drop(&mut self) {
        let _ = self.0.with_shared(|shared| shared.publishing -= 1);
    }
}

impl<T, const N: usize> Event<T, N> {
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                topic: Topic::new(),
                publishing: 0,
            })),
        }
    }

    /// Calls every subscriber in order on a snapshot of the list.
    ///
    /// Only the snapshot is taken in the critical section, callbacks run with
    /// interrupts enabled.
    pub fn publish(&self, payload: &T) {
        let Ok(subscribers) = self.with_shared(|shared| {
            shared.publishing += 1;
            shared.topic.subscribers.clone()
        }) else {
            log::warn!("Publish skipped, subscribers are being modified");
            return;
        };

        let _publishing = Publishing(self);
        for callback in &subscribers {
            callback(payload);
        }
    }

    pub fn subscribe(&self, callback: Callback<T>) -> Result<(), SubscribeError> {
        self.with_topic(|topic| topic.subscribe(callback))?
    }

    pub fn unsubscribe(&self, callback: Callback<T>) -> Result<(), SubscribeError> {
        self.with_topic(|topic| topic.unsubscribe(callback))
    }

    pub fn unsubscribe_all(&self) -> Result<(), SubscribeError> {
        self.with_topic(|topic| topic.unsubscribe_all())
    }

    pub fn len(&self) -> usize {
        self.with_shared(|shared| shared.topic.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mutates the list unless a publish is running
    fn with_topic<R>(&self, f: impl FnOnce(&mut Topic<T, N>) -> R) -> Result<R, SubscribeError> {
        self.with_shared(|shared| {
            if shared.publishing > 0 {
                return Err(SubscribeError::Busy);
            }
            Ok(f(&mut shared.topic))
        })?
    }

    fn with_shared<R>(&self, f: impl FnOnce(&mut Shared<T, N>) -> R) -> Result<R, SubscribeError> {
        self.shared.lock(|shared| {
            let mut shared = shared.try_borrow_mut().map_err(|_| SubscribeError::Busy)?;
            Ok(f(&mut shared))
        })
    }
}

impl<T, const N: usize> Default for Event<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
