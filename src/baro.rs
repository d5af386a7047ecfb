use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use embassy_time::{Duration, Ticker};
use embedded_hal_async::i2c::ErrorType;
use log::{error, info};

use crate::{
    bmp085::{self, Bmp085},
    bus::Bus,
    config::Config,
    node::Node,
};

type BusError<B> = <<B as Bus>::Device as ErrorType>::Error;

/// Polls the BMP085 and logs temperature and altitude
pub struct Baro<B: Bus> {
    bus: B,
    config: Config,
    sensor: Option<Bmp085<B::Device>>,
}

impl<B: Bus> Baro<B> {
    pub fn new(bus: B, config: Config) -> Self {
        Self {
            bus,
            config,
            sensor: None,
        }
    }

    pub async fn init(&mut self) -> Result<(), bmp085::Error<BusError<B>>> {
        if self.sensor.is_some() {
            return Ok(());
        }

        let mut sensor = Bmp085::open(self.bus.device(), self.config.baro_addr).await?;
        if let Err(err) = sensor.tune(self.config.baro_rate).await {
            sensor.close();
            return Err(err);
        }

        self.sensor = Some(sensor);
        Ok(())
    }

    /// One conversion step. A failure terminates the node.
    pub async fn tick(&mut self) -> Result<(), bmp085::Error<BusError<B>>> {
        let Some(sensor) = &mut self.sensor else {
            return Err(bmp085::Error::NotTuned);
        };

        let res = sensor.update().await;
        if let Err(err) = res {
            error!("Failure while updating barometer data. Stopped.");
            self.term().await;
            return Err(err);
        }

        if let (Some(pressure), Some(altitude)) = (sensor.pressure(), sensor.altitude()) {
            info!(
                "temperature: {:.1} C, pressure: {pressure} Pa, altitude: {altitude:.1} m",
                sensor.temperature()
            );
        }
        Ok(())
    }

    pub async fn term(&mut self) {
        if let Some(sensor) = self.sensor.take() {
            sensor.close();
        }
    }

    /// Polls until `stop` is signaled or an update fails
    pub async fn run<M: RawMutex>(
        &mut self,
        stop: &Signal<M, ()>,
    ) -> Result<(), bmp085::Error<BusError<B>>> {
        let mut ticker = Ticker::every(self.period());
        loop {
            match select(ticker.next(), stop.wait()).await {
                Either::First(()) => self.tick().await?,
                Either::Second(()) => {
                    self.term().await;
                    return Ok(());
                }
            }
        }
    }

    pub fn period(&self) -> Duration {
        self.config.baro_period()
    }

    pub fn sensor(&self) -> Option<&Bmp085<B::Device>> {
        self.sensor.as_ref()
    }
}

impl<B: Bus> Node for Baro<B> {
    const NAME: &'static str = "baro";

    type Error = bmp085::Error<BusError<B>>;

    async fn init(&mut self) -> Result<(), Self::Error> {
        Baro::init(self).await
    }

    async fn term(&mut self) {
        Baro::term(self).await
    }
}
