//! Periodic attitude estimation.
//!
//! [`Ahrs`] owns the three GY-80 sensor drivers and the Madgwick filter. Every
//! tick reads all sensors, fuses the readings and publishes the quaternion on
//! an [`AttitudeEvent`]. Any sensor failure stops the whole node.

use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use embassy_time::{Duration, Instant, Ticker};
use embedded_hal_async::i2c::ErrorType;
use log::{debug, error, info};
use nalgebra::{Vector3, Vector4};

use crate::{
    bus::Bus,
    clock::{self, Clock},
    config::{Config, ConfigError},
    gy80::{self, Accelerometer, Gyroscope, Magnetometer},
    madgwick::MadgwickFilter,
    math::{deg_to_rad, Rotation},
    node::Node,
    pubsub::Event,
};

/// Orientation quaternion [w, x, y, z]
pub type Attitude = Vector4<f32>;

/// Maximum number of attitude subscribers
pub const SUBSCRIBERS: usize = 8;

pub type AttitudeEvent = Event<Attitude, SUBSCRIBERS>;

/// Attitude published once per tick
pub static EV_AHRS: AttitudeEvent = Event::new();

type BusError<B> = <<B as Bus>::Device as ErrorType>::Error;

#[derive(Debug)]
pub enum Error<E> {
    Config(ConfigError),
    Accel(gy80::Error<E>),
    Mag(gy80::Error<E>),
    Gyro(gy80::Error<E>),
    /// Tick requested while stopped
    NotRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Stopped,
    Initializing,
    Running,
}

pub struct Ahrs<'a, B: Bus, C> {
    bus: B,
    clock: C,
    config: Config,
    event: &'a AttitudeEvent,
    accel: Option<Accelerometer<B::Device>>,
    mag: Option<Magnetometer<B::Device>>,
    gyro: Option<Gyroscope<B::Device>>,
    filter: Option<MadgwickFilter>,
    last_run: Instant,
    state: State,
}

impl<'a, B: Bus, C: Clock> Ahrs<'a, B, C> {
    pub fn new(bus: B, clock: C, config: Config, event: &'a AttitudeEvent) -> Self {
        let last_run = clock.now();
        Self {
            bus,
            clock,
            config,
            event,
            accel: None,
            mag: None,
            gyro: None,
            filter: None,
            last_run,
            state: State::Stopped,
        }
    }

    /// Opens and tunes the sensors and starts the filter.
    ///
    /// Everything opened so far is closed again on failure.
    pub async fn init(&mut self) -> Result<(), Error<BusError<B>>> {
        if self.state == State::Running {
            return Ok(());
        }

        self.state = State::Initializing;
        if let Err(err) = self.start().await {
            self.term().await;
            return Err(err);
        }

        self.last_run = self.clock.now();
        self.state = State::Running;
        debug!("ahrs running every {} ms", self.period().as_millis());
        Ok(())
    }

    async fn start(&mut self) -> Result<(), Error<BusError<B>>> {
        self.config.validate().map_err(Error::Config)?;
        let config = self.config;

        let accel = Accelerometer::<B::Device>::open(self.bus.device(), config.accel_addr)
            .await
            .map_err(Error::Accel)?;
        self.accel = Some(accel);

        let mag = Magnetometer::<B::Device>::open(self.bus.device(), config.mag_addr)
            .await
            .map_err(Error::Mag)?;
        self.mag = Some(mag);

        let gyro = Gyroscope::<B::Device>::open(self.bus.device(), config.gyro_addr)
            .await
            .map_err(Error::Gyro)?;
        self.gyro = Some(gyro);

        self.filter = Some(MadgwickFilter::new(config.beta).map_err(Error::Config)?);

        let rate = config.rate as f32;
        if let Some(accel) = &mut self.accel {
            accel
                .tune(rate, config.accel_range)
                .await
                .map_err(Error::Accel)?;
        }
        if let Some(mag) = &mut self.mag {
            mag.tune(rate, config.mag_range)
                .await
                .map_err(Error::Mag)?;
        }
        if let Some(gyro) = &mut self.gyro {
            gyro.tune(rate, config.gyro_range)
                .await
                .map_err(Error::Gyro)?;
        }

        Ok(())
    }

    /// Reads all sensors, updates the filter and publishes the new attitude.
    ///
    /// A failed read terminates the node, nothing is published then.
    pub async fn tick(&mut self) -> Result<Attitude, Error<BusError<B>>> {
        if self.state != State::Running {
            return Err(Error::NotRunning);
        }

        let (accel, mag, gyro) = match self.read().await {
            Ok(readings) => readings,
            Err(err) => {
                error!("Failure while updating ahrs data. Stopped.");
                self.term().await;
                return Err(err);
            }
        };

        let now = self.clock.now();
        let dt = clock::secs_between(self.last_run, now);
        self.last_run = now;

        let Some(filter) = &mut self.filter else {
            return Err(Error::NotRunning);
        };
        let attitude = filter.update(accel, gyro.map(deg_to_rad), mag, dt);

        self.event.publish(&attitude);
        Ok(attitude)
    }

    /// Accelerometer, magnetometer and gyroscope in that order
    async fn read(
        &mut self,
    ) -> Result<(Vector3<f32>, Vector3<f32>, Vector3<f32>), Error<BusError<B>>> {
        let (Some(accel), Some(mag), Some(gyro)) = (&mut self.accel, &mut self.mag, &mut self.gyro)
        else {
            return Err(Error::NotRunning);
        };

        let accel = accel.update().await.map_err(Error::Accel)?;
        let mag = mag.update().await.map_err(Error::Mag)?;
        let gyro = gyro.update().await.map_err(Error::Gyro)?;
        Ok((accel, mag, gyro))
    }

    /// Stops the filter and closes every opened sensor. Does nothing once stopped.
    pub async fn term(&mut self) {
        self.state = State::Stopped;
        self.filter = None;

        // Close failures are already logged by the drivers
        if let Some(accel) = self.accel.take() {
            let _ = accel.close().await;
        }
        if let Some(mag) = self.mag.take() {
            let _ = mag.close().await;
        }
        if let Some(gyro) = self.gyro.take() {
            let _ = gyro.close().await;
        }
    }

    /// Ticks until `stop` is signaled or a tick fails.
    ///
    /// A tick that has started always completes before stopping.
    pub async fn run<M: RawMutex>(&mut self, stop: &Signal<M, ()>) -> Result<(), Error<BusError<B>>> {
        let mut ticker = Ticker::every(self.period());
        loop {
            match select(ticker.next(), stop.wait()).await {
                Either::First(()) => {
                    self.tick().await?;
                }
                Either::Second(()) => {
                    info!("ahrs stop requested");
                    self.term().await;
                    return Ok(());
                }
            }
        }
    }

    pub fn period(&self) -> Duration {
        self.config.period()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Latest estimate, `None` while stopped
    pub fn attitude(&self) -> Option<Attitude> {
        self.filter.as_ref().map(|filter| *filter.quaternion())
    }

    pub fn rotation(&self) -> Option<Rotation> {
        self.filter.as_ref().map(MadgwickFilter::rotation)
    }

    pub fn accel(&self) -> Option<&Accelerometer<B::Device>> {
        self.accel.as_ref()
    }

    pub fn mag(&self) -> Option<&Magnetometer<B::Device>> {
        self.mag.as_ref()
    }

    pub fn gyro(&self) -> Option<&Gyroscope<B::Device>> {
        self.gyro.as_ref()
    }
}

impl<B: Bus, C: Clock> Node for Ahrs<'_, B, C> {
    const NAME: &'static str = "ahrs";

    type Error = Error<BusError<B>>;

    async fn init(&mut self) -> Result<(), Self::Error> {
        Ahrs::init(self).await
    }

    async fn term(&mut self) {
        Ahrs::term(self).await
    }
}
