use embassy_time::Duration;
use log::warn;

use crate::{
    bmp085::DEFAULT_BMP085_ADDR,
    bus,
    gy80::{
        adxl345::DEFAULT_ADXL345_ADDR, hmc5883l::DEFAULT_HMC5883L_ADDR,
        l3g4200d::DEFAULT_L3G4200D_ADDR,
    },
    madgwick::DEFAULT_BETA,
};

/// Highest polling rate a millisecond timer can keep
pub const MAX_RATE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    UnknownKey,
    /// Value cannot be parsed
    InvalidValue,
    InvalidRate,
    InvalidRange,
    InvalidBeta,
    InvalidAddress,
}

/// Settings of the AHRS and barometer nodes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// AHRS update rate in Hz
    pub rate: u32,
    pub beta: f32,
    /// g
    pub accel_range: f32,
    /// gauss
    pub mag_range: f32,
    /// degrees per second
    pub gyro_range: f32,
    pub accel_addr: u8,
    pub mag_addr: u8,
    pub gyro_addr: u8,
    pub baro_addr: u8,
    /// Barometer polling rate in Hz
    pub baro_rate: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate: 20,
            beta: DEFAULT_BETA,
            accel_range: 4.0,
            mag_range: 4.0,
            gyro_range: 250.0,
            accel_addr: DEFAULT_ADXL345_ADDR,
            mag_addr: DEFAULT_HMC5883L_ADDR,
            gyro_addr: DEFAULT_L3G4200D_ADDR,
            baro_addr: DEFAULT_BMP085_ADDR,
            baro_rate: 1.0,
        }
    }
}

impl Config {
    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_beta(mut self, beta: f32) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_accel_range(mut self, range: f32) -> Self {
        self.accel_range = range;
        self
    }

    pub fn with_mag_range(mut self, range: f32) -> Self {
        self.mag_range = range;
        self
    }

    pub fn with_gyro_range(mut self, range: f32) -> Self {
        self.gyro_range = range;
        self
    }

    pub fn with_adxl345_addr(mut self, addr: u8) -> Self {
        self.accel_addr = addr;
        self
    }

    pub fn with_hmc5883l_addr(mut self, addr: u8) -> Self {
        self.mag_addr = addr;
        self
    }

    pub fn with_l3g4200d_addr(mut self, addr: u8) -> Self {
        self.gyro_addr = addr;
        self
    }

    pub fn with_bmp085_addr(mut self, addr: u8) -> Self {
        self.baro_addr = addr;
        self
    }

    pub fn with_baro_rate(mut self, rate: f32) -> Self {
        self.baro_rate = rate;
        self
    }

    /// Interval between two AHRS ticks
    pub fn period(&self) -> Duration {
        Duration::from_millis(1000 / self.rate.max(1) as u64)
    }

    /// Interval between two barometer polls
    pub fn baro_period(&self) -> Duration {
        Duration::from_micros((1e6 / self.baro_rate) as u64)
    }

    /// Overrides one setting from its textual form, e.g. `("ahrs.rate", "50")`.
    ///
    /// The configuration is left untouched if the result would not pass [`Config::validate`].
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut next = *self;
        match key {
            "ahrs.rate" => next.rate = parse(value)?,
            "ahrs.beta" => next.beta = parse(value)?,
            "ahrs.accel_range" => next.accel_range = parse(value)?,
            "ahrs.mag_range" => next.mag_range = parse(value)?,
            "ahrs.gyro_range" => next.gyro_range = parse(value)?,
            "ahrs.accel_addr" => next.accel_addr = parse_addr(value)?,
            "ahrs.mag_addr" => next.mag_addr = parse_addr(value)?,
            "ahrs.gyro_addr" => next.gyro_addr = parse_addr(value)?,
            "baro.addr" => next.baro_addr = parse_addr(value)?,
            "baro.rate" => next.baro_rate = parse(value)?,
            _ => {
                warn!("Unknown config key {key}");
                return Err(ConfigError::UnknownKey);
            }
        }

        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_RATE).contains(&self.rate) {
            return Err(ConfigError::InvalidRate);
        }
        if !(self.baro_rate > 0.0 && self.baro_rate <= MAX_RATE as f32) {
            return Err(ConfigError::InvalidRate);
        }

        let ranges = [self.accel_range, self.mag_range, self.gyro_range];
        if !ranges.iter().all(|range| range.is_finite() && *range > 0.0) {
            return Err(ConfigError::InvalidRange);
        }

        if !(0.0..=1.0).contains(&self.beta) {
            return Err(ConfigError::InvalidBeta);
        }

        let addrs = [self.accel_addr, self.mag_addr, self.gyro_addr, self.baro_addr];
        if !addrs.into_iter().all(bus::is_valid_addr) {
            return Err(ConfigError::InvalidAddress);
        }

        Ok(())
    }
}

fn parse<T: core::str::FromStr>(value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue)
}

/// Decimal or `0x` prefixed hexadecimal
fn parse_addr(value: &str) -> Result<u8, ConfigError> {
    let value = value.trim();
    match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16).map_err(|_| ConfigError::InvalidValue),
        None => parse(value),
    }
}
