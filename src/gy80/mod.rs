//! Drivers for the three axis sensors of the GY-80 board.
//!
//! Every sensor goes through the same protocol: [`Driver::open`] probes the
//! identification registers, [`Driver::tune`] picks the closest supported rate
//! and range and starts continuous measurement, [`Driver::update`] converts the
//! output registers to physical units and [`Driver::close`] powers the sensor
//! down. What differs between sensors lives in their [`Sensor`] implementation.

use core::marker::PhantomData;

use embedded_hal_async::i2c::I2c;
use log::{debug, error, warn};
use nalgebra::Vector3;

use crate::bus;

pub mod adxl345;
pub mod hmc5883l;
pub mod l3g4200d;

pub use adxl345::Adxl345;
pub use hmc5883l::Hmc5883l;
pub use l3g4200d::L3g4200d;

/// Accelerometer, readings in g
pub type Accelerometer<I2C> = Driver<Adxl345, I2C>;
/// Magnetometer, readings in gauss
pub type Magnetometer<I2C> = Driver<Hmc5883l, I2C>;
/// Gyroscope, readings in degrees per second
pub type Gyroscope<I2C> = Driver<L3g4200d, I2C>;

/// All possible errors of the sensor drivers
#[derive(Debug)]
pub enum Error<E> {
    I2c(E),
    InvalidAddress(u8),
    InvalidChipId([u8; 3]),
    /// Non-positive (or NaN) rate or range requested
    InvalidTuning,
    /// `update` called before a successful `tune`
    NotTuned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub fn word(self, bytes: [u8; 2]) -> i16 {
        match self {
            ByteOrder::LittleEndian => i16::from_le_bytes(bytes),
            ByteOrder::BigEndian => i16::from_be_bytes(bytes),
        }
    }

    pub fn bytes(self, word: i16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => word.to_le_bytes(),
            ByteOrder::BigEndian => word.to_be_bytes(),
        }
    }
}

/// Register map and capabilities of a three axis sensor.
pub trait Sensor {
    const NAME: &'static str;
    const DEFAULT_ADDR: u8;

    /// First identification register and its expected contents (up to 3 bytes)
    const ID_REG: u8;
    const ID: &'static [u8];

    /// Start of the six byte output block
    const DATA_REG: u8;
    const BYTE_ORDER: ByteOrder;
    /// Index of the X, Y and Z words within the output block
    const AXES: [usize; 3] = [0, 1, 2];

    /// Supported output data rates in Hz, ascending, indexed by rate code
    const RATES: &'static [f32];
    /// Supported full scale ranges, ascending, indexed by range code
    const RANGES: &'static [f32];

    /// Register write that stops measurement
    const STOP: [u8; 2];

    /// Register writes selecting the rate and range codes, last one starts measurement
    fn setup(rate: usize, range: usize) -> impl IntoIterator<Item = [u8; 2]>;

    /// Physical units per LSB at the given range code
    fn gain(range: usize) -> f32;
}

/// Rate and range the sensor actually runs at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    pub rate: f32,
    pub range: f32,
    pub gain: f32,
}

/// Code of the smallest entry `>= requested`, the last one if none is.
pub fn select(table: &[f32], requested: f32) -> usize {
    table
        .iter()
        .position(|&value| value >= requested)
        .unwrap_or(table.len() - 1)
}

/// Splits a raw output block into X, Y and Z counts
pub fn decode<S: Sensor>(buf: &[u8; 6]) -> [i16; 3] {
    let words = [
        S::BYTE_ORDER.word([buf[0], buf[1]]),
        S::BYTE_ORDER.word([buf[2], buf[3]]),
        S::BYTE_ORDER.word([buf[4], buf[5]]),
    ];
    S::AXES.map(|axis| words[axis])
}

/// Inverse of [`decode`]
pub fn encode<S: Sensor>(raw: [i16; 3]) -> [u8; 6] {
    let mut buf = [0; 6];
    for (axis, &word) in S::AXES.iter().zip(raw.iter()) {
        buf[axis * 2..axis * 2 + 2].copy_from_slice(&S::BYTE_ORDER.bytes(word));
    }
    buf
}

pub struct Driver<S, I2C> {
    i2c: I2C,
    addr: u8,
    tuning: Option<Tuning>,
    reading: Vector3<f32>,
    sensor: PhantomData<S>,
}

impl<S, I2C, E> Driver<S, I2C>
where
    S: Sensor,
    I2C: I2c<Error = E>,
{
    /// Probes the sensor at `addr`. The bus handle is dropped if it is not there.
    pub async fn open(i2c: I2C, addr: u8) -> Result<Self, Error<E>> {
        if !bus::is_valid_addr(addr) {
            error!("Invalid address {addr:#x} for {}", S::NAME);
            return Err(Error::InvalidAddress(addr));
        }

        let mut driver = Self {
            i2c,
            addr,
            tuning: None,
            reading: Vector3::zeros(),
            sensor: PhantomData,
        };
        driver.verify().await?;

        debug!("{} found at {addr:#x}", S::NAME);
        Ok(driver)
    }

    async fn verify(&mut self) -> Result<(), Error<E>> {
        let mut id = [0; 3];
        let len = S::ID.len();
        if let Err(err) = self.read_bytes(S::ID_REG, &mut id[..len]).await {
            error!("Cannot identify {} at {:#x}", S::NAME, self.addr);
            return Err(err);
        }

        if &id[..len] != S::ID {
            error!("Device at {:#x} is not {} (id {id:x?})", self.addr, S::NAME);
            return Err(Error::InvalidChipId(id));
        }
        Ok(())
    }

    /// Configures the closest supported rate (Hz) and range and starts continuous measurement.
    ///
    /// Requests above the sensor maximum are clamped with a warning.
    pub async fn tune(&mut self, rate: f32, range: f32) -> Result<Tuning, Error<E>> {
        if !(rate > 0.0 && range > 0.0) {
            return Err(Error::InvalidTuning);
        }

        let rate_code = select(S::RATES, rate);
        if rate > S::RATES[S::RATES.len() - 1] {
            warn!("Too high update rate ({rate}) for {}", S::NAME);
        }

        let range_code = select(S::RANGES, range);
        if range > S::RANGES[S::RANGES.len() - 1] {
            warn!("Too wide range ({range}) for {}", S::NAME);
        }

        let tuning = Tuning {
            rate: S::RATES[rate_code],
            range: S::RANGES[range_code],
            gain: S::gain(range_code),
        };

        for write in S::setup(rate_code, range_code) {
            if let Err(err) = self.write(&write).await {
                error!(
                    "Cannot setup {} (rate = {}, range = {})",
                    S::NAME,
                    tuning.rate,
                    tuning.range
                );
                return Err(err);
            }
        }

        debug!("{} tuned to {tuning:?}", S::NAME);
        self.tuning = Some(tuning);
        Ok(tuning)
    }

    /// Reads the output registers. The previous reading is kept on failure.
    pub async fn update(&mut self) -> Result<Vector3<f32>, Error<E>> {
        let Some(Tuning { gain, .. }) = self.tuning else {
            return Err(Error::NotTuned);
        };

        let mut buf = [0; 6];
        if let Err(err) = self.read_bytes(S::DATA_REG, &mut buf).await {
            error!("Cannot read data from {}", S::NAME);
            return Err(err);
        }

        let [x, y, z] = decode::<S>(&buf);
        self.reading = Vector3::new(x as f32, y as f32, z as f32) * gain;
        Ok(self.reading)
    }

    /// Stops measurement and releases the bus handle, even if stopping failed.
    pub async fn close(mut self) -> Result<(), Error<E>> {
        let res = self.write(&S::STOP).await;
        if res.is_err() {
            error!("Cannot stop {}", S::NAME);
        }
        res
    }

    pub fn i2c(&mut self) -> &mut I2C {
        &mut self.i2c
    }

    pub fn addr(&self) -> u8 {
        self.addr
    }

    pub fn tuning(&self) -> Option<Tuning> {
        self.tuning
    }

    pub fn gain(&self) -> Option<f32> {
        self.tuning.map(|tuning| tuning.gain)
    }

    /// Last successful reading in physical units
    pub fn reading(&self) -> Vector3<f32> {
        self.reading
    }

    pub fn x(&self) -> f32 {
        self.reading.x
    }

    pub fn y(&self) -> f32 {
        self.reading.y
    }

    pub fn z(&self) -> f32 {
        self.reading.z
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.i2c.write(self.addr, bytes).await.map_err(Error::I2c)
    }

    /// Reads series of bytes into buf from specified reg
    async fn read_bytes(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.i2c
            .write_read(self.addr, &[reg], buf)
            .await
            .map_err(Error::I2c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADXL345_RATES: &[f32] = Adxl345::RATES;

    #[test]
    fn select_picks_smallest_entry_not_below_request() {
        assert_eq!(select(ADXL345_RATES, 20.0), 8); // 25 Hz
        assert_eq!(select(ADXL345_RATES, 25.0), 8);
        assert_eq!(select(ADXL345_RATES, 25.1), 9); // 50 Hz
        assert_eq!(select(ADXL345_RATES, 0.01), 0);
    }

    #[test]
    fn select_clamps_to_maximum() {
        assert_eq!(select(ADXL345_RATES, 10_000.0), ADXL345_RATES.len() - 1);
        assert_eq!(select(&[250.0, 500.0, 2000.0], 2500.0), 2);
    }

    #[test]
    fn byte_orders() {
        assert_eq!(ByteOrder::LittleEndian.word([0x34, 0x12]), 0x1234);
        assert_eq!(ByteOrder::BigEndian.word([0x12, 0x34]), 0x1234);
        assert_eq!(ByteOrder::BigEndian.word([0xff, 0xfe]), -2);
        assert_eq!(ByteOrder::LittleEndian.word([0x00, 0x80]), i16::MIN);
    }

    #[test]
    fn hmc5883l_block_is_x_z_y() {
        // X = 1, Z = 2, Y = 3 in register order
        let buf = [0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        assert_eq!(decode::<Hmc5883l>(&buf), [1, 3, 2]);
    }

    #[test]
    fn encode_inverts_decode() {
        let raw = [i16::MIN, -1, i16::MAX];
        assert_eq!(decode::<Adxl345>(&encode::<Adxl345>(raw)), raw);
        assert_eq!(decode::<Hmc5883l>(&encode::<Hmc5883l>(raw)), raw);
        assert_eq!(decode::<L3g4200d>(&encode::<L3g4200d>(raw)), raw);
    }
}
