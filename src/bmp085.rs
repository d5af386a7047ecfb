//! BMP085 barometric pressure sensor.
//!
//! Temperature and pressure conversions are interleaved: every update reads
//! the result of the conversion requested by the previous one and starts the
//! next, so the polling period must cover the conversion time.

use embedded_hal_async::i2c::I2c;
use log::{debug, error, warn};
use micromath::F32Ext;

use crate::{bus, math};

pub const DEFAULT_BMP085_ADDR: u8 = 0x77;

pub const REG_CALIBRATION: u8 = 0xAA;
pub const REG_CONTROL: u8 = 0xF4;
pub const REG_RESULT: u8 = 0xF6;

pub const CMD_TEMPERATURE: u8 = 0x2E;
pub const CMD_PRESSURE: u8 = 0x34;

/// Highest rate the fastest oversampling setting keeps up with
pub const MAX_RATE: f32 = 208.0;

#[derive(Debug)]
pub enum Error<E> {
    I2c(E),
    InvalidAddress(u8),
    /// Calibration word erased (0x0000 or 0xFFFF), or compensation dividing by zero or out of range
    InvalidCalibration,
    /// Non-positive (or NaN) rate requested
    InvalidTuning,
    NotTuned,
}

/// Factory calibration coefficients from the EEPROM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub ac1: i16,
    pub ac2: i16,
    pub ac3: i16,
    pub ac4: u16,
    pub ac5: u16,
    pub ac6: u16,
    pub b1: i16,
    pub b2: i16,
    pub mb: i16,
    pub mc: i16,
    pub md: i16,
}

impl Calibration {
    pub const LEN: usize = 22;

    pub fn from_bytes(buf: &[u8; Self::LEN]) -> Option<Self> {
        let mut words = [0u16; Self::LEN / 2];
        for (word, bytes) in words.iter_mut().zip(buf.chunks_exact(2)) {
            *word = u16::from_be_bytes([bytes[0], bytes[1]]);
        }

        if words.iter().any(|&word| word == 0x0000 || word == 0xFFFF) {
            return None;
        }

        let [ac1, ac2, ac3, ac4, ac5, ac6, b1, b2, mb, mc, md] = words;
        Some(Self {
            ac1: ac1 as i16,
            ac2: ac2 as i16,
            ac3: ac3 as i16,
            ac4,
            ac5,
            ac6,
            b1: b1 as i16,
            b2: b2 as i16,
            mb: mb as i16,
            mc: mc as i16,
            md: md as i16,
        })
    }

    /// B5 coefficient from the uncompensated temperature, shared with [`Calibration::pressure`]
    pub fn b5(&self, ut: i32) -> Option<i32> {
        let x1 = ((ut as i64 - self.ac6 as i64) * self.ac5 as i64) >> 15;
        let x2 = ((self.mc as i64) << 11).checked_div(x1 + self.md as i64)?;
        i32::try_from(x1 + x2).ok()
    }

    /// Temperature in 0.1 °C
    pub fn temperature(b5: i32) -> i32 {
        (b5 + 8) >> 4
    }

    /// Pressure in Pa from the uncompensated pressure taken at oversampling `oss`.
    ///
    /// Intermediates are 64 bit, `None` once one of them leaves its datasheet range.
    pub fn pressure(&self, b5: i32, up: i32, oss: u8) -> Option<i32> {
        let b6 = b5 as i64 - 4000;
        let b6_sq = b6.checked_mul(b6)? >> 12;

        let x1 = (self.b2 as i64).checked_mul(b6_sq)? >> 11;
        let x2 = (self.ac2 as i64).checked_mul(b6)? >> 11;
        let x3 = x1 + x2;
        let b3 = (((self.ac1 as i64 * 4 + x3) << oss) + 2) >> 2;

        let x1 = (self.ac3 as i64).checked_mul(b6)? >> 13;
        let x2 = (self.b1 as i64).checked_mul(b6_sq)? >> 16;
        let x3 = (x1 + x2 + 2) >> 2;
        let b4 = u32::try_from((self.ac4 as i64).checked_mul(x3 + 32768)? >> 15).ok()?;

        let b7 = u32::try_from(up as i64 - b3)
            .ok()?
            .checked_mul(50000 >> oss)?;
        let p = if b7 < 0x8000_0000 {
            i64::from((b7 << 1).checked_div(b4)?)
        } else {
            i64::from(b7.checked_div(b4)?) << 1
        };

        let x1 = (p >> 8).checked_mul(p >> 8)?.checked_mul(3038)? >> 16;
        let x2 = p.checked_mul(-7357)? >> 16;
        i32::try_from(p + ((x1 + x2 + 3791) >> 4)).ok()
    }
}

/// Oversampling setting for the requested update rate (Hz)
pub fn oversampling(rate: f32) -> u8 {
    (rate <= 128.0) as u8 + (rate <= 72.0) as u8 + (rate <= 39.0) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    oss: u8,
    /// Pressure conversions between two temperature conversions
    temp_idle: u32,
    temp_count: u32,
}

pub struct Bmp085<I2C> {
    i2c: I2C,
    addr: u8,
    calibration: Calibration,
    schedule: Option<Schedule>,
    b5: i32,
    temperature: f32,
    pressure: Option<i32>,
}

impl<I2C, E> Bmp085<I2C>
where
    I2C: I2c<Error = E>,
{
    /// Reads the calibration EEPROM. The bus handle is dropped on failure.
    pub async fn open(mut i2c: I2C, addr: u8) -> Result<Self, Error<E>> {
        if !bus::is_valid_addr(addr) {
            error!("Invalid address {addr:#x} for bmp085");
            return Err(Error::InvalidAddress(addr));
        }

        let mut buf = [0; Calibration::LEN];
        if let Err(err) = i2c.write_read(addr, &[REG_CALIBRATION], &mut buf).await {
            error!("Cannot read calibration data from bmp085 at {addr:#x}");
            return Err(Error::I2c(err));
        }

        let Some(calibration) = Calibration::from_bytes(&buf) else {
            error!("Invalid calibration data of bmp085 at {addr:#x}");
            return Err(Error::InvalidCalibration);
        };
        debug!("bmp085 found at {addr:#x}: {calibration:?}");

        Ok(Self {
            i2c,
            addr,
            calibration,
            schedule: None,
            b5: 0,
            temperature: 0.0,
            pressure: None,
        })
    }

    /// Picks the oversampling for `rate` (Hz) and starts the first temperature conversion.
    ///
    /// Temperature is refreshed about once per second.
    pub async fn tune(&mut self, rate: f32) -> Result<u8, Error<E>> {
        if !(rate > 0.0) {
            return Err(Error::InvalidTuning);
        }
        if rate > MAX_RATE {
            warn!("Too high update rate ({rate}) for bmp085 at {:#x}", self.addr);
        }

        let schedule = Schedule {
            oss: oversampling(rate),
            temp_idle: (rate.round() as u32).saturating_sub(1).max(1),
            temp_count: 0,
        };

        self.schedule = None;
        self.request_temperature().await?;
        self.schedule = Some(schedule);
        debug!("bmp085 tuned to {schedule:?}");
        Ok(schedule.oss)
    }

    pub async fn update(&mut self) -> Result<(), Error<E>> {
        let Some(mut schedule) = self.schedule else {
            return Err(Error::NotTuned);
        };

        let res = if schedule.temp_count == 0 {
            schedule.temp_count += 1;
            self.update_temperature().await
        } else if schedule.temp_count >= schedule.temp_idle {
            schedule.temp_count = 0;
            self.update_pressure(schedule.oss).await
        } else {
            schedule.temp_count += 1;
            self.update_pressure(schedule.oss).await
        };

        let res = match res {
            Ok(()) if schedule.temp_count == 0 => self.request_temperature().await,
            Ok(()) => self.request_pressure(schedule.oss).await,
            Err(err) => Err(err),
        };

        if res.is_err() {
            error!("Failure while updating of bmp085");
        } else {
            self.schedule = Some(schedule);
        }
        res
    }

    /// Releases the bus handle. The sensor goes idle by itself after a conversion.
    pub fn close(self) {
        debug!("bmp085 at {:#x} closed", self.addr);
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn oss(&self) -> Option<u8> {
        self.schedule.map(|schedule| schedule.oss)
    }

    /// °C
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Pa, `None` until the first pressure conversion completes
    pub fn pressure(&self) -> Option<i32> {
        self.pressure
    }

    /// Meters above sea level
    pub fn altitude(&self) -> Option<f32> {
        self.pressure
            .map(|pressure| math::pressure_to_altitude(pressure as f32))
    }

    async fn update_temperature(&mut self) -> Result<(), Error<E>> {
        let mut buf = [0; 2];
        self.read_result(&mut buf).await?;

        let ut = u16::from_be_bytes(buf) as i32;
        self.b5 = self
            .calibration
            .b5(ut)
            .ok_or(Error::InvalidCalibration)?;
        self.temperature = Calibration::temperature(self.b5) as f32 / 10.0;
        Ok(())
    }

    async fn update_pressure(&mut self, oss: u8) -> Result<(), Error<E>> {
        let mut buf = [0; 3];
        self.read_result(&mut buf).await?;

        let up = i32::from_be_bytes([0, buf[0], buf[1], buf[2]]) >> (8 - oss);
        let pressure = self
            .calibration
            .pressure(self.b5, up, oss)
            .ok_or(Error::InvalidCalibration)?;
        self.pressure = Some(pressure);
        Ok(())
    }

    async fn request_temperature(&mut self) -> Result<(), Error<E>> {
        self.write(&[REG_CONTROL, CMD_TEMPERATURE]).await.inspect_err(|_| {
            error!("Failure while requesting temperature from bmp085");
        })
    }

    async fn request_pressure(&mut self, oss: u8) -> Result<(), Error<E>> {
        self.write(&[REG_CONTROL, CMD_PRESSURE + (oss << 6)])
            .await
            .inspect_err(|_| {
                error!("Failure while requesting pressure from bmp085");
            })
    }

    async fn read_result(&mut self, buf: &mut [u8]) -> Result<(), Error<E>> {
        self.i2c
            .write_read(self.addr, &[REG_RESULT], buf)
            .await
            .map_err(Error::I2c)
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), Error<E>> {
        self.i2c.write(self.addr, bytes).await.map_err(Error::I2c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Example values of the datasheet
    const CALIBRATION: Calibration = Calibration {
        ac1: 408,
        ac2: -72,
        ac3: -14383,
        ac4: 32741,
        ac5: 32757,
        ac6: 23153,
        b1: 6190,
        b2: 4,
        mb: -32768,
        mc: -8711,
        md: 2868,
    };

    #[test]
    fn compensation_matches_datasheet_example() {
        let b5 = CALIBRATION.b5(27898).unwrap();
        assert_eq!(Calibration::temperature(b5), 150);
        assert_eq!(CALIBRATION.pressure(b5, 23843, 0), Some(69964));
    }

    #[test]
    fn compensation_near_b5_pole_is_rejected() {
        // x1 + md == 1 for this reading, so b5 is huge but still representable
        let b5 = CALIBRATION.b5(20286).unwrap();
        assert_eq!(b5, -17842995);
        assert_eq!(CALIBRATION.pressure(b5, 23843, 0), None);
        for oss in 0..=3 {
            assert_eq!(CALIBRATION.pressure(b5, (1 << (16 + oss)) - 1, oss), None);
        }
    }

    #[test]
    fn compensation_survives_every_temperature_reading() {
        for ut in 0..=u16::MAX as i32 {
            let Some(b5) = CALIBRATION.b5(ut) else {
                continue;
            };
            for oss in 0..=3 {
                CALIBRATION.pressure(b5, 23843 << oss, oss);
            }
        }
    }

    #[test]
    fn b5_division_by_zero_is_rejected() {
        let calibration = Calibration {
            md: -CALIBRATION.md,
            ..CALIBRATION
        };
        // x1 == 2868 == -md
        let ut = CALIBRATION.ac6 as i32 + 2869;
        assert_eq!(calibration.b5(ut), None);
    }

    #[test]
    fn calibration_words_are_big_endian() {
        let mut buf = [0; Calibration::LEN];
        let words: [u16; 11] = [
            408, -72i16 as u16, -14383i16 as u16, 32741, 32757, 23153, 6190, 4, 0x8000,
            -8711i16 as u16, 2868,
        ];
        for (bytes, word) in buf.chunks_exact_mut(2).zip(words) {
            bytes.copy_from_slice(&word.to_be_bytes());
        }
        assert_eq!(Calibration::from_bytes(&buf), Some(CALIBRATION));

        buf[4] = 0xFF;
        buf[5] = 0xFF;
        assert_eq!(Calibration::from_bytes(&buf), None);
    }

    #[test]
    fn oversampling_follows_rate() {
        assert_eq!(oversampling(1.0), 3);
        assert_eq!(oversampling(39.0), 3);
        assert_eq!(oversampling(50.0), 2);
        assert_eq!(oversampling(100.0), 1);
        assert_eq!(oversampling(150.0), 0);
    }
}
