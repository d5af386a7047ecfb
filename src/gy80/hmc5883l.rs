use core::ops::RangeInclusive;

use super::{ByteOrder, Sensor};

pub const DEFAULT_HMC5883L_ADDR: u8 = 0x1E;

pub const REG_CRA: u8 = 0x00;
pub const REG_CRB: u8 = 0x01;
pub const REG_MODE: u8 = 0x02;
pub const REG_OUTXM: u8 = 0x03;
pub const REG_OUTXL: u8 = 0x04;
pub const REG_OUTZM: u8 = 0x05;
pub const REG_OUTZL: u8 = 0x06;
pub const REG_OUTYM: u8 = 0x07;
pub const REG_OUTYL: u8 = 0x08;
pub const REG_STATUS: u8 = 0x09;
pub const REG_ID: RangeInclusive<u8> = 0x0A..=0x0C;

pub const ID: [u8; 3] = *b"H43";

#[allow(non_camel_case_types)]
pub enum AvgSample {
    SAMPLE_1 = 0x00,
    SAMPLE_2 = 0x01,
    SAMPLE_4 = 0x02,
    SAMPLE_8 = 0x03,
}

#[allow(non_camel_case_types)]
pub enum DataOutputRate {
    RATE_0P75 = 0x00,
    RATE_1P5 = 0x01,
    RATE_3 = 0x02,
    RATE_7P5 = 0x03,
    RATE_15 = 0x04,
    RATE_30 = 0x05,
    RATE_75 = 0x06,
}

#[allow(non_camel_case_types)]
pub enum MeasurementMode {
    NORMAL = 0x00,
    POSITIVE_BIAS = 0x01,
    NEGATIVE_BIAS = 0x02,
}

#[allow(non_camel_case_types)]
pub enum Gain {
    GAIN_1370 = 0x00,
    GAIN_1090 = 0x01,
    GAIN_820 = 0x02,
    GAIN_660 = 0x03,
    GAIN_440 = 0x04,
    GAIN_390 = 0x05,
    GAIN_330 = 0x06,
    GAIN_230 = 0x07,
}

#[allow(non_camel_case_types)]
pub enum OperatingMode {
    CONTINUOUS = 0x00,
    SINGLE = 0x01,
    IDLE = 0x02,
}

/// Output rates in Hz, indexed by [`DataOutputRate`]
pub const RATES: [f32; 7] = [0.75, 1.5, 3.0, 7.5, 15.0, 30.0, 75.0];

/// Ranges in gauss, indexed by [`Gain`]
pub const RANGES: [f32; 8] = [0.88, 1.3, 1.9, 2.5, 4.0, 4.7, 5.6, 8.1];

/// Signed 12 bit output
const FULL_SCALE: f32 = 2048.0;

pub struct Hmc5883l;

impl Sensor for Hmc5883l {
    const NAME: &'static str = "hmc5883l";
    const DEFAULT_ADDR: u8 = DEFAULT_HMC5883L_ADDR;

    const ID_REG: u8 = *REG_ID.start();
    const ID: &'static [u8] = &ID;

    const DATA_REG: u8 = REG_OUTXM;
    const BYTE_ORDER: ByteOrder = ByteOrder::BigEndian;
    // X, Z, Y
    const AXES: [usize; 3] = [0, 2, 1];

    const RATES: &'static [f32] = &RATES;
    const RANGES: &'static [f32] = &RANGES;

    const STOP: [u8; 2] = [REG_MODE, OperatingMode::IDLE as u8];

    fn setup(rate: usize, range: usize) -> impl IntoIterator<Item = [u8; 2]> {
        let cra = (AvgSample::SAMPLE_1 as u8) << 5 | (rate as u8) << 2 | MeasurementMode::NORMAL as u8;
        [
            [REG_CRA, cra],
            [REG_CRB, (range as u8) << 5],
            [REG_MODE, OperatingMode::CONTINUOUS as u8],
        ]
    }

    fn gain(range: usize) -> f32 {
        RANGES[range] / FULL_SCALE
    }
}
