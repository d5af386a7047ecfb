use super::{ByteOrder, Sensor};

pub const DEFAULT_ADXL345_ADDR: u8 = 0x53;

pub const REG_DEVID: u8 = 0x00;
pub const REG_BW_RATE: u8 = 0x2C;
pub const REG_POWER_CTL: u8 = 0x2D;
pub const REG_DATA_FORMAT: u8 = 0x31;
pub const REG_DATAX0: u8 = 0x32;

pub const DEVID: u8 = 0xE5;

/// BW_RATE: reduced power operation
pub const LOW_POWER: u8 = 0x10;
/// DATA_FORMAT: 4 mg/LSB at every range
pub const FULL_RES: u8 = 0x08;
/// POWER_CTL: measurement mode
pub const MEASURE: u8 = 0x08;

/// Output data rates of the BW_RATE codes
pub const RATES: [f32; 16] = [
    0.10, 0.20, 0.39, 0.78, 1.56, 3.13, 6.25, 12.5, 25.0, 50.0, 100.0, 200.0, 400.0, 800.0,
    1600.0, 3200.0,
];
const LOW_POWER_RATES: core::ops::RangeInclusive<f32> = 12.5..=400.0;

/// Ranges in g of the DATA_FORMAT codes
pub const RANGES: [f32; 4] = [2.0, 4.0, 8.0, 16.0];

pub struct Adxl345;

impl Sensor for Adxl345 {
    const NAME: &'static str = "adxl345";
    const DEFAULT_ADDR: u8 = DEFAULT_ADXL345_ADDR;

    const ID_REG: u8 = REG_DEVID;
    const ID: &'static [u8] = &[DEVID];

    const DATA_REG: u8 = REG_DATAX0;
    const BYTE_ORDER: ByteOrder = ByteOrder::LittleEndian;

    const RATES: &'static [f32] = &RATES;
    const RANGES: &'static [f32] = &RANGES;

    const STOP: [u8; 2] = [REG_POWER_CTL, 0x00];

    fn setup(rate: usize, range: usize) -> impl IntoIterator<Item = [u8; 2]> {
        let mut bw_rate = rate as u8;
        if LOW_POWER_RATES.contains(&RATES[rate]) {
            bw_rate |= LOW_POWER;
        }

        [
            [REG_BW_RATE, bw_rate],
            [REG_DATA_FORMAT, range as u8 | FULL_RES],
            [REG_POWER_CTL, MEASURE],
        ]
    }

    fn gain(range: usize) -> f32 {
        // Full resolution: 10 bits at 2 g, one more bit per range step
        RANGES[range] / (512u32 << range) as f32
    }
}
