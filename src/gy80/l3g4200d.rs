use super::{ByteOrder, Sensor};

pub const DEFAULT_L3G4200D_ADDR: u8 = 0x69;

pub const REG_WHO_AM_I: u8 = 0x0F;
pub const REG_CTRL_REG1: u8 = 0x20;
pub const REG_CTRL_REG4: u8 = 0x23;
pub const REG_OUT_X_L: u8 = 0x28;

pub const WHO_AM_I: u8 = 0xD3;

/// Sub-address MSB: increment the register on multi-byte reads
pub const AUTO_INCREMENT: u8 = 0x80;

pub struct CtrlReg1;

impl CtrlReg1 {
    /// Output data rate, bits 7:6
    pub const DR_SHIFT: u8 = 6;
    /// Bandwidth selection 0b10, bits 5:4
    pub const BW: u8 = 0b10 << 4;
    /// Normal mode (power down when cleared)
    pub const PD: u8 = 1 << 3;
    pub const XYZ_EN: u8 = 0b111;
}

pub struct CtrlReg4;

impl CtrlReg4 {
    /// Full scale selection, bits 5:4
    pub const FS_SHIFT: u8 = 4;
}

/// Output data rates in Hz of the DR codes
pub const RATES: [f32; 4] = [100.0, 200.0, 400.0, 800.0];

/// Ranges in degrees per second, indexed by FS code
pub const RANGES: [f32; 3] = [250.0, 500.0, 2000.0];

const FULL_SCALE: f32 = 32768.0;

pub struct L3g4200d;

impl Sensor for L3g4200d {
    const NAME: &'static str = "l3g4200d";
    const DEFAULT_ADDR: u8 = DEFAULT_L3G4200D_ADDR;

    const ID_REG: u8 = REG_WHO_AM_I;
    const ID: &'static [u8] = &[WHO_AM_I];

    const DATA_REG: u8 = AUTO_INCREMENT | REG_OUT_X_L;
    const BYTE_ORDER: ByteOrder = ByteOrder::LittleEndian;

    const RATES: &'static [f32] = &RATES;
    const RANGES: &'static [f32] = &RANGES;

    const STOP: [u8; 2] = [REG_CTRL_REG1, 0x00];

    fn setup(rate: usize, range: usize) -> impl IntoIterator<Item = [u8; 2]> {
        let ctrl1 = (rate as u8) << CtrlReg1::DR_SHIFT | CtrlReg1::BW | CtrlReg1::PD | CtrlReg1::XYZ_EN;
        // Leaving power down mode starts measurement, so CTRL_REG1 goes last
        [
            [REG_CTRL_REG4, (range as u8) << CtrlReg4::FS_SHIFT],
            [REG_CTRL_REG1, ctrl1],
        ]
    }

    fn gain(range: usize) -> f32 {
        RANGES[range] / FULL_SCALE
    }
}
