use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_sync::{blocking_mutex::raw::RawMutex, mutex::Mutex};
use embedded_hal::i2c::SevenBitAddress;
use embedded_hal_async::i2c::I2c;

/// Lowest address not reserved by the I²C specification
pub const MIN_ADDR: SevenBitAddress = 0x08;
/// Highest address not reserved by the I²C specification
pub const MAX_ADDR: SevenBitAddress = 0x77;

/// 7-bit address outside of the reserved `0x00..=0x07` and `0x78..=0x7F` blocks
pub fn is_valid_addr(addr: SevenBitAddress) -> bool {
    (MIN_ADDR..=MAX_ADDR).contains(&addr)
}

/// Hands out one device handle per sensor sharing the same physical bus.
///
/// Dropping a handle releases it.
pub trait Bus {
    type Device: I2c;

    fn device(&self) -> Self::Device;
}

impl<'a, M, BUS> Bus for &'a Mutex<M, BUS>
where
    M: RawMutex + 'static,
    BUS: I2c + 'static,
{
    type Device = I2cDevice<'a, M, BUS>;

    fn device(&self) -> Self::Device {
        I2cDevice::new(*self)
    }
}
