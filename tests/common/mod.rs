//! Simulated I²C bus and log capture shared by the integration tests.

#![allow(dead_code)]

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use embedded_hal_async::i2c::{
    ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation, SevenBitAddress,
};
use gy80_ahrs::{
    bmp085::{self, Calibration},
    bus::Bus,
    gy80::{adxl345, hmc5883l, l3g4200d, Adxl345, Hmc5883l, L3g4200d, Sensor},
};
use log::{Level, LevelFilter, Log, Metadata, Record};

pub const ACCEL: u8 = adxl345::DEFAULT_ADXL345_ADDR;
pub const MAG: u8 = hmc5883l::DEFAULT_HMC5883L_ADDR;
pub const GYRO: u8 = l3g4200d::DEFAULT_L3G4200D_ADDR;
pub const BARO: u8 = bmp085::DEFAULT_BMP085_ADDR;

/// Datasheet example coefficients
pub const CALIBRATION: [u16; 11] = [
    408,
    -72i16 as u16,
    -14383i16 as u16,
    32741,
    32757,
    23153,
    6190,
    4,
    -32768i16 as u16,
    -8711i16 as u16,
    2868,
];

#[derive(Default)]
struct Device {
    regs: Vec<u8>,
    pointer: u8,
}

impl Device {
    fn new() -> Self {
        Self {
            regs: vec![0; 256],
            pointer: 0,
        }
    }
}

#[derive(Default)]
struct State {
    devices: HashMap<u8, Device>,
    writes: Vec<(u8, Vec<u8>)>,
    reads: Vec<(u8, u8)>,
    failing_reads: HashSet<u8>,
    failing_writes: HashSet<u8>,
    handles: usize,
}

/// Every device is a 256 byte register file behind an auto-incremented pointer
#[derive(Clone, Default)]
pub struct SimBus {
    state: Rc<RefCell<State>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four GY-80 sensors with their identification and calibration registers
    pub fn gy80() -> Self {
        let bus = Self::new();
        bus.attach(ACCEL);
        bus.set_regs(ACCEL, Adxl345::ID_REG, Adxl345::ID);
        bus.attach(MAG);
        bus.set_regs(MAG, Hmc5883l::ID_REG, Hmc5883l::ID);
        bus.attach(GYRO);
        bus.set_regs(GYRO, L3g4200d::ID_REG, L3g4200d::ID);
        bus.attach(BARO);
        let calibration: Vec<u8> = CALIBRATION
            .iter()
            .flat_map(|word| word.to_be_bytes())
            .collect();
        bus.set_regs(BARO, bmp085::REG_CALIBRATION, &calibration);
        assert_eq!(calibration.len(), Calibration::LEN);
        bus
    }

    pub fn attach(&self, addr: u8) {
        self.state.borrow_mut().devices.insert(addr, Device::new());
    }

    pub fn detach(&self, addr: u8) {
        self.state.borrow_mut().devices.remove(&addr);
    }

    pub fn set_regs(&self, addr: u8, reg: u8, bytes: &[u8]) {
        let mut state = self.state.borrow_mut();
        let device = state.devices.get_mut(&addr).expect("no such device");
        for (offset, byte) in bytes.iter().enumerate() {
            device.regs[reg as usize + offset] = *byte;
        }
    }

    pub fn reg(&self, addr: u8, reg: u8) -> u8 {
        self.state.borrow().devices[&addr].regs[reg as usize]
    }

    /// Payloads of every write to `addr`, in order
    pub fn writes_to(&self, addr: u8) -> Vec<Vec<u8>> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|(to, _)| *to == addr)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    /// Start registers of every read from `addr`, including failed ones
    pub fn reads_from(&self, addr: u8) -> Vec<u8> {
        self.state
            .borrow()
            .reads
            .iter()
            .filter(|(from, _)| *from == addr)
            .map(|(_, reg)| *reg)
            .collect()
    }

    pub fn clear_log(&self) {
        let mut state = self.state.borrow_mut();
        state.writes.clear();
        state.reads.clear();
    }

    pub fn fail_reads(&self, addr: u8) {
        self.state.borrow_mut().failing_reads.insert(addr);
    }

    pub fn fail_writes(&self, addr: u8) {
        self.state.borrow_mut().failing_writes.insert(addr);
    }

    /// Device handles not dropped yet
    pub fn handles(&self) -> usize {
        self.state.borrow().handles
    }
}

impl Bus for SimBus {
    type Device = SimDevice;

    fn device(&self) -> SimDevice {
        self.state.borrow_mut().handles += 1;
        SimDevice {
            state: self.state.clone(),
        }
    }
}

pub struct SimDevice {
    state: Rc<RefCell<State>>,
}

impl Drop for SimDevice {
    fn drop(&mut self) {
        self.state.borrow_mut().handles -= 1;
    }
}

impl ErrorType for SimDevice {
    type Error = ErrorKind;
}

impl I2c for SimDevice {
    async fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        let state = &mut *state;
        let Some(device) = state.devices.get_mut(&address) else {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        };

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    state.writes.push((address, bytes.to_vec()));
                    if state.failing_writes.contains(&address) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }

                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    device.pointer = reg;
                    for byte in data {
                        device.regs[device.pointer as usize] = *byte;
                        device.pointer = device.pointer.wrapping_add(1);
                    }
                }
                Operation::Read(buf) => {
                    state.reads.push((address, device.pointer));
                    if state.failing_reads.contains(&address) {
                        return Err(ErrorKind::Bus);
                    }

                    for byte in buf.iter_mut() {
                        *byte = device.regs[device.pointer as usize];
                        device.pointer = device.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

/// Keeps log records per test thread
struct Capture;

impl Log for Capture {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static CAPTURE: Capture = Capture;

/// Starts capturing the log records of the current thread
pub fn capture_logs() {
    // Another test may have installed it already
    let _ = log::set_logger(&CAPTURE);
    log::set_max_level(LevelFilter::Trace);
    RECORDS.with(|records| records.borrow_mut().clear());
}

/// Warnings logged on the current thread since [`capture_logs`]
pub fn warnings() -> Vec<String> {
    RECORDS.with(|records| {
        records
            .borrow()
            .iter()
            .filter(|(level, _)| *level == Level::Warn)
            .map(|(_, message)| message.clone())
            .collect()
    })
}
