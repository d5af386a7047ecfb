#![no_std]
#![deny(unused_must_use)]

//! Attitude and heading reference for the GY-80 sensor board.
//!
//! The ADXL345, HMC5883L and L3G4200D are polled over I²C, fused by a
//! Madgwick filter and the resulting quaternion is published on [`ahrs::EV_AHRS`].
//! A BMP085 on the same board is polled independently by [`baro::Baro`].

pub mod ahrs;
pub mod baro;
pub mod bmp085;
pub mod bus;
pub mod clock;
pub mod config;
pub mod gy80;
pub mod madgwick;
pub mod math;
pub mod node;
pub mod pubsub;

pub use ahrs::{Ahrs, Attitude, AttitudeEvent, EV_AHRS};
pub use baro::Baro;
pub use config::Config;
pub use madgwick::MadgwickFilter;
pub use node::{Node, Registered};
