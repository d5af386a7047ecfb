use nalgebra::{ComplexField, RealField};

/// PI, f32
pub const PI: f32 = core::f32::consts::PI;

/// PI / 180, for conversion to radians
pub const PI_180: f32 = PI / 180.0;

/// Sea level standard pressure, Pa
pub const SEA_LEVEL_PRESSURE: f32 = 101_325.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Approximate `1 / sqrt(x)`.
///
/// The initial guess comes from reinterpreting the float bits as an integer and
/// subtracting half of it from the magic constant `0x5f3759df`. A single
/// Newton-Raphson step `y * (1.5 - x/2 * y^2)` then brings the relative error
/// below 0.18%, which is enough for normalizing filter vectors.
pub fn inv_sqrt(x: f32) -> f32 {
    let half_x = 0.5 * x;
    let i = 0x5f3759df_u32.wrapping_sub(x.to_bits() >> 1);
    let y = f32::from_bits(i);
    y * (1.5 - half_x * y * y)
}

pub fn deg_to_rad(deg: f32) -> f32 {
    deg * PI_180
}

/// Barometric altitude in meters from pressure in Pa.
pub fn pressure_to_altitude(pressure: f32) -> f32 {
    44330.0 * (1.0 - (pressure / SEA_LEVEL_PRESSURE).powf(0.190_294_96))
}

/// Euler angles (radians) of a `[w, x, y, z]` quaternion.
pub fn quat_to_euler(q: &[f32; 4]) -> Rotation {
    let [q0, q1, q2, q3] = *q;
    Rotation {
        yaw: (2.0 * q1 * q2 - 2.0 * q0 * q3).atan2(2.0 * q0 * q0 + 2.0 * q1 * q1 - 1.0),
        pitch: -(2.0 * q1 * q3 + 2.0 * q0 * q2).asin(),
        roll: (2.0 * q2 * q3 - 2.0 * q0 * q1).atan2(2.0 * q0 * q0 + 2.0 * q3 * q3 - 1.0),
    }
}
