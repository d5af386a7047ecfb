use nalgebra::{ComplexField, Vector3, Vector4};

use crate::{
    config::ConfigError,
    math::{inv_sqrt, quat_to_euler, Rotation},
};

/// Filter gain used when nothing else is configured
pub const DEFAULT_BETA: f32 = 0.1;

/// Madgwick gradient descent orientation filter (MARG variant).
pub struct MadgwickFilter {
    q: Vector4<f32>, // Quaternion [w, x, y, z]
    beta: f32,       // Algorithm gain
}

impl MadgwickFilter {
    /// Filter at rest with gain `beta`, which must lie in [0, 1]
    pub fn new(beta: f32) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&beta) {
            return Err(ConfigError::InvalidBeta);
        }
        Ok(Self {
            q: Vector4::new(1.0, 0.0, 0.0, 0.0), // Initial quaternion (no rotation)
            beta,
        })
    }

    pub fn beta(&self) -> f32 {
        self.beta
    }

    /// Fuse one sample. `gyro` is in rad/s, `accel` and `mag` in any unit, `dt` in seconds.
    ///
    /// An all-zero `accel` is treated as an invalid measurement: the gradient
    /// correction is skipped and the gyro rates are integrated alone.
    pub fn update(
        &mut self,
        accel: Vector3<f32>,
        gyro: Vector3<f32>,
        mag: Vector3<f32>,
        dt: f32,
    ) -> Vector4<f32> {
        let [gx, gy, gz] = gyro.into();
        let [q1, q2, q3, q4] = self.q.into();

        // Rate of change of quaternion from gyroscope
        let mut q_dot1 = 0.5 * (-q2 * gx - q3 * gy - q4 * gz);
        let mut q_dot2 = 0.5 * (q1 * gx + q3 * gz - q4 * gy);
        let mut q_dot3 = 0.5 * (q1 * gy - q2 * gz + q4 * gx);
        let mut q_dot4 = 0.5 * (q1 * gz + q2 * gy - q3 * gx);

        if accel != Vector3::zeros() {
            let [s1, s2, s3, s4] = Self::gradient(self.q, accel, mag).into();

            q_dot1 -= self.beta * s1;
            q_dot2 -= self.beta * s2;
            q_dot3 -= self.beta * s3;
            q_dot4 -= self.beta * s4;
        }

        // Integrate to yield quaternion
        let q = Vector4::new(
            q1 + q_dot1 * dt,
            q2 + q_dot2 * dt,
            q3 + q_dot3 * dt,
            q4 + q_dot4 * dt,
        );

        self.q = q * inv_sqrt(q.norm_squared());
        self.q
    }

    /// Normalized gradient of the gravity + magnetic field objective function.
    fn gradient(q: Vector4<f32>, accel: Vector3<f32>, mag: Vector3<f32>) -> Vector4<f32> {
        let [ax, ay, az] = (accel * inv_sqrt(accel.norm_squared())).into();
        let [mx, my, mz] = (mag * inv_sqrt(mag.norm_squared())).into();
        let [q1, q2, q3, q4] = q.into();

        // Auxiliary variables to avoid repeated arithmetic
        let two_q1 = 2.0 * q1;
        let two_q2 = 2.0 * q2;
        let two_q3 = 2.0 * q3;
        let two_q4 = 2.0 * q4;
        let two_q1q3 = two_q1 * q3;
        let two_q3q4 = two_q3 * q4;

        let q1q1 = q1 * q1;
        let q1q2 = q1 * q2;
        let q1q3 = q1 * q3;
        let q1q4 = q1 * q4;
        let q2q2 = q2 * q2;
        let q2q3 = q2 * q3;
        let q2q4 = q2 * q4;
        let q3q3 = q3 * q3;
        let q3q4 = q3 * q4;
        let q4q4 = q4 * q4;

        // Reference direction of Earth's magnetic field
        let two_q1mx = two_q1 * mx;
        let two_q1my = two_q1 * my;
        let two_q1mz = two_q1 * mz;
        let two_q2mx = two_q2 * mx;

        let hx = mx * q1q1 - two_q1my * q4
            + two_q1mz * q3
            + mx * q2q2
            + two_q2 * my * q3
            + two_q2 * mz * q4
            - mx * q3q3
            - mx * q4q4;

        let hy = two_q1mx * q4 + my * q1q1 - two_q1mz * q2 + two_q2mx * q3 - my * q2q2
            + my * q3q3
            + two_q3 * mz * q4
            - my * q4q4;

        let two_bx = (hx * hx + hy * hy).sqrt();
        let two_bz = -two_q1mx * q3 + two_q1my * q2 + mz * q1q1 + two_q2mx * q4 - mz * q2q2
            + two_q3 * my * q4
            - mz * q3q3
            + mz * q4q4;

        let four_bx = 2.0 * two_bx;
        let four_bz = 2.0 * two_bz;

        // Gradient descent algorithm corrective step
        let s1 = -two_q3 * (2.0 * q2q4 - two_q1q3 - ax) + two_q2 * (2.0 * q1q2 + two_q3q4 - ay)
            - two_bz * q3 * (two_bx * (0.5 - q3q3 - q4q4) + two_bz * (q2q4 - q1q3) - mx)
            + (-two_bx * q4 + two_bz * q2) * (two_bx * (q2q3 - q1q4) + two_bz * (q1q2 + q3q4) - my)
            + two_bx * q3 * (two_bx * (q1q3 + q2q4) + two_bz * (0.5 - q2q2 - q3q3) - mz);

        let s2 = two_q4 * (2.0 * q2q4 - two_q1q3 - ax) + two_q1 * (2.0 * q1q2 + two_q3q4 - ay)
            - 4.0 * q2 * (1.0 - 2.0 * q2q2 - 2.0 * q3q3 - az)
            + two_bz * q4 * (two_bx * (0.5 - q3q3 - q4q4) + two_bz * (q2q4 - q1q3) - mx)
            + (two_bx * q3 + two_bz * q1) * (two_bx * (q2q3 - q1q4) + two_bz * (q1q2 + q3q4) - my)
            + (two_bx * q4 - four_bz * q2)
                * (two_bx * (q1q3 + q2q4) + two_bz * (0.5 - q2q2 - q3q3) - mz);

        let s3 = -two_q1 * (2.0 * q2q4 - two_q1q3 - ax) + two_q4 * (2.0 * q1q2 + two_q3q4 - ay)
            - 4.0 * q3 * (1.0 - 2.0 * q2q2 - 2.0 * q3q3 - az)
            + (-four_bx * q3 - two_bz * q1)
                * (two_bx * (0.5 - q3q3 - q4q4) + two_bz * (q2q4 - q1q3) - mx)
            + (two_bx * q2 + two_bz * q4) * (two_bx * (q2q3 - q1q4) + two_bz * (q1q2 + q3q4) - my)
            + (two_bx * q1 - four_bz * q3)
                * (two_bx * (q1q3 + q2q4) + two_bz * (0.5 - q2q2 - q3q3) - mz);

        let s4 = two_q2 * (2.0 * q2q4 - two_q1q3 - ax)
            + two_q3 * (2.0 * q1q2 + two_q3q4 - ay)
            + (-four_bx * q4 + two_bz * q2)
                * (two_bx * (0.5 - q3q3 - q4q4) + two_bz * (q2q4 - q1q3) - mx)
            + (-two_bx * q1 + two_bz * q3) * (two_bx * (q2q3 - q1q4) + two_bz * (q1q2 + q3q4) - my)
            + two_bx * q2 * (two_bx * (q1q3 + q2q4) + two_bz * (0.5 - q2q2 - q3q3) - mz);

        let s = Vector4::new(s1, s2, s3, s4);
        s * inv_sqrt(s.norm_squared())
    }

    pub fn quaternion(&self) -> &Vector4<f32> {
        &self.q
    }

    pub fn rotation(&self) -> Rotation {
        quat_to_euler(&self.q.into())
    }
}

impl Default for MadgwickFilter {
    fn default() -> Self {
        Self {
            q: Vector4::new(1.0, 0.0, 0.0, 0.0),
            beta: DEFAULT_BETA,
        }
    }
}
