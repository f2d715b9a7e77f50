//! Rotation matrix / quaternion → intrinsic Euler angle conversion.
//!
//! The XYZ decomposition keeps the sensor SDK's sign convention on the
//! gimbal-lock fallback (`-m[(1, 0)]` in both branches), which differs from the
//! textbook formula. ZXY and ZYX follow the standard element mapping.

use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

use super::angle::finite_or_zero;

/// 3x3 rotation matrix. `m[(0, 2)]` (row 0, column 2) is the SDK's `M13`.
pub type Matrix3 = nalgebra::Matrix3<f32>;

/// Quaternion `w + xi + yj + zk`. Need not be normalized.
pub type Quaternion = nalgebra::Quaternion<f32>;

/// Angles about each axis, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl EulerAngles {
    fn sanitized(x: f32, y: f32, z: f32) -> Self {
        Self {
            x: finite_or_zero(x),
            y: finite_or_zero(y),
            z: finite_or_zero(z),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EulerOrder {
    #[default]
    Xyz,
    Zxy,
    Zyx,
}

/// ボーンの回転表現（行列またはクォータニオン）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Rotation {
    Matrix(Matrix3),
    Quaternion(Quaternion),
}

impl Rotation {
    /// Matrices are decomposed with `order`. Quaternions always use the
    /// heading/attitude/bank decomposition, reported on the same axes.
    pub fn to_euler(&self, order: EulerOrder) -> EulerAngles {
        match self {
            Rotation::Matrix(m) => euler_from_matrix(m, order),
            Rotation::Quaternion(q) => euler_from_quaternion(q),
        }
    }
}

pub fn euler_from_matrix(m: &Matrix3, order: EulerOrder) -> EulerAngles {
    if !m.iter().all(|v| v.is_finite()) {
        return EulerAngles::default();
    }
    match order {
        EulerOrder::Xyz => euler_from_matrix_xyz(m),
        EulerOrder::Zxy => euler_from_matrix_zxy(m),
        EulerOrder::Zyx => euler_from_matrix_zyx(m),
    }
}

pub fn euler_from_matrix_xyz(r: &Matrix3) -> EulerAngles {
    let pivot = r[(0, 2)];
    let (x, y, z) = if pivot < 1.0 {
        if pivot > -1.0 {
            (
                f32::atan2(-r[(1, 2)], r[(2, 2)]),
                pivot.asin(),
                f32::atan2(-r[(0, 1)], r[(0, 0)]),
            )
        } else {
            (-f32::atan2(-r[(1, 0)], r[(1, 1)]), -FRAC_PI_2, 0.0)
        }
    } else {
        (f32::atan2(-r[(1, 0)], r[(1, 1)]), FRAC_PI_2, 0.0)
    };
    EulerAngles::sanitized(x, y, z)
}

pub fn euler_from_matrix_zxy(r: &Matrix3) -> EulerAngles {
    let pivot = r[(2, 1)];
    let (x, y, z) = if pivot < 1.0 {
        if pivot > -1.0 {
            (
                pivot.asin(),
                f32::atan2(-r[(2, 0)], r[(2, 2)]),
                f32::atan2(-r[(0, 1)], r[(1, 1)]),
            )
        } else {
            (-FRAC_PI_2, 0.0, -f32::atan2(r[(0, 2)], r[(0, 0)]))
        }
    } else {
        (FRAC_PI_2, 0.0, f32::atan2(r[(0, 2)], r[(0, 0)]))
    };
    EulerAngles::sanitized(x, y, z)
}

pub fn euler_from_matrix_zyx(r: &Matrix3) -> EulerAngles {
    let pivot = r[(2, 0)];
    let (x, y, z) = if pivot < 1.0 {
        if pivot > -1.0 {
            (
                f32::atan2(r[(2, 1)], r[(2, 2)]),
                (-pivot).asin(),
                f32::atan2(r[(1, 0)], r[(0, 0)]),
            )
        } else {
            (0.0, FRAC_PI_2, -f32::atan2(-r[(1, 2)], r[(1, 1)]))
        }
    } else {
        (0.0, -FRAC_PI_2, f32::atan2(-r[(1, 2)], r[(1, 1)]))
    };
    EulerAngles::sanitized(x, y, z)
}

/// Bank (about X) in `x`, heading (about Y) in `y`, attitude (about Z) in `z`.
///
/// A single-axis quaternion lands on the same component as the equivalent
/// matrix does under any [`EulerOrder`].
pub fn euler_from_quaternion(q: &Quaternion) -> EulerAngles {
    let (x, y, z, w) = (q.coords.x, q.coords.y, q.coords.z, q.coords.w);
    let sqw = w * w;
    let sqx = x * x;
    let sqy = y * y;
    let sqz = z * z;

    // 正規化されていなければ補正係数になる
    let unit = sqx + sqy + sqz + sqw;
    let test = x * y + z * w;

    if test > 0.4999 * unit {
        // north pole
        return EulerAngles::sanitized(0.0, 2.0 * f32::atan2(x, w), FRAC_PI_2);
    }
    if test < -0.4999 * unit {
        // south pole
        return EulerAngles::sanitized(0.0, -2.0 * f32::atan2(x, w), -FRAC_PI_2);
    }

    let heading = f32::atan2(2.0 * y * w - 2.0 * x * z, sqx - sqy - sqz + sqw);
    let attitude = (2.0 * test / unit).asin();
    let bank = f32::atan2(2.0 * x * w - 2.0 * y * z, -sqx + sqy - sqz + sqw);
    EulerAngles::sanitized(bank, heading, attitude)
}
