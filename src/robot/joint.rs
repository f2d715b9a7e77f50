//! NAO joint catalog and the per-joint conversion / range-of-motion table.

use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};
use std::fmt;

use crate::config::LimitOverride;
use crate::error::{Result, RetargetError};
use crate::math::finite_or_zero;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(usize)]
pub enum RobotJointName {
    HeadPitch = 0,
    HeadYaw = 1,
    LShoulderRoll = 2,
    LShoulderPitch = 3,
    RShoulderRoll = 4,
    RShoulderPitch = 5,
    LElbowYaw = 6,
    LElbowRoll = 7,
    RElbowYaw = 8,
    RElbowRoll = 9,
    LHipPitch = 10,
    LHipRoll = 11,
    RHipPitch = 12,
    RHipRoll = 13,
    LKneePitch = 14,
    RKneePitch = 15,
    LAnklePitch = 16,
    RAnklePitch = 17,
}

impl RobotJointName {
    pub const COUNT: usize = 18;

    pub const ALL: [RobotJointName; RobotJointName::COUNT] = [
        RobotJointName::HeadPitch,
        RobotJointName::HeadYaw,
        RobotJointName::LShoulderRoll,
        RobotJointName::LShoulderPitch,
        RobotJointName::RShoulderRoll,
        RobotJointName::RShoulderPitch,
        RobotJointName::LElbowYaw,
        RobotJointName::LElbowRoll,
        RobotJointName::RElbowYaw,
        RobotJointName::RElbowRoll,
        RobotJointName::LHipPitch,
        RobotJointName::LHipRoll,
        RobotJointName::RHipPitch,
        RobotJointName::RHipRoll,
        RobotJointName::LKneePitch,
        RobotJointName::RKneePitch,
        RobotJointName::LAnklePitch,
        RobotJointName::RAnklePitch,
    ];

    /// Head and arms.
    pub const UPPER_BODY: &'static [RobotJointName] = &[
        RobotJointName::HeadPitch,
        RobotJointName::HeadYaw,
        RobotJointName::LShoulderRoll,
        RobotJointName::LShoulderPitch,
        RobotJointName::RShoulderRoll,
        RobotJointName::RShoulderPitch,
        RobotJointName::LElbowYaw,
        RobotJointName::LElbowRoll,
        RobotJointName::RElbowYaw,
        RobotJointName::RElbowRoll,
    ];

    pub const LEGS: &'static [RobotJointName] = &[
        RobotJointName::LHipPitch,
        RobotJointName::LHipRoll,
        RobotJointName::RHipPitch,
        RobotJointName::RHipRoll,
        RobotJointName::LKneePitch,
        RobotJointName::RKneePitch,
        RobotJointName::LAnklePitch,
        RobotJointName::RAnklePitch,
    ];

    /// Actuator-side name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RobotJointName::HeadPitch => "HeadPitch",
            RobotJointName::HeadYaw => "HeadYaw",
            RobotJointName::LShoulderRoll => "LShoulderRoll",
            RobotJointName::LShoulderPitch => "LShoulderPitch",
            RobotJointName::RShoulderRoll => "RShoulderRoll",
            RobotJointName::RShoulderPitch => "RShoulderPitch",
            RobotJointName::LElbowYaw => "LElbowYaw",
            RobotJointName::LElbowRoll => "LElbowRoll",
            RobotJointName::RElbowYaw => "RElbowYaw",
            RobotJointName::RElbowRoll => "RElbowRoll",
            RobotJointName::LHipPitch => "LHipPitch",
            RobotJointName::LHipRoll => "LHipRoll",
            RobotJointName::RHipPitch => "RHipPitch",
            RobotJointName::RHipRoll => "RHipRoll",
            RobotJointName::LKneePitch => "LKneePitch",
            RobotJointName::RKneePitch => "RKneePitch",
            RobotJointName::LAnklePitch => "LAnklePitch",
            RobotJointName::RAnklePitch => "RAnklePitch",
        }
    }
}

impl fmt::Display for RobotJointName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One table row: `clamp(scale * (raw + offset), min, max)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointLimit {
    pub joint: RobotJointName,
    pub scale: f32,
    pub offset: f32,
    pub min: f32,
    pub max: f32,
}

impl JointLimit {
    const fn new(joint: RobotJointName, scale: f32, offset: f32, min: f32, max: f32) -> Self {
        Self { joint, scale, offset, min, max }
    }

    /// Saturates, never wraps.
    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }

    pub fn apply(&self, raw: f32) -> f32 {
        self.clamp(finite_or_zero(self.scale * (finite_or_zero(raw) + self.offset)))
    }
}

/// NAO H25 range of motion, table revision 1. Rows are in catalog order.
pub const NAO_H25_V1: [JointLimit; RobotJointName::COUNT] = {
    use RobotJointName::*;
    [
        JointLimit::new(HeadPitch, -1.0, 0.0, -0.6720, 0.5149),
        JointLimit::new(HeadYaw, 1.0, 0.0, -2.0857, 2.0857),
        JointLimit::new(LShoulderRoll, 1.0, -FRAC_PI_4, -0.3142, 1.3265),
        JointLimit::new(LShoulderPitch, -1.0, -FRAC_PI_2, -2.0857, 2.0857),
        JointLimit::new(RShoulderRoll, -1.0, -FRAC_PI_4, -1.3265, 0.3142),
        JointLimit::new(RShoulderPitch, -1.0, -FRAC_PI_2, -2.0857, 2.0857),
        JointLimit::new(LElbowYaw, 1.0, -3.0 * FRAC_PI_4, -2.0857, 2.0857),
        JointLimit::new(LElbowRoll, 1.0, -PI, -1.5446, -0.0349),
        JointLimit::new(RElbowYaw, -1.0, -3.0 * FRAC_PI_4, -2.0857, 2.0857),
        JointLimit::new(RElbowRoll, -1.0, -PI, 0.0349, 1.5446),
        JointLimit::new(LHipPitch, 1.0, 0.0, -1.535889, 0.484090),
        JointLimit::new(LHipRoll, 1.0, 0.0, -0.379472, 0.790477),
        JointLimit::new(RHipPitch, 1.0, 0.0, -1.535889, 0.484090),
        JointLimit::new(RHipRoll, -1.0, 0.0, -0.790477, 0.379472),
        JointLimit::new(LKneePitch, -1.0, -PI, -0.092346, 2.112528),
        JointLimit::new(RKneePitch, -1.0, -PI, -0.103083, 2.120198),
        JointLimit::new(LAnklePitch, 1.0, -FRAC_PI_2, -1.189516, 0.922747),
        JointLimit::new(RAnklePitch, 1.0, -FRAC_PI_2, -1.186448, 0.932056),
    ]
};

/// 抽出角 → ロボット関節角の変換とクランプ
#[derive(Debug, Clone)]
pub struct JointLimitMapper {
    rows: [JointLimit; RobotJointName::COUNT],
}

impl JointLimitMapper {
    pub fn new(overrides: &[LimitOverride]) -> Result<Self> {
        let mut rows = NAO_H25_V1;
        for o in overrides {
            let row = &mut rows[o.joint as usize];
            if let Some(scale) = o.scale {
                row.scale = scale;
            }
            if let Some(offset) = o.offset {
                row.offset = offset;
            }
            if let Some(min) = o.min {
                row.min = min;
            }
            if let Some(max) = o.max {
                row.max = max;
            }
        }
        for row in &rows {
            let finite = [row.scale, row.offset, row.min, row.max]
                .iter()
                .all(|v| v.is_finite());
            if !finite || row.min > row.max {
                return Err(RetargetError::InvalidConfiguration(format!(
                    "joint limit for {} is invalid (min={}, max={})",
                    row.joint, row.min, row.max
                )));
            }
        }
        Ok(Self { rows })
    }

    pub fn limit(&self, joint: RobotJointName) -> &JointLimit {
        &self.rows[joint as usize]
    }

    /// 変換式を適用してからクランプ
    pub fn map(&self, joint: RobotJointName, raw: f32) -> f32 {
        self.limit(joint).apply(raw)
    }

    /// 変換式なしでクランプのみ
    pub fn clamp(&self, joint: RobotJointName, value: f32) -> f32 {
        self.limit(joint).clamp(finite_or_zero(value))
    }
}

impl Default for JointLimitMapper {
    fn default() -> Self {
        Self { rows: NAO_H25_V1 }
    }
}

/// 1サイクル分の関節角（ラジアン、変換・クランプ済み）
///
/// 対象関節のうち、そのサイクルで実際に計算できたものだけが値を持つ。
/// 値のない関節は送信されず、ロボット側は直前の角度を保つ。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JointAngleSet {
    targets: [bool; RobotJointName::COUNT],
    values: [Option<f32>; RobotJointName::COUNT],
}

impl JointAngleSet {
    /// `joints` を対象にした空の集合
    pub fn new(joints: &[RobotJointName]) -> Self {
        let mut targets = [false; RobotJointName::COUNT];
        for &joint in joints {
            targets[joint as usize] = true;
        }
        Self {
            targets,
            values: [None; RobotJointName::COUNT],
        }
    }

    pub fn is_target(&self, joint: RobotJointName) -> bool {
        self.targets[joint as usize]
    }

    pub fn get(&self, joint: RobotJointName) -> Option<f32> {
        self.values[joint as usize]
    }

    /// 対象外の関節は無視する
    pub fn set(&mut self, joint: RobotJointName, angle: f32) {
        if self.is_target(joint) {
            self.values[joint as usize] = Some(angle);
        }
    }

    /// 値だけ消して対象は残す
    pub fn clear(&mut self) {
        self.values = [None; RobotJointName::COUNT];
    }

    pub fn len(&self) -> usize {
        self.values.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (RobotJointName, f32)> + '_ {
        RobotJointName::ALL
            .iter()
            .zip(self.values.iter())
            .filter_map(|(&joint, v)| v.map(|a| (joint, a)))
    }
}
