use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::LocomotionConfig;
use crate::math::Point3;

/// 前後方向の歩幅の上下限（saturate 有効時）
const STEP_X_RANGE: (f32, f32) = (-0.04, 0.08);
/// 左右方向の歩幅の上下限（saturate 有効時）
const STEP_Y_RANGE: (f32, f32) = (0.088, 0.16);
/// センサー座標 → 歩幅の縮小率
const STEP_SCALE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Leg {
    Left,
    Right,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Left => "LLeg",
            Leg::Right => "RLeg",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 1歩分の移動指令
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepCommand {
    pub leg: Leg,
    /// 前後
    pub x: f32,
    /// 左右
    pub y: f32,
    /// 旋回（常に0）
    pub theta: f32,
    pub speed_fraction: f32,
}

/// 足のZ差から前後の歩幅へ
pub fn convert_step_x(dz: f32, saturate: bool) -> f32 {
    let x = dz / STEP_SCALE;
    if saturate {
        x.clamp(STEP_X_RANGE.0, STEP_X_RANGE.1)
    } else {
        x
    }
}

/// 足のX差から左右の歩幅へ
pub fn convert_step_y(dx: f32, saturate: bool) -> f32 {
    let y = dx.abs() / STEP_SCALE;
    if saturate {
        y.clamp(STEP_Y_RANGE.0, STEP_Y_RANGE.1)
    } else {
        y
    }
}

/// 足の移動を検出して歩行指令を出すゲート
///
/// 最後に確定した足位置と平滑化後の足位置を水平2軸（X, Z）で比較する。
/// どちらかの差が `tolerance` を超えたら「動いた」とみなす（`tolerance = 0` は厳密な不等号）。
pub struct LocomotionGate {
    tolerance: f32,
    speed_fraction: f32,
    saturate: bool,
    /// [左, 右]
    committed: Option<[Point3; 2]>,
}

impl LocomotionGate {
    pub fn new(tolerance: f32, speed_fraction: f32, saturate: bool) -> Self {
        Self {
            tolerance,
            speed_fraction,
            saturate,
            committed: None,
        }
    }

    pub fn from_config(config: &LocomotionConfig) -> Self {
        Self::new(
            config.foot_step_tolerance,
            config.step_speed_fraction,
            config.saturate_steps,
        )
    }

    /// 確定位置を初期化（キャリブレーション結果から）
    pub fn seed(&mut self, left: Point3, right: Point3) {
        self.committed = Some([left, right]);
    }

    pub fn is_seeded(&self) -> bool {
        self.committed.is_some()
    }

    pub fn committed(&self, leg: Leg) -> Option<Point3> {
        self.committed.map(|c| c[leg as usize])
    }

    fn moved(&self, from: Point3, to: Point3) -> bool {
        (to.x - from.x).abs() > self.tolerance || (to.z - from.z).abs() > self.tolerance
    }

    /// 左足を先に評価し、1サイクルにつき最大1歩
    pub fn evaluate(&mut self, left: Point3, right: Point3) -> Option<StepCommand> {
        let Some(mut committed) = self.committed else {
            self.committed = Some([left, right]);
            return None;
        };

        let leg = if self.moved(committed[Leg::Left as usize], left) {
            committed[Leg::Left as usize] = left;
            Leg::Left
        } else if self.moved(committed[Leg::Right as usize], right) {
            committed[Leg::Right as usize] = right;
            Leg::Right
        } else {
            return None;
        };
        self.committed = Some(committed);

        let command = StepCommand {
            leg,
            x: convert_step_x(left.z - right.z, self.saturate),
            y: convert_step_y(left.x - right.x, self.saturate),
            theta: 0.0,
            speed_fraction: self.speed_fraction,
        };
        tracing::debug!(leg = %command.leg, x = command.x, y = command.y, "step command");
        Some(command)
    }

    pub fn reset(&mut self) {
        self.committed = None;
    }
}
