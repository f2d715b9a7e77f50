use anyhow::Result;

use crate::robot::{JointAngleSet, StepCommand};

/// ロボット側への出力口
///
/// 接続・姿勢初期化・剛性・バランス制御は実装側の責任。
pub trait Actuator {
    /// 関節角をまとめて送る。`speed_fraction` は最大速度比
    fn set_joint_angles(&mut self, angles: &JointAngleSet, speed_fraction: f32) -> Result<()>;

    fn set_foot_steps(&mut self, step: &StepCommand) -> Result<()>;
}

impl<A: Actuator + ?Sized> Actuator for &mut A {
    fn set_joint_angles(&mut self, angles: &JointAngleSet, speed_fraction: f32) -> Result<()> {
        (**self).set_joint_angles(angles, speed_fraction)
    }

    fn set_foot_steps(&mut self, step: &StepCommand) -> Result<()> {
        (**self).set_foot_steps(step)
    }
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set_joint_angles(&mut self, angles: &JointAngleSet, speed_fraction: f32) -> Result<()> {
        (**self).set_joint_angles(angles, speed_fraction)
    }

    fn set_foot_steps(&mut self, step: &StepCommand) -> Result<()> {
        (**self).set_foot_steps(step)
    }
}

/// 受け取った指令を記録するだけの出力（テスト・ドライラン用）
#[derive(Debug, Default, Clone)]
pub struct RecordingActuator {
    pub joint_batches: Vec<(JointAngleSet, f32)>,
    pub steps: Vec<StepCommand>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_angles(&self) -> Option<&JointAngleSet> {
        self.joint_batches.last().map(|(angles, _)| angles)
    }
}

impl Actuator for RecordingActuator {
    fn set_joint_angles(&mut self, angles: &JointAngleSet, speed_fraction: f32) -> Result<()> {
        self.joint_batches.push((angles.clone(), speed_fraction));
        Ok(())
    }

    fn set_foot_steps(&mut self, step: &StepCommand) -> Result<()> {
        self.steps.push(*step);
        Ok(())
    }
}
