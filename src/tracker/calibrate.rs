use crate::error::{Result, RetargetError};
use crate::math::Point3;
use crate::skeleton::{JointId, JointMap, Skeleton};

use super::average::RunningAverage;

/// セッション開始時の基準姿勢
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationBaseline {
    positions: JointMap<Point3>,
}

impl CalibrationBaseline {
    pub fn new(positions: JointMap<Point3>) -> Self {
        Self { positions }
    }

    pub fn get(&self, joint: JointId) -> Result<Point3> {
        self.positions
            .get(joint)
            .copied()
            .ok_or(RetargetError::MissingCalibrationEntry(joint))
    }

    pub fn positions(&self) -> &JointMap<Point3> {
        &self.positions
    }
}

/// 最初の W_cal フレームの平均で基準姿勢を作る
///
/// 確定後のフレームは無視する。やり直しは `reset` で明示的に行う。
#[derive(Debug, Clone)]
pub struct Calibrator {
    average: RunningAverage,
    baseline: Option<CalibrationBaseline>,
}

impl Calibrator {
    pub fn new(window: usize) -> Result<Self> {
        Ok(Self {
            average: RunningAverage::new(window)?,
            baseline: None,
        })
    }

    /// 1フレーム追加。基準姿勢が確定していれば true
    pub fn add(&mut self, skeleton: &Skeleton) -> bool {
        if self.baseline.is_some() {
            return true;
        }
        if self.average.push(skeleton) {
            self.baseline = Some(CalibrationBaseline::new(self.average.take()));
            return true;
        }
        false
    }

    pub fn is_complete(&self) -> bool {
        self.baseline.is_some()
    }

    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.baseline.as_ref()
    }

    /// 積算済みフレーム数
    pub fn collected(&self) -> usize {
        if self.baseline.is_some() {
            self.average.window()
        } else {
            self.average.count()
        }
    }

    pub fn window(&self) -> usize {
        self.average.window()
    }

    pub fn reset(&mut self) {
        self.average.reset();
        self.baseline = None;
    }
}
