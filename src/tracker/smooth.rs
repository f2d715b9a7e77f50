use crate::config::SmoothConfig;
use crate::error::Result;
use crate::math::Point3;
use crate::skeleton::{JointId, JointMap, Skeleton};

use super::average::RunningAverage;

/// ウィンドウ1回分の平均位置
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SmoothedSample {
    positions: JointMap<Point3>,
}

impl SmoothedSample {
    pub fn new(positions: JointMap<Point3>) -> Self {
        Self { positions }
    }

    pub fn get(&self, joint: JointId) -> Option<Point3> {
        self.positions.get(joint).copied()
    }

    pub fn positions(&self) -> &JointMap<Point3> {
        &self.positions
    }
}

/// W_smooth フレームごとの平均化フィルタ
///
/// ウィンドウが埋まるたびに平均を1回返し、空から積算し直す。
pub struct Smoother {
    average: RunningAverage,
}

impl Smoother {
    pub fn new(window: usize) -> Result<Self> {
        Ok(Self {
            average: RunningAverage::new(window)?,
        })
    }

    pub fn from_config(config: &SmoothConfig) -> Result<Self> {
        Self::new(config.window)
    }

    pub fn apply(&mut self, skeleton: &Skeleton) -> Option<SmoothedSample> {
        if self.average.push(skeleton) {
            Some(SmoothedSample::new(self.average.take()))
        } else {
            None
        }
    }

    pub fn collected(&self) -> usize {
        self.average.count()
    }

    pub fn window(&self) -> usize {
        self.average.window()
    }

    pub fn reset(&mut self) {
        self.average.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq_f32(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() < eps
    }

    fn frame_at(x: f32) -> Skeleton {
        Skeleton::tracked().with_joint(JointId::WristLeft, Point3::new(x, 1.0, 2.0))
    }

    #[test]
    fn test_emits_once_per_window() {
        let mut s = Smoother::new(3).unwrap();
        assert!(s.apply(&frame_at(0.0)).is_none());
        assert!(s.apply(&frame_at(0.0)).is_none());
        assert!(s.apply(&frame_at(0.0)).is_some());
        assert_eq!(s.collected(), 0);
        assert!(s.apply(&frame_at(0.0)).is_none());
    }

    #[test]
    fn test_window_average() {
        let mut s = Smoother::new(2).unwrap();
        s.apply(&frame_at(1.0));
        let sample = s.apply(&frame_at(3.0)).unwrap();
        let wrist = sample.get(JointId::WristLeft).unwrap();
        assert!(approx_eq_f32(wrist.x, 2.0, 1e-6));
        assert!(approx_eq_f32(wrist.y, 1.0, 1e-6));
    }

    #[test]
    fn test_windows_do_not_overlap() {
        let mut s = Smoother::new(2).unwrap();
        s.apply(&frame_at(100.0));
        s.apply(&frame_at(100.0));
        s.apply(&frame_at(1.0));
        let sample = s.apply(&frame_at(1.0)).unwrap();
        assert!(approx_eq_f32(sample.get(JointId::WristLeft).unwrap().x, 1.0, 1e-6));
    }

    #[test]
    fn test_reset() {
        let mut s = Smoother::new(2).unwrap();
        s.apply(&frame_at(50.0));
        s.reset();
        s.apply(&frame_at(2.0));
        let sample = s.apply(&frame_at(2.0)).unwrap();
        // After reset, the discarded partial window must not leak in
        assert!(approx_eq_f32(sample.get(JointId::WristLeft).unwrap().x, 2.0, 1e-6));
    }
}
