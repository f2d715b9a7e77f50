use crate::error::{Result, RetargetError};
use crate::math::Point3;
use crate::skeleton::{JointId, JointMap, Skeleton};

/// ウィンドウ幅 W の逐次平均
///
/// 各フレームの位置を 1/W 倍して加算する。W フレーム揃った時点で平均になる。
/// 一部のフレームにしか現れなかった関節は、現れたフレーム数で割り直す。
#[derive(Debug, Clone)]
pub struct RunningAverage {
    window: usize,
    count: usize,
    sum: JointMap<Point3>,
    seen: [usize; JointId::COUNT],
}

impl RunningAverage {
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(RetargetError::InvalidConfiguration(
                "averaging window must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            window,
            count: 0,
            sum: JointMap::new(),
            seen: [0; JointId::COUNT],
        })
    }

    /// 1フレーム分を加算し、ウィンドウが埋まったら true
    pub fn push(&mut self, skeleton: &Skeleton) -> bool {
        if self.count == 0 {
            self.clear();
        }
        let w = self.window as f32;
        for (joint, p) in skeleton.positions.iter() {
            let acc = self.sum.get(joint).copied().unwrap_or_else(Point3::zeros);
            self.sum.insert(joint, acc + *p / w);
            self.seen[joint as usize] += 1;
        }
        self.count += 1;
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.count >= self.window
    }

    /// 積算結果を取り出してカウンタを戻す
    pub fn take(&mut self) -> JointMap<Point3> {
        let w = self.window as f32;
        let averaged = self
            .sum
            .iter()
            .map(|(joint, acc)| match self.seen[joint as usize] {
                n if n == self.window => (joint, *acc),
                n => (joint, *acc * (w / n as f32)),
            })
            .collect();
        self.count = 0;
        self.clear();
        averaged
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.clear();
    }

    fn clear(&mut self) {
        self.sum.clear();
        self.seen = [0; JointId::COUNT];
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn window(&self) -> usize {
        self.window
    }
}
