use serde::{Deserialize, Serialize};

use crate::math::{Point3, Rotation};

/// センサーが追跡する20関節のインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(usize)]
pub enum JointId {
    HipCenter = 0,
    Spine = 1,
    ShoulderCenter = 2,
    Head = 3,
    ShoulderLeft = 4,
    ElbowLeft = 5,
    WristLeft = 6,
    HandLeft = 7,
    ShoulderRight = 8,
    ElbowRight = 9,
    WristRight = 10,
    HandRight = 11,
    HipLeft = 12,
    KneeLeft = 13,
    AnkleLeft = 14,
    FootLeft = 15,
    HipRight = 16,
    KneeRight = 17,
    AnkleRight = 18,
    FootRight = 19,
}

impl JointId {
    pub const COUNT: usize = 20;

    pub const ALL: [JointId; JointId::COUNT] = [
        JointId::HipCenter,
        JointId::Spine,
        JointId::ShoulderCenter,
        JointId::Head,
        JointId::ShoulderLeft,
        JointId::ElbowLeft,
        JointId::WristLeft,
        JointId::HandLeft,
        JointId::ShoulderRight,
        JointId::ElbowRight,
        JointId::WristRight,
        JointId::HandRight,
        JointId::HipLeft,
        JointId::KneeLeft,
        JointId::AnkleLeft,
        JointId::FootLeft,
        JointId::HipRight,
        JointId::KneeRight,
        JointId::AnkleRight,
        JointId::FootRight,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// JointId をキーにした固定長マップ
#[derive(Debug, Clone, PartialEq)]
pub struct JointMap<T> {
    slots: [Option<T>; JointId::COUNT],
}

impl<T> JointMap<T> {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    pub fn get(&self, joint: JointId) -> Option<&T> {
        self.slots[joint as usize].as_ref()
    }

    pub fn insert(&mut self, joint: JointId, value: T) -> Option<T> {
        self.slots[joint as usize].replace(value)
    }

    pub fn contains(&self, joint: JointId) -> bool {
        self.slots[joint as usize].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &T)> {
        JointId::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(&joint, slot)| slot.as_ref().map(|v| (joint, v)))
    }
}

impl<T> Default for JointMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<(JointId, T)> for JointMap<T> {
    fn from_iter<I: IntoIterator<Item = (JointId, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (joint, value) in iter {
            map.insert(joint, value);
        }
        map
    }
}

/// 親セグメントに対する末端セグメントの向き（階層回転）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneOrientation {
    pub start: JointId,
    pub end: JointId,
    pub rotation: Rotation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackingState {
    #[default]
    NotTracked,
    PositionOnly,
    Tracked,
}

/// 1人分の骨格
///
/// ボーンの向きは末端関節をキーにする。
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    pub tracking: TrackingState,
    /// 0.0〜1.0
    pub confidence: f32,
    pub positions: JointMap<Point3>,
    pub bones: JointMap<BoneOrientation>,
}

impl Skeleton {
    pub fn tracked() -> Self {
        Self {
            tracking: TrackingState::Tracked,
            ..Self::default()
        }
    }

    pub fn with_joint(mut self, joint: JointId, position: Point3) -> Self {
        self.positions.insert(joint, position);
        self
    }

    pub fn with_bone(mut self, start: JointId, end: JointId, rotation: Rotation) -> Self {
        self.bones.insert(end, BoneOrientation { start, end, rotation });
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_tracked(&self) -> bool {
        self.tracking == TrackingState::Tracked
    }

    pub fn position(&self, joint: JointId) -> Option<Point3> {
        self.positions.get(joint).copied()
    }

    pub fn bone(&self, end: JointId) -> Option<&BoneOrientation> {
        self.bones.get(end)
    }

    /// センサーからの奥行き（腰中心、なければ背骨）。不明なら最遠扱い
    fn depth_key(&self) -> f32 {
        self.position(JointId::HipCenter)
            .or_else(|| self.position(JointId::Spine))
            .map_or(f32::INFINITY, |p| p.z)
    }
}

impl Default for Skeleton {
    fn default() -> Self {
        Self {
            tracking: TrackingState::NotTracked,
            confidence: 1.0,
            positions: JointMap::new(),
            bones: JointMap::new(),
        }
    }
}

/// 1回の観測（0人以上の骨格）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    pub skeletons: Vec<Skeleton>,
}

impl Frame {
    pub fn new(skeletons: Vec<Skeleton>) -> Self {
        Self { skeletons }
    }

    pub fn single(skeleton: Skeleton) -> Self {
        Self::new(vec![skeleton])
    }

    /// 追跡中の骨格から1体を選ぶ。該当なしなら None
    pub fn select(&self, strategy: SkeletonSelection) -> Option<&Skeleton> {
        let mut tracked = self.skeletons.iter().filter(|s| s.is_tracked());
        match strategy {
            SkeletonSelection::First => tracked.next(),
            SkeletonSelection::Closest => {
                tracked.min_by(|a, b| a.depth_key().total_cmp(&b.depth_key()))
            }
            SkeletonSelection::HighestConfidence => {
                tracked.fold(None::<&Skeleton>, |best, s| match best {
                    Some(b) if b.confidence >= s.confidence => Some(b),
                    _ => Some(s),
                })
            }
        }
    }
}

/// 複数人が映っているときの選択方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonSelection {
    #[default]
    First,
    Closest,
    HighestConfidence,
}
