use serde::{Deserialize, Serialize};
use std::f32::consts::FRAC_PI_2;

use crate::config::MotionConfig;
use crate::math::{angle_at_joint, angle_between, angle_zx, angle_zy, EulerOrder, Point3, VectorExt};
use crate::robot::{JointAngleSet, JointLimitMapper, RobotJointName};
use crate::skeleton::{JointId, Skeleton};

use super::smooth::SmoothedSample;

/// 肘が肩の真下付近にあるとみなす距離（X, Z）
const ELBOW_UNDER_SHOULDER: f32 = 0.1;
/// 肘が腰よりこれ以上後ろなら肩角を更新しない
const ELBOW_BEHIND_HIP: f32 = 0.15;

/// 関節角の算出方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    /// 3点の位置から関節角を求め、肘ヨー・頭はボーンの回転から
    #[default]
    Positional,
    /// 上腕・前腕・体側の自由ベクトルから求める
    Projected,
}

/// 位置から求めた値の扱い
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Extracted {
    /// 変換表を通す
    Raw(f32),
    /// 変換せずクランプのみ
    Direct(f32),
    /// 前回の値を保持
    Hold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    const BOTH: [Side; 2] = [Side::Left, Side::Right];

    fn pick<T>(self, left: T, right: T) -> T {
        match self {
            Side::Left => left,
            Side::Right => right,
        }
    }

    /// shoulder, elbow, wrist, hip
    fn arm(self) -> [JointId; 4] {
        self.pick(
            [JointId::ShoulderLeft, JointId::ElbowLeft, JointId::WristLeft, JointId::HipLeft],
            [JointId::ShoulderRight, JointId::ElbowRight, JointId::WristRight, JointId::HipRight],
        )
    }

    /// hip, knee, ankle, foot
    fn leg(self) -> [JointId; 4] {
        self.pick(
            [JointId::HipLeft, JointId::KneeLeft, JointId::AnkleLeft, JointId::FootLeft],
            [JointId::HipRight, JointId::KneeRight, JointId::AnkleRight, JointId::FootRight],
        )
    }
}

/// 指定した関節がすべて揃っていれば位置を返す
fn points<const N: usize>(sample: &SmoothedSample, ids: [JointId; N]) -> Option<[Point3; N]> {
    let mut out = [Point3::zeros(); N];
    for (slot, id) in out.iter_mut().zip(ids) {
        *slot = sample.get(id)?;
    }
    Some(out)
}

/// 骨格 → ロボット関節角
///
/// ボーン由来の角度はフレームごとに変換表を通して積算し、ウィンドウ終了時に
/// 寄与したフレーム数で平均する。位置由来の角度は平滑化ウィンドウが埋まった
/// ときに1回だけ求める。どちらも得られなかった関節は出力しない。
pub struct PoseExtractor {
    convention: Convention,
    euler_order: EulerOrder,
    track_legs: bool,
    mapper: JointLimitMapper,
    bone_sum: [f32; RobotJointName::COUNT],
    bone_frames: [usize; RobotJointName::COUNT],
    /// 最後に確定した値（Hold 用）
    held: [Option<f32>; RobotJointName::COUNT],
}

impl PoseExtractor {
    pub fn new(convention: Convention, mapper: JointLimitMapper) -> Self {
        Self {
            convention,
            euler_order: EulerOrder::default(),
            track_legs: false,
            mapper,
            bone_sum: [0.0; RobotJointName::COUNT],
            bone_frames: [0; RobotJointName::COUNT],
            held: [None; RobotJointName::COUNT],
        }
    }

    pub fn from_config(config: &MotionConfig, mapper: JointLimitMapper) -> Self {
        Self::new(config.convention, mapper)
            .with_euler_order(config.euler_order)
            .with_legs(config.track_legs)
    }

    pub fn with_euler_order(mut self, order: EulerOrder) -> Self {
        self.euler_order = order;
        self
    }

    pub fn with_legs(mut self, track_legs: bool) -> Self {
        self.track_legs = track_legs;
        self
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    pub fn mapper(&self) -> &JointLimitMapper {
        &self.mapper
    }

    /// 最後に確定した位置由来の角度
    pub fn held(&self, joint: RobotJointName) -> Option<f32> {
        self.held[joint as usize]
    }

    /// このモードで出力しうる関節を対象にした空の集合
    pub fn angle_set(&self) -> JointAngleSet {
        if self.track_legs {
            JointAngleSet::new(&RobotJointName::ALL)
        } else {
            JointAngleSet::new(RobotJointName::UPPER_BODY)
        }
    }

    /// ボーン回転から得る変換前の角度
    pub fn bone_angles(&self, skeleton: &Skeleton) -> Vec<(RobotJointName, f32)> {
        let euler = |end: JointId| skeleton.bone(end).map(|b| b.rotation.to_euler(self.euler_order));

        let mut out = Vec::with_capacity(4);
        if self.convention == Convention::Positional {
            if let Some(e) = euler(JointId::ElbowLeft) {
                out.push((RobotJointName::LElbowYaw, e.z));
            }
            if let Some(e) = euler(JointId::ElbowRight) {
                out.push((RobotJointName::RElbowYaw, e.z));
            }
        }
        if let Some(e) = euler(JointId::Head) {
            out.push((RobotJointName::HeadYaw, e.z));
            out.push((RobotJointName::HeadPitch, e.x));
        }
        out
    }

    /// ストリーミング中の1フレーム分の寄与を足し込む
    pub fn accumulate_bones(&mut self, skeleton: &Skeleton) {
        for (joint, raw) in self.bone_angles(skeleton) {
            self.bone_sum[joint as usize] += self.mapper.map(joint, raw);
            self.bone_frames[joint as usize] += 1;
        }
    }

    /// 積算中のボーン角を捨てる
    pub fn discard_window(&mut self) {
        self.bone_sum = [0.0; RobotJointName::COUNT];
        self.bone_frames = [0; RobotJointName::COUNT];
    }

    /// 平滑化済みの位置から得る角度
    pub fn position_angles(&self, sample: &SmoothedSample) -> Vec<(RobotJointName, Extracted)> {
        let mut out = Vec::with_capacity(RobotJointName::COUNT);
        for side in Side::BOTH {
            match self.convention {
                Convention::Positional => positional_arm(side, sample, &mut out),
                Convention::Projected => projected_arm(side, sample, &mut out),
            }
            if self.track_legs {
                leg(side, sample, &mut out);
            }
        }
        out
    }

    /// ウィンドウ1回分の角度を `angles` に確定させ、ボーンの積算を空にする
    pub fn apply_window(&mut self, sample: &SmoothedSample, angles: &mut JointAngleSet) {
        for joint in RobotJointName::ALL {
            let frames = self.bone_frames[joint as usize];
            if frames > 0 {
                // 範囲内の値の平均なので範囲内に収まる
                angles.set(joint, self.bone_sum[joint as usize] / frames as f32);
            }
        }
        self.discard_window();

        for (joint, value) in self.position_angles(sample) {
            let angle = match value {
                Extracted::Raw(raw) => self.mapper.map(joint, raw),
                Extracted::Direct(v) => self.mapper.clamp(joint, v),
                Extracted::Hold => match self.held[joint as usize] {
                    Some(v) => v,
                    None => continue,
                },
            };
            self.held[joint as usize] = Some(angle);
            angles.set(joint, angle);
        }
    }

    pub fn reset(&mut self) {
        self.discard_window();
        self.held = [None; RobotJointName::COUNT];
    }
}

fn positional_arm(side: Side, sample: &SmoothedSample, out: &mut Vec<(RobotJointName, Extracted)>) {
    let [shoulder_id, elbow_id, wrist_id, hip_id] = side.arm();

    if let Some([shoulder, wrist, elbow]) = points(sample, [shoulder_id, wrist_id, elbow_id]) {
        let raw = angle_at_joint(shoulder, wrist, elbow, false);
        out.push((
            side.pick(RobotJointName::LElbowRoll, RobotJointName::RElbowRoll),
            Extracted::Raw(raw),
        ));
    }

    let Some([shoulder, elbow, hip]) = points(sample, [shoulder_id, elbow_id, hip_id]) else {
        tracing::trace!(?side, "arm joints missing from sample");
        return;
    };

    // 右側は端点を入れ替えて鏡像にする
    let (a, c) = side.pick((hip, elbow), (elbow, hip));
    out.push((
        side.pick(RobotJointName::LShoulderRoll, RobotJointName::RShoulderRoll),
        Extracted::Raw(angle_zx(a, shoulder, c)),
    ));

    if let Some(spine) = sample.get(JointId::Spine) {
        let pitch = side.pick(RobotJointName::LShoulderPitch, RobotJointName::RShoulderPitch);
        if elbow.z < spine.z || elbow.y >= spine.y {
            let (a, c) = side.pick((elbow, hip), (hip, elbow));
            out.push((pitch, Extracted::Raw(angle_zy(a, shoulder, c))));
        } else {
            out.push((pitch, Extracted::Direct(FRAC_PI_2)));
        }
    }
}

fn projected_arm(side: Side, sample: &SmoothedSample, out: &mut Vec<(RobotJointName, Extracted)>) {
    let Some([shoulder, elbow, wrist, hip]) = points(sample, side.arm()) else {
        tracing::trace!(?side, "arm joints missing from sample");
        return;
    };
    let upper = shoulder - elbow;
    let lower = wrist - elbow;
    let torso = shoulder - hip;

    let roll = side.pick(RobotJointName::LShoulderRoll, RobotJointName::RShoulderRoll);
    let pitch = side.pick(RobotJointName::LShoulderPitch, RobotJointName::RShoulderPitch);
    if hip.z + ELBOW_BEHIND_HIP > elbow.z {
        let under_shoulder = (shoulder.z - elbow.z).abs() < ELBOW_UNDER_SHOULDER
            && (shoulder.x - elbow.x).abs() < ELBOW_UNDER_SHOULDER;
        let raw_roll = if under_shoulder {
            angle_between(upper.project_xy(), torso.project_xy())
        } else {
            angle_between(upper.project_zx(), torso.project_zx())
        };
        out.push((roll, Extracted::Raw(raw_roll)));
        out.push((
            pitch,
            Extracted::Raw(angle_between(upper.project_zy(), torso.project_zy())),
        ));
    } else {
        out.push((roll, Extracted::Hold));
        out.push((pitch, Extracted::Hold));
    }

    out.push((
        side.pick(RobotJointName::LElbowRoll, RobotJointName::RElbowRoll),
        Extracted::Raw(angle_between(upper, lower)),
    ));

    if let Some(hip_center) = sample.get(JointId::HipCenter) {
        let reference = upper.cross(&(shoulder - hip_center));
        let bend = upper.cross(&lower);
        out.push((
            side.pick(RobotJointName::LElbowYaw, RobotJointName::RElbowYaw),
            Extracted::Raw(angle_between(reference, bend)),
        ));
    }
}

fn leg(side: Side, sample: &SmoothedSample, out: &mut Vec<(RobotJointName, Extracted)>) {
    let Some([hip, knee, ankle, foot]) = points(sample, side.leg()) else {
        tracing::trace!(?side, "leg joints missing from sample");
        return;
    };

    out.push((
        side.pick(RobotJointName::LKneePitch, RobotJointName::RKneePitch),
        Extracted::Raw(angle_between(hip - knee, ankle - knee)),
    ));

    if let Some([hip_center, shoulder_center]) =
        points(sample, [JointId::HipCenter, JointId::ShoulderCenter])
    {
        let torso_down = hip_center - shoulder_center;
        let thigh = knee - hip;

        // 膝がセンサー側（-Z）に出ていれば前屈
        let flexion = angle_between(torso_down.project_zy(), thigh.project_zy());
        let hip_pitch = if knee.z < hip.z { -flexion } else { flexion };
        out.push((
            side.pick(RobotJointName::LHipPitch, RobotJointName::RHipPitch),
            Extracted::Raw(hip_pitch),
        ));

        // 膝が腰中心から離れる向きなら外転
        let spread = angle_between(torso_down.project_xy(), thigh.project_xy());
        let outward = (knee.x - hip.x) * (hip.x - hip_center.x) >= 0.0;
        out.push((
            side.pick(RobotJointName::LHipRoll, RobotJointName::RHipRoll),
            Extracted::Raw(if outward { spread } else { -spread }),
        ));
    }

    let shin = knee - ankle;
    let instep = foot - ankle;
    out.push((
        side.pick(RobotJointName::LAnklePitch, RobotJointName::RAnklePitch),
        Extracted::Raw(angle_between(shin.project_zy(), instep.project_zy())),
    ));
}
