use crate::actuator::Actuator;
use crate::config::Config;
use crate::error::{Result, RetargetError};
use crate::robot::{JointAngleSet, JointLimitMapper, LocomotionGate, StepCommand};
use crate::skeleton::{Frame, JointId, Skeleton, SkeletonSelection};
use crate::source::{FrameBus, Subscription};
use crate::tracker::{CalibrationBaseline, Calibrator, PoseExtractor, SmoothedSample, Smoother};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    AwaitingCalibration,
    Streaming,
}

/// 1フレーム処理した結果
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// 追跡中の骨格がない
    Dropped,
    Calibrating { collected: usize },
    /// このフレームでキャリブレーション完了
    Calibrated,
    Smoothing { collected: usize },
    /// 関節角（と歩行指令）を送った
    Dispatched { step: Option<StepCommand> },
}

/// キャリブレーション → 平滑化 → 角度抽出 → 変換 → 送信
pub struct RetargetingPipeline<A: Actuator> {
    state: PipelineState,
    selection: SkeletonSelection,
    calibrator: Calibrator,
    smoother: Smoother,
    extractor: PoseExtractor,
    gate: LocomotionGate,
    locomotion_enabled: bool,
    speed_fraction: f32,
    actuator: A,
}

impl<A: Actuator> RetargetingPipeline<A> {
    pub fn new(config: &Config, actuator: A) -> Result<Self> {
        config.validate()?;
        let mapper = JointLimitMapper::new(&config.limits)?;
        let extractor = PoseExtractor::from_config(&config.motion, mapper);
        Ok(Self {
            state: PipelineState::AwaitingCalibration,
            selection: config.selection.strategy,
            calibrator: Calibrator::new(config.calibration.window)?,
            smoother: Smoother::from_config(&config.smooth)?,
            extractor,
            gate: LocomotionGate::from_config(&config.locomotion),
            locomotion_enabled: config.locomotion.enabled,
            speed_fraction: config.motion.speed_fraction,
            actuator,
        })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.calibrator.baseline()
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn actuator_mut(&mut self) -> &mut A {
        &mut self.actuator
    }

    pub fn into_actuator(self) -> A {
        self.actuator
    }

    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome> {
        let Some(skeleton) = frame.select(self.selection) else {
            tracing::debug!(skeletons = frame.skeletons.len(), "dropping frame without tracked skeleton");
            return Ok(FrameOutcome::Dropped);
        };

        match self.state {
            PipelineState::AwaitingCalibration => {
                if self.calibrator.add(skeleton) {
                    self.state = PipelineState::Streaming;
                    tracing::info!(window = self.calibrator.window(), "calibration complete");
                    Ok(FrameOutcome::Calibrated)
                } else {
                    Ok(FrameOutcome::Calibrating {
                        collected: self.calibrator.collected(),
                    })
                }
            }
            PipelineState::Streaming => self.stream(skeleton),
        }
    }

    /// 歩行判定が失敗したサイクルでは関節角を確定させない
    fn stream(&mut self, skeleton: &Skeleton) -> Result<FrameOutcome> {
        self.extractor.accumulate_bones(skeleton);
        let Some(sample) = self.smoother.apply(skeleton) else {
            return Ok(FrameOutcome::Smoothing {
                collected: self.smoother.collected(),
            });
        };

        let step = match self.evaluate_step(&sample) {
            Ok(step) => step,
            Err(e) => {
                self.extractor.discard_window();
                return Err(e);
            }
        };

        let mut angles = self.extractor.angle_set();
        self.extractor.apply_window(&sample, &mut angles);
        self.dispatch(&angles, step.as_ref())?;
        tracing::debug!(joints = angles.len(), stepped = step.is_some(), "dispatched joint angles");
        Ok(FrameOutcome::Dispatched { step })
    }

    fn evaluate_step(&mut self, sample: &SmoothedSample) -> Result<Option<StepCommand>> {
        if !self.locomotion_enabled {
            return Ok(None);
        }
        if !self.gate.is_seeded() {
            if let Some(baseline) = self.calibrator.baseline() {
                let left = baseline.get(JointId::FootLeft)?;
                let right = baseline.get(JointId::FootRight)?;
                self.gate.seed(left, right);
            }
        }
        match (sample.get(JointId::FootLeft), sample.get(JointId::FootRight)) {
            (Some(left), Some(right)) => Ok(self.gate.evaluate(left, right)),
            _ => {
                tracing::trace!("feet missing from smoothed sample");
                Ok(None)
            }
        }
    }

    fn dispatch(&mut self, angles: &JointAngleSet, step: Option<&StepCommand>) -> Result<()> {
        self.actuator
            .set_joint_angles(angles, self.speed_fraction)
            .map_err(RetargetError::Actuator)?;
        if let Some(step) = step {
            self.actuator
                .set_foot_steps(step)
                .map_err(RetargetError::Actuator)?;
        }
        Ok(())
    }

    /// 基準姿勢と積算をすべて捨ててキャリブレーション待ちへ戻す
    pub fn recalibrate(&mut self) {
        self.calibrator.reset();
        self.smoother.reset();
        self.extractor.reset();
        self.gate.reset();
        self.state = PipelineState::AwaitingCalibration;
        tracing::info!("recalibration requested");
    }
}

/// 購読1本とパイプラインを束ねて、1フレームずつ順に処理する
pub struct Session<A: Actuator> {
    pipeline: RetargetingPipeline<A>,
    subscription: Option<Subscription>,
}

impl<A: Actuator> Session<A> {
    pub fn new(pipeline: RetargetingPipeline<A>, bus: &FrameBus) -> Self {
        Self {
            pipeline,
            subscription: Some(bus.subscribe()),
        }
    }

    pub fn pipeline(&self) -> &RetargetingPipeline<A> {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut RetargetingPipeline<A> {
        &mut self.pipeline
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_some()
    }

    /// 配信元がなくなるまで処理する。処理したフレーム数を返す
    ///
    /// 最初のエラーで止まる。未処理のフレームは購読に残り、次の `run` か
    /// `drain` で続きから処理される。
    pub fn run(&mut self) -> Result<usize> {
        let mut processed = 0;
        while let Some(frame) = self.subscription.as_ref().and_then(|s| s.recv()) {
            self.pipeline.process_frame(&frame)?;
            processed += 1;
        }
        Ok(processed)
    }

    /// 溜まっている分だけ処理する。エラー時の扱いは `run` と同じ
    pub fn drain(&mut self) -> Result<usize> {
        let mut processed = 0;
        while let Some(frame) = self.subscription.as_ref().and_then(|s| s.try_recv()) {
            self.pipeline.process_frame(&frame)?;
            processed += 1;
        }
        Ok(processed)
    }

    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    pub fn into_pipeline(mut self) -> RetargetingPipeline<A> {
        self.close();
        self.pipeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::RecordingActuator;
    use crate::math::{Point3, Rotation, Vec3};
    use crate::robot::{Leg, RobotJointName};
    use crate::skeleton::TrackingState;
    use crate::tracker::Convention;
    use nalgebra::{Rotation3, UnitQuaternion};

    /// 左腕を真下に伸ばした全身。`left_foot_z` で左足の前後位置
    fn body(left_foot_z: f32) -> Skeleton {
        let joints = [
            (JointId::HipCenter, Point3::new(0.0, 0.0, 2.0)),
            (JointId::Spine, Point3::new(0.0, 0.2, 2.0)),
            (JointId::ShoulderCenter, Point3::new(0.0, 0.5, 2.0)),
            (JointId::Head, Point3::new(0.0, 0.7, 2.0)),
            (JointId::ShoulderLeft, Point3::new(-0.2, 0.5, 2.0)),
            (JointId::ElbowLeft, Point3::new(-0.2, 0.25, 2.0)),
            (JointId::WristLeft, Point3::new(-0.2, 0.0, 2.0)),
            (JointId::ShoulderRight, Point3::new(0.2, 0.5, 2.0)),
            (JointId::ElbowRight, Point3::new(0.35, 0.3, 1.9)),
            (JointId::WristRight, Point3::new(0.4, 0.4, 1.7)),
            (JointId::HipLeft, Point3::new(-0.1, 0.0, 2.0)),
            (JointId::HipRight, Point3::new(0.1, 0.0, 2.0)),
            (JointId::FootLeft, Point3::new(-0.1, -0.85, left_foot_z)),
            (JointId::FootRight, Point3::new(0.1, -0.85, 2.0)),
        ];
        joints
            .into_iter()
            .fold(Skeleton::tracked(), |s, (j, p)| s.with_joint(j, p))
    }

    fn without(skeleton: Skeleton, joint: JointId) -> Skeleton {
        let mut out = skeleton;
        out.positions = out
            .positions
            .iter()
            .filter(|(j, _)| *j != joint)
            .map(|(j, p)| (j, *p))
            .collect();
        out
    }

    fn assert_within_limits(angles: &JointAngleSet) {
        let mapper = JointLimitMapper::default();
        for (joint, angle) in angles.iter() {
            let limit = mapper.limit(joint);
            assert!(angle >= limit.min && angle <= limit.max, "{} = {}", joint, angle);
        }
    }

    fn config(smooth_window: usize) -> Config {
        let mut config = Config::default();
        config.smooth.window = smooth_window;
        config
    }

    fn calibrated(config: &Config) -> RetargetingPipeline<RecordingActuator> {
        let mut p = RetargetingPipeline::new(config, RecordingActuator::new()).unwrap();
        for _ in 0..config.calibration.window {
            p.process_frame(&Frame::single(body(2.0))).unwrap();
        }
        assert_eq!(p.state(), PipelineState::Streaming);
        p
    }

    #[test]
    fn test_transitions_exactly_on_fifth_frame() {
        let mut p = RetargetingPipeline::new(&config(2), RecordingActuator::new()).unwrap();
        for i in 1..5 {
            let outcome = p.process_frame(&Frame::single(body(2.0))).unwrap();
            assert_eq!(outcome, FrameOutcome::Calibrating { collected: i });
            assert_eq!(p.state(), PipelineState::AwaitingCalibration);
        }
        let outcome = p.process_frame(&Frame::single(body(2.0))).unwrap();
        assert_eq!(outcome, FrameOutcome::Calibrated);
        assert_eq!(p.state(), PipelineState::Streaming);
        let baseline = p.baseline().unwrap();
        let foot = baseline.get(JointId::FootLeft).unwrap();
        assert!((foot.z - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_untracked_frames_are_dropped() {
        let mut p = RetargetingPipeline::new(&config(2), RecordingActuator::new()).unwrap();
        let mut ghost = body(2.0);
        ghost.tracking = TrackingState::PositionOnly;
        assert_eq!(p.process_frame(&Frame::single(ghost)).unwrap(), FrameOutcome::Dropped);
        assert_eq!(p.process_frame(&Frame::default()).unwrap(), FrameOutcome::Dropped);
        assert_eq!(
            p.process_frame(&Frame::single(body(2.0))).unwrap(),
            FrameOutcome::Calibrating { collected: 1 }
        );
    }

    #[test]
    fn test_dispatch_once_per_window() {
        let mut p = calibrated(&config(3));
        let frame = Frame::single(body(2.0));
        assert_eq!(p.process_frame(&frame).unwrap(), FrameOutcome::Smoothing { collected: 1 });
        assert_eq!(p.process_frame(&frame).unwrap(), FrameOutcome::Smoothing { collected: 2 });
        assert_eq!(p.process_frame(&frame).unwrap(), FrameOutcome::Dispatched { step: None });
        let rec = p.actuator();
        assert_eq!(rec.joint_batches.len(), 1);
        assert_eq!(rec.joint_batches[0].1, 0.1);
        assert!(rec.steps.is_empty());
    }

    #[test]
    fn test_collinear_left_arm_elbow_roll() {
        let mut p = calibrated(&config(1));
        p.process_frame(&Frame::single(body(2.0))).unwrap();
        let angles = p.actuator().last_angles().unwrap();
        // 抽出角0 → -(π - 0) は下限で飽和
        assert_eq!(angles.get(RobotJointName::LElbowRoll), Some(-1.5446));
        assert_within_limits(angles);
        // ボーンのない骨格では肘ヨー・頭は送らない
        assert_eq!(angles.get(RobotJointName::HeadYaw), None);
        assert_eq!(angles.get(RobotJointName::LElbowYaw), None);
    }

    #[test]
    fn test_missing_wrist_omits_elbow_roll() {
        let mut p = calibrated(&config(1));
        p.process_frame(&Frame::single(without(body(2.0), JointId::WristRight)))
            .unwrap();
        let angles = p.actuator().last_angles().unwrap();
        assert_eq!(angles.get(RobotJointName::RElbowRoll), None);
        assert!(angles.get(RobotJointName::LElbowRoll).is_some());
        assert!(angles.get(RobotJointName::RShoulderRoll).is_some());
        assert_within_limits(angles);
    }

    #[test]
    fn test_projected_hold_without_history_is_omitted() {
        let mut cfg = config(1);
        cfg.motion.convention = Convention::Projected;
        let mut p = calibrated(&cfg);
        // 肘が腰より大きく後ろ
        let reaching_back = body(2.0).with_joint(JointId::ElbowLeft, Point3::new(-0.2, 0.3, 2.5));
        p.process_frame(&Frame::single(reaching_back)).unwrap();
        let angles = p.actuator().last_angles().unwrap();
        assert_eq!(angles.get(RobotJointName::LShoulderRoll), None);
        assert_eq!(angles.get(RobotJointName::LShoulderPitch), None);
        assert_within_limits(angles);
    }

    #[test]
    fn test_quaternion_head_bone_dispatches_like_matrix() {
        let cfg = config(2);
        let head_yaw = |rotation: Rotation| {
            let mut p = calibrated(&cfg);
            let frame = Frame::single(body(2.0).with_bone(
                JointId::ShoulderCenter,
                JointId::Head,
                rotation,
            ));
            p.process_frame(&frame).unwrap();
            p.process_frame(&frame).unwrap();
            let angles = p.actuator().last_angles().unwrap().clone();
            (
                angles.get(RobotJointName::HeadYaw).unwrap(),
                angles.get(RobotJointName::HeadPitch).unwrap(),
            )
        };

        let matrix = Rotation3::from_axis_angle(&Vec3::z_axis(), 0.2).into_inner();
        let quaternion = UnitQuaternion::from_axis_angle(&Vec3::z_axis(), 0.2).into_inner();
        let (yaw_m, pitch_m) = head_yaw(Rotation::Matrix(matrix));
        let (yaw_q, pitch_q) = head_yaw(Rotation::Quaternion(quaternion));
        assert!((yaw_q - 0.2).abs() < 1e-4, "HeadYaw = {}", yaw_q);
        assert!(pitch_q.abs() < 1e-4, "HeadPitch = {}", pitch_q);
        assert!((yaw_m - yaw_q).abs() < 1e-4);
        assert!((pitch_m - pitch_q).abs() < 1e-4);
    }

    #[test]
    fn test_foot_missing_from_some_frames_does_not_step() {
        let mut p = calibrated(&config(4));
        let frames = [
            body(2.0),
            without(body(2.0), JointId::FootLeft),
            without(body(2.0), JointId::FootLeft),
            body(2.0),
        ];
        let mut outcome = FrameOutcome::Dropped;
        for skeleton in frames {
            outcome = p.process_frame(&Frame::single(skeleton)).unwrap();
        }
        assert_eq!(outcome, FrameOutcome::Dispatched { step: None });
        assert!(p.actuator().steps.is_empty());
    }

    #[test]
    fn test_deterministic_after_recalibrate() {
        let frames: Vec<Frame> = (0..4).map(|i| Frame::single(body(2.0 - i as f32 * 0.01))).collect();
        let run = |p: &mut RetargetingPipeline<RecordingActuator>| {
            for _ in 0..5 {
                p.process_frame(&Frame::single(body(2.0))).unwrap();
            }
            for f in &frames {
                p.process_frame(f).unwrap();
            }
        };

        let mut p = RetargetingPipeline::new(&config(4), RecordingActuator::new()).unwrap();
        run(&mut p);
        p.recalibrate();
        assert_eq!(p.state(), PipelineState::AwaitingCalibration);
        run(&mut p);

        let rec = p.actuator();
        assert_eq!(rec.joint_batches.len(), 2);
        assert_eq!(rec.joint_batches[0], rec.joint_batches[1]);
    }

    #[test]
    fn test_foot_movement_emits_single_step() {
        let mut p = calibrated(&config(2));
        let moved = Frame::single(body(1.5));
        p.process_frame(&moved).unwrap();
        let outcome = p.process_frame(&moved).unwrap();
        let FrameOutcome::Dispatched { step: Some(step) } = outcome else {
            panic!("expected a step, got {:?}", outcome);
        };
        assert_eq!(step.leg, Leg::Left);
        assert!((step.x - (-0.05)).abs() < 1e-5);
        assert_eq!(p.actuator().steps.len(), 1);

        // 同じ位置のままなら歩かない
        p.process_frame(&moved).unwrap();
        p.process_frame(&moved).unwrap();
        assert_eq!(p.actuator().steps.len(), 1);
        assert_eq!(p.actuator().joint_batches.len(), 2);
    }

    #[test]
    fn test_locomotion_disabled() {
        let mut cfg = config(1);
        cfg.locomotion.enabled = false;
        let mut p = calibrated(&cfg);
        p.process_frame(&Frame::single(body(1.0))).unwrap();
        assert!(p.actuator().steps.is_empty());
    }

    #[test]
    fn test_missing_foot_in_baseline() {
        let mut cfg = config(1);
        cfg.motion.convention = Convention::Projected;
        let mut p = RetargetingPipeline::new(&cfg, RecordingActuator::new()).unwrap();
        let footless = without(body(2.0), JointId::FootLeft);
        for _ in 0..5 {
            p.process_frame(&Frame::single(footless.clone())).unwrap();
        }
        let err = p.process_frame(&Frame::single(body(2.0))).unwrap_err();
        assert!(matches!(err, RetargetError::MissingCalibrationEntry(JointId::FootLeft)));
        assert!(p.actuator().joint_batches.is_empty());
        // 失敗したサイクルの角度は Hold の基準にも残らない
        assert_eq!(p.extractor.held(RobotJointName::LShoulderRoll), None);
    }

    struct FailingActuator;

    impl Actuator for FailingActuator {
        fn set_joint_angles(&mut self, _: &JointAngleSet, _: f32) -> anyhow::Result<()> {
            anyhow::bail!("robot unreachable")
        }

        fn set_foot_steps(&mut self, _: &StepCommand) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_actuator_error_surfaces() {
        let mut p = RetargetingPipeline::new(&config(1), FailingActuator).unwrap();
        for _ in 0..5 {
            p.process_frame(&Frame::single(body(2.0))).unwrap();
        }
        let err = p.process_frame(&Frame::single(body(2.0))).unwrap_err();
        assert!(matches!(err, RetargetError::Actuator(_)));
    }

    /// 最初の関節指令だけ失敗する
    #[derive(Default)]
    struct FlakyActuator {
        failed: bool,
        batches: usize,
    }

    impl Actuator for FlakyActuator {
        fn set_joint_angles(&mut self, _: &JointAngleSet, _: f32) -> anyhow::Result<()> {
            if !self.failed {
                self.failed = true;
                anyhow::bail!("transient link error");
            }
            self.batches += 1;
            Ok(())
        }

        fn set_foot_steps(&mut self, _: &StepCommand) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_session_stops_on_error_and_resumes() {
        let bus = FrameBus::new();
        let pipeline = RetargetingPipeline::new(&config(1), FlakyActuator::default()).unwrap();
        let mut session = Session::new(pipeline, &bus);
        for _ in 0..8 {
            bus.publish(Frame::single(body(2.0)));
        }
        assert!(matches!(session.drain(), Err(RetargetError::Actuator(_))));
        assert_eq!(session.pipeline().actuator().batches, 0);

        // 残りの2フレームは購読に残っている
        assert_eq!(session.drain().unwrap(), 2);
        assert_eq!(session.pipeline().actuator().batches, 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = config(1);
        cfg.calibration.window = 0;
        assert!(matches!(
            RetargetingPipeline::new(&cfg, RecordingActuator::new()),
            Err(RetargetError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_session_drain_and_run() {
        let bus = FrameBus::new();
        let pipeline = RetargetingPipeline::new(&config(1), RecordingActuator::new()).unwrap();
        let mut session = Session::new(pipeline, &bus);
        for _ in 0..6 {
            bus.publish(Frame::single(body(2.0)));
        }
        assert_eq!(session.drain().unwrap(), 6);
        assert_eq!(session.pipeline().state(), PipelineState::Streaming);
        assert_eq!(session.pipeline().actuator().joint_batches.len(), 1);

        bus.publish(Frame::single(body(2.0)));
        drop(bus);
        assert_eq!(session.run().unwrap(), 1);

        session.close();
        assert!(!session.is_open());
        let pipeline = session.into_pipeline();
        assert_eq!(pipeline.into_actuator().joint_batches.len(), 2);
    }
}
