pub mod actuator;
pub mod config;
pub mod error;
pub mod math;
pub mod pipeline;
pub mod robot;
pub mod skeleton;
pub mod source;
pub mod tracker;

pub use actuator::{Actuator, RecordingActuator};
pub use config::Config;
pub use error::{Result, RetargetError};
pub use pipeline::{FrameOutcome, PipelineState, RetargetingPipeline, Session};
pub use robot::{JointAngleSet, RobotJointName, StepCommand};
pub use skeleton::{Frame, JointId, Skeleton, SkeletonSelection};
pub use source::{FrameBus, Subscription};
