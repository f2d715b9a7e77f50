pub mod joint;
pub mod step;

pub use joint::{JointAngleSet, JointLimit, JointLimitMapper, RobotJointName, NAO_H25_V1};
pub use step::{convert_step_x, convert_step_y, Leg, LocomotionGate, StepCommand};
