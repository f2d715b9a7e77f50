use thiserror::Error;

use crate::skeleton::JointId;

/// リターゲット処理で表に出るエラー
///
/// ゼロ長ベクトル（DegenerateGeometry）と未追跡フレーム（UntrackedFrame）は
/// その場で回復するためここには現れない。
#[derive(Debug, Error)]
pub enum RetargetError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("calibration baseline has no entry for {0:?}")]
    MissingCalibrationEntry(JointId),

    #[error(transparent)]
    Actuator(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RetargetError>;
