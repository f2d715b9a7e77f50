use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::RetargetError;
use crate::math::EulerOrder;
use crate::robot::RobotJointName;
use crate::skeleton::SkeletonSelection;
use crate::tracker::Convention;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub smooth: SmoothConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub locomotion: LocomotionConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    /// 関節ごとの変換表の上書き
    #[serde(default)]
    pub limits: Vec<LimitOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CalibrationConfig {
    /// 基準姿勢の平均に使うフレーム数
    #[serde(default = "default_calibration_window")]
    pub window: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmoothConfig {
    /// 1回の角度計算に使うフレーム数
    #[serde(default = "default_smooth_window")]
    pub window: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MotionConfig {
    /// 関節指令の速度（最大速度比 0〜1）
    #[serde(default = "default_speed_fraction")]
    pub speed_fraction: f32,
    #[serde(default)]
    pub convention: Convention,
    /// ボーン回転行列の分解順
    #[serde(default)]
    pub euler_order: EulerOrder,
    /// 脚の関節角も出力するか
    #[serde(default)]
    pub track_legs: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocomotionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 足が「動いた」とみなす水平方向の差（0 で厳密比較）
    #[serde(default = "default_foot_step_tolerance")]
    pub foot_step_tolerance: f32,
    /// 歩行指令の速度（最大速度比 0〜1）
    #[serde(default = "default_step_speed_fraction")]
    pub step_speed_fraction: f32,
    /// 歩幅をロボットの許容範囲に丸めるか
    #[serde(default)]
    pub saturate_steps: bool,
}

#[derive(Debug, Default, Deserialize, Clone)]
pub struct SelectionConfig {
    #[serde(default)]
    pub strategy: SkeletonSelection,
}

/// `[[limits]]` の1行。省略した項目は既定表の値
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LimitOverride {
    pub joint: RobotJointName,
    #[serde(default)]
    pub scale: Option<f32>,
    #[serde(default)]
    pub offset: Option<f32>,
    #[serde(default)]
    pub min: Option<f32>,
    #[serde(default)]
    pub max: Option<f32>,
}

fn default_calibration_window() -> usize { 5 }
fn default_smooth_window() -> usize { 20 }
fn default_speed_fraction() -> f32 { 0.1 }
fn default_true() -> bool { true }
fn default_foot_step_tolerance() -> f32 { 0.1 }
fn default_step_speed_fraction() -> f32 { 0.5 }

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            window: default_calibration_window(),
        }
    }
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            window: default_smooth_window(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_fraction: default_speed_fraction(),
            convention: Convention::default(),
            euler_order: EulerOrder::default(),
            track_legs: false,
        }
    }
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            foot_step_tolerance: default_foot_step_tolerance(),
            step_speed_fraction: default_step_speed_fraction(),
            saturate_steps: false,
        }
    }
}

fn check_fraction(name: &str, value: f32) -> crate::error::Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(RetargetError::InvalidConfiguration(format!(
            "{name} must be in [0, 1], got {value}"
        )))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// 読めなければ既定値で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                let error = format!("{e:#}");
                tracing::warn!(path = %path.display(), %error, "using default config");
                Self::default()
            }
        }
    }

    /// ウィンドウ0、範囲外の速度比、負の許容差を拒否する
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.calibration.window == 0 {
            return Err(RetargetError::InvalidConfiguration(
                "calibration.window must be at least 1".into(),
            ));
        }
        if self.smooth.window == 0 {
            return Err(RetargetError::InvalidConfiguration(
                "smooth.window must be at least 1".into(),
            ));
        }
        check_fraction("motion.speed_fraction", self.motion.speed_fraction)?;
        check_fraction("locomotion.step_speed_fraction", self.locomotion.step_speed_fraction)?;
        let tolerance = self.locomotion.foot_step_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(RetargetError::InvalidConfiguration(format!(
                "locomotion.foot_step_tolerance must be a non-negative number, got {tolerance}"
            )));
        }
        Ok(())
    }
}
