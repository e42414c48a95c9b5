use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::MocapError;
use crate::perception::Job;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub mocap: MocapConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub mapper: MapperConfig,
    #[serde(default)]
    pub retarget: RetargetConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

/// 認識ジョブの有効/無効とレート。更新時は丸ごと差し替える
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MocapConfig {
    #[serde(default)]
    pub enabled: JobFlags,
    #[serde(default)]
    pub hz: JobRates,
    /// 現状 1 のみ対応
    #[serde(default = "default_max_people")]
    pub max_people: u32,
}

fn default_max_people() -> u32 { 1 }

impl Default for MocapConfig {
    fn default() -> Self {
        Self {
            enabled: JobFlags::default(),
            hz: JobRates::default(),
            max_people: default_max_people(),
        }
    }
}

impl MocapConfig {
    pub fn validate(&self) -> Result<(), MocapError> {
        if self.max_people != 1 {
            return Err(MocapError::InvalidConfig(format!(
                "max_people must be 1 (got {})",
                self.max_people
            )));
        }
        for job in Job::ALL {
            if self.hz.get(job).is_nan() {
                return Err(MocapError::InvalidConfig(format!("hz.{} is NaN", job.name())));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct JobFlags {
    #[serde(default = "default_pose_enabled")]
    pub pose: bool,
    #[serde(default)]
    pub hands: bool,
    #[serde(default)]
    pub face: bool,
}

fn default_pose_enabled() -> bool { true }

impl Default for JobFlags {
    fn default() -> Self {
        Self {
            pose: default_pose_enabled(),
            hands: false,
            face: false,
        }
    }
}

impl JobFlags {
    pub fn get(&self, job: Job) -> bool {
        match job {
            Job::Pose => self.pose,
            Job::Hands => self.hands,
            Job::Face => self.face,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct JobRates {
    #[serde(default = "default_pose_hz")]
    pub pose: f64,
    #[serde(default = "default_hands_hz")]
    pub hands: f64,
    #[serde(default = "default_face_hz")]
    pub face: f64,
}

fn default_pose_hz() -> f64 { 30.0 }
fn default_hands_hz() -> f64 { 15.0 }
fn default_face_hz() -> f64 { 10.0 }

impl Default for JobRates {
    fn default() -> Self {
        Self {
            pose: default_pose_hz(),
            hands: default_hands_hz(),
            face: default_face_hz(),
        }
    }
}

impl JobRates {
    pub fn get(&self, job: Job) -> f64 {
        match job {
            Job::Pose => self.pose,
            Job::Hands => self.hands,
            Job::Face => self.face,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// ティック周期（ディスプレイのリフレッシュ相当）
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,
}

fn default_tick_hz() -> f64 { 60.0 }

/// これを超えるとティック周期が 1ms を切る
pub const MAX_TICK_HZ: f64 = 1000.0;

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), MocapError> {
        if !self.tick_hz.is_finite() || self.tick_hz <= 0.0 || self.tick_hz > MAX_TICK_HZ {
            return Err(MocapError::InvalidConfig(format!(
                "engine.tick_hz must be in (0, {}] (got {})",
                MAX_TICK_HZ, self.tick_hz
            )));
        }
        Ok(())
    }

    /// ティック間隔。`validate` 済みであること
    pub fn cadence(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MapperConfig {
    #[serde(default = "default_min_visibility")]
    pub min_visibility: f32,
    /// 0 より大きい場合のみ presence を検査
    #[serde(default)]
    pub min_presence: f32,
    /// 軸ごとの符号 (±1)。既定は MediaPipe ワールド座標 (y下向き, z手前が負) → y上, z前
    #[serde(default = "default_axis_remap")]
    pub axis_remap: [f32; 3],
    /// 脚ポールと方向の |dot| がこれを超えたらポールを捨てる
    #[serde(default = "default_leg_pole_max_dot")]
    pub leg_pole_max_dot: f32,
}

fn default_min_visibility() -> f32 { 0.5 }
fn default_axis_remap() -> [f32; 3] { [1.0, -1.0, -1.0] }
fn default_leg_pole_max_dot() -> f32 { 0.85 }

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            min_visibility: default_min_visibility(),
            min_presence: 0.0,
            axis_remap: default_axis_remap(),
            leg_pole_max_dot: default_leg_pole_max_dot(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RetargetConfig {
    /// slerp 係数。1 以上で平滑化なし
    #[serde(default = "default_alpha")]
    pub alpha: f32,
    /// 前回採用方向との dot がこれ未満なら反転として棄却（-0.2 ≈ 101°）
    #[serde(default = "default_min_dot")]
    pub min_dot_before_reject: f32,
    #[serde(default = "default_min_dot")]
    pub min_pole_dot_before_reject: f32,
}

fn default_alpha() -> f32 { 0.35 }
fn default_min_dot() -> f32 { -0.2 }

impl Default for RetargetConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            min_dot_before_reject: default_min_dot(),
            min_pole_dot_before_reject: default_min_dot(),
        }
    }
}

/// デモバイナリ用
#[derive(Debug, Deserialize, Clone)]
pub struct DemoConfig {
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,
    /// 擬似バックエンドの推論時間
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,
    #[serde(default = "default_script_frames")]
    pub script_frames: usize,
}

fn default_duration_secs() -> f64 { 3.0 }
fn default_latency_ms() -> u64 { 12 }
fn default_script_frames() -> usize { 90 }

/// デモの最長実行時間 (1日)
pub const MAX_DURATION_SECS: f64 = 86_400.0;

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            latency_ms: default_latency_ms(),
            script_frames: default_script_frames(),
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<(), MocapError> {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 || self.duration_secs > MAX_DURATION_SECS {
            return Err(MocapError::InvalidConfig(format!(
                "demo.duration_secs must be in (0, {}] (got {})",
                MAX_DURATION_SECS, self.duration_secs
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs)
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), MocapError> {
        self.mocap.validate()?;
        self.engine.validate()?;
        self.demo.validate()
    }

    /// ファイルが無い・壊れている場合は既定値
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{:#}; using defaults", e);
                Self::default()
            }
        }
    }
}
