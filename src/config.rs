//! Engine configuration
//!
//! Every threshold the engine applies lives here. The two stability policies
//! and the warm-up behavior are explicit choices rather than hard-coded.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::error::EngineError;

/// Default capacity of the smoothing history
pub const DEFAULT_SMOOTHING_WINDOW: usize = 15;

/// Largest accepted smoothing history
pub const MAX_SMOOTHING_WINDOW: usize = 1_024;

/// Largest accepted calibration sample bound
pub const MAX_CALIBRATION_SAMPLES: usize = 100_000;

/// Default webcam channel admission threshold
pub const DEFAULT_WEBCAM_ADMISSION_THRESHOLD: f64 = 0.75;

/// Stability gate policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePolicy {
    /// Low bar, short cooldown: emits quickly, tolerates some churn
    Responsive,
    /// Requires consecutive agreement and a higher bar, longer cooldown
    Conservative,
}

impl GatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePolicy::Responsive => "responsive",
            GatePolicy::Conservative => "conservative",
        }
    }
}

impl FromStr for GatePolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "responsive" => Ok(GatePolicy::Responsive),
            "conservative" => Ok(GatePolicy::Conservative),
            other => Err(EngineError::InvalidConfig(format!(
                "unknown gate policy '{other}' (expected responsive or conservative)"
            ))),
        }
    }
}

/// Calibration bounds; whichever is hit first completes calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub max_duration_ms: i64,
    pub max_samples: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            max_duration_ms: 120_000,
            max_samples: 300,
        }
    }
}

/// Channel weights applied when both channels have a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub webcam_weight: f64,
    pub behavior_weight: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            webcam_weight: 0.6,
            behavior_weight: 0.4,
        }
    }
}

/// Thresholds for [`GatePolicy::Responsive`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponsiveGateConfig {
    pub min_confidence: f64,
    pub cooldown_ms: i64,
}

impl Default for ResponsiveGateConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            cooldown_ms: 2_000,
        }
    }
}

/// Thresholds for [`GatePolicy::Conservative`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConservativeGateConfig {
    pub min_confidence: f64,
    pub cooldown_ms: i64,
    /// Trailing history entries that must all agree with the candidate
    pub agreement_run: usize,
}

impl Default for ConservativeGateConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            cooldown_ms: 5_000,
            agreement_run: 3,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub gate_policy: GatePolicy,
    /// Score warm-up samples against the self-derived baseline while collecting
    pub emit_during_calibration: bool,
    pub calibration: CalibrationConfig,
    pub smoothing_window: usize,
    pub webcam_admission_threshold: f64,
    pub fusion: FusionConfig,
    pub responsive: ResponsiveGateConfig,
    pub conservative: ConservativeGateConfig,
    /// Clamp direction variance and motion burst frequency before scoring
    pub clamp_motion_inputs: bool,
    pub max_motion_burst_frequency: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::responsive()
    }
}

impl EngineConfig {
    /// Responsive gate, decisions emitted during calibration
    pub fn responsive() -> Self {
        Self {
            gate_policy: GatePolicy::Responsive,
            emit_during_calibration: true,
            calibration: CalibrationConfig::default(),
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            webcam_admission_threshold: DEFAULT_WEBCAM_ADMISSION_THRESHOLD,
            fusion: FusionConfig::default(),
            responsive: ResponsiveGateConfig::default(),
            conservative: ConservativeGateConfig::default(),
            clamp_motion_inputs: true,
            max_motion_burst_frequency: 10.0,
        }
    }

    /// Conservative gate, silent during calibration
    pub fn conservative() -> Self {
        Self {
            gate_policy: GatePolicy::Conservative,
            emit_during_calibration: false,
            ..Self::responsive()
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `EMOTION_FLUX_*` environment variables
    pub fn from_env() -> Result<Self, EngineError> {
        Self::default().with_env_overrides()
    }

    /// Apply `EMOTION_FLUX_*` environment overrides on top of this config
    pub fn with_env_overrides(mut self) -> Result<Self, EngineError> {
        if let Ok(policy) = env::var("EMOTION_FLUX_GATE_POLICY") {
            self.gate_policy = policy.parse()?;
        }
        if let Some(emit) = env_bool("EMOTION_FLUX_EMIT_DURING_CALIBRATION")? {
            self.emit_during_calibration = emit;
        }
        if let Some(clamp) = env_bool("EMOTION_FLUX_CLAMP_MOTION_INPUTS")? {
            self.clamp_motion_inputs = clamp;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject configurations the engine cannot honor
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.smoothing_window == 0 {
            return Err(EngineError::InvalidConfig(
                "smoothing_window must be at least 1".to_string(),
            ));
        }
        if self.smoothing_window > MAX_SMOOTHING_WINDOW {
            return Err(EngineError::InvalidConfig(format!(
                "smoothing_window must be at most {MAX_SMOOTHING_WINDOW}"
            )));
        }
        if self.calibration.max_samples > MAX_CALIBRATION_SAMPLES {
            return Err(EngineError::InvalidConfig(format!(
                "calibration.max_samples must be at most {MAX_CALIBRATION_SAMPLES}"
            )));
        }
        if self.calibration.max_samples == 0 {
            return Err(EngineError::InvalidConfig(
                "calibration.max_samples must be at least 1".to_string(),
            ));
        }
        if self.calibration.max_duration_ms < 0
            || self.responsive.cooldown_ms < 0
            || self.conservative.cooldown_ms < 0
        {
            return Err(EngineError::InvalidConfig(
                "durations must not be negative".to_string(),
            ));
        }
        if self.conservative.agreement_run == 0
            || self.conservative.agreement_run > self.smoothing_window
        {
            return Err(EngineError::InvalidConfig(format!(
                "conservative.agreement_run must be within 1..={}",
                self.smoothing_window
            )));
        }

        let unit_values = [
            ("webcam_admission_threshold", self.webcam_admission_threshold),
            ("fusion.webcam_weight", self.fusion.webcam_weight),
            ("fusion.behavior_weight", self.fusion.behavior_weight),
            ("responsive.min_confidence", self.responsive.min_confidence),
            ("conservative.min_confidence", self.conservative.min_confidence),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        if !(self.max_motion_burst_frequency.is_finite() && self.max_motion_burst_frequency > 0.0)
        {
            return Err(EngineError::InvalidConfig(
                "max_motion_burst_frequency must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, EngineError> {
    match env::var(key) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            other => Err(EngineError::InvalidConfig(format!(
                "{key} must be a boolean, got '{other}'"
            ))),
        },
        Err(_) => Ok(None),
    }
}
