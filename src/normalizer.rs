//! Behavior feature normalization
//!
//! Rescales a raw behavior record against the user's baseline into
//! dimensionless ratios. Before a baseline exists the record is measured
//! against itself so early samples stay close to 1 instead of exploding.

use crate::baseline::{Baseline, DEFAULT_NORMAL_HOVER_TIME};
use crate::config::EngineConfig;
use crate::types::{BehaviorFeatureRecord, NormalizedBehaviorFeatures};

/// Smallest denominator the normalizer will divide by
const MIN_DENOMINATOR: f64 = 1.0;

/// Normalizer for raw behavior records
#[derive(Debug, Clone)]
pub struct FeatureNormalizer {
    clamp_motion_inputs: bool,
    max_motion_burst_frequency: f64,
}

impl Default for FeatureNormalizer {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl FeatureNormalizer {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            clamp_motion_inputs: config.clamp_motion_inputs,
            max_motion_burst_frequency: config.max_motion_burst_frequency,
        }
    }

    /// Normalize a raw record against `baseline`, or against itself when absent
    pub fn normalize(
        &self,
        raw: &BehaviorFeatureRecord,
        baseline: Option<&Baseline>,
    ) -> NormalizedBehaviorFeatures {
        let raw = self.sanitize(raw);

        let used_fallback_baseline = baseline.is_none();
        let base = match baseline {
            Some(b) => b.clone(),
            None => fallback_baseline(&raw),
        };

        let velocity = raw.avg_velocity.unwrap_or(0.0);
        let acceleration = raw.avg_acceleration.unwrap_or(0.0);
        let hover_time = raw.hover_time.unwrap_or(0.0);

        NormalizedBehaviorFeatures {
            normalized_velocity: velocity / denominator(base.normal_velocity),
            normalized_acceleration: acceleration / denominator(base.normal_acceleration),
            normalized_hover_time: hover_time / denominator(base.normal_hover_time),
            used_fallback_baseline,
            raw,
        }
    }

    /// Zero out negative or non-finite magnitudes and bound the motion statistics
    fn sanitize(&self, raw: &BehaviorFeatureRecord) -> BehaviorFeatureRecord {
        let mut clean = raw.clone();
        clean.avg_velocity = raw.avg_velocity.map(non_negative);
        clean.avg_acceleration = raw.avg_acceleration.map(non_negative);
        clean.hover_time = raw.hover_time.map(non_negative);

        clean.direction_variance = finite_or_zero(raw.direction_variance);
        clean.motion_burst_frequency = finite_or_zero(raw.motion_burst_frequency);
        if self.clamp_motion_inputs {
            clean.direction_variance = clean.direction_variance.clamp(0.0, 1.0);
            clean.motion_burst_frequency = clean
                .motion_burst_frequency
                .clamp(0.0, self.max_motion_burst_frequency);
        }
        clean
    }
}

/// Baseline derived from the record itself, each component floored at 1
fn fallback_baseline(raw: &BehaviorFeatureRecord) -> Baseline {
    Baseline {
        normal_velocity: or_default(raw.avg_velocity, 1.0).max(MIN_DENOMINATOR),
        normal_acceleration: or_default(raw.avg_acceleration, 1.0).max(MIN_DENOMINATOR),
        normal_hover_time: or_default(raw.hover_time, DEFAULT_NORMAL_HOVER_TIME)
            .max(MIN_DENOMINATOR),
    }
}

/// Absent or zero readings take the default
fn or_default(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v > 0.0 => v,
        _ => default,
    }
}

fn denominator(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        MIN_DENOMINATOR
    }
}

fn non_negative(value: f64) -> f64 {
    finite_or_zero(value).max(0.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
