//! Core types for the Emotion Flux engine
//!
//! This module defines the data structures that flow through each stage of the
//! engine: raw feature records, normalized features, per-channel results, and
//! the fused, smoothed and gated decisions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;

/// Emotion label carried through fusion, smoothing and gating
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Calm,
    Frustrated,
    Impulsive,
    Engaged,
    Neutral,
    Happy,
    Focused,
    /// Any other label supplied by an upstream producer
    #[serde(untagged)]
    Other(String),
}

impl Emotion {
    pub fn as_str(&self) -> &str {
        match self {
            Emotion::Calm => "calm",
            Emotion::Frustrated => "frustrated",
            Emotion::Impulsive => "impulsive",
            Emotion::Engaged => "engaged",
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Focused => "focused",
            Emotion::Other(label) => label.as_str(),
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Emotion {
    fn from(label: &str) -> Self {
        match label {
            "calm" => Emotion::Calm,
            "frustrated" => Emotion::Frustrated,
            "impulsive" => Emotion::Impulsive,
            "engaged" => Emotion::Engaged,
            "neutral" => Emotion::Neutral,
            "happy" => Emotion::Happy,
            "focused" => Emotion::Focused,
            other => Emotion::Other(other.to_string()),
        }
    }
}

impl Default for Emotion {
    fn default() -> Self {
        Emotion::Neutral
    }
}

/// Independent signal source feeding the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Behavior,
    Webcam,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Behavior => "behavior",
            Channel::Webcam => "webcam",
        }
    }
}

/// Provenance of a fused decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Only the behavior channel contributed
    Behavior,
    /// A webcam result contributed, alone or combined with behavior
    Hybrid,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Behavior => "behavior",
            DecisionSource::Hybrid => "hybrid",
        }
    }
}

/// Raw interaction features flushed by the external behavior tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehaviorFeatureRecord {
    /// Average scroll speed over the flush interval
    #[serde(default, alias = "avgScrollSpeed")]
    pub avg_scroll_speed: f64,
    /// Average mouse velocity
    #[serde(default, alias = "avgVelocity", skip_serializing_if = "Option::is_none")]
    pub avg_velocity: Option<f64>,
    /// Average mouse acceleration
    #[serde(default, alias = "avgAcceleration", skip_serializing_if = "Option::is_none")]
    pub avg_acceleration: Option<f64>,
    /// Average hover duration in milliseconds
    #[serde(default, alias = "hoverTime", skip_serializing_if = "Option::is_none")]
    pub hover_time: Option<f64>,
    /// Clicks per minute
    #[serde(default, alias = "clickRate")]
    pub click_rate: f64,
    /// Time since last activity in milliseconds
    #[serde(default, alias = "idleTime")]
    pub idle_time: f64,
    /// Cart add + remove count
    #[serde(default, alias = "cartFluctuation")]
    pub cart_fluctuation: u32,
    /// Tab switches during the interval
    #[serde(default, alias = "tabSwitches")]
    pub tab_switches: u32,
    /// Circular variance of pointer direction (0 = straight, 1 = scattered)
    #[serde(default, alias = "directionVariance")]
    pub direction_variance: f64,
    /// Velocity bursts per second
    #[serde(default, alias = "motionBurstFrequency")]
    pub motion_burst_frequency: f64,
    /// Capture time (epoch milliseconds on the wire)
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Behavior features rescaled against the user's baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBehaviorFeatures {
    /// Source raw record (after input sanitization)
    pub raw: BehaviorFeatureRecord,
    /// Velocity / baseline velocity
    pub normalized_velocity: f64,
    /// Acceleration / baseline acceleration
    pub normalized_acceleration: f64,
    /// Hover time / baseline hover time
    pub normalized_hover_time: f64,
    /// Whether the ratios were computed against the self-derived fallback
    pub used_fallback_baseline: bool,
}

/// Facial-heuristic features produced by the external webcam analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebcamFeatureRecord {
    /// Emotion hint from the upstream producer
    #[serde(default)]
    pub emotion: Emotion,
    /// Producer confidence (0-1); records without one are rejected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Normalized blink rate (0-1)
    #[serde(default, alias = "blinkRate")]
    pub blink_rate: f64,
    /// Normalized head movement magnitude (0-1)
    #[serde(default, alias = "headMovement")]
    pub head_movement: f64,
    /// Normalized brow tension magnitude (0-1)
    #[serde(default, alias = "browTension")]
    pub brow_tension: f64,
    /// Capture time (epoch milliseconds on the wire)
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Loosely-typed facial signals as emitted by a frame analyzer.
///
/// Several producers use different names for the same magnitude; the
/// conversion to [`WebcamFeatureRecord`] picks the first one present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialSignals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<Emotion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, alias = "blinkRate", skip_serializing_if = "Option::is_none")]
    pub blink_rate: Option<f64>,
    #[serde(default, alias = "headMovement", skip_serializing_if = "Option::is_none")]
    pub head_movement: Option<f64>,
    #[serde(default, alias = "motionIntensity", skip_serializing_if = "Option::is_none")]
    pub motion_intensity: Option<f64>,
    #[serde(default, alias = "browTension", skip_serializing_if = "Option::is_none")]
    pub brow_tension: Option<f64>,
    #[serde(default, alias = "eyebrowRaise", skip_serializing_if = "Option::is_none")]
    pub eyebrow_raise: Option<f64>,
    #[serde(
        default,
        with = "chrono::serde::ts_milliseconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Confidence assumed for facial signals that carry none
pub const DEFAULT_FACIAL_CONFIDENCE: f64 = 0.6;

impl FacialSignals {
    /// Convert to a webcam record, filling gaps with producer defaults
    pub fn into_webcam_record(self, now: DateTime<Utc>) -> WebcamFeatureRecord {
        WebcamFeatureRecord {
            emotion: match self.emotion {
                Some(Emotion::Other(label)) if label.trim().is_empty() => Emotion::Neutral,
                other => other.unwrap_or_default(),
            },
            confidence: Some(self.confidence.unwrap_or(DEFAULT_FACIAL_CONFIDENCE)),
            blink_rate: self.blink_rate.unwrap_or(0.0),
            head_movement: self.head_movement.or(self.motion_intensity).unwrap_or(0.0),
            brow_tension: self.brow_tension.or(self.eyebrow_raise).unwrap_or(0.0),
            timestamp: Some(self.timestamp.unwrap_or(now)),
        }
    }
}

/// One record of a mixed, line-oriented replay stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ChannelRecord {
    Behavior(BehaviorFeatureRecord),
    Webcam(WebcamFeatureRecord),
    Facial(FacialSignals),
}

impl ChannelRecord {
    /// Parse one tagged JSON record
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::ParseError(e.to_string()))
    }

    pub fn channel(&self) -> Channel {
        match self {
            ChannelRecord::Behavior(_) => Channel::Behavior,
            ChannelRecord::Webcam(_) | ChannelRecord::Facial(_) => Channel::Webcam,
        }
    }
}

/// Output of a channel scorer.
///
/// `score` and `confidence` are equal for the rule-based scorers; they are kept
/// apart so a scorer may report an internal certainty that differs from the
/// externally visible confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelResult {
    pub emotion: Emotion,
    pub confidence: f64,
    pub score: f64,
}

impl ChannelResult {
    /// Result whose score equals its confidence
    pub fn new(emotion: Emotion, confidence: f64) -> Self {
        Self {
            emotion,
            confidence,
            score: confidence,
        }
    }
}

/// Single weighted decision combining the latest result of each channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedDecision {
    pub emotion: Emotion,
    pub confidence: f64,
    pub source: DecisionSource,
}

/// Decision after majority vote and confidence averaging over the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothedDecision {
    pub emotion: Emotion,
    pub confidence: f64,
    pub source: DecisionSource,
}

/// Decision that passed the stability gate and is surfaced to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalDecision {
    pub emotion: Emotion,
    pub confidence: f64,
    pub source: DecisionSource,
}

impl From<SmoothedDecision> for FinalDecision {
    fn from(smoothed: SmoothedDecision) -> Self {
        Self {
            emotion: smoothed.emotion,
            confidence: smoothed.confidence,
            source: smoothed.source,
        }
    }
}
