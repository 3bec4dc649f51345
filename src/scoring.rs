//! Channel scorers
//!
//! Each channel maps its features to an (emotion, confidence) pair. Scorers are
//! stateless and sit behind [`ChannelScorer`] so the rule sets below can be
//! replaced by a learned model with the same signature.

use crate::types::{ChannelResult, Emotion, NormalizedBehaviorFeatures, WebcamFeatureRecord};

/// Confidence for behavior samples matching no rule
const NEUTRAL_CONFIDENCE: f64 = 0.55;

/// Behavior confidence bounds
const BEHAVIOR_MIN_CONFIDENCE: f64 = 0.5;
const BEHAVIOR_MAX_CONFIDENCE: f64 = 0.95;

/// Webcam confidence bounds
const WEBCAM_MIN_CONFIDENCE: f64 = 0.4;
const WEBCAM_MAX_CONFIDENCE: f64 = 0.98;

/// Starting confidence for webcam records that carry none
const WEBCAM_DEFAULT_CONFIDENCE: f64 = 0.55;

/// Scoring capability for one channel
pub trait ChannelScorer<F>: Send {
    /// Score features; `None` means the scorer abstains
    fn score(&self, features: &F) -> Option<ChannelResult>;
}

/// Adapter turning a closure into a [`ChannelScorer`]
pub struct FnScorer<T>(pub T);

impl<F, T> ChannelScorer<F> for FnScorer<T>
where
    T: Fn(&F) -> Option<ChannelResult> + Send,
{
    fn score(&self, features: &F) -> Option<ChannelResult> {
        (self.0)(features)
    }
}

/// Boxed behavior scorer as held by the engine
pub type BoxedBehaviorScorer = Box<dyn ChannelScorer<NormalizedBehaviorFeatures>>;

/// Boxed webcam scorer as held by the engine
pub type BoxedWebcamScorer = Box<dyn ChannelScorer<WebcamFeatureRecord>>;

/// Derived behavior signals the rules classify on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorSignals {
    pub arousal: f64,
    pub focus: f64,
}

impl BehaviorSignals {
    /// Compute arousal and focus from normalized features
    ///
    /// ```text
    /// arousal = 0.4 * velocity + 0.3 * acceleration + 0.2 * bursts + 0.1 * direction_variance
    /// focus   = max(0, 1 - direction_variance) * (1 + 0.2 * hover)
    /// ```
    pub fn from_features(features: &NormalizedBehaviorFeatures) -> Self {
        let direction_variance = features.raw.direction_variance;
        let arousal = 0.4 * features.normalized_velocity
            + 0.3 * features.normalized_acceleration
            + 0.2 * features.raw.motion_burst_frequency
            + 0.1 * direction_variance;
        let focus = (1.0 - direction_variance).max(0.0) * (1.0 + 0.2 * features.normalized_hover_time);
        Self { arousal, focus }
    }
}

/// Ordered threshold rules over arousal and focus
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBehaviorScorer;

impl RuleBehaviorScorer {
    /// Classify derived signals; first matching rule wins
    pub fn classify(
        signals: BehaviorSignals,
        direction_variance: f64,
        motion_burst_frequency: f64,
    ) -> ChannelResult {
        let BehaviorSignals { arousal, focus } = signals;

        let (emotion, raw_score) = if arousal < 0.6 && focus > 1.1 {
            (Emotion::Calm, 0.65 + 0.1 * focus)
        } else if arousal > 1.4 && direction_variance > 0.7 {
            (Emotion::Frustrated, 0.7 + 0.15 * (arousal - 1.0).min(1.5))
        } else if arousal > 1.2 && motion_burst_frequency > 0.8 {
            (Emotion::Impulsive, 0.7 + 0.12 * motion_burst_frequency.min(1.5))
        } else if focus > 1.2 && (0.8..=1.2).contains(&arousal) {
            (Emotion::Engaged, 0.7 + 0.1 * (focus - 1.0))
        } else {
            (Emotion::Neutral, NEUTRAL_CONFIDENCE)
        };

        let confidence = raw_score.clamp(BEHAVIOR_MIN_CONFIDENCE, BEHAVIOR_MAX_CONFIDENCE);
        ChannelResult::new(emotion, confidence)
    }
}

impl ChannelScorer<NormalizedBehaviorFeatures> for RuleBehaviorScorer {
    fn score(&self, features: &NormalizedBehaviorFeatures) -> Option<ChannelResult> {
        let signals = BehaviorSignals::from_features(features);
        Some(Self::classify(
            signals,
            features.raw.direction_variance,
            features.raw.motion_burst_frequency,
        ))
    }
}

/// Re-weights the upstream webcam confidence; the label is taken as given
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleWebcamScorer;

impl RuleWebcamScorer {
    /// Brow tension boosts, head movement and blinking above rest penalize
    ///
    /// Non-finite magnitudes count as 0.
    pub fn adjust_confidence(confidence: f64, record: &WebcamFeatureRecord) -> f64 {
        let confidence = if confidence.is_finite() {
            confidence
        } else {
            WEBCAM_DEFAULT_CONFIDENCE
        };
        let head_movement = finite_or_zero(record.head_movement);
        let blink_rate = finite_or_zero(record.blink_rate);
        let brow_tension = finite_or_zero(record.brow_tension);

        let stability_penalty =
            0.1 * (head_movement - 0.5).max(0.0) + 0.1 * (blink_rate - 0.6).max(0.0);
        let tension_boost = 0.1 * brow_tension;

        (confidence + tension_boost - stability_penalty)
            .clamp(WEBCAM_MIN_CONFIDENCE, WEBCAM_MAX_CONFIDENCE)
    }
}

impl ChannelScorer<WebcamFeatureRecord> for RuleWebcamScorer {
    fn score(&self, record: &WebcamFeatureRecord) -> Option<ChannelResult> {
        let confidence = record.confidence.unwrap_or(WEBCAM_DEFAULT_CONFIDENCE);
        let adjusted = Self::adjust_confidence(confidence, record);
        Some(ChannelResult::new(record.emotion.clone(), adjusted))
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
