//! Hybrid fusion of the two channels
//!
//! Combines the latest behavior and webcam results into one weighted decision.
//! Webcam evidence is weighted higher when both are present; a lone channel
//! passes through untouched.

use crate::config::FusionConfig;
use crate::types::{ChannelResult, DecisionSource, FusedDecision};

/// Weighted fuser over the latest per-channel results
#[derive(Debug, Clone, Default)]
pub struct HybridFuser {
    config: FusionConfig,
}

impl HybridFuser {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuse the latest results; `None` until at least one channel has reported
    pub fn fuse(
        &self,
        behavior: Option<&ChannelResult>,
        webcam: Option<&ChannelResult>,
    ) -> Option<FusedDecision> {
        match (behavior, webcam) {
            (Some(behavior), Some(webcam)) => {
                let hybrid_score = self.config.webcam_weight * webcam.score
                    + self.config.behavior_weight * behavior.score;
                // Ties go to the webcam label
                let emotion = if webcam.score >= behavior.score {
                    webcam.emotion.clone()
                } else {
                    behavior.emotion.clone()
                };
                Some(FusedDecision {
                    emotion,
                    confidence: hybrid_score,
                    source: DecisionSource::Hybrid,
                })
            }
            (None, Some(webcam)) => Some(FusedDecision {
                emotion: webcam.emotion.clone(),
                confidence: webcam.confidence,
                source: DecisionSource::Hybrid,
            }),
            (Some(behavior), None) => Some(FusedDecision {
                emotion: behavior.emotion.clone(),
                confidence: behavior.confidence,
                source: DecisionSource::Behavior,
            }),
            (None, None) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Emotion;
    use pretty_assertions::assert_eq;

    fn result(emotion: Emotion, score: f64) -> ChannelResult {
        ChannelResult::new(emotion, score)
    }

    #[test]
    fn test_no_channels() {
        assert!(HybridFuser::default().fuse(None, None).is_none());
    }

    #[test]
    fn test_behavior_only() {
        let behavior = result(Emotion::Calm, 0.7);
        let fused = HybridFuser::default().fuse(Some(&behavior), None).unwrap();
        assert_eq!(
            fused,
            FusedDecision {
                emotion: Emotion::Calm,
                confidence: 0.7,
                source: DecisionSource::Behavior,
            }
        );
    }

    #[test]
    fn test_webcam_only_is_hybrid() {
        let webcam = result(Emotion::Happy, 0.8);
        let fused = HybridFuser::default().fuse(None, Some(&webcam)).unwrap();
        assert_eq!(fused.emotion, Emotion::Happy);
        assert_eq!(fused.confidence, 0.8);
        assert_eq!(fused.source, DecisionSource::Hybrid);
    }

    #[test]
    fn test_higher_behavior_score_wins_label() {
        let behavior = result(Emotion::Frustrated, 0.9);
        let webcam = result(Emotion::Happy, 0.5);

        let fused = HybridFuser::default()
            .fuse(Some(&behavior), Some(&webcam))
            .unwrap();
        assert_eq!(fused.emotion, Emotion::Frustrated);
        assert!((fused.confidence - 0.66).abs() < 1e-9);
        assert_eq!(fused.source, DecisionSource::Hybrid);
    }

    #[test]
    fn test_tie_favors_webcam() {
        let behavior = result(Emotion::Calm, 0.7);
        let webcam = result(Emotion::Focused, 0.7);

        let fused = HybridFuser::default()
            .fuse(Some(&behavior), Some(&webcam))
            .unwrap();
        assert_eq!(fused.emotion, Emotion::Focused);
        assert!((fused.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_custom_weights() {
        let fuser = HybridFuser::new(FusionConfig {
            webcam_weight: 0.5,
            behavior_weight: 0.5,
        });
        let fused = fuser
            .fuse(
                Some(&result(Emotion::Calm, 0.6)),
                Some(&result(Emotion::Happy, 0.8)),
            )
            .unwrap();
        assert!((fused.confidence - 0.7).abs() < 1e-9);
    }
}
