//! Stability gate
//!
//! Hysteresis filter in front of the host: a smoothed decision is surfaced only
//! if it clears the active policy's confidence bar and is not a repeat of the
//! last emitted label within the cooldown. Rejection is throttling, not an error.

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::config::{ConservativeGateConfig, EngineConfig, GatePolicy, ResponsiveGateConfig};
use crate::smoothing::TemporalSmoother;
use crate::types::{Emotion, FinalDecision, SmoothedDecision};

/// Why a candidate was held back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    LowConfidence,
    NoConsecutiveAgreement,
    Cooldown,
}

/// Last-emission state plus the active policy
#[derive(Debug, Clone)]
pub struct StabilityGate {
    policy: GatePolicy,
    responsive: ResponsiveGateConfig,
    conservative: ConservativeGateConfig,
    last_emotion: Option<Emotion>,
    last_emitted_at: Option<DateTime<Utc>>,
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl StabilityGate {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            policy: config.gate_policy,
            responsive: config.responsive.clone(),
            conservative: config.conservative.clone(),
            last_emotion: None,
            last_emitted_at: None,
        }
    }

    /// Gate a smoothed decision; records it as last emitted when it passes
    pub fn gate(
        &mut self,
        candidate: SmoothedDecision,
        history: &TemporalSmoother,
        now: DateTime<Utc>,
    ) -> Option<FinalDecision> {
        match self.evaluate(&candidate, history, now) {
            Ok(()) => {
                self.last_emotion = Some(candidate.emotion.clone());
                self.last_emitted_at = Some(now);
                Some(candidate.into())
            }
            Err(reason) => {
                trace!(
                    emotion = %candidate.emotion,
                    confidence = candidate.confidence,
                    ?reason,
                    "decision suppressed"
                );
                None
            }
        }
    }

    /// Check a candidate against the active policy without mutating state
    pub fn evaluate(
        &self,
        candidate: &SmoothedDecision,
        history: &TemporalSmoother,
        now: DateTime<Utc>,
    ) -> Result<(), Suppression> {
        let cooldown_ms = match self.policy {
            GatePolicy::Responsive => {
                if candidate.confidence < self.responsive.min_confidence {
                    return Err(Suppression::LowConfidence);
                }
                self.responsive.cooldown_ms
            }
            GatePolicy::Conservative => {
                if !history.trailing_agreement(&candidate.emotion, self.conservative.agreement_run) {
                    return Err(Suppression::NoConsecutiveAgreement);
                }
                if candidate.confidence < self.conservative.min_confidence {
                    return Err(Suppression::LowConfidence);
                }
                self.conservative.cooldown_ms
            }
        };

        if self.is_repeat_within(&candidate.emotion, now, Duration::milliseconds(cooldown_ms)) {
            return Err(Suppression::Cooldown);
        }
        Ok(())
    }

    // A `now` earlier than the last emission means the time source jumped
    // back; the cooldown is treated as elapsed
    fn is_repeat_within(&self, emotion: &Emotion, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match (&self.last_emotion, self.last_emitted_at) {
            (Some(last), Some(at)) if last == emotion => now >= at && now - at < cooldown,
            _ => false,
        }
    }

    pub fn policy(&self) -> GatePolicy {
        self.policy
    }

    pub fn last_emotion(&self) -> Option<&Emotion> {
        self.last_emotion.as_ref()
    }

    pub fn last_emitted_at(&self) -> Option<DateTime<Utc>> {
        self.last_emitted_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DecisionSource, FusedDecision};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn smoothed(emotion: Emotion, confidence: f64) -> SmoothedDecision {
        SmoothedDecision {
            emotion,
            confidence,
            source: DecisionSource::Behavior,
        }
    }

    fn history_of(emotions: &[Emotion], confidence: f64) -> TemporalSmoother {
        let mut smoother = TemporalSmoother::default();
        for emotion in emotions {
            smoother.smooth(FusedDecision {
                emotion: emotion.clone(),
                confidence,
                source: DecisionSource::Behavior,
            });
        }
        smoother
    }

    #[test]
    fn test_responsive_emits_then_cools_down() {
        let mut gate = StabilityGate::default();
        let history = TemporalSmoother::default();

        let first = gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(0));
        assert_eq!(first.unwrap().emotion, Emotion::Calm);

        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(1_999)).is_none());
        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(2_000)).is_some());
    }

    #[test]
    fn test_responsive_new_label_bypasses_cooldown() {
        let mut gate = StabilityGate::default();
        let history = TemporalSmoother::default();

        gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(0)).unwrap();
        let switched = gate.gate(smoothed(Emotion::Frustrated, 0.9), &history, at(100));
        assert_eq!(switched.unwrap().emotion, Emotion::Frustrated);
        assert_eq!(gate.last_emotion(), Some(&Emotion::Frustrated));
        assert_eq!(gate.last_emitted_at(), Some(at(100)));
    }

    #[test]
    fn test_backwards_time_does_not_block_repeat() {
        let mut gate = StabilityGate::default();
        let history = TemporalSmoother::default();

        gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(60_000)).unwrap();
        let repeat = gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(0));
        assert!(repeat.is_some());
        assert_eq!(gate.last_emitted_at(), Some(at(0)));
        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(1_000)).is_none());
    }

    #[test]
    fn test_responsive_rejects_low_confidence() {
        let mut gate = StabilityGate::default();
        let history = TemporalSmoother::default();

        assert_eq!(
            gate.evaluate(&smoothed(Emotion::Calm, 0.49), &history, at(0)),
            Err(Suppression::LowConfidence)
        );
        assert!(gate.gate(smoothed(Emotion::Calm, 0.49), &history, at(0)).is_none());
        assert!(gate.last_emotion().is_none());
    }

    #[test]
    fn test_conservative_requires_three_in_a_row() {
        let mut gate = StabilityGate::from_config(&EngineConfig::conservative());

        let history = history_of(&[Emotion::Calm, Emotion::Happy, Emotion::Calm], 0.9);
        assert_eq!(
            gate.evaluate(&smoothed(Emotion::Calm, 0.9), &history, at(0)),
            Err(Suppression::NoConsecutiveAgreement)
        );

        let history = history_of(&[Emotion::Calm, Emotion::Calm, Emotion::Calm], 0.9);
        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(0)).is_some());
    }

    #[test]
    fn test_conservative_confidence_bar() {
        let gate = StabilityGate::from_config(&EngineConfig::conservative());
        let history = history_of(&[Emotion::Calm, Emotion::Calm, Emotion::Calm], 0.69);
        assert_eq!(
            gate.evaluate(&smoothed(Emotion::Calm, 0.69), &history, at(0)),
            Err(Suppression::LowConfidence)
        );
    }

    #[test]
    fn test_conservative_cooldown() {
        let mut gate = StabilityGate::from_config(&EngineConfig::conservative());
        let history = history_of(&[Emotion::Calm, Emotion::Calm, Emotion::Calm], 0.9);

        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(0)).is_some());
        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(4_999)).is_none());
        assert!(gate.gate(smoothed(Emotion::Calm, 0.9), &history, at(5_000)).is_some());
    }
}
