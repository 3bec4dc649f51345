//! Emotion engine orchestration
//!
//! This module provides the session-scoped processor that drives the full
//! decision pipeline: calibration, normalization, per-channel scoring, hybrid
//! fusion, temporal smoothing and the stability gate.
//!
//! Calls are expected to be serialized by the host; the engine holds plain
//! mutable state and is not meant to be shared across threads without an
//! external lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::baseline::{Baseline, BaselineStore};
use crate::calibration::{CalibrationCollector, CalibrationProgress};
use crate::clock::{Clock, SystemClock};
use crate::config::{EngineConfig, GatePolicy};
use crate::fusion::HybridFuser;
use crate::gate::StabilityGate;
use crate::normalizer::FeatureNormalizer;
use crate::scoring::{
    BoxedBehaviorScorer, BoxedWebcamScorer, ChannelScorer, RuleBehaviorScorer, RuleWebcamScorer,
};
use crate::smoothing::TemporalSmoother;
use crate::types::{
    BehaviorFeatureRecord, Channel, ChannelRecord, ChannelResult, Emotion, FacialSignals,
    FinalDecision, NormalizedBehaviorFeatures, WebcamFeatureRecord,
};

/// Point-in-time view of the engine state for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub session_id: Uuid,
    pub gate_policy: GatePolicy,
    pub calibrating: bool,
    pub calibration_samples: usize,
    pub baseline: Option<Baseline>,
    pub latest_behavior: Option<ChannelResult>,
    pub latest_webcam: Option<ChannelResult>,
    pub behavior_enabled: bool,
    pub webcam_enabled: bool,
    pub history_len: usize,
    pub last_emitted_emotion: Option<Emotion>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_emitted_at: Option<DateTime<Utc>>,
}

/// Stateful engine for one active session.
///
/// Owns the latest result of each channel, the shared decision history and the
/// last-emission state. Nothing is shared between engines except what a
/// [`BaselineStore`] persists.
pub struct EmotionEngine {
    session_id: Uuid,
    config: EngineConfig,
    calibrating: bool,
    collector: CalibrationCollector,
    baseline: Option<Baseline>,
    normalizer: FeatureNormalizer,
    behavior_scorer: Option<BoxedBehaviorScorer>,
    webcam_scorer: Option<BoxedWebcamScorer>,
    fuser: HybridFuser,
    smoother: TemporalSmoother,
    gate: StabilityGate,
    latest_behavior: Option<ChannelResult>,
    latest_behavior_features: Option<NormalizedBehaviorFeatures>,
    latest_webcam: Option<ChannelResult>,
    behavior_enabled: bool,
    webcam_enabled: bool,
    baseline_store: Option<Box<dyn BaselineStore>>,
    clock: Box<dyn Clock>,
}

impl Default for EmotionEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EmotionEngine {
    /// Create an engine with the rule-based scorers and the system clock
    pub fn new(config: EngineConfig) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            calibrating: true,
            collector: CalibrationCollector::new(config.calibration.clone()),
            baseline: None,
            normalizer: FeatureNormalizer::from_config(&config),
            behavior_scorer: Some(Box::new(RuleBehaviorScorer)),
            webcam_scorer: Some(Box::new(RuleWebcamScorer)),
            fuser: HybridFuser::new(config.fusion.clone()),
            smoother: TemporalSmoother::new(config.smoothing_window),
            gate: StabilityGate::from_config(&config),
            latest_behavior: None,
            latest_behavior_features: None,
            latest_webcam: None,
            behavior_enabled: true,
            webcam_enabled: true,
            baseline_store: None,
            clock: Box::new(SystemClock),
            config,
        }
    }

    /// Create an engine for one of the two gate presets
    pub fn with_policy(policy: GatePolicy) -> Self {
        match policy {
            GatePolicy::Responsive => Self::new(EngineConfig::responsive()),
            GatePolicy::Conservative => Self::new(EngineConfig::conservative()),
        }
    }

    /// Use `clock` for records that carry no timestamp
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the behavior scorer
    pub fn with_behavior_scorer(
        mut self,
        scorer: impl ChannelScorer<NormalizedBehaviorFeatures> + 'static,
    ) -> Self {
        self.behavior_scorer = Some(Box::new(scorer));
        self
    }

    /// Replace the webcam scorer
    pub fn with_webcam_scorer(
        mut self,
        scorer: impl ChannelScorer<WebcamFeatureRecord> + 'static,
    ) -> Self {
        self.webcam_scorer = Some(Box::new(scorer));
        self
    }

    /// Run without a behavior scorer; the channel never produces a result
    pub fn without_behavior_scorer(mut self) -> Self {
        self.behavior_scorer = None;
        self
    }

    /// Run without a webcam scorer; the channel never produces a result
    pub fn without_webcam_scorer(mut self) -> Self {
        self.webcam_scorer = None;
        self
    }

    /// Load the persisted baseline from `store` and persist future
    /// calibrations to it
    pub fn with_baseline_store(mut self, store: impl BaselineStore + 'static) -> Self {
        self.load_baseline_from(&store);
        self.baseline_store = Some(Box::new(store));
        self
    }

    /// Process one raw behavior record.
    ///
    /// Returns the decision surfaced to the host, or `None` when the channel is
    /// disabled, the engine is warming up silently, or the gate held the
    /// candidate back.
    pub fn process_behavior_sample(&mut self, record: &BehaviorFeatureRecord) -> Option<FinalDecision> {
        if !self.behavior_enabled {
            debug!("behavior channel disabled, sample dropped");
            return None;
        }
        let now = record.timestamp.unwrap_or_else(|| self.clock.now());

        if self.calibrating && self.baseline.is_none() {
            self.collect_calibration_sample(record, now);
            if !self.config.emit_during_calibration {
                return None;
            }
        }

        let features = self.normalizer.normalize(record, self.baseline.as_ref());
        debug!(
            velocity = features.normalized_velocity,
            acceleration = features.normalized_acceleration,
            hover_time = features.normalized_hover_time,
            fallback = features.used_fallback_baseline,
            "behavior sample normalized"
        );

        self.latest_behavior = self
            .behavior_scorer
            .as_ref()
            .and_then(|scorer| scorer.score(&features));
        if let Some(result) = &self.latest_behavior {
            debug!(emotion = %result.emotion, confidence = result.confidence, "behavior scored");
        }
        self.latest_behavior_features = Some(features);

        self.decide(now)
    }

    /// Process one webcam record.
    ///
    /// Records without a finite confidence, or below the admission threshold,
    /// are ignored and leave the channel's latest result untouched.
    pub fn process_webcam_sample(&mut self, record: &WebcamFeatureRecord) -> Option<FinalDecision> {
        if !self.webcam_enabled {
            debug!("webcam channel disabled, sample dropped");
            return None;
        }
        let confidence = match record.confidence {
            Some(c) if c.is_finite() => c,
            _ => {
                debug!("webcam sample without confidence ignored");
                return None;
            }
        };
        if confidence < self.config.webcam_admission_threshold {
            debug!(
                confidence,
                threshold = self.config.webcam_admission_threshold,
                "webcam sample below admission threshold"
            );
            return None;
        }
        let now = record.timestamp.unwrap_or_else(|| self.clock.now());

        self.latest_webcam = self
            .webcam_scorer
            .as_ref()
            .and_then(|scorer| scorer.score(record));
        if let Some(result) = &self.latest_webcam {
            debug!(emotion = %result.emotion, confidence = result.confidence, "webcam scored");
        }

        self.decide(now)
    }

    /// Convert loosely-typed facial signals and process them as a webcam record
    pub fn infer_from_facial_signals(&mut self, signals: FacialSignals) -> Option<FinalDecision> {
        let record = signals.into_webcam_record(self.clock.now());
        self.process_webcam_sample(&record)
    }

    /// Dispatch a tagged record to its channel
    pub fn process_record(&mut self, record: ChannelRecord) -> Option<FinalDecision> {
        match record {
            ChannelRecord::Behavior(record) => self.process_behavior_sample(&record),
            ChannelRecord::Webcam(record) => self.process_webcam_sample(&record),
            ChannelRecord::Facial(signals) => self.infer_from_facial_signals(signals),
        }
    }

    /// Parse and process a tagged JSON record; malformed input yields `None`
    pub fn process_json(&mut self, json: &str) -> Option<FinalDecision> {
        match ChannelRecord::from_json(json) {
            Ok(record) => self.process_record(record),
            Err(e) => {
                warn!(error = %e, "dropping malformed record");
                None
            }
        }
    }

    /// Parse and process an untagged behavior JSON record
    pub fn process_behavior_json(&mut self, json: &str) -> Option<FinalDecision> {
        match serde_json::from_str::<BehaviorFeatureRecord>(json) {
            Ok(record) => self.process_behavior_sample(&record),
            Err(e) => {
                warn!(error = %e, "dropping malformed behavior record");
                None
            }
        }
    }

    /// Parse and process an untagged webcam JSON record
    pub fn process_webcam_json(&mut self, json: &str) -> Option<FinalDecision> {
        match serde_json::from_str::<WebcamFeatureRecord>(json) {
            Ok(record) => self.process_webcam_sample(&record),
            Err(e) => {
                warn!(error = %e, "dropping malformed webcam record");
                None
            }
        }
    }

    /// Load a baseline from `store`; failures leave the engine calibrating
    pub fn load_baseline_from(&mut self, store: &dyn BaselineStore) -> bool {
        match store.load() {
            Ok(Some(baseline)) => self.install_baseline(baseline),
            Ok(None) => {
                debug!("no persisted baseline, calibrating");
                false
            }
            Err(e) => {
                warn!(error = %e, "baseline load failed, calibrating");
                false
            }
        }
    }

    /// Install a baseline that arrived after construction.
    ///
    /// Ends calibration. Decisions already emitted are not re-normalized; only
    /// later samples see the new baseline. Returns `false` for invalid baselines.
    pub fn install_baseline(&mut self, baseline: Baseline) -> bool {
        if !baseline.is_valid() {
            warn!(?baseline, "ignoring invalid baseline");
            return false;
        }
        info!(
            velocity = baseline.normal_velocity,
            acceleration = baseline.normal_acceleration,
            hover_time = baseline.normal_hover_time,
            "baseline installed"
        );
        self.baseline = Some(baseline);
        self.calibrating = false;
        self.collector.reset();
        true
    }

    /// Enable or disable one channel. Other state is left as is.
    pub fn set_channel_enabled(&mut self, channel: Channel, enabled: bool) {
        match channel {
            Channel::Behavior => self.behavior_enabled = enabled,
            Channel::Webcam => self.webcam_enabled = enabled,
        }
        debug!(channel = channel.as_str(), enabled, "channel toggled");
    }

    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Behavior => self.behavior_enabled,
            Channel::Webcam => self.webcam_enabled,
        }
    }

    /// Forget one channel's latest result
    pub fn reset_channel(&mut self, channel: Channel) {
        match channel {
            Channel::Behavior => {
                self.latest_behavior = None;
                self.latest_behavior_features = None;
            }
            Channel::Webcam => self.latest_webcam = None,
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            session_id: self.session_id,
            gate_policy: self.gate.policy(),
            calibrating: self.calibrating,
            calibration_samples: self.collector.sample_count(),
            baseline: self.baseline.clone(),
            latest_behavior: self.latest_behavior.clone(),
            latest_webcam: self.latest_webcam.clone(),
            behavior_enabled: self.behavior_enabled,
            webcam_enabled: self.webcam_enabled,
            history_len: self.smoother.len(),
            last_emitted_emotion: self.gate.last_emotion().cloned(),
            last_emitted_at: self.gate.last_emitted_at(),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    pub fn baseline(&self) -> Option<&Baseline> {
        self.baseline.as_ref()
    }

    pub fn latest_behavior(&self) -> Option<&ChannelResult> {
        self.latest_behavior.as_ref()
    }

    /// Normalized features behind the latest behavior result
    pub fn latest_behavior_features(&self) -> Option<&NormalizedBehaviorFeatures> {
        self.latest_behavior_features.as_ref()
    }

    pub fn latest_webcam(&self) -> Option<&ChannelResult> {
        self.latest_webcam.as_ref()
    }

    pub fn smoother(&self) -> &TemporalSmoother {
        &self.smoother
    }

    fn collect_calibration_sample(&mut self, record: &BehaviorFeatureRecord, now: DateTime<Utc>) {
        match self.collector.collect(record, now) {
            CalibrationProgress::Collecting { samples, elapsed_ms } => {
                debug!(samples, elapsed_ms, "calibration sample collected");
            }
            CalibrationProgress::Complete(baseline) => {
                info!(
                    velocity = baseline.normal_velocity,
                    acceleration = baseline.normal_acceleration,
                    hover_time = baseline.normal_hover_time,
                    "calibration complete"
                );
                self.baseline = Some(baseline.clone());
                self.calibrating = false;
                self.persist_baseline(&baseline);
            }
        }
    }

    // Fire-and-forget; the in-memory baseline stays authoritative
    fn persist_baseline(&self, baseline: &Baseline) {
        if let Some(store) = &self.baseline_store {
            if let Err(e) = store.persist(baseline) {
                warn!(error = %e, "baseline persistence failed");
            }
        }
    }

    fn decide(&mut self, now: DateTime<Utc>) -> Option<FinalDecision> {
        let fused = self
            .fuser
            .fuse(self.latest_behavior.as_ref(), self.latest_webcam.as_ref())?;
        debug!(
            emotion = %fused.emotion,
            confidence = fused.confidence,
            source = fused.source.as_str(),
            "fused"
        );

        let smoothed = self.smoother.smooth(fused);
        debug!(emotion = %smoothed.emotion, confidence = smoothed.confidence, "smoothed");

        let decision = self.gate.gate(smoothed, &self.smoother, now);
        if let Some(decision) = &decision {
            debug!(emotion = %decision.emotion, confidence = decision.confidence, "decision emitted");
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::MemoryBaselineStore;
    use crate::clock::FixedClock;
    use crate::config::CalibrationConfig;
    use crate::error::EngineError;
    use crate::scoring::FnScorer;
    use crate::types::DecisionSource;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        t0() + Duration::milliseconds(ms)
    }

    fn quiet_behavior(ms: i64) -> BehaviorFeatureRecord {
        BehaviorFeatureRecord {
            timestamp: Some(at(ms)),
            ..Default::default()
        }
    }

    fn behavior(velocity: f64, acceleration: f64, hover: f64, ms: i64) -> BehaviorFeatureRecord {
        BehaviorFeatureRecord {
            avg_velocity: Some(velocity),
            avg_acceleration: Some(acceleration),
            hover_time: Some(hover),
            timestamp: Some(at(ms)),
            ..Default::default()
        }
    }

    fn webcam(emotion: Emotion, confidence: f64, ms: i64) -> WebcamFeatureRecord {
        WebcamFeatureRecord {
            emotion,
            confidence: Some(confidence),
            blink_rate: 0.0,
            head_movement: 0.0,
            brow_tension: 0.0,
            timestamp: Some(at(ms)),
        }
    }

    fn small_calibration(max_samples: usize) -> EngineConfig {
        EngineConfig {
            calibration: CalibrationConfig {
                max_duration_ms: 120_000,
                max_samples,
            },
            ..EngineConfig::responsive()
        }
    }

    struct FailingStore;

    impl BaselineStore for FailingStore {
        fn load(&self) -> Result<Option<Baseline>, EngineError> {
            Err(EngineError::BaselineLoad("unavailable".to_string()))
        }

        fn persist(&self, _baseline: &Baseline) -> Result<(), EngineError> {
            Err(EngineError::BaselinePersist("read-only".to_string()))
        }
    }

    #[test]
    fn test_responsive_emits_during_calibration() {
        let mut engine = EmotionEngine::default();

        let decision = engine.process_behavior_sample(&quiet_behavior(0)).unwrap();
        assert_eq!(decision.emotion, Emotion::Neutral);
        assert!((decision.confidence - 0.55).abs() < 1e-9);
        assert_eq!(decision.source, DecisionSource::Behavior);

        assert!(engine.is_calibrating());
        assert_eq!(engine.snapshot().calibration_samples, 1);
        assert!(engine.latest_behavior_features().unwrap().used_fallback_baseline);
    }

    #[test]
    fn test_conservative_silent_during_calibration() {
        let mut engine = EmotionEngine::with_policy(GatePolicy::Conservative);

        for i in 0..5 {
            assert!(engine.process_behavior_sample(&quiet_behavior(i * 1000)).is_none());
        }
        assert!(engine.latest_behavior().is_none());
        assert_eq!(engine.smoother().len(), 0);
        assert_eq!(engine.snapshot().calibration_samples, 5);
    }

    #[test]
    fn test_calibration_completes_and_persists() {
        let store = MemoryBaselineStore::new();
        let mut engine = EmotionEngine::default().with_baseline_store(store.clone());

        for _ in 0..299 {
            engine.process_behavior_sample(&behavior(2.0, 1.0, 1000.0, 0));
        }
        assert!(engine.is_calibrating());
        assert!(store.get().is_none());

        engine.process_behavior_sample(&behavior(2.0, 1.0, 1000.0, 0));
        assert!(!engine.is_calibrating());
        assert_eq!(engine.baseline(), Some(&Baseline::new(2.0, 1.0, 1000.0)));
        assert_eq!(store.get(), Some(Baseline::new(2.0, 1.0, 1000.0)));
        assert_eq!(engine.snapshot().calibration_samples, 0);
    }

    #[test]
    fn test_calibration_completes_on_elapsed_time() {
        let mut engine = EmotionEngine::default();

        engine.process_behavior_sample(&behavior(3.0, 1.0, 900.0, 0));
        engine.process_behavior_sample(&behavior(1.0, 1.0, 1100.0, 60_000));
        assert!(engine.is_calibrating());

        engine.process_behavior_sample(&behavior(2.0, 1.0, 1000.0, 120_000));
        assert!(!engine.is_calibrating());
        assert_eq!(engine.baseline(), Some(&Baseline::new(2.0, 1.0, 1000.0)));
    }

    #[test]
    fn test_persist_failure_keeps_baseline() {
        let mut engine = EmotionEngine::new(small_calibration(2)).with_baseline_store(FailingStore);
        assert!(engine.is_calibrating());

        engine.process_behavior_sample(&behavior(2.0, 2.0, 2000.0, 0));
        engine.process_behavior_sample(&behavior(2.0, 2.0, 2000.0, 10));

        assert!(!engine.is_calibrating());
        assert_eq!(engine.baseline(), Some(&Baseline::new(2.0, 2.0, 2000.0)));
    }

    #[test]
    fn test_completing_sample_is_silent_when_not_emitting() {
        let config = EngineConfig {
            emit_during_calibration: false,
            ..small_calibration(2)
        };
        let mut engine = EmotionEngine::new(config);

        assert!(engine.process_behavior_sample(&quiet_behavior(0)).is_none());
        assert!(engine.process_behavior_sample(&quiet_behavior(10)).is_none());
        assert!(!engine.is_calibrating());

        let decision = engine.process_behavior_sample(&quiet_behavior(20));
        assert_eq!(decision.unwrap().emotion, Emotion::Neutral);
    }

    #[test]
    fn test_loaded_baseline_skips_calibration() {
        let store = MemoryBaselineStore::with_baseline(Baseline::default());
        let mut engine = EmotionEngine::default().with_baseline_store(store);
        assert!(!engine.is_calibrating());

        // 0.4 * 3.8125 + 0.1 * 0.75 = 1.6
        let record = BehaviorFeatureRecord {
            avg_velocity: Some(3.8125),
            direction_variance: 0.75,
            timestamp: Some(at(0)),
            ..Default::default()
        };
        let decision = engine.process_behavior_sample(&record).unwrap();
        assert_eq!(decision.emotion, Emotion::Frustrated);
        assert!((decision.confidence - 0.79).abs() < 1e-9);
        assert!(!engine.latest_behavior_features().unwrap().used_fallback_baseline);
        assert_eq!(engine.snapshot().calibration_samples, 0);
    }

    #[test]
    fn test_failed_load_stays_calibrating() {
        let mut engine = EmotionEngine::default();
        assert!(!engine.load_baseline_from(&FailingStore));
        assert!(engine.is_calibrating());
    }

    #[test]
    fn test_install_baseline_mid_calibration() {
        let mut engine = EmotionEngine::default();
        engine.process_behavior_sample(&quiet_behavior(0));
        assert_eq!(engine.snapshot().calibration_samples, 1);

        assert!(engine.install_baseline(Baseline::new(2.0, 2.0, 1000.0)));
        assert!(!engine.is_calibrating());
        assert_eq!(engine.snapshot().calibration_samples, 0);

        assert!(!engine.install_baseline(Baseline::new(0.0, 1.0, 1.0)));
        assert_eq!(engine.baseline(), Some(&Baseline::new(2.0, 2.0, 1000.0)));
    }

    #[test]
    fn test_webcam_admission() {
        let mut engine = EmotionEngine::default();

        assert!(engine.process_webcam_sample(&webcam(Emotion::Happy, 0.74, 0)).is_none());
        assert!(engine.latest_webcam().is_none());

        let mut no_confidence = webcam(Emotion::Happy, 0.9, 0);
        no_confidence.confidence = None;
        assert!(engine.process_webcam_sample(&no_confidence).is_none());

        let mut nan = webcam(Emotion::Happy, 0.9, 0);
        nan.confidence = Some(f64::NAN);
        assert!(engine.process_webcam_sample(&nan).is_none());
        assert!(engine.latest_webcam().is_none());
        assert_eq!(engine.smoother().len(), 0);

        let decision = engine.process_webcam_sample(&webcam(Emotion::Happy, 0.8, 0)).unwrap();
        assert_eq!(decision.emotion, Emotion::Happy);
        assert!((decision.confidence - 0.8).abs() < 1e-9);
        assert_eq!(decision.source, DecisionSource::Hybrid);
    }

    #[test]
    fn test_infinite_webcam_magnitudes_keep_history_finite() {
        let mut engine = EmotionEngine::default();
        let mut record = webcam(Emotion::Happy, 0.9, 0);
        record.head_movement = f64::INFINITY;
        record.brow_tension = f64::INFINITY;

        let decision = engine.process_webcam_sample(&record).unwrap();
        assert!((decision.confidence - 0.9).abs() < 1e-9);

        engine.process_webcam_sample(&webcam(Emotion::Happy, 0.8, 100));
        let mean = engine.smoother().mean_confidence().unwrap();
        assert!(mean.is_finite());
        assert!((mean - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_rejected_webcam_keeps_previous_latest() {
        let mut engine = EmotionEngine::default();
        engine.process_webcam_sample(&webcam(Emotion::Happy, 0.8, 0));
        engine.process_webcam_sample(&webcam(Emotion::Calm, 0.5, 100));
        assert_eq!(engine.latest_webcam().unwrap().emotion, Emotion::Happy);
    }

    #[test]
    fn test_hybrid_flow() {
        let mut engine = EmotionEngine::default();

        let first = engine.process_behavior_sample(&quiet_behavior(0)).unwrap();
        assert_eq!(first.emotion, Emotion::Neutral);

        // fused happy 0.70, but history [neutral, happy] votes neutral inside the cooldown
        assert!(engine
            .process_webcam_sample(&webcam(Emotion::Happy, 0.8, 100))
            .is_none());

        let decision = engine
            .process_webcam_sample(&webcam(Emotion::Happy, 0.8, 2_500))
            .unwrap();
        assert_eq!(decision.emotion, Emotion::Happy);
        assert!((decision.confidence - 0.65).abs() < 1e-9);
        assert_eq!(decision.source, DecisionSource::Hybrid);
    }

    #[test]
    fn test_responsive_cooldown() {
        let mut engine = EmotionEngine::default();
        assert!(engine.process_behavior_sample(&quiet_behavior(0)).is_some());
        assert!(engine.process_behavior_sample(&quiet_behavior(1_999)).is_none());
        assert!(engine.process_behavior_sample(&quiet_behavior(2_000)).is_some());
    }

    #[test]
    fn test_clock_used_without_timestamps() {
        let mut engine = EmotionEngine::default().with_clock(FixedClock(t0()));
        let record = BehaviorFeatureRecord::default();

        assert!(engine.process_behavior_sample(&record).is_some());
        assert!(engine.process_behavior_sample(&record).is_none());
        assert_eq!(engine.snapshot().last_emitted_at, Some(t0()));
    }

    #[test]
    fn test_missing_behavior_scorer() {
        let mut engine = EmotionEngine::default().without_behavior_scorer();

        assert!(engine.process_behavior_sample(&quiet_behavior(0)).is_none());
        assert!(engine.latest_behavior().is_none());
        assert_eq!(engine.snapshot().calibration_samples, 1);

        let decision = engine.process_webcam_sample(&webcam(Emotion::Happy, 0.8, 10)).unwrap();
        assert_eq!(decision.source, DecisionSource::Hybrid);
    }

    #[test]
    fn test_abstaining_scorer_clears_latest() {
        let mut engine = EmotionEngine::default();
        engine.process_behavior_sample(&quiet_behavior(0));
        assert!(engine.latest_behavior().is_some());

        let mut engine = engine.with_behavior_scorer(FnScorer(
            |_: &NormalizedBehaviorFeatures| -> Option<ChannelResult> { None },
        ));
        engine.process_behavior_sample(&quiet_behavior(10));
        assert!(engine.latest_behavior().is_none());
    }

    #[test]
    fn test_custom_webcam_scorer() {
        let scorer = FnScorer(|record: &WebcamFeatureRecord| {
            Some(ChannelResult::new(record.emotion.clone(), 0.9))
        });
        let mut engine = EmotionEngine::default().with_webcam_scorer(scorer);

        let decision = engine.process_webcam_sample(&webcam(Emotion::Focused, 0.76, 0)).unwrap();
        assert_eq!(decision.emotion, Emotion::Focused);
        assert!((decision.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_disabled_channel_preserves_state() {
        let mut engine = EmotionEngine::default();
        engine.process_behavior_sample(&quiet_behavior(0));
        engine.set_channel_enabled(Channel::Webcam, false);
        assert!(!engine.is_channel_enabled(Channel::Webcam));

        assert!(engine.process_webcam_sample(&webcam(Emotion::Happy, 0.9, 100)).is_none());
        assert!(engine.latest_webcam().is_none());
        assert!(engine.latest_behavior().is_some());
        assert_eq!(engine.smoother().len(), 1);

        engine.set_channel_enabled(Channel::Webcam, true);
        assert!(engine.process_webcam_sample(&webcam(Emotion::Happy, 0.9, 200)).is_none());
        assert!(engine.latest_webcam().is_some());
        assert_eq!(engine.smoother().len(), 2);
    }

    #[test]
    fn test_disabled_behavior_channel_skips_calibration() {
        let mut engine = EmotionEngine::default();
        engine.set_channel_enabled(Channel::Behavior, false);
        assert!(engine.process_behavior_sample(&quiet_behavior(0)).is_none());
        assert_eq!(engine.snapshot().calibration_samples, 0);
    }

    #[test]
    fn test_reset_channel() {
        let mut engine = EmotionEngine::default();
        engine.process_behavior_sample(&quiet_behavior(0));
        engine.process_webcam_sample(&webcam(Emotion::Happy, 0.8, 100));

        engine.reset_channel(Channel::Webcam);
        assert!(engine.latest_webcam().is_none());
        assert!(engine.latest_behavior().is_some());
        assert_eq!(engine.smoother().len(), 2);
    }

    #[test]
    fn test_facial_signals_fallbacks() {
        let mut engine = EmotionEngine::default().with_clock(FixedClock(t0()));

        // default confidence 0.6 is below admission
        let signals = FacialSignals {
            emotion: Some(Emotion::Happy),
            ..Default::default()
        };
        assert!(engine.infer_from_facial_signals(signals).is_none());
        assert!(engine.latest_webcam().is_none());

        let signals = FacialSignals {
            emotion: Some(Emotion::Focused),
            confidence: Some(0.8),
            eyebrow_raise: Some(0.5),
            ..Default::default()
        };
        let decision = engine.infer_from_facial_signals(signals).unwrap();
        assert_eq!(decision.emotion, Emotion::Focused);
        assert!((decision.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_process_json() {
        let mut engine = EmotionEngine::default();

        assert!(engine.process_json("{not json").is_none());
        assert!(engine.process_json(r#"{"channel": "audio"}"#).is_none());
        assert_eq!(engine.snapshot().calibration_samples, 0);

        let decision = engine
            .process_json(r#"{"channel": "webcam", "emotion": "happy", "confidence": 0.8, "timestamp": 1705327200000}"#)
            .unwrap();
        assert_eq!(decision.emotion, Emotion::Happy);

        let decision = engine
            .process_json(r#"{"channel": "behavior", "avgVelocity": 0.0, "timestamp": 1705327200100}"#);
        assert!(decision.is_none());
        assert_eq!(engine.snapshot().calibration_samples, 1);
    }

    #[test]
    fn test_untagged_json_entry_points() {
        let mut engine = EmotionEngine::default();
        assert!(engine.process_behavior_json("velocity=3").is_none());
        assert!(engine.process_webcam_json("").is_none());

        let decision = engine.process_behavior_json(r#"{"timestamp": 1705327200000}"#);
        assert_eq!(decision.unwrap().emotion, Emotion::Neutral);

        // history [neutral, happy] still votes neutral inside the cooldown
        let decision = engine
            .process_webcam_json(r#"{"emotion": "happy", "confidence": 0.9, "timestamp": 1705327200100}"#);
        assert!(decision.is_none());
        assert_eq!(engine.latest_webcam().unwrap().emotion, Emotion::Happy);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut engine = EmotionEngine::default();
        engine.process_behavior_sample(&quiet_behavior(0));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.gate_policy, GatePolicy::Responsive);
        assert_eq!(snapshot.last_emitted_emotion, Some(Emotion::Neutral));
        assert_eq!(snapshot.history_len, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["gate_policy"], "responsive");
        assert_eq!(json["last_emitted_at"], 1_705_327_200_000i64);
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut a = EmotionEngine::default();
        let b = EmotionEngine::default();
        a.process_behavior_sample(&quiet_behavior(0));

        assert_ne!(a.session_id(), b.session_id());
        assert!(b.latest_behavior().is_none());
    }
}
