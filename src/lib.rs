//! Emotion Flux - On-device fusion and stabilization engine for emotion signals
//!
//! Flux turns two noisy, differently-paced signal streams (interaction behavior
//! and webcam-derived facial heuristics) into a stable, low-churn emotion label
//! through a deterministic pipeline: calibration → normalization → per-channel
//! scoring → hybrid fusion → temporal smoothing → stability gate.
//!
//! ## Usage
//!
//! ```
//! use emotion_flux::{BehaviorFeatureRecord, EmotionEngine, EngineConfig};
//!
//! let mut engine = EmotionEngine::new(EngineConfig::responsive());
//! let decision = engine.process_behavior_sample(&BehaviorFeatureRecord::default());
//! assert!(decision.is_some());
//! ```

pub mod baseline;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod gate;
pub mod normalizer;
pub mod scoring;
pub mod smoothing;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use baseline::{Baseline, BaselineStore, JsonFileBaselineStore, MemoryBaselineStore};
pub use calibration::{compute_baseline, CalibrationCollector, CalibrationProgress};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{EngineConfig, GatePolicy};
pub use engine::{EmotionEngine, EngineSnapshot};
pub use error::EngineError;
pub use fusion::HybridFuser;
pub use gate::{StabilityGate, Suppression};
pub use normalizer::FeatureNormalizer;
pub use scoring::{ChannelScorer, FnScorer, RuleBehaviorScorer, RuleWebcamScorer};
pub use smoothing::TemporalSmoother;
pub use types::{
    BehaviorFeatureRecord, Channel, ChannelRecord, ChannelResult, DecisionSource, Emotion,
    FacialSignals, FinalDecision, FusedDecision, NormalizedBehaviorFeatures, SmoothedDecision,
    WebcamFeatureRecord,
};

/// Engine version reported by the CLI and FFI
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "emotion-flux";
