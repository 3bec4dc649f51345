//! Personal behavior baseline and its persistence
//!
//! The baseline holds the user's "resting" pointer velocity, acceleration and
//! hover time. It is read once at session start, derived once by calibration
//! and persisted best-effort; the in-memory copy is authoritative for the session.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::EngineError;

/// Default baseline velocity when none can be derived
pub const DEFAULT_NORMAL_VELOCITY: f64 = 1.0;

/// Default baseline acceleration when none can be derived
pub const DEFAULT_NORMAL_ACCELERATION: f64 = 1.0;

/// Default baseline hover time (ms) when none can be derived
pub const DEFAULT_NORMAL_HOVER_TIME: f64 = 1500.0;

/// Personal reference values for "normal" behavioral intensity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub normal_velocity: f64,
    pub normal_acceleration: f64,
    pub normal_hover_time: f64,
}

impl Default for Baseline {
    fn default() -> Self {
        Self {
            normal_velocity: DEFAULT_NORMAL_VELOCITY,
            normal_acceleration: DEFAULT_NORMAL_ACCELERATION,
            normal_hover_time: DEFAULT_NORMAL_HOVER_TIME,
        }
    }
}

impl Baseline {
    pub fn new(normal_velocity: f64, normal_acceleration: f64, normal_hover_time: f64) -> Self {
        Self {
            normal_velocity,
            normal_acceleration,
            normal_hover_time,
        }
    }

    /// All components positive and finite
    pub fn is_valid(&self) -> bool {
        [
            self.normal_velocity,
            self.normal_acceleration,
            self.normal_hover_time,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }

    /// Load a baseline from JSON, rejecting non-positive components
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let baseline: Self = serde_json::from_str(json)?;
        if !baseline.is_valid() {
            return Err(EngineError::InvalidBaseline(format!("{baseline:?}")));
        }
        Ok(baseline)
    }

    /// Serialize baseline to JSON
    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self).map_err(EngineError::JsonError)
    }
}

/// Persistence capability for the baseline.
///
/// Implementations decide where the baseline lives. The engine treats every
/// failure as non-fatal.
pub trait BaselineStore: Send {
    /// Read the persisted baseline, if any
    fn load(&self) -> Result<Option<Baseline>, EngineError>;

    /// Persist a freshly calibrated baseline
    fn persist(&self, baseline: &Baseline) -> Result<(), EngineError>;
}

/// In-memory store; clones share the same slot
#[derive(Debug, Clone, Default)]
pub struct MemoryBaselineStore {
    slot: Arc<Mutex<Option<Baseline>>>,
}

impl MemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baseline(baseline: Baseline) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(baseline))),
        }
    }

    /// Current content of the slot
    pub fn get(&self) -> Option<Baseline> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl BaselineStore for MemoryBaselineStore {
    fn load(&self) -> Result<Option<Baseline>, EngineError> {
        let slot = self
            .slot
            .lock()
            .map_err(|e| EngineError::BaselineLoad(e.to_string()))?;
        Ok(slot.clone())
    }

    fn persist(&self, baseline: &Baseline) -> Result<(), EngineError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|e| EngineError::BaselinePersist(e.to_string()))?;
        *slot = Some(baseline.clone());
        Ok(())
    }
}

/// Store backed by a single JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonFileBaselineStore {
    path: PathBuf,
}

impl JsonFileBaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BaselineStore for JsonFileBaselineStore {
    fn load(&self) -> Result<Option<Baseline>, EngineError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| EngineError::BaselineLoad(format!("{}: {e}", self.path.display())))?;
        Baseline::from_json(&content).map(Some)
    }

    fn persist(&self, baseline: &Baseline) -> Result<(), EngineError> {
        let json = baseline.to_json()?;
        fs::write(&self.path, json)
            .map_err(|e| EngineError::BaselinePersist(format!("{}: {e}", self.path.display())))
    }
}
