//! Temporal smoothing
//!
//! Keeps a bounded history of fused decisions, majority-votes the label and
//! averages the confidence. A single outlier cannot flip the label.

use std::collections::VecDeque;

use crate::config::DEFAULT_SMOOTHING_WINDOW;
use crate::types::{Emotion, FusedDecision, SmoothedDecision};

/// Fixed-capacity decision history with majority vote
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    history: VecDeque<FusedDecision>,
    capacity: usize,
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}

impl TemporalSmoother {
    /// Create a smoother holding at most `capacity` decisions (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::new(),
            capacity,
        }
    }

    /// Append `decision`, evicting the oldest on overflow, and vote
    pub fn smooth(&mut self, decision: FusedDecision) -> SmoothedDecision {
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        let current_confidence = decision.confidence;
        let source = decision.source;
        let current_emotion = decision.emotion.clone();
        self.history.push_back(decision);

        let emotion = self.majority().unwrap_or(current_emotion);
        let confidence = self.mean_confidence().unwrap_or(current_confidence);

        SmoothedDecision {
            emotion,
            confidence,
            source,
        }
    }

    /// Most frequent label; ties go to the label seen first in the history
    pub fn majority(&self) -> Option<Emotion> {
        let mut counts: Vec<(&Emotion, usize)> = Vec::new();
        for decision in &self.history {
            if let Some(entry) = counts.iter_mut().find(|entry| entry.0 == &decision.emotion) {
                entry.1 += 1;
            } else {
                counts.push((&decision.emotion, 1));
            }
        }

        let mut best: Option<(&Emotion, usize)> = None;
        for (emotion, count) in counts {
            if best.map_or(true, |(_, max)| count > max) {
                best = Some((emotion, count));
            }
        }
        best.map(|(emotion, _)| emotion.clone())
    }

    /// Arithmetic mean of the confidences in the history
    pub fn mean_confidence(&self) -> Option<f64> {
        if self.history.is_empty() {
            return None;
        }
        let sum: f64 = self.history.iter().map(|d| d.confidence).sum();
        Some(sum / self.history.len() as f64)
    }

    /// Whether the last `run` entries exist and all carry `emotion`
    pub fn trailing_agreement(&self, emotion: &Emotion, run: usize) -> bool {
        self.history.len() >= run
            && self
                .history
                .iter()
                .rev()
                .take(run)
                .all(|d| &d.emotion == emotion)
    }

    /// Decisions currently held, oldest first
    pub fn history(&self) -> impl Iterator<Item = &FusedDecision> {
        self.history.iter()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}
