//! Score and duration accumulation across iterations.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Accumulates per-iteration scores and durations for one run.
///
/// Owned exclusively by the controller; mutated only from its iteration
/// sequence.
#[derive(Debug, Clone, Default)]
pub struct LoopMetrics {
    scores: Vec<f64>,
    durations: Vec<Duration>,
}

impl LoopMetrics {
    /// Empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one iteration's aggregate score and wall time.
    ///
    /// Iterations where no agent scored are recorded for the duration
    /// only, so `total_iterations` still counts them.
    pub fn record(&mut self, score: Option<f64>, duration: Duration) {
        if let Some(score) = score {
            self.scores.push(score);
        }
        self.durations.push(duration);
    }

    /// Number of iterations recorded.
    #[must_use]
    pub fn total_iterations(&self) -> u32 {
        self.durations.len() as u32
    }

    /// Most recent score, if any iteration scored.
    #[must_use]
    pub fn current_score(&self) -> Option<f64> {
        self.scores.last().copied()
    }

    /// Best score seen so far.
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        self.scores
            .iter()
            .copied()
            .fold(None, |best: Option<f64>, s| {
                Some(best.map_or(s, |b| b.max(s)))
            })
    }

    /// Mean of all recorded scores.
    #[must_use]
    pub fn average_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
        }
    }

    /// Total wall time across recorded iterations.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.durations.iter().sum()
    }

    /// Clear all recorded data.
    pub fn reset(&mut self) {
        self.scores.clear();
        self.durations.clear();
    }
}

/// Serializable snapshot of run metrics for the status surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Iterations recorded so far.
    pub total_iterations: u32,
    /// Configured target score.
    pub target_score: f64,
    /// Most recent aggregate score.
    pub current_score: Option<f64>,
    /// Configured non-improvement streak limit.
    pub convergence_threshold: u32,
    /// Current non-improvement streak.
    pub convergence_count: u32,
    /// Mean of recorded scores.
    pub average_score: Option<f64>,
}
