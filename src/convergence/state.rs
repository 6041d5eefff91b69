//! Loop phases, iteration records, and status snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentOutcome;

/// Lifecycle phase of the convergence loop.
///
/// `Idle` and `Running` are transient; everything else is terminal for
/// the run (a `reset()` returns the controller to `Idle`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// No run has started, or the controller was reset.
    #[default]
    Idle,
    /// A run is in progress.
    Running,
    /// The iteration cap was reached without another stop condition.
    Completed,
    /// The aggregate score met or exceeded the target.
    TargetReached,
    /// The score failed to improve for the configured streak.
    Converged,
    /// A cooperative stop took effect at an iteration boundary.
    Stopped,
    /// A run-aborting fault ended the run.
    Failed,
}

impl LoopPhase {
    /// Whether this phase ends a run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Running)
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TargetReached => "target_reached",
            Self::Converged => "converged",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sealed record of one iteration.
///
/// Records are immutable once built and totally ordered by `index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based iteration index.
    pub index: u32,
    /// When the iteration's fan-out began.
    pub started_at: DateTime<Utc>,
    /// When the last agent settled.
    pub finished_at: DateTime<Utc>,
    /// One outcome per dispatched agent, in dispatch order.
    pub outcomes: Vec<AgentOutcome>,
    /// Aggregate score: max over successful agents' scores, if any.
    pub score: Option<f64>,
    /// Improvements from all agents, concatenated in dispatch order.
    pub improvements: Vec<String>,
    /// Issues from all agents, concatenated in dispatch order.
    pub issues: Vec<String>,
}

impl IterationRecord {
    /// Seal a record from the settled outcomes of one iteration.
    #[must_use]
    pub fn from_outcomes(
        index: u32,
        started_at: DateTime<Utc>,
        outcomes: Vec<AgentOutcome>,
    ) -> Self {
        let score = outcomes
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.score)
            .fold(None, |best: Option<f64>, s| {
                Some(best.map_or(s, |b| b.max(s)))
            });
        let improvements = outcomes
            .iter()
            .flat_map(|o| o.improvements.iter().cloned())
            .collect();
        let issues = outcomes
            .iter()
            .flat_map(|o| o.issues.iter().cloned())
            .collect();
        Self {
            index,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            score,
            improvements,
            issues,
        }
    }

    /// Count of agents that completed without fault.
    #[must_use]
    pub fn successful_agents(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    /// Count of agents that faulted.
    #[must_use]
    pub fn failed_agents(&self) -> usize {
        self.outcomes.len() - self.successful_agents()
    }
}

/// Point-in-time view of the controller's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopStatus {
    /// Whether a run is currently in progress.
    pub is_running: bool,
    /// Index of the most recently started iteration (0 before any run).
    pub current_iteration: u32,
    /// Most recent aggregate score, if any iteration scored.
    pub last_score: Option<f64>,
    /// Current non-improvement streak.
    pub convergence_count: u32,
    /// Current lifecycle phase.
    pub phase: LoopPhase,
    /// Sealed records of completed iterations, in order.
    pub history: Vec<IterationRecord>,
}

impl Default for LoopStatus {
    fn default() -> Self {
        Self {
            is_running: false,
            current_iteration: 0,
            last_score: None,
            convergence_count: 0,
            phase: LoopPhase::Idle,
            history: Vec::new(),
        }
    }
}
