//! Analysis agents and their orchestration.
//!
//! An agent is one unit of analysis (structure, security, tests, ...)
//! behind the [`AgentTask`] trait. The [`AgentOrchestrator`] fans enabled
//! agents out concurrently each iteration and collects one
//! [`AgentOutcome`] per agent, success or failure.

mod orchestrator;

pub use orchestrator::AgentOrchestrator;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{KaizenError, Result};
use crate::recovery::ClassifiedError;

// ============================================================================
// Task Trait
// ============================================================================

/// One unit of analysis work.
///
/// Implementations must be safe to invoke concurrently with other agents
/// and must not assume any ordering relative to them.
#[async_trait]
pub trait AgentTask: Send + Sync {
    /// Stable identifier for the agent, unique within a registry.
    fn id(&self) -> &str;

    /// Run the analysis against the context's target.
    ///
    /// # Errors
    ///
    /// Any fault; the orchestrator classifies it and folds it into the
    /// agent's outcome.
    async fn execute(&self, ctx: &AgentContext) -> anyhow::Result<AgentReport>;
}

/// What an agent produced on success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentReport {
    /// Score in `[0, 100]`, if the agent scores its dimension.
    pub score: Option<f64>,
    /// Improvements the agent applied or proposed.
    pub improvements: Vec<String>,
    /// Issues the agent found but did not fix.
    pub issues: Vec<String>,
}

impl AgentReport {
    /// A report carrying only a score.
    #[must_use]
    pub fn scored(score: f64) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }
}

/// Read-only context handed to every agent in an iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    /// Directory under analysis.
    pub target_dir: PathBuf,
    /// Alternate paths for file-access recovery.
    pub alternate_paths: Vec<PathBuf>,
    /// Current iteration index (1-based).
    pub iteration: u32,
    /// Free-form metadata shared across agents.
    pub metadata: HashMap<String, String>,
}

impl AgentContext {
    /// Context for the given target with no alternates or metadata.
    #[must_use]
    pub fn new(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            alternate_paths: Vec::new(),
            iteration: 0,
            metadata: HashMap::new(),
        }
    }

    /// Set the iteration index.
    #[must_use]
    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = iteration;
        self
    }

    /// Add alternate paths for recovery.
    #[must_use]
    pub fn with_alternate_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.alternate_paths = paths;
        self
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of one agent's work in one iteration.
///
/// Every dispatched agent yields exactly one outcome; a failed agent is
/// an outcome with `success == false` and a classified error, never a
/// missing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Agent that produced this outcome.
    pub agent_id: String,
    /// Whether the agent completed without fault.
    pub success: bool,
    /// Score reported by the agent, if any.
    pub score: Option<f64>,
    /// Improvements from the agent's report.
    pub improvements: Vec<String>,
    /// Issues from the agent's report.
    pub issues: Vec<String>,
    /// Classified fault for a failed agent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
}

impl AgentOutcome {
    /// Outcome for an agent that completed.
    #[must_use]
    pub fn success(agent_id: impl Into<String>, report: AgentReport) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: true,
            score: report.score,
            improvements: report.improvements,
            issues: report.issues,
            error: None,
        }
    }

    /// Outcome for an agent that faulted.
    #[must_use]
    pub fn failure(agent_id: impl Into<String>, error: ClassifiedError) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: false,
            score: None,
            improvements: Vec::new(),
            issues: Vec::new(),
            error: Some(error),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Maps agent ids to their implementations.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn AgentTask>>,
}

impl AgentRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under its own id, replacing any previous entry.
    pub fn register(&mut self, agent: Arc<dyn AgentTask>) {
        self.agents.insert(agent.id().to_string(), agent);
    }

    /// Look up an agent by id.
    #[must_use]
    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn AgentTask>> {
        self.agents.get(agent_id).cloned()
    }

    /// Resolve a list of ids, failing on the first unknown one.
    ///
    /// # Errors
    ///
    /// Returns [`KaizenError::UnknownAgent`] naming the first id not in
    /// the registry.
    pub fn resolve(&self, agent_ids: &[String]) -> Result<Vec<Arc<dyn AgentTask>>> {
        agent_ids
            .iter()
            .map(|id| {
                self.get(id).ok_or_else(|| KaizenError::UnknownAgent {
                    agent_id: id.clone(),
                })
            })
            .collect()
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for dyn AgentTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTask").field("id", &self.id()).finish()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.agents.keys().collect();
        ids.sort();
        f.debug_struct("AgentRegistry").field("agents", &ids).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAgent;

    #[test]
    fn test_registry_register_and_get() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(MockAgent::scoring("structure", 80.0)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("structure").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_resolve_unknown_agent_names_the_id() {
        let registry = AgentRegistry::new();
        let err = registry.resolve(&["ghost".to_string()]).unwrap_err();
        assert!(matches!(err, KaizenError::UnknownAgent { ref agent_id } if agent_id == "ghost"));
    }

    #[test]
    fn test_resolve_preserves_order() {
        let mut registry = AgentRegistry::new();
        registry.register(Arc::new(MockAgent::scoring("a", 1.0)));
        registry.register(Arc::new(MockAgent::scoring("b", 2.0)));
        let resolved = registry
            .resolve(&["b".to_string(), "a".to_string()])
            .unwrap();
        assert_eq!(resolved[0].id(), "b");
        assert_eq!(resolved[1].id(), "a");
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = AgentOutcome::success("tests", AgentReport::scored(75.0));
        assert!(ok.success);
        assert_eq!(ok.score, Some(75.0));
        assert!(ok.error.is_none());

        let failed = AgentOutcome::failure(
            "tests",
            ClassifiedError::new(
                "boom",
                crate::recovery::ErrorType::Unknown,
                crate::recovery::ErrorSeverity::Medium,
            ),
        );
        assert!(!failed.success);
        assert!(failed.score.is_none());
        assert!(failed.error.is_some());
    }
}
