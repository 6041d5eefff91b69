//! Concurrent agent fan-out.
//!
//! Each iteration dispatches every enabled agent as its own tokio task
//! and waits for all of them at a single barrier. Agent failures are
//! isolated: one agent faulting (or panicking) never cancels the others,
//! and the barrier always yields one outcome per dispatched agent.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::config::LoopConfig;
use crate::error::{KaizenError, Result};
use crate::recovery::{
    ClassifiedError, ErrorBuckets, ErrorSeverity, ErrorType, RecoveryAdvisor, RetryExecutor,
};

use super::{AgentContext, AgentOutcome, AgentRegistry, AgentTask};

/// Dispatches enabled agents concurrently and collects their outcomes.
pub struct AgentOrchestrator {
    agents: Vec<Arc<dyn AgentTask>>,
    retry: Arc<RetryExecutor>,
    advisor: RecoveryAdvisor,
    fail_fast: bool,
}

impl std::fmt::Debug for AgentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOrchestrator")
            .field("agents", &self.agents)
            .field("fail_fast", &self.fail_fast)
            .finish_non_exhaustive()
    }
}

impl AgentOrchestrator {
    /// Build an orchestrator for the run described by `config`.
    ///
    /// Agent ids are resolved against the registry here, so an unknown id
    /// fails before the first iteration.
    ///
    /// # Errors
    ///
    /// Returns [`KaizenError::UnknownAgent`] for an enabled id missing
    /// from the registry.
    pub fn new(registry: &AgentRegistry, config: &LoopConfig, buckets: ErrorBuckets) -> Result<Self> {
        let agents = registry.resolve(&config.enabled_agents)?;
        let advisor = RecoveryAdvisor::new(buckets, config.fail_fast);
        Ok(Self {
            agents,
            retry: Arc::new(RetryExecutor::new(config.retry.clone(), advisor.clone())),
            advisor,
            fail_fast: config.fail_fast,
        })
    }

    /// Ids of the agents this orchestrator dispatches, in dispatch order.
    #[must_use]
    pub fn agent_ids(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.id().to_string()).collect()
    }

    /// Run all agents concurrently for one iteration.
    ///
    /// Returns one outcome per agent, in dispatch order, after every
    /// agent has settled. In-flight agents are never cancelled; a
    /// fail-fast abort is checked only after this barrier.
    ///
    /// # Errors
    ///
    /// Returns [`KaizenError::AgentAbort`] when fail-fast is on and any
    /// agent settled with a Critical fault.
    pub async fn run_iteration(&self, ctx: &AgentContext) -> Result<Vec<AgentOutcome>> {
        info!(
            iteration = ctx.iteration,
            agents = self.agents.len(),
            "dispatching agents"
        );

        let handles: Vec<_> = self
            .agents
            .iter()
            .map(|agent| {
                let agent = agent.clone();
                let ctx = ctx.clone();
                let retry = self.retry.clone();
                tokio::spawn(async move { run_agent(agent, ctx, retry).await })
            })
            .collect();

        let settled = join_all(handles).await;

        let mut outcomes = Vec::with_capacity(settled.len());
        for (agent, joined) in self.agents.iter().zip(settled) {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    // A panicking agent still yields an outcome.
                    warn!(agent_id = agent.id(), "agent task panicked: {join_error}");
                    let classified = ClassifiedError::new(
                        format!("agent panicked: {join_error}"),
                        ErrorType::Unknown,
                        ErrorSeverity::High,
                    )
                    .with_context(format!("agent {}", agent.id()));
                    let _ = self.advisor.attempt_recovery(classified.clone(), &[]);
                    AgentOutcome::failure(agent.id(), classified)
                }
            };
            outcomes.push(outcome);
        }

        // All agents have settled; only now may fail-fast abort the run.
        if self.fail_fast {
            if let Some(outcome) = outcomes
                .iter()
                .find(|o| o.error.as_ref().is_some_and(ClassifiedError::is_critical))
            {
                return Err(KaizenError::AgentAbort {
                    agent_id: outcome.agent_id.clone(),
                    error: outcome.error.clone().unwrap_or_else(|| {
                        ClassifiedError::new(
                            "critical fault",
                            ErrorType::Unknown,
                            ErrorSeverity::Critical,
                        )
                    }),
                });
            }
        }

        Ok(outcomes)
    }
}

async fn run_agent(
    agent: Arc<dyn AgentTask>,
    ctx: AgentContext,
    retry: Arc<RetryExecutor>,
) -> AgentOutcome {
    let agent_id = agent.id().to_string();
    let label = format!("agent {agent_id}");
    let alternates = ctx.alternate_paths.clone();

    // Filing happens inside the retry loop, once per failed attempt;
    // escalation still waits for the iteration barrier.
    let result = retry
        .execute_with_retry(&label, &alternates, move || {
            let agent = agent.clone();
            let ctx = ctx.clone();
            async move { agent.execute(&ctx).await }
        })
        .await;

    match result {
        Ok(report) => {
            debug!(%agent_id, score = ?report.score, "agent completed");
            AgentOutcome::success(agent_id, report)
        }
        Err(classified) => {
            debug!(%agent_id, "agent settled with fault: {}", classified.message);
            AgentOutcome::failure(agent_id, classified)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::testing::MockAgent;

    fn registry(agents: Vec<MockAgent>) -> AgentRegistry {
        let mut registry = AgentRegistry::new();
        for agent in agents {
            registry.register(Arc::new(agent));
        }
        registry
    }

    fn config(ids: &[&str]) -> LoopConfig {
        LoopConfig::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_all_agents_yield_outcomes_in_dispatch_order() {
        let registry = registry(vec![
            MockAgent::scoring("a", 70.0),
            MockAgent::scoring("b", 80.0),
        ]);
        let orchestrator =
            AgentOrchestrator::new(&registry, &config(&["b", "a"]), ErrorBuckets::new()).unwrap();
        let outcomes = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].agent_id, "b");
        assert_eq!(outcomes[1].agent_id, "a");
        assert!(outcomes.iter().all(|o| o.success));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let registry = registry(vec![
            MockAgent::scoring("good", 90.0),
            MockAgent::failing("bad", "operation timed out"),
        ]);
        let buckets = ErrorBuckets::new();
        let mut cfg = config(&["good", "bad"]);
        cfg.retry = cfg.retry.with_max_attempts(1).with_retry_delay_ms(1);
        let orchestrator = AgentOrchestrator::new(&registry, &cfg, buckets.clone()).unwrap();

        let outcomes = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap();
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
        assert_eq!(
            outcomes[1].error.as_ref().unwrap().error_type,
            ErrorType::Timeout
        );
        // Medium severity files as a warning.
        assert_eq!(buckets.warning_count(), 1);
    }

    #[tokio::test]
    async fn test_retried_faults_are_filed_per_attempt() {
        let flaky = MockAgent::new("flaky").with_failures_then_score(2, "operation timed out", 88.0);
        let registry = registry(vec![flaky]);
        let buckets = ErrorBuckets::new();
        let mut cfg = config(&["flaky"]);
        cfg.retry = cfg.retry.with_max_attempts(3).with_retry_delay_ms(1);
        let orchestrator = AgentOrchestrator::new(&registry, &cfg, buckets.clone()).unwrap();

        let outcomes = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap();
        assert!(outcomes[0].success);
        // Both timed-out attempts were filed even though the agent recovered.
        assert_eq!(buckets.warning_count(), 2);
        assert_eq!(buckets.error_count(), 0);
    }

    #[tokio::test]
    async fn test_permission_fault_runs_agent_exactly_once() {
        let failing = MockAgent::failing("locked", "EACCES: permission denied");
        let calls = failing.call_counter();
        let registry = registry(vec![failing]);
        let mut cfg = config(&["locked"]);
        cfg.retry = cfg.retry.with_max_attempts(3).with_retry_delay_ms(1);
        let orchestrator =
            AgentOrchestrator::new(&registry, &cfg, ErrorBuckets::new()).unwrap();

        let outcomes = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap();
        assert!(!outcomes[0].success);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fail_fast_aborts_after_barrier_on_critical() {
        let survivor = MockAgent::scoring("ok", 50.0);
        let survivor_calls = survivor.call_counter();
        let registry = registry(vec![
            survivor,
            MockAgent::failing("broken", "invalid configuration detected"),
        ]);
        let mut cfg = config(&["ok", "broken"]).with_fail_fast(true);
        cfg.retry = cfg.retry.with_max_attempts(1).with_retry_delay_ms(1);
        let orchestrator =
            AgentOrchestrator::new(&registry, &cfg, ErrorBuckets::new()).unwrap();

        let err = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap_err();
        assert!(matches!(err, KaizenError::AgentAbort { ref agent_id, .. } if agent_id == "broken"));
        // The healthy agent still ran to completion before the abort.
        assert_eq!(survivor_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_critical_without_fail_fast_is_absorbed() {
        let registry = registry(vec![MockAgent::failing(
            "broken",
            "invalid configuration detected",
        )]);
        let mut cfg = config(&["broken"]);
        cfg.retry = cfg.retry.with_max_attempts(1).with_retry_delay_ms(1);
        let orchestrator =
            AgentOrchestrator::new(&registry, &cfg, ErrorBuckets::new()).unwrap();

        let outcomes = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap();
        assert!(!outcomes[0].success);
    }

    #[tokio::test]
    async fn test_panicking_agent_yields_failure_outcome() {
        let registry = registry(vec![
            MockAgent::panicking("explosive"),
            MockAgent::scoring("calm", 60.0),
        ]);
        let mut cfg = config(&["explosive", "calm"]);
        cfg.retry = cfg.retry.with_max_attempts(1).with_retry_delay_ms(1);
        let orchestrator =
            AgentOrchestrator::new(&registry, &cfg, ErrorBuckets::new()).unwrap();

        let outcomes = orchestrator
            .run_iteration(&AgentContext::new("/tmp/target"))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!(outcomes[0]
            .error
            .as_ref()
            .unwrap()
            .message
            .contains("panicked"));
        assert!(outcomes[1].success);
    }

    #[tokio::test]
    async fn test_unknown_agent_fails_at_construction() {
        let registry = AgentRegistry::new();
        let err =
            AgentOrchestrator::new(&registry, &config(&["ghost"]), ErrorBuckets::new()).unwrap_err();
        assert!(matches!(err, KaizenError::UnknownAgent { .. }));
    }
}
