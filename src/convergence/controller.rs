//! The convergence loop controller.
//!
//! Runs iterations sequentially until a stop condition holds: target
//! score reached (checked first), score stagnant for the configured
//! streak, iteration cap hit, or a cooperative stop. One run at a time;
//! a second `run()` while running raises `AlreadyRunning`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::agent::{AgentContext, AgentOrchestrator, AgentRegistry};
use crate::config::LoopConfig;
use crate::error::{KaizenError, Result};
use crate::event::{Event, EventType};
use crate::hub::AnalysisDriver;
use crate::recovery::ErrorBuckets;

use super::metrics::{LoopMetrics, MetricsSnapshot};
use super::state::{IterationRecord, LoopPhase, LoopStatus};

#[derive(Debug, Default)]
struct RunState {
    phase: LoopPhase,
    current_iteration: u32,
    last_score: Option<f64>,
    convergence_count: u32,
    history: Vec<IterationRecord>,
    metrics: LoopMetrics,
}

struct ControllerInner {
    config: LoopConfig,
    registry: AgentRegistry,
    target: AgentContext,
    buckets: ErrorBuckets,
    running: AtomicBool,
    stop_requested: AtomicBool,
    state: RwLock<RunState>,
    events: std::sync::Mutex<Option<UnboundedSender<Event>>>,
}

/// Drives the convergence loop. Cheap to clone; clones share one run.
#[derive(Clone)]
pub struct ConvergenceController {
    inner: Arc<ControllerInner>,
}

impl std::fmt::Debug for ConvergenceController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvergenceController")
            .field("registry", &self.inner.registry)
            .field("target", &self.inner.target)
            .finish_non_exhaustive()
    }
}

impl ConvergenceController {
    /// Build a controller for the given run configuration and target.
    ///
    /// The configuration is validated and agent ids are checked against
    /// the registry here, so every controller-level fault raises before
    /// any iteration can start.
    ///
    /// # Errors
    ///
    /// Configuration faults ([`KaizenError::InvalidConfig`],
    /// [`KaizenError::NoAgentsEnabled`], [`KaizenError::UnknownAgent`]).
    pub fn new(config: LoopConfig, registry: AgentRegistry, target: AgentContext) -> Result<Self> {
        config.validate()?;
        registry.resolve(&config.enabled_agents)?;
        Ok(Self {
            inner: Arc::new(ControllerInner {
                config,
                registry,
                target,
                buckets: ErrorBuckets::new(),
                running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                state: RwLock::new(RunState::default()),
                events: std::sync::Mutex::new(None),
            }),
        })
    }

    /// Attach the outbound event channel consumed by the hub.
    pub fn set_event_sender(&self, sender: UnboundedSender<Event>) {
        *self.inner.events.lock().unwrap_or_else(|e| e.into_inner()) = Some(sender);
    }

    /// The error buckets this run files faults into.
    #[must_use]
    pub fn buckets(&self) -> &ErrorBuckets {
        &self.inner.buckets
    }

    /// Whether a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run the loop to a terminal phase.
    ///
    /// # Errors
    ///
    /// [`KaizenError::AlreadyRunning`] for a second concurrent run;
    /// [`KaizenError::AgentAbort`] when fail-fast escalates a Critical
    /// agent fault.
    pub async fn run(&self) -> Result<LoopStatus> {
        if self
            .inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(KaizenError::AlreadyRunning);
        }

        let result = self.run_inner().await;
        self.inner.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self) -> Result<LoopStatus> {
        let config = &self.inner.config;
        self.inner.stop_requested.store(false, Ordering::SeqCst);
        self.inner.buckets.reset();

        let orchestrator =
            AgentOrchestrator::new(&self.inner.registry, config, self.inner.buckets.clone())?;

        {
            let mut state = self.inner.state.write().await;
            *state = RunState {
                phase: LoopPhase::Running,
                ..RunState::default()
            };
        }

        info!(
            max_iterations = config.max_iterations,
            target_score = config.target_score,
            agents = ?config.enabled_agents,
            "starting convergence run"
        );
        self.emit(
            EventType::AnalysisStart,
            json!({
                "max_iterations": config.max_iterations,
                "target_score": config.target_score,
                "agents": config.enabled_agents,
            }),
        );

        let mut final_phase = LoopPhase::Completed;

        for iteration in 1..=config.max_iterations {
            // Cooperative stop takes effect only at this boundary.
            if self.inner.stop_requested.load(Ordering::SeqCst) {
                info!(iteration, "stop requested, halting before next iteration");
                final_phase = LoopPhase::Stopped;
                break;
            }

            {
                let mut state = self.inner.state.write().await;
                state.current_iteration = iteration;
            }
            self.emit(EventType::IterationStart, json!({ "iteration": iteration }));

            let ctx = self.inner.target.clone().with_iteration(iteration);
            let started_at = Utc::now();
            let timer = Instant::now();

            let outcomes = match orchestrator.run_iteration(&ctx).await {
                Ok(outcomes) => outcomes,
                Err(fault) => {
                    warn!(iteration, "run aborted: {fault}");
                    self.seal_failure(&fault).await;
                    return Err(fault);
                }
            };

            let record = IterationRecord::from_outcomes(iteration, started_at, outcomes);
            let score = record.score;
            debug!(iteration, score = ?score, "iteration sealed");

            self.emit(
                EventType::IterationEnd,
                json!({
                    "iteration": iteration,
                    "score": score,
                    "successful_agents": record.successful_agents(),
                    "failed_agents": record.failed_agents(),
                    "improvements": record.improvements.len(),
                    "issues": record.issues.len(),
                }),
            );
            if let Some(score) = score {
                self.emit(
                    EventType::ScoreUpdate,
                    json!({ "iteration": iteration, "score": score }),
                );
            }
            self.emit(
                EventType::AnalysisProgress,
                json!({
                    "iteration": iteration,
                    "max_iterations": config.max_iterations,
                    "percent": f64::from(iteration) / f64::from(config.max_iterations) * 100.0,
                    "score": score,
                }),
            );

            let decision = {
                let mut state = self.inner.state.write().await;
                state.metrics.record(score, timer.elapsed());
                state.history.push(record);
                apply_termination_policy(&mut state, config, score)
            };

            if let Some(phase) = decision {
                final_phase = phase;
                break;
            }
            self.emit_status_update().await;
        }

        let status = {
            let mut state = self.inner.state.write().await;
            state.phase = final_phase;
            snapshot(&state, false)
        };

        info!(phase = %final_phase, final_score = ?status.last_score, "run finished");
        self.emit(
            EventType::AnalysisComplete,
            json!({
                "phase": final_phase,
                "final_score": status.last_score,
                "iterations": status.history.len(),
            }),
        );

        Ok(status)
    }

    async fn seal_failure(&self, fault: &KaizenError) {
        {
            let mut state = self.inner.state.write().await;
            state.phase = LoopPhase::Failed;
        }
        self.emit(
            EventType::Notification,
            json!({ "priority": "critical", "message": fault.to_string() }),
        );
        self.emit(
            EventType::AnalysisComplete,
            json!({ "phase": LoopPhase::Failed, "message": fault.to_string() }),
        );
    }

    /// Request a cooperative stop.
    ///
    /// Takes effect before the next iteration starts; in-flight agents
    /// settle normally. A no-op when no run is in progress.
    pub fn stop(&self) {
        if self.is_running() {
            info!("stop requested");
            self.inner.stop_requested.store(true, Ordering::SeqCst);
        }
    }

    /// Clear history, score, and convergence state back to `Idle`.
    ///
    /// # Errors
    ///
    /// [`KaizenError::AlreadyRunning`] while a run is in progress.
    pub async fn reset(&self) -> Result<()> {
        if self.is_running() {
            return Err(KaizenError::AlreadyRunning);
        }
        let mut state = self.inner.state.write().await;
        *state = RunState::default();
        self.inner.buckets.reset();
        Ok(())
    }

    /// Current status snapshot.
    pub async fn status(&self) -> LoopStatus {
        let state = self.inner.state.read().await;
        snapshot(&state, self.is_running())
    }

    /// Current metrics snapshot.
    pub async fn metrics(&self) -> MetricsSnapshot {
        let state = self.inner.state.read().await;
        MetricsSnapshot {
            total_iterations: state.metrics.total_iterations(),
            target_score: self.inner.config.target_score,
            current_score: state.metrics.current_score(),
            convergence_threshold: self.inner.config.convergence_threshold,
            convergence_count: state.convergence_count,
            average_score: state.metrics.average_score(),
        }
    }

    async fn emit_status_update(&self) {
        let status = self.status().await;
        self.emit(
            EventType::StatusUpdate,
            json!({
                "is_running": status.is_running,
                "current_iteration": status.current_iteration,
                "last_score": status.last_score,
                "convergence_count": status.convergence_count,
                "phase": status.phase,
            }),
        );
    }

    fn emit(&self, event_type: EventType, data: serde_json::Value) {
        let events = self.inner.events.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = events.as_ref() {
            // The hub having gone away must not disturb the loop.
            let _ = sender.send(Event::new(event_type, data));
        }
    }
}

/// Apply the per-iteration stop checks. Target score wins over
/// convergence when both would trigger.
fn apply_termination_policy(
    state: &mut RunState,
    config: &LoopConfig,
    score: Option<f64>,
) -> Option<LoopPhase> {
    match score {
        Some(score) => {
            if score >= config.target_score {
                state.last_score = Some(score);
                return Some(LoopPhase::TargetReached);
            }
            if state.last_score.is_some_and(|last| score <= last) {
                state.convergence_count += 1;
            } else {
                state.convergence_count = 0;
            }
            state.last_score = Some(score);
        }
        // No agent scored: nothing improved, so the streak grows.
        None => state.convergence_count += 1,
    }

    if state.convergence_count >= config.convergence_threshold {
        return Some(LoopPhase::Converged);
    }
    None
}

fn snapshot(state: &RunState, is_running: bool) -> LoopStatus {
    LoopStatus {
        is_running,
        current_iteration: state.current_iteration,
        last_score: state.last_score,
        convergence_count: state.convergence_count,
        phase: state.phase,
        history: state.history.clone(),
    }
}

#[async_trait]
impl AnalysisDriver for ConvergenceController {
    async fn current_status(&self) -> serde_json::Value {
        let status = self.status().await;
        let metrics = self.metrics().await;
        json!({
            "is_running": status.is_running,
            "current_iteration": status.current_iteration,
            "last_score": status.last_score,
            "convergence_count": status.convergence_count,
            "phase": status.phase,
            "history_length": status.history.len(),
            "metrics": metrics,
        })
    }

    async fn start_analysis(&self) -> std::result::Result<(), String> {
        if self.is_running() {
            return Err("analysis already running".to_string());
        }
        let controller = self.clone();
        tokio::spawn(async move {
            if let Err(fault) = controller.run().await {
                warn!("observer-triggered run failed: {fault}");
            }
        });
        Ok(())
    }
}
