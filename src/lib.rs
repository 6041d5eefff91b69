//! Kaizen - Convergence-Seeking Code Quality Orchestrator
//!
//! A Rust library that drives pluggable analysis agents in an iterative
//! convergence loop and streams run events to live observers over
//! WebSocket, with replay for late joiners.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`agent`] - Agent trait, registry, and concurrent fan-out
//! - [`config`] - Loop, retry, and hub configuration
//! - [`convergence`] - Loop controller, iteration records, metrics
//! - [`error`] - Custom error types and handling
//! - [`event`] - Structured events pushed to observers
//! - [`hub`] - Observer sessions, replay buffer, WebSocket transport
//! - [`recovery`] - Fault classification, recovery, retry
//! - [`telemetry`] - Tracing initialization
//! - [`testing`] - Mocks for agents and observer connections
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kaizen::agent::{AgentContext, AgentRegistry};
//! use kaizen::config::LoopConfig;
//! use kaizen::convergence::ConvergenceController;
//! use kaizen::testing::MockAgent;
//!
//! # async fn run() -> kaizen::Result<()> {
//! let mut registry = AgentRegistry::new();
//! registry.register(Arc::new(MockAgent::scoring("structure", 82.0)));
//!
//! let config = LoopConfig::new(vec!["structure".into()])
//!     .with_max_iterations(10)
//!     .with_target_score(90.0);
//!
//! let controller =
//!     ConvergenceController::new(config, registry, AgentContext::new("."))?;
//! let status = controller.run().await?;
//! println!("finished in phase {}", status.phase);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod convergence;
pub mod error;
pub mod event;
pub mod hub;
pub mod recovery;
pub mod telemetry;
pub mod testing;

// Re-export commonly used types
pub use error::{KaizenError, Result};

// Re-export configuration types
pub use config::{HubConfig, LoopConfig, RetryConfig};

// Re-export loop types
pub use convergence::{
    ConvergenceController, IterationRecord, LoopMetrics, LoopPhase, LoopStatus, MetricsSnapshot,
};

// Re-export agent types
pub use agent::{
    AgentContext, AgentOrchestrator, AgentOutcome, AgentRegistry, AgentReport, AgentTask,
};

// Re-export recovery types
pub use recovery::{
    ClassifiedError, ErrorBuckets, ErrorClassifier, ErrorSeverity, ErrorType, FallbackAction,
    RecoveryAdvisor, RecoveryOutcome, RetryExecutor,
};

// Re-export event and hub types
pub use event::{Event, EventType};
pub use hub::{AnalysisDriver, EventBuffer, EventHub, HubServer, ObserverConnection};
