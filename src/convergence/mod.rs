//! The convergence loop: controller, state, and metrics.
//!
//! One [`ConvergenceController`] owns one logical sequence of iterations.
//! Each iteration fans out to the agent orchestrator, seals an
//! [`IterationRecord`], and applies the termination policy: target score
//! first, then the non-improvement streak, then the iteration cap.

mod controller;
mod metrics;
mod state;

pub use controller::ConvergenceController;
pub use metrics::{LoopMetrics, MetricsSnapshot};
pub use state::{IterationRecord, LoopPhase, LoopStatus};
