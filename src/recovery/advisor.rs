//! Recovery strategy selection.
//!
//! Every classified fault passes through the advisor: it files the fault
//! in the shared buckets, picks the fallback strategy for the fault
//! type, and decides whether the run must abort. Only a heuristic
//! pattern-analysis fallback counts as recovered; the other strategies
//! keep the iteration moving without claiming the work succeeded.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ClassifiedError, ErrorBuckets, ErrorType};

/// Fallback strategy chosen for a classified fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackAction {
    /// Retry the work against these alternate paths from the context.
    TryAlternates { paths: Vec<PathBuf> },
    /// Skip this unit of work and continue the iteration.
    Skip,
    /// Skip the offending input unit only.
    SkipFile,
    /// Fall back to heuristic pattern analysis in place of the tool.
    PatternAnalysis,
    /// Surface operator guidance (install instructions).
    Guidance,
    /// No strategy applies; the fault stands as filed.
    NoStrategy,
}

/// Result of a recovery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryOutcome {
    /// True only for the pattern-analysis heuristic fallback.
    pub recovered: bool,
    /// Strategy that was applied.
    pub fallback: FallbackAction,
    /// Operator-facing description of what happened.
    pub message: String,
}

/// Selects fallback strategies and files faults into the shared buckets.
#[derive(Debug, Clone)]
pub struct RecoveryAdvisor {
    buckets: ErrorBuckets,
    fail_fast: bool,
}

impl RecoveryAdvisor {
    /// Create an advisor writing into the given buckets.
    #[must_use]
    pub fn new(buckets: ErrorBuckets, fail_fast: bool) -> Self {
        Self { buckets, fail_fast }
    }

    /// Pick the fallback strategy for a fault type.
    ///
    /// File-access faults fall back to alternate paths only when the
    /// context supplies some; fault types with no mapping get no
    /// strategy.
    #[must_use]
    pub fn fallback_for(error_type: ErrorType, alternates: &[PathBuf]) -> FallbackAction {
        match error_type {
            ErrorType::FileAccess if !alternates.is_empty() => FallbackAction::TryAlternates {
                paths: alternates.to_vec(),
            },
            ErrorType::FileAccess => FallbackAction::Skip,
            ErrorType::ToolUnavailable => FallbackAction::PatternAnalysis,
            ErrorType::ParseError => FallbackAction::SkipFile,
            ErrorType::DependencyMissing => FallbackAction::Guidance,
            _ => FallbackAction::NoStrategy,
        }
    }

    /// File a fault and attempt recovery.
    ///
    /// The fault is always filed in the buckets first. Under fail-fast a
    /// Critical fault then escalates: the classified error comes back as
    /// `Err` so the caller can abort the run. Otherwise the chosen
    /// fallback is returned; `recovered` is true only for the
    /// pattern-analysis fallback.
    ///
    /// # Errors
    ///
    /// Returns the classified error itself when fail-fast is on and the
    /// fault is Critical.
    pub fn attempt_recovery(
        &self,
        error: ClassifiedError,
        alternates: &[PathBuf],
    ) -> Result<RecoveryOutcome, ClassifiedError> {
        self.buckets.file(error.clone(), self.fail_fast);

        if self.fail_fast && error.is_critical() {
            warn!(
                error_type = %error.error_type,
                context = %error.context,
                "critical fault under fail-fast, aborting run"
            );
            return Err(error);
        }

        let fallback = Self::fallback_for(error.error_type, alternates);
        let message = match &fallback {
            FallbackAction::TryAlternates { paths } => format!(
                "file access failed, trying {} alternate path(s): {}",
                paths.len(),
                error.message
            ),
            FallbackAction::Skip => format!("skipping unit of work: {}", error.message),
            FallbackAction::SkipFile => {
                format!("skipping offending input: {}", error.message)
            }
            FallbackAction::PatternAnalysis => format!(
                "tool unavailable, falling back to pattern analysis: {}",
                error.message
            ),
            FallbackAction::Guidance => format!(
                "dependency missing, install it and rerun: {}",
                error.message
            ),
            FallbackAction::NoStrategy => {
                format!("no recovery strategy for {}: {}", error.error_type, error.message)
            }
        };

        debug!(fallback = ?fallback, "recovery fallback selected");
        Ok(RecoveryOutcome {
            recovered: fallback == FallbackAction::PatternAnalysis,
            fallback,
            message,
        })
    }

    /// The buckets this advisor files into.
    #[must_use]
    pub fn buckets(&self) -> &ErrorBuckets {
        &self.buckets
    }
}
