//! Fault classification, recovery, and retry.
//!
//! Every fault raised by agent work passes through this module exactly
//! once: the [`ErrorClassifier`] assigns it a type and severity, the
//! [`RecoveryAdvisor`] picks a fallback strategy and files the fault in
//! the shared [`ErrorBuckets`], and the [`RetryExecutor`] decides whether
//! the work runs again.

mod advisor;
mod classifier;
mod retry;

pub use advisor::{FallbackAction, RecoveryAdvisor, RecoveryOutcome};
pub use classifier::{ClassifiedError, ErrorClassifier, ErrorSeverity, ErrorType};
pub use retry::RetryExecutor;

use std::sync::{Arc, Mutex};

/// Shared accumulator for classified faults, split by severity.
///
/// Faults with severity `High` or above land in the errors bucket;
/// everything else lands in warnings. Under fail-fast, every fault is an
/// error. Clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct ErrorBuckets {
    inner: Arc<Mutex<BucketsInner>>,
}

#[derive(Debug, Default)]
struct BucketsInner {
    errors: Vec<ClassifiedError>,
    warnings: Vec<ClassifiedError>,
}

impl ErrorBuckets {
    /// Create an empty pair of buckets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// File a classified fault into the appropriate bucket.
    pub fn file(&self, error: ClassifiedError, fail_fast: bool) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if error.is_error_bucket(fail_fast) {
            inner.errors.push(error);
        } else {
            inner.warnings.push(error);
        }
    }

    /// Snapshot of the errors bucket.
    #[must_use]
    pub fn errors(&self) -> Vec<ClassifiedError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .errors
            .clone()
    }

    /// Snapshot of the warnings bucket.
    #[must_use]
    pub fn warnings(&self) -> Vec<ClassifiedError> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .warnings
            .clone()
    }

    /// Count of filed errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .errors
            .len()
    }

    /// Count of filed warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .warnings
            .len()
    }

    /// Clear both buckets. Called at the start of a run.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.errors.clear();
        inner.warnings.clear();
    }
}
