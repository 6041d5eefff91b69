//! Bounded retry for agent work.
//!
//! Each unit of work gets up to `max_attempts` invocations with a fixed
//! delay between them. Every failed attempt is classified and filed
//! through the [`RecoveryAdvisor`] before the retry decision is made:
//! permission faults are never retried, and a fault the advisor
//! escalates (Critical under fail-fast) comes back immediately instead
//! of burning the remaining attempts.

use std::future::Future;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::config::RetryConfig;

use super::{ClassifiedError, ErrorClassifier, ErrorType, RecoveryAdvisor};

/// Runs fallible async work under the configured retry policy.
pub struct RetryExecutor {
    config: RetryConfig,
    classifier: ErrorClassifier,
    advisor: RecoveryAdvisor,
}

impl RetryExecutor {
    /// Create an executor with the given retry policy, filing faults
    /// through `advisor`.
    #[must_use]
    pub fn new(config: RetryConfig, advisor: RecoveryAdvisor) -> Self {
        Self {
            config,
            classifier: ErrorClassifier::new(),
            advisor,
        }
    }

    /// Run `work` until it succeeds or attempts are exhausted.
    ///
    /// `label` names the unit of work in fault context and logs;
    /// `alternates` are the context's alternate paths, offered to the
    /// advisor for file-access faults. The closure must produce a fresh
    /// future per attempt that owns its captures, typically
    /// `move || { let x = x.clone(); async move { .. } }`.
    ///
    /// # Errors
    ///
    /// Returns the classified fault of the final attempt; of the first
    /// attempt for permission faults, which are not retried; or of the
    /// attempt the advisor escalated under fail-fast.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        label: &str,
        alternates: &[PathBuf],
        mut work: F,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error: Option<ClassifiedError> = None;

        for attempt in 1..=max_attempts {
            match work().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(%label, attempt, "work succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(fault) => {
                    let context = format!("{label}, attempt {attempt}/{max_attempts}");
                    let classified = self.classifier.classify(&fault, &context);

                    // Every failure is filed, retried or not.
                    match self.advisor.attempt_recovery(classified.clone(), alternates) {
                        Ok(outcome) => {
                            debug!(%label, fallback = ?outcome.fallback, "{}", outcome.message);
                        }
                        Err(escalated) => {
                            warn!(%label, "fault escalated, not retrying");
                            return Err(escalated);
                        }
                    }

                    if classified.error_type == ErrorType::Permissions {
                        warn!(%label, "permission fault, not retrying");
                        return Err(classified);
                    }

                    warn!(
                        %label,
                        attempt,
                        error_type = %classified.error_type,
                        "attempt failed: {}",
                        classified.message
                    );
                    last_error = Some(classified);

                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        // max_attempts >= 1, so at least one failure was recorded.
        Err(last_error.unwrap_or_else(|| {
            ClassifiedError::new(
                "retry loop exited without recording a fault",
                ErrorType::Unknown,
                super::ErrorSeverity::Medium,
            )
        }))
    }
}
