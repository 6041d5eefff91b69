//! Configuration for the convergence loop and the observer hub.
//!
//! A [`LoopConfig`] is immutable once a run starts: the controller clones
//! it at construction time and never re-reads the source. Validation
//! happens up front so that misconfiguration surfaces synchronously,
//! before any iteration runs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KaizenError, Result};

/// Default maximum retry attempts per unit of work.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default inter-attempt retry delay in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;

/// Default bound on the hub's event replay buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 100;

/// Default maximum number of concurrent observer sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 50;

// ============================================================================
// Retry
// ============================================================================

/// Retry behavior for a single unit of agent work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per unit of work (including the first).
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    /// Set the inter-attempt delay in milliseconds.
    #[must_use]
    pub fn with_retry_delay_ms(mut self, ms: u64) -> Self {
        self.retry_delay_ms = ms;
        self
    }

    /// The inter-attempt delay as a [`Duration`].
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

// ============================================================================
// Loop
// ============================================================================

/// Configuration for one convergence run.
///
/// # Example
///
/// ```
/// use kaizen::config::LoopConfig;
///
/// let config = LoopConfig::new(vec!["structure".into(), "security".into()])
///     .with_max_iterations(10)
///     .with_target_score(90.0)
///     .with_convergence_threshold(3);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Hard cap on iterations for the run. Must be greater than zero.
    pub max_iterations: u32,
    /// Score at or above which the run stops as `TargetReached`.
    pub target_score: f64,
    /// Consecutive non-improving iterations before the run stops as
    /// `Converged`. Must be greater than zero.
    pub convergence_threshold: u32,
    /// Agent ids enabled for this run, in dispatch order.
    pub enabled_agents: Vec<String>,
    /// When true, a Critical classified error aborts the run immediately
    /// instead of being absorbed into the agent's outcome.
    pub fail_fast: bool,
    /// Retry behavior for agent work.
    pub retry: RetryConfig,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            target_score: 90.0,
            convergence_threshold: 3,
            enabled_agents: Vec::new(),
            fail_fast: false,
            retry: RetryConfig::default(),
        }
    }
}

impl LoopConfig {
    /// Create a configuration with the given enabled agents and defaults
    /// for everything else.
    #[must_use]
    pub fn new(enabled_agents: Vec<String>) -> Self {
        Self {
            enabled_agents,
            ..Self::default()
        }
    }

    /// Set the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set the target score.
    #[must_use]
    pub fn with_target_score(mut self, target: f64) -> Self {
        self.target_score = target;
        self
    }

    /// Set the convergence threshold.
    #[must_use]
    pub fn with_convergence_threshold(mut self, threshold: u32) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Enable fail-fast mode.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the retry configuration.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KaizenError::InvalidConfig`] for a zero iteration cap or
    /// convergence threshold, a non-finite target score, or a duplicate
    /// agent id; [`KaizenError::NoAgentsEnabled`] for an empty agent set.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(KaizenError::invalid_config(
                "max_iterations",
                "must be greater than zero",
            ));
        }
        if self.convergence_threshold == 0 {
            return Err(KaizenError::invalid_config(
                "convergence_threshold",
                "must be greater than zero",
            ));
        }
        if !self.target_score.is_finite() {
            return Err(KaizenError::invalid_config(
                "target_score",
                "must be a finite number",
            ));
        }
        if self.enabled_agents.is_empty() {
            return Err(KaizenError::NoAgentsEnabled);
        }
        let mut seen = std::collections::HashSet::new();
        for id in &self.enabled_agents {
            if !seen.insert(id.as_str()) {
                return Err(KaizenError::invalid_config(
                    "enabled_agents",
                    format!("duplicate agent id '{id}'"),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Hub
// ============================================================================

/// Configuration for the observer hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address to bind the WebSocket listener to.
    pub host: String,
    /// Port for the WebSocket listener.
    pub port: u16,
    /// Maximum concurrent observer sessions.
    pub max_sessions: usize,
    /// Bound on the event replay buffer (drop-oldest past this size).
    pub buffer_size: usize,
    /// Interval between heartbeat sweeps in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Inactivity window after which a session is force-closed, in
    /// milliseconds. Should exceed the heartbeat interval.
    pub client_timeout_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            max_sessions: DEFAULT_MAX_SESSIONS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            heartbeat_interval_ms: 30_000,
            client_timeout_ms: 90_000,
        }
    }
}

impl HubConfig {
    /// Set the session cap.
    #[must_use]
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the replay buffer bound.
    #[must_use]
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set the heartbeat interval in milliseconds.
    #[must_use]
    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    /// Set the client inactivity timeout in milliseconds.
    #[must_use]
    pub fn with_client_timeout_ms(mut self, ms: u64) -> Self {
        self.client_timeout_ms = ms;
        self
    }

    /// Heartbeat interval as a [`Duration`].
    #[must_use]
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Client timeout as a [`Duration`].
    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    /// The bind address as `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_config_defaults_validate() {
        let config = LoopConfig::new(vec!["structure".into()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_max_iterations_rejected() {
        let config = LoopConfig::new(vec!["structure".into()]).with_max_iterations(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, KaizenError::InvalidConfig { ref field, .. } if field == "max_iterations"));
    }

    #[test]
    fn test_zero_convergence_threshold_rejected() {
        let config = LoopConfig::new(vec!["structure".into()]).with_convergence_threshold(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nan_target_score_rejected() {
        let config = LoopConfig::new(vec!["structure".into()]).with_target_score(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_agent_set_rejected() {
        let config = LoopConfig::default();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, KaizenError::NoAgentsEnabled));
    }

    #[test]
    fn test_duplicate_agent_id_rejected() {
        let config = LoopConfig::new(vec!["structure".into(), "structure".into()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_delay() {
        let retry = RetryConfig::default().with_retry_delay_ms(250);
        assert_eq!(retry.retry_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_hub_config_bind_addr() {
        let hub = HubConfig::default();
        assert_eq!(hub.bind_addr(), "127.0.0.1:8787");
    }

    #[test]
    fn test_hub_config_builders() {
        let hub = HubConfig::default()
            .with_max_sessions(2)
            .with_buffer_size(8)
            .with_heartbeat_interval_ms(100)
            .with_client_timeout_ms(300);
        assert_eq!(hub.max_sessions, 2);
        assert_eq!(hub.buffer_size, 8);
        assert_eq!(hub.heartbeat_interval(), Duration::from_millis(100));
        assert_eq!(hub.client_timeout(), Duration::from_millis(300));
    }

    #[test]
    fn test_loop_config_serialize_round_trip() {
        let config = LoopConfig::new(vec!["tests".into()]).with_target_score(85.0);
        let json = serde_json::to_string(&config).unwrap();
        let back: LoopConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.enabled_agents, vec!["tests".to_string()]);
        assert!((back.target_score - 85.0).abs() < f64::EPSILON);
    }
}
