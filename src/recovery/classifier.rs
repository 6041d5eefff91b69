//! Fault classification.
//!
//! Maps a raised fault to a (type, severity) pair via an ordered table of
//! message patterns. Classification is pure and total: it never fails,
//! never panics, and accepts any input including the empty string.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Classification of fault types encountered during agent execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    /// File missing or unreadable.
    FileAccess,
    /// Permission denied. Never retried.
    Permissions,
    /// Operation exceeded its time budget.
    Timeout,
    /// Input could not be parsed.
    ParseError,
    /// Required external tool is not installed.
    ToolUnavailable,
    /// Network-level failure.
    NetworkError,
    /// Required dependency is missing.
    DependencyMissing,
    /// Configuration is invalid.
    InvalidConfig,
    /// No pattern matched.
    Unknown,
}

impl ErrorType {
    /// Get a human-readable description of this fault type.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::FileAccess => "File access failure",
            Self::Permissions => "Permission denied",
            Self::Timeout => "Operation timed out",
            Self::ParseError => "Parse error",
            Self::ToolUnavailable => "Tool unavailable",
            Self::NetworkError => "Network error",
            Self::DependencyMissing => "Missing dependency",
            Self::InvalidConfig => "Invalid configuration",
            Self::Unknown => "Unknown error",
        }
    }

    /// Check if faults of this type may be retried.
    ///
    /// Permission faults are permanent: retrying cannot succeed without
    /// operator intervention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Permissions)
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Severity of a classified fault.
///
/// Ordering is ascending: `Info < Low < Medium < High < Critical`, so
/// `severity >= ErrorSeverity::High` selects the serious end of the scale.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    /// Purely informational.
    Info,
    /// Minor, expected in normal operation.
    Low,
    /// Degrades a single unit of work.
    Medium,
    /// Degrades the iteration; filed as an error.
    High,
    /// Aborts the run under fail-fast mode.
    Critical,
}

impl ErrorSeverity {
    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fault that has been classified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Primary fault message.
    pub message: String,
    /// Classification of the fault.
    pub error_type: ErrorType,
    /// Severity of the fault.
    pub severity: ErrorSeverity,
    /// Where the fault occurred (agent id, attempt number, operation).
    pub context: String,
    /// Rendered source chain of the original fault, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_chain: Option<String>,
}

impl ClassifiedError {
    /// Create a classified error without context.
    #[must_use]
    pub fn new(message: impl Into<String>, error_type: ErrorType, severity: ErrorSeverity) -> Self {
        Self {
            message: message.into(),
            error_type,
            severity,
            context: String::new(),
            source_chain: None,
        }
    }

    /// Add context describing where the fault occurred.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Attach the rendered source chain of the original fault.
    #[must_use]
    pub fn with_source_chain(mut self, chain: impl Into<String>) -> Self {
        self.source_chain = Some(chain.into());
        self
    }

    /// Check whether this error routes to the errors bucket.
    ///
    /// Severity `High` and above always does; in fail-fast mode every
    /// classified error does.
    #[must_use]
    pub fn is_error_bucket(&self, fail_fast: bool) -> bool {
        fail_fast || self.severity >= ErrorSeverity::High
    }

    /// Check whether this error aborts the run under fail-fast mode.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {}",
            self.error_type, self.severity, self.message
        )?;
        if !self.context.is_empty() {
            write!(f, " ({})", self.context)?;
        }
        Ok(())
    }
}

/// Classifies faults based on message analysis.
///
/// Patterns are ordered from most specific to least specific; the first
/// match wins. All matching is case-insensitive.
pub struct ErrorClassifier {
    patterns: Vec<(Regex, ErrorType, ErrorSeverity)>,
}

impl ErrorClassifier {
    /// Create a classifier with the default pattern table.
    #[must_use]
    pub fn new() -> Self {
        // More specific patterns must come BEFORE more general ones.
        let patterns = vec![
            // Permission faults (before generic file access)
            (r"EACCES", ErrorType::Permissions, ErrorSeverity::High),
            (
                r"permission denied|operation not permitted|permission",
                ErrorType::Permissions,
                ErrorSeverity::High,
            ),
            // File access
            (r"ENOENT", ErrorType::FileAccess, ErrorSeverity::Medium),
            (
                r"no such file|file not found|not a directory",
                ErrorType::FileAccess,
                ErrorSeverity::Medium,
            ),
            // Timeouts
            (
                r"timed out|timeout",
                ErrorType::Timeout,
                ErrorSeverity::Medium,
            ),
            // Tool availability (before dependency patterns)
            (
                r"command not found|not installed|no such tool|executable .+ not found",
                ErrorType::ToolUnavailable,
                ErrorSeverity::Medium,
            ),
            // Dependencies
            (
                r"can't find crate|cannot find crate|missing dependency|unresolved import|cannot find module",
                ErrorType::DependencyMissing,
                ErrorSeverity::High,
            ),
            // Network
            (
                r"ECONNREFUSED|ECONNRESET|connection refused|connection reset|network",
                ErrorType::NetworkError,
                ErrorSeverity::Low,
            ),
            // Configuration
            (
                r"invalid config|invalid configuration|malformed config",
                ErrorType::InvalidConfig,
                ErrorSeverity::Critical,
            ),
            // Parse failures (general, near the end)
            (
                r"parse|unexpected token|expected .+, found",
                ErrorType::ParseError,
                ErrorSeverity::Low,
            ),
        ];

        let compiled: Vec<_> = patterns
            .into_iter()
            .filter_map(|(pattern, error_type, severity)| {
                Regex::new(&format!("(?i){pattern}"))
                    .ok()
                    .map(|re| (re, error_type, severity))
            })
            .collect();

        Self { patterns: compiled }
    }

    /// Classify a fault message.
    ///
    /// Total: any input, including the empty string, yields a classified
    /// error. No pattern match yields `Unknown`/`Medium`.
    #[must_use]
    pub fn classify_message(&self, message: &str) -> ClassifiedError {
        for (regex, error_type, severity) in &self.patterns {
            if regex.is_match(message) {
                return ClassifiedError::new(message, *error_type, *severity);
            }
        }
        ClassifiedError::new(message, ErrorType::Unknown, ErrorSeverity::Medium)
    }

    /// Classify a raised fault, capturing its source chain.
    #[must_use]
    pub fn classify(&self, fault: &anyhow::Error, context: &str) -> ClassifiedError {
        let message = fault.to_string();
        let mut classified = self.classify_message(&message).with_context(context);
        let chain: Vec<String> = fault.chain().skip(1).map(|c| c.to_string()).collect();
        if !chain.is_empty() {
            classified = classified.with_source_chain(chain.join(": "));
        }
        classified
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(msg: &str) -> ClassifiedError {
        ErrorClassifier::new().classify_message(msg)
    }

    #[test]
    fn test_classifies_enoent_as_file_access() {
        let err = classify("ENOENT: no such file or directory, open 'src/lib.rs'");
        assert_eq!(err.error_type, ErrorType::FileAccess);
        assert_eq!(err.severity, ErrorSeverity::Medium);
    }

    #[test]
    fn test_classifies_no_such_file_phrase() {
        let err = classify("no such file: README.md");
        assert_eq!(err.error_type, ErrorType::FileAccess);
    }

    #[test]
    fn test_classifies_eacces_as_permissions() {
        let err = classify("EACCES: permission denied, open '/etc/shadow'");
        assert_eq!(err.error_type, ErrorType::Permissions);
        assert_eq!(err.severity, ErrorSeverity::High);
    }

    #[test]
    fn test_classifies_permission_phrase() {
        let err = classify("Permission denied while reading target dir");
        assert_eq!(err.error_type, ErrorType::Permissions);
    }

    #[test]
    fn test_classifies_timeout() {
        let err = classify("operation timed out after 30s");
        assert_eq!(err.error_type, ErrorType::Timeout);
        assert_eq!(err.severity, ErrorSeverity::Medium);
    }

    #[test]
    fn test_classifies_parse_error() {
        let err = classify("failed to parse manifest");
        assert_eq!(err.error_type, ErrorType::ParseError);
        assert_eq!(err.severity, ErrorSeverity::Low);
    }

    #[test]
    fn test_classifies_tool_unavailable() {
        let err = classify("sh: eslint: command not found");
        assert_eq!(err.error_type, ErrorType::ToolUnavailable);
        assert_eq!(err.severity, ErrorSeverity::Medium);
    }

    #[test]
    fn test_classifies_network_error() {
        let err = classify("connect ECONNREFUSED 127.0.0.1:443");
        assert_eq!(err.error_type, ErrorType::NetworkError);
        assert_eq!(err.severity, ErrorSeverity::Low);
    }

    #[test]
    fn test_classifies_dependency_missing() {
        let err = classify("error: can't find crate for `serde`");
        assert_eq!(err.error_type, ErrorType::DependencyMissing);
        assert_eq!(err.severity, ErrorSeverity::High);
    }

    #[test]
    fn test_classifies_invalid_config_as_critical() {
        let err = classify("invalid configuration: target_score missing");
        assert_eq!(err.error_type, ErrorType::InvalidConfig);
        assert_eq!(err.severity, ErrorSeverity::Critical);
        assert!(err.is_critical());
    }

    #[test]
    fn test_unmatched_is_unknown_medium() {
        let err = classify("something inexplicable happened");
        assert_eq!(err.error_type, ErrorType::Unknown);
        assert_eq!(err.severity, ErrorSeverity::Medium);
    }

    #[test]
    fn test_empty_message_is_total() {
        let err = classify("");
        assert_eq!(err.error_type, ErrorType::Unknown);
    }

    #[test]
    fn test_first_match_wins_permissions_before_file_access() {
        // Contains both EACCES and a file-access phrase; the more specific
        // permission pattern is earlier in the table.
        let err = classify("EACCES reading file, no such file fallback");
        assert_eq!(err.error_type, ErrorType::Permissions);
    }

    #[test]
    fn test_matching_is_case_insensitive() {
        let err = classify("TIMEOUT waiting for analyzer");
        assert_eq!(err.error_type, ErrorType::Timeout);
    }

    #[test]
    fn test_classify_anyhow_captures_chain() {
        let classifier = ErrorClassifier::new();
        let root = anyhow::anyhow!("disk unplugged");
        let fault = root.context("no such file: metrics.json");
        let err = classifier.classify(&fault, "agent tests, attempt 1");
        assert_eq!(err.error_type, ErrorType::FileAccess);
        assert_eq!(err.context, "agent tests, attempt 1");
        assert!(err.source_chain.as_deref().unwrap().contains("disk unplugged"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Critical > ErrorSeverity::High);
        assert!(ErrorSeverity::High > ErrorSeverity::Medium);
        assert!(ErrorSeverity::Medium > ErrorSeverity::Low);
        assert!(ErrorSeverity::Low > ErrorSeverity::Info);
    }

    #[test]
    fn test_error_bucket_routing() {
        let high = ClassifiedError::new("x", ErrorType::Permissions, ErrorSeverity::High);
        let low = ClassifiedError::new("x", ErrorType::ParseError, ErrorSeverity::Low);
        assert!(high.is_error_bucket(false));
        assert!(!low.is_error_bucket(false));
        // Fail-fast routes everything to errors.
        assert!(low.is_error_bucket(true));
    }

    #[test]
    fn test_permissions_not_retryable() {
        assert!(!ErrorType::Permissions.is_retryable());
        assert!(ErrorType::Timeout.is_retryable());
        assert!(ErrorType::Unknown.is_retryable());
    }

    #[test]
    fn test_display_includes_type_and_severity() {
        let err = ClassifiedError::new("boom", ErrorType::Timeout, ErrorSeverity::Medium)
            .with_context("agent structure");
        let rendered = err.to_string();
        assert!(rendered.contains("timed out"));
        assert!(rendered.contains("MEDIUM"));
        assert!(rendered.contains("agent structure"));
    }
}
