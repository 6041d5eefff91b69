//! Structured event types pushed to observers.
//!
//! Events are produced by the controller and orchestrator, consumed by the
//! hub, and serialized verbatim onto the wire. They are immutable once
//! created. The schema is versioned for forward compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for events on the wire.
pub const SCHEMA_VERSION: u32 = 1;

/// Type-safe event types for observer notifications.
///
/// # Example
///
/// ```
/// use kaizen::event::EventType;
///
/// assert_eq!(EventType::IterationStart.as_str(), "iteration_start");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A run began.
    AnalysisStart,
    /// Incremental progress within a run.
    AnalysisProgress,
    /// A run finished (any terminal phase).
    AnalysisComplete,
    /// An iteration began.
    IterationStart,
    /// An iteration sealed its record.
    IterationEnd,
    /// Controller phase or progress changed.
    StatusUpdate,
    /// A new aggregate score is available.
    ScoreUpdate,
    /// Informational message for observers.
    Notification,
}

impl EventType {
    /// Returns the wire representation of the event type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalysisStart => "analysis_start",
            Self::AnalysisProgress => "analysis_progress",
            Self::AnalysisComplete => "analysis_complete",
            Self::IterationStart => "iteration_start",
            Self::IterationEnd => "iteration_end",
            Self::StatusUpdate => "status_update",
            Self::ScoreUpdate => "score_update",
            Self::Notification => "notification",
        }
    }

    /// Returns all variants, useful for subscription filtering.
    #[must_use]
    pub fn all_variants() -> Vec<Self> {
        vec![
            Self::AnalysisStart,
            Self::AnalysisProgress,
            Self::AnalysisComplete,
            Self::IterationStart,
            Self::IterationEnd,
            Self::StatusUpdate,
            Self::ScoreUpdate,
            Self::Notification,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable event pushed to observers.
///
/// Serializes directly to the wire shape
/// `{type, data, timestamp, session_id?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Kind of event.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Event payload. Shape depends on `event_type`.
    pub data: serde_json::Value,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Observer session this event targets, if any. Absent for broadcasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Event {
    /// Create a broadcast event with the given payload.
    #[must_use]
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            data,
            timestamp: Utc::now(),
            session_id: None,
        }
    }

    /// Target the event at a specific observer session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Serialize the event to its wire form.
    ///
    /// Falls back to a minimal error payload if serialization fails, so
    /// broadcasting never propagates a serialization fault.
    #[must_use]
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {e}"}}"#)
        })
    }
}
