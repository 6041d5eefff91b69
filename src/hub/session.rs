//! Observer sessions and the connection seam.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use uuid::Uuid;

use crate::event::{Event, EventType};

/// Transport seam for one observer connection.
///
/// The production implementation wraps a WebSocket sink; tests use a
/// recording mock. All methods must be safe to call after the peer has
/// gone away, reporting failure rather than panicking.
#[async_trait]
pub trait ObserverConnection: Send + Sync {
    /// Send a text frame.
    async fn send_text(&self, text: &str) -> anyhow::Result<()>;

    /// Send a ping frame.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Close the connection with a code and reason.
    async fn close(&self, code: u16, reason: &str) -> anyhow::Result<()>;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;
}

/// One live observer the hub pushes events to.
pub struct ObserverSession {
    /// Stable session identifier.
    pub id: String,
    connection: Arc<dyn ObserverConnection>,
    /// Subscribed event types. Empty means all types.
    subscriptions: HashSet<EventType>,
    /// Free-form filters set by the client.
    filters: HashMap<String, serde_json::Value>,
    last_activity: Instant,
    delivery_failures: u32,
}

impl ObserverSession {
    /// Wrap a connection in a new session with a fresh id.
    #[must_use]
    pub fn new(connection: Arc<dyn ObserverConnection>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            connection,
            subscriptions: HashSet::new(),
            filters: HashMap::new(),
            last_activity: Instant::now(),
            delivery_failures: 0,
        }
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> Arc<dyn ObserverConnection> {
        self.connection.clone()
    }

    /// Whether this session wants events of the given type.
    ///
    /// An empty subscription set means everything.
    #[must_use]
    pub fn wants(&self, event_type: EventType) -> bool {
        self.subscriptions.is_empty() || self.subscriptions.contains(&event_type)
    }

    /// Whether the event payload passes this session's filters.
    ///
    /// Every filter key must be present in the payload with an equal
    /// value; no filters means everything passes.
    #[must_use]
    pub fn matches_filters(&self, event: &Event) -> bool {
        self.filters
            .iter()
            .all(|(key, value)| event.data.get(key) == Some(value))
    }

    /// Whether this session wants the given event, by type and filters.
    #[must_use]
    pub fn wants_event(&self, event: &Event) -> bool {
        self.wants(event.event_type) && self.matches_filters(event)
    }

    /// Add event types to the subscription set.
    pub fn subscribe(&mut self, types: &[EventType]) {
        self.subscriptions.extend(types.iter().copied());
    }

    /// Remove event types from the subscription set.
    pub fn unsubscribe(&mut self, types: &[EventType]) {
        for t in types {
            self.subscriptions.remove(t);
        }
    }

    /// Replace the session's filters.
    pub fn set_filters(&mut self, filters: HashMap<String, serde_json::Value>) {
        self.filters = filters;
    }

    /// Current filters.
    #[must_use]
    pub fn filters(&self) -> &HashMap<String, serde_json::Value> {
        &self.filters
    }

    /// Current subscriptions.
    #[must_use]
    pub fn subscriptions(&self) -> &HashSet<EventType> {
        &self.subscriptions
    }

    /// Record client activity, resetting the idle clock.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// How long since the client was last seen.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Record a failed delivery to this session.
    pub fn record_delivery_failure(&mut self) {
        self.delivery_failures += 1;
    }

    /// Number of failed deliveries so far.
    #[must_use]
    pub fn delivery_failures(&self) -> u32 {
        self.delivery_failures
    }

    /// Whether the underlying connection is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    #[cfg(test)]
    pub(crate) fn backdate_activity(&mut self, by: Duration) {
        self.last_activity = Instant::now() - by;
    }
}
