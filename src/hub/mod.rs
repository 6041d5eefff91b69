//! The observer hub: sessions, replay buffer, and event fan-out.
//!
//! The hub owns every observer-facing concern — the session registry,
//! the bounded replay buffer, heartbeats, and the wire protocol — and
//! learns about the loop only through the one-way event channel plus the
//! narrow [`AnalysisDriver`] seam for `get_status`/`run_analysis`
//! requests. The loop never sees the hub at all.

mod buffer;
mod protocol;
mod server;
mod session;

pub use buffer::EventBuffer;
pub use protocol::{
    ClientMessage, ServerMessage, CLOSE_CODE_AT_CAPACITY, CLOSE_CODE_NORMAL,
    CLOSE_REASON_AT_CAPACITY,
};
pub use server::HubServer;
pub use session::{ObserverConnection, ObserverSession};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HubConfig;
use crate::error::{KaizenError, Result};
use crate::event::Event;

/// What the hub needs from the analysis side.
///
/// Implemented by the convergence controller; the hub holds it as a
/// trait object so the dependency stays one-way.
#[async_trait]
pub trait AnalysisDriver: Send + Sync {
    /// Status snapshot for a `get_status` request.
    async fn current_status(&self) -> serde_json::Value;

    /// Kick off a run for a `run_analysis` request.
    ///
    /// # Errors
    ///
    /// A human-readable reason when the run cannot start (already
    /// running, configuration fault).
    async fn start_analysis(&self) -> std::result::Result<(), String>;
}

struct HubInner {
    config: HubConfig,
    sessions: RwLock<HashMap<String, ObserverSession>>,
    buffer: Mutex<EventBuffer>,
    driver: Mutex<Option<Arc<dyn AnalysisDriver>>>,
}

/// Fans loop events out to observer sessions. Cheap to clone.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    /// A hub with no sessions and an empty buffer.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        let buffer = EventBuffer::new(config.buffer_size);
        Self {
            inner: Arc::new(HubInner {
                config,
                sessions: RwLock::new(HashMap::new()),
                buffer: Mutex::new(buffer),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Attach the analysis driver serving `get_status`/`run_analysis`.
    pub fn set_driver(&self, driver: Arc<dyn AnalysisDriver>) {
        *self.inner.driver.lock().unwrap_or_else(|e| e.into_inner()) = Some(driver);
    }

    /// The hub's configuration.
    #[must_use]
    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Number of buffered events awaiting replay.
    pub fn buffered_events(&self) -> usize {
        self.inner.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Accept a connection as a new observer session.
    ///
    /// Sends `connection_established`, then replays the buffered backlog
    /// oldest-first, so the session sees history before any live event.
    ///
    /// # Errors
    ///
    /// [`KaizenError::AtCapacity`] once at the session maximum; the
    /// connection is closed with code 1013 before any message exchange.
    pub async fn add_session(&self, connection: Arc<dyn ObserverConnection>) -> Result<String> {
        // One critical section from capacity check to insert. Publishers
        // hold the same lock while buffering, so no event can slip in
        // between the backlog snapshot and the session going live, and
        // concurrent joins cannot race past the capacity limit.
        let mut sessions = self.inner.sessions.write().await;

        if sessions.len() >= self.inner.config.max_sessions {
            drop(sessions);
            let _ = connection
                .close(CLOSE_CODE_AT_CAPACITY, CLOSE_REASON_AT_CAPACITY)
                .await;
            warn!(
                max_sessions = self.inner.config.max_sessions,
                "rejected connection at capacity"
            );
            return Err(KaizenError::AtCapacity {
                max_sessions: self.inner.config.max_sessions,
            });
        }

        let session = ObserverSession::new(connection.clone());
        let session_id = session.id.clone();

        let hello = ServerMessage::ConnectionEstablished {
            session_id: session_id.clone(),
            server_info: json!({
                "name": "kaizen",
                "version": env!("CARGO_PKG_VERSION"),
            }),
        };
        if let Err(fault) = connection.send_text(&hello.to_wire()).await {
            debug!("connection went away during handshake: {fault}");
        }

        // Replay the backlog before the session can receive live events.
        let backlog = self
            .inner
            .buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot();
        for event in &backlog {
            if let Err(fault) = connection.send_text(&event.to_wire()).await {
                debug!("backlog replay send failed: {fault}");
            }
        }

        sessions.insert(session_id.clone(), session);
        info!(%session_id, replayed = backlog.len(), "observer session added");
        Ok(session_id)
    }

    /// Remove a session. Idempotent: removing an unknown id is a no-op.
    pub async fn remove_session(&self, session_id: &str) -> bool {
        let removed = self.inner.sessions.write().await.remove(session_id);
        match removed {
            Some(session) => {
                if session.is_open() {
                    let _ = session.connection().close(CLOSE_CODE_NORMAL, "closed").await;
                }
                info!(%session_id, "observer session removed");
                true
            }
            None => false,
        }
    }

    // ========================================================================
    // Broadcasting
    // ========================================================================

    /// Buffer an event and deliver it to every matching live session.
    ///
    /// Per-session send failures are counted against the session and
    /// never affect other sessions or the publisher. Sessions whose
    /// connection is no longer open are removed instead of sent to.
    pub async fn publish(&self, event: Event) {
        // Buffer and pick targets under the sessions lock: a join in
        // flight either snapshots this event for replay or is already
        // registered and gets the live delivery, never neither or both.
        let targets: Vec<(String, Arc<dyn ObserverConnection>, bool)> = {
            let sessions = self.inner.sessions.read().await;
            self.inner
                .buffer
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event.clone());
            sessions
                .values()
                .map(|s| (s.id.clone(), s.connection(), s.wants_event(&event)))
                .collect()
        };

        let wire = event.to_wire();
        let mut failed = Vec::new();
        let mut disconnected = Vec::new();

        for (session_id, connection, wants) in targets {
            if !connection.is_open() {
                disconnected.push(session_id);
                continue;
            }
            if !wants {
                continue;
            }
            if let Err(fault) = connection.send_text(&wire).await {
                debug!(%session_id, "delivery failed: {fault}");
                failed.push(session_id);
            }
        }

        if !failed.is_empty() || !disconnected.is_empty() {
            let mut sessions = self.inner.sessions.write().await;
            for session_id in failed {
                if let Some(session) = sessions.get_mut(&session_id) {
                    session.record_delivery_failure();
                }
            }
            for session_id in disconnected {
                sessions.remove(&session_id);
                debug!(%session_id, "removed disconnected session");
            }
        }
    }

    /// Drain the loop's event channel into `publish` until it closes.
    #[must_use]
    pub fn run_event_pump(&self, mut events: UnboundedReceiver<Event>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                hub.publish(event).await;
            }
            debug!("event channel closed, pump exiting");
        })
    }

    // ========================================================================
    // Client requests
    // ========================================================================

    /// Handle one client frame, producing the reply frame.
    pub async fn handle_client_message(&self, session_id: &str, text: &str) -> ServerMessage {
        {
            let mut sessions = self.inner.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.touch();
            }
        }

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(message) => return ServerMessage::Error { message },
        };

        match message {
            ClientMessage::Subscribe { types } => {
                let mut sessions = self.inner.sessions.write().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    session.subscribe(&types);
                }
                ServerMessage::SubscriptionConfirmed { types }
            }
            ClientMessage::Unsubscribe { types } => {
                let mut sessions = self.inner.sessions.write().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    session.unsubscribe(&types);
                }
                ServerMessage::UnsubscriptionConfirmed { types }
            }
            ClientMessage::SetFilters { filters } => {
                let mut sessions = self.inner.sessions.write().await;
                if let Some(session) = sessions.get_mut(session_id) {
                    session.set_filters(filters);
                }
                ServerMessage::FiltersUpdated
            }
            ClientMessage::GetStatus => match self.driver() {
                Some(driver) => ServerMessage::CurrentStatus {
                    data: driver.current_status().await,
                },
                None => ServerMessage::Error {
                    message: "No analysis driver attached".to_string(),
                },
            },
            ClientMessage::RunAnalysis => match self.driver() {
                Some(driver) => match driver.start_analysis().await {
                    Ok(()) => ServerMessage::CurrentStatus {
                        data: json!({ "started": true }),
                    },
                    Err(message) => ServerMessage::Error { message },
                },
                None => ServerMessage::Error {
                    message: "No analysis driver attached".to_string(),
                },
            },
            ClientMessage::Ping => ServerMessage::Pong,
        }
    }

    /// Reset a session's idle clock, e.g. on a transport-level pong.
    pub async fn touch_session(&self, session_id: &str) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.touch();
        }
    }

    fn driver(&self) -> Option<Arc<dyn AnalysisDriver>> {
        self.inner
            .driver
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// One heartbeat sweep: drop sessions idle past the client timeout,
    /// ping sessions idle past half the heartbeat interval.
    pub async fn heartbeat_tick(&self) {
        let timeout = self.inner.config.client_timeout();
        let ping_after = self.inner.config.heartbeat_interval() / 2;

        let mut expired = Vec::new();
        let mut to_ping = Vec::new();
        {
            let sessions = self.inner.sessions.read().await;
            for session in sessions.values() {
                let idle = session.idle_for();
                if !session.is_open() || idle > timeout {
                    expired.push((session.id.clone(), session.connection()));
                } else if idle > ping_after {
                    to_ping.push((session.id.clone(), session.connection()));
                }
            }
        }

        if !expired.is_empty() {
            let mut sessions = self.inner.sessions.write().await;
            for (session_id, _) in &expired {
                sessions.remove(session_id);
            }
        }
        for (session_id, connection) in expired {
            info!(%session_id, "session timed out");
            let _ = connection.close(CLOSE_CODE_NORMAL, "client timeout").await;
        }
        for (session_id, connection) in to_ping {
            if let Err(fault) = connection.ping().await {
                debug!(%session_id, "ping failed: {fault}");
            }
        }
    }

    /// Spawn the periodic heartbeat sweep. Abort the handle to cancel.
    #[must_use]
    pub fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let hub = self.clone();
        let interval = self.inner.config.heartbeat_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                hub.heartbeat_tick().await;
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn backdate_session(&self, session_id: &str, by: std::time::Duration) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.backdate_activity(by);
        }
    }
}
