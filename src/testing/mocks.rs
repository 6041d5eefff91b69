//! Mock implementations of the agent and connection seams.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::agent::{AgentContext, AgentReport, AgentTask};
use crate::hub::ObserverConnection;

// ============================================================================
// Mock Agent
// ============================================================================

#[derive(Debug, Clone)]
enum MockBehavior {
    Score(f64),
    Fail(String),
    Panic,
}

/// Scriptable [`AgentTask`] test double.
///
/// Behaviors are consumed per call; the last scripted behavior repeats
/// once the script runs out. Call counts are shared, so tests can assert
/// how many times the loop invoked the agent.
pub struct MockAgent {
    id: String,
    script: Mutex<Vec<MockBehavior>>,
    improvements: Vec<String>,
    issues: Vec<String>,
    calls: Arc<AtomicU32>,
}

impl MockAgent {
    /// An agent that scores a constant 75.0 until rescripted.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(vec![MockBehavior::Score(75.0)]),
            improvements: Vec::new(),
            issues: Vec::new(),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// An agent that always reports the given score.
    #[must_use]
    pub fn scoring(id: impl Into<String>, score: f64) -> Self {
        Self::new(id).with_scores(vec![score])
    }

    /// An agent that always fails with the given message.
    #[must_use]
    pub fn failing(id: impl Into<String>, message: impl Into<String>) -> Self {
        let agent = Self::new(id);
        *agent.script.lock().unwrap() = vec![MockBehavior::Fail(message.into())];
        agent
    }

    /// An agent that panics when executed.
    #[must_use]
    pub fn panicking(id: impl Into<String>) -> Self {
        let agent = Self::new(id);
        *agent.script.lock().unwrap() = vec![MockBehavior::Panic];
        agent
    }

    /// Script a score per call; the last score repeats.
    #[must_use]
    pub fn with_scores(self, scores: Vec<f64>) -> Self {
        *self.script.lock().unwrap() = scores.into_iter().map(MockBehavior::Score).collect();
        self
    }

    /// Fail the first `failures` calls with `message`, then score.
    #[must_use]
    pub fn with_failures_then_score(
        self,
        failures: u32,
        message: impl Into<String>,
        score: f64,
    ) -> Self {
        let message = message.into();
        let mut script: Vec<MockBehavior> = (0..failures)
            .map(|_| MockBehavior::Fail(message.clone()))
            .collect();
        script.push(MockBehavior::Score(score));
        *self.script.lock().unwrap() = script;
        self
    }

    /// Attach improvements to every successful report.
    #[must_use]
    pub fn with_improvements(mut self, improvements: Vec<String>) -> Self {
        self.improvements = improvements;
        self
    }

    /// Attach issues to every successful report.
    #[must_use]
    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.issues = issues;
        self
    }

    /// Shared handle to the call counter.
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicU32> {
        self.calls.clone()
    }

    /// Number of times `execute` has been called.
    #[must_use]
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentTask for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _ctx: &AgentContext) -> anyhow::Result<AgentReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let behavior = {
            let script = self.script.lock().unwrap();
            let index = call.min(script.len().saturating_sub(1));
            script.get(index).cloned()
        };
        match behavior {
            Some(MockBehavior::Score(score)) => Ok(AgentReport {
                score: Some(score),
                improvements: self.improvements.clone(),
                issues: self.issues.clone(),
            }),
            Some(MockBehavior::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(MockBehavior::Panic) => panic!("mock agent '{}' scripted to panic", self.id),
            None => Ok(AgentReport::default()),
        }
    }
}

// ============================================================================
// Mock Connection
// ============================================================================

/// Recording [`ObserverConnection`] test double.
///
/// Captures everything sent to it and supports injected send failures
/// for delivery-isolation tests.
pub struct MockConnection {
    sent: Arc<Mutex<Vec<String>>>,
    pings: AtomicU32,
    open: AtomicBool,
    fail_sends: AtomicBool,
    close_frame: Mutex<Option<(u16, String)>>,
}

impl MockConnection {
    /// An open connection that records everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            pings: AtomicU32::new(0),
            open: AtomicBool::new(true),
            fail_sends: AtomicBool::new(false),
            close_frame: Mutex::new(None),
        }
    }

    /// Make every subsequent `send_text` fail.
    #[must_use]
    pub fn with_failing_sends(self) -> Self {
        self.fail_sends.store(true, Ordering::SeqCst);
        self
    }

    /// Shared handle to the sent-message log.
    #[must_use]
    pub fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.sent.clone()
    }

    /// Snapshot of the messages sent so far.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// Number of pings sent.
    #[must_use]
    pub fn ping_count(&self) -> u32 {
        self.pings.load(Ordering::SeqCst)
    }

    /// The close frame, if the connection was closed.
    #[must_use]
    pub fn close_frame(&self) -> Option<(u16, String)> {
        self.close_frame.lock().unwrap().clone()
    }
}

impl Default for MockConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObserverConnection for MockConnection {
    async fn send_text(&self, text: &str) -> anyhow::Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            anyhow::bail!("injected send failure");
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self, code: u16, reason: &str) -> anyhow::Result<()> {
        self.open.store(false, Ordering::SeqCst);
        *self.close_frame.lock().unwrap() = Some((code, reason.to_string()));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_agent_score_script_repeats_last() {
        let agent = MockAgent::new("scores").with_scores(vec![70.0, 80.0]);
        let ctx = AgentContext::new("/tmp");
        assert_eq!(agent.execute(&ctx).await.unwrap().score, Some(70.0));
        assert_eq!(agent.execute(&ctx).await.unwrap().score, Some(80.0));
        assert_eq!(agent.execute(&ctx).await.unwrap().score, Some(80.0));
        assert_eq!(agent.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_agent_failures_then_score() {
        let agent = MockAgent::new("flaky").with_failures_then_score(2, "timed out", 88.0);
        let ctx = AgentContext::new("/tmp");
        assert!(agent.execute(&ctx).await.is_err());
        assert!(agent.execute(&ctx).await.is_err());
        assert_eq!(agent.execute(&ctx).await.unwrap().score, Some(88.0));
    }

    #[tokio::test]
    async fn test_mock_connection_records_and_closes() {
        let conn = MockConnection::new();
        conn.send_text("hello").await.unwrap();
        conn.ping().await.unwrap();
        conn.close(1013, "Server at capacity").await.unwrap();

        assert_eq!(conn.sent_messages(), vec!["hello".to_string()]);
        assert_eq!(conn.ping_count(), 1);
        assert!(!conn.is_open());
        assert_eq!(
            conn.close_frame(),
            Some((1013, "Server at capacity".to_string()))
        );
    }

    #[tokio::test]
    async fn test_mock_connection_injected_failure() {
        let conn = MockConnection::new().with_failing_sends();
        assert!(conn.send_text("dropped").await.is_err());
        assert!(conn.sent_messages().is_empty());
    }
}
