//! Integration tests for the observer hub: replay, capacity, heartbeat,
//! and the loop-to-hub event stream.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use kaizen::agent::{AgentContext, AgentRegistry};
use kaizen::config::{HubConfig, LoopConfig};
use kaizen::convergence::ConvergenceController;
use kaizen::event::{Event, EventType};
use kaizen::hub::{AnalysisDriver, EventHub, ServerMessage};
use kaizen::testing::{MockAgent, MockConnection};
use kaizen::KaizenError;

fn event(n: u32) -> Event {
    Event::new(EventType::Notification, json!({ "n": n }))
}

#[tokio::test]
async fn late_joiner_sees_exactly_the_buffered_window() {
    let hub = EventHub::new(HubConfig::default().with_buffer_size(2));
    hub.publish(event(1)).await;
    hub.publish(event(2)).await;
    hub.publish(event(3)).await;

    let conn = Arc::new(MockConnection::new());
    hub.add_session(conn.clone()).await.unwrap();

    let sent = conn.sent_messages();
    assert!(sent[0].contains("connection_established"));
    assert_eq!(sent.len(), 3);
    assert!(sent[1].contains(r#""n":2"#));
    assert!(sent[2].contains(r#""n":3"#));
}

#[tokio::test]
async fn backlog_precedes_live_events_for_a_new_session() {
    let hub = EventHub::new(HubConfig::default());
    hub.publish(event(1)).await;

    let conn = Arc::new(MockConnection::new());
    hub.add_session(conn.clone()).await.unwrap();
    hub.publish(event(2)).await;

    let sent = conn.sent_messages();
    let pos_old = sent.iter().position(|m| m.contains(r#""n":1"#)).unwrap();
    let pos_new = sent.iter().position(|m| m.contains(r#""n":2"#)).unwrap();
    assert!(pos_old < pos_new);
}

#[tokio::test]
async fn capacity_overflow_closes_with_1013_before_any_exchange() {
    let hub = EventHub::new(HubConfig::default().with_max_sessions(2));
    hub.add_session(Arc::new(MockConnection::new())).await.unwrap();
    hub.add_session(Arc::new(MockConnection::new())).await.unwrap();

    let rejected = Arc::new(MockConnection::new());
    let err = hub.add_session(rejected.clone()).await.unwrap_err();
    assert!(matches!(err, KaizenError::AtCapacity { max_sessions: 2 }));
    assert_eq!(
        rejected.close_frame(),
        Some((1013, "Server at capacity".to_string()))
    );
    assert!(rejected.sent_messages().is_empty());

    // Removing a session frees a slot.
    let sessions = hub.session_count().await;
    assert_eq!(sessions, 2);
}

#[tokio::test]
async fn idle_session_past_timeout_gets_no_further_broadcasts() {
    let hub = EventHub::new(
        HubConfig::default()
            .with_heartbeat_interval_ms(50)
            .with_client_timeout_ms(100),
    );
    let conn = Arc::new(MockConnection::new());
    hub.add_session(conn.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    hub.heartbeat_tick().await;
    assert_eq!(hub.session_count().await, 0);

    hub.publish(event(5)).await;
    assert!(!conn.sent_messages().iter().any(|m| m.contains(r#""n":5"#)));
}

#[tokio::test]
async fn remove_session_is_idempotent() {
    let hub = EventHub::new(HubConfig::default());
    let session_id = hub.add_session(Arc::new(MockConnection::new())).await.unwrap();
    assert!(hub.remove_session(&session_id).await);
    assert!(!hub.remove_session(&session_id).await);
}

#[tokio::test]
async fn one_broken_session_never_starves_the_rest() {
    let hub = EventHub::new(HubConfig::default());
    let broken = Arc::new(MockConnection::new().with_failing_sends());
    let healthy = Arc::new(MockConnection::new());
    hub.add_session(broken).await.unwrap();
    hub.add_session(healthy.clone()).await.unwrap();

    for n in 0..5 {
        hub.publish(event(n)).await;
    }
    let delivered = healthy
        .sent_messages()
        .iter()
        .filter(|m| m.contains(r#""n":"#))
        .count();
    assert_eq!(delivered, 5);
}

#[tokio::test]
async fn loop_events_flow_through_the_pump_to_observers() {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(MockAgent::scoring("structure", 95.0)));
    let mut config = LoopConfig::new(vec!["structure".into()])
        .with_max_iterations(3)
        .with_target_score(90.0);
    config.retry = config.retry.with_max_attempts(1).with_retry_delay_ms(1);

    let controller =
        ConvergenceController::new(config, registry, AgentContext::new("/tmp/project")).unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    controller.set_event_sender(tx);

    let hub = EventHub::new(HubConfig::default());
    let conn = Arc::new(MockConnection::new());
    hub.add_session(conn.clone()).await.unwrap();
    let pump = hub.run_event_pump(rx);

    controller.run().await.unwrap();
    drop(controller);
    pump.await.unwrap();

    let sent = conn.sent_messages();
    assert!(sent.iter().any(|m| m.contains(r#""type":"analysis_start""#)));
    assert!(sent.iter().any(|m| m.contains(r#""type":"iteration_start""#)));
    assert!(sent.iter().any(|m| m.contains(r#""type":"score_update""#)));
    assert!(sent
        .iter()
        .any(|m| m.contains(r#""type":"analysis_complete""#)));
}

#[tokio::test]
async fn get_status_and_run_analysis_go_through_the_driver() {
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(MockAgent::scoring("structure", 95.0)));
    let mut config = LoopConfig::new(vec!["structure".into()]).with_target_score(90.0);
    config.retry = config.retry.with_max_attempts(1).with_retry_delay_ms(1);
    let controller =
        ConvergenceController::new(config, registry, AgentContext::new("/tmp/project")).unwrap();

    let hub = EventHub::new(HubConfig::default());
    hub.set_driver(Arc::new(controller.clone()) as Arc<dyn AnalysisDriver>);

    let conn = Arc::new(MockConnection::new());
    let session_id = hub.add_session(conn).await.unwrap();

    let reply = hub
        .handle_client_message(&session_id, r#"{"type":"get_status"}"#)
        .await;
    match reply {
        ServerMessage::CurrentStatus { data } => {
            assert_eq!(data["is_running"], false);
            assert_eq!(data["phase"], "idle");
        }
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = hub
        .handle_client_message(&session_id, r#"{"type":"run_analysis"}"#)
        .await;
    assert!(matches!(reply, ServerMessage::CurrentStatus { .. }));

    // The run completes in the background; poll the driver until idle.
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let status = controller.status().await;
        if status.phase != kaizen::LoopPhase::Idle && !status.is_running {
            break;
        }
    }
    assert_eq!(
        controller.status().await.phase,
        kaizen::LoopPhase::TargetReached
    );
}

#[tokio::test]
async fn unknown_and_malformed_frames_get_error_replies() {
    let hub = EventHub::new(HubConfig::default());
    let session_id = hub.add_session(Arc::new(MockConnection::new())).await.unwrap();

    let reply = hub
        .handle_client_message(&session_id, r#"{"type":"fly"}"#)
        .await;
    match reply {
        ServerMessage::Error { message } => assert_eq!(message, "Unknown message type: fly"),
        other => panic!("unexpected reply: {other:?}"),
    }

    let reply = hub.handle_client_message(&session_id, "{{{").await;
    assert!(matches!(reply, ServerMessage::Error { .. }));
}
