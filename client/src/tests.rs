use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::auth::{RefreshError, RefreshedTokens, TokenRefresher};
use crate::transport::mock::MockConnector;
use crate::transport::OutboundPacket;
use crate::*;

const ENDPOINT: &str = "http://localhost:3001";

#[derive(Clone, Copy)]
enum Outcome {
    Grant,
    Reject,
    Fail,
}

struct StubRefresher {
    outcome: Outcome,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TokenRefresher for StubRefresher {
    async fn refresh(&self, _refresh_token: Option<&str>) -> Result<RefreshedTokens, RefreshError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.outcome {
            Outcome::Grant => Ok(RefreshedTokens {
                access_token: "fresh".to_string(),
                refresh_token: None,
            }),
            Outcome::Reject => Err(RefreshError::Unauthorized("refresh token revoked".to_string())),
            Outcome::Fail => Err(RefreshError::Status(503)),
        }
    }
}

struct Harness {
    client: RealtimeClient,
    mock: MockConnector,
    credentials: Arc<MemoryCredentialStore>,
    auth_failures: Arc<Mutex<Vec<String>>>,
    refresh_calls: Arc<AtomicUsize>,
}

fn harness(refresher: Option<Outcome>) -> Harness {
    let mock = MockConnector::default();
    let credentials = Arc::new(MemoryCredentialStore::with_tokens(
        Some("access-1".to_string()),
        Some("refresh-1".to_string()),
    ));
    let auth_failures = Arc::new(Mutex::new(Vec::new()));
    let refresh_calls = Arc::new(AtomicUsize::new(0));

    let failures = Arc::clone(&auth_failures);
    let mut builder = RealtimeClient::builder(ClientConfig::new(EndpointResolver::fixed(ENDPOINT)))
        .connector(mock.clone())
        .credentials(credentials.clone())
        .on_auth_failure(move |reason: &str| failures.lock().unwrap().push(reason.to_string()));

    if let Some(outcome) = refresher {
        builder = builder.refresher(StubRefresher {
            outcome,
            calls: Arc::clone(&refresh_calls),
        });
    }

    Harness {
        client: builder.build(),
        mock,
        credentials,
        auth_failures,
        refresh_calls,
    }
}

/// Let spawned pumps drain what the mock pushed
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn record(client: &RealtimeClient, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on(event, move |payload| sink.lock().unwrap().push(payload.clone()));
    seen
}

fn error_codes(errors: &Mutex<Vec<Value>>) -> Vec<String> {
    errors
        .lock()
        .unwrap()
        .iter()
        .map(|e| e["code"].as_str().unwrap_or_default().to_string())
        .collect()
}

async fn connected(h: &Harness) {
    assert!(h.client.connect());
    h.mock.push_last(TransportEvent::Connected);
    settle().await;
    assert!(h.client.is_connected());
}

fn connect_error(message: &str, code: Option<&str>) -> TransportEvent {
    TransportEvent::ConnectError {
        message: message.to_string(),
        code: code.map(str::to_string),
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_idempotent() {
    let h = harness(None);

    assert!(h.client.connect());
    assert!(!h.client.connect());
    assert_eq!(h.mock.opened(), 1);
    assert_eq!(h.client.state(), ConnectionState::Connecting);

    h.mock.push_last(TransportEvent::Connected);
    settle().await;

    assert!(!h.client.connect());
    assert_eq!(h.mock.opened(), 1);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_connect_options() {
    let resolved = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&resolved);
    let mock = MockConnector::default();
    let client = RealtimeClient::builder(ClientConfig::new(EndpointResolver::from_fn(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        ENDPOINT.to_string()
    })))
    .connector(mock.clone())
    .credentials(Arc::new(MemoryCredentialStore::with_tokens(Some("abc".to_string()), None)))
    .build();

    client.connect();

    let options = mock.options(0);
    assert_eq!(options.url, ENDPOINT);
    assert_eq!(options.namespace, "/");
    assert_eq!(options.path, "/socket.io/");
    assert_eq!(options.auth_token.as_deref(), Some("abc"));
    assert!(options.websocket_only);
    assert!(!options.reconnection);
    assert!(options.with_credentials);
    assert_eq!(resolved.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_emits_connect_event() {
    let h = harness(None);
    let connects = record(&h.client, "connect");

    connected(&h).await;

    assert_eq!(*connects.lock().unwrap(), vec![Value::Null]);
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unauthorized_connect_error_locks() {
    let h = harness(None);
    let errors = record(&h.client, "error");
    let connect_errors = record(&h.client, "connect_error");

    h.client.connect();
    h.mock.push_last(connect_error("Unauthorized", Some("UNAUTHORIZED")));
    settle().await;

    assert!(h.client.is_auth_locked());
    assert_eq!(h.client.state(), ConnectionState::AuthLocked);
    assert_eq!(h.client.auth_error_count(), 3);
    assert_eq!(h.credentials.access_token(), None);
    assert_eq!(h.credentials.refresh_token(), None);
    assert_eq!(h.auth_failures.lock().unwrap().len(), 1);
    assert!(h.mock.is_closed(0));

    assert_eq!(connect_errors.lock().unwrap().len(), 1);
    assert_eq!(error_codes(&errors), vec!["UNAUTHORIZED"]);

    // Locked until a refresh succeeds
    assert!(!h.client.connect());
    assert_eq!(h.mock.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_auth_error_detected_from_message() {
    let h = harness(None);

    h.client.connect();
    h.mock.push_last(connect_error("jwt expired", None));
    settle().await;

    assert!(h.client.is_auth_locked());
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_server_unauthorized_error_locks_and_drops_transport() {
    let h = harness(None);
    let errors = record(&h.client, "error");
    let rooms = record(&h.client, "roomUpdate");
    connected(&h).await;

    h.mock.server_event("joinedRoom", json!({"room": {"id": "r1"}}));
    h.mock.server_event(
        "error",
        json!({"message": "Token expired", "code": "UNAUTHORIZED"}),
    );
    settle().await;

    assert!(h.client.is_auth_locked());
    assert!(!h.client.is_connected());
    assert_eq!(h.client.current_room_id(), None);
    assert_eq!(error_codes(&errors), vec!["UNAUTHORIZED"]);
    assert_eq!(errors.lock().unwrap()[0]["message"], "Token expired");
    assert_eq!(*h.auth_failures.lock().unwrap(), vec!["Token expired".to_string()]);

    // The old transport is gone; nothing it says is delivered
    h.mock.push(0, TransportEvent::Event {
        name: "roomUpdate".to_string(),
        payload: json!({"id": "r1"}),
    });
    settle().await;
    assert!(rooms.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_does_not_lock() {
    let h = harness(None);
    let errors = record(&h.client, "error");
    connected(&h).await;

    h.mock.server_event(
        "error",
        json!({"message": "Not the host", "code": "FORBIDDEN", "event": "chooseMovie"}),
    );
    settle().await;

    assert!(!h.client.is_auth_locked());
    assert!(h.client.is_connected());
    assert_eq!(errors.lock().unwrap()[0]["event"], "chooseMovie");
}

#[tokio::test(start_paused = true)]
async fn test_max_attempts_reported_once() {
    let h = harness(None);
    let errors = record(&h.client, "error");

    for _ in 0..5 {
        assert!(h.client.connect());
        h.mock.push_last(connect_error("xhr poll error", None));
        settle().await;
    }

    assert_eq!(h.mock.opened(), 5);
    assert_eq!(h.client.reconnect_attempts(), 5);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(!h.client.is_auth_locked());

    let codes = error_codes(&errors);
    assert_eq!(codes.iter().filter(|c| *c == "MAX_RECONNECT_ATTEMPTS").count(), 1);
    assert_eq!(codes.iter().filter(|c| *c == "CONNECTION_ERROR").count(), 5);
    assert_eq!(codes.last().map(String::as_str), Some("MAX_RECONNECT_ATTEMPTS"));
}

#[tokio::test(start_paused = true)]
async fn test_successful_connect_resets_attempts() {
    let h = harness(None);

    for _ in 0..2 {
        h.client.connect();
        h.mock.push_last(connect_error("timeout", None));
        settle().await;
    }
    assert_eq!(h.client.reconnect_attempts(), 2);

    connected(&h).await;
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_waits_backoff() {
    let h = harness(None);

    h.client.connect();
    h.mock.push_last(connect_error("timeout", None));
    settle().await;

    let client = h.client.clone();
    let reconnect = tokio::spawn(async move { client.reconnect().await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.mock.opened(), 1);

    assert!(reconnect.await.unwrap());
    assert_eq!(h.mock.opened(), 2);

    // Already connecting
    assert!(!h.client.reconnect().await);
}

#[tokio::test(start_paused = true)]
async fn test_send_message_validation() {
    let h = harness(None);
    let errors = record(&h.client, "error");
    connected(&h).await;

    for text in ["", "   \n\t"] {
        let err = h.client.send_message("r1", text).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert_eq!(err.event, OutboundEvent::SendMessage);
    }

    let err = h.client.send_message("r1", &"a".repeat(1001)).unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);
    assert!(err.message.contains("too long"));

    let err = h.client.send_message("123456", "hi").unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);

    assert!(h.mock.sent_events().is_empty());
    assert_eq!(errors.lock().unwrap().len(), 4);
    assert_eq!(errors.lock().unwrap()[0]["event"], "sendMessage");

    // Length is counted in characters
    h.client.send_message("r1", &"é".repeat(1000)).unwrap();
    h.client.send_message("r1", "  popcorn?  ").unwrap();

    let sent = h.mock.sent_events();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[1],
        (
            "sendMessage".to_string(),
            Some(json!({"roomId": "r1", "message": "popcorn?"}))
        )
    );
}

#[tokio::test(start_paused = true)]
async fn test_commands_require_connection() {
    let h = harness(None);
    let errors = record(&h.client, "error");

    let err = h.client.send_message("r1", "hi").unwrap_err();
    assert_eq!(err.code, ErrorCode::NotConnected);

    assert_eq!(h.client.get_my_rooms().unwrap_err().code, ErrorCode::NotConnected);
    assert_eq!(h.client.leave_room("r1").unwrap_err().code, ErrorCode::NotConnected);

    assert_eq!(
        error_codes(&errors),
        vec!["NOT_CONNECTED", "NOT_CONNECTED", "NOT_CONNECTED"]
    );
    assert_eq!(errors.lock().unwrap()[1]["event"], "getMyRooms");
    assert_eq!(h.mock.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_room_commands() {
    let h = harness(None);
    connected(&h).await;

    h.client.create_room(json!({"name": "Friday night"})).unwrap();
    h.client.get_my_rooms().unwrap();
    h.client.get_room("r1").unwrap();
    h.client.choose_movie("r1", "m42").unwrap();
    h.client.leave_room("r1").unwrap();

    assert_eq!(
        h.mock.sent_events(),
        vec![
            ("createRoom".to_string(), Some(json!({"name": "Friday night"}))),
            ("getMyRooms".to_string(), None),
            ("getRoom".to_string(), Some(json!({"roomId": "r1"}))),
            ("chooseMovie".to_string(), Some(json!({"roomId": "r1", "movieId": "m42"}))),
            ("leaveRoom".to_string(), Some(json!({"roomId": "r1"}))),
        ]
    );

    assert_eq!(
        h.client.create_room(json!(["not", "an", "object"])).unwrap_err().code,
        ErrorCode::BadRequest
    );
    assert_eq!(h.client.choose_movie("r1", " ").unwrap_err().code, ErrorCode::BadRequest);
    assert_eq!(h.client.get_room("").unwrap_err().code, ErrorCode::BadRequest);
    assert_eq!(h.mock.sent_events().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_join_while_disconnected_sends_once() {
    let h = harness(None);

    let client = h.client.clone();
    let join = tokio::spawn(async move { client.join_room("123456", "user-1").await });
    settle().await;

    assert_eq!(h.mock.opened(), 1);
    assert!(h.mock.sent_events().is_empty());

    h.mock.push_last(TransportEvent::Connected);
    join.await.unwrap().unwrap();

    assert_eq!(
        h.mock.sent_events(),
        vec![(
            "joinRoom".to_string(),
            Some(json!({"publicCode": "123456", "userId": "user-1"}))
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_times_out() {
    let h = harness(None);
    let errors = record(&h.client, "error");

    let client = h.client.clone();
    let join = tokio::spawn(async move { client.join_room("654321", "user-1").await });

    tokio::time::sleep(Duration::from_secs(6)).await;
    let err = join.await.unwrap().unwrap_err();

    assert_eq!(err.code, ErrorCode::NotConnected);
    assert_eq!(error_codes(&errors), vec!["NOT_CONNECTED"]);
    assert_eq!(errors.lock().unwrap()[0]["event"], "joinRoom");

    // A late connection does not resurrect the join
    h.mock.push_last(TransportEvent::Connected);
    settle().await;
    assert!(h.client.is_connected());
    assert!(h.mock.sent_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_join_gives_up_when_attempt_fails() {
    let h = harness(None);

    let client = h.client.clone();
    let join = tokio::spawn(async move { client.join_room("654321", "user-1").await });
    settle().await;

    h.mock.push_last(connect_error("timeout", None));
    let err = join.await.unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::NotConnected);
    assert!(h.mock.sent_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_join_validation() {
    let h = harness(None);

    let err = h.client.join_room("12345", "user-1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);

    let err = h.client.join_room("12a456", "user-1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);

    let err = h.client.join_room("123456", "  ").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::BadRequest);

    assert_eq!(h.mock.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_join_while_locked_fails_fast() {
    let h = harness(None);

    h.client.connect();
    h.mock.push_last(connect_error("Unauthorized", Some("UNAUTHORIZED")));
    settle().await;

    let err = h.client.join_room("123456", "user-1").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotConnected);
    assert_eq!(h.mock.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_clears_room() {
    let h = harness(None);
    let disconnects = record(&h.client, "disconnect");
    connected(&h).await;

    h.mock.server_event("joinedRoom", json!({"id": "r1", "name": "Friday"}));
    settle().await;
    assert_eq!(h.client.current_room_id().as_deref(), Some("r1"));

    h.client.disconnect();

    assert!(!h.client.is_connected());
    assert_eq!(h.client.current_room_id(), None);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert_eq!(*disconnects.lock().unwrap(), vec![json!("io client disconnect")]);
    assert_eq!(h.mock.sent(0).last(), Some(&OutboundPacket::Close));

    // Repeating is harmless
    h.client.disconnect();
    assert_eq!(disconnects.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_loss_keeps_room_and_ignores_stale_transport() {
    let h = harness(None);
    let disconnects = record(&h.client, "disconnect");
    let updates = record(&h.client, "roomUpdate");
    connected(&h).await;

    h.mock.server_event("joinedRoom", json!({"room": {"id": "r1"}}));
    h.mock.push_last(TransportEvent::Disconnected("transport close".to_string()));
    settle().await;

    assert_eq!(*disconnects.lock().unwrap(), vec![json!("transport close")]);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert_eq!(h.client.current_room_id().as_deref(), Some("r1"));

    assert!(h.client.connect());
    h.mock.push(0, TransportEvent::Event {
        name: "roomUpdate".to_string(),
        payload: json!({"id": "stale"}),
    });
    h.mock.push(1, TransportEvent::Event {
        name: "roomUpdate".to_string(),
        payload: json!({"id": "fresh"}),
    });
    settle().await;

    assert_eq!(*updates.lock().unwrap(), vec![json!({"id": "fresh"})]);
}

#[tokio::test(start_paused = true)]
async fn test_left_room_clears_current_room() {
    let h = harness(None);
    connected(&h).await;

    h.mock.server_event("joinedRoom", json!({"id": "r1"}));
    h.mock.server_event("leftRoom", json!({"roomId": "r2"}));
    settle().await;
    assert_eq!(h.client.current_room_id().as_deref(), Some("r1"));

    h.mock.server_event("leftRoom", json!({"roomId": "r1"}));
    settle().await;
    assert_eq!(h.client.current_room_id(), None);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_mutes_chat() {
    let h = harness(None);
    connected(&h).await;

    h.mock.server_event(
        "error",
        json!({
            "message": "Slow down",
            "code": "RATE_LIMITED",
            "event": "sendMessage",
            "retryAfter": 30
        }),
    );
    settle().await;

    assert!(h.client.is_muted());
    let err = h.client.send_message("r1", "hello").unwrap_err();
    assert_eq!(err.code, ErrorCode::RateLimited);
    assert!(h.mock.sent_events().is_empty());

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert!(!h.client.is_muted());
    h.client.send_message("r1", "hello").unwrap();
    assert_eq!(h.mock.sent_events().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_token_refreshed_event_updates_credentials() {
    let h = harness(None);
    let refreshed = record(&h.client, "tokenRefreshed");
    connected(&h).await;

    h.mock.server_event("tokenRefreshed", json!({"accessToken": "access-2"}));
    settle().await;

    assert_eq!(h.credentials.access_token().as_deref(), Some("access-2"));
    assert_eq!(refreshed.lock().unwrap().len(), 1);

    h.client.disconnect();
    h.client.connect();
    assert_eq!(h.mock.options(1).auth_token.as_deref(), Some("access-2"));
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_refreshes_once_then_reconnects() {
    let h = harness(Some(Outcome::Grant));

    h.client.connect();
    h.mock.push_last(connect_error("Unauthorized", Some("UNAUTHORIZED")));
    settle().await;

    assert_eq!(h.refresh_calls.load(Ordering::SeqCst), 1);
    assert!(h.auth_failures.lock().unwrap().is_empty());
    assert!(!h.client.is_auth_locked());
    assert_eq!(h.credentials.access_token().as_deref(), Some("fresh"));
    assert_eq!(h.mock.opened(), 2);
    assert_eq!(h.mock.options(1).auth_token.as_deref(), Some("fresh"));

    // The refreshed token is rejected too: no second refresh this cycle
    h.mock.push_last(connect_error("Unauthorized", Some("UNAUTHORIZED")));
    settle().await;

    assert_eq!(h.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth_failures.lock().unwrap().len(), 1);
    assert!(h.client.is_auth_locked());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_refresh_invokes_handler() {
    let h = harness(Some(Outcome::Reject));

    h.client.connect();
    h.mock.push_last(connect_error("Unauthorized", Some("UNAUTHORIZED")));
    settle().await;

    assert_eq!(h.refresh_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.auth_failures.lock().unwrap().len(), 1);
    assert!(h.client.is_auth_locked());
    assert_eq!(h.credentials.access_token(), None);
    assert_eq!(h.mock.opened(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_reports_error() {
    let h = harness(Some(Outcome::Fail));
    let errors = record(&h.client, "error");

    h.client.connect();
    h.mock.push_last(connect_error("Unauthorized", Some("UNAUTHORIZED")));
    settle().await;

    assert!(error_codes(&errors).contains(&"REFRESH_FAILED".to_string()));
    assert!(h.auth_failures.lock().unwrap().is_empty());
    assert!(h.client.is_auth_locked());

    // Manual retries go through the same refresher
    let err = h.client.refresh_token().await.unwrap_err();
    assert!(matches!(err, RefreshError::Status(503)));
}

#[tokio::test(start_paused = true)]
async fn test_refresh_without_refresher() {
    let h = harness(None);
    let err = h.client.refresh_token().await.unwrap_err();
    assert!(matches!(err, RefreshError::Unavailable));
}

#[tokio::test(start_paused = true)]
async fn test_state_watch() {
    let h = harness(None);
    let mut states = h.client.subscribe_state();
    assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);

    h.client.connect();
    assert!(states.has_changed().unwrap());
    assert_eq!(*states.borrow_and_update(), ConnectionState::Connecting);

    h.mock.push_last(TransportEvent::Connected);
    states.changed().await.unwrap();
    assert_eq!(*states.borrow(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_room_tracker_follows_events() {
    let h = harness(None);
    let tracker = RoomTracker::attach(&h.client);
    connected(&h).await;

    h.mock.server_event("joinedRoom", json!({"room": {"id": "r1"}}));
    h.mock.server_event("chatHistory", json!([{"roomId": "r1", "text": "hi"}]));
    h.mock.server_event("newMessage", json!({"roomId": "r1", "text": "hey"}));
    settle().await;

    let snapshot = tracker.snapshot();
    assert!(snapshot.connected);
    assert_eq!(snapshot.room_id().as_deref(), Some("r1"));
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(tracker.room_id().as_deref(), Some("r1"));

    assert!(h.client.registry().listener_count("newMessage") > 0);
    drop(tracker);
    assert_eq!(h.client.registry().listener_count("newMessage"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_room_tracker_sees_auth_lock() {
    let h = harness(None);
    let tracker = RoomTracker::attach(&h.client);
    connected(&h).await;
    assert!(tracker.snapshot().connected);

    h.mock.server_event(
        "error",
        json!({"message": "Token expired", "code": "UNAUTHORIZED"}),
    );
    settle().await;

    assert!(h.client.is_auth_locked());
    assert!(!h.client.is_connected());
    assert_eq!(tracker.snapshot().connected, h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_structured_code_overrides_message() {
    let h = harness(None);
    let errors = record(&h.client, "error");

    h.client.connect();
    h.mock.push_last(connect_error("Too many unauthorized attempts", Some("RATE_LIMITED")));
    settle().await;

    assert!(!h.client.is_auth_locked());
    assert_eq!(h.client.reconnect_attempts(), 1);
    assert_eq!(h.credentials.access_token().as_deref(), Some("access-1"));
    assert!(h.auth_failures.lock().unwrap().is_empty());
    assert_eq!(error_codes(&errors), vec!["CONNECTION_ERROR"]);

    // An unrecognised code falls back to the message
    h.client.connect();
    h.mock.push_last(connect_error("invalid token", Some("E_WHATEVER")));
    settle().await;
    assert!(h.client.is_auth_locked());
}

#[test]
fn test_connect_outside_runtime_reports_error() {
    let h = harness(None);
    let errors = record(&h.client, "error");

    assert!(!h.client.connect());
    assert_eq!(h.mock.opened(), 0);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert_eq!(error_codes(&errors), vec!["CONNECTION_ERROR"]);
}

#[tokio::test(start_paused = true)]
async fn test_dispose_drops_listeners() {
    let h = harness(None);
    let connects = record(&h.client, "connect");
    connected(&h).await;

    h.client.dispose();
    assert_eq!(h.client.registry().listener_count("connect"), 0);

    h.client.connect();
    h.mock.push_last(TransportEvent::Connected);
    settle().await;
    assert_eq!(connects.lock().unwrap().len(), 1);
}
