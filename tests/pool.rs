//! Connection pool behavior against a live WebSocket server.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;
use serde_json::{Value, json};
use tokio::task::JoinSet;
use tokio_test::{assert_err, assert_ok};

use pooled_socket::{Command, ConnectionPool, Error};

use common::{Mode, TestServer, fast_options, init_tracing, refused_endpoint, wait_until};

fn echo(payload: Value) -> Command {
    Command::Echo(payload)
}

// ============================================================================
// Basic Calls
// ============================================================================

#[tokio::test]
async fn test_echo_round_trip() {
    init_tracing();
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(3)).await);

    assert_eq!(pool.connection_count(), 3);
    assert_eq!(server.handshakes(), 3);

    let response = assert_ok!(pool.send_and_await(echo(json!({"n": 1}))).await);
    assert_eq!(response.message_type, "echo");
    assert_eq!(response.payload, json!({"n": 1}));
    assert_eq!(pool.pending_count(), 0);

    pool.close().await;
}

#[tokio::test]
async fn test_credential_sent_on_every_handshake() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(2)).await);

    assert_eq!(server.auth_keys(), vec![common::API_KEY.to_string(); 2]);

    pool.close().await;
}

#[tokio::test]
async fn test_oneway_send_gets_no_reply() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(1)).await);

    assert_ok!(pool.send(echo(json!({"n": 1}))).await);
    assert!(wait_until(Duration::from_secs(2), || server.frames() == 1).await);
    assert_eq!(pool.pending_count(), 0);

    pool.close().await;
}

#[tokio::test]
async fn test_reply_to_fallback() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(1)).await);

    // The server answers this command by replyTo only
    let response = assert_ok!(pool.send_and_await(Command::GetApplicationPolicies).await);
    assert!(response.id.is_none());
    assert!(response.reply_to.is_some());

    pool.close().await;
}

#[tokio::test]
async fn test_remote_error_keeps_connection() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(1)).await);

    let request = pooled_socket::AllocationRequest::new("tokens", 500.0);
    let err = assert_err!(pool.send_and_await(Command::RequestForAllocation(request)).await);
    match &err {
        Error::Remote { code, message } => {
            assert_eq!(code, "limit_exceeded");
            assert_eq!(message, "Allocation exceeds limit");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
    assert!(!err.is_degraded());

    assert_eq!(pool.connection_count(), 1);
    assert_ok!(pool.send_and_await(echo(json!("still alive"))).await);

    pool.close().await;
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_are_never_crossed() {
    let server = TestServer::start().await;
    let pool = assert_ok!(
        ConnectionPool::connect(server.options(3).with_request_timeout(Duration::from_secs(5))).await
    );

    let mut tasks = JoinSet::new();
    for n in 0..200u64 {
        let pool = Arc::clone(&pool);
        tasks.spawn(async move {
            let response = pool
                .send_and_await(echo(json!({"n": n, "delay_ms": n % 7})))
                .await?;
            Ok::<_, Error>((n, response.payload))
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (n, payload) = joined.expect("join").expect("call");
        assert_eq!(payload["n"], json!(n));
    }

    assert_eq!(pool.pending_count(), 0);
    pool.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeouts_under_load_do_not_cross_talk() {
    let server = TestServer::start().await;
    let pool = assert_ok!(
        ConnectionPool::connect(server.options(2).with_request_timeout(Duration::from_millis(150)))
            .await
    );

    let mut tasks = JoinSet::new();
    for n in 0..50u64 {
        let pool = Arc::clone(&pool);
        let delay = if n % 2 == 0 { 400 } else { 0 };
        tasks.spawn(async move {
            let result = pool
                .send_and_await(echo(json!({"n": n, "delay_ms": delay})))
                .await;
            (n, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (n, result) = joined.expect("join");
        if n % 2 == 0 {
            let err = result.unwrap_err();
            assert!(matches!(err, Error::RequestTimeout { .. }), "{n}: {err}");
        } else {
            let response = result.expect("fast call");
            assert_eq!(response.payload["n"], json!(n));
        }
    }

    // Late replies arrive and are dropped
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(pool.pending_count(), 0);
    assert_eq!(pool.connection_count(), 2);

    pool.close().await;
}

#[tokio::test]
async fn test_least_busy_connection_is_chosen() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(2)).await);

    // Idle pool: equal load rotates across both connections
    let mut seen = FxHashSet::default();
    for _ in 0..4 {
        let response = assert_ok!(pool.send_and_await(echo(json!({"whoami": true}))).await);
        seen.insert(response.payload["conn"].clone());
    }
    assert_eq!(seen.len(), 2);

    // Pin one connection with a call that never returns
    let pinned = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            pool.send_and_await_with_timeout(echo(json!({"silent": true})), Duration::from_secs(5))
                .await
        })
    };
    assert!(wait_until(Duration::from_secs(2), || pool.pending_count() == 1).await);

    let mut seen = FxHashSet::default();
    for _ in 0..4 {
        let response = assert_ok!(pool.send_and_await(echo(json!({"whoami": true}))).await);
        seen.insert(response.payload["conn"].clone());
    }
    assert_eq!(seen.len(), 1);

    pinned.abort();
    pool.close().await;
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn test_lost_connection_fails_pending_calls_fast() {
    init_tracing();
    let server = TestServer::start().await;
    let pool = assert_ok!(
        ConnectionPool::connect(server.options(1).with_request_timeout(Duration::from_secs(10)))
            .await
    );

    let mut calls = JoinSet::new();
    for _ in 0..5 {
        let pool = Arc::clone(&pool);
        calls.spawn(async move { pool.send_and_await(echo(json!({"silent": true}))).await });
    }
    assert!(wait_until(Duration::from_secs(2), || pool.pending_count() == 5).await);

    let started = Instant::now();
    assert_ok!(pool.send(echo(json!({"kill": true}))).await);

    while let Some(joined) = calls.join_next().await {
        let err = joined.expect("join").unwrap_err();
        assert!(matches!(err, Error::ConnectionLost { index: 0, .. }), "{err}");
        assert!(err.is_degraded());
    }
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(pool.pending_count(), 0);

    pool.close().await;
}

#[tokio::test]
async fn test_late_reply_after_timeout_is_ignored() {
    let server = TestServer::start().await;
    let pool = assert_ok!(
        ConnectionPool::connect(server.options(1).with_request_timeout(Duration::from_millis(100)))
            .await
    );

    let err = assert_err!(pool.send_and_await(echo(json!({"delay_ms": 300}))).await);
    assert!(err.is_timeout());
    assert_eq!(pool.pending_count(), 0);

    tokio::time::sleep(Duration::from_millis(350)).await;

    assert!(pool.is_connected());
    let response = assert_ok!(pool.send_and_await(echo(json!({"n": 2}))).await);
    assert_eq!(response.payload, json!({"n": 2}));

    pool.close().await;
}

#[tokio::test]
async fn test_no_connection_available() {
    let options = fast_options(refused_endpoint().await)
        .with_pool_size(2)
        .with_max_reconnect_attempts(1);
    let pool = assert_ok!(ConnectionPool::connect(options).await);

    assert!(!pool.is_connected());
    let err = assert_err!(pool.send_and_await(echo(json!(1))).await);
    assert!(matches!(err, Error::NoConnectionAvailable));
    assert!(err.is_degraded());

    let err = assert_err!(pool.send(echo(json!(1))).await);
    assert!(matches!(err, Error::NoConnectionAvailable));

    pool.close().await;
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test]
async fn test_reconnect_after_server_drops_connections() {
    init_tracing();
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(2)).await);
    assert_eq!(server.handshakes(), 2);

    server.disconnect_all();

    assert!(
        wait_until(Duration::from_secs(3), || {
            server.handshakes() == 4 && pool.connection_count() == 2
        })
        .await
    );
    assert_eq!(pool.reconnecting_count(), 0);

    let response = assert_ok!(pool.send_and_await(echo(json!("back"))).await);
    assert_eq!(response.payload, json!("back"));

    pool.close().await;
}

#[tokio::test]
async fn test_reconnect_gives_up_then_explicit_reconnect() {
    let server = TestServer::start_with(Mode::Reject).await;
    let options = server
        .options(1)
        .with_reconnect_delay(Duration::from_millis(10), Duration::from_millis(40))
        .with_max_reconnect_attempts(3);
    let pool = assert_ok!(ConnectionPool::connect(options).await);
    assert!(!pool.is_connected());

    // One initial dial plus three retries
    assert!(wait_until(Duration::from_secs(3), || pool.reconnecting_count() == 0).await);
    assert_eq!(server.accepts(), 4);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.accepts(), 4);
    assert!(!pool.is_connected());

    server.set_mode(Mode::Serve);
    let live = assert_ok!(pool.reconnect().await);
    assert_eq!(live, 1);
    assert_eq!(server.accepts(), 5);
    assert!(pool.is_connected());

    pool.close().await;
}

#[tokio::test]
async fn test_reconnect_leaves_live_slots_alone() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(2)).await);

    let live = assert_ok!(pool.reconnect().await);
    assert_eq!(live, 2);
    assert_eq!(server.handshakes(), 2);

    pool.close().await;
}

// ============================================================================
// Close
// ============================================================================

#[tokio::test]
async fn test_concurrent_close() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(3)).await);

    let (a, b) = (Arc::clone(&pool), Arc::clone(&pool));
    tokio::join!(a.close(), b.close());

    assert!(pool.is_closed());
    assert!(!pool.is_connected());
    assert!(matches!(
        pool.send_and_await(echo(json!(1))).await.unwrap_err(),
        Error::Closed
    ));
    assert!(matches!(pool.reconnect().await.unwrap_err(), Error::Closed));
}

#[tokio::test]
async fn test_close_stops_reconnecting() {
    let server = TestServer::start().await;
    let pool = assert_ok!(ConnectionPool::connect(server.options(1)).await);

    server.stop_listening();
    server.disconnect_all();
    assert!(wait_until(Duration::from_secs(2), || pool.reconnecting_count() == 1).await);

    pool.close().await;
    assert_eq!(pool.reconnecting_count(), 0);

    let accepts = server.accepts();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.accepts(), accepts);
}
