//! Acquire/release protocol tests against the mock pool.
//!
//! ```bash
//! cargo test -p connpool --test protocol
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::cell::Cell;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use connpool::{ConnState, Pool, PoolError, Released, acquire, discard};
use connpool_testing::{MockPool, MockTransport};
use tokio::time::Instant;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}

// =============================================================================
// Acquire
// =============================================================================

#[tokio::test]
async fn test_acquire_new_then_reused() {
    init_tracing();
    let pool = MockPool::new(2);

    let checkout = acquire(&pool).await.unwrap();
    assert!(checkout.is_new);
    let id = checkout.conn.id();

    let released = checkout
        .conn
        .release(&pool, None::<&io::Error>, discard::never)
        .await
        .unwrap();
    assert_eq!(released, Released::Returned);

    let (conn, is_new) = acquire(&pool).await.unwrap().into_parts();
    assert!(!is_new);
    assert_eq!(conn.id(), id);
}

#[tokio::test]
async fn test_acquire_exhausted_pool_returns_pool_error() {
    init_tracing();
    let pool = MockPool::new(1);
    let _held = acquire(&pool).await.unwrap();

    let err = acquire(&pool).await.unwrap_err();
    assert!(matches!(err, PoolError::Exhausted { max: 1 }));
    assert_eq!(
        err.to_string(),
        "pool exhausted: maximum connections (1) in use"
    );
}

#[tokio::test]
async fn test_acquire_dial_failure_is_unmodified() {
    init_tracing();
    let pool = MockPool::new(1);
    pool.fail_next_dial(io::ErrorKind::ConnectionRefused);

    match acquire(&pool).await {
        Err(PoolError::ConnectionCreation(e)) => {
            assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(pool.stats().gets(), 1);
}

#[tokio::test]
async fn test_acquire_through_trait_object() {
    let pool: Arc<dyn Pool<Transport = MockTransport, Error = PoolError>> =
        Arc::new(MockPool::new(1));

    let checkout = acquire(pool.as_ref()).await.unwrap();
    let released = checkout
        .conn
        .release(pool.as_ref(), None::<&io::Error>, discard::never)
        .await
        .unwrap();
    assert!(released.is_returned());
}

// =============================================================================
// Release
// =============================================================================

#[tokio::test]
async fn test_release_discard_removes_exactly_once() {
    init_tracing();
    let pool = MockPool::new(1);
    let conn = acquire(&pool).await.unwrap().conn;
    let failure = io::Error::from(io::ErrorKind::BrokenPipe);

    let released = conn
        .release(&pool, Some(&failure), discard::on_broken_transport)
        .await
        .unwrap();

    assert_eq!(released, Released::Discarded);
    assert!(!released.is_returned());
    assert_eq!(pool.stats().removes(), 1);
    assert_eq!(pool.stats().puts(), 0);
    assert!(pool.dialed()[0].is_closed());
    assert_eq!(pool.open_connections(), 0);
}

#[tokio::test]
async fn test_release_keep_puts_exactly_once() {
    init_tracing();
    let pool = MockPool::new(1);
    let conn = acquire(&pool).await.unwrap().conn;
    let failure = io::Error::new(io::ErrorKind::InvalidData, "unexpected reply");

    let released = conn
        .release(&pool, Some(&failure), discard::on_broken_transport)
        .await
        .unwrap();

    assert_eq!(released, Released::Returned);
    assert_eq!(pool.stats().puts(), 1);
    assert_eq!(pool.stats().removes(), 0);
    assert_eq!(pool.idle_connections(), 1);
    assert!(!pool.dialed()[0].is_closed());
}

#[tokio::test]
async fn test_release_predicate_sees_error_once() {
    let pool = MockPool::new(1);
    let conn = acquire(&pool).await.unwrap().conn;
    let calls = AtomicUsize::new(0);

    #[derive(Debug)]
    struct DecodeError(&'static str);

    let failure = DecodeError("bad frame");
    conn.release(&pool, Some(&failure), |err: Option<&DecodeError>| {
        calls.fetch_add(1, Ordering::Relaxed);
        assert_eq!(err.map(|e| e.0), Some("bad frame"));
        false
    })
    .await
    .unwrap();

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    assert_eq!(pool.stats().puts(), 1);
}

#[tokio::test]
async fn test_release_put_failure_is_returned() {
    init_tracing();
    let pool = MockPool::new(1);
    let conn = acquire(&pool).await.unwrap().conn;
    pool.close();

    let err = conn
        .release(&pool, None::<&io::Error>, discard::never)
        .await
        .unwrap_err();

    assert!(matches!(err, PoolError::PoolClosed));
    assert_eq!(pool.stats().puts(), 1);
    assert_eq!(pool.stats().removes(), 0);
    assert!(pool.dialed()[0].is_closed());
}

#[tokio::test]
async fn test_release_remove_failure_is_returned() {
    init_tracing();
    let pool = MockPool::new(1);
    let conn = acquire(&pool).await.unwrap().conn;
    pool.dialed()[0].fail_close(Some(io::ErrorKind::PermissionDenied));

    let err = conn
        .release(&pool, None::<&io::Error>, discard::always)
        .await
        .unwrap_err();

    match err {
        PoolError::ConnectionClose(e) => assert_eq!(e.kind(), io::ErrorKind::PermissionDenied),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(pool.stats().removes(), 1);
    assert_eq!(pool.stats().puts(), 0);
}

#[tokio::test]
async fn test_release_with_unsync_error_can_be_spawned() {
    let pool = Arc::new(MockPool::new(1));
    let conn = acquire(pool.as_ref()).await.unwrap().conn;

    let task = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let failure = Cell::new(7u8);
            let release = conn.release(
                pool.as_ref(),
                Some(&failure),
                |err: Option<&Cell<u8>>| err.is_some_and(|e| e.get() == 7),
            );
            release.await
        })
    };

    assert_eq!(task.await.unwrap().unwrap(), Released::Discarded);
    assert_eq!(pool.stats().removes(), 1);
}

#[tokio::test]
async fn test_state_machine_follows_release_outcome() {
    let pool = MockPool::new(2);
    let mut state = ConnState::Idle;

    let conn = acquire(&pool).await.unwrap().conn;
    state = state.acquire().unwrap();
    let outcome = conn
        .release(&pool, None::<&io::Error>, discard::on_any_error)
        .await
        .unwrap();
    state = state.release(outcome).unwrap();
    assert_eq!(state, ConnState::Idle);

    let conn = acquire(&pool).await.unwrap().conn;
    state = state.acquire().unwrap();
    let failure = io::Error::other("boom");
    let outcome = conn
        .release(&pool, Some(&failure), discard::on_any_error)
        .await
        .unwrap();
    state = state.release(outcome).unwrap();
    assert_eq!(state, ConnState::Removed);
}

// =============================================================================
// Timeouts during a checkout
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_write_timeout_then_release_discards() {
    init_tracing();
    let pool = MockPool::new(1);
    let mut conn = acquire(&pool).await.unwrap().conn;

    conn.set_write_timeout(Duration::from_secs(1)).unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    let result = conn.write(b"QUIT\r\n").await;
    let err = result.as_ref().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);

    let released = conn
        .release(&pool, result.as_ref().err(), discard::on_broken_transport)
        .await
        .unwrap();
    assert_eq!(released, Released::Discarded);
    assert!(pool.dialed()[0].written().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_read_deadline_cleared_by_zero_timeout() {
    let pool = MockPool::new(1);
    let mut conn = acquire(&pool).await.unwrap().conn;
    let transport = pool.dialed()[0].clone();

    conn.set_read_timeout(Duration::from_secs(1)).unwrap();
    assert!(transport.read_deadline().is_some());
    conn.set_read_timeout(Duration::ZERO).unwrap();
    assert_eq!(transport.read_deadline(), None);

    let mut buf = [0u8; 16];
    let blocked =
        tokio::time::timeout(Duration::from_secs(30), conn.read(&mut buf)).await;
    assert!(blocked.is_err(), "read without a deadline should keep waiting");

    transport.push_inbound(b"200 ok\r\n".to_vec());
    let n = conn.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"200 ok\r\n");
}

#[tokio::test(start_paused = true)]
async fn test_failed_deadline_still_counts_as_activity() {
    let pool = MockPool::new(1);
    let mut conn = acquire(&pool).await.unwrap().conn;
    let transport = pool.dialed()[0].clone();
    transport.fail_deadlines(Some(io::ErrorKind::Other));

    tokio::time::advance(Duration::from_secs(90)).await;
    let now = Instant::now();
    let err = conn.set_read_timeout(Duration::from_secs(5)).unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::Other);
    assert_eq!(conn.last_used(), now);
    assert_eq!(transport.deadline_calls(), 1);
    assert!(!conn.is_stale(Duration::from_secs(60)));
}

#[tokio::test(start_paused = true)]
async fn test_write_passes_through_and_writes_recorded() {
    let pool = MockPool::new(1);
    let mut conn = acquire(&pool).await.unwrap().conn;

    conn.set_write_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(conn.write(b"ARTICLE <a@b>\r\n").await.unwrap(), 15);
    assert_eq!(pool.dialed()[0].written(), b"ARTICLE <a@b>\r\n");
    assert_eq!(
        conn.remote_addr().unwrap(),
        "192.0.2.1:1".parse::<std::net::SocketAddr>().unwrap()
    );
}

// =============================================================================
// Idle scanning
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reaper_evicts_stale_idle_connection() {
    let config = connpool::ConnConfig::new()
        .idle_timeout(Duration::from_secs(1))
        .max_lifetime(Duration::ZERO);
    let pool = MockPool::with_config(2, config);

    let conn = acquire(&pool).await.unwrap().conn;
    conn.release(&pool, None::<&io::Error>, discard::never)
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(pool.reap().await, 1);
    assert_eq!(pool.idle_connections(), 0);
    assert!(pool.dialed()[0].is_closed());

    let checkout = acquire(&pool).await.unwrap();
    assert!(checkout.is_new);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scanner_reads_usage_while_connection_in_use() {
    let pool = Arc::new(MockPool::new(1));
    let mut conn = acquire(pool.as_ref()).await.unwrap().conn;
    let id = conn.id();
    let created = conn.last_used();

    let scanner = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let mut previous = created;
            for _ in 0..5_000 {
                let snapshot = pool.usage_snapshot();
                assert_eq!(snapshot.len(), 1);
                assert_eq!(snapshot[0].0, id);
                assert!(snapshot[0].1 >= previous, "last-used moved backward");
                previous = snapshot[0].1;
                tokio::task::yield_now().await;
            }
        })
    };

    for _ in 0..5_000 {
        conn.set_read_timeout(Duration::from_secs(1)).unwrap();
        conn.set_write_timeout(Duration::ZERO).unwrap();
        tokio::task::yield_now().await;
    }

    scanner.await.unwrap();
    assert!(conn.last_used() >= created);
    conn.release(pool.as_ref(), None::<&io::Error>, discard::never)
        .await
        .unwrap();
}
