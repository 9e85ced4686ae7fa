//! Startup and pool behaviour against servers that never become usable.
//! Needs no database.

use deadpool_postgres::PoolError;
use notes_api::connection::{
    AttemptError, ConnectionError, ConnectionManager, ConnectionOptions, ConnectionState,
    Connector, PgConnector, RetryPolicy, build_pool,
};
use tokio::{net::TcpListener, task::JoinHandle, time::Instant};

use std::{net::SocketAddr, time::Duration};

/// Accepts connections and holds them open without ever answering.
async fn silent_server() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    (addr, handle)
}

fn short_timeouts() -> ConnectionOptions {
    ConnectionOptions {
        server_selection_timeout: Duration::from_millis(200),
        socket_timeout: Duration::from_millis(200),
        ..ConnectionOptions::default()
    }
}

fn two_attempts() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(50),
    }
}

#[tokio::test]
async fn silent_server_attempt_times_out() {
    let (addr, server) = silent_server().await;
    let connector = PgConnector::new(&format!("postgres://postgres@{addr}/notes"), short_timeouts())
        .unwrap();

    let started = Instant::now();
    let err = connector.connect().await.err().unwrap();

    assert!(matches!(err, AttemptError::TimedOut(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
    server.abort();
}

#[tokio::test]
async fn silent_server_exhausts_retry_budget() {
    let (addr, server) = silent_server().await;
    let connector = PgConnector::new(&format!("postgres://postgres@{addr}/notes"), short_timeouts())
        .unwrap();
    let manager = ConnectionManager::new(connector, two_attempts()).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), manager.connect())
        .await
        .expect("startup must give up within its attempt budget")
        .err()
        .unwrap();

    assert!(matches!(err, ConnectionError::Exhausted { attempts: 2, .. }));
    assert_eq!(manager.state(), ConnectionState::Terminated);
    server.abort();
}

#[tokio::test]
async fn unreachable_server_exhausts_retry_budget() {
    // Nothing listens on port 1.
    let connector =
        PgConnector::new("postgres://postgres@127.0.0.1:1/notes", short_timeouts()).unwrap();
    let manager = ConnectionManager::new(connector, two_attempts()).unwrap();

    let err = tokio::time::timeout(Duration::from_secs(5), manager.connect())
        .await
        .unwrap()
        .err()
        .unwrap();

    assert!(matches!(err, ConnectionError::Exhausted { attempts: 2, .. }));
    assert_eq!(manager.state(), ConnectionState::Terminated);
}

#[tokio::test]
async fn checkout_from_silent_server_is_bounded() {
    let (addr, server) = silent_server().await;
    let config: tokio_postgres::Config = format!("postgres://postgres@{addr}/notes")
        .parse()
        .unwrap();
    let pool = build_pool(config, &short_timeouts()).unwrap();

    let started = Instant::now();
    let err = pool.get().await.err().unwrap();

    assert!(matches!(err, PoolError::Timeout(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
    server.abort();
}
