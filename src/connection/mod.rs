//! Startup connection to the document store and its retry policy.
//!
//! The manager makes a bounded number of attempts with a fixed delay between
//! them. Once a pool is handed out, later disconnects are only logged; the
//! pool replaces closed connections and the manager never reconnects on its
//! own.

mod pool;

pub use pool::build_pool;

use async_trait::async_trait;
use deadpool_postgres::{BuildError, Pool, PoolError};
use serde::Deserialize;
use tokio::{sync::watch, time::timeout};

use std::{fmt, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteDurability {
    /// Wait until synchronous standbys have applied the commit.
    #[default]
    Majority,
    /// Wait for the local flush only.
    Local,
    /// Do not wait for the commit to be flushed.
    Unacknowledged,
}

impl WriteDurability {
    /// Value of the `synchronous_commit` setting this level maps to.
    pub const fn synchronous_commit(self) -> &'static str {
        match self {
            Self::Majority => "remote_apply",
            Self::Local => "local",
            Self::Unacknowledged => "off",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub min_pool_size: usize,
    pub max_pool_size: usize,
    pub server_selection_timeout: Duration,
    pub socket_timeout: Duration,
    pub write_durability: WriteDurability,
    pub retryable_writes: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            min_pool_size: 1,
            max_pool_size: 10,
            server_selection_timeout: Duration::from_secs(5),
            socket_timeout: Duration::from_secs(30),
            write_durability: WriteDurability::default(),
            retryable_writes: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, counting the first one.
    pub max_attempts: u32,
    /// Fixed pause between two failed attempts.
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Terminated,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid storage connection uri: {0}")]
    InvalidUri(String),

    #[error("invalid retry policy: {0}")]
    InvalidPolicy(&'static str),

    #[error("storage unreachable after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

/// Why a single [`PgConnector`] attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("failed to build storage pool: {0}")]
    Build(#[from] BuildError),

    #[error("failed to open storage connection: {0}")]
    Pool(#[from] PoolError),

    #[error("storage ping failed: {0}")]
    Ping(#[from] tokio_postgres::Error),

    #[error("storage did not answer within {0:?}")]
    TimedOut(Duration),
}

/// A single attempt at opening the store.
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: Send;
    type Error: fmt::Display + Send;

    async fn connect(&self) -> Result<Self::Handle, Self::Error>;
}

pub struct ConnectionManager<C> {
    connector: C,
    policy: RetryPolicy,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Fails when the policy allows no attempt at all.
    pub fn new(connector: C, policy: RetryPolicy) -> Result<Self, ConnectionError> {
        if policy.max_attempts == 0 {
            return Err(ConnectionError::InvalidPolicy(
                "max_attempts must be at least 1",
            ));
        }

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Ok(Self {
            connector,
            policy,
            state,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Tries to connect up to `max_attempts` times, sleeping `delay` between
    /// failures. Exhausting the budget leaves the manager `Terminated`.
    pub async fn connect(&self) -> Result<C::Handle, ConnectionError> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            self.state.send_replace(ConnectionState::Connecting { attempt });

            match self.connector.connect().await {
                Ok(handle) => {
                    self.state.send_replace(ConnectionState::Connected);
                    tracing::info!("Storage connected after {attempt} attempt(s)");
                    return Ok(handle);
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        "Storage connection attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.state.send_replace(ConnectionState::Terminated);
                    tracing::error!(
                        "Storage connection attempt {}/{} failed: {}; giving up",
                        attempt,
                        max_attempts,
                        e
                    );
                    return Err(ConnectionError::Exhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Opens a pool against a PostgreSQL uri. Each attempt, handshake and ping
/// included, is bounded by the server-selection timeout.
pub struct PgConnector {
    config: tokio_postgres::Config,
    options: ConnectionOptions,
}

impl PgConnector {
    pub fn new(uri: &str, options: ConnectionOptions) -> Result<Self, ConnectionError> {
        let mut config: tokio_postgres::Config = uri
            .parse()
            .map_err(|e: tokio_postgres::Error| ConnectionError::InvalidUri(e.to_string()))?;
        config.connect_timeout(options.server_selection_timeout);

        Ok(Self { config, options })
    }

    /// Opens `min_pool_size` connections (at least one) and pings each of them.
    async fn open(&self) -> Result<Pool, AttemptError> {
        let pool = build_pool(self.config.clone(), &self.options)?;
        let max = self.options.max_pool_size.max(1);
        let min = self.options.min_pool_size.clamp(1, max);

        let mut opened = Vec::with_capacity(min);
        for _ in 0..min {
            let client = pool.get().await?;
            client.simple_query("SELECT 1").await?;
            opened.push(client);
        }
        drop(opened);

        tracing::info!("Storage pool ready with {min} open connection(s), max {max}");

        Ok(pool)
    }
}

#[async_trait]
impl Connector for PgConnector {
    type Handle = Pool;
    type Error = AttemptError;

    async fn connect(&self) -> Result<Pool, AttemptError> {
        let limit = self.options.server_selection_timeout;

        timeout(limit, self.open())
            .await
            .map_err(|_| AttemptError::TimedOut(limit))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    struct FlakyConnector {
        failures: u32,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Connector for FlakyConnector {
        type Handle = &'static str;
        type Error = String;

        async fn connect(&self) -> Result<&'static str, String> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                Err(format!("connection refused (attempt {attempt})"))
            } else {
                Ok("pool")
            }
        }
    }

    fn manager(
        failures: u32,
        max_attempts: u32,
    ) -> (ConnectionManager<FlakyConnector>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let connector = FlakyConnector {
            failures,
            attempts: attempts.clone(),
        };
        let policy = RetryPolicy {
            max_attempts,
            delay: Duration::from_secs(2),
        };
        (ConnectionManager::new(connector, policy).unwrap(), attempts)
    }

    #[tokio::test(start_paused = true)]
    async fn connects_on_first_try_without_waiting() {
        let (manager, attempts) = manager(0, 5);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let started = tokio::time::Instant::now();
        assert_eq!(manager.connect().await.unwrap(), "pool");

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let (manager, attempts) = manager(3, 5);

        let started = tokio::time::Instant::now();
        assert_eq!(manager.connect().await.unwrap(), "pool");

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exactly_max_attempts() {
        let (manager, attempts) = manager(u32::MAX, 4);

        let started = tokio::time::Instant::now();
        let err = manager.connect().await.unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // no pause after the last failure
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(8));
        assert_eq!(manager.state(), ConnectionState::Terminated);
        match err {
            ConnectionError::Exhausted {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("attempt 4"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_budget_fails_immediately() {
        let (manager, attempts) = manager(1, 1);

        assert!(manager.connect().await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_observe_final_state() {
        let (manager, _) = manager(1, 3);
        let rx = manager.subscribe();

        manager.connect().await.unwrap();

        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }

    #[test]
    fn rejects_zero_attempt_policy() {
        let connector = FlakyConnector {
            failures: 0,
            attempts: Arc::new(AtomicU32::new(0)),
        };
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::from_secs(1),
        };

        assert!(matches!(
            ConnectionManager::new(connector, policy),
            Err(ConnectionError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn rejects_unparsable_uri() {
        let err = PgConnector::new("host=/tmp port=notaport", ConnectionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConnectionError::InvalidUri(_)));
    }

    #[test]
    fn durability_maps_to_synchronous_commit() {
        assert_eq!(WriteDurability::Majority.synchronous_commit(), "remote_apply");
        assert_eq!(WriteDurability::Local.synchronous_commit(), "local");
        assert_eq!(WriteDurability::Unacknowledged.synchronous_commit(), "off");
    }
}
