//! Startup connection retry for the database backend.

use crate::error::{Result, StorageError};
use sea_orm::DbErr;
use std::future::Future;
use tokio::time::{sleep, timeout, Duration};

/// Fixed backoff schedule with a per-attempt timeout that grows with the
/// attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Pause before each retry; `delays.len() + 1` attempts in total.
    pub delays: Vec<Duration>,
    /// Timeout of the first attempt; attempt `i` gets `base_timeout * (i + 1)`.
    pub base_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(3),
                Duration::from_secs(5),
            ],
            base_timeout: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> usize {
        self.delays.len() + 1
    }

    pub fn timeout_for(&self, attempt: usize) -> Duration {
        self.base_timeout * (attempt as u32 + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: usize },
    Connected,
    Failed,
}

fn transition(from: ConnectionState, to: ConnectionState) -> ConnectionState {
    tracing::debug!(from = ?from, to = ?to, "Database connection state changed");
    to
}

/// Runs `connect` until it succeeds or the policy is exhausted.
///
/// `connect` receives the zero-based attempt number and that attempt's
/// timeout; the timeout is also enforced around the returned future.
pub async fn connect_with_retry<T, F, Fut>(policy: &RetryPolicy, mut connect: F) -> Result<T>
where
    F: FnMut(usize, Duration) -> Fut,
    Fut: Future<Output = std::result::Result<T, DbErr>>,
{
    let mut state = ConnectionState::Disconnected;
    let mut last_err = DbErr::Custom("no connection attempt was made".to_string());

    for attempt in 0..policy.attempts() {
        if let Some(delay) = attempt.checked_sub(1).and_then(|i| policy.delays.get(i)) {
            tracing::warn!(
                attempt,
                delay_secs = delay.as_secs_f64(),
                "Retrying database connection"
            );
            sleep(*delay).await;
        }

        state = transition(state, ConnectionState::Connecting { attempt });
        let limit = policy.timeout_for(attempt);
        let outcome = match timeout(limit, connect(attempt, limit)).await {
            Ok(result) => result,
            Err(_) => Err(DbErr::Custom(format!(
                "connection attempt timed out after {}ms",
                limit.as_millis()
            ))),
        };

        match outcome {
            Ok(conn) => {
                transition(state, ConnectionState::Connected);
                tracing::info!(attempt, "Connected to database");
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Database connection attempt failed");
                last_err = e;
                state = transition(state, ConnectionState::Disconnected);
            }
        }
    }

    transition(state, ConnectionState::Failed);
    tracing::error!(attempts = policy.attempts(), "Giving up on database connection");
    Err(StorageError::ConnectFailed {
        attempts: policy.attempts(),
        source: last_err,
    })
}
