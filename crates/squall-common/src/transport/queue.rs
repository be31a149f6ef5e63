//! A single queue backend connection.
//!
//! Each connection wraps one queue endpoint and moves through the states
//! Connecting -> Valid -> Invalid -> Connecting (on explicit reconnect).
//! Construction pings the endpoint with linearly increasing backoff; a
//! connection that exhausts its retries stays invalid and fails fast on
//! use, surfacing a typed [`TransportError`] the caller treats as
//! retryable against a different call.

use std::time::Duration;

use redis::aio::MultiplexedConnection;
use snafu::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{FlushFailedSnafu, InvalidUrlSnafu, PopFailedSnafu, TransportError};
use crate::retry::RetryPolicy;

/// Socket-level timeout applied to every queue round-trip.
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// One queue backend connection.
pub struct QueueConnection {
    url: String,
    namespace: String,
    client: redis::Client,
    conn: Option<MultiplexedConnection>,
    valid: bool,
}

impl QueueConnection {
    /// Create an unconnected handle for the given endpoint.
    ///
    /// No I/O happens here; call [`connect`](Self::connect) to establish
    /// the connection.
    pub fn new(url: &str, namespace: &str) -> Result<Self, TransportError> {
        let client = redis::Client::open(url).context(InvalidUrlSnafu { url })?;
        Ok(Self {
            url: url.to_string(),
            namespace: namespace.to_string(),
            client,
            conn: None,
            valid: false,
        })
    }

    /// Backend URL this connection wraps.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the connection can currently send data.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Mark the connection unusable until the next reconnect.
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.conn = None;
    }

    /// Establish the connection, pinging with backoff.
    ///
    /// Sleeps `attempt` steps before each try (0s, 1s, 2s, ...); after the
    /// policy's attempts are exhausted the connection is left invalid and
    /// `false` is returned. The connection still participates in selection
    /// and fails fast on use.
    pub async fn connect(&mut self, policy: &RetryPolicy, shutdown: &CancellationToken) -> bool {
        let mut attempt = 0;

        loop {
            if !policy.allows(attempt) {
                warn!(backend = %self.url, attempts = attempt, "Giving up on queue connection");
                self.invalidate();
                return false;
            }

            let delay = policy.delay_for(attempt);
            if !delay.is_zero() {
                info!(
                    backend = %self.url,
                    attempt = attempt + 1,
                    "Retrying queue connection"
                );
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!(backend = %self.url, "Shutdown requested during connect backoff");
                        self.invalidate();
                        return false;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            match self.try_ping().await {
                Ok(conn) => {
                    self.conn = Some(conn);
                    self.valid = true;
                    info!(backend = %self.url, "Queue connection established");
                    return true;
                }
                Err(e) => {
                    debug!(backend = %self.url, error = %e, "Queue ping failed");
                    attempt += 1;
                }
            }
        }
    }

    /// Re-establish the connection after a handled transport failure.
    pub async fn reconnect(&mut self, policy: &RetryPolicy, shutdown: &CancellationToken) -> bool {
        self.invalidate();
        self.connect(policy, shutdown).await
    }

    async fn try_ping(&self) -> Result<MultiplexedConnection, redis::RedisError> {
        let mut conn = tokio::time::timeout(
            SOCKET_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| timeout_error("connect timed out"))??;

        tokio::time::timeout(
            SOCKET_TIMEOUT,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| timeout_error("ping timed out"))??;

        Ok(conn)
    }

    /// Push a batch of formatted lines and flush them as one atomic
    /// pipelined operation.
    ///
    /// On failure nothing can be assumed about partial delivery; the
    /// connection invalidates itself and the caller retries against a
    /// different call.
    pub async fn push_batch(&mut self, lines: &[String]) -> Result<(), TransportError> {
        let conn = match (self.valid, self.conn.as_mut()) {
            (true, Some(conn)) => conn,
            _ => {
                return Err(TransportError::ConnectionInvalid {
                    backend: self.url.clone(),
                });
            }
        };

        let mut pipe = redis::pipe();
        for line in lines {
            pipe.rpush(&self.namespace, line).ignore();
        }

        let result =
            tokio::time::timeout(SOCKET_TIMEOUT, pipe.query_async::<()>(conn)).await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => {
                self.invalidate();
                Err(source).context(FlushFailedSnafu {
                    backend: self.url.clone(),
                })
            }
            Err(_) => {
                self.invalidate();
                Err(TransportError::CallTimeout {
                    backend: self.url.clone(),
                })
            }
        }
    }

    /// Pop one raw entry off the queue, `None` when the queue is empty.
    pub async fn pop(&mut self) -> Result<Option<String>, TransportError> {
        let conn = match (self.valid, self.conn.as_mut()) {
            (true, Some(conn)) => conn,
            _ => {
                return Err(TransportError::ConnectionInvalid {
                    backend: self.url.clone(),
                });
            }
        };

        let result = tokio::time::timeout(
            SOCKET_TIMEOUT,
            redis::cmd("RPOP")
                .arg(&self.namespace)
                .query_async::<Option<String>>(conn),
        )
        .await;

        match result {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(source)) => {
                self.invalidate();
                Err(source).context(PopFailedSnafu {
                    backend: self.url.clone(),
                })
            }
            Err(_) => {
                self.invalidate();
                Err(TransportError::CallTimeout {
                    backend: self.url.clone(),
                })
            }
        }
    }
}

fn timeout_error(message: &str) -> redis::RedisError {
    std::io::Error::new(std::io::ErrorKind::TimedOut, message.to_string()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_connection_starts_invalid() {
        let conn = QueueConnection::new("redis://127.0.0.1:6399", "test_ns").unwrap();
        assert!(!conn.is_valid());
        assert_eq!(conn.url(), "redis://127.0.0.1:6399");
    }

    #[tokio::test]
    async fn push_on_invalid_connection_fails_fast() {
        let mut conn = QueueConnection::new("redis://127.0.0.1:6399", "test_ns").unwrap();
        let err = conn
            .push_batch(&["line".to_string()])
            .await
            .expect_err("invalid connection must fail");
        assert!(matches!(err, TransportError::ConnectionInvalid { .. }));
    }

    #[tokio::test]
    async fn pop_on_invalid_connection_fails_fast() {
        let mut conn = QueueConnection::new("redis://127.0.0.1:6399", "test_ns").unwrap();
        let err = conn.pop().await.expect_err("invalid connection must fail");
        assert!(matches!(err, TransportError::ConnectionInvalid { .. }));
    }

    #[tokio::test]
    async fn connect_gives_up_after_policy_exhausted() {
        // Unroutable port; a zero-attempt policy must give up immediately
        // without sleeping.
        let mut conn = QueueConnection::new("redis://127.0.0.1:6399", "test_ns").unwrap();
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff: crate::retry::Backoff::Linear {
                step: Duration::from_secs(1),
            },
        };
        let shutdown = CancellationToken::new();
        assert!(!conn.connect(&policy, &shutdown).await);
        assert!(!conn.is_valid());
    }
}
