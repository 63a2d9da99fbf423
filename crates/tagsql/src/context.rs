//! Deadlines for store operations.

use crate::client::GenericClient;
use crate::error::{OrmError, OrmResult};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// A point in time after which store operations give up.
///
/// Created by [`Store::begin_context`](crate::Store::begin_context) and
/// narrowed by [`Deadline::child`] when a transaction starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
    timeout: Duration,
}

/// Stand-in for deadlines too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `timeout` from now, clamped to [`FAR_FUTURE`].
fn expiry(timeout: Duration) -> Instant {
    Instant::now() + timeout.min(FAR_FUTURE)
}

impl Deadline {
    /// Deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: expiry(timeout),
            timeout,
        }
    }

    /// The earlier of this deadline and `timeout` from now.
    pub fn child(&self, timeout: Duration) -> Self {
        let own = expiry(timeout);
        if own < self.at {
            Self { at: own, timeout }
        } else {
            *self
        }
    }

    /// Whichever of the two expires first.
    pub fn earliest(&self, other: &Deadline) -> Self {
        if other.at < self.at { *other } else { *self }
    }

    /// Time left, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Timeout this deadline was derived from.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `future` until it finishes or the deadline passes.
    ///
    /// On expiry the query running on `client` is cancelled server-side (best
    /// effort) and `OrmError::Timeout` is returned.
    pub async fn run<C, T, F>(&self, client: &C, future: F) -> OrmResult<T>
    where
        C: GenericClient + ?Sized,
        F: Future<Output = OrmResult<T>>,
    {
        tokio::pin!(future);
        tokio::select! {
            result = &mut future => result,
            _ = tokio::time::sleep_until(self.at) => {
                if let Some(cancel_token) = client.cancel_token() {
                    tokio::spawn(async move {
                        let _ = cancel_token.cancel_query(tokio_postgres::NoTls).await;
                    });
                }
                Err(OrmError::Timeout(self.timeout))
            }
        }
    }

    /// Like [`Deadline::run`] for work that is not bound to one connection.
    pub async fn bound<T, F>(&self, future: F) -> OrmResult<T>
    where
        F: Future<Output = OrmResult<T>>,
    {
        tokio::time::timeout_at(self.at, future)
            .await
            .map_err(|_| OrmError::Timeout(self.timeout))?
    }
}
