//! Client traits the store executes through.
//!
//! [`GenericClient`] unifies plain and pooled connections with the store's own
//! [`Tx`](crate::Tx). [`TxClient`] is the subset of clients that own a
//! connection and can drive a transaction with explicit `BEGIN` / `COMMIT` /
//! `ROLLBACK`.

use crate::error::{OrmError, OrmResult};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

/// A trait that unifies database clients and transactions.
///
/// Statements are sent with the extended protocol, so the driver prepares an
/// unnamed statement for every call and closes it when the call finishes.
pub trait GenericClient: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<Vec<Row>>> + Send;

    /// Execute a query and return the **first** row.
    ///
    /// Returns `OrmError::NotFound` if no rows are returned.
    fn query_one(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<Row>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            rows.into_iter()
                .next()
                .ok_or_else(|| OrmError::not_found("Expected one row, got none"))
        }
    }

    /// Execute a query and return the first row, if any.
    fn query_opt(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<Option<Row>>> + Send {
        async move {
            let rows = self.query(sql, params).await?;
            Ok(rows.into_iter().next())
        }
    }

    /// Execute a statement and return the affected row count.
    fn execute(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> impl std::future::Future<Output = OrmResult<u64>> + Send;

    /// Return a cancellation token for the underlying connection, if supported.
    ///
    /// Used for best-effort server-side cancellation when a deadline expires.
    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        None
    }
}

/// A client that owns its connection and can run transaction control
/// statements on it.
pub trait TxClient: GenericClient + 'static {
    /// Run one or more statements without parameters (`BEGIN ...`, `COMMIT`).
    fn batch_execute(&self, sql: &str) -> impl std::future::Future<Output = OrmResult<()>> + Send;

    /// Give up a connection whose transaction state is unknown.
    ///
    /// The default simply drops it. Pooled clients detach themselves so the
    /// connection is closed instead of being recycled.
    fn discard(self)
    where
        Self: Sized,
    {
    }
}

impl GenericClient for tokio_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        Ok(tokio_postgres::Client::query(self, sql, params).await?)
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        Ok(tokio_postgres::Client::execute(self, sql, params).await?)
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        Some(tokio_postgres::Client::cancel_token(self))
    }
}

impl TxClient for tokio_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        Ok(tokio_postgres::Client::batch_execute(self, sql).await?)
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::ClientWrapper {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        GenericClient::cancel_token(&**self)
    }
}

#[cfg(feature = "pool")]
impl GenericClient for deadpool_postgres::Client {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        // Delegate to the deref target (ClientWrapper / tokio_postgres::Client).
        GenericClient::query(&**self, sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        GenericClient::execute(&**self, sql, params).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        GenericClient::cancel_token(&**self)
    }
}

#[cfg(feature = "pool")]
impl TxClient for deadpool_postgres::Client {
    async fn batch_execute(&self, sql: &str) -> OrmResult<()> {
        Ok(tokio_postgres::Client::batch_execute(&***self, sql).await?)
    }

    fn discard(self) {
        drop(deadpool_postgres::Object::take(self));
    }
}
