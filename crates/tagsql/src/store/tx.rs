use crate::client::{GenericClient, TxClient};
use crate::context::Deadline;
use crate::error::{OrmError, OrmResult};
use std::time::Duration;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;
use tracing::{error, warn};

pub(crate) const BEGIN: &str = "BEGIN ISOLATION LEVEL SERIALIZABLE";
pub(crate) const COMMIT: &str = "COMMIT";
pub(crate) const ROLLBACK: &str = "ROLLBACK";

/// A serializable transaction on a connection it owns.
///
/// Finish it with [`Store::commit`](super::Store::commit) or
/// [`Store::rollback`](super::Store::rollback). A transaction dropped while
/// still open is rolled back in the background.
pub struct Tx<C: TxClient> {
    conn: Option<C>,
    deadline: Deadline,
}

/// Transaction on a pooled connection.
#[cfg(feature = "pool")]
pub type PoolTx = Tx<deadpool_postgres::Client>;

impl<C: TxClient> Tx<C> {
    /// Open a transaction on `conn`.
    ///
    /// On failure the connection is discarded, since its state is unknown.
    pub async fn begin(conn: C, deadline: Deadline) -> OrmResult<Self> {
        match deadline.run(&conn, conn.batch_execute(BEGIN)).await {
            Ok(()) => Ok(Self {
                conn: Some(conn),
                deadline,
            }),
            Err(err) => {
                error!(target: "tagsql.store", error = %err, "begin transaction failed");
                conn.discard();
                Err(err)
            }
        }
    }

    /// Deadline bounding every statement of this transaction.
    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Connection the transaction runs on.
    pub fn client(&self) -> OrmResult<&C> {
        self.conn
            .as_ref()
            .ok_or_else(|| OrmError::Other("transaction already finished".to_string()))
    }

    /// Effective deadline for a statement issued under `ctx`.
    pub(crate) fn bound(&self, ctx: &Deadline) -> Deadline {
        ctx.earliest(&self.deadline)
    }

    /// `COMMIT`. On failure a `ROLLBACK` is attempted once and the commit
    /// error is returned.
    pub(crate) async fn commit(mut self, ctx: &Deadline, rollback_timeout: Duration) -> OrmResult<()> {
        let conn = self.take()?;
        let deadline = self.bound(ctx);
        match deadline.run(&conn, conn.batch_execute(COMMIT)).await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(target: "tagsql.store", error = %err, "commit failed, rolling back");
                let rollback = Deadline::after(rollback_timeout);
                if let Err(rollback_err) = rollback.run(&conn, conn.batch_execute(ROLLBACK)).await {
                    error!(target: "tagsql.store", error = %rollback_err, "rollback after failed commit failed");
                }
                conn.discard();
                Err(err)
            }
        }
    }

    /// `ROLLBACK`.
    pub(crate) async fn rollback(mut self, ctx: &Deadline) -> OrmResult<()> {
        let conn = self.take()?;
        let deadline = self.bound(ctx);
        let result = deadline.run(&conn, conn.batch_execute(ROLLBACK)).await;
        if let Err(err) = &result {
            error!(target: "tagsql.store", error = %err, "rollback failed");
            conn.discard();
        }
        result
    }

    fn take(&mut self) -> OrmResult<C> {
        self.conn
            .take()
            .ok_or_else(|| OrmError::Other("transaction already finished".to_string()))
    }
}

impl<C: TxClient> Drop for Tx<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        warn!(target: "tagsql.store", "transaction dropped without commit or rollback, rolling back");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = conn.batch_execute(ROLLBACK).await {
                        error!(target: "tagsql.store", error = %err, "background rollback failed");
                        conn.discard();
                    }
                });
            }
            Err(_) => conn.discard(),
        }
    }
}

impl<C: TxClient> GenericClient for Tx<C> {
    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<Vec<Row>> {
        let conn = self.client()?;
        self.deadline.run(conn, conn.query(sql, params)).await
    }

    async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> OrmResult<u64> {
        let conn = self.client()?;
        self.deadline.run(conn, conn.execute(sql, params)).await
    }

    fn cancel_token(&self) -> Option<tokio_postgres::CancelToken> {
        self.conn.as_ref().and_then(|c| c.cancel_token())
    }
}

impl<C: TxClient> std::fmt::Debug for Tx<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("open", &self.conn.is_some())
            .field("deadline", &self.deadline)
            .finish()
    }
}
