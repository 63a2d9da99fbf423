//! Transactional store.
//!
//! [`Store`] wraps a deadpool-postgres pool with deadline-bound query, exec and
//! transaction primitives:
//!
//! ```ignore
//! use tagsql::{Query, Store, StoreConfig};
//!
//! let store = Store::connect(StoreConfig::from_env()?)?;
//! let ctx = store.begin_context();
//!
//! let stmt = Query::new().insert(&game).to_sql()?;
//! let tx = store.begin_transaction(&ctx).await?;
//! let id: i64 = store
//!     .exec_with_returned_id(&ctx, &tx, stmt.sql(), &stmt.params_ref())
//!     .await?;
//! store.commit(&ctx, tx).await?;
//! ```
//!
//! A query that finds nothing is not an error: `query` and `query_row` log a
//! warning and return `Ok(())`, leaving the caller's output untouched.

mod config;
mod tx;

pub use config::StoreConfig;
#[cfg(feature = "pool")]
pub use tx::PoolTx;
pub use tx::Tx;

use crate::client::{GenericClient, TxClient};
use crate::context::Deadline;
use crate::error::{OrmError, OrmResult};
use tokio_postgres::Row;
use tokio_postgres::types::{FromSqlOwned, ToSql};
use tracing::{debug, error, warn};

/// Marker the statement passed to `exec_with_returned_id` must contain.
pub const RETURNING_ID: &str = "RETURNING id";

#[cfg(feature = "pool")]
pub use pooled::Store;

#[cfg(feature = "pool")]
mod pooled {
    use super::*;
    use crate::pool::create_pool;
    use deadpool_postgres::Pool;
    use std::future::Future;

    /// Pooled, deadline-aware executor. Cheap to clone.
    #[derive(Clone)]
    pub struct Store {
        pool: Pool,
        config: StoreConfig,
    }

    impl std::fmt::Debug for Store {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("Store")
                .field("status", &self.pool.status())
                .field("timeout", &self.config.timeout)
                .field("retry_count", &self.config.retry_count)
                .finish()
        }
    }

    impl Store {
        /// Build the pool described by `config`. Connections open lazily.
        pub fn connect(config: StoreConfig) -> OrmResult<Self> {
            let pool = create_pool(&config)?;
            Ok(Self::from_pool(pool, config))
        }

        pub fn from_pool(pool: Pool, config: StoreConfig) -> Self {
            Self { pool, config }
        }

        pub fn pool(&self) -> &Pool {
            &self.pool
        }

        pub fn config(&self) -> &StoreConfig {
            &self.config
        }

        /// A fresh deadline using the configured timeout.
        pub fn begin_context(&self) -> Deadline {
            Deadline::after(self.config.timeout)
        }

        /// Check out a connection, retrying up to `retry_count` extra times.
        pub async fn acquire(&self, ctx: &Deadline) -> OrmResult<deadpool_postgres::Client> {
            let mut attempt = 0;
            loop {
                let checkout = ctx
                    .bound(async { Ok::<_, OrmError>(self.pool.get().await?) })
                    .await;
                match checkout {
                    Ok(client) => return Ok(client),
                    Err(err) if attempt < self.config.retry_count && !err.is_timeout() => {
                        attempt += 1;
                        warn!(
                            target: "tagsql.store",
                            error = %err,
                            attempt,
                            retry_count = self.config.retry_count,
                            "connection checkout failed, retrying"
                        );
                    }
                    Err(err) => {
                        error!(target: "tagsql.store", error = %err, "connection checkout failed");
                        return Err(err);
                    }
                }
            }
        }

        /// Open a serializable transaction bounded by the earlier of `ctx` and
        /// the configured timeout.
        pub async fn begin_transaction(&self, ctx: &Deadline) -> OrmResult<PoolTx> {
            let deadline = ctx.child(self.config.timeout);
            let conn = self.acquire(&deadline).await?;
            Tx::begin(conn, deadline).await
        }

        /// Run `sql` and hand its first row to `scan`.
        pub async fn query_row<F>(
            &self,
            ctx: &Deadline,
            scan: F,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> OrmResult<()>
        where
            F: FnOnce(&Row) -> OrmResult<()>,
        {
            let conn = self.acquire(ctx).await?;
            query_row_on(&conn, ctx, scan, sql, params).await
        }

        /// Run `sql` and hand each row to `scan`.
        pub async fn query<F>(
            &self,
            ctx: &Deadline,
            scan: F,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> OrmResult<()>
        where
            F: FnMut(&Row) -> OrmResult<()>,
        {
            let conn = self.acquire(ctx).await?;
            query_on(&conn, ctx, scan, sql, params).await
        }

        /// Execute `sql` outside any transaction and return the affected rows.
        pub async fn exec(
            &self,
            ctx: &Deadline,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> OrmResult<u64> {
            let conn = self.acquire(ctx).await?;
            execute_on(&conn, ctx, sql, params).await
        }

        /// Execute an insert inside `tx` and decode the `id` it returns.
        ///
        /// `sql` must contain `RETURNING id`; otherwise
        /// [`OrmError::MissingReturningClause`] is returned and nothing is sent.
        pub async fn exec_with_returned_id<T, C>(
            &self,
            ctx: &Deadline,
            tx: &Tx<C>,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> OrmResult<T>
        where
            T: FromSqlOwned,
            C: TxClient,
        {
            returned_id_on(ctx, tx, sql, params).await
        }

        /// Execute `sql` inside `tx` and return the affected rows.
        pub async fn exec_affecting_rows<C: TxClient>(
            &self,
            ctx: &Deadline,
            tx: &Tx<C>,
            sql: &str,
            params: &[&(dyn ToSql + Sync)],
        ) -> OrmResult<u64> {
            execute_on(tx.client()?, &tx.bound(ctx), sql, params).await
        }

        /// Commit `tx`. If the commit fails a rollback is attempted once and
        /// the commit error is returned regardless of the rollback outcome.
        pub async fn commit<C: TxClient>(&self, ctx: &Deadline, tx: Tx<C>) -> OrmResult<()> {
            tx.commit(ctx, self.config.timeout).await
        }

        pub async fn rollback<C: TxClient>(&self, ctx: &Deadline, tx: Tx<C>) -> OrmResult<()> {
            tx.rollback(ctx).await
        }

        /// Open a transaction and pass it to `f`.
        ///
        /// Nothing is committed on `f`'s behalf: `f` must call
        /// [`Store::commit`]. A transaction `f` drops unfinished is rolled
        /// back.
        pub async fn with_transaction<T, F, Fut>(&self, ctx: &Deadline, f: F) -> OrmResult<T>
        where
            F: FnOnce(PoolTx) -> Fut,
            Fut: Future<Output = OrmResult<T>>,
        {
            let tx = self.begin_transaction(ctx).await?;
            f(tx).await
        }

        /// Close the pool. Checked-out connections close when returned.
        pub fn close(&self) {
            self.pool.close();
        }
    }
}

pub(crate) async fn query_row_on<C, F>(
    client: &C,
    ctx: &Deadline,
    scan: F,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> OrmResult<()>
where
    C: GenericClient,
    F: FnOnce(&Row) -> OrmResult<()>,
{
    log_execution(sql, params.len());
    let row = ctx
        .run(client, client.query_opt(sql, params))
        .await
        .inspect_err(|err| log_failure("query row failed", err, sql, params.len()))?;

    let Some(row) = row else {
        log_not_found(sql, params.len());
        return Ok(());
    };
    match scan(&row) {
        Err(err) if err.is_not_found() => {
            log_not_found(sql, params.len());
            Ok(())
        }
        Err(err) => {
            log_failure("scan row failed", &err, sql, params.len());
            Err(err)
        }
        Ok(()) => Ok(()),
    }
}

pub(crate) async fn query_on<C, F>(
    client: &C,
    ctx: &Deadline,
    mut scan: F,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> OrmResult<()>
where
    C: GenericClient,
    F: FnMut(&Row) -> OrmResult<()>,
{
    log_execution(sql, params.len());
    let rows = ctx
        .run(client, client.query(sql, params))
        .await
        .inspect_err(|err| log_failure("query failed", err, sql, params.len()))?;

    if rows.is_empty() {
        log_not_found(sql, params.len());
        return Ok(());
    }
    for row in &rows {
        match scan(row) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                log_not_found(sql, params.len());
                return Ok(());
            }
            Err(err) => {
                log_failure("scan rows failed", &err, sql, params.len());
                return Err(err);
            }
        }
    }
    Ok(())
}

pub(crate) async fn execute_on<C: GenericClient>(
    client: &C,
    ctx: &Deadline,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> OrmResult<u64> {
    log_execution(sql, params.len());
    ctx.run(client, client.execute(sql, params))
        .await
        .inspect_err(|err| log_failure("exec failed", err, sql, params.len()))
}

pub(crate) async fn returned_id_on<T, C>(
    ctx: &Deadline,
    tx: &Tx<C>,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> OrmResult<T>
where
    T: FromSqlOwned,
    C: TxClient,
{
    if !sql.contains(RETURNING_ID) {
        let err = OrmError::MissingReturningClause;
        log_failure("exec with returned id failed", &err, sql, params.len());
        return Err(err);
    }
    let conn = tx.client()?;
    let deadline = tx.bound(ctx);

    log_execution(sql, params.len());
    let row = deadline
        .run(conn, conn.query_one(sql, params))
        .await
        .inspect_err(|err| log_failure("exec with returned id failed", err, sql, params.len()))?;
    row.try_get::<_, T>(0)
        .map_err(|e| OrmError::decode("id", e.to_string()))
}

fn log_execution(sql: &str, param_count: usize) {
    debug!(target: "tagsql.sql", sql, param_count, "executing");
}

fn log_not_found(sql: &str, param_count: usize) {
    warn!(target: "tagsql.sql", sql, param_count, "result not found");
}

fn log_failure(message: &str, err: &OrmError, sql: &str, param_count: usize) {
    error!(target: "tagsql.sql", error = %err, sql, param_count, "{message}");
}
