//! # tagsql
//!
//! Tag-driven SQL statements for PostgreSQL.
//!
//! ## Features
//!
//! - **Describe once**: a struct annotated with `#[tag(sql = "...")]` yields
//!   SELECT / INSERT / bulk INSERT / UPDATE / JOIN statements
//! - **Positional placeholders**: every statement uses `$1, $2, ...`
//! - **Bounded pagination**: untrusted `q` / `filters` / `sort` / `page` /
//!   `size` parameters compile against an allow-list
//! - **Deadline-bound transactions**: serializable transactions over a
//!   deadpool-postgres pool, rolled back when dropped unfinished
//!
//! ## Statement builder
//!
//! ```ignore
//! use tagsql::{Query, Record, args};
//!
//! #[derive(Record)]
//! #[record(table = "ref_game")]
//! struct Game {
//!     #[tag(sql = "game_id")]
//!     id: i64,
//!     #[tag(sql = "game_title")]
//!     title: String,
//! }
//!
//! let stmt = Query::new()
//!     .updates(&game)
//!     .where_clause("game_id = ?", args![game.id])
//!     .to_sql()?;
//! // UPDATE ref_game SET game_id = $2, game_title = $3, write_date = $1 WHERE game_id = $4
//! ```
//!
//! ## Pagination
//!
//! ```ignore
//! use tagsql::{PageParams, Pagination, compile};
//!
//! let stmt = compile(
//!     &Pagination::new("SELECT * FROM groups")
//!         .params(PageParams::parse("q=dota&sort=name&page=2&size=10"))
//!         .allow_fields(["name", "status"])
//!         .default_field("name")
//!         .alias("a"),
//! )?;
//! ```
//!
//! ## Store
//!
//! ```ignore
//! let store = tagsql::Store::connect(tagsql::StoreConfig::from_env()?)?;
//! let ctx = store.begin_context();
//! let tx = store.begin_transaction(&ctx).await?;
//! let rows = store.exec_affecting_rows(&ctx, &tx, stmt.sql(), &stmt.params_ref()).await?;
//! store.commit(&ctx, tx).await?;
//! ```

extern crate self as tagsql;

pub mod builder;
pub mod client;
pub mod context;
pub mod error;
pub mod naming;
pub mod pagination;
pub mod param;
pub mod record;
pub mod store;
pub mod types;
pub mod value;

#[cfg(feature = "pool")]
pub mod pool;

pub use builder::{Query, Statement};
pub use client::{GenericClient, TxClient};
pub use context::Deadline;
pub use error::{OrmError, OrmResult};
pub use naming::{CamelCase, NamingStrategy};
pub use pagination::{FilterOp, PageParams, Pagination, compile, field_alias};
pub use param::{Param, ParamList};
pub use record::{
    Extracted, ExtractedField, FieldDescriptor, Record, TagOptions, extract, is_valid_tag,
    parse_tag,
};
pub use store::{RETURNING_ID, StoreConfig, Tx};
pub use value::{ToValue, Value};

#[cfg(feature = "pool")]
pub use store::{PoolTx, Store};

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_tls};

#[cfg(feature = "derive")]
pub use tagsql_derive::Record;
