//! Statement builder.
//!
//! A [`Query`] turns records into parameterized SQL. Column lists come from the
//! record's tagged, non-zero fields sorted by name; placeholders are `$1, $2,
//! ...` numbered by the running argument count.
//!
//! ```ignore
//! use tagsql::{Query, args};
//!
//! let stmt = Query::new()
//!     .select(&game)
//!     .join(&category, "category_id", "category_id")
//!     .where_clause("refGame.game_id = ?", args![507_i64])
//!     .to_sql()?;
//!
//! client.query(stmt.sql(), &stmt.params_ref()).await?;
//! ```
//!
//! Insert-class statements (`insert`, `inserts`) get `RETURNING id` appended
//! when finalized.

use crate::error::{OrmError, OrmResult};
use crate::naming::{CamelCase, NamingStrategy};
use crate::pagination::field_alias;
use crate::param::{Param, ParamList};
use crate::record::{Record, extract};
use crate::store::RETURNING_ID;
use crate::value::Value;
use chrono::Utc;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// Audit columns every insert carries.
const CREATE_DATE: &str = "create_date";
const WRITE_DATE: &str = "write_date";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatementKind {
    Select,
    Insert,
    Update,
}

/// The table a select was issued against.
#[derive(Debug, Clone)]
struct Scope {
    alias: String,
}

/// Buffered `WHERE` template, rendered at finalize time.
#[derive(Debug, Clone)]
struct WhereEntry {
    template: String,
    args: Vec<Param>,
}

/// Statement builder.
///
/// Methods consume and return the builder; errors from misuse are deferred and
/// reported by [`Query::to_sql`].
#[derive(Clone)]
pub struct Query {
    namespace: String,
    naming: Arc<dyn NamingStrategy>,
    kind: Option<StatementKind>,
    fragments: Vec<String>,
    params: ParamList,
    scope: Option<Scope>,
    wheres: Vec<WhereEntry>,
    build_error: Option<String>,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("namespace", &self.namespace)
            .field("kind", &self.kind)
            .field("fragments", &self.fragments)
            .field("params", &self.params.len())
            .field("wheres", &self.wheres.len())
            .field("build_error", &self.build_error)
            .finish()
    }
}

impl Query {
    /// Builder reading the `sql` tag namespace with camel-case aliases.
    pub fn new() -> Self {
        Self {
            namespace: "sql".to_string(),
            naming: Arc::new(CamelCase),
            kind: None,
            fragments: Vec::new(),
            params: ParamList::new(),
            scope: None,
            wheres: Vec::new(),
            build_error: None,
        }
    }

    /// Read field names from another tag namespace. Affects operations issued
    /// after this call.
    pub fn tag_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Replace the table alias strategy.
    pub fn naming(mut self, strategy: impl NamingStrategy + 'static) -> Self {
        self.naming = Arc::new(strategy);
        self
    }

    /// Number of arguments bound so far.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// `SELECT <alias.col, ...> FROM <table> <alias>`. Binds no arguments.
    pub fn select<R: Record>(mut self, record: &R) -> Self {
        if !self.begin(StatementKind::Select) {
            return self;
        }
        let alias = self.naming.alias(R::TABLE);
        let columns: Vec<String> = extract(&self.namespace, record)
            .sorted()
            .iter()
            .map(|f| field_alias(f.name, &alias))
            .collect();
        if columns.is_empty() {
            self.build_error
                .get_or_insert_with(|| format!("select on {} has no non-zero tagged fields", R::TABLE));
            return self;
        }

        self.fragments.push(format!(
            "SELECT {} FROM {} {}",
            columns.join(", "),
            R::TABLE,
            alias
        ));
        self.scope = Some(Scope { alias });
        self
    }

    /// `INSERT INTO <table> (<cols>, create_date, write_date) VALUES (...)`.
    pub fn insert<R: Record>(mut self, record: &R) -> Self {
        if !self.begin(StatementKind::Insert) {
            return self;
        }
        let extracted = extract(&self.namespace, record);
        let fields = extracted.sorted();

        let mut columns: Vec<&str> = fields.iter().map(|f| f.name).collect();
        columns.extend([CREATE_DATE, WRITE_DATE]);

        let mut placeholders = Vec::with_capacity(columns.len());
        for field in &fields {
            let n = self.params.push(field.value.clone());
            placeholders.push(format!("${n}"));
        }
        placeholders.extend(self.push_audit_timestamps());

        self.fragments.push(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            R::TABLE,
            columns.join(", "),
            placeholders.join(", ")
        ));
        self
    }

    /// Multi-row insert.
    ///
    /// The first record fixes the column list. A later record missing one of
    /// those columns binds NULL for it; columns only later records carry are
    /// ignored.
    pub fn inserts<R: Record>(mut self, records: &[R]) -> Self {
        let Some(first) = records.first() else {
            self.build_error
                .get_or_insert_with(|| format!("inserts into {} requires at least one record", R::TABLE));
            return self;
        };
        if !self.begin(StatementKind::Insert) {
            return self;
        }

        let names: Vec<&'static str> = extract(&self.namespace, first)
            .sorted()
            .iter()
            .map(|f| f.name)
            .collect();

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let extracted = extract(&self.namespace, record);
            let mut placeholders = Vec::with_capacity(names.len() + 2);
            for name in &names {
                let value = extracted
                    .get(name)
                    .map(|f| f.value.clone())
                    .unwrap_or(Value::Null);
                let n = self.params.push(value);
                placeholders.push(format!("${n}"));
            }
            placeholders.extend(self.push_audit_timestamps());
            rows.push(format!("({})", placeholders.join(", ")));
        }

        let mut columns = names;
        columns.extend([CREATE_DATE, WRITE_DATE]);

        self.fragments.push(format!(
            "INSERT INTO {} ({}) VALUES {}",
            R::TABLE,
            columns.join(", "),
            rows.join(", ")
        ));
        self
    }

    /// `UPDATE <table> SET <col> = $n, ..., write_date = $<reserved>`.
    ///
    /// The `write_date` timestamp is bound before any field, so on a fresh
    /// builder it is `$1`.
    pub fn updates<R: Record>(mut self, record: &R) -> Self {
        if !self.begin(StatementKind::Update) {
            return self;
        }
        let reserved = self.params.push(Utc::now());

        let mut assignments = Vec::new();
        for field in extract(&self.namespace, record).sorted() {
            let n = self.params.push(field.value.clone());
            assignments.push(format!("{} = ${n}", field.name));
        }
        assignments.push(format!("{WRITE_DATE} = ${reserved}"));

        self.fragments.push(format!(
            "UPDATE {} SET {}",
            R::TABLE,
            assignments.join(", ")
        ));
        self
    }

    /// `INNER JOIN <table> <alias> ON <alias>.<left_field> = <selected>.<right_field>`.
    ///
    /// Only valid after [`Query::select`].
    pub fn join<R: Record>(mut self, _right: &R, left_field: &str, right_field: &str) -> Self {
        let Some(scope) = &self.scope else {
            self.build_error
                .get_or_insert_with(|| format!("join on {} requires a preceding select", R::TABLE));
            return self;
        };
        let alias = self.naming.alias(R::TABLE);
        let clause = format!(
            "INNER JOIN {} {} ON {} = {}",
            R::TABLE,
            alias,
            field_alias(left_field, &alias),
            field_alias(right_field, &scope.alias)
        );
        self.fragments.push(clause);
        self
    }

    /// Buffer a `WHERE` clause. Each `?` in `template` becomes the next `$n`
    /// when the statement is finalized.
    ///
    /// Every call renders its own `WHERE` keyword; clauses are not merged with
    /// `AND`. Combine conditions in a single template instead.
    pub fn where_clause(
        mut self,
        template: impl Into<String>,
        args: impl IntoIterator<Item = Param>,
    ) -> Self {
        let template = template.into();
        let args: Vec<Param> = args.into_iter().collect();
        let placeholder_count = template.matches('?').count();
        if placeholder_count != args.len() {
            self.build_error.get_or_insert_with(|| {
                format!(
                    "where template '{}' has {} '?', but {} values provided",
                    template,
                    placeholder_count,
                    args.len()
                )
            });
            return self;
        }
        self.wheres.push(WhereEntry { template, args });
        self
    }

    /// Finalize into SQL text and arguments.
    pub fn to_sql(self) -> OrmResult<Statement> {
        if let Some(err) = self.build_error {
            return Err(OrmError::Misuse(err));
        }
        let Some(kind) = self.kind else {
            return Err(OrmError::misuse(
                "no select, insert or update was issued before to_sql",
            ));
        };

        let mut fragments = self.fragments;
        let mut params = self.params;
        for entry in self.wheres {
            let mut rendered = entry.template;
            for arg in entry.args {
                let n = params.push_param(arg);
                rendered = rendered.replacen('?', &format!("${n}"), 1);
            }
            fragments.push(format!("WHERE {rendered}"));
        }
        if kind == StatementKind::Insert {
            fragments.push(RETURNING_ID.to_string());
        }

        Ok(Statement::new(fragments.join(" "), params))
    }

    /// Start a statement, recording misuse if one was already started.
    fn begin(&mut self, kind: StatementKind) -> bool {
        if let Some(existing) = self.kind {
            self.build_error.get_or_insert_with(|| {
                format!("{kind:?} issued on a builder that already holds a {existing:?} statement")
            });
            return false;
        }
        self.kind = Some(kind);
        true
    }

    /// Bind `create_date` and `write_date` and return their placeholders.
    fn push_audit_timestamps(&mut self) -> [String; 2] {
        let now = Utc::now();
        let created = self.params.push(now);
        let written = self.params.push(now);
        [format!("${created}"), format!("${written}")]
    }
}

/// Finalized SQL text and its positional arguments.
#[derive(Clone, Debug)]
pub struct Statement {
    sql: String,
    params: ParamList,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: ParamList) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &ParamList {
        &self.params
    }

    /// Arguments in the form tokio-postgres expects.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.as_refs()
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn into_parts(self) -> (String, ParamList) {
        (self.sql, self.params)
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}
