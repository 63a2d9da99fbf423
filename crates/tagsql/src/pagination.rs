//! Pagination compiler.
//!
//! Rewrites a base query into a paged, filtered and sorted derived-table
//! query driven by untrusted request parameters:
//!
//! ```text
//! q=<text>                   free-text ILIKE on the default field
//! filters[<field>:<op>]=<v>  one predicate per allow-listed field
//! sort=<f1>,-<f2>            ORDER BY, `-` selects DESC
//! page=<n>&size=<n>          LIMIT / OFFSET
//! fields=<...>               reserved, carried but not consumed
//! ```
//!
//! Only allow-listed field names ever reach the SQL text; every request value
//! is bound as a positional argument.
//!
//! ```ignore
//! use tagsql::pagination::{PageParams, Pagination, compile};
//!
//! let params = PageParams::parse("sort=name&filters[category:eq]=RG");
//! let stmt = compile(
//!     &Pagination::new("SELECT group_id, name, category FROM groups g")
//!         .params(params)
//!         .allow_fields(["group_id", "name", "category"])
//!         .default_field("name")
//!         .alias("g"),
//! )?;
//! ```

use crate::builder::Statement;
use crate::error::{OrmError, OrmResult};
use crate::param::ParamList;
use crate::value::Value;
use std::collections::BTreeMap;

/// Page size used when the request carries none.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// `<alias>.<value>`, or `value` unchanged when `alias` is empty.
pub fn field_alias(value: &str, alias: &str) -> String {
    if alias.is_empty() {
        value.to_string()
    } else {
        format!("{alias}.{value}")
    }
}

/// Multi-value request parameter map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageParams {
    values: BTreeMap<String, Vec<String>>,
}

impl PageParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` query string.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        Self::from_pairs(url::form_urlencoded::parse(query.as_bytes()))
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = Self::new();
        for (key, value) in pairs {
            params.append(key, value);
        }
        params
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.values.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Filter operator of a `filters[<field>:<op>]` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Ilike,
}

impl FilterOp {
    /// Operator for a request name, `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "like" => Some(Self::Like),
            "ilike" => Some(Self::Ilike),
            _ => None,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Like => "LIKE",
            Self::Ilike => "ILIKE",
        }
    }
}

/// A pagination request against a base query.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    query: String,
    params: PageParams,
    allow_fields: Vec<String>,
    default_field: String,
    alias: String,
    max_size: Option<u64>,
}

impl Pagination {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn params(mut self, params: PageParams) -> Self {
        self.params = params;
        self
    }

    /// Field names allowed in filters, sorting and free-text search.
    pub fn allow_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Field the `q` parameter searches.
    pub fn default_field(mut self, field: impl Into<String>) -> Self {
        self.default_field = field.into();
        self
    }

    /// Alias of the derived table.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Cap for the requested page size.
    pub fn max_size(mut self, max: u64) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Requested page, 1-based.
    pub fn page(&self) -> u64 {
        positive(self.params.get("page")).unwrap_or(1)
    }

    /// Requested page size after defaults and the cap are applied.
    pub fn size(&self) -> u64 {
        let size = positive(self.params.get("size")).unwrap_or(DEFAULT_PAGE_SIZE);
        match self.max_size {
            Some(max) => size.min(max.max(1)),
            None => size,
        }
    }

    pub fn request(&self) -> &PageParams {
        &self.params
    }

    fn is_allowed(&self, field: &str) -> bool {
        self.allow_fields.iter().any(|f| f == field)
    }
}

fn positive(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|n| *n >= 1)
}

/// Compile `pagination` into a derived-table query.
///
/// Unknown filter operators, fields outside the allow-list and unparsable
/// page values are ignored. Names that are interpolated into the SQL text
/// (alias, default field, allow-list) must be plain identifiers.
pub fn compile(pagination: &Pagination) -> OrmResult<Statement> {
    if pagination.query.trim().is_empty() {
        return Err(OrmError::validation("pagination: base query is empty"));
    }
    check_ident("alias", &pagination.alias)?;
    if !pagination.default_field.is_empty() {
        check_ident("default field", &pagination.default_field)?;
    }
    for field in &pagination.allow_fields {
        check_ident("allowed field", field)?;
    }

    let alias = pagination.alias.as_str();
    let mut params = ParamList::new();
    let mut predicates = Vec::new();

    if let Some(q) = pagination.params.get("q").filter(|q| !q.is_empty())
        && pagination.is_allowed(&pagination.default_field)
    {
        let n = params.push(Value::Text(q.to_string()));
        predicates.push(format!(
            "( {} ILIKE '%' || ${n} || '%' )",
            field_alias(&pagination.default_field, alias)
        ));
    }

    for (field, op, value) in filters(pagination) {
        let n = params.push(Value::Text(value.to_string()));
        predicates.push(format!(
            "{} {} ${n}",
            field_alias(field, alias),
            op.as_sql()
        ));
    }

    let mut sql = format!("SELECT * FROM ({}) AS {}", pagination.query, alias);
    if !predicates.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&predicates.join(" AND "));
    }

    let order = sort_fields(pagination);
    if !order.is_empty() {
        let order: Vec<String> = order
            .iter()
            .map(|(field, desc)| {
                format!(
                    "{} {}",
                    field_alias(field, alias),
                    if *desc { "DESC" } else { "ASC" }
                )
            })
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    let size = pagination.size();
    let offset = (pagination.page() - 1).saturating_mul(size);
    sql.push_str(&format!(" LIMIT {size} OFFSET {offset}"));

    Ok(Statement::new(sql, params))
}

/// Recognized filters ordered by field, then operator.
fn filters(pagination: &Pagination) -> Vec<(&str, FilterOp, &str)> {
    let mut out = Vec::new();
    for (key, values) in pagination.params.iter() {
        let Some(inner) = key
            .strip_prefix("filters[")
            .and_then(|k| k.strip_suffix(']'))
        else {
            continue;
        };
        let Some((field, op)) = inner.split_once(':') else {
            continue;
        };
        let (Some(op), Some(value)) = (FilterOp::from_name(op), values.first()) else {
            continue;
        };
        if !pagination.is_allowed(field) {
            continue;
        }
        out.push((field, op, value.as_str()));
    }
    out.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
    out
}

/// Allow-listed sort fields with their direction (`true` for descending).
fn sort_fields(pagination: &Pagination) -> Vec<(&str, bool)> {
    let Some(sort) = pagination.params.get("sort") else {
        return Vec::new();
    };
    sort.split(',')
        .map(str::trim)
        .filter_map(|name| match name.strip_prefix('-') {
            Some(field) => Some((field, true)),
            None if !name.is_empty() => Some((name, false)),
            None => None,
        })
        .filter(|(field, _)| pagination.is_allowed(field))
        .collect()
}

fn check_ident(what: &str, name: &str) -> OrmResult<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(OrmError::validation(format!("pagination: {what} is empty")));
    };
    let first_ok = first == '_' || first.is_ascii_alphabetic();
    if !first_ok || !chars.all(|c| c == '_' || c.is_ascii_alphanumeric()) {
        return Err(OrmError::validation(format!(
            "pagination: invalid {what} '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUPS: &str =
        "SELECT group_id, name, parent_id, category, description, activated FROM groups g";

    fn groups(params: PageParams) -> Pagination {
        Pagination::new(GROUPS)
            .params(params)
            .allow_fields(["group_id", "category", "name", "activated"])
            .default_field("name")
            .alias("g")
    }

    #[test]
    fn test_field_alias() {
        assert_eq!(field_alias("value", "g"), "g.value");
        assert_eq!(field_alias("value", ""), "value");
    }

    #[test]
    fn test_full_request() {
        let params = PageParams::from_pairs([
            ("q", "dota"),
            ("sort", "name,category"),
            ("fields", "name"),
            ("filters[activated:eq]", "true"),
            ("filters[category:eq]", "RG"),
            ("filters[group_id:eq]", "66"),
        ]);
        let stmt = compile(&groups(params)).unwrap();
        assert_eq!(
            stmt.sql(),
            format!(
                "SELECT * FROM ({GROUPS}) AS g WHERE ( g.name ILIKE '%' || $1 || '%' ) \
                 AND g.activated = $2 AND g.category = $3 AND g.group_id = $4 \
                 ORDER BY g.name ASC, g.category ASC LIMIT 20 OFFSET 0"
            )
        );
        assert_eq!(stmt.len(), 4);
    }

    #[test]
    fn test_empty_q_is_skipped() {
        let params = PageParams::from_pairs([("q", ""), ("filters[category:eq]", "RG")]);
        let stmt = compile(&groups(params)).unwrap();
        assert!(stmt.sql().contains("WHERE g.category = $1 LIMIT"));
        assert_eq!(stmt.len(), 1);
    }

    #[test]
    fn test_filter_outside_allow_list_is_dropped() {
        let params = PageParams::parse("filters%5Bcategory%3Aeq%5D=RG&sort=name&filters[secret:eq]=x");
        let paging = Pagination::new(GROUPS)
            .params(params)
            .allow_fields(["name", "category"])
            .alias("g");
        let stmt = compile(&paging).unwrap();
        assert_eq!(
            stmt.sql(),
            format!(
                "SELECT * FROM ({GROUPS}) AS g WHERE g.category = $1 \
                 ORDER BY g.name ASC LIMIT 20 OFFSET 0"
            )
        );
        assert_eq!(stmt.len(), 1);
    }

    #[test]
    fn test_unknown_operator_is_dropped() {
        let params = PageParams::from_pairs([
            ("filters[name:regex]", "^a"),
            ("filters[name]", "a"),
            ("filters[group_id:gte]", "10"),
        ]);
        let stmt = compile(&groups(params)).unwrap();
        assert!(stmt.sql().contains("WHERE g.group_id >= $1 LIMIT"));
        assert_eq!(stmt.len(), 1);
    }

    #[test]
    fn test_operator_table() {
        for (name, sql) in [
            ("eq", "="),
            ("ne", "<>"),
            ("gt", ">"),
            ("gte", ">="),
            ("lt", "<"),
            ("lte", "<="),
            ("like", "LIKE"),
            ("ilike", "ILIKE"),
        ] {
            assert_eq!(FilterOp::from_name(name).unwrap().as_sql(), sql);
        }
        assert_eq!(FilterOp::from_name("EQ"), None);
    }

    #[test]
    fn test_filters_on_same_field_order_by_operator() {
        let params = PageParams::from_pairs([
            ("filters[group_id:lte]", "20"),
            ("filters[group_id:gte]", "10"),
        ]);
        let stmt = compile(&groups(params)).unwrap();
        assert!(
            stmt.sql()
                .contains("WHERE g.group_id >= $1 AND g.group_id <= $2")
        );
    }

    #[test]
    fn test_sort_descending_and_unknown_fields() {
        let params = PageParams::from_pairs([("sort", "-name, secret ,category,")]);
        let stmt = compile(&groups(params)).unwrap();
        assert!(
            stmt.sql()
                .ends_with("ORDER BY g.name DESC, g.category ASC LIMIT 20 OFFSET 0")
        );
    }

    #[test]
    fn test_page_and_size() {
        let params = PageParams::from_pairs([("page", "3"), ("size", "50")]);
        let stmt = compile(&groups(params)).unwrap();
        assert!(stmt.sql().ends_with("LIMIT 50 OFFSET 100"));

        let params = PageParams::from_pairs([("page", "abc"), ("size", "0")]);
        let stmt = compile(&groups(params)).unwrap();
        assert!(stmt.sql().ends_with("LIMIT 20 OFFSET 0"));

        let params = PageParams::from_pairs([("size", "1000")]);
        let paging = groups(params).max_size(100);
        assert_eq!(paging.size(), 100);
        assert_eq!(paging.page(), 1);
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let err = compile(&groups(PageParams::new()).alias("g; DROP")).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));

        let err = compile(&groups(PageParams::new()).allow_fields(["name", "1abc"])).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));

        let err = compile(&groups(PageParams::new()).default_field("na me")).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));

        let err = compile(&Pagination::new("  ").alias("g")).unwrap_err();
        assert!(matches!(err, OrmError::Validation(_)));
    }

    #[test]
    fn test_parse_query_string() {
        let params = PageParams::parse("?q=hello+world&sort=a&sort=b");
        assert_eq!(params.get("q"), Some("hello world"));
        assert_eq!(params.get_all("sort"), ["a".to_string(), "b".to_string()]);
        assert_eq!(params.get("missing"), None);
    }
}
