//! Parameter storage using Arc for clone-friendly statements.

use crate::value::Value;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// A clone-friendly parameter wrapper using Arc.
///
/// Cloning a [`Statement`](crate::Statement) shares its argument values
/// instead of copying them.
#[derive(Clone)]
pub struct Param(pub(crate) Arc<dyn ToSql + Send + Sync>);

impl Param {
    /// Create a new parameter from any ToSql value.
    pub fn new<T: ToSql + Send + Sync + 'static>(value: T) -> Self {
        Param(Arc::new(value))
    }

    /// Get a reference to the inner value as a ToSql trait object.
    pub fn as_ref(&self) -> &(dyn ToSql + Sync) {
        &*self.0 as &(dyn ToSql + Sync)
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::new(value)
    }
}

impl std::fmt::Debug for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Param").field(&self.0).finish()
    }
}

/// Positional statement arguments. `$n` refers to the n-th entry.
#[derive(Clone, Debug, Default)]
pub struct ParamList {
    params: Vec<Param>,
}

impl ParamList {
    /// Create a new empty parameter list.
    pub fn new() -> Self {
        Self { params: Vec::new() }
    }

    /// Add a parameter and return its 1-based index.
    pub fn push<T: ToSql + Send + Sync + 'static>(&mut self, value: T) -> usize {
        self.params.push(Param::new(value));
        self.params.len()
    }

    /// Add a pre-wrapped Param and return its 1-based index.
    pub fn push_param(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len()
    }

    /// Get the current parameter count.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Index the next pushed parameter will get.
    pub fn next_index(&self) -> usize {
        self.params.len() + 1
    }

    /// Get all parameters as references for tokio-postgres.
    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|p| p.as_ref()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.params.iter()
    }
}

impl FromIterator<Param> for ParamList {
    fn from_iter<I: IntoIterator<Item = Param>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

/// Build a `Vec<Param>` from a list of bindable values.
///
/// ```ignore
/// let stmt = Query::new()
///     .select(&game)
///     .where_clause("gm.game_id = ? AND gm.enabled = ?", args![507_i64, true])
///     .to_sql()?;
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Param>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Param::new($value)),+]
    };
}
