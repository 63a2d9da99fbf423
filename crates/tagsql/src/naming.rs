//! Table alias naming.

use heck::ToLowerCamelCase;

/// Derives the SQL alias a statement uses for a table.
pub trait NamingStrategy: Send + Sync {
    fn alias(&self, table: &str) -> String;
}

/// `ref_game` → `refGame`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CamelCase;

impl NamingStrategy for CamelCase {
    fn alias(&self, table: &str) -> String {
        table.to_lower_camel_case()
    }
}

impl<F> NamingStrategy for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn alias(&self, table: &str) -> String {
        self(table)
    }
}
