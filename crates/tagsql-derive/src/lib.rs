//! Derive macros for tagsql
//!
//! Provides `#[derive(Record)]`.

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod record;

/// Derive the `Record` trait for a struct.
///
/// # Example
///
/// ```ignore
/// use tagsql::Record;
///
/// #[derive(Record)]
/// #[record(table = "ref_game")]
/// struct Game {
///     #[tag(sql = "game_id", json = "game_id")]
///     id: i64,
///     #[tag(sql = "game_title,omitempty")]
///     title: String,
///     // no tag: never extracted
///     cached_score: f64,
/// }
/// ```
///
/// # Generated
///
/// - `TABLE: &'static str` - Table name
/// - `fn fields()` - Static field table in declaration order, one entry per
///   tagged field, each carrying its raw tags and an accessor
///
/// # Attributes
///
/// - `#[record(table = "name")]` - Specify table name (required)
/// - `#[tag(<namespace> = "name[,option...]", ...)]` - Raw tag per namespace
#[proc_macro_derive(Record, attributes(record, tag))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
