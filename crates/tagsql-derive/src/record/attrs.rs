//! Attribute parsing for the Record derive macro.
//!
//! Handles the struct-level `#[record(...)]` and field-level `#[tag(...)]`
//! attributes.

use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::{DeriveInput, Error, Expr, ExprLit, Lit, MetaNameValue, Result, Token};

/// Extract the table name from `#[record(table = "...")]`.
pub(super) fn get_table_name(input: &DeriveInput) -> Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }
        let nested = attr.parse_args::<MetaNameValue>()?;
        if !nested.path.is_ident("table") {
            return Err(Error::new_spanned(
                &nested.path,
                "unknown record attribute, expected `table`",
            ));
        }
        let table = lit_str(&nested.value)?;
        if table.trim().is_empty() {
            return Err(Error::new_spanned(&nested.value, "table must not be empty"));
        }
        return Ok(table);
    }
    Err(Error::new_spanned(
        &input.ident,
        "Record requires #[record(table = \"table_name\")] attribute",
    ))
}

/// Collect `(namespace, raw tag)` pairs from every `#[tag(...)]` on a field.
///
/// A namespace may only appear once per field.
pub(super) fn get_tags(field: &syn::Field) -> Result<Vec<(String, String)>> {
    let mut tags: Vec<(String, String)> = Vec::new();
    for attr in &field.attrs {
        if !attr.path().is_ident("tag") {
            continue;
        }
        let pairs =
            attr.parse_args_with(Punctuated::<MetaNameValue, Token![,]>::parse_terminated)?;
        for pair in pairs {
            let Some(namespace) = pair.path.get_ident() else {
                return Err(Error::new_spanned(
                    &pair.path,
                    "tag namespace must be a plain identifier",
                ));
            };
            let namespace = namespace.unraw().to_string();
            if tags.iter().any(|(ns, _)| *ns == namespace) {
                return Err(Error::new_spanned(
                    &pair.path,
                    format!("duplicate tag namespace `{namespace}`"),
                ));
            }
            tags.push((namespace, lit_str(&pair.value)?));
        }
    }
    Ok(tags)
}

fn lit_str(expr: &Expr) -> Result<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(lit), ..
        }) => Ok(lit.value()),
        _ => Err(Error::new_spanned(expr, "expected a string literal")),
    }
}
