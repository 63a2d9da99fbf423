//! Nullable scalar wrappers.
//!
//! A [`Nullable<T>`] pairs a payload with a validity flag. Invalid values are
//! skipped by the field extractor, bind as SQL `NULL`, and serialize to `null`
//! (or `0` for numeric payloads) in JSON.

use crate::value::{ToValue, Value};
use bytes::BytesMut;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type};

/// A scalar that may be absent.
///
/// # Example
///
/// ```ignore
/// use tagsql::types::{NullString, Nullable};
///
/// let description: NullString = Nullable::new("Froze".to_string());
/// let missing: NullString = Nullable::null();
/// assert!(description.is_valid());
/// assert!(!missing.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Nullable<T> {
    inner: Option<T>,
}

/// Nullable text.
pub type NullString = Nullable<String>;
/// Nullable 64-bit integer.
pub type NullInt64 = Nullable<i64>;
/// Nullable boolean.
pub type NullBool = Nullable<bool>;
/// Nullable double.
pub type NullFloat64 = Nullable<f64>;
/// Nullable UTC timestamp.
pub type NullTime = Nullable<DateTime<Utc>>;

impl<T> Nullable<T> {
    /// A valid value.
    pub fn new(value: T) -> Self {
        Self { inner: Some(value) }
    }

    /// An invalid (NULL) value.
    pub fn null() -> Self {
        Self { inner: None }
    }

    /// Whether a payload is present.
    pub fn is_valid(&self) -> bool {
        self.inner.is_some()
    }

    /// Borrow the payload, if valid.
    pub fn get(&self) -> Option<&T> {
        self.inner.as_ref()
    }

    /// Unwrap into a plain `Option`.
    pub fn into_option(self) -> Option<T> {
        self.inner
    }
}

impl<T> Default for Nullable<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for Nullable<T> {
    fn from(inner: Option<T>) -> Self {
        Self { inner }
    }
}

impl<T> From<Nullable<T>> for Option<T> {
    fn from(value: Nullable<T>) -> Self {
        value.inner
    }
}

impl<T: ToValue> ToValue for Nullable<T> {
    fn to_value(&self) -> Value {
        match &self.inner {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    /// Validity decides, not the payload: `Nullable::new(0)` is extracted.
    fn is_zero(&self) -> bool {
        self.inner.is_none()
    }
}

// ─── Postgres ───────────────────────────────────────────────────────────────

impl<T: ToSql> ToSql for Nullable<T> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match &self.inner {
            Some(v) => v.to_sql(ty, out),
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(ty: &Type) -> bool {
        T::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

impl<'a, T: FromSql<'a>> FromSql<'a> for Nullable<T> {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, Box<dyn Error + Sync + Send>> {
        T::from_sql(ty, raw).map(Nullable::new)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn Error + Sync + Send>> {
        Ok(Nullable::null())
    }

    fn accepts(ty: &Type) -> bool {
        T::accepts(ty)
    }
}

// ─── JSON ───────────────────────────────────────────────────────────────────

/// Payload types with a JSON representation for both the valid and the
/// invalid state.
pub trait NullableScalar: Sized {
    fn serialize_valid<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error>;

    /// Representation of an invalid value. `null` unless overridden.
    fn serialize_invalid<S: Serializer>(serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_none()
    }
}

impl NullableScalar for String {
    fn serialize_valid<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self)
    }
}

impl NullableScalar for bool {
    fn serialize_valid<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(*self)
    }
}

impl NullableScalar for i64 {
    fn serialize_valid<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*self)
    }

    fn serialize_invalid<S: Serializer>(serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(0)
    }
}

impl NullableScalar for f64 {
    fn serialize_valid<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(*self)
    }

    fn serialize_invalid<S: Serializer>(serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(0)
    }
}

impl NullableScalar for DateTime<Utc> {
    fn serialize_valid<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

impl<T: NullableScalar> Serialize for Nullable<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.inner {
            Some(v) => v.serialize_valid(serializer),
            None => T::serialize_invalid(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Nullable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Nullable::from)
    }
}
