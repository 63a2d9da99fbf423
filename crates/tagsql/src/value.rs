//! Typed field values.
//!
//! Every extracted record field becomes a [`Value`]. A `Value` has a canonical
//! string encoding ([`Value::encode`]) and binds to any Postgres parameter type
//! it can be coerced into: native types bind directly, everything else goes
//! through the string encoding and is parsed into the target type. This lets a
//! `game_id` held as `i64` bind to an `int4` column, and a filter value taken
//! from a query string (`"true"`) bind to a `boolean` column. `numeric` goes
//! through [`rust_decimal::Decimal`] and `json`/`jsonb` through
//! [`serde_json::Value`]. A value that cannot be parsed into the target type is
//! an error rather than raw text.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type};
use uuid::Uuid;

/// A record field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    TextArray(Vec<String>),
}

impl Value {
    /// Canonical string form.
    ///
    /// Integers are decimal, timestamps are RFC 3339 in UTC with second
    /// precision, uuids are hyphenated, text arrays render as `[a b]`.
    pub fn encode(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Text(v) => v.clone(),
            Value::Timestamp(v) => v.to_rfc3339_opts(SecondsFormat::Secs, true),
            Value::Uuid(v) => v.hyphenated().to_string(),
            Value::TextArray(v) => format!("[{}]", v.join(" ")),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Conversion of a record field into a [`Value`], plus the zero test the
/// extractor uses to skip unset fields.
pub trait ToValue {
    fn to_value(&self) -> Value;

    /// Zero fields are left out of generated statements.
    fn is_zero(&self) -> bool;
}

macro_rules! impl_to_value_signed {
    ($($t:ty),*) => {$(
        impl ToValue for $t {
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

macro_rules! impl_to_value_unsigned {
    ($($t:ty),*) => {$(
        impl ToValue for $t {
            fn to_value(&self) -> Value {
                Value::UInt(u64::from(*self))
            }

            fn is_zero(&self) -> bool {
                *self == 0
            }
        }
    )*};
}

impl_to_value_signed!(i8, i16, i32, i64);
impl_to_value_unsigned!(u8, u16, u32, u64);

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn is_zero(&self) -> bool {
        !*self
    }
}

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn is_zero(&self) -> bool {
        *self == 0.0
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ToValue for Vec<String> {
    fn to_value(&self) -> Value {
        Value::TextArray(self.clone())
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn is_zero(&self) -> bool {
        false
    }
}

impl ToValue for Uuid {
    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn is_zero(&self) -> bool {
        false
    }
}

/// `None` is skipped; `Some(v)` is always extracted, even when `v` is zero.
impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn is_zero(&self) -> bool {
        self.is_none()
    }
}

impl<T: ToValue + ?Sized> ToValue for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn is_zero(&self) -> bool {
        (**self).is_zero()
    }
}

// ─── Postgres binding ───────────────────────────────────────────────────────

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match (self, ty) {
            (Value::Null, _) => Ok(IsNull::Yes),
            (Value::Bool(v), &Type::BOOL) => v.to_sql(ty, out),
            (Value::Int(v), &Type::INT8) => v.to_sql(ty, out),
            (Value::Int(v), &Type::INT4) => i32::try_from(*v)?.to_sql(ty, out),
            (Value::Int(v), &Type::INT2) => i16::try_from(*v)?.to_sql(ty, out),
            (Value::UInt(v), &Type::INT8) => i64::try_from(*v)?.to_sql(ty, out),
            (Value::Float(v), &Type::FLOAT8) => v.to_sql(ty, out),
            (Value::Timestamp(v), &Type::TIMESTAMPTZ) => v.to_sql(ty, out),
            (Value::Timestamp(v), &Type::TIMESTAMP) => v.naive_utc().to_sql(ty, out),
            (Value::Timestamp(v), &Type::DATE) => v.date_naive().to_sql(ty, out),
            (Value::Uuid(v), &Type::UUID) => v.to_sql(ty, out),
            (Value::TextArray(v), _) => match ty.kind() {
                Kind::Array(_) => v.to_sql(ty, out),
                _ => Err(format!("cannot bind a text array to {ty}").into()),
            },
            (Value::Text(v), _) => bind_text(v, ty, out),
            (other, _) => bind_text(&other.encode(), ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Bind a string-encoded value, parsing it into the parameter's type.
///
/// Only character types take the string as is; any other type it cannot be
/// parsed into is an error.
fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => s.parse::<bool>()?.to_sql(ty, out),
        Type::INT2 => s.parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => s.parse::<Decimal>()?.to_sql(ty, out),
        Type::UUID => Uuid::parse_str(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamp(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)?.naive_utc().to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s, DATE_FORMAT)?.to_sql(ty, out),
        _ if <&str as ToSql>::accepts(ty) => s.to_sql(ty, out),
        _ => Err(format!("cannot bind {s:?} to {ty}").into()),
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// RFC 3339, or a bare `YYYY-MM-DD` taken as midnight UTC.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, BoxError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Ok(at.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(s, DATE_FORMAT)?;
    Ok(day.and_time(NaiveTime::MIN).and_utc())
}
