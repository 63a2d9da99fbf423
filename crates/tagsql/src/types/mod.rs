//! Record field types that go beyond plain Rust scalars.
//!
//! Currently this is the family of nullable scalar wrappers.

mod nullable;

pub use nullable::{
    NullBool, NullFloat64, NullInt64, NullString, NullTime, Nullable, NullableScalar,
};
