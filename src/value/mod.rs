//! Value model for attribute tracking
//!
//! ## Types
//!
//! - **`RawValue`** - attribute input before type coercion (form params, storage rows,
//!   native values)
//! - **`CastValue`** - canonical value after the attribute type's `cast`
//!
//! `sea_query::Value` is the storage currency on both sides: `CastValue::to_storage`
//! produces it for writes and `RawValue::try_from` consumes it on reload.

pub mod cast;
pub mod raw;

pub use cast::CastValue;
pub use raw::RawValue;
