//! Attribute types, per-attribute tracking slots, and the attribute store.

pub mod set;
pub mod slot;
pub mod types;

pub use set::AttributeSet;
pub use slot::AttributeSlot;
pub use types::{AttributeType, BooleanStorage, CustomType, DEFAULT_TIMESTAMP_PRECISION};
