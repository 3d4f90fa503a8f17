//! ORM Core Module
//!
//! Key naming, entity capability traits, SQL value types and the ordered-set
//! primitive shared by both managers.

pub mod entity;
pub mod keys;
mod value;
mod vset;

// Re-export public types
pub use entity::{Entity, IndexKey, Membership, PrimaryKey, RangeMembership, RangeScope, UniqueKey};
pub use value::{SqlRow, SqlValue};
pub use vset::{check_bounds, check_window, VSet};
