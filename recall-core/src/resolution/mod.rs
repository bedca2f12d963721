//! Entity and statement resolution against the stored graph.

mod entity;
mod statement;

pub use entity::EntityResolver;
pub use statement::{DuplicateMatch, StatementResolution, StatementResolver};
