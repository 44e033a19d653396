//! Data sources
//!
//! Defines the DataSource trait the search service consumes, plus an
//! in-memory implementation and a SQLite implementation.

mod memory;
pub mod sql;
mod traits;

pub use memory::{MemoryFilter, MemorySource};
pub use sql::{SqlSource, SqlSourceBuilder};
pub use traits::*;
