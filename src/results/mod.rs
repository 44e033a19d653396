//! Result envelope returned by search operations

mod types;

pub use types::*;
