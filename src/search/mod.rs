//! Search orchestration module
//!
//! The search service pages through, looks up and traverses entities of one
//! data source; the factory builds services for configured repositories.

mod cursor;
mod factory;
mod service;

pub use cursor::ChunkCursor;
pub use factory::SearchFactory;
pub use service::SearchService;
