//! Query inputs
//!
//! The two values a caller hands to a search: the page window and the
//! opaque filter parameters.

mod page;
mod params;

pub use page::Page;
pub use params::Params;
