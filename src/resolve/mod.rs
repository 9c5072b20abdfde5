//! Resolution of the identifiers the listing URLs are built from
//!
//! - [`ModelResolver`]: license plate → the site's model type, via the lookup form
//! - [`CategoryResolver`]: free-text part name → matching category menu entries

pub mod category;
pub mod model;

pub use category::{CategoryResolver, MatchStrategy};
pub use model::ModelResolver;
