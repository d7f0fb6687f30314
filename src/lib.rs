//!
//! src/lib.rs
//!
//! Cross-platform music track link resolution. Looks a track up on its
//! source platform and searches the other platforms for the
//! highest-confidence equivalent of the cleaned title/artist pair
//!
//!

pub mod config;
pub mod errors;
pub mod fetch;
pub mod logging;
pub mod normalize;
pub mod resolver;
pub mod scoring;
pub mod types;

pub use errors::ResolverError;
pub use fetch::{CatalogClient, HttpCatalogClient};
pub use resolver::Resolver;
pub use scoring::MatchPolicy;
pub use types::{Conversion, MatchResult, Provider, Track};
