//!
//! src/errors.rs
//!
//! Defines enums and methods of error conversion
//! for errors the resolver uses
//!
//!

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("search failed: {0}")]
    Search(String),
    #[error("resolution cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ResolverError {
    fn from(e: reqwest::Error) -> Self { ResolverError::Http(e.to_string()) }
}

impl From<serde_json::Error> for ResolverError {
    fn from(e: serde_json::Error) -> Self { ResolverError::Parse(e.to_string()) }
}
