//! Catalog REST plane
//!
//! Media uploads, deletions, listings and user management live on plain HTTP
//! endpoints next to the playback channel.

mod client;
mod types;

pub use client::{CatalogClient, CatalogError};
pub use types::*;
