//! Sync Engine
//!
//! Wire protocol, per-playlist state cache and subscription bookkeeping.

mod cache;
mod protocol;
mod subscriptions;

pub use cache::*;
pub use protocol::*;
pub use subscriptions::*;
