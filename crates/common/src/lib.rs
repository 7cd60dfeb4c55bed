//! Shared types used across the marketplace crates.

pub mod secret;
pub mod types;

pub use secret::Secret;
pub use types::{CompostListingId, OrderId, UserId, WasteListingId};
