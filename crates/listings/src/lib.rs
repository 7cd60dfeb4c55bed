//! Listing Registry and Matching Engine services.
//!
//! Both are thin async services over a [`store::MarketStore`]: they authorize
//! the caller, run the pure domain rules and persist through the store's
//! conditional writes.

pub mod error;
pub mod matching;
pub mod registry;

pub use error::{ListingError, MatchingError};
pub use matching::MatchingEngine;
pub use registry::ListingRegistry;
