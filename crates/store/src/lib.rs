//! Marketplace persistence.
//!
//! [`MarketStore`] is the seam between the services and storage. Two
//! interchangeable backends implement it: [`InMemoryMarketStore`] for tests
//! and local runs, and [`PostgresMarketStore`] for deployment.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryMarketStore;
pub use postgres::PostgresMarketStore;
pub use store::{MarketStore, Page, Settlement};
