//! Domain layer for the compost marketplace.
//!
//! Everything in this crate is pure: entities, the waste-listing state
//! machine, order settlement planning, money arithmetic, great-circle
//! distance and composter ranking. Storage and I/O live in the `store`,
//! `listings` and `settlement` crates.

pub mod auth;
pub mod compost_listing;
pub mod error;
pub mod geo;
pub mod matching;
pub mod money;
pub mod order;
pub mod waste_listing;

pub use auth::{AuthorizationError, Capability, Principal, Role};
pub use common::{CompostListingId, OrderId, UserId, WasteListingId};
pub use compost_listing::{CompostListing, InsufficientInventory, NewCompostListing};
pub use error::{ErrorKind, ValidationError};
pub use geo::{EARTH_RADIUS_KM, GeoPoint, great_circle_distance_km};
pub use matching::{
    ComposterProfile, DEFAULT_RECOMMENDATION_LIMIT, RankedComposter, rank_composters,
};
pub use money::{Currency, Money, Quantity, total_price};
pub use order::{
    Order, OrderStatus, PaymentCapture, PaymentReference, ReconciliationReason, SettlementPlan,
    plan_settlement,
};
pub use waste_listing::{
    InconsistentListingState, ListingState, NewWasteListing, PickupLocation, TransitionError,
    WasteListing, WasteListingStatus, WasteType,
};
