//! Waste listings and their status state machine.

use chrono::{DateTime, Utc};
use common::{UserId, WasteListingId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, ValidationError, require_text};
use crate::geo::GeoPoint;
use crate::money::Quantity;

/// Category of waste on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteType {
    #[default]
    Organic,
    Plastic,
    Paper,
    Glass,
    Metal,
    Other,
}

impl WasteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WasteType::Organic => "organic",
            WasteType::Plastic => "plastic",
            WasteType::Paper => "paper",
            WasteType::Glass => "glass",
            WasteType::Metal => "metal",
            WasteType::Other => "other",
        }
    }
}

impl std::str::FromStr for WasteType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organic" => Ok(WasteType::Organic),
            "plastic" => Ok(WasteType::Plastic),
            "paper" => Ok(WasteType::Paper),
            "glass" => Ok(WasteType::Glass),
            "metal" => Ok(WasteType::Metal),
            "other" => Ok(WasteType::Other),
            _ => Err(ValidationError::UnknownVariant {
                field: "waste_type",
                value: s.to_string(),
            }),
        }
    }
}

/// Status of a waste listing.
///
/// State transitions:
/// ```text
/// Available ──► Assigned ──► PendingPickup ──► Completed
///     │            │               │
///     └────────────┴───────────────┴──► Cancelled
/// ```
/// `Available → Cancelled` is the producer withdrawing its listing; every
/// other edge is driven by the assigned composter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WasteListingStatus {
    #[default]
    Available,
    Assigned,
    PendingPickup,
    Completed,
    Cancelled,
}

impl WasteListingStatus {
    /// Returns true if a listing in this status must have an assigned composter.
    pub fn requires_composter(&self) -> bool {
        matches!(
            self,
            WasteListingStatus::Assigned
                | WasteListingStatus::PendingPickup
                | WasteListingStatus::Completed
        )
    }

    /// Returns true if the assigned composter may move a listing from this
    /// status to `next`.
    pub fn composter_can_transition_to(&self, next: WasteListingStatus) -> bool {
        use WasteListingStatus::*;
        matches!(
            (self, next),
            (Assigned, PendingPickup)
                | (PendingPickup, Completed)
                | (Assigned, Cancelled)
                | (PendingPickup, Cancelled)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WasteListingStatus::Completed | WasteListingStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteListingStatus::Available => "available",
            WasteListingStatus::Assigned => "assigned",
            WasteListingStatus::PendingPickup => "pending_pickup",
            WasteListingStatus::Completed => "completed",
            WasteListingStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for WasteListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WasteListingStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(WasteListingStatus::Available),
            "assigned" => Ok(WasteListingStatus::Assigned),
            "pending_pickup" => Ok(WasteListingStatus::PendingPickup),
            "completed" => Ok(WasteListingStatus::Completed),
            "cancelled" => Ok(WasteListingStatus::Cancelled),
            _ => Err(ValidationError::UnknownVariant {
                field: "status",
                value: s.to_string(),
            }),
        }
    }
}

/// A requested transition that the state machine refuses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The listing is no longer available to accept.
    #[error("listing is already {status}")]
    NotAvailable { status: WasteListingStatus },

    /// The transition is not an edge of the state machine.
    #[error("cannot move listing from {from} to {to}")]
    Illegal {
        from: WasteListingStatus,
        to: WasteListingStatus,
    },

    /// Only the assigned composter may progress the listing.
    #[error("only the assigned composter may update this listing")]
    NotAssignedComposter,

    /// Only the producer may withdraw its own listing.
    #[error("only the listing's owner may withdraw it")]
    NotOwner,
}

impl TransitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransitionError::NotAvailable { .. } | TransitionError::Illegal { .. } => {
                ErrorKind::StateConflict
            }
            TransitionError::NotAssignedComposter | TransitionError::NotOwner => {
                ErrorKind::Forbidden
            }
        }
    }
}

/// The `(status, assigned_composter_id)` pair of a waste listing.
///
/// This pair is the unit of every compare-and-swap on a listing. It can only be
/// constructed in a consistent shape: a composter is present exactly when the
/// status requires one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawListingState")]
pub struct ListingState {
    status: WasteListingStatus,
    assigned_composter_id: Option<UserId>,
}

#[derive(Deserialize)]
struct RawListingState {
    status: WasteListingStatus,
    assigned_composter_id: Option<UserId>,
}

impl TryFrom<RawListingState> for ListingState {
    type Error = InconsistentListingState;

    fn try_from(raw: RawListingState) -> Result<Self, Self::Error> {
        ListingState::new(raw.status, raw.assigned_composter_id)
    }
}

/// A status/composter pair that violates the assignment invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("status {status} is inconsistent with assigned composter {assigned_composter_id:?}")]
pub struct InconsistentListingState {
    pub status: WasteListingStatus,
    pub assigned_composter_id: Option<UserId>,
}

impl ListingState {
    /// Validates and builds a state pair.
    pub fn new(
        status: WasteListingStatus,
        assigned_composter_id: Option<UserId>,
    ) -> Result<Self, InconsistentListingState> {
        if status.requires_composter() != assigned_composter_id.is_some() {
            return Err(InconsistentListingState {
                status,
                assigned_composter_id,
            });
        }
        Ok(Self {
            status,
            assigned_composter_id,
        })
    }

    /// The state of a freshly created listing.
    pub fn available() -> Self {
        Self {
            status: WasteListingStatus::Available,
            assigned_composter_id: None,
        }
    }

    pub fn status(&self) -> WasteListingStatus {
        self.status
    }

    pub fn assigned_composter_id(&self) -> Option<UserId> {
        self.assigned_composter_id
    }

    /// A composter takes the listing: `Available → Assigned`.
    pub fn accept(&self, composter: UserId) -> Result<ListingState, TransitionError> {
        if self.status != WasteListingStatus::Available {
            return Err(TransitionError::NotAvailable {
                status: self.status,
            });
        }
        Ok(ListingState {
            status: WasteListingStatus::Assigned,
            assigned_composter_id: Some(composter),
        })
    }

    /// The assigned composter progresses or cancels the listing.
    ///
    /// Cancelling releases the assignment.
    pub fn advance(
        &self,
        next: WasteListingStatus,
        actor: UserId,
    ) -> Result<ListingState, TransitionError> {
        match self.assigned_composter_id {
            Some(assigned) if assigned != actor => {
                return Err(TransitionError::NotAssignedComposter);
            }
            _ => {}
        }
        if !self.status.composter_can_transition_to(next) {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: next,
            });
        }
        let assigned_composter_id = if next.requires_composter() {
            self.assigned_composter_id
        } else {
            None
        };
        Ok(ListingState {
            status: next,
            assigned_composter_id,
        })
    }

    /// The producer withdraws an unclaimed listing: `Available → Cancelled`.
    pub fn withdraw(&self) -> Result<ListingState, TransitionError> {
        if self.status != WasteListingStatus::Available {
            return Err(TransitionError::Illegal {
                from: self.status,
                to: WasteListingStatus::Cancelled,
            });
        }
        Ok(ListingState {
            status: WasteListingStatus::Cancelled,
            assigned_composter_id: None,
        })
    }
}

impl Default for ListingState {
    fn default() -> Self {
        Self::available()
    }
}

/// Where the waste can be collected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PickupLocation {
    /// Free-text pickup location as entered by the producer.
    pub label: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    /// Geocoded point, when known. Matching requires it.
    pub point: Option<GeoPoint>,
}

impl PickupLocation {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_point(mut self, point: GeoPoint) -> Self {
        self.point = Some(point);
        self
    }
}

/// Producer input for a new waste listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWasteListing {
    pub title: String,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub waste_type: WasteType,
    pub pickup: PickupLocation,
}

impl NewWasteListing {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        require_text("pickup_location", &self.pickup.label)?;
        if !self.quantity.is_positive() {
            return Err(ValidationError::NonPositiveQuantity);
        }
        Ok(())
    }
}

/// A producer's offer of waste for collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WasteListing {
    pub id: WasteListingId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub quantity: Quantity,
    pub waste_type: WasteType,
    pub pickup: PickupLocation,
    #[serde(flatten)]
    pub state: ListingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WasteListing {
    /// Builds a new `Available` listing from validated producer input.
    pub fn create(
        owner_id: UserId,
        draft: NewWasteListing,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        draft.validate()?;
        Ok(Self {
            id: WasteListingId::new(),
            owner_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            quantity: draft.quantity,
            waste_type: draft.waste_type,
            pickup: draft.pickup,
            state: ListingState::available(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> WasteListingStatus {
        self.state.status()
    }

    pub fn assigned_composter_id(&self) -> Option<UserId> {
        self.state.assigned_composter_id()
    }

    /// Pickup coordinates, if the listing was geocoded.
    pub fn coordinates(&self) -> Option<GeoPoint> {
        self.pickup.point
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assigned_to(composter: UserId) -> ListingState {
        ListingState::available().accept(composter).unwrap()
    }

    #[test]
    fn available_listing_has_no_composter() {
        let state = ListingState::available();
        assert_eq!(state.status(), WasteListingStatus::Available);
        assert_eq!(state.assigned_composter_id(), None);
    }

    #[test]
    fn accept_assigns_the_composter() {
        let composter = UserId::new();
        let state = assigned_to(composter);
        assert_eq!(state.status(), WasteListingStatus::Assigned);
        assert_eq!(state.assigned_composter_id(), Some(composter));
    }

    #[test]
    fn accept_twice_is_a_conflict() {
        let state = assigned_to(UserId::new());
        let err = state.accept(UserId::new()).unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotAvailable {
                status: WasteListingStatus::Assigned
            }
        );
        assert_eq!(err.kind(), ErrorKind::StateConflict);
    }

    #[test]
    fn composter_walks_the_happy_path() {
        let composter = UserId::new();
        let state = assigned_to(composter)
            .advance(WasteListingStatus::PendingPickup, composter)
            .unwrap()
            .advance(WasteListingStatus::Completed, composter)
            .unwrap();
        assert_eq!(state.status(), WasteListingStatus::Completed);
        assert_eq!(state.assigned_composter_id(), Some(composter));
    }

    #[test]
    fn cancelling_releases_the_assignment() {
        let composter = UserId::new();
        for from in [
            assigned_to(composter),
            assigned_to(composter)
                .advance(WasteListingStatus::PendingPickup, composter)
                .unwrap(),
        ] {
            let cancelled = from
                .advance(WasteListingStatus::Cancelled, composter)
                .unwrap();
            assert_eq!(cancelled.status(), WasteListingStatus::Cancelled);
            assert_eq!(cancelled.assigned_composter_id(), None);
        }
    }

    #[test]
    fn illegal_edges_are_conflicts() {
        let composter = UserId::new();
        let assigned = assigned_to(composter);
        let err = assigned
            .advance(WasteListingStatus::Completed, composter)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let err = ListingState::available()
            .advance(WasteListingStatus::PendingPickup, composter)
            .unwrap_err();
        assert!(matches!(err, TransitionError::Illegal { .. }));

        let completed = assigned
            .advance(WasteListingStatus::PendingPickup, composter)
            .unwrap()
            .advance(WasteListingStatus::Completed, composter)
            .unwrap();
        assert!(
            completed
                .advance(WasteListingStatus::Cancelled, composter)
                .is_err()
        );
    }

    #[test]
    fn only_assigned_composter_may_advance() {
        let state = assigned_to(UserId::new());
        let err = state
            .advance(WasteListingStatus::PendingPickup, UserId::new())
            .unwrap_err();
        assert_eq!(err, TransitionError::NotAssignedComposter);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn withdraw_only_from_available() {
        let withdrawn = ListingState::available().withdraw().unwrap();
        assert_eq!(withdrawn.status(), WasteListingStatus::Cancelled);
        assert!(assigned_to(UserId::new()).withdraw().is_err());
    }

    #[test]
    fn every_reachable_state_honours_the_assignment_invariant() {
        use WasteListingStatus::*;
        let composter = UserId::new();
        let mut frontier = vec![ListingState::available()];
        let mut seen = Vec::new();
        while let Some(state) = frontier.pop() {
            assert_eq!(
                state.status().requires_composter(),
                state.assigned_composter_id().is_some(),
                "{state:?}"
            );
            if seen.contains(&state) {
                continue;
            }
            seen.push(state);
            frontier.extend(state.accept(composter).ok());
            frontier.extend(state.withdraw().ok());
            for next in [Available, Assigned, PendingPickup, Completed, Cancelled] {
                frontier.extend(state.advance(next, composter).ok());
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn inconsistent_pairs_cannot_be_built() {
        assert!(ListingState::new(WasteListingStatus::Assigned, None).is_err());
        assert!(ListingState::new(WasteListingStatus::Available, Some(UserId::new())).is_err());
        assert!(ListingState::new(WasteListingStatus::Cancelled, Some(UserId::new())).is_err());
        assert!(ListingState::new(WasteListingStatus::Completed, Some(UserId::new())).is_ok());

        let json = r#"{"status":"assigned","assigned_composter_id":null}"#;
        assert!(serde_json::from_str::<ListingState>(json).is_err());
    }

    #[test]
    fn create_validates_input() {
        let draft = NewWasteListing {
            title: "  Kitchen scraps ".to_string(),
            description: None,
            quantity: Quantity::from_kg(12.5).unwrap(),
            waste_type: WasteType::Organic,
            pickup: PickupLocation::new("MG Road"),
        };
        let listing = WasteListing::create(UserId::new(), draft.clone(), Utc::now()).unwrap();
        assert_eq!(listing.title, "Kitchen scraps");
        assert_eq!(listing.status(), WasteListingStatus::Available);

        let empty = NewWasteListing {
            quantity: Quantity::zero(),
            ..draft.clone()
        };
        assert_eq!(
            WasteListing::create(UserId::new(), empty, Utc::now()).unwrap_err(),
            ValidationError::NonPositiveQuantity
        );

        let untitled = NewWasteListing {
            title: " ".to_string(),
            ..draft
        };
        assert!(WasteListing::create(UserId::new(), untitled, Utc::now()).is_err());
    }

    #[test]
    fn status_parsing_uses_snake_case() {
        assert_eq!(
            "pending_pickup".parse::<WasteListingStatus>().unwrap(),
            WasteListingStatus::PendingPickup
        );
        assert_eq!(
            serde_json::to_string(&WasteListingStatus::PendingPickup).unwrap(),
            "\"pending_pickup\""
        );
        assert!("done".parse::<WasteListingStatus>().is_err());
    }
}
