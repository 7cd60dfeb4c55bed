//! Principals, roles and per-operation capabilities.
//!
//! Authorization is a capability check: each operation names the
//! [`Capability`] it needs and the principal's [`Role`] either grants it or
//! not. Ownership checks (is this *my* listing?) are done by the services.

use common::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, ValidationError};

/// Marketplace role supplied by the auth service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Household,
    Business,
    Composter,
    Buyer,
}

impl Role {
    /// Returns true if this role may perform `capability`.
    pub fn grants(&self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::Household | Role::Business => {
                matches!(capability, CreateWasteListing | WithdrawWasteListing)
            }
            Role::Composter => matches!(
                capability,
                AcceptWasteListing
                    | UpdateWasteListingStatus
                    | CreateCompostListing
                    | PublishComposterProfile
            ),
            Role::Buyer => matches!(
                capability,
                PlaceOrder | ViewOwnOrders | SubmitPaymentCallback
            ),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Household => "household",
            Role::Business => "business",
            Role::Composter => "composter",
            Role::Buyer => "buyer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "household" => Ok(Role::Household),
            "business" => Ok(Role::Business),
            "composter" => Ok(Role::Composter),
            "buyer" => Ok(Role::Buyer),
            _ => Err(ValidationError::UnknownVariant {
                field: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// An operation that requires authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CreateWasteListing,
    WithdrawWasteListing,
    AcceptWasteListing,
    UpdateWasteListingStatus,
    CreateCompostListing,
    PublishComposterProfile,
    PlaceOrder,
    ViewOwnOrders,
    SubmitPaymentCallback,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CreateWasteListing => "create waste listings",
            Capability::WithdrawWasteListing => "withdraw waste listings",
            Capability::AcceptWasteListing => "accept waste listings",
            Capability::UpdateWasteListingStatus => "update waste listing status",
            Capability::CreateCompostListing => "create compost listings",
            Capability::PublishComposterProfile => "publish composter profiles",
            Capability::PlaceOrder => "place orders",
            Capability::ViewOwnOrders => "view orders",
            Capability::SubmitPaymentCallback => "submit payment callbacks",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Checks that this principal's role grants `capability`.
    pub fn authorize(&self, capability: Capability) -> Result<(), AuthorizationError> {
        if self.role.grants(capability) {
            Ok(())
        } else {
            Err(AuthorizationError {
                role: self.role,
                capability,
            })
        }
    }
}

/// The principal's role does not grant the requested capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{role} accounts may not {capability}")]
pub struct AuthorizationError {
    pub role: Role,
    pub capability: Capability,
}

impl AuthorizationError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Forbidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_composters_accept_and_progress_listings() {
        for role in [Role::Household, Role::Business, Role::Buyer] {
            assert!(!role.grants(Capability::AcceptWasteListing));
            assert!(!role.grants(Capability::UpdateWasteListingStatus));
        }
        assert!(Role::Composter.grants(Capability::AcceptWasteListing));
        assert!(Role::Composter.grants(Capability::UpdateWasteListingStatus));
    }

    #[test]
    fn only_buyers_place_orders() {
        for role in [Role::Household, Role::Business, Role::Composter] {
            assert!(!role.grants(Capability::PlaceOrder));
        }
        assert!(Role::Buyer.grants(Capability::PlaceOrder));
    }

    #[test]
    fn producers_create_waste_listings() {
        assert!(Role::Household.grants(Capability::CreateWasteListing));
        assert!(Role::Business.grants(Capability::CreateWasteListing));
        assert!(!Role::Composter.grants(Capability::CreateWasteListing));
        assert!(!Role::Buyer.grants(Capability::CreateWasteListing));
    }

    #[test]
    fn authorize_reports_role_and_capability() {
        let principal = Principal::new(UserId::new(), Role::Buyer);
        let err = principal
            .authorize(Capability::AcceptWasteListing)
            .unwrap_err();
        assert_eq!(err.role, Role::Buyer);
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.to_string(), "buyer accounts may not accept waste listings");
    }

    #[test]
    fn role_parsing() {
        assert_eq!("Composter".parse::<Role>().unwrap(), Role::Composter);
        assert!("farmer".parse::<Role>().is_err());
    }
}
