//! Compost offered for sale by composters.

use chrono::{DateTime, Utc};
use common::{CompostListingId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, ValidationError, require_text};
use crate::money::{Money, Quantity, total_price};

/// Composter input for a new compost listing.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCompostListing {
    pub title: String,
    pub description: Option<String>,
    pub price_per_kg: Money,
    pub quantity_available: Quantity,
}

impl NewCompostListing {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text("title", &self.title)?;
        if !self.price_per_kg.is_positive() {
            return Err(ValidationError::NonPositivePrice);
        }
        Ok(())
    }
}

/// The listing does not hold enough compost for the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("only {available} available, {requested} requested")]
pub struct InsufficientInventory {
    pub requested: Quantity,
    pub available: Quantity,
}

impl InsufficientInventory {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::StateConflict
    }
}

/// A composter's offer of compost, sold by the kilogram.
///
/// `quantity_available` is never negative and only ever decreases through a
/// committed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompostListing {
    pub id: CompostListingId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub price_per_kg: Money,
    pub quantity_available: Quantity,
    pub created_at: DateTime<Utc>,
}

impl CompostListing {
    pub fn create(
        owner_id: UserId,
        draft: NewCompostListing,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        draft.validate()?;
        Ok(Self {
            id: CompostListingId::new(),
            owner_id,
            title: draft.title.trim().to_string(),
            description: draft.description,
            price_per_kg: draft.price_per_kg,
            quantity_available: draft.quantity_available,
            created_at: now,
        })
    }

    /// Returns true if at least `quantity` is currently on hand.
    pub fn has_available(&self, quantity: Quantity) -> bool {
        self.quantity_available >= quantity
    }

    /// Checks availability without reserving anything.
    pub fn ensure_available(&self, quantity: Quantity) -> Result<(), InsufficientInventory> {
        if self.has_available(quantity) {
            Ok(())
        } else {
            Err(InsufficientInventory {
                requested: quantity,
                available: self.quantity_available,
            })
        }
    }

    /// Price of `quantity` at this listing's rate.
    pub fn quote(&self, quantity: Quantity) -> Result<Money, ValidationError> {
        total_price(quantity, self.price_per_kg)
    }
}
