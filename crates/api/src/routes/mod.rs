//! HTTP handlers, one module per resource.

pub mod compost_listings;
pub mod composters;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod waste_listings;

use std::str::FromStr;

use serde::Deserialize;

use crate::error::ApiError;

/// `?skip=&limit=` paging parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> store::Page {
        store::Page::new(self.skip, self.limit)
    }
}

/// Parses a path identifier, reporting a 400 on malformed input.
pub(crate) fn parse_id<T: FromStr>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what} id `{raw}`: {e}")))
}
