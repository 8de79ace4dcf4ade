//! Item-side domain types.
//!
//! Items are owned and managed outside the scheduling core; the core only
//! reads them to price a request and to authorize owner decisions.

use serde::{Deserialize, Serialize};

pub type ItemId = uuid::Uuid;
pub type UserId = uuid::Uuid;
pub type ReservationId = uuid::Uuid;

/// A rentable item, as the core sees it.
///
/// Never mutated by the core: `owner_id` feeds authorization checks and
/// `nightly_rate` feeds price computation at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub owner_id: UserId,

    /// Price per night in a currency-agnostic minor unit.
    pub nightly_rate: i64,
}
