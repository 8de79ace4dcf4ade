use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use catalog::types::{ItemId, ReservationId, UserId};

use crate::interval::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Requested,
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Rejected
                | ReservationStatus::Cancelled
                | ReservationStatus::Completed
        )
    }

    /// Only accepted reservations occupy their date range exclusively.
    /// Pending requests may pile up on the same dates.
    pub fn is_blocking(&self) -> bool {
        matches!(self, ReservationStatus::Accepted)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Requested => "Requested",
            ReservationStatus::Accepted => "Accepted",
            ReservationStatus::Rejected => "Rejected",
            ReservationStatus::Cancelled => "Cancelled",
            ReservationStatus::Completed => "Completed",
        };
        f.write_str(s)
    }
}

impl FromStr for ReservationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Requested" => Ok(ReservationStatus::Requested),
            "Accepted" => Ok(ReservationStatus::Accepted),
            "Rejected" => Ok(ReservationStatus::Rejected),
            "Cancelled" => Ok(ReservationStatus::Cancelled),
            "Completed" => Ok(ReservationStatus::Completed),
            other => Err(anyhow::anyhow!("invalid ReservationStatus value: {}", other)),
        }
    }
}

/// A time-ranged rental request against one item.
///
/// `range`, `total_price` and `created_at` are fixed at creation; changing
/// dates or price means cancelling and re-requesting. Only `status` moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,

    // References
    pub item_id: ItemId,
    pub renter_id: UserId,

    // Immutable after creation
    pub range: DateRange,
    pub total_price: i64,
    pub created_at: DateTime<Utc>,

    // Lifecycle
    pub status: ReservationStatus,
}

/// Insert payload for a new reservation. The store assigns the id and the
/// creation timestamp; every reservation starts out `Requested`.
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub item_id: ItemId,
    pub renter_id: UserId,
    pub range: DateRange,
    pub total_price: i64,
}
