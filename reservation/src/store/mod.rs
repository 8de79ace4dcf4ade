//! The durable-store contract the scheduling core consumes.
//!
//! The one non-obvious requirement is the compare-and-write primitive: every
//! status write bumps a per-item version, and the accept path commits only if
//! the version it read is still current. That is what makes the
//! check-then-write on the accepted set atomic without long-held locks.

pub mod memory;
pub mod sqlite_store;

use thiserror::Error;

use catalog::types::{ItemId, ReservationId};

use crate::model::{NewReservation, Reservation, ReservationStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("reservation not found")]
    NotFound,

    #[error("concurrent write detected for item")]
    VersionConflict,

    #[error("store backend failure: {0}")]
    Backend(#[from] anyhow::Error),
}

/// The accepted set of one item at a point in time, tagged with the item
/// version the set was read at.
#[derive(Debug, Clone)]
pub struct ItemSnapshot {
    pub version: u64,
    pub accepted: Vec<Reservation>,
}

#[async_trait::async_trait]
pub trait ReservationStore: Send + Sync {
    /// Append a new reservation record. The store assigns the id and the
    /// creation timestamp; the record starts out `Requested`.
    async fn insert(&self, new: NewReservation) -> Result<Reservation, StoreError>;

    /// Point read by id.
    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// All reservations for an item, optionally filtered by status.
    async fn list_for_item(
        &self,
        item_id: ItemId,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Read the current accepted set for an item together with the item
    /// version. Items with no history are at version 0 with an empty set.
    async fn snapshot_accepted(&self, item_id: ItemId) -> Result<ItemSnapshot, StoreError>;

    /// Compare-and-write: commit the status change only if the reservation's
    /// item is still at `expected_version`, else `VersionConflict`. Bumps the
    /// item version on success.
    async fn write_status_checked(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
        expected_version: u64,
    ) -> Result<Reservation, StoreError>;

    /// Unconditional status write for uncontended transitions (reject,
    /// cancel, complete). Still bumps the item version so an in-flight
    /// accept re-reads before committing.
    async fn write_status(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
    ) -> Result<Reservation, StoreError>;
}
