//! In-memory `ReservationStore`.
//!
//! Backs the test suites and is good enough for single-process deployments;
//! the versioning semantics are identical to the SQLite store.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use catalog::types::{ItemId, ReservationId};

use super::{ItemSnapshot, ReservationStore, StoreError};
use crate::model::{NewReservation, Reservation, ReservationStatus};

#[derive(Default)]
struct Inner {
    reservations: HashMap<ReservationId, Reservation>,
    item_versions: HashMap<ItemId, u64>,
}

#[derive(Default)]
pub struct MemoryReservationStore {
    inner: Mutex<Inner>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReservationStore for MemoryReservationStore {
    async fn insert(&self, new: NewReservation) -> Result<Reservation, StoreError> {
        let reservation = Reservation {
            id: Uuid::new_v4(),
            item_id: new.item_id,
            renter_id: new.renter_id,
            range: new.range,
            total_price: new.total_price,
            created_at: Utc::now(),
            status: ReservationStatus::Requested,
        };

        let mut guard = self.inner.lock().await;
        guard.reservations.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let guard = self.inner.lock().await;
        Ok(guard.reservations.get(&id).cloned())
    }

    async fn list_for_item(
        &self,
        item_id: ItemId,
        status: Option<ReservationStatus>,
    ) -> Result<Vec<Reservation>, StoreError> {
        let guard = self.inner.lock().await;
        let mut out: Vec<Reservation> = guard
            .reservations
            .values()
            .filter(|r| r.item_id == item_id)
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn snapshot_accepted(&self, item_id: ItemId) -> Result<ItemSnapshot, StoreError> {
        let guard = self.inner.lock().await;
        let accepted = guard
            .reservations
            .values()
            .filter(|r| r.item_id == item_id && r.status == ReservationStatus::Accepted)
            .cloned()
            .collect();
        let version = guard.item_versions.get(&item_id).copied().unwrap_or(0);
        Ok(ItemSnapshot { version, accepted })
    }

    async fn write_status_checked(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
        expected_version: u64,
    ) -> Result<Reservation, StoreError> {
        let mut guard = self.inner.lock().await;

        let item_id = guard
            .reservations
            .get(&id)
            .map(|r| r.item_id)
            .ok_or(StoreError::NotFound)?;

        let version = guard.item_versions.entry(item_id).or_insert(0);
        if *version != expected_version {
            return Err(StoreError::VersionConflict);
        }
        *version += 1;

        let r = guard
            .reservations
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        r.status = new_status;
        Ok(r.clone())
    }

    async fn write_status(
        &self,
        id: ReservationId,
        new_status: ReservationStatus,
    ) -> Result<Reservation, StoreError> {
        let mut guard = self.inner.lock().await;

        let item_id = guard
            .reservations
            .get(&id)
            .map(|r| r.item_id)
            .ok_or(StoreError::NotFound)?;

        *guard.item_versions.entry(item_id).or_insert(0) += 1;

        let r = guard
            .reservations
            .get_mut(&id)
            .ok_or(StoreError::NotFound)?;
        r.status = new_status;
        Ok(r.clone())
    }
}
