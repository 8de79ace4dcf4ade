//! The scheduling service façade.
//!
//! Orchestrates the state machine, the availability index and the store's
//! compare-and-write primitive. The accept path is the only contended
//! operation: it snapshots the item's accepted set, checks overlap, and
//! commits against the snapshot version, retrying a bounded number of times
//! when a concurrent writer got in between.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tracing::Instrument;

use catalog::store::ItemStore;
use catalog::types::{Item, ItemId, ReservationId};
use common::TraceId;
use common::logger::macros::{child_span, root_span};
use reservation::interval::{self, DateRange};
use reservation::model::{NewReservation, Reservation, ReservationStatus};
use reservation::store::{ReservationStore, StoreError};

use crate::availability::{AvailabilityIndex, BlockedDays};
use crate::clock::{Clock, SystemClock};
use crate::error::SchedulingError;
use crate::identity::{AccessToken, IdentityProvider};
use crate::lifecycle::{self, Actor};
use crate::notifier::{Notifier, ReservationEvent, ReservationEventKind};
use crate::types::SchedulerConfig;

pub struct SchedulingService<S, C, P, N>
where
    S: ReservationStore,
    C: ItemStore,
    P: IdentityProvider,
    N: Notifier,
{
    cfg: SchedulerConfig,
    store: Arc<S>,
    items: Arc<C>,
    identity: Arc<P>,
    notifier: Arc<N>,
    index: Arc<AvailabilityIndex>,
    clock: Arc<dyn Clock>,
}

impl<S, C, P, N> SchedulingService<S, C, P, N>
where
    S: ReservationStore,
    C: ItemStore,
    P: IdentityProvider,
    N: Notifier,
{
    pub fn new(
        cfg: SchedulerConfig,
        store: Arc<S>,
        items: Arc<C>,
        identity: Arc<P>,
        notifier: Arc<N>,
    ) -> Self {
        Self::with_clock(cfg, store, items, identity, notifier, Arc::new(SystemClock))
    }

    pub fn with_clock(
        cfg: SchedulerConfig,
        store: Arc<S>,
        items: Arc<C>,
        identity: Arc<P>,
        notifier: Arc<N>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cfg,
            store,
            items,
            identity,
            notifier,
            index: Arc::new(AvailabilityIndex::new()),
            clock,
        }
    }

    /// Create a reservation request.
    ///
    /// Overlapping `Requested` reservations are allowed to pile up and
    /// compete; a range is refused early only when the current accepted set
    /// already covers all of it. That early refusal is an optimization; the
    /// atomic accept is the actual guard.
    pub async fn request_reservation(
        &self,
        item_id: ItemId,
        token: &AccessToken,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Reservation, SchedulingError> {
        let trace = TraceId::default();
        let span = root_span("request_reservation", &trace);

        async {
            let renter = self.identity.resolve(token).await?;

            let range = DateRange::new(start, end).map_err(|_| SchedulingError::InvalidRange)?;
            if range.start() < self.clock.today() {
                return Err(SchedulingError::InvalidRange);
            }

            let item = self.fetch_item(item_id).await?;
            if renter == item.owner_id {
                return Err(SchedulingError::Unauthorized);
            }

            // Early refusal only when the whole range is already booked out;
            // a partial overlap may still compete and lose at accept time.
            let accepted = self
                .store
                .list_for_item(item_id, Some(ReservationStatus::Accepted))
                .await?;
            let blocks: Vec<DateRange> = accepted.iter().map(|r| r.range).collect();
            if interval::covers(&range, &blocks) {
                return Err(SchedulingError::RangeUnavailable);
            }

            let total_price = item.nightly_rate * range.nights();
            let reservation = self
                .store
                .insert(NewReservation {
                    item_id,
                    renter_id: renter,
                    range,
                    total_price,
                })
                .await?;

            tracing::info!(
                reservation = %reservation.id,
                item = %item_id,
                nights = range.nights(),
                total_price,
                "reservation requested"
            );

            Ok(reservation)
        }
        .instrument(span)
        .await
    }

    /// Owner decision on a pending request: accept or reject.
    pub async fn decide(
        &self,
        reservation_id: ReservationId,
        token: &AccessToken,
        accept: bool,
    ) -> Result<Reservation, SchedulingError> {
        let trace = TraceId::default();
        let span = root_span("decide", &trace);

        async {
            let caller = self.identity.resolve(token).await?;

            let reservation = self
                .store
                .get(reservation_id)
                .await?
                .ok_or(SchedulingError::NotFound)?;
            let item = self.fetch_item(reservation.item_id).await?;

            let actor = lifecycle::resolve_actor(&reservation, item.owner_id, caller)
                .ok_or(SchedulingError::Unauthorized)?;

            let target = if accept {
                ReservationStatus::Accepted
            } else {
                ReservationStatus::Rejected
            };
            lifecycle::check_transition(&reservation, target, actor, self.clock.today())?;

            if !accept {
                let updated = self
                    .store
                    .write_status(reservation_id, ReservationStatus::Rejected)
                    .await?;
                tracing::info!(reservation = %reservation_id, "reservation rejected");
                self.emit(ReservationEventKind::Rejected, &updated, &item).await;
                return Ok(updated);
            }

            let updated = self
                .accept_with_retries(&reservation)
                .instrument(child_span("accept_commit"))
                .await?;
            self.refresh_item(updated.item_id).await?;
            tracing::info!(reservation = %reservation_id, "reservation accepted");
            self.emit(ReservationEventKind::Accepted, &updated, &item).await;
            Ok(updated)
        }
        .instrument(span)
        .await
    }

    /// Cancel a pending or accepted reservation before its start date.
    pub async fn cancel(
        &self,
        reservation_id: ReservationId,
        token: &AccessToken,
    ) -> Result<Reservation, SchedulingError> {
        let trace = TraceId::default();
        let span = root_span("cancel", &trace);

        async {
            let caller = self.identity.resolve(token).await?;

            let reservation = self
                .store
                .get(reservation_id)
                .await?
                .ok_or(SchedulingError::NotFound)?;
            let item = self.fetch_item(reservation.item_id).await?;

            let actor = lifecycle::resolve_actor(&reservation, item.owner_id, caller)
                .ok_or(SchedulingError::Unauthorized)?;
            lifecycle::check_transition(
                &reservation,
                ReservationStatus::Cancelled,
                actor,
                self.clock.today(),
            )?;

            let was_blocking = reservation.status.is_blocking();
            let updated = self
                .store
                .write_status(reservation_id, ReservationStatus::Cancelled)
                .await?;

            if was_blocking {
                self.refresh_item(updated.item_id).await?;
            }

            tracing::info!(reservation = %reservation_id, "reservation cancelled");
            self.emit(ReservationEventKind::Cancelled, &updated, &item).await;
            Ok(updated)
        }
        .instrument(span)
        .await
    }

    /// Mark an accepted reservation completed once its end date has elapsed.
    ///
    /// System-driven (a background sweep or the owner). Idempotent:
    /// completing an already-completed reservation returns it unchanged.
    pub async fn complete(
        &self,
        reservation_id: ReservationId,
    ) -> Result<Reservation, SchedulingError> {
        let trace = TraceId::default();
        let span = root_span("complete", &trace);

        async {
            let reservation = self
                .store
                .get(reservation_id)
                .await?
                .ok_or(SchedulingError::NotFound)?;

            if reservation.status == ReservationStatus::Completed {
                return Ok(reservation);
            }

            lifecycle::check_transition(
                &reservation,
                ReservationStatus::Completed,
                Actor::System,
                self.clock.today(),
            )?;

            let item = self.fetch_item(reservation.item_id).await?;
            let updated = self
                .store
                .write_status(reservation_id, ReservationStatus::Completed)
                .await?;

            self.refresh_item(updated.item_id).await?;
            tracing::info!(reservation = %reservation_id, "reservation completed");
            self.emit(ReservationEventKind::Completed, &updated, &item).await;
            Ok(updated)
        }
        .instrument(span)
        .await
    }

    /// Is the whole range free of accepted reservations, per the (possibly
    /// slightly stale) availability index?
    pub fn query_availability(
        &self,
        item_id: ItemId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<bool, SchedulingError> {
        let range = DateRange::new(start, end).map_err(|_| SchedulingError::InvalidRange)?;
        Ok(self.index.is_range_available(item_id, &range))
    }

    /// Blocked calendar days for an item (calendar-picker contract).
    pub fn blocked_days(&self, item_id: ItemId) -> BlockedDays {
        self.index.blocked_days(item_id)
    }

    /// Rebuild the availability index for one item from the store. Called
    /// after every transition that changes the accepted set; also safe as a
    /// periodic background refresh or at startup.
    pub async fn refresh_item(&self, item_id: ItemId) -> Result<(), SchedulingError> {
        let accepted = self
            .store
            .list_for_item(item_id, Some(ReservationStatus::Accepted))
            .await?;
        if accepted.is_empty() {
            self.index.clear(item_id);
        } else {
            self.index
                .rebuild(item_id, accepted.iter().map(|r| r.range).collect());
        }
        Ok(())
    }

    /// The atomic check-then-write of the accept path.
    ///
    /// Snapshot the accepted set, re-read the reservation, verify no
    /// overlap, commit against the snapshot version. A version conflict
    /// means some other writer advanced the item in between; back off and
    /// retry up to the configured bound.
    async fn accept_with_retries(
        &self,
        reservation: &Reservation,
    ) -> Result<Reservation, SchedulingError> {
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let snapshot = self.store.snapshot_accepted(reservation.item_id).await?;

            // Re-read the reservation after the snapshot: a cancel or reject
            // that committed before the snapshot is visible here, and one
            // that commits after it bumps the item version and fails the
            // checked write below. Either way a non-Requested record never
            // gets flipped to Accepted.
            let current = self
                .store
                .get(reservation.id)
                .await?
                .ok_or(SchedulingError::NotFound)?;
            if current.status != ReservationStatus::Requested {
                return Err(SchedulingError::InvalidTransition {
                    from: current.status,
                    to: ReservationStatus::Accepted,
                });
            }

            let conflict = snapshot
                .accepted
                .iter()
                .any(|r| r.id != current.id && r.range.overlaps(&current.range));
            if conflict {
                // A real overlap, not a race: the request stays Requested and
                // the owner must reject it (or the renter cancel).
                return Err(SchedulingError::Conflict);
            }

            match self
                .store
                .write_status_checked(
                    reservation.id,
                    ReservationStatus::Accepted,
                    snapshot.version,
                )
                .await
            {
                Ok(updated) => return Ok(updated),
                Err(StoreError::VersionConflict) => {
                    if attempt >= self.cfg.max_accept_attempts {
                        tracing::warn!(
                            reservation = %reservation.id,
                            attempts = attempt,
                            "accept retries exhausted"
                        );
                        return Err(SchedulingError::Conflict);
                    }
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let base = self.cfg.retry_backoff_ms.saturating_mul(u64::from(attempt));
        let jitter = u64::from(Utc::now().timestamp_subsec_nanos()) % self.cfg.retry_backoff_ms.max(1);
        tokio::time::sleep(Duration::from_millis(base + jitter)).await;
    }

    async fn fetch_item(&self, item_id: ItemId) -> Result<Item, SchedulingError> {
        let item = self
            .items
            .get(item_id)
            .await
            .map_err(|e| SchedulingError::Store(StoreError::Backend(e)))?;
        item.ok_or(SchedulingError::NotFound)
    }

    async fn emit(&self, kind: ReservationEventKind, reservation: &Reservation, item: &Item) {
        let event = ReservationEvent {
            kind,
            reservation_id: reservation.id,
            item_id: reservation.item_id,
            renter_id: reservation.renter_id,
            owner_id: item.owner_id,
        };

        if let Err(e) = self.notifier.notify(event).await {
            tracing::warn!(error = %e, "notifier failed; transition already committed");
        }
    }
}
