
use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use catalog::types::{Item, ItemId, UserId};
use reservation::model::ReservationStatus;
use reservation::store::memory::MemoryReservationStore;
use reservation::store::ReservationStore;
use scheduler::clock::Clock;
use scheduler::engine::SchedulingService;
use scheduler::error::SchedulingError;
use scheduler::identity::AccessToken;
use scheduler::notifier::ReservationEventKind;
use scheduler::types::SchedulerConfig;

use common::init_logger;

use mock_collab::{
    CancelDuringAcceptStore, FailingNotifier, FixedClock, MemoryItemStore, RecordingNotifier,
    TokenDirectory,
};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

type Service =
    SchedulingService<MemoryReservationStore, MemoryItemStore, TokenDirectory, RecordingNotifier>;

struct Harness {
    svc: Arc<Service>,
    store: Arc<MemoryReservationStore>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<FixedClock>,
    item: ItemId,
    owner: UserId,
    renter: UserId,
    renter2: UserId,
    owner_token: AccessToken,
    renter_token: AccessToken,
    renter2_token: AccessToken,
}

/// Service over in-memory collaborators, one item with nightly rate 50.
async fn harness(today: NaiveDate) -> Harness {
    init_logger("scheduler-tests");

    let store = Arc::new(MemoryReservationStore::new());
    let items = Arc::new(MemoryItemStore::default());
    let identity = Arc::new(TokenDirectory::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(FixedClock::at(today));

    let owner = Uuid::new_v4();
    let renter = Uuid::new_v4();
    let renter2 = Uuid::new_v4();

    let item = Item {
        id: Uuid::new_v4(),
        owner_id: owner,
        nightly_rate: 50,
    };
    items.add(item.clone()).await;

    let owner_token = AccessToken::new("owner");
    let renter_token = AccessToken::new("renter");
    let renter2_token = AccessToken::new("renter2");
    identity.register(&owner_token, owner).await;
    identity.register(&renter_token, renter).await;
    identity.register(&renter2_token, renter2).await;

    let svc = Arc::new(SchedulingService::with_clock(
        SchedulerConfig::default(),
        store.clone(),
        items,
        identity,
        notifier.clone(),
        clock.clone() as Arc<dyn Clock>,
    ));

    Harness {
        svc,
        store,
        notifier,
        clock,
        item: item.id,
        owner,
        renter,
        renter2,
        owner_token,
        renter_token,
        renter2_token,
    }
}

#[tokio::test]
async fn request_computes_price_and_starts_requested() {
    let h = harness(d(2025, 5, 1)).await;

    // Jun 1 - Jun 3 is two nights at rate 50.
    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();

    assert_eq!(r.total_price, 100);
    assert_eq!(r.status, ReservationStatus::Requested);
    assert_eq!(r.renter_id, h.renter);
}

#[tokio::test]
async fn same_day_request_still_costs_one_night() {
    let h = harness(d(2025, 5, 1)).await;

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 1))
        .await
        .unwrap();
    assert_eq!(r.total_price, 50);
}

#[tokio::test]
async fn request_validation_errors() {
    let h = harness(d(2025, 5, 1)).await;

    // Start after end.
    let err = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 3), d(2025, 6, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidRange));

    // Start in the past.
    let err = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 4, 30), d(2025, 6, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidRange));

    // Owners cannot bid on their own item.
    let err = h
        .svc
        .request_reservation(h.item, &h.owner_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::Unauthorized));

    // Unknown item.
    let err = h
        .svc
        .request_reservation(Uuid::new_v4(), &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::NotFound));

    // Unknown token.
    let err = h
        .svc
        .request_reservation(h.item, &AccessToken::new("nobody"), d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::Unauthenticated));
}

#[tokio::test]
async fn overlapping_requests_may_coexist() {
    let h = harness(d(2025, 5, 1)).await;

    let r1 = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    let r2 = h
        .svc
        .request_reservation(h.item, &h.renter2_token, d(2025, 6, 2), d(2025, 6, 4))
        .await
        .unwrap();

    assert_eq!(r1.status, ReservationStatus::Requested);
    assert_eq!(r2.status, ReservationStatus::Requested);
}

#[tokio::test]
async fn fully_booked_range_is_refused_early() {
    let h = harness(d(2025, 5, 1)).await;

    let r1 = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 5))
        .await
        .unwrap();
    h.svc.decide(r1.id, &h.owner_token, true).await.unwrap();

    // Entirely inside the accepted block.
    let err = h
        .svc
        .request_reservation(h.item, &h.renter2_token, d(2025, 6, 2), d(2025, 6, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::RangeUnavailable));

    // Partial overlap still competes (and will lose at accept time).
    let r2 = h
        .svc
        .request_reservation(h.item, &h.renter2_token, d(2025, 6, 4), d(2025, 6, 8))
        .await
        .unwrap();
    assert_eq!(r2.status, ReservationStatus::Requested);
}

#[tokio::test]
async fn accepting_over_an_accepted_overlap_conflicts() {
    let h = harness(d(2025, 5, 1)).await;

    let r1 = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    h.svc.decide(r1.id, &h.owner_token, true).await.unwrap();

    let r2 = h
        .svc
        .request_reservation(h.item, &h.renter2_token, d(2025, 6, 2), d(2025, 6, 4))
        .await
        .unwrap();
    let err = h.svc.decide(r2.id, &h.owner_token, true).await.unwrap_err();
    assert!(matches!(err, SchedulingError::Conflict));

    // First stays accepted, second stays requested.
    let r1 = h.store.get(r1.id).await.unwrap().unwrap();
    let r2 = h.store.get(r2.id).await.unwrap().unwrap();
    assert_eq!(r1.status, ReservationStatus::Accepted);
    assert_eq!(r2.status, ReservationStatus::Requested);
}

#[tokio::test]
async fn concurrent_accepts_exactly_one_wins() {
    let h = harness(d(2025, 5, 1)).await;

    let r1 = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    let r2 = h
        .svc
        .request_reservation(h.item, &h.renter2_token, d(2025, 6, 2), d(2025, 6, 4))
        .await
        .unwrap();

    let svc_a = h.svc.clone();
    let svc_b = h.svc.clone();
    let tok_a = h.owner_token.clone();
    let tok_b = h.owner_token.clone();

    let a = tokio::spawn(async move { svc_a.decide(r1.id, &tok_a, true).await });
    let b = tokio::spawn(async move { svc_b.decide(r2.id, &tok_b, true).await });

    let res_a = a.await.unwrap();
    let res_b = b.await.unwrap();

    let wins = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one accept may win: {res_a:?} / {res_b:?}");

    let loser = if res_a.is_err() { res_a } else { res_b };
    assert!(matches!(loser.unwrap_err(), SchedulingError::Conflict));

    // The invariant: the accepted set is pairwise non-overlapping.
    let accepted = h
        .store
        .list_for_item(h.item, Some(ReservationStatus::Accepted))
        .await
        .unwrap();
    assert_eq!(accepted.len(), 1);
}

#[tokio::test]
async fn cancel_landing_mid_accept_is_not_overridden() {
    init_logger("scheduler-tests");

    let store = Arc::new(CancelDuringAcceptStore::default());
    let items = Arc::new(MemoryItemStore::default());
    let identity = Arc::new(TokenDirectory::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(FixedClock::at(d(2025, 5, 1)));

    let owner = Uuid::new_v4();
    let renter = Uuid::new_v4();
    let item = Item {
        id: Uuid::new_v4(),
        owner_id: owner,
        nightly_rate: 50,
    };
    items.add(item.clone()).await;

    let owner_token = AccessToken::new("owner");
    let renter_token = AccessToken::new("renter");
    identity.register(&owner_token, owner).await;
    identity.register(&renter_token, renter).await;

    let svc = SchedulingService::with_clock(
        SchedulerConfig::default(),
        store.clone(),
        items,
        identity,
        notifier.clone(),
        clock as Arc<dyn Clock>,
    );

    let r = svc
        .request_reservation(item.id, &renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();

    // The renter's cancel commits between the owner's initial read and the
    // accepted-set snapshot. The accept must observe it, not override it.
    store.cancel_on_next_snapshot(r.id);
    let err = svc.decide(r.id, &owner_token, true).await.unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidTransition { .. }));

    let r = store.get(r.id).await.unwrap().unwrap();
    assert_eq!(r.status, ReservationStatus::Cancelled);

    // No accepted event went out for the dead request.
    let events = notifier.events.lock().await;
    assert!(events.is_empty());
}

#[tokio::test]
async fn cancel_restores_availability() {
    let h = harness(d(2025, 5, 1)).await;

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    h.svc.decide(r.id, &h.owner_token, true).await.unwrap();
    assert!(!h
        .svc
        .query_availability(h.item, d(2025, 6, 1), d(2025, 6, 3))
        .unwrap());

    // One day before the start date, the renter backs out.
    h.clock.set(d(2025, 5, 31));
    let cancelled = h.svc.cancel(r.id, &h.renter_token).await.unwrap();
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    assert!(h
        .svc
        .query_availability(h.item, d(2025, 6, 1), d(2025, 6, 3))
        .unwrap());
}

#[tokio::test]
async fn cancel_after_start_is_refused() {
    let h = harness(d(2025, 5, 1)).await;

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    h.svc.decide(r.id, &h.owner_token, true).await.unwrap();

    h.clock.set(d(2025, 6, 2));
    let err = h.svc.cancel(r.id, &h.renter_token).await.unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidTransition { .. }));

    let r = h.store.get(r.id).await.unwrap().unwrap();
    assert_eq!(r.status, ReservationStatus::Accepted);
}

#[tokio::test]
async fn completion_is_idempotent() {
    let h = harness(d(2025, 5, 1)).await;

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    h.svc.decide(r.id, &h.owner_token, true).await.unwrap();

    // Too early.
    h.clock.set(d(2025, 6, 2));
    let err = h.svc.complete(r.id).await.unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidTransition { .. }));

    h.clock.set(d(2025, 6, 3));
    let first = h.svc.complete(r.id).await.unwrap();
    assert_eq!(first.status, ReservationStatus::Completed);

    let second = h.svc.complete(r.id).await.unwrap();
    assert_eq!(second, first);

    // Only the first completion emitted an event.
    let events = h.notifier.events.lock().await;
    let completed = events
        .iter()
        .filter(|e| e.kind == ReservationEventKind::Completed)
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn terminal_states_refuse_further_transitions() {
    let h = harness(d(2025, 5, 1)).await;

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    h.svc.decide(r.id, &h.owner_token, false).await.unwrap();

    let err = h.svc.decide(r.id, &h.owner_token, true).await.unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidTransition { .. }));

    let err = h.svc.cancel(r.id, &h.renter_token).await.unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidTransition { .. }));

    let r = h.store.get(r.id).await.unwrap().unwrap();
    assert_eq!(r.status, ReservationStatus::Rejected);
}

#[tokio::test]
async fn only_the_owner_decides() {
    let h = harness(d(2025, 5, 1)).await;

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();

    // The renter may cancel but not decide.
    let err = h.svc.decide(r.id, &h.renter_token, true).await.unwrap_err();
    assert!(matches!(err, SchedulingError::Unauthorized));

    // A third party may do neither.
    let err = h.svc.decide(r.id, &h.renter2_token, true).await.unwrap_err();
    assert!(matches!(err, SchedulingError::Unauthorized));
    let err = h.svc.cancel(r.id, &h.renter2_token).await.unwrap_err();
    assert!(matches!(err, SchedulingError::Unauthorized));
}

#[tokio::test]
async fn lifecycle_events_reach_the_notifier() {
    let h = harness(d(2025, 5, 1)).await;

    let r1 = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    let r2 = h
        .svc
        .request_reservation(h.item, &h.renter2_token, d(2025, 7, 1), d(2025, 7, 3))
        .await
        .unwrap();

    h.svc.decide(r1.id, &h.owner_token, true).await.unwrap();
    h.svc.decide(r2.id, &h.owner_token, false).await.unwrap();
    h.svc.cancel(r1.id, &h.renter_token).await.unwrap();

    let events = h.notifier.events.lock().await;
    let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ReservationEventKind::Accepted,
            ReservationEventKind::Rejected,
            ReservationEventKind::Cancelled,
        ]
    );
    assert_eq!(events[0].reservation_id, r1.id);
    assert_eq!(events[0].renter_id, h.renter);
    assert_eq!(events[0].owner_id, h.owner);
    assert_eq!(events[1].reservation_id, r2.id);
    assert_eq!(events[1].renter_id, h.renter2);
}

#[tokio::test]
async fn failing_notifier_does_not_roll_back() {
    let store = Arc::new(MemoryReservationStore::new());
    let items = Arc::new(MemoryItemStore::default());
    let identity = Arc::new(TokenDirectory::default());
    let clock = Arc::new(FixedClock::at(d(2025, 5, 1)));

    let owner = Uuid::new_v4();
    let renter = Uuid::new_v4();
    let item = Item {
        id: Uuid::new_v4(),
        owner_id: owner,
        nightly_rate: 50,
    };
    items.add(item.clone()).await;

    let owner_token = AccessToken::new("owner");
    let renter_token = AccessToken::new("renter");
    identity.register(&owner_token, owner).await;
    identity.register(&renter_token, renter).await;

    let svc = SchedulingService::with_clock(
        SchedulerConfig::default(),
        store.clone(),
        items,
        identity,
        Arc::new(FailingNotifier),
        clock as Arc<dyn Clock>,
    );

    let r = svc
        .request_reservation(item.id, &renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    let accepted = svc.decide(r.id, &owner_token, true).await.unwrap();
    assert_eq!(accepted.status, ReservationStatus::Accepted);
}

#[tokio::test]
async fn blocked_days_follow_the_accepted_set() {
    let h = harness(d(2025, 5, 1)).await;

    assert_eq!(h.svc.blocked_days(h.item).count(), 0);

    let r = h
        .svc
        .request_reservation(h.item, &h.renter_token, d(2025, 6, 1), d(2025, 6, 3))
        .await
        .unwrap();
    // Requested reservations never block.
    assert_eq!(h.svc.blocked_days(h.item).count(), 0);

    h.svc.decide(r.id, &h.owner_token, true).await.unwrap();
    let days: Vec<_> = h.svc.blocked_days(h.item).collect();
    assert_eq!(days, vec![d(2025, 6, 1), d(2025, 6, 2), d(2025, 6, 3)]);
}

#[tokio::test]
async fn query_availability_validates_the_range() {
    let h = harness(d(2025, 5, 1)).await;

    let err = h
        .svc
        .query_availability(h.item, d(2025, 6, 3), d(2025, 6, 1))
        .unwrap_err();
    assert!(matches!(err, SchedulingError::InvalidRange));

    // Unknown items are fully available.
    assert!(h
        .svc
        .query_availability(Uuid::new_v4(), d(2025, 6, 1), d(2025, 6, 3))
        .unwrap());
}
