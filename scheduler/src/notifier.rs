use catalog::types::{ItemId, ReservationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationEventKind {
    Accepted,
    Rejected,
    Cancelled,
    Completed,
}

/// Lifecycle event pushed to the external notifier after a committed
/// transition. Carries both affected users so the consumer can fan out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationEvent {
    pub kind: ReservationEventKind,
    pub reservation_id: ReservationId,
    pub item_id: ItemId,
    pub renter_id: UserId,
    pub owner_id: UserId,
}

/// One-way sink for lifecycle events. Fire-and-forget: a failing notifier
/// must never roll back the state transition that produced the event.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: ReservationEvent) -> anyhow::Result<()>;
}
