use thiserror::Error;

use reservation::model::ReservationStatus;
use reservation::store::StoreError;

/// Everything a caller of the scheduling service can get back when an
/// operation is refused. Wording for end users is the surrounding
/// application's concern.
#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("invalid date range")]
    InvalidRange,

    #[error("caller could not be authenticated")]
    Unauthenticated,

    #[error("caller is not allowed to perform this operation")]
    Unauthorized,

    #[error("illegal transition from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("requested range is not available")]
    RangeUnavailable,

    #[error("lost the race for this date range")]
    Conflict,

    #[error("unknown reservation or item")]
    NotFound,

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SchedulingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => SchedulingError::NotFound,
            // The engine's retry loop consumes version conflicts; one leaking
            // through still means the caller lost the race.
            StoreError::VersionConflict => SchedulingError::Conflict,
            other => SchedulingError::Store(other),
        }
    }
}
