//! Validates reservation lifecycle transitions.
//
//  This module is deliberately pure: no async, no IO. The one precondition it
//  does NOT enforce is the accept-time overlap check, which must run inside
//  the store's atomic compare-and-write (see `engine`).

use chrono::NaiveDate;

use catalog::types::UserId;
use reservation::model::{Reservation, ReservationStatus};

use crate::error::SchedulingError;

/// Who is attempting the transition, as seen by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Renter,
    Owner,
    /// The background clock driving automatic completion.
    System,
}

/// Map a caller id to its role on this reservation, or `None` for a
/// stranger.
pub fn resolve_actor(reservation: &Reservation, owner_id: UserId, caller: UserId) -> Option<Actor> {
    if caller == reservation.renter_id {
        Some(Actor::Renter)
    } else if caller == owner_id {
        Some(Actor::Owner)
    } else {
        None
    }
}

/// Check whether `reservation` may move to `target`, attempted by `actor` on
/// `today`. Leaves the reservation untouched; the caller commits the write.
pub fn check_transition(
    reservation: &Reservation,
    target: ReservationStatus,
    actor: Actor,
    today: NaiveDate,
) -> Result<(), SchedulingError> {
    use ReservationStatus::*;

    let from = reservation.status;

    let illegal = || SchedulingError::InvalidTransition { from, to: target };

    if from.is_terminal() {
        return Err(illegal());
    }

    match (from, target) {
        (Requested, Accepted) | (Requested, Rejected) => {
            if actor != Actor::Owner {
                return Err(SchedulingError::Unauthorized);
            }
            Ok(())
        }

        (Requested, Cancelled) | (Accepted, Cancelled) => {
            if !matches!(actor, Actor::Renter | Actor::Owner) {
                return Err(SchedulingError::Unauthorized);
            }
            // No cancelling an in-progress or past rental.
            if today >= reservation.range.start() {
                return Err(illegal());
            }
            Ok(())
        }

        (Accepted, Completed) => {
            if !matches!(actor, Actor::Owner | Actor::System) {
                return Err(SchedulingError::Unauthorized);
            }
            if today < reservation.range.end() {
                return Err(illegal());
            }
            Ok(())
        }

        _ => Err(illegal()),
    }
}
