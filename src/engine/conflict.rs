use chrono::{Datelike, NaiveDateTime};

use crate::limits::*;
use crate::model::*;

use super::availability::find_conflict;
use super::EngineError;

/// Local wall-clock now — the engine works in the spaces' local timezone.
pub(crate) fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

pub(crate) fn validate_slot(slot: &Slot) -> Result<(), EngineError> {
    let years = [slot.start_at.year(), slot.end_at.year()];
    if years.iter().any(|y| *y < MIN_VALID_YEAR || *y > MAX_VALID_YEAR) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if slot.duration_minutes() > MAX_SLOT_MINUTES {
        return Err(EngineError::LimitExceeded("slot too wide"));
    }
    Ok(())
}

/// Overlap guard for the create path. Runs while the caller holds the
/// space's write lock, so check-then-insert is race-free.
pub(crate) fn check_no_conflict(state: &SpaceState, slot: &Slot) -> Result<(), EngineError> {
    if let Some(conflict) = find_conflict(slot, state.occupying_on(slot.date())) {
        return Err(EngineError::SlotTaken {
            user_id: conflict.user_id,
            start: conflict.slot.start_at.time(),
            end: conflict.slot.end_at.time(),
        });
    }
    Ok(())
}
