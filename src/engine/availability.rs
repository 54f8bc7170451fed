use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::model::*;

use super::EngineError;

// ── Availability Algorithm ────────────────────────────────────────

/// Free-segment sweep: walk from opening to closing time, each occupying
/// booking carves out its slot, every gap becomes a segment. Bookings must
/// be sorted by start (`SpaceState::occupying_on` yields them that way).
/// Adjacent bookings abut directly — no buffer minutes.
pub fn free_segments<'a>(
    hours: DayHours,
    bookings: impl IntoIterator<Item = &'a Booking>,
) -> Vec<FreeSegment> {
    let mut segments = Vec::new();
    let mut cursor = hours.open;

    for booking in bookings {
        let start = booking.slot.start_at.time();
        let end = booking.slot.end_at.time();
        if cursor < start {
            segments.push(FreeSegment {
                start: cursor,
                end: start.min(hours.close),
            });
        }
        cursor = cursor.max(end);
        if cursor >= hours.close {
            return segments;
        }
    }

    if cursor < hours.close {
        segments.push(FreeSegment {
            start: cursor,
            end: hours.close,
        });
    }
    segments
}

/// First booking (by start time) whose slot overlaps the query window.
/// Multiple conflicts are not aggregated — the earliest one is the answer.
pub fn find_conflict<'a>(
    query: &Slot,
    bookings: impl IntoIterator<Item = &'a Booking>,
) -> Option<&'a Booking> {
    bookings.into_iter().find(|b| query.overlaps(&b.slot))
}

/// Full-day free/busy picture for a space. Empty when the date is blacked
/// out or the space is closed that day; administrative status does not
/// affect the sweep.
pub fn day_view(state: &SpaceState, blackouts: &[Blackout], date: NaiveDate) -> Vec<FreeSegment> {
    if blackouts.iter().any(|b| b.covers_date(date)) {
        return Vec::new();
    }
    let Some(hours) = state.space.opening_hours.for_day(date.weekday()) else {
        return Vec::new();
    };
    free_segments(hours, state.occupying_on(date))
}

/// Verdict for one query window, first failing rule wins:
/// blackout → closed → administrative status → outside hours → conflict.
/// Free segments ride along whenever the day has hours and is not blacked
/// out, so callers can show alternatives next to a refusal.
pub fn availability(
    state: &SpaceState,
    blackouts: &[Blackout],
    date: NaiveDate,
    query_start: NaiveTime,
    query_end: NaiveTime,
) -> AvailabilityResult {
    if let Some(blackout) = blackouts.iter().find(|b| b.covers_date(date)) {
        return AvailabilityResult {
            available: false,
            free: Vec::new(),
            reason: Some(format!("Blackout: {}", blackout.title)),
        };
    }

    let Some(hours) = state.space.opening_hours.for_day(date.weekday()) else {
        return AvailabilityResult {
            available: false,
            free: Vec::new(),
            reason: Some("closed all day".into()),
        };
    };

    if state.space.status != SpaceStatus::Available {
        // Administrative state, not occupancy — segments still reported.
        return AvailabilityResult {
            available: false,
            free: free_segments(hours, state.occupying_on(date)),
            reason: Some(format!("space is {}", state.space.status)),
        };
    }

    if query_start < hours.open || query_end > hours.close {
        return AvailabilityResult {
            available: false,
            free: Vec::new(),
            reason: Some(
                EngineError::OutsideHours {
                    open: hours.open,
                    close: hours.close,
                }
                .to_string(),
            ),
        };
    }

    let free = free_segments(hours, state.occupying_on(date));
    let query = Slot::new(date.and_time(query_start), date.and_time(query_end));

    if let Some(conflict) = find_conflict(&query, state.occupying_on(date)) {
        return AvailabilityResult {
            available: false,
            free,
            reason: Some(
                EngineError::SlotTaken {
                    user_id: conflict.user_id,
                    start: conflict.slot.start_at.time(),
                    end: conflict.slot.end_at.time(),
                }
                .to_string(),
            ),
        };
    }

    AvailabilityResult {
        available: true,
        free,
        reason: None,
    }
}
