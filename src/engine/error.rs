use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use ulid::Ulid;

use crate::model::{fmt_hhmm, BookingAction, BookingStatus, SpaceStatus};

/// Everything the engine can refuse to do, one variant per
/// user-distinguishable failure. Infrastructure trouble only ever surfaces
/// as `WalError`.
#[derive(Debug)]
pub enum EngineError {
    StartNotBeforeEnd,
    InPast,
    SpaceNotFound(Ulid),
    BookingNotFound(Ulid),
    BlackoutNotFound(Ulid),
    SpaceUnavailable(SpaceStatus),
    BlackoutDay {
        date: NaiveDate,
        title: String,
    },
    /// Opening hours are entirely undefined for the space.
    NoHoursToday,
    ClosedToday(Weekday),
    OutsideHours {
        open: NaiveTime,
        close: NaiveTime,
    },
    DurationExceeded {
        requested_min: i64,
        max_min: u32,
    },
    SlotTaken {
        user_id: Ulid,
        start: NaiveTime,
        end: NaiveTime,
    },
    InvalidTransition {
        status: BookingStatus,
        action: BookingAction,
    },
    CodeRequired,
    CodeMismatch,
    CodeNotYetValid(NaiveDateTime),
    CodeExpired(NaiveDateTime),
    AlreadyExists(Ulid),
    SpaceHasBookings(usize),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use BookingAction::*;
        use BookingStatus::*;
        match self {
            EngineError::StartNotBeforeEnd => write!(f, "start must precede end"),
            EngineError::InPast => write!(f, "cannot book past time"),
            EngineError::SpaceNotFound(id) => write!(f, "space not found: {id}"),
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::BlackoutNotFound(id) => write!(f, "blackout not found: {id}"),
            EngineError::SpaceUnavailable(status) => write!(f, "space is {status}"),
            EngineError::BlackoutDay { date, title } => {
                write!(f, "date {date} is a holiday: {title}")
            }
            EngineError::NoHoursToday => write!(f, "space has no operating hours today"),
            EngineError::ClosedToday(day) => write!(f, "space is closed on {day}"),
            EngineError::OutsideHours { open, close } => {
                write!(
                    f,
                    "outside operating hours {}-{}",
                    fmt_hhmm(*open),
                    fmt_hhmm(*close)
                )
            }
            EngineError::DurationExceeded {
                requested_min,
                max_min,
            } => {
                write!(
                    f,
                    "booking of {requested_min} minutes exceeds maximum duration of {max_min} minutes"
                )
            }
            EngineError::SlotTaken {
                user_id,
                start,
                end,
            } => {
                write!(
                    f,
                    "already booked by {user_id} from {} to {}",
                    fmt_hhmm(*start),
                    fmt_hhmm(*end)
                )
            }
            EngineError::InvalidTransition { status, action } => {
                let msg = match (status, action) {
                    (Cancelled, CheckIn) => "booking is cancelled, cannot check in",
                    (CheckedIn, CheckIn) => "already checked in",
                    (Finished, CheckIn) => "booking already finished, cannot check in",
                    (Cancelled, CheckOut) => "booking is cancelled, cannot check out",
                    (Finished, CheckOut) => "booking already finished",
                    (Active, CheckOut) => "must check in before checking out",
                    (Cancelled, Cancel) => "booking is already cancelled",
                    (CheckedIn, Cancel) => "cannot cancel after check-in",
                    (Finished, Cancel) => "cannot cancel a finished booking",
                    _ => return write!(f, "cannot {action} a booking in status {status}"),
                };
                f.write_str(msg)
            }
            EngineError::CodeRequired => write!(f, "check-in code is required"),
            EngineError::CodeMismatch => write!(f, "invalid check-in code"),
            EngineError::CodeNotYetValid(from) => write!(f, "check-in opens at {from}"),
            EngineError::CodeExpired(to) => write!(f, "check-in window closed at {to}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::SpaceHasBookings(n) => {
                write!(f, "cannot delete space: {n} live booking(s)")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
