use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open interval `[start_at, end_at)` of local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
}

impl Slot {
    pub fn new(start_at: NaiveDateTime, end_at: NaiveDateTime) -> Self {
        debug_assert!(start_at < end_at, "Slot start must be before end");
        Self { start_at, end_at }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end_at - self.start_at).num_minutes()
    }

    /// Half-open overlap: touching endpoints do not conflict.
    pub fn overlaps(&self, other: &Slot) -> bool {
        self.start_at < other.end_at && other.start_at < self.end_at
    }

    /// The calendar date a slot belongs to (its start date — opening hours
    /// keep bookings inside one day).
    pub fn date(&self) -> NaiveDate {
        self.start_at.date()
    }
}

// ── Time parsing ─────────────────────────────────────────────────

/// Input/format error raised before anything reaches the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError(pub String);

impl std::fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid datetime: {}", self.0)
    }
}

impl std::error::Error for TimeParseError {}

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a local datetime in any of the accepted wire formats
/// (`YYYY-MM-DD HH:MM[:SS]`, space or `T` separator).
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, TimeParseError> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    Err(TimeParseError(format!(
        "{s:?} — use YYYY-MM-DD HH:MM:SS or ISO format"
    )))
}

/// Parse a time-of-day in `HH:MM` form.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime, TimeParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| TimeParseError(format!("{s:?} — use HH:MM")))
}

pub fn fmt_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

// ── Opening hours ────────────────────────────────────────────────

/// One day's operating window. Bookings must start at or after `open`
/// and end at or before `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayHours {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl DayHours {
    pub fn new(open: NaiveTime, close: NaiveTime) -> Self {
        debug_assert!(open < close, "DayHours open must be before close");
        Self { open, close }
    }
}

/// Weekly operating hours: a fixed Mon..Sun mapping, `None` = closed.
///
/// Management tooling exchanges the weekday-keyed JSON shape
/// (`{"mon": {"start": "08:00", "end": "18:00"}, "sat": null, ...}`);
/// a missing key means the same as an explicit `null`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpeningHours {
    days: [Option<DayHours>; 7],
}

#[derive(Serialize, Deserialize)]
struct DayHoursWire {
    start: String,
    end: String,
}

#[derive(Serialize, Deserialize, Default)]
struct OpeningHoursWire {
    #[serde(default)]
    mon: Option<DayHoursWire>,
    #[serde(default)]
    tue: Option<DayHoursWire>,
    #[serde(default)]
    wed: Option<DayHoursWire>,
    #[serde(default)]
    thu: Option<DayHoursWire>,
    #[serde(default)]
    fri: Option<DayHoursWire>,
    #[serde(default)]
    sat: Option<DayHoursWire>,
    #[serde(default)]
    sun: Option<DayHoursWire>,
}

impl OpeningHours {
    /// All seven days closed.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Same `open..close` window every day of the week.
    pub fn every_day(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            days: [Some(DayHours::new(open, close)); 7],
        }
    }

    /// Monday..Friday `open..close`, weekend closed.
    pub fn weekdays(open: NaiveTime, close: NaiveTime) -> Self {
        let mut hours = Self::closed();
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ] {
            hours.set(day, Some(DayHours::new(open, close)));
        }
        hours
    }

    pub fn for_day(&self, day: Weekday) -> Option<DayHours> {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn set(&mut self, day: Weekday, hours: Option<DayHours>) {
        self.days[day.num_days_from_monday() as usize] = hours;
    }

    /// True when every day is closed.
    pub fn is_always_closed(&self) -> bool {
        self.days.iter().all(Option::is_none)
    }

    pub fn from_json(json: &str) -> Result<Self, TimeParseError> {
        let wire: OpeningHoursWire = serde_json::from_str(json)
            .map_err(|e| TimeParseError(format!("opening hours: {e}")))?;
        let mut hours = Self::closed();
        let entries = [
            (Weekday::Mon, wire.mon),
            (Weekday::Tue, wire.tue),
            (Weekday::Wed, wire.wed),
            (Weekday::Thu, wire.thu),
            (Weekday::Fri, wire.fri),
            (Weekday::Sat, wire.sat),
            (Weekday::Sun, wire.sun),
        ];
        for (day, entry) in entries {
            if let Some(w) = entry {
                let open = parse_hhmm(&w.start)?;
                let close = parse_hhmm(&w.end)?;
                if open >= close {
                    return Err(TimeParseError(format!(
                        "opening hours for {day}: {} is not before {}",
                        w.start, w.end
                    )));
                }
                hours.set(day, Some(DayHours::new(open, close)));
            }
        }
        Ok(hours)
    }

    pub fn to_json(&self) -> String {
        let wire_day = |d: Option<DayHours>| {
            d.map(|h| DayHoursWire {
                start: fmt_hhmm(h.open),
                end: fmt_hhmm(h.close),
            })
        };
        let wire = OpeningHoursWire {
            mon: wire_day(self.days[0]),
            tue: wire_day(self.days[1]),
            wed: wire_day(self.days[2]),
            thu: wire_day(self.days[3]),
            fri: wire_day(self.days[4]),
            sat: wire_day(self.days[5]),
            sun: wire_day(self.days[6]),
        };
        serde_json::to_string(&wire).expect("opening hours serialize")
    }
}

// ── Spaces ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    HotDesk,
    PrivateRoom,
    MeetingRoom,
}

impl std::fmt::Display for SpaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SpaceKind::HotDesk => "hot_desk",
            SpaceKind::PrivateRoom => "private_room",
            SpaceKind::MeetingRoom => "meeting_room",
        })
    }
}

/// Administrative state, independent of time-slot occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceStatus {
    Available,
    InMaintenance,
    Booked,
}

impl std::fmt::Display for SpaceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SpaceStatus::Available => "available",
            SpaceStatus::InMaintenance => "in_maintenance",
            SpaceStatus::Booked => "booked",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub id: Ulid,
    pub name: String,
    pub kind: SpaceKind,
    pub capacity: u32,
    /// Floor reference — identity only, floors are managed elsewhere.
    pub floor_id: Option<Ulid>,
    pub opening_hours: OpeningHours,
    /// Cap on a single booking's length, in minutes.
    pub max_duration_min: Option<u32>,
    pub status: SpaceStatus,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Active,
    CheckedIn,
    Finished,
    Cancelled,
}

impl BookingStatus {
    /// Only active and checked-in bookings occupy their time slot.
    pub fn occupies_slot(&self) -> bool {
        matches!(self, BookingStatus::Active | BookingStatus::CheckedIn)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Finished | BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BookingStatus::Active => "active",
            BookingStatus::CheckedIn => "checkin",
            BookingStatus::Finished => "finished",
            BookingStatus::Cancelled => "cancelled",
        })
    }
}

/// Lifecycle action requested against an existing booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    CheckIn,
    CheckOut,
    Cancel,
}

impl std::fmt::Display for BookingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BookingAction::CheckIn => "checkin",
            BookingAction::CheckOut => "checkout",
            BookingAction::Cancel => "cancel",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub space_id: Ulid,
    pub status: BookingStatus,
    pub slot: Slot,
    /// Space's cap at creation time — later space edits never retroactively
    /// invalidate an existing booking.
    pub max_duration_snapshot: Option<u32>,
    /// Opaque one-time token, `CHK-` + 8 uppercase alphanumerics.
    pub checkin_code: String,
    pub code_valid_from: NaiveDateTime,
    pub code_valid_to: NaiveDateTime,
    pub checkin_at: Option<NaiveDateTime>,
    pub checkout_at: Option<NaiveDateTime>,
}

impl Booking {
    /// Check-in window test; both endpoints are inclusive.
    pub fn code_window_contains(&self, now: NaiveDateTime) -> bool {
        self.code_valid_from <= now && now <= self.code_valid_to
    }
}

// ── Blackouts ────────────────────────────────────────────────────

/// A calendar period during which no space may be booked, regardless of
/// per-space hours. Global, not per-space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blackout {
    pub id: Ulid,
    pub title: String,
    /// Inclusive range; whole-day blackouts start at 00:00.
    pub start_at: NaiveDateTime,
    pub end_at: NaiveDateTime,
    pub created_by: Ulid,
}

impl Blackout {
    /// A date is covered when the range contains that date's midnight.
    pub fn covers_date(&self, date: NaiveDate) -> bool {
        let midnight = date.and_time(NaiveTime::MIN);
        self.start_at <= midnight && midnight <= self.end_at
    }
}

// ── Per-space state ──────────────────────────────────────────────

/// A space plus its booking history, sorted by `slot.start_at`.
#[derive(Debug, Clone)]
pub struct SpaceState {
    pub space: Space,
    pub bookings: Vec<Booking>,
}

impl SpaceState {
    pub fn new(space: Space) -> Self {
        Self {
            space,
            bookings: Vec::new(),
        }
    }

    /// Insert maintaining sort order by slot start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.slot.start_at, |b| b.slot.start_at)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Slot-occupying bookings (active/checked-in) on `date`, in start order.
    pub fn occupying_on(&self, date: NaiveDate) -> impl Iterator<Item = &Booking> {
        self.bookings
            .iter()
            .filter(move |b| b.status.occupies_slot() && b.slot.date() == date)
    }

    /// Count of bookings that still hold or will hold the space.
    pub fn live_booking_count(&self) -> usize {
        self.bookings
            .iter()
            .filter(|b| b.status.occupies_slot())
            .count()
    }
}

// ── Events ───────────────────────────────────────────────────────

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SpaceCreated {
        space: Space,
    },
    SpaceStatusSet {
        space_id: Ulid,
        status: SpaceStatus,
    },
    SpaceDeleted {
        space_id: Ulid,
    },
    BlackoutAdded {
        blackout: Blackout,
    },
    BlackoutRemoved {
        blackout_id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingCheckedIn {
        booking_id: Ulid,
        space_id: Ulid,
        at: NaiveDateTime,
    },
    BookingCheckedOut {
        booking_id: Ulid,
        space_id: Ulid,
        at: NaiveDateTime,
    },
    BookingCancelled {
        booking_id: Ulid,
        space_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

/// One gap in a space's day, between opening time, bookings, and closing time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeSegment {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl std::fmt::Display for FreeSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", fmt_hhmm(self.start), fmt_hhmm(self.end))
    }
}

/// Verdict for a specific query window plus the full day's free/busy picture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub available: bool,
    pub free: Vec<FreeSegment>,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        parse_datetime(s).unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    #[test]
    fn slot_basics() {
        let s = Slot::new(dt("2025-01-06 10:00"), dt("2025-01-06 12:00"));
        assert_eq!(s.duration_minutes(), 120);
        assert_eq!(s.date(), NaiveDate::from_ymd_opt(2025, 1, 6).unwrap());
    }

    #[test]
    fn slot_overlap_is_symmetric() {
        let a = Slot::new(dt("2025-01-06 10:00"), dt("2025-01-06 12:00"));
        let b = Slot::new(dt("2025-01-06 11:00"), dt("2025-01-06 13:00"));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn slot_touching_endpoints_do_not_overlap() {
        let a = Slot::new(dt("2025-01-06 10:00"), dt("2025-01-06 12:00"));
        let b = Slot::new(dt("2025-01-06 12:00"), dt("2025-01-06 13:00"));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn parse_datetime_all_formats() {
        for s in [
            "2025-01-06 10:00:00",
            "2025-01-06T10:00:00",
            "2025-01-06 10:00",
            "2025-01-06T10:00",
        ] {
            assert_eq!(parse_datetime(s).unwrap(), dt("2025-01-06 10:00"));
        }
    }

    #[test]
    fn parse_datetime_rejects_garbage() {
        assert!(parse_datetime("06/01/2025 10:00").is_err());
        assert!(parse_datetime("").is_err());
        assert!(parse_hhmm("25:99").is_err());
    }

    #[test]
    fn opening_hours_lookup() {
        let hours = OpeningHours::weekdays(t("08:00"), t("18:00"));
        assert_eq!(
            hours.for_day(Weekday::Mon),
            Some(DayHours::new(t("08:00"), t("18:00")))
        );
        assert_eq!(hours.for_day(Weekday::Sat), None);
        assert!(!hours.is_always_closed());
        assert!(OpeningHours::closed().is_always_closed());
    }

    #[test]
    fn opening_hours_json_roundtrip() {
        let hours = OpeningHours::weekdays(t("08:00"), t("18:00"));
        let json = hours.to_json();
        assert_eq!(OpeningHours::from_json(&json).unwrap(), hours);
        // closed days serialize as explicit nulls
        assert!(json.contains("\"sat\":null"));
    }

    #[test]
    fn opening_hours_missing_key_means_closed() {
        let hours =
            OpeningHours::from_json(r#"{"mon": {"start": "09:00", "end": "17:00"}}"#).unwrap();
        assert_eq!(
            hours.for_day(Weekday::Mon),
            Some(DayHours::new(t("09:00"), t("17:00")))
        );
        for day in [Weekday::Tue, Weekday::Sun] {
            assert_eq!(hours.for_day(day), None);
        }
    }

    #[test]
    fn opening_hours_rejects_inverted_window() {
        let err = OpeningHours::from_json(r#"{"mon": {"start": "18:00", "end": "08:00"}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn blackout_covers_midnight_of_date() {
        let b = Blackout {
            id: Ulid::new(),
            title: "Office holiday".into(),
            start_at: dt("2025-12-24 00:00"),
            end_at: dt("2025-12-26 23:59"),
            created_by: Ulid::new(),
        };
        assert!(b.covers_date(NaiveDate::from_ymd_opt(2025, 12, 24).unwrap()));
        assert!(b.covers_date(NaiveDate::from_ymd_opt(2025, 12, 26).unwrap()));
        assert!(!b.covers_date(NaiveDate::from_ymd_opt(2025, 12, 27).unwrap()));
        // a blackout starting mid-morning does not cover its own start date
        let late = Blackout {
            start_at: dt("2025-12-24 09:00"),
            ..b
        };
        assert!(!late.covers_date(NaiveDate::from_ymd_opt(2025, 12, 24).unwrap()));
    }

    fn make_booking(start: &str, end: &str, status: BookingStatus) -> Booking {
        let slot = Slot::new(dt(start), dt(end));
        Booking {
            id: Ulid::new(),
            user_id: Ulid::new(),
            space_id: Ulid::new(),
            status,
            slot,
            max_duration_snapshot: None,
            checkin_code: "CHK-TESTTEST".into(),
            code_valid_from: slot.start_at - chrono::Duration::minutes(15),
            code_valid_to: slot.end_at + chrono::Duration::minutes(15),
            checkin_at: None,
            checkout_at: None,
        }
    }

    fn make_space() -> Space {
        Space {
            id: Ulid::new(),
            name: "Room A".into(),
            kind: SpaceKind::MeetingRoom,
            capacity: 4,
            floor_id: None,
            opening_hours: OpeningHours::weekdays(t("08:00"), t("18:00")),
            max_duration_min: None,
            status: SpaceStatus::Available,
        }
    }

    #[test]
    fn insert_booking_keeps_start_order() {
        let mut state = SpaceState::new(make_space());
        state.insert_booking(make_booking(
            "2025-01-06 14:00",
            "2025-01-06 15:00",
            BookingStatus::Active,
        ));
        state.insert_booking(make_booking(
            "2025-01-06 09:00",
            "2025-01-06 10:00",
            BookingStatus::Active,
        ));
        state.insert_booking(make_booking(
            "2025-01-06 11:00",
            "2025-01-06 12:00",
            BookingStatus::Active,
        ));
        let starts: Vec<_> = state.bookings.iter().map(|b| b.slot.start_at).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn occupying_on_skips_terminal_and_other_dates() {
        let mut state = SpaceState::new(make_space());
        state.insert_booking(make_booking(
            "2025-01-06 09:00",
            "2025-01-06 10:00",
            BookingStatus::Cancelled,
        ));
        state.insert_booking(make_booking(
            "2025-01-06 10:00",
            "2025-01-06 11:00",
            BookingStatus::CheckedIn,
        ));
        state.insert_booking(make_booking(
            "2025-01-07 10:00",
            "2025-01-07 11:00",
            BookingStatus::Active,
        ));
        let date = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        let hits: Vec<_> = state.occupying_on(date).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status, BookingStatus::CheckedIn);
    }

    #[test]
    fn code_window_inclusive_bounds() {
        let b = make_booking("2025-01-06 10:00", "2025-01-06 12:00", BookingStatus::Active);
        assert!(b.code_window_contains(dt("2025-01-06 09:45")));
        assert!(b.code_window_contains(dt("2025-01-06 12:15")));
        assert!(!b.code_window_contains(dt("2025-01-06 09:44")));
        assert!(!b.code_window_contains(dt("2025-01-06 12:16")));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingCancelled {
            booking_id: Ulid::new(),
            space_id: Ulid::new(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
