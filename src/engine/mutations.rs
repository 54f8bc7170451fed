use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDateTime};
use dashmap::mapref::entry::Entry;
use rand::rngs::OsRng;
use rand::Rng;
use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now_local, validate_slot};
use super::{Engine, EngineError, WalCommand};

/// Check-in window padding on each side of the slot, in minutes.
const CODE_WINDOW_MIN: i64 = 15;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// `CHK-` + 8 random uppercase alphanumerics from the OS entropy source.
fn generate_checkin_code() -> String {
    let mut rng = OsRng;
    let tail: String = (0..8)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect();
    format!("CHK-{tail}")
}

impl Engine {
    // ── Space management ─────────────────────────────────

    pub async fn create_space(&self, space: Space) -> Result<(), EngineError> {
        if self.state.len() >= MAX_SPACES {
            return Err(EngineError::LimitExceeded("too many spaces"));
        }
        if space.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("space name too long"));
        }
        if self.state.contains_key(&space.id) {
            return Err(EngineError::AlreadyExists(space.id));
        }

        let event = Event::SpaceCreated {
            space: space.clone(),
        };
        self.wal_append(&event).await?;
        self.state
            .insert(space.id, Arc::new(RwLock::new(SpaceState::new(space))));
        Ok(())
    }

    /// Administrative toggle; does not touch any booking.
    pub async fn set_space_status(
        &self,
        space_id: Ulid,
        status: SpaceStatus,
    ) -> Result<(), EngineError> {
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let mut guard = state.write().await;
        let event = Event::SpaceStatusSet { space_id, status };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Refused while the space still has active or checked-in bookings —
    /// the caller must cancel or finish them first.
    pub async fn delete_space(&self, space_id: Ulid) -> Result<(), EngineError> {
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = state.read().await;
        let live = guard.live_booking_count();
        if live > 0 {
            return Err(EngineError::SpaceHasBookings(live));
        }
        let booking_ids: Vec<Ulid> = guard.bookings.iter().map(|b| b.id).collect();
        let codes: Vec<String> = guard.bookings.iter().map(|b| b.checkin_code.clone()).collect();
        drop(guard);

        let event = Event::SpaceDeleted { space_id };
        self.wal_append(&event).await?;
        self.state.remove(&space_id);
        for id in booking_ids {
            self.booking_to_space.remove(&id);
        }
        for code in codes {
            self.codes.remove(&code);
        }
        Ok(())
    }

    // ── Blackout calendar ────────────────────────────────

    pub async fn add_blackout(&self, blackout: Blackout) -> Result<(), EngineError> {
        if blackout.title.len() > MAX_TITLE_LEN {
            return Err(EngineError::LimitExceeded("blackout title too long"));
        }
        if blackout.start_at > blackout.end_at {
            return Err(EngineError::StartNotBeforeEnd);
        }
        let mut guard = self.blackouts.write().await;
        if guard.len() >= MAX_BLACKOUTS {
            return Err(EngineError::LimitExceeded("too many blackouts"));
        }
        if guard.iter().any(|b| b.id == blackout.id) {
            return Err(EngineError::AlreadyExists(blackout.id));
        }
        let event = Event::BlackoutAdded {
            blackout: blackout.clone(),
        };
        self.wal_append(&event).await?;
        guard.push(blackout);
        Ok(())
    }

    pub async fn remove_blackout(&self, blackout_id: Ulid) -> Result<(), EngineError> {
        let mut guard = self.blackouts.write().await;
        let pos = guard
            .iter()
            .position(|b| b.id == blackout_id)
            .ok_or(EngineError::BlackoutNotFound(blackout_id))?;
        let event = Event::BlackoutRemoved { blackout_id };
        self.wal_append(&event).await?;
        guard.remove(pos);
        Ok(())
    }

    // ── Booking lifecycle ────────────────────────────────

    /// Validate and create a booking. Fail fast, first failing rule wins:
    /// inverted slot → past start → space exists → administrative status →
    /// blackout → closed day → outside hours → duration cap → overlap.
    pub async fn create_booking(
        &self,
        user_id: Ulid,
        space_id: Ulid,
        start_at: NaiveDateTime,
        end_at: NaiveDateTime,
    ) -> Result<Booking, EngineError> {
        let result = self
            .create_booking_checked(user_id, space_id, start_at, end_at)
            .await;
        match &result {
            Ok(booking) => {
                metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
                tracing::info!(
                    "booking {} created: space {space_id}, {} to {}",
                    booking.id,
                    booking.slot.start_at,
                    booking.slot.end_at
                );
            }
            Err(EngineError::WalError(_)) => {}
            Err(_) => {
                metrics::counter!(crate::observability::BOOKINGS_REJECTED_TOTAL).increment(1);
            }
        }
        result
    }

    async fn create_booking_checked(
        &self,
        user_id: Ulid,
        space_id: Ulid,
        start_at: NaiveDateTime,
        end_at: NaiveDateTime,
    ) -> Result<Booking, EngineError> {
        if start_at >= end_at {
            return Err(EngineError::StartNotBeforeEnd);
        }
        let slot = Slot::new(start_at, end_at);
        validate_slot(&slot)?;
        if start_at < now_local() {
            return Err(EngineError::InPast);
        }

        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;

        // Critical section: the overlap check and the insert happen under one
        // write lock, so two racing requests for the same space serialize and
        // the loser sees the winner's booking.
        let mut guard = state.write_owned().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_SPACE {
            return Err(EngineError::LimitExceeded("too many bookings on space"));
        }

        if guard.space.status != SpaceStatus::Available {
            return Err(EngineError::SpaceUnavailable(guard.space.status));
        }

        let date = slot.date();
        {
            let blackouts = self.blackouts.read().await;
            if let Some(b) = blackouts.iter().find(|b| b.covers_date(date)) {
                return Err(EngineError::BlackoutDay {
                    date,
                    title: b.title.clone(),
                });
            }
        }

        if guard.space.opening_hours.is_always_closed() {
            return Err(EngineError::NoHoursToday);
        }
        let weekday = date.weekday();
        let Some(hours) = guard.space.opening_hours.for_day(weekday) else {
            return Err(EngineError::ClosedToday(weekday));
        };
        // A slot can only sit inside one day's operating window.
        if end_at.date() != date || start_at.time() < hours.open || end_at.time() > hours.close {
            return Err(EngineError::OutsideHours {
                open: hours.open,
                close: hours.close,
            });
        }

        if let Some(max) = guard.space.max_duration_min
            && slot.duration_minutes() > max as i64
        {
            return Err(EngineError::DurationExceeded {
                requested_min: slot.duration_minutes(),
                max_min: max,
            });
        }

        check_no_conflict(&guard, &slot)?;

        let booking_id = Ulid::new();
        let code = self.reserve_checkin_code(booking_id);
        let booking = Booking {
            id: booking_id,
            user_id,
            space_id,
            status: BookingStatus::Active,
            slot,
            max_duration_snapshot: guard.space.max_duration_min,
            checkin_code: code.clone(),
            code_valid_from: start_at - Duration::minutes(CODE_WINDOW_MIN),
            code_valid_to: end_at + Duration::minutes(CODE_WINDOW_MIN),
            checkin_at: None,
            checkout_at: None,
        };

        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            self.codes.remove(&code);
            return Err(e);
        }
        drop(guard);

        self.announce(&booking);
        Ok(booking)
    }

    /// Claim a fresh unique check-in code. Collisions are astronomically
    /// rare; the entry API makes the claim atomic anyway.
    fn reserve_checkin_code(&self, booking_id: Ulid) -> String {
        loop {
            let code = generate_checkin_code();
            match self.codes.entry(code.clone()) {
                Entry::Vacant(v) => {
                    v.insert(booking_id);
                    return code;
                }
                Entry::Occupied(_) => continue,
            }
        }
    }

    /// Drive the booking state machine. All transitions are validated against
    /// the persisted state, never against anything the client claims.
    pub async fn update_booking_status(
        &self,
        booking_id: Ulid,
        action: BookingAction,
        checkin_code: Option<&str>,
    ) -> Result<Booking, EngineError> {
        let (space_id, mut guard) = self.resolve_booking_write(&booking_id).await?;
        let booking = guard
            .booking(booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?
            .clone();
        let now = now_local();

        let event = match action {
            BookingAction::CheckIn => {
                if booking.status != BookingStatus::Active {
                    return Err(EngineError::InvalidTransition {
                        status: booking.status,
                        action,
                    });
                }
                let Some(code) = checkin_code else {
                    return Err(EngineError::CodeRequired);
                };
                if code != booking.checkin_code {
                    return Err(EngineError::CodeMismatch);
                }
                if now < booking.code_valid_from {
                    return Err(EngineError::CodeNotYetValid(booking.code_valid_from));
                }
                if now > booking.code_valid_to {
                    return Err(EngineError::CodeExpired(booking.code_valid_to));
                }
                Event::BookingCheckedIn {
                    booking_id,
                    space_id,
                    at: now,
                }
            }
            BookingAction::CheckOut => {
                if booking.status != BookingStatus::CheckedIn {
                    return Err(EngineError::InvalidTransition {
                        status: booking.status,
                        action,
                    });
                }
                Event::BookingCheckedOut {
                    booking_id,
                    space_id,
                    at: now,
                }
            }
            BookingAction::Cancel => {
                if booking.status != BookingStatus::Active {
                    return Err(EngineError::InvalidTransition {
                        status: booking.status,
                        action,
                    });
                }
                Event::BookingCancelled {
                    booking_id,
                    space_id,
                }
            }
        };

        self.persist_and_apply(&mut guard, &event).await?;
        let updated = guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        drop(guard);

        match action {
            BookingAction::CheckIn => {
                metrics::counter!(crate::observability::CHECKINS_TOTAL).increment(1);
            }
            BookingAction::CheckOut => {
                metrics::counter!(crate::observability::CHECKOUTS_TOTAL).increment(1);
                self.announce(&updated);
            }
            BookingAction::Cancel => {
                metrics::counter!(crate::observability::CANCELLATIONS_TOTAL).increment(1);
                self.announce(&updated);
            }
        }
        Ok(updated)
    }

    /// Active bookings whose check-in window has lapsed — nobody showed up.
    /// Returns `(booking_id, space_id)` pairs for the reaper to cancel.
    pub fn collect_overdue_active(&self, now: NaiveDateTime) -> Vec<(Ulid, Ulid)> {
        let mut overdue = Vec::new();
        for entry in self.state.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                for b in &guard.bookings {
                    if b.status == BookingStatus::Active && b.code_valid_to < now {
                        overdue.push((b.id, b.space_id));
                    }
                }
            }
        }
        overdue
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Bookings carry their full record in
    /// `BookingCreated`, so one event per booking suffices.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.state.iter() {
            let state = entry.value().clone();
            let guard = state.try_read().expect("compact: uncontended read");
            events.push(Event::SpaceCreated {
                space: guard.space.clone(),
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }
        {
            let blackouts = self.blackouts.read().await;
            for blackout in blackouts.iter() {
                events.push(Event::BlackoutAdded {
                    blackout: blackout.clone(),
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
