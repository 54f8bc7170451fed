use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::model::*;

use super::availability::{availability, day_view};
use super::{Engine, EngineError};

impl Engine {
    /// Can `[start, end)` on `date` be booked in this space, and what does
    /// the rest of the day look like? Read-only; never mutates anything.
    pub async fn space_availability(
        &self,
        space_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<AvailabilityResult, EngineError> {
        if start >= end {
            return Err(EngineError::StartNotBeforeEnd);
        }
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = state.read().await;
        let blackouts = self.blackouts.read().await;
        Ok(availability(&guard, &blackouts, date, start, end))
    }

    /// Full-day free/busy view, used when no specific window was requested.
    pub async fn free_segments(
        &self,
        space_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<FreeSegment>, EngineError> {
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = state.read().await;
        let blackouts = self.blackouts.read().await;
        Ok(day_view(&guard, &blackouts, date))
    }

    pub async fn get_space(&self, space_id: Ulid) -> Option<Space> {
        let state = self.get_space_state(&space_id)?;
        let guard = state.read().await;
        Some(guard.space.clone())
    }

    pub fn list_spaces(&self) -> Vec<Space> {
        self.state
            .iter()
            .map(|entry| {
                let state = entry.value().clone();
                let guard = state.try_read().expect("list_spaces: uncontended read");
                guard.space.clone()
            })
            .collect()
    }

    pub async fn get_booking(&self, booking_id: Ulid) -> Result<Booking, EngineError> {
        let space_id = self
            .get_space_for_booking(&booking_id)
            .ok_or(EngineError::BookingNotFound(booking_id))?;
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = state.read().await;
        guard
            .booking(booking_id)
            .cloned()
            .ok_or(EngineError::BookingNotFound(booking_id))
    }

    /// Bookings for one space on one date, filtered to the given statuses
    /// (empty filter = all statuses), in start order.
    pub async fn bookings_for_space_on_date(
        &self,
        space_id: Ulid,
        date: NaiveDate,
        statuses: &[BookingStatus],
    ) -> Result<Vec<Booking>, EngineError> {
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = state.read().await;
        Ok(guard
            .bookings
            .iter()
            .filter(|b| b.slot.date() == date)
            .filter(|b| statuses.is_empty() || statuses.contains(&b.status))
            .cloned()
            .collect())
    }

    pub fn bookings_for_user(&self, user_id: Ulid) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for entry in self.state.iter() {
            let state = entry.value().clone();
            if let Ok(guard) = state.try_read() {
                bookings.extend(guard.bookings.iter().filter(|b| b.user_id == user_id).cloned());
            }
        }
        bookings.sort_by_key(|b| b.slot.start_at);
        bookings
    }

    pub async fn blackouts_covering(&self, date: NaiveDate) -> Vec<Blackout> {
        let guard = self.blackouts.read().await;
        guard.iter().filter(|b| b.covers_date(date)).cloned().collect()
    }

    pub async fn list_blackouts(&self) -> Vec<Blackout> {
        self.blackouts.read().await.clone()
    }
}
