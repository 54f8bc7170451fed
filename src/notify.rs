use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

/// "Availability changed" announcement for a space + date + time range,
/// emitted after a booking is created, cancelled, or checked out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityChange {
    pub space_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

/// Fire-and-forget sink the engine announces occupancy changes through.
/// Implementations must never block and never fail the caller — a broken
/// subscriber is the subscriber's problem, not the booking's.
pub trait NotifySink: Send + Sync {
    fn availability_changed(&self, change: AvailabilityChange);
}

/// Sink that drops everything. Useful for tools that replay or migrate
/// state without fanning anything out.
pub struct NullSink;

impl NotifySink for NullSink {
    fn availability_changed(&self, _change: AvailabilityChange) {}
}

/// Broadcast hub: per-space channels, subscribe by space id.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<AvailabilityChange>>,
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to announcements for a space. Creates the channel if needed.
    pub fn subscribe(&self, space_id: Ulid) -> broadcast::Receiver<AvailabilityChange> {
        let sender = self
            .channels
            .entry(space_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Remove a channel (e.g. when a space is deleted).
    pub fn remove(&self, space_id: &Ulid) {
        self.channels.remove(space_id);
    }
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifySink for NotifyHub {
    /// No-op if nobody is listening; a send error only means every receiver
    /// is gone, which is fine.
    fn availability_changed(&self, change: AvailabilityChange) {
        if let Some(sender) = self.channels.get(&change.space_id) {
            if sender.send(change).is_err() {
                tracing::debug!("availability change dropped: no live subscribers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(space_id: Ulid) -> AvailabilityChange {
        AvailabilityChange {
            space_id,
            date: NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let space_id = Ulid::new();
        let mut rx = hub.subscribe(space_id);

        hub.availability_changed(change(space_id));

        let received = rx.recv().await.unwrap();
        assert_eq!(received, change(space_id));
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        // No subscriber — should not panic
        hub.availability_changed(change(Ulid::new()));
    }

    #[tokio::test]
    async fn channels_are_per_space() {
        let hub = NotifyHub::new();
        let space_a = Ulid::new();
        let space_b = Ulid::new();
        let mut rx_a = hub.subscribe(space_a);
        let _rx_b = hub.subscribe(space_b);

        hub.availability_changed(change(space_b));

        assert!(matches!(
            rx_a.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
