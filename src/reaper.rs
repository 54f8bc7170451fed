use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::BookingAction;

/// Background task that cancels no-shows: active bookings whose check-in
/// window has lapsed go through the normal cancel path (WAL + notify), so
/// the freed slot is announced like any other cancellation.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        interval.tick().await;
        let now = chrono::Local::now().naive_local();
        let overdue = engine.collect_overdue_active(now);
        for (booking_id, _space_id) in overdue {
            match engine
                .update_booking_status(booking_id, BookingAction::Cancel, None)
                .await
            {
                Ok(_) => {
                    metrics::counter!(crate::observability::NO_SHOW_CANCELLATIONS_TOTAL)
                        .increment(1);
                    info!("no-show sweep cancelled booking {booking_id}");
                }
                Err(e) => {
                    // May have been checked in or cancelled meanwhile — that's fine
                    tracing::debug!("no-show sweep skip {booking_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends have piled up
/// since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("WAL compacted after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
