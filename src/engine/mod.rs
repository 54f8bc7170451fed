mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{availability, day_view, find_conflict, free_segments};
pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{AvailabilityChange, NotifySink};
use crate::wal::Wal;

pub type SharedSpaceState = Arc<RwLock<SpaceState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: authoritative in-memory state, WAL-durable, with a
/// pluggable availability-changed sink.
pub struct Engine {
    pub state: DashMap<Ulid, SharedSpaceState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<dyn NotifySink>,
    /// Global blackout calendar — applies to every space.
    pub(super) blackouts: Arc<RwLock<Vec<Blackout>>>,
    /// Reverse lookup: booking id → space id.
    pub(super) booking_to_space: DashMap<Ulid, Ulid>,
    /// Check-in code → booking id. This is the uniqueness constraint on codes.
    pub(super) codes: DashMap<String, Ulid>,
}

/// Apply an event directly to a SpaceState (no locking — caller holds the lock).
fn apply_to_space(
    state: &mut SpaceState,
    event: &Event,
    booking_index: &DashMap<Ulid, Ulid>,
    codes: &DashMap<String, Ulid>,
) {
    match event {
        Event::BookingCreated { booking } => {
            booking_index.insert(booking.id, booking.space_id);
            codes.insert(booking.checkin_code.clone(), booking.id);
            state.insert_booking(booking.clone());
        }
        Event::BookingCheckedIn { booking_id, at, .. } => {
            if let Some(b) = state.booking_mut(*booking_id) {
                b.status = BookingStatus::CheckedIn;
                b.checkin_at = Some(*at);
            }
        }
        Event::BookingCheckedOut { booking_id, at, .. } => {
            if let Some(b) = state.booking_mut(*booking_id) {
                b.status = BookingStatus::Finished;
                b.checkout_at = Some(*at);
            }
        }
        Event::BookingCancelled { booking_id, .. } => {
            if let Some(b) = state.booking_mut(*booking_id) {
                b.status = BookingStatus::Cancelled;
            }
        }
        Event::SpaceStatusSet { status, .. } => {
            state.space.status = *status;
        }
        // Space/blackout creation and removal are handled at the map level
        Event::SpaceCreated { .. }
        | Event::SpaceDeleted { .. }
        | Event::BlackoutAdded { .. }
        | Event::BlackoutRemoved { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<dyn NotifySink>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            blackouts: Arc::new(RwLock::new(Vec::new())),
            booking_to_space: DashMap::new(),
            codes: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::SpaceCreated { space } => {
                    engine
                        .state
                        .insert(space.id, Arc::new(RwLock::new(SpaceState::new(space.clone()))));
                }
                Event::SpaceDeleted { space_id } => {
                    if let Some((_, state)) = engine.state.remove(space_id) {
                        let guard = state.try_read().expect("replay: uncontended read");
                        for b in &guard.bookings {
                            engine.booking_to_space.remove(&b.id);
                            engine.codes.remove(&b.checkin_code);
                        }
                    }
                }
                Event::BlackoutAdded { blackout } => {
                    let mut guard = engine
                        .blackouts
                        .try_write()
                        .expect("replay: uncontended write");
                    guard.push(blackout.clone());
                }
                Event::BlackoutRemoved { blackout_id } => {
                    let mut guard = engine
                        .blackouts
                        .try_write()
                        .expect("replay: uncontended write");
                    guard.retain(|b| b.id != *blackout_id);
                }
                other => {
                    if let Some(space_id) = event_space_id(other)
                        && let Some(entry) = engine.state.get(&space_id)
                    {
                        let state = entry.clone();
                        let mut guard = state.try_write().expect("replay: uncontended write");
                        apply_to_space(&mut guard, other, &engine.booking_to_space, &engine.codes);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_space_state(&self, id: &Ulid) -> Option<SharedSpaceState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn get_space_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_to_space.get(booking_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call. Announcing to the sink stays with the
    /// caller — only occupancy-changing mutations fan out.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut SpaceState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_space(state, event, &self.booking_to_space, &self.codes);
        Ok(())
    }

    /// Fire-and-forget: a booking appeared or a slot was given back.
    pub(super) fn announce(&self, booking: &Booking) {
        self.notify.availability_changed(AvailabilityChange {
            space_id: booking.space_id,
            date: booking.slot.date(),
            start: booking.slot.start_at.time(),
            end: booking.slot.end_at.time(),
        });
    }

    /// Lookup booking → space, get space state, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<SpaceState>), EngineError> {
        let space_id = self
            .get_space_for_booking(booking_id)
            .ok_or(EngineError::BookingNotFound(*booking_id))?;
        let state = self
            .get_space_state(&space_id)
            .ok_or(EngineError::SpaceNotFound(space_id))?;
        let guard = state.write_owned().await;
        Ok((space_id, guard))
    }
}

/// Extract the space_id from a booking/space event (None for global events).
fn event_space_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::BookingCreated { booking } => Some(booking.space_id),
        Event::BookingCheckedIn { space_id, .. }
        | Event::BookingCheckedOut { space_id, .. }
        | Event::BookingCancelled { space_id, .. }
        | Event::SpaceStatusSet { space_id, .. }
        | Event::SpaceDeleted { space_id } => Some(*space_id),
        Event::SpaceCreated { space } => Some(space.id),
        Event::BlackoutAdded { .. } | Event::BlackoutRemoved { .. } => None,
    }
}
