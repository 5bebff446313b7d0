mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::{BookingStore, SharedCalendar};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

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

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
///
/// A failed batch is cut back out of the file. If even that fails the writer
/// stops, and every later commit fails with `Storage`.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    // Appends queued before a compaction must hit the old log first.
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        if let Err(e) = commit_batch(&mut wal, batch) {
            tracing::error!("WAL rollback failed, stopping writer: {e}");
            break;
        }
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
    tracing::debug!("WAL writer stopped");
}

/// Write and fsync one batch, then answer its senders. Returns an error only
/// when a failed batch could not be rolled back.
fn commit_batch(wal: &mut Wal, mut batch: Vec<PendingAppend>) -> io::Result<()> {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    let rollback = match &result {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::error!("WAL flush of {} events failed: {e}", batch.len());
            wal.discard_unsynced()
        }
    };
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
    rollback
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    for (event, _) in batch {
        wal.append_buffered(event)?;
    }
    wal.flush_sync()
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
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Write event to WAL via the background group-commit writer.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::Storage("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::Storage("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::Storage(e.to_string()))
}

/// The booking engine: an in-memory [`BookingStore`] made durable by the WAL.
///
/// Every mutation follows the same shape: take the commit gate (shared),
/// take the owner's write lock, decide, then [`Engine::commit`]. Compaction
/// takes the gate exclusively, so it never races a commit.
pub struct Engine {
    pub(super) store: Arc<BookingStore>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) commit_gate: Arc<RwLock<()>>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = BookingStore::from_events(&events);
        tracing::info!(
            "replayed {} events: {} bookings across {} owners",
            events.len(),
            store.booking_count(),
            store.owner_count()
        );

        Ok(Self {
            store: Arc::new(store),
            wal_tx,
            commit_gate: Arc::new(RwLock::new(())),
        })
    }

    pub fn store(&self) -> &BookingStore {
        &self.store
    }

    /// WAL-append + apply as one unit.
    ///
    /// Runs on its own task holding both guards, so dropping the caller's
    /// future (e.g. a request timeout) cannot leave an event in the WAL
    /// without its in-memory counterpart, or the reverse.
    pub(super) async fn commit(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut guard: OwnedRwLockWriteGuard<OwnerCalendar>,
        event: Event,
    ) -> Result<(), EngineError> {
        let wal_tx = self.wal_tx.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let _gate = gate;
            wal_append(&wal_tx, &event).await?;
            store.apply_event(&mut guard, &event);
            Ok::<(), EngineError>(())
        })
        .await
        .map_err(|e| EngineError::Storage(format!("commit task failed: {e}")))?
    }

    /// Lookup booking → owner, acquire that owner's write lock, and confirm
    /// the booking is still there once the lock is held.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<OwnerCalendar>, EngineError> {
        let owner_id = self
            .store
            .owner_of(&booking_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let cal = self
            .store
            .calendar(&owner_id)
            .ok_or(EngineError::NotFound(booking_id))?;
        let guard = cal.write_owned().await;
        if guard.get(booking_id).is_none() {
            return Err(EngineError::NotFound(booking_id));
        }
        Ok(guard)
    }
}
