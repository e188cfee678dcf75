mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{expand_days, free_in, merge_overlapping, occupied_in, subtract_ranges};
pub use error::EngineError;
pub use mutations::DueTransition;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::catalog::ItemCatalog;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::payment::PaymentGateway;
use crate::wal::Wal;

pub type SharedItemState = Arc<RwLock<ItemState>>;

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

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
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

/// The availability/booking engine: one calendar per item, guarded by a
/// per-item `RwLock` that is the serialization point for every
/// read-then-write operation on that item's occupied set.
pub struct Engine {
    pub state: DashMap<ItemId, SharedItemState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) catalog: Arc<dyn ItemCatalog>,
    pub(super) gateway: Arc<dyn PaymentGateway>,
    /// Reverse lookup: entry (booking/blocked period) id → item id
    pub(super) entity_to_item: DashMap<Ulid, ItemId>,
    /// Payment intent reference → booking id, for webhook correlation.
    pub(super) intent_to_booking: DashMap<String, BookingId>,
}

/// Apply an event directly to an ItemState (no locking — caller holds the lock).
fn apply_to_item(
    item: &mut ItemState,
    event: &Event,
    entity_map: &DashMap<Ulid, ItemId>,
    intent_map: &DashMap<String, BookingId>,
) {
    match event {
        Event::BookingRequested {
            id,
            item_id,
            renter_id,
            range,
            amount,
        } => {
            item.insert_entry(Entry {
                id: *id,
                range: *range,
                kind: EntryKind::Booking(BookingState {
                    renter_id: *renter_id,
                    status: BookingStatus::Pending,
                    amount: *amount,
                    payment_reference: None,
                }),
            });
            entity_map.insert(*id, *item_id);
        }
        Event::IntentRecorded { id, reference, .. } => {
            if let Some(b) = item.entry_mut(*id).and_then(Entry::booking_mut) {
                b.payment_reference = Some(reference.clone());
            }
            intent_map.insert(reference.clone(), *id);
        }
        Event::BookingConfirmed { id, reference, .. } => {
            if let Some(b) = item.entry_mut(*id).and_then(Entry::booking_mut) {
                b.status = BookingStatus::Confirmed;
                if reference.is_some() {
                    b.payment_reference = reference.clone();
                }
            }
        }
        Event::BookingCancelled { id, .. } => {
            if let Some(b) = item.entry_mut(*id).and_then(Entry::booking_mut) {
                b.status = BookingStatus::Cancelled;
            }
        }
        Event::BookingActivated { id, .. } => {
            if let Some(b) = item.entry_mut(*id).and_then(Entry::booking_mut) {
                b.status = BookingStatus::Active;
            }
        }
        Event::BookingCompleted { id, .. } => {
            if let Some(b) = item.entry_mut(*id).and_then(Entry::booking_mut) {
                b.status = BookingStatus::Completed;
            }
        }
        Event::PeriodBlocked {
            id,
            item_id,
            range,
            reason,
        } => {
            item.insert_entry(Entry {
                id: *id,
                range: *range,
                kind: EntryKind::Blocked {
                    reason: reason.clone(),
                },
            });
            entity_map.insert(*id, *item_id);
        }
        Event::PeriodUnblocked { id, .. } => {
            item.remove_entry(*id);
            entity_map.remove(id);
        }
    }
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        catalog: Arc<dyn ItemCatalog>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            notify,
            catalog,
            gateway,
            entity_to_item: DashMap::new(),
            intent_to_booking: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            let item_arc = engine.item_state(event.item_id());
            let mut guard = item_arc.try_write().expect("replay: uncontended write");
            apply_to_item(&mut guard, event, &engine.entity_to_item, &engine.intent_to_booking);
        }

        Ok(engine)
    }

    /// Get or lazily create the calendar state for an item. Item
    /// existence itself is the catalog's concern; a calendar springs into
    /// being on the first write that touches it.
    pub(super) fn item_state(&self, id: ItemId) -> SharedItemState {
        self.state
            .entry(id)
            .or_insert_with(|| {
                metrics::gauge!(crate::observability::ITEMS_TRACKED).increment(1.0);
                Arc::new(RwLock::new(ItemState::new(id)))
            })
            .clone()
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
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

    pub fn get_item_state(&self, id: &ItemId) -> Option<SharedItemState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn item_for_entity(&self, entity_id: &Ulid) -> Option<ItemId> {
        self.entity_to_item.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated 3-line pattern.
    pub(super) async fn persist_and_apply(
        &self,
        item_id: ItemId,
        item: &mut ItemState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_item(item, event, &self.entity_to_item, &self.intent_to_booking);
        self.notify.send(item_id, event);
        Ok(())
    }

    /// Lookup entity → item, get the item's state, acquire the write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(ItemId, tokio::sync::OwnedRwLockWriteGuard<ItemState>), EngineError> {
        let item_id = self
            .item_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let state = self
            .get_item_state(&item_id)
            .ok_or(EngineError::NotFound(item_id))?;
        let guard = state.write_owned().await;
        Ok((item_id, guard))
    }
}
