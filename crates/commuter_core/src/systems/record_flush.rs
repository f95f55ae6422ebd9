//! Record-store flush: drain staged writes to the external store.
//!
//! On a write failure the item goes back to the head of the queue and the
//! rest of the batch waits for the next tick; the bounded queue absorbs the
//! backlog (dropping oldest beyond capacity). The reservoirs never block on
//! this path.

use bevy_ecs::prelude::{Res, ResMut};
use log::{debug, warn};

use crate::clock::{CurrentEvent, EventKind, ServiceClock};
use crate::coordinator::Coordinators;
use crate::record_store::{PendingWrite, RecordStoreHandle, RecordStoreQueue};

/// Writes attempted per flush tick.
const FLUSH_BATCH: usize = 50;

pub fn record_flush_system(
    event: Res<CurrentEvent>,
    mut clock: ResMut<ServiceClock>,
    mut coordinators: ResMut<Coordinators>,
    mut queue: ResMut<RecordStoreQueue>,
    store: Res<RecordStoreHandle>,
) {
    if event.0.kind != EventKind::RecordStoreFlush {
        return;
    }
    if !coordinators.record_flush.is_running() {
        return;
    }

    let mut flushed = 0usize;
    while flushed < FLUSH_BATCH {
        let Some(write) = queue.pop() else {
            break;
        };
        let result = match &write {
            PendingWrite::Insert(record) => store.store.insert(record),
            PendingWrite::MarkBoarded(id) => store.store.mark_boarded(id),
            PendingWrite::MarkAlighted(id) => store.store.mark_alighted(id),
            PendingWrite::CleanupExpired => store.store.cleanup_expired(),
        };
        match result {
            Ok(()) => flushed += 1,
            Err(err) => {
                warn!("record-store write failed, retrying next tick: {err}");
                coordinators.record_flush.record_failure();
                queue.push_front(write);
                break;
            }
        }
    }
    if flushed > 0 {
        debug!("flushed {flushed} record-store writes, {} pending", queue.len());
    }

    coordinators.record_flush.advance(&mut clock);
}
