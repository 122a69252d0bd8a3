//! Fixed-capacity circular store of GPS fixes awaiting upload
//!
//! New fixes overwrite the oldest slot once the store is full; there is no
//! back-pressure. A fix stays queued until a batch containing it has been
//! confirmed sent, so unsent history survives failed cycles.

use tracing::debug;
use tracker_shared::GpsFix;

#[derive(Debug, Clone, Copy)]
struct Slot {
    fix: GpsFix,
    /// Write sequence number, distinguishes a fix from whatever later
    /// overwrote the same slot
    seq: u64,
}

/// Result of a full scan for queued fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueScan {
    pub count: usize,
    pub any: bool,
}

/// Reference to one queued fix taken for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    pub index: usize,
    seq: u64,
}

/// Queued fixes selected for one batch message, oldest first
#[derive(Debug, Clone, Default)]
pub struct PendingBatch {
    pub slots: Vec<SlotRef>,
    pub fixes: Vec<GpsFix>,
}

impl PendingBatch {
    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}

/// Circular buffer of GPS fixes
#[derive(Debug)]
pub struct GpsSampleStore {
    slots: Vec<Option<Slot>>,
    /// Slot the next fix is written to
    next: usize,
    seq: u64,
}

impl GpsSampleStore {
    /// Create a store with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity.max(1)],
            next: 0,
            seq: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Store a fix in the next slot, overwriting the oldest entry when full.
    /// Returns the slot index.
    pub fn record(&mut self, mut fix: GpsFix, now_ms: i64) -> usize {
        let index = self.next;
        fix.queued = true;
        fix.fix_timestamp = now_ms;

        if let Some(old) = &self.slots[index] {
            if old.fix.queued {
                debug!("Overwriting unsent fix in slot {}", index);
            }
        }

        self.seq += 1;
        self.slots[index] = Some(Slot { fix, seq: self.seq });
        self.next = (index + 1) % self.slots.len();

        debug!("Entry: {} in gps_buffer filled", index);
        index
    }

    /// Most recently recorded fix
    pub fn latest(&self) -> Option<&GpsFix> {
        let index = (self.next + self.slots.len() - 1) % self.slots.len();
        self.slots[index].as_ref().map(|slot| &slot.fix)
    }

    pub fn get(&self, index: usize) -> Option<&GpsFix> {
        self.slots.get(index)?.as_ref().map(|slot| &slot.fix)
    }

    /// Count queued fixes by scanning every slot
    pub fn scan_queued(&self) -> QueueScan {
        let count = self
            .slots
            .iter()
            .flatten()
            .filter(|slot| slot.fix.queued)
            .count();
        QueueScan {
            count,
            any: count > 0,
        }
    }

    /// Select up to `max` queued fixes, oldest first
    pub fn pending_batch(&self, max: usize) -> PendingBatch {
        let mut queued: Vec<(usize, &Slot)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|s| (index, s)))
            .filter(|(_, slot)| slot.fix.queued)
            .collect();
        queued.sort_by_key(|(_, slot)| slot.seq);
        queued.truncate(max.max(1));

        let mut batch = PendingBatch::default();
        for (index, slot) in queued {
            batch.slots.push(SlotRef {
                index,
                seq: slot.seq,
            });
            batch.fixes.push(slot.fix);
        }
        batch
    }

    /// Clear the queued flag of every fix in a confirmed batch. Slots that
    /// were overwritten since the batch was taken keep their new fix queued.
    /// Returns how many flags were cleared.
    pub fn mark_sent(&mut self, batch: &PendingBatch) -> usize {
        let mut cleared = 0;
        for slot_ref in &batch.slots {
            if let Some(slot) = self.slots[slot_ref.index].as_mut() {
                if slot.seq == slot_ref.seq && slot.fix.queued {
                    slot.fix.queued = false;
                    cleared += 1;
                }
            }
        }
        cleared
    }
}
