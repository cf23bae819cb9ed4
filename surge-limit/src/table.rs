use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use tracing::debug;

use crate::entry::Bucket;
use crate::hash::{murmur3_32, ProbeSeq, JUMP_THRESHOLD};

/// Smallest supported table. Below this, resizes dominate.
pub(crate) const MIN_BUCKETS: usize = 1024;

type Slots = Vec<ArcSwapOption<Bucket>>;

/// Open-addressed table of bucket slots, sized to a power of two.
///
/// A slot is free (`None`) or holds one live bucket, and a probe chain ends
/// at the first free slot. The slot array itself is published through an
/// `ArcSwap`: readers pin a snapshot per operation and a resize installs a
/// doubled array, so an old snapshot stays alive exactly as long as some
/// reader still uses it. Buckets are shared by `Arc` between the old and new
/// arrays, which means token updates that race a resize land in both.
pub(crate) struct BucketTable {
    slots: ArcSwap<Slots>,
    resizing: AtomicBool,
}

impl BucketTable {
    /// Create a table with at least `capacity` slots, rounded up to a power
    /// of two and floored at [`MIN_BUCKETS`].
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_BUCKETS).next_power_of_two();
        Self {
            slots: ArcSwap::from_pointee(Self::alloc(capacity)),
            resizing: AtomicBool::new(false),
        }
    }

    fn alloc(capacity: usize) -> Slots {
        (0..capacity).map(|_| ArcSwapOption::empty()).collect()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.load().len()
    }

    /// The live bucket for `key`, if its probe chain holds one.
    pub(crate) fn find(&self, key: &str) -> Option<Arc<Bucket>> {
        if key.is_empty() {
            return None;
        }
        let hash = murmur3_32(key.as_bytes());
        let slots = self.slots.load();
        let mask = slots.len() - 1;
        for idx in ProbeSeq::new(hash, mask).take(slots.len() + JUMP_THRESHOLD + 1) {
            let slot = slots[idx].load();
            match slot.as_ref() {
                None => return None,
                Some(bucket) if bucket.key() == key => return Some(Arc::clone(bucket)),
                Some(_) => {}
            }
        }
        None
    }

    /// Insert `bucket`, replacing any live entry with the same key. Grows the
    /// table when the probe chain has no free slot left.
    pub(crate) fn insert(&self, bucket: Arc<Bucket>) {
        let hash = murmur3_32(bucket.key().as_bytes());
        loop {
            let slots = self.slots.load_full();
            let mask = slots.len() - 1;
            let mut placed = false;

            for idx in ProbeSeq::new(hash, mask).take(slots.len() + JUMP_THRESHOLD + 1) {
                let slot = slots[idx].load();
                match slot.as_ref() {
                    Some(existing) if existing.key() == bucket.key() => {
                        slots[idx].store(Some(Arc::clone(&bucket)));
                        placed = true;
                        break;
                    }
                    Some(_) => {}
                    None => {
                        let prev = slots[idx].compare_and_swap(&slot, Some(Arc::clone(&bucket)));
                        match prev.as_ref() {
                            None => {
                                placed = true;
                                break;
                            }
                            Some(winner) if winner.key() == bucket.key() => {
                                // A concurrent create for the same key claimed
                                // the slot first; last writer wins.
                                slots[idx].store(Some(Arc::clone(&bucket)));
                                placed = true;
                                break;
                            }
                            Some(_) => {}
                        }
                    }
                }
            }

            if placed {
                // A resize may have copied the chain before our write landed.
                // The write is durable only if no resize is in flight and the
                // array we wrote to is still the published one; otherwise
                // apply the insert again so the entry cannot be lost.
                if self.settled(&slots) {
                    return;
                }
                std::thread::yield_now();
                continue;
            }

            self.grow();
        }
    }

    /// Free the slot holding `key`. Returns whether a live entry was removed.
    ///
    /// Freeing a slot ends its probe chain there: a key inserted further down
    /// the same chain becomes unreachable until it is created again. Callers
    /// re-create limiters by key rather than relying on chain reuse.
    pub(crate) fn remove(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        let hash = murmur3_32(key.as_bytes());
        let mut any_removed = false;
        loop {
            let slots = self.slots.load_full();
            let mask = slots.len() - 1;

            for idx in ProbeSeq::new(hash, mask).take(slots.len() + JUMP_THRESHOLD + 1) {
                let slot = slots[idx].load();
                match slot.as_ref() {
                    None => break,
                    Some(bucket) if bucket.key() == key => {
                        slots[idx].store(None);
                        any_removed = true;
                        break;
                    }
                    Some(_) => {}
                }
            }

            // Same publication race as insert: a resize copy taken before the
            // slot was freed would resurrect the entry in the new array.
            if self.settled(&slots) {
                return any_removed;
            }
            std::thread::yield_now();
        }
    }

    /// Whether a write made against `slots` is durable: no resize is copying
    /// and `slots` is still the published array. `SeqCst` on the guard pairs
    /// with [`grow`](Self::grow) so a copy that missed the write implies one
    /// of the two checks fails here.
    fn settled(&self, slots: &Arc<Slots>) -> bool {
        !self.resizing.load(Ordering::SeqCst) && Arc::ptr_eq(slots, &self.slots.load_full())
    }

    /// Double the table. Single writer; a loser yields and returns so its
    /// caller retries against whichever array is current by then.
    fn grow(&self) {
        if self.resizing.swap(true, Ordering::SeqCst) {
            std::thread::yield_now();
            return;
        }

        let old = self.slots.load_full();
        let new_capacity = old.len() * 2;
        let new_slots = Self::alloc(new_capacity);
        let mask = new_capacity - 1;

        for slot in old.iter() {
            let Some(bucket) = slot.load_full() else {
                continue;
            };
            let hash = murmur3_32(bucket.key().as_bytes());
            // The doubled array always has a free slot, so this terminates.
            for idx in ProbeSeq::new(hash, mask) {
                if new_slots[idx].load().is_none() {
                    new_slots[idx].store(Some(Arc::clone(&bucket)));
                    break;
                }
            }
        }

        debug!(from = old.len(), to = new_capacity, "bucket table resized");
        self.slots.store(Arc::new(new_slots));
        self.resizing.store(false, Ordering::SeqCst);
    }
}
