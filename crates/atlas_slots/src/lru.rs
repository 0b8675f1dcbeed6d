use crate::key::SlotId;

/// Recency bookkeeping for atlas slots.
///
/// Timestamps come from a per-index logical clock, so two touches never share
/// a timestamp and eviction order does not depend on wall-clock resolution.
#[derive(Debug)]
pub struct LruIndex {
    clock: u64,
    last_used: Box<[u64]>,
}

impl LruIndex {
    pub fn new(slot_count: usize) -> Self {
        Self {
            clock: 0,
            last_used: vec![0; slot_count].into_boxed_slice(),
        }
    }

    pub fn touch(&mut self, slot: SlotId) {
        self.clock = self.clock.wrapping_add(1);
        self.last_used[slot.index()] = self.clock;
    }

    pub fn last_used(&self, slot: SlotId) -> u64 {
        self.last_used[slot.index()]
    }

    /// Least recently touched slot among `candidates`. Ties go to the lowest
    /// slot index.
    pub fn oldest(&self, candidates: impl IntoIterator<Item = SlotId>) -> Option<SlotId> {
        candidates
            .into_iter()
            .min_by_key(|slot| (self.last_used(*slot), slot.raw()))
    }
}
