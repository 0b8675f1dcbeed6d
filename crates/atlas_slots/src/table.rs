use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use crate::key::{GenerationId, SlotId, SlotTicket};
use crate::layout::AtlasLayout;
use crate::lru::LruIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotState {
    pub ticket: SlotTicket,
    pub loading: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotClaim<K> {
    pub ticket: SlotTicket,
    /// Key that previously occupied the slot, when the claim had to evict.
    pub evicted: Option<K>,
}

#[derive(Debug)]
struct SlotRecord<K> {
    key: Option<K>,
    generation: GenerationId,
    loading: bool,
}

/// Key-to-slot bookkeeping for a fixed atlas.
///
/// Holds at most `max_slots` keys. Slot records are allocated once and
/// recycled; a key and its slot are always written together.
#[derive(Debug)]
pub struct SlotTable<K> {
    layout: AtlasLayout,
    slots: Box<[SlotRecord<K>]>,
    mapping: HashMap<K, SlotId>,
    pool: FreeSlotPool,
    lru: LruIndex,
}

impl<K> SlotTable<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(layout: AtlasLayout) -> Self {
        let max_slots = layout.max_slots();
        let slots = (0..max_slots)
            .map(|_| SlotRecord {
                key: None,
                generation: GenerationId::new(0),
                loading: false,
            })
            .collect();
        Self {
            layout,
            slots,
            mapping: HashMap::with_capacity(max_slots as usize),
            pool: FreeSlotPool::new(max_slots),
            lru: LruIndex::new(max_slots as usize),
        }
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.mapping.contains_key(key)
    }

    /// Current state of `key` without affecting recency.
    pub fn state<Q>(&self, key: &Q) -> Option<SlotState>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let slot = *self.mapping.get(key)?;
        let record = &self.slots[slot.index()];
        Some(SlotState {
            ticket: SlotTicket::new(slot, record.generation),
            loading: record.loading,
        })
    }

    /// Marks `key` as most recently used and returns its state.
    pub fn touch<Q>(&mut self, key: &Q) -> Option<SlotState>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let state = self.state(key)?;
        self.lru.touch(state.ticket.slot());
        Some(state)
    }

    /// Maps `key` to a slot in the loading state.
    ///
    /// Uses a free slot while fewer than `max_slots` keys are mapped and
    /// evicts the least recently used key otherwise. Returns `None` only when
    /// `key` already holds a slot; the existing claim is left untouched.
    pub fn acquire_slot_for(&mut self, key: K) -> Option<SlotClaim<K>> {
        if self.mapping.contains_key(&key) {
            return None;
        }

        let (slot, evicted) = match self.pool.alloc() {
            Some(slot) => (slot, None),
            None => {
                let victim = self
                    .lru
                    .oldest(self.occupied_slots())
                    .expect("a full slot table has an occupied slot");
                let evicted = self.vacate(victim);
                (victim, evicted)
            }
        };

        let record = &mut self.slots[slot.index()];
        record.key = Some(key.clone());
        record.loading = true;
        let ticket = SlotTicket::new(slot, record.generation);
        self.mapping.insert(key, slot);
        self.lru.touch(slot);

        Some(SlotClaim { ticket, evicted })
    }

    /// True while `ticket` is still the claim `key` holds.
    pub fn is_current<Q>(&self, key: &Q, ticket: SlotTicket) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.state(key)
            .is_some_and(|state| state.ticket == ticket)
    }

    /// Clears the loading flag if `ticket` is still current for `key`.
    pub fn mark_ready<Q>(&mut self, key: &Q, ticket: SlotTicket) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if !self.is_current(key, ticket) {
            return false;
        }
        self.slots[ticket.slot().index()].loading = false;
        true
    }

    /// Unmaps `key` and returns its slot to the free pool, but only if
    /// `ticket` is still the claim it holds.
    pub fn release<Q>(&mut self, key: &Q, ticket: SlotTicket) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        if !self.is_current(key, ticket) {
            return false;
        }
        self.vacate(ticket.slot());
        self.pool.free(ticket.slot());
        true
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.mapping.keys()
    }

    fn occupied_slots(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, record)| record.key.is_some())
            .map(|(index, _)| SlotId::new(index as u32))
    }

    fn vacate(&mut self, slot: SlotId) -> Option<K> {
        let record = &mut self.slots[slot.index()];
        let previous = record.key.take();
        record.loading = false;
        record.generation = record.generation.next();
        if let Some(previous) = &previous {
            self.mapping.remove(previous);
        }
        previous
    }
}

#[derive(Debug, Default)]
struct FreeSlotPool {
    total_slots: u32,
    next_slot: u32,
    freelist: Vec<SlotId>,
}

impl FreeSlotPool {
    const fn new(total_slots: u32) -> Self {
        Self {
            total_slots,
            next_slot: 0,
            freelist: Vec::new(),
        }
    }

    fn alloc(&mut self) -> Option<SlotId> {
        if let Some(slot) = self.freelist.pop() {
            return Some(slot);
        }

        if self.next_slot >= self.total_slots {
            return None;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        Some(SlotId::new(slot))
    }

    fn free(&mut self, slot: SlotId) {
        self.freelist.push(slot);
    }
}
