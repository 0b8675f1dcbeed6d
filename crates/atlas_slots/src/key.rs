use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Id<Tag, Repr> {
    raw: Repr,
    _marker: PhantomData<Tag>,
}

impl<Tag, Repr: Copy> Copy for Id<Tag, Repr> {}

impl<Tag, Repr: Copy> Clone for Id<Tag, Repr> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag, Repr> Id<Tag, Repr> {
    pub const fn new(raw: Repr) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub const fn raw(self) -> Repr
    where
        Repr: Copy,
    {
        self.raw
    }
}

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum SlotTag {}
pub type SlotId = Id<SlotTag, u32>;

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum GenerationTag {}
pub type GenerationId = Id<GenerationTag, u32>;

impl SlotId {
    pub const fn index(self) -> usize {
        self.raw as usize
    }
}

impl GenerationId {
    pub(crate) const fn next(self) -> Self {
        Self::new(self.raw.wrapping_add(1))
    }
}

/// Identity of one claim on a slot.
///
/// The generation is bumped every time the slot is vacated, so a ticket taken
/// before an eviction never compares equal to one taken after it, even when
/// the same key ends up back in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotTicket {
    slot: SlotId,
    generation: GenerationId,
}

impl SlotTicket {
    pub(crate) const fn new(slot: SlotId, generation: GenerationId) -> Self {
        Self { slot, generation }
    }

    pub const fn slot(self) -> SlotId {
        self.slot
    }

    pub const fn generation(self) -> GenerationId {
        self.generation
    }
}

impl fmt::Display for SlotTicket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "slot {} (generation {})",
            self.slot.raw(),
            self.generation.raw()
        )
    }
}
