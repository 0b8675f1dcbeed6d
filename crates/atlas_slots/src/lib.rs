//! Slot bookkeeping for a fixed-size thumbnail atlas: cell geometry, the
//! key-to-slot table, and least-recently-used eviction. No I/O and no GPU.

mod key;
mod layout;
mod lru;
mod table;

pub use key::{GenerationId, Id, SlotId, SlotTicket};
pub use layout::{
    AtlasConfig, AtlasConfigError, AtlasLayout, DEFAULT_ATLAS_SIZE, DEFAULT_MAX_SLOTS,
    DEFAULT_PADDING, DEFAULT_SLOT_HEIGHT, DEFAULT_SLOT_WIDTH, SlotRect,
};
pub use lru::LruIndex;
pub use table::{SlotClaim, SlotState, SlotTable};
