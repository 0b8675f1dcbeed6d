//! Thumbnail atlas cache.
//!
//! Small previews live in fixed slots of one square atlas texture. Lookups
//! return normalized coordinates immediately; misses are decoded on worker
//! threads and copied into the atlas by [`ThumbnailCache::update`] on the
//! thread that owns the surface. When every slot is taken the least recently
//! looked-up key gives its slot to the new one.

mod cache;
mod config;
mod decode;
#[cfg(feature = "atlas-gpu")]
mod gpu;
mod pipeline;
mod source;
mod surface;
mod upload;
mod writer;


use std::fmt::Debug;
use std::hash::Hash;

pub use atlas_slots::{AtlasConfig, AtlasConfigError, AtlasLayout, SlotId, SlotRect, SlotTicket};
pub use cache::{CacheBuildError, CacheParts, ThumbnailCache, ThumbnailRect, UpdateReport};
pub use config::{ThumbnailCacheConfig, ThumbnailConfigError};
pub use decode::{DecodeError, DecodedImage, ImageDecoder, ThumbnailDecoder};
#[cfg(feature = "atlas-gpu")]
pub use gpu::{ATLAS_FORMAT, AtlasCreateError, WgpuAtlasSurface};
pub use pipeline::{DecodeExecutor, DecodeJob, DecodeWorkerPool, ExecutorClosed, PendingDecode};
pub use source::{DirectorySource, ThumbnailSource};
pub use surface::{AtlasCopyError, AtlasSurface, CpuAtlasSurface};
pub use upload::{UploadItem, UploadQueue};
pub use writer::{ThumbnailWriteError, fit_to_slot, save_thumbnail};

/// Identifies one thumbnail. Cheap to clone; shared with decode workers.
pub trait ThumbnailKey: Eq + Hash + Clone + Debug + Send + Sync + 'static {}

impl<T> ThumbnailKey for T where T: Eq + Hash + Clone + Debug + Send + Sync + 'static {}
