use std::borrow::Cow;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atlas_slots::{AtlasConfig, AtlasConfigError, AtlasLayout, SlotRect, SlotState, SlotTable};
use log::{debug, error, warn};
use thiserror::Error;

use crate::ThumbnailKey;
use crate::config::{ThumbnailCacheConfig, ThumbnailConfigError};
use crate::decode::{ImageDecoder, ThumbnailDecoder};
use crate::pipeline::{DecodeExecutor, DecodePipeline, DecodeWorkerPool, PendingDecode};
use crate::source::ThumbnailSource;
use crate::surface::{AtlasCopyError, AtlasSurface};
use crate::upload::{UploadItem, UploadQueue};

/// Where a thumbnail lives in the atlas, in normalized texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailRect {
    pub uv_min: [f32; 2],
    pub uv_max: [f32; 2],
    pub ready: bool,
}

impl ThumbnailRect {
    /// Returned while nothing can be drawn yet. Zero-sized.
    pub const NOT_READY: Self = Self {
        uv_min: [0.0, 0.0],
        uv_max: [0.0, 0.0],
        ready: false,
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub uploaded: usize,
    /// Results whose slot was claimed by someone else after dispatch.
    pub discarded_stale: usize,
}

#[derive(Debug, Error)]
pub enum CacheBuildError {
    #[error(transparent)]
    Config(#[from] ThumbnailConfigError),
    #[error(transparent)]
    Atlas(#[from] AtlasConfigError),
    #[error("surface is {surface}px but the atlas config expects {config}px")]
    SurfaceSizeMismatch { surface: u32, config: u32 },
    #[error("failed to spawn thumbnail decode workers: {0}")]
    SpawnWorkers(#[from] std::io::Error),
}

/// State reachable from decode workers.
pub(crate) struct CacheShared<K> {
    table: Mutex<SlotTable<K>>,
    pub(crate) uploads: UploadQueue<K>,
}

impl<K: ThumbnailKey> CacheShared<K> {
    pub(crate) fn new(layout: AtlasLayout) -> Self {
        Self {
            table: Mutex::new(SlotTable::new(layout)),
            uploads: UploadQueue::new(),
        }
    }

    pub(crate) fn lock_table(&self) -> MutexGuard<'_, SlotTable<K>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Collaborators a cache decodes through.
pub struct CacheParts<K> {
    pub source: Arc<dyn ThumbnailSource<K>>,
    pub decoder: Arc<dyn ThumbnailDecoder>,
    pub executor: Arc<dyn DecodeExecutor>,
}

/// Fixed-capacity thumbnail atlas filled lazily from encoded files.
///
/// `get_thumbnail` never blocks on decoding; misses are decoded on worker
/// threads and written into the atlas by the next `update`, which must run on
/// the thread that owns the surface once per frame before the atlas is
/// sampled.
pub struct ThumbnailCache<K, S> {
    layout: AtlasLayout,
    shared: Arc<CacheShared<K>>,
    pipeline: DecodePipeline<K>,
    surface: S,
}

/// What `clip_or_pad` does to a `width × height` image aimed at `target`.
fn fit_action(width: u32, height: u32, target: SlotRect) -> &'static str {
    let larger = width > target.width || height > target.height;
    let smaller = width < target.width || height < target.height;
    match (larger, smaller) {
        (true, true) => "clipping and padding",
        (true, false) => "clipping",
        _ => "padding",
    }
}

impl<K, S> ThumbnailCache<K, S>
where
    K: ThumbnailKey,
    S: AtlasSurface,
{
    /// Cache decoding with the `image` crate on its own worker pool.
    pub fn new(
        config: &ThumbnailCacheConfig,
        source: impl ThumbnailSource<K> + 'static,
        surface: S,
    ) -> Result<Self, CacheBuildError> {
        config.validate()?;
        let pool = DecodeWorkerPool::new(config.decode_workers)?;
        Self::with_parts(
            config.atlas,
            CacheParts {
                source: Arc::new(source),
                decoder: Arc::new(ImageDecoder),
                executor: Arc::new(pool),
            },
            surface,
        )
    }

    pub fn with_parts(
        atlas: AtlasConfig,
        parts: CacheParts<K>,
        surface: S,
    ) -> Result<Self, CacheBuildError> {
        let layout = AtlasLayout::from_config(atlas)?;
        if surface.atlas_size() != layout.atlas_size() {
            return Err(CacheBuildError::SurfaceSizeMismatch {
                surface: surface.atlas_size(),
                config: layout.atlas_size(),
            });
        }
        let shared = Arc::new(CacheShared::new(layout));
        let pipeline = DecodePipeline::new(
            Arc::clone(&shared),
            parts.source,
            parts.decoder,
            parts.executor,
        );
        Ok(Self {
            layout,
            shared,
            pipeline,
            surface,
        })
    }

    /// Rectangle for `key`, starting a background load on a miss.
    ///
    /// Keys without a backing file get `NOT_READY` and leave no trace, so
    /// items that have no thumbnail yet never take a slot.
    pub fn get_thumbnail(&self, key: &K) -> ThumbnailRect {
        if let Some(state) = self.shared.lock_table().touch(key) {
            return self.rect_for(state);
        }

        let path = self.pipeline.source().path_for(key);
        if !self.pipeline.source().exists(&path) {
            return ThumbnailRect::NOT_READY;
        }

        let claim = {
            let mut table = self.shared.lock_table();
            match table.acquire_slot_for(key.clone()) {
                Some(claim) => claim,
                // Another caller claimed the key while the lock was free.
                None => {
                    return table
                        .touch(key)
                        .map_or(ThumbnailRect::NOT_READY, |state| self.rect_for(state));
                }
            }
        };
        if let Some(evicted) = &claim.evicted {
            debug!("evicted thumbnail {evicted:?} from {} for {key:?}", claim.ticket);
        }

        let request = PendingDecode {
            key: key.clone(),
            path,
            ticket: claim.ticket,
        };
        if let Err(closed) = self.pipeline.request_load(request) {
            error!("cannot load thumbnail {key:?}: {closed}");
            self.shared.lock_table().release(key, claim.ticket);
        }
        ThumbnailRect::NOT_READY
    }

    /// Writes finished decodes into the atlas. Call once per frame from the
    /// thread that owns the surface.
    ///
    /// Results whose claim was taken over by another key since dispatch are
    /// dropped without touching the atlas. A failed copy aborts the frame;
    /// every claim left unwritten in the batch is released so a later lookup
    /// retries it.
    pub fn update(&mut self) -> Result<UpdateReport, AtlasCopyError> {
        let mut report = UpdateReport::default();
        let mut items = self.shared.uploads.drain_all().into_iter();

        while let Some(item) = items.next() {
            let UploadItem { key, image, ticket } = item;
            if !self.shared.lock_table().is_current(&key, ticket) {
                debug!("discarding stale thumbnail for {key:?} aimed at {ticket}");
                report.discarded_stale += 1;
                continue;
            }

            let target = self.layout.interior_bounds(ticket.slot());
            let fitted = if image.width() == target.width && image.height() == target.height {
                Cow::Borrowed(&image)
            } else {
                warn!(
                    "thumbnail {key:?} is {}x{}, slot interior is {}x{}; {}",
                    image.width(),
                    image.height(),
                    target.width,
                    target.height,
                    fit_action(image.width(), image.height(), target)
                );
                match image.clip_or_pad(target.width, target.height) {
                    Ok(fitted) => Cow::Owned(fitted),
                    Err(fit_error) => {
                        error!("cannot fit thumbnail {key:?} into its slot: {fit_error}");
                        self.shared.lock_table().release(&key, ticket);
                        continue;
                    }
                }
            };

            if let Err(copy_error) = self.surface.copy_region(&fitted, target) {
                let mut table = self.shared.lock_table();
                table.release(&key, ticket);
                for rest in items.by_ref() {
                    table.release(&rest.key, rest.ticket);
                }
                return Err(copy_error);
            }

            if self.shared.lock_table().mark_ready(&key, ticket) {
                report.uploaded += 1;
            } else {
                report.discarded_stale += 1;
            }
        }

        if report.uploaded > 0 || report.discarded_stale > 0 {
            debug!(
                "thumbnail atlas update: {} uploaded, {} stale",
                report.uploaded, report.discarded_stale
            );
        }
        Ok(report)
    }

    fn rect_for(&self, state: SlotState) -> ThumbnailRect {
        let (uv_min, uv_max) = self.layout.normalized_uv(state.ticket.slot());
        ThumbnailRect {
            uv_min,
            uv_max,
            ready: !state.loading,
        }
    }

    pub fn layout(&self) -> &AtlasLayout {
        &self.layout
    }

    /// Keys currently holding a slot, loading or ready.
    pub fn len(&self) -> usize {
        self.shared.lock_table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &K) -> bool {
        self.shared.lock_table().contains(key)
    }

    /// Like `get_thumbnail` for a key already in the cache, without touching
    /// recency or starting a load.
    pub fn peek(&self, key: &K) -> Option<ThumbnailRect> {
        let state = self.shared.lock_table().state(key)?;
        Some(self.rect_for(state))
    }

    pub fn pending_uploads(&self) -> usize {
        self.shared.uploads.len()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
