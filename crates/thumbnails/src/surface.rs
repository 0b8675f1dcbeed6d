use atlas_slots::SlotRect;
use thiserror::Error;

use crate::decode::{DecodedImage, rgba8_len};

/// GPU-side storage of the atlas. Only the thread that owns the cache calls
/// into it, from `ThumbnailCache::update`.
pub trait AtlasSurface {
    /// Side length of the square atlas in pixels.
    fn atlas_size(&self) -> u32;

    /// Writes `image` at `target`. The image must be exactly the target size.
    fn copy_region(&mut self, image: &DecodedImage, target: SlotRect)
    -> Result<(), AtlasCopyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AtlasCopyError {
    #[error("copy target {target:?} lies outside the {atlas_size}px atlas")]
    RegionOutOfBounds { target: SlotRect, atlas_size: u32 },
    #[error("image {width}x{height} does not match copy target {target:?}")]
    SizeMismatch {
        width: u32,
        height: u32,
        target: SlotRect,
    },
    #[error("atlas copy rejected by device: {0}")]
    Device(String),
}

pub(crate) fn validate_copy(
    atlas_size: u32,
    image: &DecodedImage,
    target: SlotRect,
) -> Result<(), AtlasCopyError> {
    let right = target.x.checked_add(target.width);
    let bottom = target.y.checked_add(target.height);
    let inside = match (right, bottom) {
        (Some(right), Some(bottom)) => right <= atlas_size && bottom <= atlas_size,
        _ => false,
    };
    if !inside {
        return Err(AtlasCopyError::RegionOutOfBounds { target, atlas_size });
    }
    if image.width() != target.width || image.height() != target.height {
        return Err(AtlasCopyError::SizeMismatch {
            width: image.width(),
            height: image.height(),
            target,
        });
    }
    Ok(())
}

/// Atlas kept in host memory. Useful wherever no device is around and for
/// reading pixels back in tests.
#[derive(Debug, Clone)]
pub struct CpuAtlasSurface {
    size: u32,
    pixels: Vec<u8>,
}

impl CpuAtlasSurface {
    pub fn new(size: u32) -> Self {
        let len = rgba8_len(size, size).expect("cpu atlas size overflows memory");
        Self {
            size,
            pixels: vec![0; len],
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn texel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = (y as usize * self.size as usize + x as usize) * 4;
        let mut texel = [0u8; 4];
        texel.copy_from_slice(&self.pixels[offset..offset + 4]);
        texel
    }

    /// Tightly packed copy of `rect`.
    pub fn read_region(&self, rect: SlotRect) -> Vec<u8> {
        let row_bytes = rect.width as usize * 4;
        let stride = self.size as usize * 4;
        let mut out = Vec::with_capacity(row_bytes * rect.height as usize);
        for row in rect.y..rect.y + rect.height {
            let start = row as usize * stride + rect.x as usize * 4;
            out.extend_from_slice(&self.pixels[start..start + row_bytes]);
        }
        out
    }
}

impl AtlasSurface for CpuAtlasSurface {
    fn atlas_size(&self) -> u32 {
        self.size
    }

    fn copy_region(
        &mut self,
        image: &DecodedImage,
        target: SlotRect,
    ) -> Result<(), AtlasCopyError> {
        validate_copy(self.size, image, target)?;
        let row_bytes = target.width as usize * 4;
        let stride = self.size as usize * 4;
        for (row, src) in image.pixels().chunks_exact(row_bytes).enumerate() {
            let start = (target.y as usize + row) * stride + target.x as usize * 4;
            self.pixels[start..start + row_bytes].copy_from_slice(src);
        }
        Ok(())
    }
}
