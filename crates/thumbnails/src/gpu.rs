use atlas_slots::SlotRect;
use thiserror::Error;

use crate::decode::DecodedImage;
use crate::surface::{AtlasCopyError, AtlasSurface, validate_copy};

pub const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AtlasCreateError {
    #[error("atlas size must be at least 1")]
    AtlasSizeZero,
    #[error("atlas size {atlas_size} exceeds device limit {limit}")]
    AtlasSizeExceedsDeviceLimit { atlas_size: u32, limit: u32 },
}

/// Thumbnail atlas stored in a single wgpu texture.
pub struct WgpuAtlasSurface {
    device: wgpu::Device,
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: u32,
}

impl WgpuAtlasSurface {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        atlas_size: u32,
    ) -> Result<Self, AtlasCreateError> {
        if atlas_size == 0 {
            return Err(AtlasCreateError::AtlasSizeZero);
        }
        let limit = device.limits().max_texture_dimension_2d;
        if atlas_size > limit {
            return Err(AtlasCreateError::AtlasSizeExceedsDeviceLimit { atlas_size, limit });
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("thumbnails.atlas"),
            size: wgpu::Extent3d {
                width: atlas_size,
                height: atlas_size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("thumbnails.atlas_view"),
            ..Default::default()
        });

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            texture,
            view,
            size: atlas_size,
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Samplable view of the whole atlas.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl AtlasSurface for WgpuAtlasSurface {
    fn atlas_size(&self) -> u32 {
        self.size
    }

    fn copy_region(
        &mut self,
        image: &DecodedImage,
        target: SlotRect,
    ) -> Result<(), AtlasCopyError> {
        validate_copy(self.size, image, target)?;

        let error_scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: target.x,
                    y: target.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            image.pixels(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(target.width * 4),
                rows_per_image: Some(target.height),
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );
        match pollster::block_on(error_scope.pop()) {
            Some(device_error) => Err(AtlasCopyError::Device(device_error.to_string())),
            None => Ok(()),
        }
    }
}
