//! Producer side of the cache: turns a rendered image into the file a later
//! `get_thumbnail` will pick up.

use std::fmt::Display;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use atlas_slots::{AtlasConfigError, AtlasLayout, SlotId};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, RgbaImage};
use log::debug;
use thiserror::Error;

use crate::config::ThumbnailCacheConfig;
use crate::source::{DirectorySource, ThumbnailSource};

#[derive(Debug, Error)]
pub enum ThumbnailWriteError {
    #[error("source image is empty")]
    EmptySource,
    #[error(transparent)]
    Atlas(#[from] AtlasConfigError),
    #[error("no image encoder for extension {0:?}")]
    UnsupportedExtension(String),
    #[error("failed to create thumbnail directory {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to move thumbnail into place at {}: {source}", path.display())]
    Persist { path: PathBuf, source: io::Error },
}

/// Scales `source` to cover `width × height` and crops the center.
pub fn fit_to_slot(
    source: &RgbaImage,
    width: u32,
    height: u32,
) -> Result<RgbaImage, ThumbnailWriteError> {
    let (source_width, source_height) = source.dimensions();
    if source_width == 0 || source_height == 0 || width == 0 || height == 0 {
        return Err(ThumbnailWriteError::EmptySource);
    }
    if (source_width, source_height) == (width, height) {
        return Ok(source.clone());
    }

    let scale = f64::max(
        width as f64 / source_width as f64,
        height as f64 / source_height as f64,
    );
    let scaled_width = ((source_width as f64 * scale).round() as u32).max(width);
    let scaled_height = ((source_height as f64 * scale).round() as u32).max(height);
    let scaled = imageops::resize(source, scaled_width, scaled_height, FilterType::Triangle);

    let x = (scaled_width - width) / 2;
    let y = (scaled_height - height) / 2;
    Ok(imageops::crop_imm(&scaled, x, y, width, height).to_image())
}

/// Fits `source` to the slot interior and writes it to
/// `<root>/<key>.<extension>`, creating `root` if needed.
///
/// The file is written next to its final name and renamed into place, so a
/// concurrent decode never sees a half-written file.
pub fn save_thumbnail<K: Display>(
    root: &Path,
    key: &K,
    source: &RgbaImage,
    config: &ThumbnailCacheConfig,
) -> Result<PathBuf, ThumbnailWriteError> {
    let layout = AtlasLayout::from_config(config.atlas)?;
    let interior = layout.interior_bounds(SlotId::new(0));
    let format = ImageFormat::from_extension(&config.file_extension)
        .ok_or_else(|| ThumbnailWriteError::UnsupportedExtension(config.file_extension.clone()))?;

    fs::create_dir_all(root).map_err(|source| ThumbnailWriteError::CreateDir {
        path: root.to_path_buf(),
        source,
    })?;

    let fitted = fit_to_slot(source, interior.width, interior.height)?;
    let encoded = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(fitted).to_rgb8()),
        _ => DynamicImage::ImageRgba8(fitted),
    };

    let path = DirectorySource::new(root, config.file_extension.as_str()).path_for(key);
    let partial = path.with_extension(format!("{}.partial", config.file_extension));
    if let Err(encode_error) = encoded.save_with_format(&partial, format) {
        let _ = fs::remove_file(&partial);
        return Err(encode_error.into());
    }
    if let Err(source) = fs::rename(&partial, &path) {
        let _ = fs::remove_file(&partial);
        return Err(ThumbnailWriteError::Persist { path, source });
    }

    debug!("wrote thumbnail {}", path.display());
    Ok(path)
}
