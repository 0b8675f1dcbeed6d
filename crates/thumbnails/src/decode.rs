use std::path::{Path, PathBuf};

use thiserror::Error;

/// Tightly packed RGBA8 pixels at the source image's native size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl DecodedImage {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DecodeError> {
        let expected = rgba8_len(width, height).ok_or(DecodeError::SizeOverflow { width, height })?;
        if pixels.len() != expected {
            return Err(DecodeError::BufferLengthMismatch {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, DecodeError> {
        let len = rgba8_len(width, height).ok_or(DecodeError::SizeOverflow { width, height })?;
        let pixels = rgba.iter().copied().cycle().take(len).collect();
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Copy of this image at `width × height`, keeping the top-left overlap
    /// and leaving the rest transparent.
    pub fn clip_or_pad(&self, width: u32, height: u32) -> Result<Self, DecodeError> {
        let len = rgba8_len(width, height).ok_or(DecodeError::SizeOverflow { width, height })?;
        let mut pixels = vec![0u8; len];
        let copy_width = self.width.min(width) as usize * 4;
        let copy_rows = self.height.min(height) as usize;
        let src_stride = self.width as usize * 4;
        let dst_stride = width as usize * 4;
        for row in 0..copy_rows {
            let src = &self.pixels[row * src_stride..row * src_stride + copy_width];
            pixels[row * dst_stride..row * dst_stride + copy_width].copy_from_slice(src);
        }
        Self::new(width, height, pixels)
    }
}

pub(crate) fn rgba8_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("thumbnail source {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("failed to decode thumbnail: {0}")]
    Image(#[from] image::ImageError),
    #[error("image size {width}x{height} overflows an RGBA8 buffer")]
    SizeOverflow { width: u32, height: u32 },
    #[error("RGBA8 buffer of {actual} bytes does not match {width}x{height}")]
    BufferLengthMismatch {
        width: u32,
        height: u32,
        actual: usize,
    },
}

/// Turns an encoded file into RGBA8 pixels. Called from decode workers.
pub trait ThumbnailDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError>;
}

/// Decoder backed by the `image` crate (PNG and JPEG).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ThumbnailDecoder for ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let rgba = image::open(path)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        DecodedImage::new(width, height, rgba.into_raw())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffer_with_wrong_length() {
        let error = DecodedImage::new(2, 2, vec![0; 15]).expect_err("short buffer");
        assert!(matches!(
            error,
            DecodeError::BufferLengthMismatch { actual: 15, .. }
        ));
    }

    #[test]
    fn clip_keeps_top_left_pixels() {
        let mut pixels = Vec::new();
        for y in 0..3u8 {
            for x in 0..3u8 {
                pixels.extend_from_slice(&[x, y, 0, 255]);
            }
        }
        let image = DecodedImage::new(3, 3, pixels).expect("3x3 image");
        let clipped = image.clip_or_pad(2, 2).expect("clip");
        assert_eq!(
            clipped.pixels(),
            &[0, 0, 0, 255, 1, 0, 0, 255, 0, 1, 0, 255, 1, 1, 0, 255]
        );
    }

    #[test]
    fn pad_fills_with_transparent_pixels() {
        let image = DecodedImage::solid(1, 1, [9, 9, 9, 255]).expect("1x1 image");
        let padded = image.clip_or_pad(2, 1).expect("pad");
        assert_eq!(padded.pixels(), &[9, 9, 9, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn image_decoder_reads_png_as_rgba8() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("source.png");
        let mut source = image::RgbImage::new(3, 2);
        source.put_pixel(2, 1, image::Rgb([200, 100, 50]));
        source.save(&path).expect("write png");

        let decoded = ImageDecoder.decode(&path).expect("decode png");
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
        assert_eq!(&decoded.pixels()[20..24], &[200, 100, 50, 255]);
    }

    #[test]
    fn image_decoder_reports_corrupt_files() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").expect("write file");
        assert!(matches!(
            ImageDecoder.decode(&path),
            Err(DecodeError::Image(_))
        ));
    }
}
