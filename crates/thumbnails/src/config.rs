use std::num::NonZeroUsize;

use atlas_slots::{AtlasConfig, AtlasConfigError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAX_DEFAULT_DECODE_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailCacheConfig {
    pub atlas: AtlasConfig,
    /// Threads in the decode worker pool.
    pub decode_workers: usize,
    /// Extension of cached thumbnail files, without the dot.
    pub file_extension: String,
}

impl ThumbnailCacheConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ThumbnailConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ThumbnailConfigError> {
        self.atlas.validate()?;
        if self.decode_workers == 0 {
            return Err(ThumbnailConfigError::DecodeWorkersZero);
        }
        if self.file_extension.is_empty() || self.file_extension.starts_with('.') {
            return Err(ThumbnailConfigError::InvalidFileExtension(
                self.file_extension.clone(),
            ));
        }
        Ok(())
    }
}

impl Default for ThumbnailCacheConfig {
    fn default() -> Self {
        Self {
            atlas: AtlasConfig::default(),
            decode_workers: default_decode_workers(),
            file_extension: "png".to_owned(),
        }
    }
}

fn default_decode_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .clamp(1, MAX_DEFAULT_DECODE_WORKERS)
}

#[derive(Debug, Error)]
pub enum ThumbnailConfigError {
    #[error("failed to parse thumbnail cache config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Atlas(#[from] AtlasConfigError),
    #[error("decode_workers must be at least 1")]
    DecodeWorkersZero,
    #[error("file extension {0:?} must be non-empty and given without a leading dot")]
    InvalidFileExtension(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ThumbnailCacheConfig::default();
        config.validate().expect("default config validates");
        assert!((1..=MAX_DEFAULT_DECODE_WORKERS).contains(&config.decode_workers));
    }

    #[test]
    fn json_overrides_nested_atlas_fields() {
        let config = ThumbnailCacheConfig::from_json_str(
            r#"{ "atlas": { "max_slots": 32 }, "decode_workers": 2 }"#,
        )
        .expect("parse config");
        assert_eq!(config.atlas.max_slots, 32);
        assert_eq!(config.atlas.slot_width, atlas_slots::DEFAULT_SLOT_WIDTH);
        assert_eq!(config.decode_workers, 2);
        assert_eq!(config.file_extension, "png");
    }

    #[test]
    fn json_with_invalid_atlas_is_rejected() {
        let error = ThumbnailCacheConfig::from_json_str(r#"{ "atlas": { "max_slots": 100000 } }"#)
            .expect_err("max_slots beyond capacity");
        assert!(matches!(
            error,
            ThumbnailConfigError::Atlas(AtlasConfigError::MaxSlotsExceedCapacity { .. })
        ));
    }

    #[test]
    fn rejects_dotted_extension_and_zero_workers() {
        let config = ThumbnailCacheConfig {
            file_extension: ".png".to_owned(),
            ..ThumbnailCacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ThumbnailConfigError::InvalidFileExtension(_))
        ));

        let config = ThumbnailCacheConfig {
            decode_workers: 0,
            ..ThumbnailCacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ThumbnailConfigError::DecodeWorkersZero)
        ));
    }

    #[test]
    fn malformed_json_reports_parse_error() {
        let error = ThumbnailCacheConfig::from_json_str("{ not json").expect_err("parse failure");
        assert!(matches!(error, ThumbnailConfigError::Parse(_)));
    }
}
