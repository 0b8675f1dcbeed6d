use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::key::SlotId;

pub const DEFAULT_ATLAS_SIZE: u32 = 4096;
pub const DEFAULT_SLOT_WIDTH: u32 = 178;
pub const DEFAULT_SLOT_HEIGHT: u32 = 133;
pub const DEFAULT_PADDING: u32 = 2;
pub const DEFAULT_MAX_SLOTS: u32 = 500;

/// Geometry of a square thumbnail atlas. Fixed once a cache is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    pub atlas_size: u32,
    pub slot_width: u32,
    pub slot_height: u32,
    /// Gap kept clear on every side of a slot so linear filtering never
    /// samples a neighbour.
    pub padding: u32,
    pub max_slots: u32,
}

impl AtlasConfig {
    pub fn validate(&self) -> Result<(), AtlasConfigError> {
        AtlasLayout::from_config(*self).map(|_| ())
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            atlas_size: DEFAULT_ATLAS_SIZE,
            slot_width: DEFAULT_SLOT_WIDTH,
            slot_height: DEFAULT_SLOT_HEIGHT,
            padding: DEFAULT_PADDING,
            max_slots: DEFAULT_MAX_SLOTS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AtlasConfigError {
    #[error("atlas size must be at least 1")]
    AtlasSizeZero,
    #[error("slot width and height must be at least 1")]
    SlotSizeZero,
    #[error("slot {slot_width}x{slot_height} does not fit in a {atlas_size}px atlas")]
    SlotLargerThanAtlas {
        atlas_size: u32,
        slot_width: u32,
        slot_height: u32,
    },
    #[error("padding {padding} leaves no interior in a {slot_width}x{slot_height} slot")]
    PaddingTooLarge {
        padding: u32,
        slot_width: u32,
        slot_height: u32,
    },
    #[error("max_slots must be at least 1")]
    MaxSlotsZero,
    #[error("max_slots {max_slots} exceeds atlas capacity {capacity}")]
    MaxSlotsExceedCapacity { max_slots: u32, capacity: u32 },
}

/// Pixel rectangle inside the atlas texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasLayout {
    config: AtlasConfig,
    columns: u32,
    rows: u32,
    capacity: u32,
}

impl AtlasLayout {
    pub fn from_config(config: AtlasConfig) -> Result<Self, AtlasConfigError> {
        if config.atlas_size == 0 {
            return Err(AtlasConfigError::AtlasSizeZero);
        }
        if config.slot_width == 0 || config.slot_height == 0 {
            return Err(AtlasConfigError::SlotSizeZero);
        }
        if config.slot_width > config.atlas_size || config.slot_height > config.atlas_size {
            return Err(AtlasConfigError::SlotLargerThanAtlas {
                atlas_size: config.atlas_size,
                slot_width: config.slot_width,
                slot_height: config.slot_height,
            });
        }
        let inset = config.padding.saturating_mul(2);
        if inset >= config.slot_width || inset >= config.slot_height {
            return Err(AtlasConfigError::PaddingTooLarge {
                padding: config.padding,
                slot_width: config.slot_width,
                slot_height: config.slot_height,
            });
        }
        if config.max_slots == 0 {
            return Err(AtlasConfigError::MaxSlotsZero);
        }

        let columns = config.atlas_size / config.slot_width;
        let rows = config.atlas_size / config.slot_height;
        let capacity = columns.saturating_mul(rows);
        if config.max_slots > capacity {
            return Err(AtlasConfigError::MaxSlotsExceedCapacity {
                max_slots: config.max_slots,
                capacity,
            });
        }

        Ok(Self {
            config,
            columns,
            rows,
            capacity,
        })
    }

    pub const fn config(&self) -> AtlasConfig {
        self.config
    }

    pub const fn atlas_size(&self) -> u32 {
        self.config.atlas_size
    }

    pub const fn columns(&self) -> u32 {
        self.columns
    }

    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of cells the atlas geometry can hold.
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of cells a cache is allowed to occupy at once.
    pub const fn max_slots(&self) -> u32 {
        self.config.max_slots
    }

    fn slot_coords(&self, slot: SlotId) -> (u32, u32) {
        let index = slot.raw();
        assert!(
            index < self.capacity,
            "slot {} is out of bounds for atlas grid {}x{}",
            index,
            self.columns,
            self.rows
        );
        (index % self.columns, index / self.columns)
    }

    /// Full cell rectangle, padding included.
    pub fn slot_bounds(&self, slot: SlotId) -> SlotRect {
        let (column, row) = self.slot_coords(slot);
        SlotRect {
            x: column * self.config.slot_width,
            y: row * self.config.slot_height,
            width: self.config.slot_width,
            height: self.config.slot_height,
        }
    }

    /// Cell rectangle with the padding removed on every side. This is where
    /// pixels are written.
    pub fn interior_bounds(&self, slot: SlotId) -> SlotRect {
        let bounds = self.slot_bounds(slot);
        let padding = self.config.padding;
        SlotRect {
            x: bounds.x + padding,
            y: bounds.y + padding,
            width: bounds.width - padding * 2,
            height: bounds.height - padding * 2,
        }
    }

    pub fn normalized_uv(&self, slot: SlotId) -> ([f32; 2], [f32; 2]) {
        let interior = self.interior_bounds(slot);
        let atlas_size = self.config.atlas_size as f32;
        let min = [interior.x as f32 / atlas_size, interior.y as f32 / atlas_size];
        let max = [
            (interior.x + interior.width) as f32 / atlas_size,
            (interior.y + interior.height) as f32 / atlas_size,
        ];
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(config: AtlasConfig) -> AtlasLayout {
        AtlasLayout::from_config(config).expect("valid atlas config")
    }

    #[test]
    fn default_geometry_matches_editor_atlas() {
        let layout = layout(AtlasConfig::default());
        assert_eq!(layout.columns(), 23);
        assert_eq!(layout.rows(), 30);
        assert_eq!(layout.capacity(), 690);
        assert_eq!(layout.max_slots(), 500);
    }

    #[test]
    fn slot_bounds_fill_rows_first() {
        let layout = layout(AtlasConfig::default());
        assert_eq!(
            layout.slot_bounds(SlotId::new(0)),
            SlotRect {
                x: 0,
                y: 0,
                width: 178,
                height: 133
            }
        );
        assert_eq!(layout.slot_bounds(SlotId::new(22)).x, 22 * 178);
        let wrapped = layout.slot_bounds(SlotId::new(23));
        assert_eq!((wrapped.x, wrapped.y), (0, 133));
    }

    #[test]
    fn interior_is_inset_by_padding() {
        let layout = layout(AtlasConfig::default());
        let interior = layout.interior_bounds(SlotId::new(24));
        assert_eq!(
            interior,
            SlotRect {
                x: 178 + 2,
                y: 133 + 2,
                width: 174,
                height: 129
            }
        );
    }

    #[test]
    fn uv_bounds_stay_in_unit_square_with_padded_extent() {
        let config = AtlasConfig::default();
        let layout = layout(config);
        let expected_w = (config.slot_width - 2 * config.padding) as f32 / config.atlas_size as f32;
        let expected_h =
            (config.slot_height - 2 * config.padding) as f32 / config.atlas_size as f32;
        for index in 0..layout.max_slots() {
            let (min, max) = layout.normalized_uv(SlotId::new(index));
            for value in min.iter().chain(max.iter()) {
                assert!((0.0..=1.0).contains(value), "slot {index} uv {value}");
            }
            assert!((max[0] - min[0] - expected_w).abs() < 1e-6);
            assert!((max[1] - min[1] - expected_h).abs() < 1e-6);
        }
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config: AtlasConfig =
            serde_json::from_str(r#"{ "max_slots": 64 }"#).expect("parse atlas config");
        assert_eq!(config.max_slots, 64);
        assert_eq!(config.slot_width, DEFAULT_SLOT_WIDTH);
        assert_eq!(config.atlas_size, DEFAULT_ATLAS_SIZE);
    }

    #[test]
    fn rejects_padding_that_swallows_the_slot() {
        let config = AtlasConfig {
            slot_width: 8,
            slot_height: 8,
            padding: 4,
            ..AtlasConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AtlasConfigError::PaddingTooLarge { padding: 4, .. })
        ));
    }

    #[test]
    fn rejects_max_slots_beyond_capacity() {
        let config = AtlasConfig {
            atlas_size: 64,
            slot_width: 32,
            slot_height: 32,
            padding: 1,
            max_slots: 5,
        };
        assert_eq!(
            config.validate(),
            Err(AtlasConfigError::MaxSlotsExceedCapacity {
                max_slots: 5,
                capacity: 4
            })
        );
    }

    #[test]
    fn rejects_zero_sizes() {
        let mut config = AtlasConfig::default();
        config.atlas_size = 0;
        assert_eq!(config.validate(), Err(AtlasConfigError::AtlasSizeZero));
        let mut config = AtlasConfig::default();
        config.slot_height = 0;
        assert_eq!(config.validate(), Err(AtlasConfigError::SlotSizeZero));
        let mut config = AtlasConfig::default();
        config.max_slots = 0;
        assert_eq!(config.validate(), Err(AtlasConfigError::MaxSlotsZero));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn slot_beyond_capacity_panics() {
        let layout = layout(AtlasConfig {
            atlas_size: 64,
            slot_width: 32,
            slot_height: 32,
            padding: 1,
            max_slots: 4,
        });
        let _ = layout.slot_bounds(SlotId::new(4));
    }
}
