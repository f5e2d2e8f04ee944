use std::fmt;

use super::error::DomainError;

pub const DEFAULT_MAX_BYTES: usize = 1_048_576;
pub const AVATAR_MAX_DIMENSION_PX: u32 = 800;
pub const DIMENSION_FLOOR_PX: u32 = 200;
pub const SHRINK_FACTOR: f64 = 0.9;

// 呼び出し側が毎回明示的に渡す。隠れたデフォルトは持たない
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingBudget {
    max_bytes: usize,
    max_dimension_px: u32,
}

impl EncodingBudget {
    pub fn new(max_bytes: usize, max_dimension_px: u32) -> Result<Self, DomainError> {
        if max_bytes == 0 {
            return Err(DomainError::InvalidBudget("maxBytes must be greater than zero".to_string()));
        }
        if max_dimension_px == 0 {
            return Err(DomainError::InvalidBudget("maxDimensionPx must be greater than zero".to_string()));
        }
        Ok(Self { max_bytes, max_dimension_px })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn max_dimension_px(&self) -> u32 {
        self.max_dimension_px
    }

    pub fn fits(&self, encoded_size: usize) -> bool {
        encoded_size <= self.max_bytes
    }
}

/// A rung on the JPEG quality ladder, held in tenths (9 = 0.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub const START: Quality = Quality(9);
    pub const FLOOR: Quality = Quality(1);

    pub fn tenths(self) -> u8 {
        self.0
    }

    pub fn as_f32(self) -> f32 {
        f32::from(self.0) / 10.0
    }

    // image クレートの JPEG エンコーダは 1..=100 のスケール
    pub fn jpeg_quality(self) -> u8 {
        self.0 * 10
    }

    /// Next rung down, or `None` once the floor (0.1) has been tried.
    pub fn step_down(self) -> Option<Quality> {
        if self > Self::FLOOR {
            Some(Quality(self.0 - 1))
        } else {
            None
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0.{}", self.0)
    }
}

// 縮小は常に元画像サイズ × 累積スケールから計算する (丸め誤差でアスペクト比がずれないように)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSize {
    source_width: u32,
    source_height: u32,
    scale: f64,
}

impl RenderSize {
    pub fn clamped(source_width: u32, source_height: u32, max_dimension_px: u32) -> Self {
        let long_edge = source_width.max(source_height);
        let scale = if long_edge > max_dimension_px {
            f64::from(max_dimension_px) / f64::from(long_edge)
        } else {
            1.0
        };
        Self {
            source_width,
            source_height,
            scale,
        }
    }

    pub fn width(&self) -> u32 {
        scaled(self.source_width, self.scale)
    }

    pub fn height(&self) -> u32 {
        scaled(self.source_height, self.scale)
    }

    pub fn is_source_size(&self) -> bool {
        self.width() == self.source_width && self.height() == self.source_height
    }

    pub fn can_shrink(&self) -> bool {
        self.width() > DIMENSION_FLOOR_PX && self.height() > DIMENSION_FLOOR_PX
    }

    pub fn shrunk(&self) -> Self {
        Self {
            scale: self.scale * SHRINK_FACTOR,
            ..*self
        }
    }
}

fn scaled(length: u32, scale: f64) -> u32 {
    ((f64::from(length) * scale).round() as u32).max(1)
}
