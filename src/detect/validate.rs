use serde::{Deserialize, Serialize};

use crate::detect::result::{RawDetection, ValidatedDetection};
use crate::error::ConfigError;

const DEFAULT_MIN_WIDTH: f32 = 20.0;
const DEFAULT_MIN_HEIGHT: f32 = 40.0;
const DEFAULT_MAX_WIDTH_RATIO: f32 = 0.8;
const DEFAULT_MAX_HEIGHT_RATIO: f32 = 0.9;

/// Returns true when a detection has a plausible size for the frame.
///
/// Boxes narrower than `min_w` or shorter than `min_h` are spurious; boxes
/// wider than `frame_width * max_w_ratio` or taller than
/// `frame_height * max_h_ratio` are artifacts. Degenerate geometry is rejected.
pub fn validate(
    raw: &RawDetection,
    frame_width: f32,
    frame_height: f32,
    min_w: f32,
    min_h: f32,
    max_w_ratio: f32,
    max_h_ratio: f32,
) -> bool {
    if !raw.has_valid_geometry() {
        return false;
    }

    let (width, height) = (raw.width(), raw.height());
    if width < min_w || height < min_h {
        return false;
    }

    width <= frame_width * max_w_ratio && height <= frame_height * max_h_ratio
}

/// Size thresholds applied to every person detection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizeFilter {
    pub min_width: f32,
    pub min_height: f32,
    pub max_width_ratio: f32,
    pub max_height_ratio: f32,
}

impl Default for SizeFilter {
    fn default() -> Self {
        Self {
            min_width: DEFAULT_MIN_WIDTH,
            min_height: DEFAULT_MIN_HEIGHT,
            max_width_ratio: DEFAULT_MAX_WIDTH_RATIO,
            max_height_ratio: DEFAULT_MAX_HEIGHT_RATIO,
        }
    }
}

impl SizeFilter {
    pub fn accepts(&self, raw: &RawDetection, frame_width: f32, frame_height: f32) -> bool {
        validate(
            raw,
            frame_width,
            frame_height,
            self.min_width,
            self.min_height,
            self.max_width_ratio,
            self.max_height_ratio,
        )
    }

    /// Promotes a raw detection once it passes the filter.
    pub fn check(
        &self,
        raw: &RawDetection,
        frame_width: f32,
        frame_height: f32,
    ) -> Option<ValidatedDetection> {
        self.accepts(raw, frame_width, frame_height)
            .then(|| ValidatedDetection::new(*raw))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("size_filter.min_width", self.min_width, 0.0, f32::MAX)?;
        check_range("size_filter.min_height", self.min_height, 0.0, f32::MAX)?;
        check_range("size_filter.max_width_ratio", self.max_width_ratio, f32::MIN_POSITIVE, 1.0)?;
        check_range("size_filter.max_height_ratio", self.max_height_ratio, f32::MIN_POSITIVE, 1.0)?;
        Ok(())
    }
}

pub(crate) fn check_range(
    name: &'static str,
    value: f32,
    min: f32,
    max: f32,
) -> Result<(), ConfigError> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::InvalidThreshold {
            name,
            value: value as f64,
        });
    }
    Ok(())
}
