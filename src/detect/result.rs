use std::ops::Deref;

use nalgebra as na;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity assigned by the upstream tracker. Only valid within one session.
pub type TrackId = i64;

/// Reasons a detector row cannot become a `RawDetection`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("detection row has {0} fields, expected 6 or 7")]
    FieldCount(usize),
    #[error("detection row contains a non-finite value")]
    NonFinite,
    #[error("{field} must be an integer, got {value}")]
    NotInteger { field: &'static str, value: f64 },
}

/// One detector box in the frame's resized pixel space.
///
/// `(x1, y1)` is the top-left corner and `(x2, y2)` the bottom-right corner.
/// Nothing guarantees the corners are ordered; the validator rejects boxes
/// whose geometry is degenerate.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(default)]
    pub track_id: Option<TrackId>,
    pub confidence: f32,
    pub class_id: i32,
}

impl RawDetection {
    /// Builds a detection from a detector row.
    ///
    /// Rows are either `(x1, y1, x2, y2, track_id, confidence, class_id)` or
    /// `(x1, y1, x2, y2, confidence, class_id)` when the tracker assigned no identity.
    pub fn from_row(row: &[f64]) -> Result<Self, DetectionError> {
        let (coords, track_id, confidence, class_id) = match *row {
            [x1, y1, x2, y2, track, conf, class] => ([x1, y1, x2, y2], Some(track), conf, class),
            [x1, y1, x2, y2, conf, class] => ([x1, y1, x2, y2], None, conf, class),
            _ => return Err(DetectionError::FieldCount(row.len())),
        };

        if row.iter().any(|v| !v.is_finite()) {
            return Err(DetectionError::NonFinite);
        }

        let track_id = match track_id {
            Some(value) => Some(integer_field("track_id", value)?),
            None => None,
        };
        let class_id = i32::try_from(integer_field("class_id", class_id)?).map_err(|_| {
            DetectionError::NotInteger {
                field: "class_id",
                value: class_id,
            }
        })?;

        Ok(Self {
            x1: coords[0] as f32,
            y1: coords[1] as f32,
            x2: coords[2] as f32,
            y2: coords[3] as f32,
            track_id,
            confidence: confidence as f32,
            class_id,
        })
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Box area; zero for inverted boxes.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Bottom-center of the box, approximating where the person stands.
    #[inline]
    pub fn anchor(&self) -> na::Point2<f32> {
        na::Point2::new((self.x1 + self.x2) / 2.0, self.y2)
    }

    /// True when every value is finite and both corners are strictly ordered.
    pub fn has_valid_geometry(&self) -> bool {
        [self.x1, self.y1, self.x2, self.y2, self.confidence]
            .iter()
            .all(|v| v.is_finite())
            && self.x2 > self.x1
            && self.y2 > self.y1
    }
}

fn integer_field(field: &'static str, value: f64) -> Result<i64, DetectionError> {
    if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
        return Err(DetectionError::NotInteger { field, value });
    }
    Ok(value as i64)
}

/// A detection that passed the size filter.
///
/// Only `SizeFilter::check` produces these, so downstream stages can rely on
/// well-formed geometry.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidatedDetection(RawDetection);

impl ValidatedDetection {
    pub(crate) fn new(raw: RawDetection) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &RawDetection {
        &self.0
    }

    pub fn into_raw(self) -> RawDetection {
        self.0
    }
}

impl Deref for ValidatedDetection {
    type Target = RawDetection;

    fn deref(&self) -> &RawDetection {
        &self.0
    }
}
