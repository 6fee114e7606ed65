use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::detect::TrackId;

/// Coarse fullness band shown on the dashboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyLevel {
    Empty,
    Light,
    Moderate,
    Crowded,
}

impl OccupancyLevel {
    pub fn from_percent(percent: f64) -> Self {
        if percent < 10.0 {
            OccupancyLevel::Empty
        } else if percent < 30.0 {
            OccupancyLevel::Light
        } else if percent < 60.0 {
            OccupancyLevel::Moderate
        } else {
            OccupancyLevel::Crowded
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyLevel::Empty => "empty",
            OccupancyLevel::Light => "light",
            OccupancyLevel::Moderate => "moderate",
            OccupancyLevel::Crowded => "crowded",
        }
    }
}

impl fmt::Display for OccupancyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `count / capacity` as a percentage, clamped to `[0, 100]`.
pub fn fullness_percent(count: usize, capacity: NonZeroU32) -> f64 {
    (count as f64 / capacity.get() as f64 * 100.0).clamp(0.0, 100.0)
}

/// Occupancy derived from the tracked set, not yet tied to a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Occupancy {
    pub count: u64,
    pub capacity: u32,
    pub fullness_percent: f64,
    pub level: OccupancyLevel,
}

impl Occupancy {
    pub fn at_frame(self, session_id: &str, frame_index: u64, at: f64) -> OccupancySnapshot {
        OccupancySnapshot {
            session_id: session_id.to_string(),
            count: self.count,
            capacity: self.capacity,
            fullness_percent: self.fullness_percent,
            level: self.level,
            frame_index,
            at,
        }
    }
}

/// Reduces the tracked set to a count and a fullness percentage.
pub fn aggregate(tracked: &BTreeSet<TrackId>, capacity: NonZeroU32) -> Occupancy {
    let fullness = fullness_percent(tracked.len(), capacity);
    Occupancy {
        count: tracked.len() as u64,
        capacity: capacity.get(),
        fullness_percent: fullness,
        level: OccupancyLevel::from_percent(fullness),
    }
}

/// Published occupancy state of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OccupancySnapshot {
    pub session_id: String,
    pub count: u64,
    pub capacity: u32,
    pub fullness_percent: f64,
    pub level: OccupancyLevel,
    pub frame_index: u64,
    /// Stream time in seconds.
    pub at: f64,
}
