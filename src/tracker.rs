//! Per-identity zone membership.
//!
//! Each track id is `unseen` until its anchor is observed inside the zone,
//! after which it is `tracked`. Whether a tracked identity can ever leave the
//! tracked set is decided by the session's `RetentionPolicy`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::detect::{TrackId, ValidatedDetection};
use crate::error::ConfigError;
use crate::zone::Zone;

/// When a counted identity may be removed from the tracked set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Counted identities stay counted for the rest of the session.
    #[default]
    Sticky,
    /// Evicted as soon as the anchor is observed outside the zone.
    ExitOnLeave,
    /// Evicted once an observed anchor is outside the zone and farther than
    /// `threshold` pixels from the zone centroid.
    DistanceEvict { threshold: f32 },
}

impl RetentionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let RetentionPolicy::DistanceEvict { threshold } = *self {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    name: "retention.threshold",
                    value: threshold as f64,
                });
            }
        }
        Ok(())
    }

    /// Whether an outside observation at `distance` from the centroid evicts.
    fn evicts(&self, distance: f32) -> bool {
        match *self {
            RetentionPolicy::Sticky => false,
            RetentionPolicy::ExitOnLeave => true,
            RetentionPolicy::DistanceEvict { threshold } => distance > threshold,
        }
    }
}

impl FromStr for RetentionPolicy {
    type Err = ConfigError;

    /// Parses `sticky`, `exit_on_leave` or `distance:<px>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        let policy = match value.as_str() {
            "sticky" => RetentionPolicy::Sticky,
            "exit_on_leave" => RetentionPolicy::ExitOnLeave,
            other => {
                let threshold = other
                    .strip_prefix("distance:")
                    .and_then(|px| px.trim().parse::<f32>().ok())
                    .ok_or_else(|| ConfigError::InvalidRetention(s.to_string()))?;
                RetentionPolicy::DistanceEvict { threshold }
            }
        };
        policy.validate()?;
        Ok(policy)
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionPolicy::Sticky => write!(f, "sticky"),
            RetentionPolicy::ExitOnLeave => write!(f, "exit_on_leave"),
            RetentionPolicy::DistanceEvict { threshold } => write!(f, "distance:{}", threshold),
        }
    }
}

/// Per-detection status for overlay rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    /// Anchor is inside the zone this frame.
    InZone,
    /// Outside the zone this frame but still counted.
    Tracked,
    /// Outside the zone and not counted.
    Outside,
    /// No track id; never counted.
    Unidentified,
    /// Not the counted object class.
    OtherClass,
}

/// Result of feeding one frame to the tracker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameMembership {
    /// Identities whose anchor is inside the zone this frame.
    pub in_zone: BTreeSet<TrackId>,
    /// One status per input detection, in input order.
    pub statuses: Vec<DetectionStatus>,
    pub admitted: Vec<TrackId>,
    pub evicted: Vec<TrackId>,
}

#[derive(Clone, Copy, Debug)]
struct Sighting {
    inside: bool,
    nearest: f32,
}

/// Zone membership state machine for one session.
#[derive(Clone, Debug)]
pub struct ZoneTracker {
    zone: Zone,
    policy: RetentionPolicy,
    tracked: BTreeSet<TrackId>,
}

impl ZoneTracker {
    pub fn new(zone: Zone, policy: RetentionPolicy) -> Self {
        Self {
            zone,
            policy,
            tracked: BTreeSet::new(),
        }
    }

    pub fn zone(&self) -> &Zone {
        &self.zone
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Cumulative set of counted identities.
    pub fn tracked(&self) -> &BTreeSet<TrackId> {
        &self.tracked
    }

    pub fn is_tracked(&self, id: TrackId) -> bool {
        self.tracked.contains(&id)
    }

    /// Applies one frame of detections.
    ///
    /// Detections without a track id are reported but never change state.
    /// Identities missing from the frame are left untouched. When one id shows
    /// up several times, any inside sighting wins, otherwise the sighting
    /// nearest to the centroid decides eviction.
    pub fn observe(&mut self, detections: &[ValidatedDetection]) -> FrameMembership {
        let mut sightings: BTreeMap<TrackId, Sighting> = BTreeMap::new();
        let mut anchors_inside = Vec::with_capacity(detections.len());

        for det in detections {
            let anchor = det.anchor();
            let inside = self.zone.contains(&anchor);
            anchors_inside.push(inside);

            let Some(id) = det.track_id else {
                continue;
            };
            let distance = self.zone.distance_from_centroid(&anchor);
            sightings
                .entry(id)
                .and_modify(|s| {
                    s.inside |= inside;
                    s.nearest = s.nearest.min(distance);
                })
                .or_insert(Sighting {
                    inside,
                    nearest: distance,
                });
        }

        let mut membership = FrameMembership::default();

        for (&id, sighting) in &sightings {
            if sighting.inside {
                membership.in_zone.insert(id);
                if self.tracked.insert(id) {
                    membership.admitted.push(id);
                }
            } else if self.tracked.contains(&id) && self.policy.evicts(sighting.nearest) {
                self.tracked.remove(&id);
                membership.evicted.push(id);
            }
        }

        if !membership.admitted.is_empty() || !membership.evicted.is_empty() {
            log::debug!(
                "membership change: admitted={:?} evicted={:?} tracked={}",
                membership.admitted,
                membership.evicted,
                self.tracked.len()
            );
        }

        membership.statuses = detections
            .iter()
            .zip(anchors_inside)
            .map(|(det, inside)| match det.track_id {
                None => DetectionStatus::Unidentified,
                Some(_) if inside => DetectionStatus::InZone,
                Some(id) if self.tracked.contains(&id) => DetectionStatus::Tracked,
                Some(_) => DetectionStatus::Outside,
            })
            .collect();

        membership
    }
}
