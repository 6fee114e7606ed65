//! One wagon's occupancy pipeline.
//!
//! A `Session` owns everything that changes across frames for one video: the
//! tracked set and the emitter clock. Frames must be fed one at a time; each
//! call runs validate, suppress, track, aggregate and emit before returning.

use std::collections::BTreeSet;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::detect::{suppress, RawDetection, TrackId, ValidatedDetection};
use crate::emit::{Emission, SnapshotEmitter};
use crate::error::ConfigError;
use crate::occupancy::{aggregate, OccupancySnapshot};
use crate::storage::OccupancySink;
use crate::tracker::{DetectionStatus, ZoneTracker};

/// Detector output for a single frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub index: u64,
    /// Stream time in seconds.
    pub at: f64,
    pub detections: Vec<RawDetection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportedDetection {
    pub detection: RawDetection,
    pub status: DetectionStatus,
}

/// Per-frame output for overlay rendering.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameReport {
    pub frame_index: u64,
    /// Surviving person detections followed by other classes.
    pub detections: Vec<ReportedDetection>,
    /// Person detections dropped by the size filter.
    pub rejected: usize,
    /// Person detections dropped as duplicates.
    pub suppressed: usize,
    pub in_zone: BTreeSet<TrackId>,
    pub tracked: BTreeSet<TrackId>,
    pub snapshot: OccupancySnapshot,
    /// `None` when nothing was published for this frame.
    pub emission: Option<Emission>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames: u64,
    pub out_of_order: u64,
    pub rejected: u64,
    pub suppressed: u64,
    pub emissions: u64,
}

pub struct Session {
    id: String,
    config: SessionConfig,
    capacity: NonZeroU32,
    tracker: ZoneTracker,
    emitter: SnapshotEmitter,
    latest: Option<(u64, f64)>,
    stats: SessionStats,
}

impl Session {
    pub fn start(id: &str, config: SessionConfig) -> Result<Self, ConfigError> {
        crate::validate_session_id(id)?;
        config.validate()?;
        let zone = config.zone()?;
        let capacity = config.capacity()?;
        let tracker = ZoneTracker::new(zone, config.retention);
        let emitter = SnapshotEmitter::new(config.emit);

        log::info!(
            "session {} started (capacity={}, retention={}, emit every {}s, history={})",
            id,
            capacity,
            config.retention,
            config.emit.min_interval_secs,
            config.emit.history
        );

        Ok(Self {
            id: id.to_string(),
            config,
            capacity,
            tracker,
            emitter,
            latest: None,
            stats: SessionStats::default(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn tracked(&self) -> &BTreeSet<TrackId> {
        self.tracker.tracked()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Occupancy as of the newest frame processed so far.
    pub fn snapshot(&self) -> OccupancySnapshot {
        let (frame_index, at) = self.latest.unwrap_or((0, 0.0));
        aggregate(self.tracker.tracked(), self.capacity).at_frame(&self.id, frame_index, at)
    }

    /// Runs one frame through the pipeline.
    ///
    /// A frame older than one already processed still updates membership, but
    /// its snapshot is not published.
    pub fn process_frame(&mut self, frame: &Frame, sink: &mut dyn OccupancySink) -> FrameReport {
        self.stats.frames += 1;

        let (persons, others): (Vec<&RawDetection>, Vec<&RawDetection>) = frame
            .detections
            .iter()
            .partition(|det| det.class_id == self.config.person_class_id);

        let frame_width = self.config.frame_width as f32;
        let frame_height = self.config.frame_height as f32;
        let validated: Vec<ValidatedDetection> = persons
            .iter()
            .filter_map(|raw| {
                let checked = self.config.size_filter.check(raw, frame_width, frame_height);
                if checked.is_none() {
                    log::debug!(
                        "session {} frame {}: rejected detection {:?}",
                        self.id,
                        frame.index,
                        raw
                    );
                }
                checked
            })
            .collect();
        let rejected = persons.len() - validated.len();

        let survivors = suppress(&validated, self.config.iou_threshold);
        let suppressed = validated.len() - survivors.len();

        let membership = self.tracker.observe(&survivors);
        let occupancy = aggregate(self.tracker.tracked(), self.capacity);
        let snapshot = occupancy.at_frame(&self.id, frame.index, frame.at);

        let in_order = self.latest.map_or(true, |(last, _)| frame.index >= last);
        let emission = if in_order {
            self.latest = Some((frame.index, frame.at));
            self.emitter.offer(&snapshot, sink)
        } else {
            self.stats.out_of_order += 1;
            log::debug!(
                "session {}: frame {} arrived after frame {:?}; not publishing",
                self.id,
                frame.index,
                self.latest.map(|(last, _)| last)
            );
            None
        };

        self.stats.rejected += rejected as u64;
        self.stats.suppressed += suppressed as u64;
        if emission.is_some() {
            self.stats.emissions += 1;
        }

        let mut detections: Vec<ReportedDetection> = survivors
            .iter()
            .zip(membership.statuses)
            .map(|(det, status)| ReportedDetection {
                detection: *det.raw(),
                status,
            })
            .collect();
        detections.extend(others.into_iter().map(|raw| ReportedDetection {
            detection: *raw,
            status: DetectionStatus::OtherClass,
        }));

        FrameReport {
            frame_index: frame.index,
            detections,
            rejected,
            suppressed,
            in_zone: membership.in_zone,
            tracked: self.tracker.tracked().clone(),
            snapshot,
            emission,
        }
    }

    /// Publishes the final state regardless of the emit interval.
    pub fn finish(mut self, sink: &mut dyn OccupancySink) -> OccupancySnapshot {
        let snapshot = self.snapshot();
        let emission = self.emitter.flush(&snapshot, sink);
        if emission.any_failed() {
            log::warn!("session {}: final snapshot was not fully written", self.id);
        }
        log::info!(
            "session {} finished: frames={} total_passengers={} fullness={:.1}% ({}) \
             rejected={} suppressed={} out_of_order={} sink_failures={}",
            self.id,
            self.stats.frames,
            snapshot.count,
            snapshot.fullness_percent,
            snapshot.level,
            self.stats.rejected,
            self.stats.suppressed,
            self.stats.out_of_order,
            self.emitter.failures()
        );
        snapshot
    }
}
