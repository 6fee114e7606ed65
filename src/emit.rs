//! Rate-limited publication of occupancy snapshots.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::occupancy::OccupancySnapshot;
use crate::storage::OccupancySink;

/// Whether a snapshot at `at` may be published given the previous emission.
///
/// The first snapshot is always due. A clock that moved backwards counts as
/// due so a rewound stream does not go silent.
pub fn is_due(at: f64, last_emit_time: Option<f64>, min_interval_seconds: f64) -> bool {
    match last_emit_time {
        None => true,
        Some(last) => {
            let elapsed = at - last;
            elapsed < 0.0 || elapsed >= min_interval_seconds
        }
    }
}

/// Returns the snapshot when it is due for publication.
pub fn maybe_emit(
    snapshot: OccupancySnapshot,
    last_emit_time: Option<f64>,
    min_interval_seconds: f64,
) -> Option<OccupancySnapshot> {
    if is_due(snapshot.at, last_emit_time, min_interval_seconds) {
        Some(snapshot)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitSettings {
    pub min_interval_secs: f64,
    /// Append one history record per emission.
    pub history: bool,
}

impl Default for EmitSettings {
    fn default() -> Self {
        Self {
            min_interval_secs: 1.0,
            history: true,
        }
    }
}

impl EmitSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.min_interval_secs.is_finite() || self.min_interval_secs < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "emit.min_interval_secs",
                value: self.min_interval_secs,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOutcome {
    Written,
    Failed,
    Disabled,
    /// The same snapshot is already on record.
    Unchanged,
}

/// What happened to each sink channel during one emission.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emission {
    pub current: ChannelOutcome,
    pub history: ChannelOutcome,
}

impl Emission {
    pub fn any_failed(&self) -> bool {
        self.current == ChannelOutcome::Failed || self.history == ChannelOutcome::Failed
    }
}

/// Per-session emitter state.
#[derive(Clone, Debug)]
pub struct SnapshotEmitter {
    settings: EmitSettings,
    last_emit_at: Option<f64>,
    last_frame_index: Option<u64>,
    last_history: Option<OccupancySnapshot>,
    failures: u64,
}

impl SnapshotEmitter {
    pub fn new(settings: EmitSettings) -> Self {
        Self {
            settings,
            last_emit_at: None,
            last_frame_index: None,
            last_history: None,
            failures: 0,
        }
    }

    pub fn settings(&self) -> EmitSettings {
        self.settings
    }

    pub fn last_emit_at(&self) -> Option<f64> {
        self.last_emit_at
    }

    /// Channel writes that failed over the session so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Publishes `snapshot` if the interval has elapsed.
    ///
    /// Snapshots older than the last published frame are never written, so
    /// the published sequence is non-decreasing in `frame_index`.
    pub fn offer(
        &mut self,
        snapshot: &OccupancySnapshot,
        sink: &mut dyn OccupancySink,
    ) -> Option<Emission> {
        if self
            .last_frame_index
            .is_some_and(|last| snapshot.frame_index < last)
        {
            return None;
        }
        let due = maybe_emit(
            snapshot.clone(),
            self.last_emit_at,
            self.settings.min_interval_secs,
        )?;
        Some(self.write(&due, sink))
    }

    /// Publishes `snapshot` regardless of the interval.
    ///
    /// History is not appended again when the last successful append holds
    /// the identical snapshot; the current channel is always rewritten.
    pub fn flush(
        &mut self,
        snapshot: &OccupancySnapshot,
        sink: &mut dyn OccupancySink,
    ) -> Emission {
        self.write(snapshot, sink)
    }

    fn write(&mut self, snapshot: &OccupancySnapshot, sink: &mut dyn OccupancySink) -> Emission {
        // Advance even on failure; the next interval retries with fresher state.
        self.last_emit_at = Some(snapshot.at);
        self.last_frame_index = Some(
            self.last_frame_index
                .map_or(snapshot.frame_index, |last| last.max(snapshot.frame_index)),
        );

        let current = match sink.upsert_current(snapshot) {
            Ok(()) => ChannelOutcome::Written,
            Err(e) => {
                log::warn!(
                    "session {}: current occupancy write failed at frame {}: {}",
                    snapshot.session_id,
                    snapshot.frame_index,
                    e
                );
                ChannelOutcome::Failed
            }
        };

        let history = if !self.settings.history {
            ChannelOutcome::Disabled
        } else if self.last_history.as_ref() == Some(snapshot) {
            ChannelOutcome::Unchanged
        } else {
            match sink.append_history(snapshot) {
                Ok(()) => {
                    self.last_history = Some(snapshot.clone());
                    ChannelOutcome::Written
                }
                Err(e) => {
                    log::warn!(
                        "session {}: history append failed at frame {}: {}",
                        snapshot.session_id,
                        snapshot.frame_index,
                        e
                    );
                    ChannelOutcome::Failed
                }
            }
        };

        let emission = Emission { current, history };
        if emission.current == ChannelOutcome::Failed {
            self.failures += 1;
        }
        if emission.history == ChannelOutcome::Failed {
            self.failures += 1;
        }
        emission
    }
}
