//! Wagon Occupancy Engine
//!
//! Counts passengers inside a fixed floor polygon of a subway wagon from
//! per-frame person detections, and publishes rate-limited occupancy
//! snapshots.
//!
//! # Pipeline
//!
//! Each frame flows one way through five stages:
//!
//! 1. **Validate** (`detect::validate`): size and geometry plausibility.
//! 2. **Suppress** (`detect::suppress`): class-aware non-maximum suppression.
//! 3. **Track** (`tracker`): per-identity zone membership.
//! 4. **Aggregate** (`occupancy`): count and fullness percentage.
//! 5. **Emit** (`emit`): rate-limited writes to an `OccupancySink`.
//!
//! A `Session` owns the per-wagon state; sessions share nothing but the sink.
//!
//! # Module Structure
//!
//! - `config`: session settings and daemon configuration loading
//! - `ingest`: detection dumps and synthetic sources
//! - `storage`: SQLite and in-memory sinks

use std::sync::OnceLock;

pub mod config;
pub mod detect;
pub mod emit;
pub mod error;
pub mod ingest;
pub mod occupancy;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod zone;

pub use config::{EngineConfig, SessionConfig};
pub use detect::{RawDetection, SizeFilter, TrackId, ValidatedDetection};
pub use emit::{ChannelOutcome, EmitSettings, Emission, SnapshotEmitter};
pub use error::ConfigError;
pub use ingest::{DetectionSource, FileSource, SyntheticSource};
pub use occupancy::{OccupancyLevel, OccupancySnapshot};
pub use session::{Frame, FrameReport, Session};
pub use storage::{InMemoryOccupancySink, OccupancySink, SqliteOccupancySink};
pub use tracker::{DetectionStatus, RetentionPolicy, ZoneTracker};
pub use zone::Zone;

/// Session ids double as database keys and file stems.
pub fn validate_session_id(session_id: &str) -> Result<(), ConfigError> {
    // Compile once for hot paths.
    static SESSION_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = SESSION_ID_RE
        .get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_.-]{1,128}$").unwrap());

    if !re.is_match(session_id) {
        return Err(ConfigError::InvalidSessionId(session_id.to_string()));
    }
    Ok(())
}
