use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};

use crate::detect::{check_range, SizeFilter};
use crate::emit::EmitSettings;
use crate::error::ConfigError;
use crate::tracker::RetentionPolicy;
use crate::zone::Zone;

const DEFAULT_DB_PATH: &str = "occupancy.db";
const DEFAULT_INPUT_DIR: &str = "data/detections";
const DEFAULT_FPS: f64 = 25.0;
const DEFAULT_FRAME_WIDTH: u32 = 1200;
const DEFAULT_FRAME_HEIGHT: u32 = 750;
const DEFAULT_CAPACITY: u32 = 25;
const DEFAULT_PERSON_CLASS_ID: i32 = 0;
const DEFAULT_IOU_THRESHOLD: f32 = 0.4;
const DEFAULT_ZONE: [[f32; 2]; 4] = [
    [565.0, 372.0],
    [853.0, 374.0],
    [1177.0, 703.0],
    [213.0, 709.0],
];

/// Everything fixed at the start of one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Counting polygon in frame pixels.
    pub zone: Vec<[f32; 2]>,
    pub capacity: u32,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Detector class counted as a passenger.
    pub person_class_id: i32,
    pub size_filter: SizeFilter,
    pub iou_threshold: f32,
    pub retention: RetentionPolicy,
    pub emit: EmitSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            zone: DEFAULT_ZONE.to_vec(),
            capacity: DEFAULT_CAPACITY,
            frame_width: DEFAULT_FRAME_WIDTH,
            frame_height: DEFAULT_FRAME_HEIGHT,
            person_class_id: DEFAULT_PERSON_CLASS_ID,
            size_filter: SizeFilter::default(),
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            retention: RetentionPolicy::default(),
            emit: EmitSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn zone(&self) -> Result<Zone, ConfigError> {
        Zone::from_pairs(&self.zone)
    }

    pub fn capacity(&self) -> Result<NonZeroU32, ConfigError> {
        NonZeroU32::new(self.capacity).ok_or(ConfigError::ZeroCapacity)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.zone()?;
        self.capacity()?;
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(ConfigError::InvalidFrameSize {
                width: self.frame_width,
                height: self.frame_height,
            });
        }
        self.size_filter.validate()?;
        check_range("iou_threshold", self.iou_threshold, f32::MIN_POSITIVE, 1.0)?;
        self.retention.validate()?;
        self.emit.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    db_path: Option<String>,
    input_dir: Option<PathBuf>,
    fps: Option<f64>,
    session: Option<SessionConfig>,
    #[serde(default)]
    sessions: BTreeMap<String, SessionConfig>,
}

/// Daemon configuration: where detections come from, where snapshots go, and
/// the session settings applied to each wagon.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db_path: String,
    pub input_dir: PathBuf,
    /// Frame rate used to derive stream time when a frame carries none.
    pub fps: f64,
    pub session: SessionConfig,
    /// Per-session replacements for `session`, keyed by session id.
    pub overrides: BTreeMap<String, SessionConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            fps: DEFAULT_FPS,
            session: SessionConfig::default(),
            overrides: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("OCCUPANCY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Settings for one session, honoring per-session overrides.
    pub fn session_config(&self, session_id: &str) -> &SessionConfig {
        self.overrides.get(session_id).unwrap_or(&self.session)
    }

    fn from_file(file: EngineConfigFile) -> Self {
        Self {
            db_path: file.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            input_dir: file
                .input_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR)),
            fps: file.fps.unwrap_or(DEFAULT_FPS),
            session: file.session.unwrap_or_default(),
            overrides: file.sessions,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("OCCUPANCY_DB_PATH") {
            if !path.trim().is_empty() {
                self.db_path = path;
            }
        }
        if let Ok(dir) = std::env::var("OCCUPANCY_INPUT_DIR") {
            if !dir.trim().is_empty() {
                self.input_dir = PathBuf::from(dir);
            }
        }
        if let Ok(capacity) = std::env::var("OCCUPANCY_CAPACITY") {
            self.session.capacity = capacity
                .trim()
                .parse()
                .map_err(|_| anyhow!("OCCUPANCY_CAPACITY must be a non-negative integer"))?;
        }
        if let Ok(interval) = std::env::var("OCCUPANCY_EMIT_INTERVAL_SECS") {
            self.session.emit.min_interval_secs = interval
                .trim()
                .parse()
                .map_err(|_| anyhow!("OCCUPANCY_EMIT_INTERVAL_SECS must be a number of seconds"))?;
        }
        if let Ok(retention) = std::env::var("OCCUPANCY_RETENTION") {
            self.session.retention = retention
                .parse()
                .map_err(|e| anyhow!("OCCUPANCY_RETENTION: {}", e))?;
        }
        if let Ok(history) = std::env::var("OCCUPANCY_HISTORY") {
            self.session.emit.history = parse_bool(&history)
                .ok_or_else(|| anyhow!("OCCUPANCY_HISTORY must be true or false"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(anyhow!("fps must be a positive number, got {}", self.fps));
        }
        self.session
            .validate()
            .map_err(|e| anyhow!("invalid session config: {}", e))?;
        for (id, session) in &self.overrides {
            crate::validate_session_id(id)?;
            session
                .validate()
                .map_err(|e| anyhow!("invalid session config for {}: {}", id, e))?;
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
