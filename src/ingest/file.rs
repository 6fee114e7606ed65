//! JSON-lines detection dumps.
//!
//! One frame per line:
//!
//! ```text
//! {"frame": 12, "t": 0.48, "boxes": [[x1, y1, x2, y2, track_id, conf, cls], ...]}
//! ```
//!
//! `t` is optional and falls back to `frame / fps`. Rows may omit the track id
//! (six numbers). A line that does not parse is skipped; a malformed row is
//! dropped on its own.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use super::DetectionSource;
use crate::detect::RawDetection;
use crate::session::Frame;

const SESSION_FILE_EXTENSION: &str = "jsonl";

#[derive(Debug, Deserialize)]
struct FrameLine {
    frame: u64,
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    boxes: Vec<serde_json::Value>,
}

/// Statistics for a file source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileStats {
    pub frames_read: u64,
    pub lines_skipped: u64,
    pub rows_dropped: u64,
    pub path: String,
}

pub struct FileSource {
    lines: Lines<BufReader<File>>,
    fps: f64,
    line_no: u64,
    stats: FileStats,
}

impl FileSource {
    pub fn open(path: &Path, fps: f64) -> Result<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(anyhow!("fps must be positive, got {}", fps));
        }
        let file = File::open(path)
            .map_err(|e| anyhow!("failed to open detections {}: {}", path.display(), e))?;
        log::info!("FileSource: reading {}", path.display());
        Ok(Self {
            lines: BufReader::new(file).lines(),
            fps,
            line_no: 0,
            stats: FileStats {
                path: path.display().to_string(),
                ..FileStats::default()
            },
        })
    }

    pub fn stats(&self) -> FileStats {
        self.stats.clone()
    }

    fn parse_line(&mut self, line: &str) -> Option<Frame> {
        let parsed: FrameLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.stats.lines_skipped += 1;
                log::warn!(
                    "{}:{}: skipping unparseable frame: {}",
                    self.stats.path,
                    self.line_no,
                    e
                );
                return None;
            }
        };

        let mut detections = Vec::with_capacity(parsed.boxes.len());
        for value in &parsed.boxes {
            match parse_row(value) {
                Ok(det) => detections.push(det),
                Err(e) => {
                    self.stats.rows_dropped += 1;
                    log::debug!(
                        "{}:{}: dropping detection row {}: {}",
                        self.stats.path,
                        self.line_no,
                        value,
                        e
                    );
                }
            }
        }

        Some(Frame {
            index: parsed.frame,
            at: parsed.t.unwrap_or(parsed.frame as f64 / self.fps),
            detections,
        })
    }
}

impl DetectionSource for FileSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line
                .map_err(|e| anyhow!("failed to read {}: {}", self.stats.path, e))?;
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            if let Some(frame) = self.parse_line(&line) {
                self.stats.frames_read += 1;
                return Ok(Some(frame));
            }
        }
    }
}

fn parse_row(value: &serde_json::Value) -> Result<RawDetection> {
    let cells = value
        .as_array()
        .ok_or_else(|| anyhow!("detection row is not an array"))?;
    let row = cells
        .iter()
        .map(|cell| cell.as_f64())
        .collect::<Option<Vec<f64>>>()
        .ok_or_else(|| anyhow!("detection row has a non-numeric cell"))?;
    Ok(RawDetection::from_row(&row)?)
}

/// A detection dump and the session it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionFile {
    pub session_id: String,
    pub path: PathBuf,
}

/// Every `*.jsonl` file in `dir`, sorted by path; the file stem names the session.
pub fn discover_sessions(dir: &Path) -> Result<Vec<SessionFile>> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| anyhow!("failed to list detections dir {}: {}", dir.display(), e))?;

    let mut sessions = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_dump = path.is_file()
            && path
                .extension()
                .is_some_and(|ext| ext == SESSION_FILE_EXTENSION);
        if !is_dump {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            log::warn!("skipping {}: file name is not valid UTF-8", path.display());
            continue;
        };
        if let Err(e) = crate::validate_session_id(stem) {
            log::warn!("skipping {}: {}", path.display(), e);
            continue;
        }
        sessions.push(SessionFile {
            session_id: stem.to_string(),
            path,
        });
    }
    sessions.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_dump(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn reads_frames_and_skips_bad_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dump(
            dir.path(),
            "wagon_1.jsonl",
            concat!(
                "{\"frame\": 0, \"t\": 0.0, \"boxes\": [[10, 20, 40, 90, 1, 0.9, 0]]}\n",
                "\n",
                "not json\n",
                "{\"frame\": 1, \"boxes\": [[10, 20, 40, 90, 0.8, 0], [1, 2, 3], [1, 2, null, 4, 5, 6]]}\n",
                "{\"frame\": 2, \"t\": 0.5, \"boxes\": []}\n",
            ),
        );

        let mut source = FileSource::open(&path, 25.0).unwrap();
        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.detections[0].track_id, Some(1));

        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.at, 1.0 / 25.0);
        assert_eq!(second.detections.len(), 1);
        assert_eq!(second.detections[0].track_id, None);

        let third = source.next_frame().unwrap().unwrap();
        assert!(third.detections.is_empty());
        assert!(source.next_frame().unwrap().is_none());

        let stats = source.stats();
        assert_eq!(stats.frames_read, 3);
        assert_eq!(stats.lines_skipped, 1);
        assert_eq!(stats.rows_dropped, 2);
    }

    #[test]
    fn discovers_sessions_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_dump(dir.path(), "wagon_b.jsonl", "");
        write_dump(dir.path(), "wagon_a.jsonl", "");
        write_dump(dir.path(), "notes.txt", "");
        write_dump(dir.path(), "bad name.jsonl", "");

        let sessions = discover_sessions(dir.path()).unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["wagon_a", "wagon_b"]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSource::open(&dir.path().join("absent.jsonl"), 25.0).is_err());
    }
}
