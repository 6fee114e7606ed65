//! Detection sources.
//!
//! - JSON-lines detection dumps, one file per wagon
//! - Seeded synthetic walkers for demos and soak tests
//!
//! Sources yield `Frame`s in stream order until exhausted. Decoding video and
//! running the detector happen upstream; only box rows reach this crate.

pub mod file;
pub mod synthetic;

use anyhow::Result;

use crate::session::Frame;

pub use file::{discover_sessions, FileSource, FileStats, SessionFile};
pub use synthetic::{SyntheticConfig, SyntheticSource};

pub trait DetectionSource {
    /// Next frame, or `None` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}
