//! occupancyd - wagon occupancy daemon
//!
//! This daemon:
//! 1. Loads `EngineConfig` (file named by OCCUPANCY_CONFIG, then env overrides)
//! 2. Discovers one detection dump per wagon in the input directory
//! 3. Runs each wagon as an independent session on its own thread
//! 4. Publishes snapshots to the SQLite sink, one connection per session
//! 5. Stops reading frames on Ctrl-C and flushes the final state

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use wagon_occupancy::ingest::{discover_sessions, DetectionSource, FileSource, SessionFile};
use wagon_occupancy::{EngineConfig, OccupancySnapshot, Session, SqliteOccupancySink};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = EngineConfig::load()?;
    let sessions = discover_sessions(&cfg.input_dir)?;
    if sessions.is_empty() {
        return Err(anyhow!(
            "no *.jsonl detection dumps found in {}",
            cfg.input_dir.display()
        ));
    }

    // Create the schema once before sessions race to open the db.
    SqliteOccupancySink::open(&cfg.db_path)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;
    }

    log::info!(
        "occupancyd running: {} session(s) from {}, writing to {}",
        sessions.len(),
        cfg.input_dir.display(),
        cfg.db_path
    );

    let handles: Vec<(String, JoinHandle<Result<OccupancySnapshot>>)> = sessions
        .into_iter()
        .map(|file| {
            let id = file.session_id.clone();
            let cfg = cfg.clone();
            let stop = Arc::clone(&stop);
            let handle = std::thread::spawn(move || run_session(&cfg, file, &stop));
            (id, handle)
        })
        .collect();

    let mut failed = 0usize;
    for (id, handle) in handles {
        match handle.join() {
            Ok(Ok(snapshot)) => log::info!(
                "session {}: {} passengers, {:.1}% full ({})",
                id,
                snapshot.count,
                snapshot.fullness_percent,
                snapshot.level
            ),
            Ok(Err(e)) => {
                failed += 1;
                log::error!("session {} failed: {}", id, e);
            }
            Err(_) => {
                failed += 1;
                log::error!("session {} panicked", id);
            }
        }
    }

    if failed > 0 {
        return Err(anyhow!("{} session(s) failed", failed));
    }
    Ok(())
}

fn run_session(
    cfg: &EngineConfig,
    file: SessionFile,
    stop: &AtomicBool,
) -> Result<OccupancySnapshot> {
    let mut sink = SqliteOccupancySink::open(&cfg.db_path)?;
    let mut source = FileSource::open(&file.path, cfg.fps)?;
    let session_cfg = cfg.session_config(&file.session_id).clone();
    let mut session = Session::start(&file.session_id, session_cfg)?;

    let mut last_health_log = Instant::now();
    while !stop.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        session.process_frame(&frame, &mut sink);

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = source.stats();
            let snapshot = session.snapshot();
            log::info!(
                "session {} health: frames={} skipped={} dropped={} tracked={} frame_index={}",
                session.id(),
                stats.frames_read,
                stats.lines_skipped,
                stats.rows_dropped,
                snapshot.count,
                snapshot.frame_index
            );
            last_health_log = Instant::now();
        }
    }

    if stop.load(Ordering::SeqCst) {
        log::warn!("session {}: stopped before end of stream", session.id());
    }
    Ok(session.finish(&mut sink))
}
