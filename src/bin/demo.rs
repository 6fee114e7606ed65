//! demo - end-to-end synthetic run of the wagon occupancy engine

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use wagon_occupancy::ingest::{DetectionSource, SyntheticConfig, SyntheticSource};
use wagon_occupancy::{
    OccupancySink, RetentionPolicy, Session, SessionConfig, SqliteOccupancySink,
};

const DEFAULT_SESSION_ID: &str = "demo_wagon";

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Duration in seconds of synthetic video.
    #[arg(long, default_value_t = 30)]
    seconds: u64,
    /// Frames per second for synthetic source.
    #[arg(long, default_value_t = 25)]
    fps: u32,
    /// Number of synthetic passengers.
    #[arg(long, default_value_t = 12)]
    people: usize,
    /// Deterministic seed for walker motion.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Output SQLite database.
    #[arg(long, default_value = "demo_occupancy.db")]
    db: String,
    /// Retention policy: sticky, exit_on_leave or distance:<px>.
    #[arg(long, default_value = "sticky")]
    retention: RetentionPolicy,
    /// Write the final snapshot as JSON to this path.
    #[arg(long)]
    out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }

    stage("open occupancy db");
    let mut sink = SqliteOccupancySink::open(&args.db)?;
    let cleared = sink.clear_history(Some(DEFAULT_SESSION_ID))?;
    if cleared > 0 {
        stage(&format!("cleared {} history record(s) from a previous run", cleared));
    }

    let config = SessionConfig {
        retention: args.retention,
        ..SessionConfig::default()
    };
    let total_frames = args.seconds.saturating_mul(args.fps as u64);
    let mut source = SyntheticSource::new(SyntheticConfig {
        frames: total_frames,
        fps: args.fps as f64,
        people: args.people,
        frame_width: config.frame_width as f32,
        frame_height: config.frame_height as f32,
        seed: args.seed,
    })?;
    let mut session = Session::start(DEFAULT_SESSION_ID, config)?;

    stage("run synthetic frames through the pipeline");
    let mut emissions = 0u64;
    let mut rejected = 0usize;
    let mut suppressed = 0usize;
    while let Some(frame) = source.next_frame()? {
        let report = session.process_frame(&frame, &mut sink);
        rejected += report.rejected;
        suppressed += report.suppressed;
        if report.emission.is_some() {
            emissions += 1;
        }
    }

    stage("flush final snapshot");
    let snapshot = session.finish(&mut sink);
    let history = sink.history(DEFAULT_SESSION_ID, usize::MAX)?;

    if let Some(path) = &args.out {
        fs::write(path, serde_json::to_vec_pretty(&snapshot)?)
            .with_context(|| format!("writing final snapshot to {}", path.display()))?;
    }

    println!("demo summary:");
    println!("  frames processed: {}", total_frames);
    println!("  detections rejected: {}", rejected);
    println!("  duplicates suppressed: {}", suppressed);
    println!("  snapshots emitted: {}", emissions);
    println!("  history records: {}", history.len());
    println!(
        "  passengers: {} / {} ({:.1}%, {})",
        snapshot.count, snapshot.capacity, snapshot.fullness_percent, snapshot.level
    );
    println!("  occupancy db: {}", args.db);
    println!("next steps:");
    println!(
        "  cargo run --bin occupancy_report -- --db {} --session {} --history",
        args.db, DEFAULT_SESSION_ID
    );

    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}
