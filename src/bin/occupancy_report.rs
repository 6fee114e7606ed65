//! occupancy_report - inspect and maintain the occupancy database

use anyhow::{anyhow, Result};
use clap::Parser;

use wagon_occupancy::{validate_session_id, OccupancySink, SqliteOccupancySink};

#[derive(Parser, Debug)]
#[command(
    name = "occupancy_report",
    about = "Print current occupancy per wagon, its history, or clear history"
)]
struct Args {
    /// Path to the occupancy SQLite DB
    #[arg(long, env = "OCCUPANCY_DB_PATH", default_value = "occupancy.db")]
    db: String,

    /// Restrict output to one session
    #[arg(long)]
    session: Option<String>,

    /// Print history records as JSON (requires --session)
    #[arg(long, requires = "session")]
    history: bool,

    /// Maximum number of history records
    #[arg(long, default_value_t = 1000)]
    limit: usize,

    /// Delete historical records (of --session, or of every session)
    #[arg(long, conflicts_with = "history")]
    clear_history: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    if let Some(id) = args.session.as_deref() {
        validate_session_id(id)?;
    }

    let mut sink = SqliteOccupancySink::open(&args.db)?;

    if args.clear_history {
        let deleted = sink.clear_history(args.session.as_deref())?;
        println!("deleted {} history record(s)", deleted);
        return Ok(());
    }

    if args.history {
        let id = args
            .session
            .as_deref()
            .ok_or_else(|| anyhow!("--history requires --session"))?;
        let records = sink.history(id, args.limit)?;
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let snapshots = match args.session.as_deref() {
        Some(id) => sink
            .current(id)?
            .map(|snap| vec![snap])
            .ok_or_else(|| anyhow!("no occupancy recorded for session {}", id))?,
        None => sink.current_all()?,
    };

    if snapshots.is_empty() {
        println!("no sessions recorded in {}", args.db);
        return Ok(());
    }

    println!(
        "{:<24} {:>6} {:>8} {:>9} {:<9} {:>8}",
        "session", "count", "capacity", "fullness", "level", "frame"
    );
    for snap in snapshots {
        println!(
            "{:<24} {:>6} {:>8} {:>8.1}% {:<9} {:>8}",
            snap.session_id,
            snap.count,
            snap.capacity,
            snap.fullness_percent,
            snap.level,
            snap.frame_index
        );
    }
    Ok(())
}
