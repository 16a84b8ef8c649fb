use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use log::warn;
use navcog_rs::navigation::{LiveNavSession, NavEvent};
use navcog_rs::replay::{replay_paced, SampleLog, SampleSource};
use navcog_rs::status::NavStatus;
use navcog_rs::topo::load_map;
use navcog_rs::NavConfig;
use std::path::PathBuf;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(name = "navcog")]
#[command(about = "Indoor navigation replay - route planning, localization and instructions from a sample log", long_about = None)]
struct Args {
    /// Map document (.json or .json.gz)
    #[arg(long)]
    map: PathBuf,

    /// Recorded sample log (.json or .json.gz)
    #[arg(long)]
    log: Option<PathBuf>,

    /// Start location (node name or id)
    #[arg(long)]
    from: Option<String>,

    /// Destination (node name or id)
    #[arg(long)]
    to: Option<String>,

    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pace the replay by sample timestamps instead of running flat out
    #[arg(long)]
    realtime: bool,

    /// Replay speed multiplier for --realtime
    #[arg(long, default_value = "1.0")]
    speed: f64,

    /// Output directory for status snapshots
    #[arg(long, default_value = "navcog_sessions")]
    output_dir: PathBuf,

    /// List the map's named locations and exit
    #[arg(long)]
    list: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let map = load_map(&args.map).with_context(|| format!("loading map {}", args.map.display()))?;
    if args.list {
        for name in map.all_location_names(true) {
            println!("{}", name);
        }
        return Ok(());
    }

    let (Some(log_path), Some(from), Some(to)) = (&args.log, &args.from, &args.to) else {
        bail!("--log, --from and --to are required unless --list is given");
    };
    let config = match &args.config {
        Some(path) => NavConfig::from_file(path)?,
        None => NavConfig::default(),
    };
    let log = SampleLog::load(log_path)?;

    println!("[{}] NavCog replay starting", ts_now());
    println!("  Map: {} ({} nodes, {} edges)", map.name, map.node_count(), map.edge_count());
    println!("  Route: {} -> {}", from, to);
    println!("  Log: {} samples, {:.1}s", log.len(), log.duration());
    std::fs::create_dir_all(&args.output_dir)?;

    let map_name = map.name.clone();
    let mut session = LiveNavSession::new(map, config)?;
    let mut status = NavStatus::new(&map_name, from, to);
    let status_path = args.output_dir.join("status.json");

    let events = session.start(from, to).await?;
    report(&events);
    status.update(&session, 0, &events);

    let mut processed = 0u64;
    let mut dropped = 0u64;
    if args.realtime {
        let (tx, mut rx) = mpsc::channel(500);
        let replay_log = log.clone();
        let speed = args.speed;
        let replay = tokio::spawn(async move { replay_paced(&replay_log, speed, tx).await });
        let mut last_save = Utc::now();
        while let Some(sample) = rx.recv().await {
            // live input: a busy tracker drops samples rather than falling behind
            if session.submit(sample)? {
                processed += 1;
            } else {
                dropped += 1;
            }
            let events = session.poll().await?;
            report(&events);
            status.update(&session, processed, &events);
            let now = Utc::now();
            if now.signed_duration_since(last_save).num_seconds() >= 1 {
                status.save(&status_path)?;
                last_save = now;
            }
            if session.is_finished() {
                break;
            }
        }
        drop(rx);
        replay.await??;
    } else {
        let mut source = log.replay();
        while let Some(sample) = source.next_sample() {
            session.queue(sample).await?;
            processed += 1;
            let events = session.poll().await?;
            report(&events);
            status.update(&session, processed, &events);
            if session.is_finished() {
                break;
            }
        }
    }

    let events = session.settle().await?;
    report(&events);
    status.update(&session, processed, &events);
    if dropped > 0 {
        warn!("{} samples dropped by a full tracker queue", dropped);
    }
    session.stop().await?;
    status.update(&session, processed, &[]);
    status.save(&status_path)?;

    println!("\n=== Final Stats ===");
    println!("  Samples processed: {}", processed);
    println!("  Samples dropped: {}", dropped);
    println!("  Events: {}", status.events.len());
    println!("  Finished: {}", status.finished);
    println!("  Status: {}", status_path.display());
    Ok(())
}

fn report(events: &[NavEvent]) {
    for event in events {
        let line = match event {
            NavEvent::StateStart { text, .. } => format!("START      {}", text),
            NavEvent::Approaching { text, .. } => format!("APPROACH   {}", text),
            NavEvent::Arrived { text, .. } => format!("ARRIVED    {}", text),
            NavEvent::Tricky { text, .. } => format!("CAUTION    {}", text),
            NavEvent::Repeat { text } => format!("REPEAT     {}", text),
            NavEvent::Surround { text } => format!("SURROUND   {}", text),
            NavEvent::Accessibility { text } => format!("ACCESS     {}", text),
            NavEvent::NavigationReady => "READY".to_string(),
            NavEvent::NavigationFinished => "FINISHED".to_string(),
            NavEvent::Lost { reason } => format!("LOST       {}", reason),
        };
        println!("[{}] {}", ts_now(), line);
    }
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
