//! `obstacle-node` – radar obstacle perception node.
//!
//! This binary wires the perception pipeline to a recorded drive.  It:
//!
//! 1. Loads `~/.obstacle/config.toml` (or `--config PATH`), falling back to
//!    defaults when the file is absent.
//! 2. Registers the configured sensor extrinsics and region polygons.
//! 3. Starts one pipeline task per radar plus the shared motion stream.
//! 4. Replays a JSONL recording into the node and prints every published
//!    result as it is announced on the event bus.
//! 5. Intercepts **Ctrl-C** to stop the replay and flush pending frames.

mod config;
mod replay;

use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use obstacle_middleware::{EventBus, EventReceiver, SharedDataStore};
use obstacle_perception::region::{Polygon, StaticMap};
use obstacle_perception::{DetectorRegistry, MapService, TfBuffer};
use obstacle_runtime::{PerceptionNode, StreamReport, init_tracing};
use obstacle_types::{ErrorCode, EventId, ResultSet};

// ─────────────────────────────────────────────────────────────────────────────
// Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct Args {
    config: Option<PathBuf>,
    /// Replay speed multiplier; `0` replays as fast as possible.
    rate: f64,
    init_config: bool,
    schema: bool,
    help: bool,
    recording: Option<PathBuf>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: None,
            rate: 1.0,
            init_config: false,
            schema: false,
            help: false,
            recording: None,
        }
    }
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().ok_or("--config needs a path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--rate" | "-r" => {
                let raw = args.next().ok_or("--rate needs a value")?;
                let rate: f64 = raw.parse().map_err(|_| format!("invalid rate: {raw}"))?;
                if !rate.is_finite() || rate < 0.0 {
                    return Err(format!("rate must be >= 0, got {raw}"));
                }
                parsed.rate = rate;
            }
            "--init-config" => parsed.init_config = true,
            "--schema" => parsed.schema = true,
            "--help" | "-h" => parsed.help = true,
            flag if flag.starts_with('-') => return Err(format!("unknown option: {flag}")),
            path => {
                if parsed.recording.is_some() {
                    return Err(format!("unexpected argument: {path}"));
                }
                parsed.recording = Some(PathBuf::from(path));
            }
        }
    }
    Ok(parsed)
}

fn print_usage() {
    println!("Usage: obstacle-node [OPTIONS] <RECORDING.jsonl>");
    println!();
    println!("Options:");
    println!("  -c, --config PATH   config file (default ~/.obstacle/config.toml)");
    println!("  -r, --rate X        replay speed multiplier, 0 = as fast as possible (default 1)");
    println!("      --init-config   write the default config and exit");
    println!("      --schema        print the JSON schema of published results and exit");
    println!("  -h, --help          show this help");
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry point
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    // RUST_LOG selects the level; OBSTACLE_LOG_FORMAT=json switches to JSON
    // lines.  User-facing output below still goes through println!.
    let _telemetry = init_tracing("obstacle-node");

    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            print_usage();
            return ExitCode::from(2);
        }
    };
    if args.help {
        print_usage();
        return ExitCode::SUCCESS;
    }
    if args.schema {
        let schema = schemars::schema_for!(ResultSet);
        match serde_json::to_string_pretty(&schema) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("{}: {}", "error".red().bold(), e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    if args.init_config {
        return match config::save_to(&config::Config::default(), &config_path) {
            Ok(()) => {
                println!(
                    "  {} Config saved to {}",
                    "✓".green().bold(),
                    config_path.display().to_string().bold()
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    print_banner();

    let cfg = match config::load(&config_path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", config_path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            println!(
                "  No config at {}; using defaults.",
                config_path.display().to_string().dimmed()
            );
            config::Config::default()
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };

    let Some(recording) = args.recording else {
        eprintln!("{}: no recording given", "error".red().bold());
        print_usage();
        return ExitCode::from(2);
    };

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping replay and flushing …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; replay can only end at end of file");
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: failed to start runtime: {}", "error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg, recording, args.rate, shutdown)) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Run
// ─────────────────────────────────────────────────────────────────────────────

struct RunSummary {
    replay: replay::ReplayStats,
    streams: Vec<StreamReport>,
    printed: usize,
    stored: usize,
}

async fn run(
    cfg: config::Config,
    recording: PathBuf,
    rate: f64,
    shutdown: Arc<AtomicBool>,
) -> Result<RunSummary, String> {
    let transforms = Arc::new(TfBuffer::default());
    for st in &cfg.transforms {
        transforms.set_static_transform(&st.parent, &st.child, st.transform());
    }
    let map = build_map(&cfg.map.polygons);

    let store = Arc::new(SharedDataStore::new());
    let bus = EventBus::default();
    let (stop_tx, stop_rx) = watch::channel(false);
    let printers: Vec<JoinHandle<usize>> = printer_lanes(&cfg)
        .into_iter()
        .map(|lane| spawn_printer(bus.subscribe(lane), Arc::clone(&store), stop_rx.clone()))
        .collect();

    let node = PerceptionNode::with_shared_data(
        cfg.node_config(),
        transforms.clone(),
        map,
        &DetectorRegistry::with_builtins(),
        Arc::clone(&store),
        bus.clone(),
    )
    .map_err(|e| e.to_string())?;
    println!(
        "  Radars: {}   replaying {}\n",
        node.device_ids().join(", ").bold(),
        recording.display().to_string().bold()
    );

    let handle = node.start();
    let replayed = replay::replay(&recording, rate, &shutdown, &handle, &transforms).await;
    let streams = handle.shutdown().await;

    let _ = stop_tx.send(true);
    let mut printed = 0;
    for printer in printers {
        match printer.await {
            Ok(n) => printed += n,
            Err(e) => warn!(error = %e, "printer task failed"),
        }
    }

    Ok(RunSummary {
        replay: replayed?,
        streams,
        printed,
        stored: store.len(),
    })
}

fn build_map(polygons: &[Polygon]) -> Option<Arc<dyn MapService>> {
    if polygons.is_empty() {
        return None;
    }
    let map: Arc<dyn MapService> = Arc::new(StaticMap::new(polygons.to_vec()));
    Some(map)
}

/// One lane per radar (its first event id) so each result prints once.
fn printer_lanes(cfg: &config::Config) -> Vec<EventId> {
    let mut lanes: Vec<EventId> = cfg
        .radars
        .iter()
        .filter_map(|r| r.publish_event_ids.first().copied())
        .collect();
    lanes.sort();
    lanes.dedup();
    lanes
}

fn spawn_printer(
    mut events: EventReceiver,
    store: Arc<SharedDataStore<ResultSet>>,
    mut stop: watch::Receiver<bool>,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut printed = 0;
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(event) => {
                        print_result(&store, event.timestamp, &event.reserve);
                        printed += 1;
                    }
                    None => break,
                },
                _ = stop.changed() => {
                    while let Some(event) = events.try_next() {
                        print_result(&store, event.timestamp, &event.reserve);
                        printed += 1;
                    }
                    break;
                }
            }
        }
        printed
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_result(store: &SharedDataStore<ResultSet>, timestamp: f64, device_id: &str) {
    let result = match store.get_by_stamp(timestamp, device_id) {
        Ok(Some(result)) => result,
        Ok(None) => {
            println!("  {} {:>10.2} {}", device_id.dimmed(), timestamp, "(evicted)".dimmed());
            return;
        }
        Err(e) => {
            warn!(%device_id, timestamp, error = %e, "cannot look up announced result");
            return;
        }
    };
    let code = match result.error_code {
        ErrorCode::Ok => "ok".green(),
        ErrorCode::TransformError => "transform_error".red(),
        ErrorCode::ProcessError => "process_error".yellow(),
    };
    println!(
        "  {} {:>10.2}  {:<16} {} object(s)",
        device_id.cyan(),
        result.timestamp,
        code,
        result.objects.len().to_string().bold()
    );
    for obj in &result.objects {
        let track = obj
            .track_id
            .map(|id| format!("#{id}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "      {:>6}  ({:>7.2}, {:>7.2})  v=({:>6.2}, {:>6.2})  {:?}",
            track.bold(),
            obj.position.x,
            obj.position.y,
            obj.velocity.x,
            obj.velocity.y,
            obj.object_type
        );
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    if summary.replay.interrupted {
        println!("  {}", "Replay interrupted.".yellow());
    }
    println!(
        "  Replayed {} record(s), skipped {}; {} result(s) announced, {} still stored.",
        summary.replay.records.to_string().bold(),
        summary.replay.skipped,
        summary.printed,
        summary.stored
    );
    for report in &summary.streams {
        println!(
            "    {:<14} received {:>6}  processed {:>6}  dropped {:>4}  published {:>6}",
            report.stream.bold(),
            report.received,
            report.processed,
            report.dropped,
            report.published
        );
    }
}

fn print_banner() {
    println!();
    println!("{}", r#"   ____  __         __             __   "#.bold().cyan());
    println!("{}", r#"  / __ \/ /  ___ __/ /____ _______/ /__ "#.bold().cyan());
    println!("{}", r#" / /_/ / _ \(_-</ __/ _ `/ __/ -_) / -_)"#.bold().cyan());
    println!("{}", r#" \____/_.__/___/\__/\_,_/\__/\__/_/\__/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "obstacle-node".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Radar obstacle perception");
    println!();
}
