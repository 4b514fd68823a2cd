//! Door Visualizer CLI
//!
//! Plays the door models locally, mirrors the in-process step server, runs
//! the chaos scenarios and charts recorded telemetry.

use clap::{Args, Parser, Subcommand};
use doors_core::plot::{
    from_csv, parse_markers, parse_results, scenario_ranges, summarize, time_text, to_csv, Plot, ScenarioRange,
};
use doors_core::{
    Door, Doors, Event, Fault, FaultKind, FaultReporter, Monitor, MonitorCommand, PlayerCommand, Player, PollOutcome, RecordingCanvas,
    Renderer, ScenarioScript,
};
use doors_env::{DoorName, StepCommand, TokioContext};
use doors_sim::scenarios::ScenarioId;
use doors_sim::{
    LinkController, ScenarioResult, ScenarioRunner, ScriptedTransport, SimConfig, SimContext, SimError, SimTransport,
    StepServer, BUILTIN_SCRIPTS,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

type Result<T> = doors_sim::Result<T>;

/// Door visualizer and deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "doors-sim")]
#[command(about = "Visualize, simulate and chart the revolving and swinging doors", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON config file (server, monitor, faults, layout)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run chaos scenarios against the simulated step server
    Sim(SimArgs),

    /// Step the local door models
    Play(PlayArgs),

    /// Mirror an in-process step server in real time
    Monitor(MonitorArgs),

    /// Replay recorded step commands (one JSON object per line) through the monitor
    Replay(ReplayArgs),

    /// Summarize a raw telemetry log into per-interval rows
    Summarize(SummarizeArgs),

    /// Split telemetry into scenario ranges and chart it
    Plot(PlotArgs),
}

#[derive(Args, Debug)]
struct SimArgs {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (nominal, boundary_race, slow_link, flaky_link, lost_arrival, strict_sync, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulated duration in seconds
    #[arg(short, long, default_value = "30")]
    duration: f64,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames, faults and telemetry to a JSON file
    #[arg(long)]
    export: Option<String>,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Steps to take before stopping
    #[arg(short = 'n', long, default_value = "16")]
    steps: u64,

    /// Milliseconds per step
    #[arg(short, long, default_value = "625")]
    ms_per_step: f64,

    /// Revolver script: a built-in name or a script file
    #[arg(long)]
    revolver: Option<String>,

    /// Swinger script: a built-in name or a script file
    #[arg(long)]
    swinger: Option<String>,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Steps to mirror before stopping
    #[arg(short = 'n', long, default_value = "16")]
    steps: u64,

    /// Scenario started on the revolver
    #[arg(long, default_value = "rush")]
    revolver: String,

    /// Scenario started on the swinger
    #[arg(long, default_value = "steady")]
    swinger: String,

    /// Seed for link loss
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Write the server's summarized results log here
    #[arg(long)]
    results: Option<PathBuf>,

    /// Write the server's scenario log here
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// Seconds per summarized results row
    #[arg(long, default_value = "60")]
    interval: f64,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// File of step commands, one JSON object per line
    input: PathBuf,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Raw log: time, revolver arrivals, swinger arrivals, temperatures
    input: PathBuf,

    /// Seconds per output row
    #[arg(short, long, default_value = "60")]
    interval: f64,
}

#[derive(Args, Debug)]
struct PlotArgs {
    /// Summarized results file
    #[arg(long)]
    results: PathBuf,

    /// Scenario markers file
    #[arg(long)]
    scenarios: Option<PathBuf>,

    /// Zoom to times at or after this many seconds
    #[arg(long)]
    from: Option<f64>,

    /// Zoom to times at or before this many seconds
    #[arg(long)]
    to: Option<f64>,

    /// JSON output
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let config = match &cli.config {
        Some(path) => match SimConfig::load(path) {
            Ok(config) => {
                debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(2);
            }
        },
        None => SimConfig::default(),
    };

    let outcome = match cli.command {
        Command::Sim(args) => run_sim(args, &config).await,
        Command::Play(args) => run_play(args, &config).await,
        Command::Monitor(args) => run_monitor(args, &config).await,
        Command::Replay(args) => run_replay(args, &config).await,
        Command::Summarize(args) => run_summarize(args),
        Command::Plot(args) => run_plot(args, &config),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run_sim(args: SimArgs, config: &SimConfig) -> Result<bool> {
    if !args.json {
        info!("Doors DST Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse::<ScenarioId>().map_err(SimError::UnknownScenario)?]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_server_config(config.server.clone())
            .with_layout(config.layout.clone())
    };

    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            return Err(SimError::config("--export only supports a single scenario, not 'all'"));
        }
        let scenario = scenarios[0];
        info!("Running with export to: {}", export_path);

        let (result, export) = runner_for(base_seed).run_with_export(scenario).await;
        export.write_to_file(export_path)?;
        info!("Exported {} frames to {}", export.frames.len(), export_path);

        if result.passed {
            info!("✓ {} (seed={}) PASSED", scenario.name(), base_seed);
        } else {
            error!(
                "✗ {} FAILED: {}",
                scenario.name(),
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
        return Ok(result.passed);
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    Ok(failed_count == 0)
}

/// Resolves a built-in script name or reads a script file.
fn load_script(source: &str) -> Result<ScenarioScript> {
    if let Some((_, text)) = BUILTIN_SCRIPTS.iter().find(|(name, _)| *name == source) {
        return Ok(ScenarioScript::parse(text)?);
    }
    let text = std::fs::read_to_string(source)?;
    Ok(ScenarioScript::parse(&text)?)
}

/// Logs events until `steps` steps have settled, then sends the stop command.
/// Never completes on its own; race it against the driver.
/// Logs events until `steps` steps have settled, then calls `stop`. Faults
/// are handed to `on_fault`.
async fn watch_steps(
    events: &mut UnboundedReceiver<Event>,
    steps: u64,
    mut stop: impl FnMut(),
    mut on_fault: impl FnMut(&Fault),
) {
    let mut settled = 0u64;
    while let Some(event) = events.recv().await {
        match event {
            Event::Stepped(report) => {
                settled += 1;
                info!(
                    step = report.step,
                    revolver = report.motions.revolver,
                    swinger = report.motions.swinger,
                    "stepped"
                );
                if settled == steps {
                    stop();
                }
            }
            Event::Fault(fault) => {
                debug!("fault event: {}", fault);
                on_fault(&fault);
            }
        }
    }
    std::future::pending::<()>().await
}

fn log_doors(doors: &Doors) {
    for door in DoorName::ALL {
        let state = doors.door(door).snapshot();
        info!(
            %door,
            position = state.position,
            arriving = state.arriving,
            occupied = state.occupied.iter().filter(|o| **o).count(),
            "final state"
        );
    }
}

async fn run_play(args: PlayArgs, config: &SimConfig) -> Result<bool> {
    if !(args.ms_per_step.is_finite() && args.ms_per_step > 0.0) {
        return Err(SimError::config(format!("ms-per-step must be positive, not {}", args.ms_per_step)));
    }
    let doors = config.server.geometry.build()?;
    let canvas = RecordingCanvas::new(config.layout.width, config.layout.height);
    let renderer = Renderer::new(canvas, config.layout.clone());
    let (reporter, mut events) = FaultReporter::channel();
    let mut player = Player::new(doors, renderer, reporter);
    if let Some(source) = &args.revolver {
        player = player.with_script(DoorName::Revolver, load_script(source)?);
    }
    if let Some(source) = &args.swinger {
        player = player.with_script(DoorName::Swinger, load_script(source)?);
    }

    let ctx = TokioContext::new();
    let (commands, rx) = mpsc::unbounded_channel();
    commands.send(PlayerCommand::Play(args.ms_per_step)).ok();
    info!("Playing {} steps at {}ms per step", args.steps, args.ms_per_step);

    tokio::select! {
        result = player.run(&ctx, rx) => result?,
        _ = watch_steps(&mut events, args.steps, || {
            commands.send(PlayerCommand::Shutdown).ok();
        }, |_| {}) => {}
    }

    info!("Played {} steps, {} draw commands in the last frame", player.steps(), player.renderer().canvas().commands().len());
    log_doors(player.doors());
    Ok(true)
}

const MAX_RELOADS: u32 = 3;

async fn run_monitor(args: MonitorArgs, config: &SimConfig) -> Result<bool> {
    let server = Arc::new(Mutex::new(StepServer::new(config.server.clone())?));
    let doors = config.server.geometry.build()?;
    let ctx = TokioContext::shared();
    let transport = Arc::new(SimTransport::new(
        Arc::clone(&server),
        Arc::clone(&ctx),
        LinkController::new(config.faults.clone()),
        args.seed,
    ));
    let canvas = RecordingCanvas::new(config.layout.width, config.layout.height);
    let renderer = Renderer::new(canvas, config.layout.clone());
    let (reporter, mut events) = FaultReporter::channel();
    let mut monitor = Monitor::new(doors, renderer, transport, config.monitor.clone(), reporter);

    let (commands, rx) = mpsc::unbounded_channel();
    let load = || {
        for (door, scenario) in [(DoorName::Revolver, &args.revolver), (DoorName::Swinger, &args.swinger)] {
            commands
                .send(MonitorCommand::Load {
                    door,
                    scenario: scenario.clone(),
                })
                .ok();
        }
    };
    load();
    info!("Mirroring {} steps ({} / {})", args.steps, args.revolver, args.swinger);

    // A failed poll idles the monitor; reload a few times before giving up
    let mut reloads = 0u32;
    tokio::select! {
        result = monitor.run(ctx.as_ref(), rx) => result?,
        _ = watch_steps(&mut events, args.steps, || {
            commands.send(MonitorCommand::Shutdown).ok();
        }, |fault| {
            if fault.kind != FaultKind::Transport {
                return;
            }
            if reloads < MAX_RELOADS {
                reloads += 1;
                warn!("Reloading after transport fault ({}/{})", reloads, MAX_RELOADS);
                load();
            } else {
                error!("Giving up after {} reloads", MAX_RELOADS);
                commands.send(MonitorCommand::Shutdown).ok();
            }
        }) => {}
    }

    info!("Monitor stopped at step {}", monitor.local_step());
    log_doors(monitor.doors());

    let server = server.lock().unwrap();
    info!("Server took {} steps", server.steps_taken());
    if let Some(path) = &args.results {
        std::fs::write(path, server.results_csv(args.interval))?;
        info!("Wrote results to {}", path.display());
    }
    if let Some(path) = &args.scenarios {
        std::fs::write(path, server.scenarios_csv())?;
        info!("Wrote scenario log to {}", path.display());
    }
    Ok(true)
}

fn read_commands(path: &Path) -> Result<Vec<StepCommand>> {
    let text = std::fs::read_to_string(path)?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(StepCommand::from_json(line)?))
        .collect()
}

async fn run_replay(args: ReplayArgs, config: &SimConfig) -> Result<bool> {
    let replies = read_commands(&args.input)?;
    info!("Replaying {} step commands from {}", replies.len(), args.input.display());

    let transport = Arc::new(ScriptedTransport::from_commands(replies));
    let doors = config.server.geometry.build()?;
    let canvas = RecordingCanvas::new(config.layout.width, config.layout.height);
    let renderer = Renderer::new(canvas, config.layout.clone());
    let (reporter, mut events) = FaultReporter::channel();
    let mut monitor = Monitor::new(doors, renderer, Arc::clone(&transport), config.monitor.clone(), reporter);
    let ctx = SimContext::new(0);

    // The scripted source accepts any scenario; loading only starts polling
    monitor.load(DoorName::Revolver, "replay").await?;

    let mut faults = 0usize;
    while transport.remaining() > 0 {
        match monitor.poll_once(&ctx).await? {
            PollOutcome::Stepped(report) => debug!(step = report.step, "replayed"),
            PollOutcome::Race => debug!("boundary race"),
            PollOutcome::Idle | PollOutcome::Discarded => break,
        }
        while let Ok(event) = events.try_recv() {
            if let Event::Fault(fault) = event {
                warn!("{}", fault);
                faults += 1;
            }
        }
    }

    info!(
        "Replay ended at step {} after {:.2}s of animation, {} faults",
        monitor.local_step(),
        ctx.time_secs(),
        faults
    );
    log_doors(monitor.doors());
    Ok(true)
}

fn run_summarize(args: SummarizeArgs) -> Result<bool> {
    if !(args.interval > 0.0) {
        return Err(SimError::config(format!("interval must be positive, not {}", args.interval)));
    }
    let raw = from_csv(&std::fs::read_to_string(&args.input)?)?;
    let rows = summarize(&raw, args.interval);
    debug!("Summarized {} records into {} rows", raw.len(), rows.len());
    println!("{}", to_csv(&rows));
    Ok(true)
}

/// One scenario range as printed by `plot`.
#[derive(Debug, Serialize)]
struct RangeSummary<'a> {
    #[serde(flatten)]
    range: &'a ScenarioRange,
    primary: String,
    delta_mode: Option<i64>,
}

fn run_plot(args: PlotArgs, config: &SimConfig) -> Result<bool> {
    let points = parse_results(&std::fs::read_to_string(&args.results)?)?;
    let markers = match &args.scenarios {
        Some(path) => parse_markers(&std::fs::read_to_string(path)?)?,
        None => Vec::new(),
    };
    let ranges = scenario_ranges(&points, &markers);
    let mut plot = Plot::new(config.layout.width, config.layout.height, points, ranges, None)?;
    if args.from.is_some() || args.to.is_some() {
        let min = args.from.unwrap_or(f64::NEG_INFINITY);
        let max = args.to.unwrap_or(f64::INFINITY);
        plot = plot.slice(min, max)?;
    }

    let mut canvas = RecordingCanvas::new(config.layout.width, config.layout.height);
    plot.draw(&mut canvas, None);
    debug!("Chart drawn with {} commands", canvas.commands().len());

    let summaries: Vec<RangeSummary> = plot
        .ranges()
        .iter()
        .map(|range| RangeSummary {
            range,
            primary: format!("{:?}", range.primary_door()),
            delta_mode: range.delta_mode(plot.points()),
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(true);
    }

    info!(
        "{} points, temperatures {:.1} to {:.1}",
        plot.points().len(),
        plot.y_range().min,
        plot.y_range().max
    );
    for summary in &summaries {
        let range = summary.range;
        let delta = summary
            .delta_mode
            .map_or_else(|| "n/a".to_string(), |delta| format!("{:+}", delta));
        println!(
            "{} - {}  revolver: {} ({:.1}/min)  swinger: {} ({:.1}/min)  primary: {}  delta: {}",
            time_text(range.start),
            time_text(range.end),
            range.revolver.name,
            range.revolver.average,
            range.swinger.name,
            range.swinger.average,
            summary.primary,
            delta
        );
    }
    Ok(true)
}
