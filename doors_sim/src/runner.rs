//! Scenario runner - drives a monitor against the simulated step server.

use crate::context::SimContext;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::network::{FaultPlan, LinkController, SimTransport};
use crate::scenarios::ScenarioId;
use crate::server::{ServerConfig, StepRecord, StepServer};

use doors_core::{
    DoorsError, Doors, Event, FaultKind, FaultReporter, Monitor, MonitorConfig, PollOutcome,
    RecordingCanvas, Renderer, RendererLayout, SyncPhase, SyncPolicy,
};
use doors_env::{DoorName, DoorsContext};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Monitor step at which scenarios inject their fault.
const INJECT_AT_STEP: u64 = 6;

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Steps the monitor animated
    pub total_steps: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub polls: u64,

    /// Zero-duration replies
    pub races: u64,

    pub missed_steps: u64,
    pub out_of_sync: u64,
    pub transport_faults: u64,
    pub fatal_faults: u64,

    /// Times the monitor was loaded again after halting
    pub reloads: u64,

    /// Settled steps after which the local doors differed from the server's
    pub drift_steps: u64,

    /// Animation frames painted
    pub frames: u64,
}

impl ScenarioMetrics {
    fn faults(&self) -> u64 {
        self.missed_steps + self.out_of_sync + self.transport_faults
    }

    /// Tallies the faults a driver reported since the last call.
    fn absorb_events(&mut self, events: &mut UnboundedReceiver<Event>, sink: &mut Vec<SimEvent>) {
        while let Ok(event) = events.try_recv() {
            let Event::Fault(fault) = event else {
                continue;
            };
            match fault.kind {
                FaultKind::Transport => self.transport_faults += 1,
                FaultKind::MissedStep => self.missed_steps += 1,
                FaultKind::OutOfSync => self.out_of_sync += 1,
                FaultKind::Configuration => {}
            }
            if fault.fatal {
                self.fatal_faults += 1;
            }
            sink.push(SimEvent::from(&fault));
        }
    }
}

/// Per-scenario wiring.
struct Setup {
    server: ServerConfig,
    plan: FaultPlan,
    policy: SyncPolicy,
    scripts: [(DoorName, &'static str); 2],
}

/// Runs chaos scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Maximum duration in seconds
    max_duration_secs: f64,

    server: ServerConfig,
    layout: RendererLayout,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            max_duration_secs: 30.0,
            server: ServerConfig::default(),
            layout: RendererLayout::default(),
        }
    }

    /// Sets the maximum duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the base server configuration scenarios start from.
    pub fn with_server_config(mut self, server: ServerConfig) -> Self {
        self.server = server;
        self
    }

    pub fn with_layout(mut self, layout: RendererLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, None).await
    }

    /// Runs a scenario, recording every settled step for export.
    pub async fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        let mut export = SimExport::new(scenario.name(), self.seed);
        let result = self.execute(scenario, Some(&mut export)).await;
        export.finalize(result.passed, result.failure_reason.clone());
        (result, export)
    }

    fn setup(&self, scenario: ScenarioId) -> Setup {
        let busy = [(DoorName::Revolver, "rush"), (DoorName::Swinger, "steady")];
        let idle = [(DoorName::Revolver, "quiet"), (DoorName::Swinger, "quiet")];
        let base = Setup {
            server: self.server.clone(),
            plan: FaultPlan::default(),
            policy: SyncPolicy::strict(),
            scripts: busy,
        };
        match scenario {
            ScenarioId::Nominal => base,
            ScenarioId::BoundaryRace => Setup {
                server: self.server.clone().with_timer_lag(0.04),
                scripts: [(DoorName::Revolver, "steady"), (DoorName::Swinger, "rush")],
                ..base
            },
            ScenarioId::SlowLink => Setup {
                plan: FaultPlan::default().with_latency(700),
                ..base
            },
            ScenarioId::FlakyLink => Setup {
                plan: FaultPlan::default().with_poll_loss(0.05),
                ..base
            },
            ScenarioId::LostArrival => Setup {
                policy: SyncPolicy::default(),
                scripts: idle,
                ..base
            },
            ScenarioId::StrictSync => Setup {
                scripts: idle,
                ..base
            },
        }
    }

    async fn execute(&self, scenario: ScenarioId, mut export: Option<&mut SimExport>) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);
        debug!("  {}", scenario.description());

        let setup = self.setup(scenario);
        let ctx = SimContext::shared(self.seed);
        let mut metrics = ScenarioMetrics::default();
        let fail = |reason: String, metrics: ScenarioMetrics| ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_steps: 0,
            final_time_secs: 0.0,
            failure_reason: Some(reason),
            metrics,
        };

        let server = match StepServer::new(setup.server.clone()) {
            Ok(server) => Arc::new(Mutex::new(server)),
            Err(e) => return fail(format!("Server setup failed: {}", e), metrics),
        };
        let doors = match setup.server.geometry.build() {
            Ok(doors) => doors,
            Err(e) => return fail(format!("Door setup failed: {}", e), metrics),
        };
        let link = LinkController::new(setup.plan);
        let transport = Arc::new(SimTransport::new(
            Arc::clone(&server),
            Arc::clone(&ctx),
            link.clone(),
            self.seed.wrapping_mul(0x9e3779b97f4a7c15),
        ));
        let canvas = RecordingCanvas::new(self.layout.width, self.layout.height);
        let renderer = Renderer::new(canvas, self.layout.clone());
        let (reporter, mut events) = FaultReporter::channel();
        let config = MonitorConfig::default().with_policy(setup.policy);
        let mut monitor = Monitor::new(doors, renderer, transport, config, reporter);

        for (door, script) in setup.scripts {
            if let Err(e) = monitor.load(door, script).await {
                return fail(format!("Load failed: {}", e), metrics);
            }
        }

        let end = Duration::from_secs_f64(self.max_duration_secs);
        let mut steps = 0u64;
        let mut injected = false;
        let mut in_sync = false;
        let mut halted: Option<DoorsError> = None;
        let mut pending_events = Vec::new();

        while ctx.now() < end {
            if !injected && monitor.local_step() >= INJECT_AT_STEP {
                injected = true;
                self.inject(scenario, &link, &mut monitor).await;
            }

            metrics.polls += 1;
            match monitor.poll_once(ctx.as_ref()).await {
                Ok(PollOutcome::Stepped(report)) => {
                    steps += 1;
                    let record = server.lock().unwrap().state_after(report.step - 1).cloned();
                    in_sync = record.map_or(false, |record| matches_server(monitor.doors(), &record));
                    if !in_sync {
                        metrics.drift_steps += 1;
                    }
                    metrics.absorb_events(&mut events, &mut pending_events);
                    if let Some(export) = export.as_deref_mut() {
                        export.add_frame(SimFrame {
                            time_sec: ctx.time_secs(),
                            step: report.step,
                            motions: report.motions,
                            commands: monitor.renderer().canvas().commands().to_vec(),
                            events: std::mem::take(&mut pending_events),
                        });
                    }
                }
                Ok(PollOutcome::Race) => {
                    metrics.races += 1;
                    if link.get_latency().is_zero() {
                        ctx.sleep(Duration::from_millis(1)).await;
                    }
                }
                Ok(PollOutcome::Idle) | Ok(PollOutcome::Discarded) => break,
                Err(e @ DoorsError::Transport(_)) if scenario == ScenarioId::FlakyLink => {
                    debug!("  monitor halted ({}), reloading", e);
                    metrics.reloads += 1;
                    for (door, script) in setup.scripts {
                        monitor.load(door, script).await.ok();
                    }
                }
                Err(e) => {
                    warn!("  monitor halted: {}", e);
                    halted = Some(e);
                    break;
                }
            }
            metrics.absorb_events(&mut events, &mut pending_events);
        }
        metrics.absorb_events(&mut events, &mut pending_events);

        metrics.frames = ctx.frames();
        let verdict = judge(scenario, &metrics, steps, in_sync, halted.as_ref(), monitor.phase());
        if let Err(reason) = &verdict {
            warn!("  {}: {}", scenario.name(), reason);
        }
        info!(
            "✓ {} complete: {} steps, {} races, {} missed, {} out of sync, {} transport faults",
            scenario.name(),
            steps,
            metrics.races,
            metrics.missed_steps,
            metrics.out_of_sync,
            metrics.transport_faults
        );

        if let Some(export) = export {
            let server = server.lock().unwrap();
            export.set_telemetry(server.results_log().to_vec(), server.scenarios_log().to_vec());
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: verdict.is_ok(),
            total_steps: steps,
            final_time_secs: ctx.time_secs(),
            failure_reason: verdict.err(),
            metrics,
        }
    }

    async fn inject(
        &self,
        scenario: ScenarioId,
        link: &LinkController,
        monitor: &mut Monitor<RecordingCanvas, SimTransport<SimContext>>,
    ) {
        match scenario {
            ScenarioId::FlakyLink => {
                info!("  ⚡ Failing the next 2 polls");
                link.fail_next_polls(2);
            }
            ScenarioId::LostArrival | ScenarioId::StrictSync => {
                info!("  ⚡ Dropping an arrival on the way to the server");
                link.fail_next_arrivals(1);
                // The failure is reported; the local increment stays
                monitor.arrive(DoorName::Revolver).await.ok();
            }
            _ => {}
        }
    }
}

/// True when every local door equals the server's state after a step.
fn matches_server(doors: &Doors, record: &StepRecord) -> bool {
    DoorName::ALL
        .iter()
        .all(|&door| doors.door(door).snapshot() == *record.state(door))
}

/// Checks a finished run against what the scenario should provoke.
fn judge(
    scenario: ScenarioId,
    metrics: &ScenarioMetrics,
    steps: u64,
    in_sync: bool,
    halted: Option<&DoorsError>,
    phase: SyncPhase,
) -> Result<(), String> {
    if scenario.expects_halt() {
        return match halted {
            Some(DoorsError::OutOfSync { .. }) if phase == SyncPhase::Idle && metrics.fatal_faults == 1 => Ok(()),
            Some(other) => Err(format!("halted with unexpected error: {}", other)),
            None => Err("mismatch went undetected".to_string()),
        };
    }
    if let Some(e) = halted {
        return Err(format!("monitor halted: {}", e));
    }
    if steps == 0 {
        return Err("no steps completed".to_string());
    }
    if !in_sync {
        return Err("local doors differ from the server at the end of the run".to_string());
    }
    match scenario {
        ScenarioId::Nominal if metrics.faults() > 0 || metrics.drift_steps > 0 => {
            Err(format!("{} faults on a clean link", metrics.faults()))
        }
        ScenarioId::BoundaryRace if metrics.races == 0 => Err("no boundary race observed".to_string()),
        ScenarioId::BoundaryRace if metrics.faults() > 0 => {
            Err(format!("{} faults while racing boundaries", metrics.faults()))
        }
        ScenarioId::SlowLink if metrics.missed_steps == 0 => Err("slow link never missed a step".to_string()),
        ScenarioId::SlowLink if metrics.fatal_faults > 0 || metrics.out_of_sync > 0 => {
            Err("missed steps were not recovered by resync".to_string())
        }
        ScenarioId::FlakyLink if metrics.reloads == 0 => Err("no poll failure observed".to_string()),
        ScenarioId::FlakyLink if metrics.out_of_sync > 0 => Err("reload did not resync".to_string()),
        ScenarioId::LostArrival if metrics.out_of_sync == 0 => Err("lost arrival never surfaced".to_string()),
        ScenarioId::LostArrival if metrics.fatal_faults > 0 => Err("self-healing policy halted".to_string()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doors_core::MonitorCommand;
    use tokio::sync::mpsc;

    async fn run(scenario: ScenarioId) -> ScenarioResult {
        ScenarioRunner::new(42).with_duration(20.0).run(scenario).await
    }

    #[tokio::test]
    async fn test_nominal_stays_in_sync() {
        let result = run(ScenarioId::Nominal).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.total_steps >= 16);
        assert_eq!(result.metrics.races, 0);
        assert!(result.metrics.frames > result.total_steps);
    }

    #[tokio::test]
    async fn test_boundary_race_is_repolled() {
        let result = run(ScenarioId::BoundaryRace).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.races > 0);
        assert_eq!(result.metrics.missed_steps, 0);
    }

    #[tokio::test]
    async fn test_slow_link_resyncs() {
        let result = run(ScenarioId::SlowLink).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.missed_steps > 0);
    }

    #[tokio::test]
    async fn test_flaky_link_recovers_by_reload() {
        let result = run(ScenarioId::FlakyLink).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.reloads >= 2);
        assert!(result.metrics.transport_faults >= 2);
    }

    #[tokio::test]
    async fn test_lost_arrival_is_healed() {
        let result = run(ScenarioId::LostArrival).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.out_of_sync, 1);
        assert_eq!(result.metrics.transport_faults, 1);
        assert_eq!(result.metrics.drift_steps, 1);
    }

    #[tokio::test]
    async fn test_strict_sync_halts() {
        let result = run(ScenarioId::StrictSync).await;
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.fatal_faults, 1);
        assert!(result.final_time_secs < 20.0);
    }

    #[tokio::test]
    async fn test_same_seed_same_run() {
        let a = run(ScenarioId::FlakyLink).await;
        let b = run(ScenarioId::FlakyLink).await;
        assert_eq!(a.total_steps, b.total_steps);
        assert_eq!(a.metrics.reloads, b.metrics.reloads);
        assert_eq!(a.final_time_secs, b.final_time_secs);
    }

    #[tokio::test]
    async fn test_bad_server_config_fails_cleanly() {
        let runner = ScenarioRunner::new(1).with_server_config(ServerConfig::default().with_seconds_per_step(-1.0));
        let result = runner.run(ScenarioId::Nominal).await;
        assert!(!result.passed);
        assert!(result.failure_reason.unwrap().contains("seconds_per_step"));
    }

    #[tokio::test]
    async fn test_export_records_settled_steps() {
        let runner = ScenarioRunner::new(3).with_duration(5.0);
        let (result, export) = runner.run_with_export(ScenarioId::Nominal).await;

        assert_eq!(export.frames.len() as u64, result.total_steps);
        assert!(export.passed);
        assert!(!export.telemetry.is_empty());
        assert_eq!(export.markers.len(), 2);
        assert!(export.frames.iter().all(|f| !f.commands.is_empty()));
    }

    #[tokio::test]
    async fn test_monitor_run_loop_against_server() {
        let ctx = SimContext::shared(9);
        let server = Arc::new(Mutex::new(StepServer::new(ServerConfig::default()).unwrap()));
        let transport = Arc::new(SimTransport::new(
            Arc::clone(&server),
            Arc::clone(&ctx),
            LinkController::default(),
            9,
        ));
        let (reporter, mut events) = FaultReporter::channel();
        let mut monitor = Monitor::new(
            ServerConfig::default().geometry.build().unwrap(),
            Renderer::for_canvas(RecordingCanvas::new(480.0, 240.0)),
            transport,
            MonitorConfig::default().with_policy(SyncPolicy::self_healing()),
            reporter,
        );
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(MonitorCommand::Load {
            door: DoorName::Swinger,
            scenario: "rush".to_string(),
        })
        .unwrap();

        let driver = async {
            let mut stepped = 0;
            while let Some(event) = events.recv().await {
                match event {
                    Event::Stepped(_) => stepped += 1,
                    // An arrival sent after a boundary may be healed once
                    Event::Fault(fault) => assert!(!fault.fatal, "unexpected fault: {}", fault),
                }
                if stepped == 3 {
                    tx.send(MonitorCommand::Arrive(DoorName::Revolver)).unwrap();
                }
                if stepped == 8 {
                    tx.send(MonitorCommand::Shutdown).unwrap();
                    break;
                }
            }
            stepped
        };
        let (outcome, stepped) = tokio::join!(monitor.run(ctx.as_ref(), rx), driver);

        outcome.unwrap();
        assert_eq!(stepped, 8);
        assert!(monitor.local_step() >= 9);

        let server = server.lock().unwrap();
        assert_eq!(server.scenarios_log().len(), 1);
        let admitted = (1..=server.steps_taken())
            .filter_map(|step| server.state_after(step))
            .any(|record| record.revolver.occupied.contains(&true));
        assert!(admitted, "arrival sent through the run loop never reached the server");
    }
}
