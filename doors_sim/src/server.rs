//! Authoritative step server.
//!
//! Advances both doors on a fixed cadence, whether or not anyone is
//! watching. Step `n` happens at `(n - 1) * seconds_per_step` seconds after
//! start; callers bring the server up to date with [`StepServer::catch_up`]
//! before every request, which replaces the server's timer thread with the
//! virtual clock.
//!
//! Each step records the door state *before* the step, so a monitor that
//! missed steps can adopt it and replay the step itself.

use crate::error::{Result, SimError};
use doors_core::plot::{summarize, to_csv, ScenarioMarker, TelemetryRow};
use doors_core::{Door, DoorGeometry, Doors, ScenarioScript};
use doors_env::{ControlParams, DoorName, DoorReport, DoorState, StepCommand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Placeholder temperatures recorded when no sensors are attached.
pub const NOMINAL_TEMPS: [f64; 4] = [30.0, 33.0, 90.0, 96.0];

/// Scripts every server knows by name.
pub const BUILTIN_SCRIPTS: [(&str, &str); 4] = [
    ("quiet", "Quiet\n\nNobody comes.\n\n0\n"),
    ("steady", "Steady\n\nOne person\nevery fourth step.\n\n1\n0\n0\n0\n"),
    ("rush", "Rush hour\n\nA crowd, then a lull.\n\n2\n1\n2\n1\n0\n0\n"),
    ("burst", "Burst\n\nFive at once, then nobody\nfor a while.\n\n5\n0\n0\n0\n0\n0\n0\n0\n"),
];

/// Step server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub geometry: DoorGeometry,

    /// Seconds between step boundaries
    pub seconds_per_step: f64,

    /// How late the server's timer fires after each boundary, in seconds
    pub timer_lag: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            geometry: DoorGeometry::default(),
            seconds_per_step: 0.625,
            timer_lag: 0.0,
        }
    }
}

impl ServerConfig {
    pub fn with_geometry(mut self, geometry: DoorGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_seconds_per_step(mut self, seconds: f64) -> Self {
        self.seconds_per_step = seconds;
        self
    }

    pub fn with_timer_lag(mut self, seconds: f64) -> Self {
        self.timer_lag = seconds;
        self
    }
}

/// The scenario running on one door and the one queued behind it.
#[derive(Debug, Clone)]
struct Lane {
    script: ScenarioScript,

    /// Step number at which `script` took over
    started: u64,

    /// Control parameters the running script was started with
    control: ControlParams,

    queued: Option<(String, ScenarioScript, ControlParams)>,
}

impl Lane {
    fn new() -> Self {
        Self {
            script: ScenarioScript::constant("Idle", 0),
            started: 0,
            control: ControlParams::default(),
            queued: None,
        }
    }
}

/// Door states right after a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: u64,
    pub revolver: DoorState,
    pub swinger: DoorState,
}

impl StepRecord {
    pub fn state(&self, door: DoorName) -> &DoorState {
        match door {
            DoorName::Revolver => &self.revolver,
            DoorName::Swinger => &self.swinger,
        }
    }
}

/// The authoritative door simulation.
pub struct StepServer {
    config: ServerConfig,
    doors: Doors,

    /// Number of the next step to take
    steps: u64,

    lanes: [Lane; 2],
    last_step: StepCommand,
    history: Vec<StepRecord>,
    results_log: Vec<TelemetryRow>,
    scenarios_log: Vec<ScenarioMarker>,
    scripts: BTreeMap<String, ScenarioScript>,
}

impl StepServer {
    /// Creates a server whose first step is due at time zero.
    pub fn new(config: ServerConfig) -> Result<Self> {
        if !(config.seconds_per_step > 0.0) || !config.seconds_per_step.is_finite() {
            return Err(SimError::config(format!(
                "seconds_per_step must be positive, not {}",
                config.seconds_per_step
            )));
        }
        if !(config.timer_lag >= 0.0) || config.timer_lag >= config.seconds_per_step {
            return Err(SimError::config(format!(
                "timer_lag must be within [0, {}), not {}",
                config.seconds_per_step, config.timer_lag
            )));
        }
        let doors = config.geometry.build()?;
        let mut scripts = BTreeMap::new();
        for (name, source) in BUILTIN_SCRIPTS {
            scripts.insert(name.to_string(), ScenarioScript::parse(source)?);
        }
        let last_step = StepCommand {
            step: 1,
            duration: 0,
            revolver: report(&doors, DoorName::Revolver, 0, 0),
            swinger: report(&doors, DoorName::Swinger, 0, 0),
        };
        Ok(Self {
            config,
            doors,
            steps: 1,
            lanes: [Lane::new(), Lane::new()],
            last_step,
            history: Vec::new(),
            results_log: Vec::new(),
            scenarios_log: Vec::new(),
            scripts,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn doors(&self) -> &Doors {
        &self.doors
    }

    /// Number of steps taken so far.
    pub fn steps_taken(&self) -> u64 {
        self.steps - 1
    }

    /// Registers a script under a name `start` can refer to.
    pub fn register(&mut self, name: impl Into<String>, script: ScenarioScript) {
        self.scripts.insert(name.into(), script);
    }

    pub fn script_names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }

    /// Time of the boundary of step `n`.
    fn boundary(&self, step: u64) -> f64 {
        step.saturating_sub(1) as f64 * self.config.seconds_per_step
    }

    /// Takes every step whose timer has fired by `now` seconds. Returns the
    /// number of steps taken.
    pub fn catch_up(&mut self, now: f64) -> u64 {
        let mut taken = 0;
        while self.boundary(self.steps) + self.config.timer_lag <= now {
            self.advance();
            taken += 1;
        }
        taken
    }

    fn advance(&mut self) {
        let step = self.steps;
        let time = self.boundary(step) + self.config.timer_lag;
        let mut command = StepCommand {
            step,
            duration: 0,
            revolver: self.last_step.revolver.clone(),
            swinger: self.last_step.swinger.clone(),
        };
        for door in DoorName::ALL {
            let lane = &mut self.lanes[lane_index(door)];
            if (step - lane.started) % lane.script.cycle_len() as u64 == 0 {
                if let Some((name, script, control)) = lane.queued.take() {
                    info!(%door, scenario = %name, step, turns_per_sec = control.turns_per_sec, "scenario switched");
                    self.scenarios_log.push(ScenarioMarker {
                        time,
                        door,
                        control: name,
                    });
                    lane.script = script;
                    lane.started = step;
                    lane.control = control;
                }
            }
            let arrived = lane.script.arrivals_at(step - lane.started);
            let state = self.doors.door(door).snapshot();
            let model = self.doors.door_mut(door);
            model.add_arrivals(arrived);
            let motion = model.step();
            let mut door_report = report(&self.doors, door, arrived, motion);
            door_report.arriving = state.arriving;
            door_report.occupied = state.occupied;
            door_report.position = state.position;
            match door {
                DoorName::Revolver => command.revolver = door_report,
                DoorName::Swinger => command.swinger = door_report,
            }
        }
        debug!(step, time, "server step");
        self.history.push(StepRecord {
            step,
            revolver: self.doors.revolver.snapshot(),
            swinger: self.doors.swinger.snapshot(),
        });
        let mut row = vec![time, command.revolver.arrived as f64, command.swinger.arrived as f64];
        row.extend_from_slice(&NOMINAL_TEMPS);
        self.results_log.push(row);
        self.last_step = command;
        self.steps += 1;
    }

    /// The last step's report with the milliseconds left until the next
    /// boundary. A poll that lands after a boundary the server has not acted
    /// on yet gets a zero duration.
    pub fn step_command(&self, now: f64) -> StepCommand {
        let remaining = (self.boundary(self.steps) - now).max(0.0);
        StepCommand {
            duration: (remaining * 1000.0) as u64,
            ..self.last_step.clone()
        }
    }

    /// Queues a script on one door. It takes over, together with its control
    /// parameters, at the current script's next cycle boundary.
    pub fn start(&mut self, door: DoorName, name: &str, script: ScenarioScript, control: &ControlParams) {
        info!(%door, scenario = name, turns_per_sec = control.turns_per_sec, "scenario queued");
        self.lanes[lane_index(door)].queued = Some((name.to_string(), script, control.clone()));
    }

    /// Queues a registered script by name.
    pub fn start_named(&mut self, door: DoorName, name: &str, control: &ControlParams) -> Result<()> {
        let script = self
            .scripts
            .get(name)
            .cloned()
            .ok_or_else(|| SimError::UnknownScenario(name.to_string()))?;
        self.start(door, name, script, control);
        Ok(())
    }

    /// Control parameters of the script currently running on a door.
    pub fn control(&self, door: DoorName) -> &ControlParams {
        &self.lanes[lane_index(door)].control
    }

    /// One more person waiting at a door.
    pub fn arrive(&mut self, door: DoorName) {
        self.doors.door_mut(door).add_arrivals(1);
    }

    /// Door states right after a step, if the server took it.
    pub fn state_after(&self, step: u64) -> Option<&StepRecord> {
        let index = step.checked_sub(1)?;
        self.history.get(index as usize)
    }

    pub fn results_log(&self) -> &[TelemetryRow] {
        &self.results_log
    }

    pub fn scenarios_log(&self) -> &[ScenarioMarker] {
        &self.scenarios_log
    }

    /// The results log summarized into rows of `interval` seconds.
    pub fn results_csv(&self, interval: f64) -> String {
        to_csv(&summarize(&self.results_log, interval))
    }

    /// Scenario changes as `time,door,control` lines.
    pub fn scenarios_csv(&self) -> String {
        self.scenarios_log
            .iter()
            .map(|marker| format!("{},{},{}", marker.time, marker.door, marker.control))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn lane_index(door: DoorName) -> usize {
    match door {
        DoorName::Revolver => 0,
        DoorName::Swinger => 1,
    }
}

/// A door's report carrying its current state and the given outcome.
fn report(doors: &Doors, door: DoorName, arrived: u32, motion: i32) -> DoorReport {
    let state = doors.door(door).snapshot();
    DoorReport {
        arrived,
        rotate: (door == DoorName::Revolver).then_some(motion),
        angle: (door == DoorName::Swinger).then(|| doors.swinger.angle()),
        arriving: state.arriving,
        occupied: state.occupied,
        position: state.position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doors_core::plot::{from_csv, parse_markers};
    use proptest::prelude::*;

    fn server() -> StepServer {
        StepServer::new(ServerConfig::default()).unwrap()
    }

    #[test]
    fn test_first_step_is_due_at_start() {
        let mut server = server();
        assert_eq!(server.catch_up(0.0), 1);
        assert_eq!(server.step_command(0.0).step, 1);
        assert_eq!(server.step_command(0.0).duration, 625);

        assert_eq!(server.catch_up(0.6), 0);
        assert_eq!(server.catch_up(1.3), 2);
        assert_eq!(server.steps_taken(), 3);
        assert_eq!(server.step_command(1.3).step, 3);
    }

    #[test]
    fn test_duration_counts_down_and_truncates() {
        let mut server = server();
        server.catch_up(0.125);
        assert_eq!(server.step_command(0.125).duration, 500);
        assert_eq!(server.step_command(0.6249).duration, 0);
        assert_eq!(server.step_command(0.9).duration, 0);
    }

    #[test]
    fn test_timer_lag_opens_boundary_race() {
        let config = ServerConfig::default().with_timer_lag(0.05);
        let mut server = StepServer::new(config).unwrap();
        server.catch_up(0.01);
        assert_eq!(server.steps_taken(), 0);

        server.catch_up(0.05);
        server.catch_up(0.64);
        // Boundary of step 2 passed, timer has not fired yet
        assert_eq!(server.step_command(0.64).step, 1);
        assert_eq!(server.step_command(0.64).duration, 0);

        server.catch_up(0.7);
        assert_eq!(server.step_command(0.7).step, 2);
        assert_eq!(server.step_command(0.7).duration, 550);
    }

    #[test]
    fn test_rejects_bad_config() {
        assert!(StepServer::new(ServerConfig::default().with_seconds_per_step(0.0)).is_err());
        assert!(StepServer::new(ServerConfig::default().with_timer_lag(0.7)).is_err());
    }

    #[test]
    fn test_report_carries_pre_step_state() {
        let mut server = server();
        server.catch_up(0.0);
        server.arrive(DoorName::Revolver);
        server.catch_up(0.7);

        let command = server.step_command(0.7);
        assert_eq!(command.step, 2);
        // The arrival was waiting before the step and entered during it
        assert_eq!(command.revolver.arriving, 1);
        assert_eq!(command.revolver.occupied, vec![false; 4]);
        assert_eq!(command.revolver.rotate, Some(0));
        assert_eq!(server.doors().revolver.occupied(), &[true, false, false, false]);

        let after = server.state_after(2).unwrap();
        assert_eq!(after.revolver.arriving, 0);
        assert!(server.state_after(3).is_none());
        assert!(server.state_after(0).is_none());
    }

    #[test]
    fn test_scenario_switches_at_cycle_boundary() {
        let mut server = server();
        server.catch_up(0.0);
        server.start_named(DoorName::Revolver, "steady", &ControlParams::default()).unwrap();
        server.catch_up(0.7);
        assert_eq!(server.step_command(0.7).revolver.arrived, 1);

        // Queue another: steady has a four-step cycle starting at step 2
        let slow = ControlParams { turns_per_sec: 0.5 };
        server.start_named(DoorName::Revolver, "quiet", &slow).unwrap();
        server.catch_up(0.625 * 4.0);
        assert_eq!(server.scenarios_log().len(), 1);
        assert_eq!(server.control(DoorName::Revolver), &ControlParams::default());
        server.catch_up(0.625 * 5.0);
        assert_eq!(server.scenarios_log().len(), 2);
        assert_eq!(server.scenarios_log()[1].control, "quiet");
        assert_eq!(server.scenarios_log()[1].time, 0.625 * 5.0);
        assert_eq!(server.control(DoorName::Revolver), &slow);
        assert_eq!(server.control(DoorName::Swinger), &ControlParams::default());

        assert!(matches!(
            server.start_named(DoorName::Swinger, "parade", &slow),
            Err(SimError::UnknownScenario(_))
        ));
    }

    #[test]
    fn test_swinger_reports_angle() {
        let mut server = server();
        server.catch_up(0.0);
        server.arrive(DoorName::Swinger);
        server.catch_up(0.7);

        let command = server.step_command(0.7);
        assert_eq!(command.swinger.rotate, None);
        assert_eq!(command.swinger.angle, Some(server.doors().swinger.angle()));
        assert!(command.swinger.angle.unwrap() > 0.0);
    }

    #[test]
    fn test_logs_feed_the_plotter() {
        let mut server = server();
        server.start_named(DoorName::Swinger, "rush", &ControlParams::default()).unwrap();
        server.catch_up(40.0);

        let rows = from_csv(&server.results_csv(15.0)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][3..], &NOMINAL_TEMPS);
        assert!(rows[0][2] > 0.0);

        let markers = parse_markers(&server.scenarios_csv()).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].door, DoorName::Swinger);
        assert_eq!(markers[0].time, 0.0);
    }

    proptest! {
        #[test]
        fn prop_polls_never_skip_or_overshoot(
            lag_ms in 0u64..600,
            mut polls_ms in proptest::collection::vec(0u64..20_000, 1..60),
        ) {
            polls_ms.sort_unstable();
            let config = ServerConfig::default().with_timer_lag(lag_ms as f64 / 1000.0);
            let mut server = StepServer::new(config).unwrap();
            for &ms in &polls_ms {
                let now = ms as f64 / 1000.0;
                server.catch_up(now);
                let command = server.step_command(now);
                prop_assert_eq!(command.step, server.steps_taken().max(1));
                prop_assert!(command.duration <= 625);
            }
            for step in 1..=server.steps_taken() {
                prop_assert_eq!(server.state_after(step).map(|r| r.step), Some(step));
            }
        }
    }
}
