//! Local player: runs the door models on a wall-clock cadence.
//!
//! The player owns the doors and the renderer. `play` starts a single step
//! loop; `pause` stops it at its next check without cancelling the step that
//! is currently animating. Observers hear about a step once its animation has
//! settled.

use crate::doors::{Doors, Motions};
use crate::error::{DoorsError, Result};
use crate::fault::{Fault, FaultReporter, StepReport, StepSource};
use crate::render::{Canvas, FrameStatus, Renderer};
use crate::scenario::ScenarioScript;
use doors_env::{DoorName, DoorsContext};
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Whether the step loop is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayState {
    Paused,
    Running { ms_per_step: f64 },
}

/// Commands accepted by [`Player::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    /// Start stepping every given number of milliseconds
    Play(f64),
    Pause,
    /// Take one step animated over the given milliseconds
    Step(f64),
    Arrive(DoorName),
    Shutdown,
}

/// Drives the renderer from the local door models.
pub struct Player<C: Canvas> {
    doors: Doors,
    renderer: Renderer<C>,
    state: PlayState,

    /// Optional arrival schedule per door
    scripts: [Option<ScenarioScript>; 2],

    /// Steps taken since creation
    steps: u64,

    reporter: FaultReporter,
}

impl<C: Canvas> Player<C> {
    /// Creates a paused player and paints the doors at rest.
    pub fn new(doors: Doors, renderer: Renderer<C>, reporter: FaultReporter) -> Self {
        let mut player = Self {
            doors,
            renderer,
            state: PlayState::Paused,
            scripts: [None, None],
            steps: 0,
            reporter,
        };
        player.draw();
        player
    }

    /// Schedules arrivals for one door from a scenario script.
    pub fn with_script(mut self, door: DoorName, script: ScenarioScript) -> Self {
        self.scripts[door_index(door)] = Some(script);
        self
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn doors(&self) -> &Doors {
        &self.doors
    }

    pub fn renderer(&self) -> &Renderer<C> {
        &self.renderer
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Hands the doors and the renderer to another driver.
    pub fn into_parts(self) -> (Doors, Renderer<C>) {
        (self.doors, self.renderer)
    }

    /// Repaints at the current offsets.
    pub fn draw(&mut self) {
        let offsets = self.renderer.last_offsets();
        self.renderer.draw(&self.doors, offsets);
    }

    /// Switches to running. Returns `true` when this call started the loop and
    /// `false` when it was already running.
    pub fn play(&mut self, ms_per_step: f64) -> Result<bool> {
        if !ms_per_step.is_finite() || ms_per_step <= 0.0 {
            let err = DoorsError::InvalidStepInterval(ms_per_step);
            self.reporter.report(Fault::configuration(err.to_string()));
            return Err(err);
        }
        match self.state {
            PlayState::Running { .. } => Ok(false),
            PlayState::Paused => {
                info!(ms_per_step, "playing");
                self.state = PlayState::Running { ms_per_step };
                Ok(true)
            }
        }
    }

    pub fn pause(&mut self) {
        if self.state != PlayState::Paused {
            info!(steps = self.steps, "paused");
        }
        self.state = PlayState::Paused;
    }

    /// One more person waiting at `door`.
    pub fn arrive(&mut self, door: DoorName) {
        self.doors.door_mut(door).add_arrivals(1);
        self.draw();
    }

    /// Takes exactly one step regardless of the play state.
    pub async fn step<X>(&mut self, ctx: &X, duration_ms: f64) -> Result<Motions>
    where
        X: DoorsContext + ?Sized,
    {
        self.check_duration(duration_ms)?;
        let motions = self.advance();
        self.renderer.step(ctx, &self.doors, duration_ms, motions).await?;
        self.settled(duration_ms, motions);
        Ok(motions)
    }

    /// Runs the step loop, applying commands between animation frames until
    /// `Shutdown` arrives or the sender is dropped.
    pub async fn run<X>(&mut self, ctx: &X, mut commands: UnboundedReceiver<PlayerCommand>) -> Result<()>
    where
        X: DoorsContext + ?Sized,
    {
        let mut deferred: VecDeque<f64> = VecDeque::new();
        loop {
            if let Some(duration) = deferred.pop_front() {
                self.step(ctx, duration).await.ok();
                continue;
            }
            let ms_per_step = match self.state {
                PlayState::Paused => match commands.recv().await {
                    None | Some(PlayerCommand::Shutdown) => return Ok(()),
                    Some(PlayerCommand::Step(duration)) => {
                        deferred.push_back(duration);
                        continue;
                    }
                    Some(command) => {
                        self.apply(command);
                        continue;
                    }
                },
                PlayState::Running { ms_per_step } => ms_per_step,
            };

            let motions = self.advance();
            let mut animation = match self.renderer.animate(&self.doors, ms_per_step, motions)? {
                Some(animation) => animation,
                None => continue,
            };
            // A shutdown lets the animating step settle first
            let mut closing = false;
            loop {
                tokio::select! {
                    biased;
                    command = commands.recv(), if !closing => match command {
                        None | Some(PlayerCommand::Shutdown) => closing = true,
                        Some(PlayerCommand::Step(duration)) => deferred.push_back(duration),
                        Some(command) => self.apply(command),
                    },
                    frame_time = ctx.next_frame() => {
                        if self.renderer.paint_frame(&self.doors, &mut animation, frame_time) == FrameStatus::Settled {
                            break;
                        }
                    }
                }
            }
            self.settled(ms_per_step, motions);
            if closing {
                return Ok(());
            }
        }
    }

    fn apply(&mut self, command: PlayerCommand) {
        debug!(?command, "player command");
        match command {
            // Already reported as a fault
            PlayerCommand::Play(ms_per_step) => {
                self.play(ms_per_step).ok();
            }
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Arrive(door) => self.arrive(door),
            PlayerCommand::Step(_) | PlayerCommand::Shutdown => {}
        }
    }

    fn check_duration(&mut self, duration_ms: f64) -> Result<()> {
        if duration_ms.is_nan() || duration_ms < 0.0 {
            let err = DoorsError::InvalidDuration(duration_ms);
            self.reporter.report(Fault::configuration(err.to_string()));
            return Err(err);
        }
        Ok(())
    }

    fn advance(&mut self) -> Motions {
        for door in DoorName::ALL {
            if let Some(script) = &self.scripts[door_index(door)] {
                let count = script.arrivals_at(self.steps);
                self.doors.door_mut(door).add_arrivals(count);
            }
        }
        self.steps += 1;
        self.doors.step_all()
    }

    fn settled(&mut self, duration_ms: f64, motions: Motions) {
        self.reporter.stepped(StepReport {
            source: StepSource::Player,
            step: self.steps,
            motions,
            duration_ms,
        });
    }
}

fn door_index(door: DoorName) -> usize {
    match door {
        DoorName::Revolver => 0,
        DoorName::Swinger => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doors::Door;
    use crate::fault::{Event, FaultKind};
    use crate::render::RecordingCanvas;
    use crate::testing::FrameClock;
    use tokio::sync::mpsc;

    fn player() -> (Player<RecordingCanvas>, UnboundedReceiver<Event>) {
        let (reporter, events) = FaultReporter::channel();
        let renderer = Renderer::for_canvas(RecordingCanvas::new(480.0, 240.0));
        (Player::new(Doors::default(), renderer, reporter), events)
    }

    fn stepped(events: &mut UnboundedReceiver<Event>) -> usize {
        let mut count = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, Event::Stepped(_)) {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn test_play_validates_interval() {
        let (mut player, mut events) = player();
        assert!(matches!(player.play(0.0), Err(DoorsError::InvalidStepInterval(_))));
        assert!(player.play(f64::NAN).is_err());
        assert_eq!(player.state(), PlayState::Paused);

        match events.try_recv().unwrap() {
            Event::Fault(fault) => {
                assert_eq!(fault.kind, FaultKind::Configuration);
                assert!(fault.fatal);
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_play_is_idempotent() {
        let (mut player, _events) = player();
        assert!(player.play(500.0).unwrap());
        assert!(!player.play(250.0).unwrap());
        assert_eq!(player.state(), PlayState::Running { ms_per_step: 500.0 });

        player.pause();
        assert_eq!(player.state(), PlayState::Paused);
    }

    #[test]
    fn test_arrive_repaints() {
        let (mut player, _events) = player();
        let frames = player.renderer().canvas().frames();
        player.arrive(DoorName::Swinger);

        assert_eq!(player.doors().swinger.arriving(), 1);
        assert_eq!(player.renderer().canvas().frames(), frames + 1);
    }

    #[tokio::test]
    async fn test_step_while_paused_notifies_after_render() {
        let clock = FrameClock::new();
        let (mut player, mut events) = player();
        player.arrive(DoorName::Swinger);

        let motions = player.step(&clock, 100.0).await.unwrap();

        assert_eq!(motions.swinger, 4);
        assert!(player.renderer().last_offsets().is_rest());
        assert_eq!(player.state(), PlayState::Paused);
        assert_eq!(stepped(&mut events), 1);
    }

    #[tokio::test]
    async fn test_step_rejects_negative_duration_without_stepping() {
        let clock = FrameClock::new();
        let (mut player, mut events) = player();
        player.arrive(DoorName::Revolver);

        assert!(player.step(&clock, -1.0).await.is_err());
        assert_eq!(player.steps(), 0);
        assert_eq!(player.doors().revolver.arriving(), 1);
        assert!(matches!(events.try_recv(), Ok(Event::Fault(f)) if f.fatal));
    }

    #[tokio::test]
    async fn test_scripts_schedule_arrivals() {
        let clock = FrameClock::new();
        let (player, _events) = player();
        let script = ScenarioScript::parse("Pulse\n\n\n1\n0").unwrap();
        let mut player = player.with_script(DoorName::Revolver, script);

        player.step(&clock, 0.0).await.unwrap();
        assert!(player.doors().revolver.occupied()[0], "scripted person entered");
    }

    #[tokio::test]
    async fn test_run_plays_one_loop_until_paused() {
        let clock = FrameClock::new();
        let (mut player, mut events) = player();
        let (tx, rx) = mpsc::unbounded_channel();

        tx.send(PlayerCommand::Play(40.0)).unwrap();
        tx.send(PlayerCommand::Play(40.0)).unwrap();
        tx.send(PlayerCommand::Pause).unwrap();
        tx.send(PlayerCommand::Shutdown).unwrap();
        player.run(&clock, rx).await.unwrap();

        // The second play was a no-op; pause and shutdown let the first step settle
        assert_eq!(player.steps(), 1);
        assert_eq!(player.state(), PlayState::Paused);
        assert_eq!(stepped(&mut events), 1);
    }

    #[tokio::test]
    async fn test_into_parts_keeps_model_state() {
        let clock = FrameClock::new();
        let (mut player, _events) = player();
        player.arrive(DoorName::Revolver);
        player.step(&clock, 0.0).await.unwrap();

        let (doors, renderer) = player.into_parts();
        assert!(doors.revolver.occupied()[0]);
        assert!(renderer.canvas().frames() > 0);
    }
}
