//! Remote monitor: mirrors the authoritative step source on the local canvas.
//!
//! Polls are strictly sequential. A reply is reconciled by the
//! [`Synchronizer`], animated with the server-supplied duration, and only once
//! the animation has settled is the next poll issued. Commands that arrive
//! while a poll is in flight or a step is animating are applied in between;
//! requests are never aborted.

use crate::doors::Doors;
use crate::error::{DoorsError, Result};
use crate::fault::{Fault, FaultReporter};
use crate::render::{Canvas, FrameStatus, Renderer};
use crate::sync::{PollOutcome, SyncPhase, SyncPolicy, Synchronizer};
use doors_env::{ControlParams, DoorName, DoorsContext, EnvError, StepCommand, StepTransport};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

/// Monitor configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub policy: SyncPolicy,

    /// Sent with every scenario start
    pub control: ControlParams,
}

impl MonitorConfig {
    pub fn with_policy(mut self, policy: SyncPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_control(mut self, control: ControlParams) -> Self {
        self.control = control;
        self
    }
}

/// Commands accepted by [`Monitor::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorCommand {
    /// Start a named scenario on one door
    Load { door: DoorName, scenario: String },
    Arrive(DoorName),
    Stop,
    Shutdown,
}

/// Drives the renderer from the remote step source.
pub struct Monitor<C: Canvas, T: StepTransport> {
    doors: Doors,
    renderer: Renderer<C>,
    transport: Arc<T>,
    sync: Synchronizer,
    config: MonitorConfig,
    reporter: FaultReporter,
}

impl<C: Canvas, T: StepTransport> Monitor<C, T> {
    /// Creates an idle monitor and paints the doors at rest.
    pub fn new(
        doors: Doors,
        renderer: Renderer<C>,
        transport: Arc<T>,
        config: MonitorConfig,
        reporter: FaultReporter,
    ) -> Self {
        let mut monitor = Self {
            doors,
            renderer,
            transport,
            sync: Synchronizer::new(config.policy.clone()),
            config,
            reporter,
        };
        monitor.draw();
        monitor
    }

    pub fn doors(&self) -> &Doors {
        &self.doors
    }

    pub fn renderer(&self) -> &Renderer<C> {
        &self.renderer
    }

    pub fn phase(&self) -> SyncPhase {
        self.sync.phase()
    }

    pub fn local_step(&self) -> u64 {
        self.sync.local_step()
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

    /// Starts a scenario on the source and begins polling if idle.
    pub async fn load(&mut self, door: DoorName, scenario: &str) -> Result<()> {
        if let Err(err) = self.transport.start(door, scenario, &self.config.control).await {
            self.reporter
                .report(Fault::transport(format!("Start request failed: {}", err)));
            return Err(err.into());
        }
        info!(%door, scenario, "scenario loaded");
        if self.sync.start() {
            debug!("polling started");
        }
        Ok(())
    }

    /// Counts an arrival locally right away, then tells the source. The local
    /// increment stays even if the source cannot be told.
    pub async fn arrive(&mut self, door: DoorName) -> Result<()> {
        self.doors.door_mut(door).add_arrivals(1);
        self.draw();
        if let Err(err) = self.transport.arrive(door).await {
            self.reporter
                .report(Fault::transport(format!("Arrival command failed: {}", err)));
            return Err(err.into());
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.sync.is_polling() {
            info!(step = self.sync.local_step(), "monitor stopped");
        }
        self.sync.stop();
    }

    /// Runs one poll cycle: request, reconcile, animate, notify.
    pub async fn poll_once<X>(&mut self, ctx: &X) -> Result<PollOutcome>
    where
        X: DoorsContext + ?Sized,
    {
        if !self.sync.is_polling() {
            return Ok(PollOutcome::Idle);
        }
        let reply = self.transport.next_step().await;
        let outcome = self.receive(reply)?;
        if let PollOutcome::Stepped(report) = &outcome {
            self.renderer
                .step(ctx, &self.doors, report.duration_ms, report.motions)
                .await?;
            self.reporter.stepped(report.clone());
        }
        Ok(outcome)
    }

    /// Polls continuously while applying commands, until `Shutdown` arrives
    /// or the sender is dropped. A failed poll leaves the monitor idle until
    /// the next `Load`; other errors end the loop.
    pub async fn run<X>(&mut self, ctx: &X, mut commands: UnboundedReceiver<MonitorCommand>) -> Result<()>
    where
        X: DoorsContext + ?Sized,
    {
        let mut closing = false;
        loop {
            if closing {
                return Ok(());
            }
            if !self.sync.is_polling() {
                match commands.recv().await {
                    None | Some(MonitorCommand::Shutdown) => return Ok(()),
                    Some(command) => {
                        self.apply(command).await;
                        continue;
                    }
                }
            }

            let transport = Arc::clone(&self.transport);
            let mut poll = transport.next_step();
            let reply = loop {
                tokio::select! {
                    biased;
                    command = commands.recv(), if !closing => match command {
                        None | Some(MonitorCommand::Shutdown) => closing = true,
                        Some(command) => self.apply(command).await,
                    },
                    reply = &mut poll => break reply,
                }
            };

            let report = match self.receive(reply) {
                Ok(PollOutcome::Stepped(report)) => report,
                Ok(_) => continue,
                Err(DoorsError::Transport(err)) => {
                    debug!(%err, "polling halted, waiting for a reload");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if let Some(mut animation) = self.renderer.animate(&self.doors, report.duration_ms, report.motions)? {
                loop {
                    tokio::select! {
                        biased;
                        command = commands.recv(), if !closing => match command {
                            None | Some(MonitorCommand::Shutdown) => closing = true,
                            Some(command) => self.apply(command).await,
                        },
                        frame_time = ctx.next_frame() => {
                            if self.renderer.paint_frame(&self.doors, &mut animation, frame_time) == FrameStatus::Settled {
                                break;
                            }
                        }
                    }
                }
            }
            self.reporter.stepped(report);
        }
    }

    async fn apply(&mut self, command: MonitorCommand) {
        debug!(?command, "monitor command");
        // Failures are already reported as faults
        match command {
            MonitorCommand::Load { door, scenario } => {
                self.load(door, &scenario).await.ok();
            }
            MonitorCommand::Arrive(door) => {
                self.arrive(door).await.ok();
            }
            MonitorCommand::Stop => self.stop(),
            MonitorCommand::Shutdown => {}
        }
    }

    fn receive(&mut self, reply: std::result::Result<StepCommand, EnvError>) -> Result<PollOutcome> {
        match reply {
            Ok(command) => self.sync.apply(&mut self.doors, &command, &mut self.reporter),
            Err(_) if !self.sync.is_polling() => Ok(PollOutcome::Discarded),
            Err(err) => {
                self.reporter
                    .report(Fault::transport(format!("Step request failed: {}", err)));
                self.sync.stop();
                Err(err.into())
            }
        }
    }
}
