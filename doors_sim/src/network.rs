//! Simulated step transports with fault injection.

use crate::server::StepServer;
use async_trait::async_trait;
use doors_env::{ControlParams, DoorName, DoorsContext, EnvError, StepCommand, StepTransport};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// Initial fault settings of a simulated link, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultPlan {
    /// Round trip time of every call
    pub latency_ms: u64,

    /// Probability that a poll times out (0.0 - 1.0)
    pub poll_loss: f64,

    pub fail_polls: u32,
    pub fail_arrivals: u32,
    pub fail_starts: u32,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            latency_ms: 5,
            poll_loss: 0.0,
            fail_polls: 0,
            fail_arrivals: 0,
            fail_starts: 0,
        }
    }
}

impl FaultPlan {
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_poll_loss(mut self, loss_rate: f64) -> Self {
        self.poll_loss = loss_rate.clamp(0.0, 1.0);
        self
    }
}

/// Which call a fault applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Start,
    Arrive,
    Poll,
}

/// Link controller for fault injection. Clones share the same link.
#[derive(Debug, Clone)]
pub struct LinkController {
    plan: Arc<Mutex<FaultPlan>>,
}

impl LinkController {
    pub fn new(plan: FaultPlan) -> Self {
        Self {
            plan: Arc::new(Mutex::new(plan)),
        }
    }

    /// Sets the round trip time of every call.
    pub fn set_latency(&self, latency_ms: u64) {
        self.plan.lock().unwrap().latency_ms = latency_ms;
    }

    /// Sets the probability that a poll times out.
    pub fn set_loss(&self, loss_rate: f64) {
        self.plan.lock().unwrap().poll_loss = loss_rate.clamp(0.0, 1.0);
    }

    /// Makes the next `count` polls fail.
    pub fn fail_next_polls(&self, count: u32) {
        self.plan.lock().unwrap().fail_polls += count;
    }

    /// Makes the next `count` arrival notifications fail.
    pub fn fail_next_arrivals(&self, count: u32) {
        self.plan.lock().unwrap().fail_arrivals += count;
    }

    /// Makes the next `count` scenario starts fail.
    pub fn fail_next_starts(&self, count: u32) {
        self.plan.lock().unwrap().fail_starts += count;
    }

    pub fn get_latency(&self) -> Duration {
        Duration::from_millis(self.plan.lock().unwrap().latency_ms)
    }

    pub fn get_loss(&self) -> f64 {
        self.plan.lock().unwrap().poll_loss
    }

    /// Consumes one forced failure for the call, if any is pending.
    fn take_failure(&self, call: Call) -> bool {
        let mut plan = self.plan.lock().unwrap();
        let pending = match call {
            Call::Start => &mut plan.fail_starts,
            Call::Arrive => &mut plan.fail_arrivals,
            Call::Poll => &mut plan.fail_polls,
        };
        if *pending > 0 {
            *pending -= 1;
            true
        } else {
            false
        }
    }
}

impl Default for LinkController {
    fn default() -> Self {
        Self::new(FaultPlan::default())
    }
}

/// In-process transport to a shared [`StepServer`].
///
/// Every call waits out the link latency on the context's clock, brings the
/// server up to date, and round-trips its payload through the JSON wire
/// format.
pub struct SimTransport<X: DoorsContext> {
    server: Arc<Mutex<StepServer>>,
    ctx: Arc<X>,
    link: LinkController,

    /// Decides poll loss
    rng: Mutex<ChaCha8Rng>,
}

impl<X: DoorsContext> SimTransport<X> {
    pub fn new(server: Arc<Mutex<StepServer>>, ctx: Arc<X>, link: LinkController, seed: u64) -> Self {
        Self {
            server,
            ctx,
            link,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
        }
    }

    pub fn link(&self) -> &LinkController {
        &self.link
    }

    pub fn server(&self) -> &Arc<Mutex<StepServer>> {
        &self.server
    }

    /// Waits out the latency and decides whether the call fails.
    async fn traverse(&self, call: Call) -> Result<(), EnvError> {
        let latency = self.link.get_latency();
        self.ctx.sleep(latency).await;
        if self.link.take_failure(call) {
            debug!(?call, "injected failure");
            return Err(EnvError::transport("HTTP 500"));
        }
        if call == Call::Poll {
            let loss = self.link.get_loss();
            if loss > 0.0 && self.rng.lock().unwrap().gen_bool(loss) {
                debug!("poll lost");
                return Err(EnvError::Timeout(latency.as_millis() as u64));
            }
        }
        Ok(())
    }

    /// Locks the server after bringing it up to the current time.
    fn with_server<R>(&self, f: impl FnOnce(&mut StepServer, f64) -> R) -> R {
        let now = self.ctx.now().as_secs_f64();
        let mut server = self.server.lock().unwrap();
        server.catch_up(now);
        f(&mut server, now)
    }
}

#[async_trait]
impl<X: DoorsContext> StepTransport for SimTransport<X> {
    async fn start(&self, door: DoorName, scenario: &str, control: &ControlParams) -> Result<(), EnvError> {
        self.traverse(Call::Start).await?;
        // Params cross the link as JSON, like any other request body
        let body = serde_json::to_string(control)?;
        let control: ControlParams = serde_json::from_str(&body)?;
        self.with_server(|server, _| server.start_named(door, scenario, &control))
            .map_err(|e| EnvError::transport(format!("HTTP 404: {}", e)))
    }

    async fn arrive(&self, door: DoorName) -> Result<(), EnvError> {
        self.traverse(Call::Arrive).await?;
        self.with_server(|server, _| server.arrive(door));
        Ok(())
    }

    async fn next_step(&self) -> Result<StepCommand, EnvError> {
        self.traverse(Call::Poll).await?;
        let body = self.with_server(|server, now| server.step_command(now).to_json())?;
        Ok(StepCommand::from_json(&body)?)
    }
}

/// Transport that replays canned replies and records every call.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<StepCommand, EnvError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that answers polls with `commands`, in order.
    pub fn from_commands(commands: impl IntoIterator<Item = StepCommand>) -> Self {
        let transport = Self::new();
        for command in commands {
            transport.push(Ok(command));
        }
        transport
    }

    pub fn push(&self, reply: Result<StepCommand, EnvError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl StepTransport for ScriptedTransport {
    async fn start(&self, door: DoorName, scenario: &str, _control: &ControlParams) -> Result<(), EnvError> {
        self.record(format!("start {} {}", door, scenario));
        Ok(())
    }

    async fn arrive(&self, door: DoorName) -> Result<(), EnvError> {
        self.record(format!("arrive {}", door));
        Ok(())
    }

    async fn next_step(&self) -> Result<StepCommand, EnvError> {
        self.record("step".to_string());
        tokio::task::yield_now().await;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EnvError::unreachable("script exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use crate::server::ServerConfig;
    use doors_core::Door;

    fn transport(plan: FaultPlan) -> SimTransport<SimContext> {
        let server = StepServer::new(ServerConfig::default()).unwrap();
        SimTransport::new(
            Arc::new(Mutex::new(server)),
            SimContext::shared(7),
            LinkController::new(plan),
            7,
        )
    }

    #[tokio::test]
    async fn test_poll_catches_up_after_latency() {
        let net = transport(FaultPlan::default().with_latency(700));
        let command = net.next_step().await.unwrap();

        // Reply is built 700ms in: step 2 is due at 625ms
        assert_eq!(command.step, 2);
        assert_eq!(command.duration, 550);
        assert_eq!(net.ctx.now(), Duration::from_millis(700));
    }

    #[tokio::test]
    async fn test_forced_failures_are_consumed() {
        let net = transport(FaultPlan::default());
        net.link().fail_next_polls(2);
        net.link().fail_next_arrivals(1);

        assert!(net.next_step().await.is_err());
        assert!(net.next_step().await.is_err());
        assert!(net.next_step().await.is_ok());

        assert!(net.arrive(DoorName::Swinger).await.is_err());
        net.arrive(DoorName::Swinger).await.unwrap();
        assert_eq!(net.server().lock().unwrap().doors().swinger.arriving(), 1);
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_scenario() {
        let net = transport(FaultPlan::default());
        let control = ControlParams::default();

        net.start(DoorName::Revolver, "rush", &control).await.unwrap();
        let err = net.start(DoorName::Revolver, "parade", &control).await.unwrap_err();
        assert!(matches!(err, EnvError::Transport(ref msg) if msg.contains("parade")));

        net.link().fail_next_starts(1);
        assert!(net.start(DoorName::Revolver, "rush", &control).await.is_err());
    }

    #[tokio::test]
    async fn test_start_hands_control_to_server() {
        let net = transport(FaultPlan::default());
        let control = ControlParams { turns_per_sec: 0.4 };

        net.start(DoorName::Swinger, "rush", &control).await.unwrap();
        assert_eq!(net.server().lock().unwrap().control(DoorName::Swinger), &ControlParams::default());

        // The idle script yields at the next step boundary
        net.ctx.sleep(Duration::from_millis(700)).await;
        net.next_step().await.unwrap();
        let server = net.server().lock().unwrap();
        assert_eq!(server.control(DoorName::Swinger), &control);
        assert_eq!(server.control(DoorName::Revolver), &ControlParams::default());
    }

    #[tokio::test]
    async fn test_total_loss_times_out() {
        let net = transport(FaultPlan::default().with_poll_loss(1.0));
        assert!(matches!(net.next_step().await, Err(EnvError::Timeout(5))));

        net.link().set_loss(0.0);
        assert!(net.next_step().await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_transport_replays_in_order() {
        let net = ScriptedTransport::new();
        net.push(Err(EnvError::transport("boom")));
        let control = ControlParams::default();
        net.start(DoorName::Swinger, "quiet", &control).await.unwrap();

        assert!(net.next_step().await.is_err());
        assert!(matches!(net.next_step().await, Err(EnvError::Unreachable(_))));
        assert_eq!(net.calls(), vec!["start swinger quiet", "step", "step"]);
        assert_eq!(net.remaining(), 0);
    }
}
