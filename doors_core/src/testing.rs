//! Deterministic test doubles for the driver tests.

use async_trait::async_trait;
use doors_env::{
    ControlParams, DoorName, DoorReport, DoorState, DoorsContext, EnvError, StepCommand,
    StepTransport,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Virtual clock that advances 16ms per animation frame.
pub struct FrameClock {
    now: Mutex<Duration>,
    frames: AtomicU64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
            frames: AtomicU64::new(0),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    fn advance(&self, by: Duration) -> Duration {
        let mut now = self.now.lock().unwrap();
        *now += by;
        *now
    }
}

#[async_trait]
impl DoorsContext for FrameClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }

    async fn next_frame(&self) -> Duration {
        tokio::task::yield_now().await;
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.advance(Duration::from_millis(16))
    }
}

/// Transport answering polls from a queue and recording every call.
#[derive(Default)]
pub struct StubTransport {
    replies: Mutex<VecDeque<Result<StepCommand, EnvError>>>,
    pub fail_arrive: AtomicBool,
    pub fail_start: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, reply: Result<StepCommand, EnvError>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepTransport for StubTransport {
    async fn start(&self, door: DoorName, scenario: &str, _control: &ControlParams) -> Result<(), EnvError> {
        self.calls.lock().unwrap().push(format!("start {} {}", door, scenario));
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EnvError::transport("start refused"));
        }
        Ok(())
    }

    async fn arrive(&self, door: DoorName) -> Result<(), EnvError> {
        self.calls.lock().unwrap().push(format!("arrive {}", door));
        if self.fail_arrive.load(Ordering::SeqCst) {
            return Err(EnvError::transport("arrive refused"));
        }
        Ok(())
    }

    async fn next_step(&self) -> Result<StepCommand, EnvError> {
        self.calls.lock().unwrap().push("step".to_string());
        tokio::task::yield_now().await;
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EnvError::unreachable("no more replies")))
    }
}

/// A resting door pair's report with the given step and duration.
pub fn idle_command(step: u64, duration: u64) -> StepCommand {
    StepCommand {
        step,
        duration,
        revolver: report(&DoorState {
            arriving: 0,
            occupied: vec![false; 4],
            position: 0,
        }),
        swinger: DoorReport {
            angle: Some(0.0),
            rotate: None,
            ..report(&DoorState {
                arriving: 0,
                occupied: vec![false],
                position: 0,
            })
        },
    }
}

fn report(state: &DoorState) -> DoorReport {
    DoorReport {
        arrived: 0,
        rotate: Some(0),
        angle: None,
        arriving: state.arriving,
        occupied: state.occupied.clone(),
        position: state.position,
    }
}
