//! Simulation context implementing DoorsContext for deterministic testing.

use async_trait::async_trait;
use doors_env::DoorsContext;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Frame pacing of the virtual clock.
pub const SIM_FRAME: Duration = Duration::from_millis(16);

/// Simulation context backed by deterministic time and RNG.
///
/// This implements `DoorsContext` using:
/// - A virtual clock that only moves when someone sleeps or waits for a frame
/// - A seeded ChaCha8 RNG for fault injection
///
/// Every wait yields to the scheduler so that other tasks on the same
/// current-thread runtime get to observe the new time.
pub struct SimContext {
    /// Master seed for this simulation
    seed: u64,

    /// Current virtual time (nanoseconds since simulation start)
    virtual_time_ns: Arc<Mutex<u64>>,

    /// Deterministic RNG shared by all clones
    rng: Arc<Mutex<ChaCha8Rng>>,

    /// Frames served so far
    frames: Arc<Mutex<u64>>,
}

impl SimContext {
    /// Creates a new SimContext with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            virtual_time_ns: Arc::new(Mutex::new(0)),
            rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))),
            frames: Arc::new(Mutex::new(0)),
        }
    }

    /// Creates an Arc-wrapped context for sharing.
    pub fn shared(seed: u64) -> Arc<Self> {
        Arc::new(Self::new(seed))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Advances virtual time by the given duration.
    pub fn advance_time(&self, duration: Duration) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time += duration.as_nanos() as u64;
    }

    /// Sets the virtual time to a specific value.
    pub fn set_time(&self, time_ns: u64) {
        let mut time = self.virtual_time_ns.lock().unwrap();
        *time = time_ns;
    }

    /// Returns the current virtual time in nanoseconds.
    pub fn time_ns(&self) -> u64 {
        *self.virtual_time_ns.lock().unwrap()
    }

    /// Returns the current virtual time in seconds.
    pub fn time_secs(&self) -> f64 {
        self.time_ns() as f64 / 1e9
    }

    /// Number of animation frames served.
    pub fn frames(&self) -> u64 {
        *self.frames.lock().unwrap()
    }

    /// Runs `f` with the shared RNG.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> R) -> R {
        let mut rng = self.rng.lock().unwrap();
        f(&mut rng)
    }
}

impl Clone for SimContext {
    fn clone(&self) -> Self {
        Self {
            seed: self.seed,
            virtual_time_ns: Arc::clone(&self.virtual_time_ns),
            rng: Arc::clone(&self.rng),
            frames: Arc::clone(&self.frames),
        }
    }
}

#[async_trait]
impl DoorsContext for SimContext {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.time_ns())
    }

    async fn sleep(&self, duration: Duration) {
        // Sleeping is instantaneous in virtual time
        self.advance_time(duration);
        tokio::task::yield_now().await;
    }

    async fn next_frame(&self) -> Duration {
        // A frame dropped while pending must not move the clock
        tokio::task::yield_now().await;
        self.advance_time(SIM_FRAME);
        *self.frames.lock().unwrap() += 1;
        self.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_sim_context_time() {
        let ctx = SimContext::new(42);
        assert_eq!(ctx.now(), Duration::ZERO);

        ctx.advance_time(Duration::from_secs(1));
        assert_eq!(ctx.now(), Duration::from_secs(1));

        ctx.advance_time(Duration::from_millis(500));
        assert_eq!(ctx.now(), Duration::from_millis(1500));

        ctx.set_time(250_000_000);
        assert_eq!(ctx.time_secs(), 0.25);
    }

    #[tokio::test]
    async fn test_frames_advance_virtual_time() {
        let ctx = SimContext::new(1);
        let first = ctx.next_frame().await;
        let second = ctx.next_frame().await;

        assert_eq!(first, SIM_FRAME);
        assert_eq!(second - first, SIM_FRAME);
        assert_eq!(ctx.frames(), 2);

        ctx.sleep(Duration::from_millis(100)).await;
        assert_eq!(ctx.now(), Duration::from_millis(132));
    }

    #[tokio::test]
    async fn test_cancelled_frame_keeps_clock() {
        let ctx = SimContext::new(3);
        tokio::select! {
            biased;
            _ = ctx.next_frame() => panic!("frame resolved before yielding"),
            _ = std::future::ready(()) => {}
        }

        assert_eq!(ctx.now(), Duration::ZERO);
        assert_eq!(ctx.frames(), 0);
        assert_eq!(ctx.next_frame().await, SIM_FRAME);
    }

    #[test]
    fn test_sim_context_deterministic_rng() {
        let a = SimContext::new(42);
        let b = SimContext::new(42);

        let draws_a: Vec<u32> = (0..4).map(|_| a.with_rng(|rng| rng.gen())).collect();
        let draws_b: Vec<u32> = (0..4).map(|_| b.with_rng(|rng| rng.gen())).collect();
        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_sim_context_clone_shares_time() {
        let ctx1 = SimContext::new(42);
        let ctx2 = ctx1.clone();

        ctx1.advance_time(Duration::from_secs(5));

        assert_eq!(ctx1.now(), ctx2.now());
        assert_eq!(ctx2.seed(), 42);
    }
}
