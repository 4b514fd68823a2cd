//! Core environment context trait for the door visualizer.

use async_trait::async_trait;
use std::time::Duration;

/// Interval between animation frames (about 60 Hz).
pub const FRAME_INTERVAL: Duration = Duration::from_micros(16_667);

/// The central interface for clock and frame scheduling.
///
/// This trait abstracts the host so that the renderer, the player and the
/// monitor can run in production (tokio) and in the deterministic harness.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`
/// - **Simulation**: `SimContext` - virtual clock advanced by sleeps and frames
///
/// # Frames
///
/// `next_frame` plays the role of a host animation scheduler: it suspends
/// until the next frame and returns that frame's timestamp. Animations take
/// their start time from the first frame timestamp rather than from the
/// moment they were requested.
#[async_trait]
pub trait DoorsContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    fn now(&self) -> Duration;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Suspends until the next animation frame and returns its timestamp.
    async fn next_frame(&self) -> Duration;
}
