//! Production implementation of DoorsContext using Tokio.

use crate::context::{DoorsContext, FRAME_INTERVAL};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Production context backed by the Tokio timer.
///
/// Time comes from the monotonic system clock; frames are paced at
/// `FRAME_INTERVAL`.
pub struct TokioContext {
    /// Start time for monotonic duration calculations
    start: Instant,

    /// Pace of `next_frame`
    frame_interval: Duration,
}

impl TokioContext {
    /// Creates a new TokioContext.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            frame_interval: FRAME_INTERVAL,
        }
    }

    /// Overrides the frame pacing (e.g. for a low-rate terminal display).
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Creates an Arc-wrapped context for sharing across tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for TokioContext {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DoorsContext for TokioContext {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn next_frame(&self) -> Duration {
        tokio::time::sleep(self.frame_interval).await;
        self.now()
    }
}
