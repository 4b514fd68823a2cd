//! Door Visualizer Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seams that let the door visualizer run
//! against a real clock and a real step server (tokio) or inside the
//! deterministic simulation harness (`doors_sim`).
//!
//! # Core Concept
//!
//! Every source of timing and every remote call goes through a trait:
//! - Time and animation frames (`now()`, `sleep()`, `next_frame()`)
//! - The authoritative step source (`start()`, `arrive()`, `next_step()`)
//!
//! Swapping the implementation swaps the world; the synchronizer and the
//! renderer never notice.
//!
//! # Example
//!
//! ```ignore
//! use doors_env::{DoorsContext, StepTransport};
//!
//! async fn poll<Ctx: DoorsContext, Net: StepTransport>(ctx: &Ctx, net: &Net) {
//!     let command = net.next_step().await?;
//!     let frame_time = ctx.next_frame().await;
//!     // ...
//! }
//! ```

mod context;
mod error;
mod tokio_impl;
mod transport;
mod types;

pub use context::{DoorsContext, FRAME_INTERVAL};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
pub use transport::StepTransport;
pub use types::{ControlParams, DoorName, DoorReport, DoorState, StepCommand};
