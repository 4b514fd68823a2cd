//! Canvas abstraction and the interpolating door renderer.

mod canvas;
mod renderer;

pub use canvas::{Canvas, Color, DrawCommand, RecordingCanvas};
pub use renderer::{Animation, FrameStatus, Offsets, Renderer, RendererLayout};
