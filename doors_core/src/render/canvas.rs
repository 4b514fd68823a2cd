//! Drawing surface abstraction.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Named stroke and fill colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    Blue,
    Red,
    Green,
    Gray,
    LightGray,
    Indigo,
    IndianRed,
    Maroon,
    Orange,
}

/// A 2D surface the renderer and the plotter paint on.
///
/// Coordinates are pixels with the origin at the top left corner. Angles are
/// radians, measured clockwise from the positive x axis.
pub trait Canvas {
    /// Surface size in pixels (width, height).
    fn size(&self) -> (f64, f64);

    /// Starts a new frame.
    fn clear(&mut self);

    fn line(&mut self, from: Point2<f64>, to: Point2<f64>, color: Color);

    fn arc(&mut self, center: Point2<f64>, radius: f64, start: f64, end: f64, color: Color);

    /// Outlined triangle.
    fn triangle(&mut self, a: Point2<f64>, b: Point2<f64>, c: Point2<f64>, color: Color);

    /// Centered text.
    fn text(&mut self, at: Point2<f64>, text: &str, color: Color);

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color);
}

/// One recorded drawing primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Line {
        from: Point2<f64>,
        to: Point2<f64>,
        color: Color,
    },
    Arc {
        center: Point2<f64>,
        radius: f64,
        start: f64,
        end: f64,
        color: Color,
    },
    Triangle {
        points: [Point2<f64>; 3],
        color: Color,
    },
    Text {
        at: Point2<f64>,
        text: String,
        color: Color,
    },
    FillRect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        color: Color,
    },
}

/// A canvas that keeps the display list of the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingCanvas {
    width: f64,
    height: f64,
    commands: Vec<DrawCommand>,
    frames: u64,
}

impl RecordingCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
            frames: 0,
        }
    }

    /// Display list of the frame being drawn.
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Number of frames started since creation.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Count of primitives of the given color in the current frame.
    pub fn count_color(&self, color: Color) -> usize {
        self.commands
            .iter()
            .filter(|c| match c {
                DrawCommand::Line { color: c, .. }
                | DrawCommand::Arc { color: c, .. }
                | DrawCommand::Triangle { color: c, .. }
                | DrawCommand::Text { color: c, .. }
                | DrawCommand::FillRect { color: c, .. } => *c == color,
            })
            .count()
    }
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.commands.clear();
        self.frames += 1;
    }

    fn line(&mut self, from: Point2<f64>, to: Point2<f64>, color: Color) {
        self.commands.push(DrawCommand::Line { from, to, color });
    }

    fn arc(&mut self, center: Point2<f64>, radius: f64, start: f64, end: f64, color: Color) {
        self.commands.push(DrawCommand::Arc {
            center,
            radius,
            start,
            end,
            color,
        });
    }

    fn triangle(&mut self, a: Point2<f64>, b: Point2<f64>, c: Point2<f64>, color: Color) {
        self.commands.push(DrawCommand::Triangle {
            points: [a, b, c],
            color,
        });
    }

    fn text(&mut self, at: Point2<f64>, text: &str, color: Color) {
        self.commands.push(DrawCommand::Text {
            at,
            text: text.to_string(),
            color,
        });
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Color) {
        self.commands.push(DrawCommand::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
    }
}
