//! Interpolating door renderer.
//!
//! Door models only know discrete positions. The renderer turns a step's
//! motion into continuous movement: on each animation frame every door is
//! drawn at an offset that starts one full step behind its new position and
//! eases to zero over the step duration.
//!
//! ```text
//! offset
//!   ^
//!   |*
//!   |  *
//!   |    *
//!   |      *
//!   +--------*------> frame time
//!   start     start + duration
//! ```
//!
//! The first frame's timestamp, not the call time, marks the start of the
//! animation, so a late first frame never skips motion.

use super::canvas::{Canvas, Color};
use crate::doors::{Door, Doors, Motions, RevolvingDoor, SwingingDoor};
use crate::error::{DoorsError, Result};
use doors_env::{DoorName, DoorsContext};
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;

/// Rotation applied to every drawn angle so angle zero points down.
const ROTATION: f64 = PI / 2.0;

/// Wing colors make skipped angles visible.
const WING_COLORS: [Color; 4] = [Color::Blue, Color::Red, Color::Green, Color::Black];

/// Canvas geometry used by the renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererLayout {
    pub width: f64,
    pub height: f64,
}

impl Default for RendererLayout {
    fn default() -> Self {
        Self {
            width: 480.0,
            height: 240.0,
        }
    }
}

impl RendererLayout {
    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Door radius in pixels.
    pub fn radius(&self) -> f64 {
        self.width / 8.0
    }

    /// Pivot of the given door.
    pub fn pivot(&self, door: DoorName) -> Point2<f64> {
        let x = match door {
            DoorName::Revolver => (self.width / 4.0).floor(),
            DoorName::Swinger => (self.width / 4.0 * 3.0).floor(),
        };
        Point2::new(x, (self.height / 2.0).floor())
    }
}

/// Angular displacement of each door from its discrete position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offsets {
    pub revolver: f64,
    pub swinger: f64,
}

impl Offsets {
    pub fn get(&self, door: DoorName) -> f64 {
        match door {
            DoorName::Revolver => self.revolver,
            DoorName::Swinger => self.swinger,
        }
    }

    fn set(&mut self, door: DoorName, offset: f64) {
        match door {
            DoorName::Revolver => self.revolver = offset,
            DoorName::Swinger => self.swinger = offset,
        }
    }

    /// True when every door sits exactly on its discrete position.
    pub fn is_rest(&self) -> bool {
        self.revolver == 0.0 && self.swinger == 0.0
    }
}

/// Result of advancing an animation by one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameStatus {
    /// Painted at these offsets; another frame is needed.
    Running(Offsets),
    /// Painted at rest; the animation is complete.
    Settled,
}

/// Frame-by-frame interpolation of one step, independent of any clock.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    /// Milliseconds until the motion settles
    duration: f64,

    motions: Motions,

    /// Radians per unit of motion, per door
    step_angles: Offsets,

    /// Timestamp of the first frame
    start: Option<Duration>,
}

impl Animation {
    /// Prepares an animation. Negative or NaN durations are rejected.
    pub fn new(duration_ms: f64, motions: Motions, step_angles: Offsets) -> Result<Self> {
        if duration_ms.is_nan() || duration_ms < 0.0 {
            return Err(DoorsError::InvalidDuration(duration_ms));
        }
        Ok(Self {
            duration: duration_ms,
            motions,
            step_angles,
            start: None,
        })
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration
    }

    pub fn motions(&self) -> Motions {
        self.motions
    }

    /// Offsets at `frame_time`, anchoring the start on the first call.
    pub fn offsets_at(&mut self, frame_time: Duration) -> (Offsets, f64) {
        let start = *self.start.get_or_insert(frame_time);
        let elapsed = frame_time.saturating_sub(start).as_secs_f64() * 1000.0;
        let remaining = if self.duration > 0.0 {
            1.0 - elapsed / self.duration
        } else {
            0.0
        };
        let mut offsets = Offsets::default();
        for door in DoorName::ALL {
            let motion = self.motions.get(door);
            let offset = self.step_angles.get(door) * motion as f64 * remaining;
            let clamped = if motion > 0 {
                offset.max(0.0)
            } else if motion < 0 {
                offset.min(0.0)
            } else {
                0.0
            };
            offsets.set(door, clamped);
        }
        (offsets, elapsed)
    }

    /// Advances to `frame_time` and says whether another frame is needed.
    pub fn frame(&mut self, frame_time: Duration) -> FrameStatus {
        let (offsets, elapsed) = self.offsets_at(frame_time);
        if offsets.is_rest() && elapsed >= self.duration {
            FrameStatus::Settled
        } else {
            FrameStatus::Running(offsets)
        }
    }
}

/// Paints a revolving and a swinging door side by side on one canvas.
#[derive(Debug)]
pub struct Renderer<C: Canvas> {
    canvas: C,
    layout: RendererLayout,
    last_offsets: Offsets,
}

impl<C: Canvas> Renderer<C> {
    pub fn new(canvas: C, layout: RendererLayout) -> Self {
        Self {
            canvas,
            layout,
            last_offsets: Offsets::default(),
        }
    }

    /// Creates a renderer sized to its canvas.
    pub fn for_canvas(canvas: C) -> Self {
        let (width, height) = canvas.size();
        Self::new(canvas, RendererLayout::default().with_size(width, height))
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn layout(&self) -> &RendererLayout {
        &self.layout
    }

    pub fn into_canvas(self) -> C {
        self.canvas
    }

    /// Offsets of the most recently painted frame.
    pub fn last_offsets(&self) -> Offsets {
        self.last_offsets
    }

    /// Paints both doors at the given offsets in one cleared frame.
    pub fn draw(&mut self, doors: &Doors, offsets: Offsets) {
        self.canvas.clear();
        self.draw_revolver(&doors.revolver, offsets.revolver);
        self.draw_swinger(&doors.swinger, offsets.swinger);
        self.last_offsets = offsets;
    }

    /// Paints both doors at rest.
    pub fn draw_rest(&mut self, doors: &Doors) {
        self.draw(doors, Offsets::default());
    }

    /// Starts animating one step. A zero duration paints the rest frame
    /// immediately and returns `None`.
    pub fn animate(&mut self, doors: &Doors, duration_ms: f64, motions: Motions) -> Result<Option<Animation>> {
        let step_angles = Offsets {
            revolver: doors.revolver.step_angle(),
            swinger: doors.swinger.step_angle(),
        };
        let animation = Animation::new(duration_ms, motions, step_angles)?;
        if duration_ms == 0.0 {
            self.draw_rest(doors);
            return Ok(None);
        }
        Ok(Some(animation))
    }

    /// Paints one frame of an animation.
    pub fn paint_frame(&mut self, doors: &Doors, animation: &mut Animation, frame_time: Duration) -> FrameStatus {
        let status = animation.frame(frame_time);
        match status {
            FrameStatus::Running(offsets) => self.draw(doors, offsets),
            FrameStatus::Settled => self.draw_rest(doors),
        }
        status
    }

    /// Animates one step to completion on the context's frame clock.
    pub async fn step<X>(&mut self, ctx: &X, doors: &Doors, duration_ms: f64, motions: Motions) -> Result<()>
    where
        X: DoorsContext + ?Sized,
    {
        if let Some(mut animation) = self.animate(doors, duration_ms, motions)? {
            loop {
                let frame_time = ctx.next_frame().await;
                if self.paint_frame(doors, &mut animation, frame_time) == FrameStatus::Settled {
                    break;
                }
            }
        }
        Ok(())
    }

    fn polar(&self, door: DoorName, angle: f64, distance: f64) -> Point2<f64> {
        let reach = self.layout.radius() * distance;
        let direction = Vector2::new((angle + ROTATION).cos(), (angle + ROTATION).sin());
        self.layout.pivot(door) + direction * reach
    }

    fn radial(&mut self, door: DoorName, angle: f64, start: f64, stop: f64, color: Color) {
        let from = self.polar(door, angle, start);
        let to = self.polar(door, angle, stop);
        self.canvas.line(from, to, color);
    }

    fn person(&mut self, at: Point2<f64>) {
        let half = self.layout.radius() / 8.0;
        self.canvas.triangle(
            Point2::new(at.x, at.y - half),
            Point2::new(at.x + half, at.y + half),
            Point2::new(at.x - half, at.y + half),
            Color::Black,
        );
    }

    // Angles are negated so the revolver turns counter-clockwise in a
    // top-down view.
    fn draw_revolver(&mut self, revolver: &RevolvingDoor, offset: f64) {
        let door = DoorName::Revolver;
        let pivot = self.layout.pivot(door);
        let radius = self.layout.radius();

        // Enclosure
        self.canvas.arc(pivot, radius, -PI / 4.0 * 3.0 + ROTATION, -PI / 4.0 + ROTATION, Color::Black);
        self.canvas.arc(pivot, radius, PI / 4.0 * 3.0 + ROTATION, PI / 4.0 + ROTATION, Color::Black);

        for cell in 0..4u32 {
            let center = -revolver.angle(cell) + offset;
            self.radial(door, center + PI / 4.0, 0.0, 1.0, WING_COLORS[cell as usize]);
            let label = self.polar(door, center, 0.7);
            self.canvas.text(label, &cell.to_string(), Color::Black);
        }

        let step_angle = revolver.step_angle();
        for step in 0..revolver.granularity() {
            self.radial(door, step_angle * step as f64, 0.95, 1.0, Color::Black);
        }

        let tolerance = revolver.tolerance();
        for angle in [tolerance, -tolerance, tolerance + PI, -tolerance + PI] {
            self.radial(door, angle, 0.3, 1.0, Color::Gray);
        }

        for i in 1..=revolver.arriving() {
            let at = self.polar(door, 0.0, i as f64 / 3.0 + 1.0);
            self.person(at);
        }
        for (cell, occupied) in revolver.occupied().iter().enumerate() {
            if *occupied {
                let at = self.polar(door, -revolver.angle(cell as u32) + offset, 0.7);
                self.person(at);
            }
        }
    }

    fn draw_swinger(&mut self, swinger: &SwingingDoor, offset: f64) {
        let door = DoorName::Swinger;
        let pivot = self.layout.pivot(door);
        let radius = self.layout.radius();

        self.radial(door, -swinger.angle() + PI / 2.0 + offset, 0.0, 1.0, Color::Black);

        for step in 0..=swinger.open() {
            let angle = PI / 2.0 - PI / 2.0 * step as f64 / swinger.granularity() as f64;
            self.radial(door, angle, 0.95, 1.0, Color::Black);
        }

        let mut waiting = swinger.arriving();
        if swinger.occupied()[0] {
            // Only shown inside once the door looks open enough to enter
            if offset == 0.0 {
                let at = self.polar(door, PI / 4.0, 0.7);
                self.person(at);
            } else {
                waiting += 1;
            }
        }
        for i in 0..waiting {
            let at = Point2::new(pivot.x - radius / 2.0, pivot.y + radius * (i as f64 / 3.0 + 1.0));
            self.person(at);
        }
    }
}
