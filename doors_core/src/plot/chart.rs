//! Result chart: temperatures, arrival rates and scenario boundaries over time.

use super::ranges::ScenarioRange;
use super::telemetry::TelemetryPoint;
use crate::error::{DoorsError, Result};
use crate::render::{Canvas, Color};
use doors_env::DoorName;
use serde::{Deserialize, Serialize};

const TEMP_COLORS: [Color; 4] = [Color::Indigo, Color::Blue, Color::IndianRed, Color::Maroon];

/// Seconds between grid lines.
const GRID_SECS: f64 = 10.0 * 60.0;

/// Temperature span shown on the y axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YRange {
    pub min: f64,
    pub max: f64,
}

impl YRange {
    /// Smallest range covering every temperature in `points`.
    pub fn covering(points: &[TelemetryPoint]) -> Option<Self> {
        let mut temps = points.iter().flat_map(|p| p.temps.iter().copied());
        let first = temps.next()?;
        Some(temps.fold(Self { min: first, max: first }, |range, t| Self {
            min: range.min.min(t),
            max: range.max.max(t),
        }))
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// A chart of one telemetry series and its scenario ranges.
#[derive(Debug, Clone)]
pub struct Plot {
    width: f64,
    height: f64,
    points: Vec<TelemetryPoint>,
    ranges: Vec<ScenarioRange>,
    x_min: f64,
    x_max: f64,
    y_range: YRange,

    /// Pixels per second
    scale_x: f64,

    /// Pixels per temperature unit
    scale_y: f64,

    gutter_y: f64,
}

impl Plot {
    /// Lays out a chart. `y_range` defaults to the span of all temperatures;
    /// pass the parent's range when zooming so scales stay comparable.
    pub fn new(
        width: f64,
        height: f64,
        points: Vec<TelemetryPoint>,
        ranges: Vec<ScenarioRange>,
        y_range: Option<YRange>,
    ) -> Result<Self> {
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(DoorsError::configuration("No results data"));
        };
        let (x_min, x_max) = (first.time, last.time);
        let y_range = match y_range {
            Some(range) => range,
            None => YRange::covering(&points).ok_or_else(|| DoorsError::configuration("No temperatures"))?,
        };
        let gutter_y = (height * 0.05).floor();
        let x_span = if x_max > x_min { x_max - x_min } else { 1.0 };
        let y_span = if y_range.span() != 0.0 { y_range.span() } else { 1.0 };
        Ok(Self {
            width,
            height,
            x_min,
            x_max,
            y_range,
            scale_x: (width / x_span).min(width * 0.01),
            scale_y: (height - gutter_y * 2.0) / y_span,
            gutter_y,
            points,
            ranges,
        })
    }

    pub fn points(&self) -> &[TelemetryPoint] {
        &self.points
    }

    pub fn ranges(&self) -> &[ScenarioRange] {
        &self.ranges
    }

    pub fn y_range(&self) -> YRange {
        self.y_range
    }

    /// Pixel column of a time.
    pub fn pos_x(&self, time: f64) -> f64 {
        ((time - self.x_min) * self.scale_x).floor()
    }

    /// Pixel row of a temperature.
    pub fn pos_y(&self, temp: f64) -> f64 {
        self.height - ((temp - self.y_range.min) * self.scale_y + self.gutter_y).floor()
    }

    /// The data point under a pixel column.
    pub fn point(&self, x: f64) -> &TelemetryPoint {
        let last = self.points.len() - 1;
        let index = (x / self.width * self.points.len() as f64).floor();
        let index = if index.is_nan() || index < 0.0 {
            0
        } else {
            (index as usize).min(last)
        };
        &self.points[index]
    }

    /// The scenario range under a pixel column.
    pub fn range_at(&self, x: f64) -> Option<&ScenarioRange> {
        let time = self.point(x).time;
        self.ranges.iter().find(|range| range.contains(time))
    }

    /// A chart of the points and ranges within `[min, max]`, keeping this
    /// chart's temperature scale.
    pub fn slice(&self, min: f64, max: f64) -> Result<Plot> {
        let points: Vec<TelemetryPoint> = self
            .points
            .iter()
            .filter(|p| p.time >= min && p.time <= max)
            .cloned()
            .collect();
        let ranges = self
            .ranges
            .iter()
            .filter(|r| r.end >= min && r.start <= max)
            .map(|r| {
                let mut clipped = r.clone();
                clipped.start = r.start.max(min);
                clipped.end = r.end.min(max);
                clipped.measure(&points);
                clipped
            })
            .collect();
        Plot::new(self.width, self.height, points, ranges, Some(self.y_range))
    }

    /// Redraws the whole chart, optionally highlighting one range.
    pub fn draw<C: Canvas>(&self, canvas: &mut C, highlight: Option<&ScenarioRange>) {
        canvas.clear();

        // Grid lines every ten minutes, dark every hour
        let mut grid = self.x_min + GRID_SECS;
        while grid < self.x_max {
            let hour = ((grid - self.x_min) % (GRID_SECS * 6.0)).abs() < f64::EPSILON;
            let color = if hour { Color::Black } else { Color::LightGray };
            canvas.fill_rect(self.pos_x(grid), 0.0, 1.0, self.scale_y, color);
            grid += GRID_SECS;
        }

        for range in &self.ranges {
            canvas.fill_rect(self.pos_x(range.end), 0.0, 1.0, self.height, Color::Gray);
        }

        let x_size = self.scale_x.max(1.0).ceil();
        let mid_y = (self.height / 2.0).floor();
        let mut prior_x = None;
        let mut range_index = 0;
        for point in &self.points {
            let x = self.pos_x(point.time);
            if prior_x == Some(x) {
                continue;
            }
            prior_x = Some(x);

            // Arrivals: revolver up, swinger down
            for (door, direction) in [(DoorName::Revolver, 1.0), (DoorName::Swinger, -1.0)] {
                let offset = (point.arrivals.get(door) * self.scale_y / 2.0).floor() * direction;
                canvas.fill_rect(x - x_size, mid_y + direction, x_size, offset, Color::LightGray);
            }

            if let Some(range) = self.ranges.get(range_index) {
                if range.end < point.time {
                    range_index += 1;
                    self.label_range(canvas, range, mid_y);
                }
            }

            for (j, temp) in point.temps.iter().enumerate() {
                self.plot_temp(canvas, x, x_size, *temp, TEMP_COLORS[j % TEMP_COLORS.len()], false);
            }
            let middle = self.y_range.min + self.y_range.span() / 2.0;
            self.plot_temp(canvas, x, x_size, middle + point.delta(), Color::Black, true);
        }

        if let Some(range) = highlight {
            let x = self.pos_x(range.start);
            let width = self.pos_x(range.end) - x;
            canvas.fill_rect(x, self.height - self.scale_y, width, self.scale_y, Color::Orange);
        }
    }

    fn label_range<C: Canvas>(&self, canvas: &mut C, range: &ScenarioRange, mid_y: f64) {
        let length = (range.duration() * self.scale_x).floor();
        for (door, direction, label) in [
            (DoorName::Swinger, -1.0, "Swinging"),
            (DoorName::Revolver, 1.0, "Revolving"),
        ] {
            let offset = (range.control(door).average * self.scale_y / 2.0).floor() * direction;
            if length > 1.0 && offset.abs() > 1.0 {
                let at = nalgebra::Point2::new(self.pos_x(range.start), mid_y + offset);
                canvas.text(at, label, Color::Black);
            }
        }
    }

    // The gap between the two marks shows the reading's precision
    fn plot_temp<C: Canvas>(&self, canvas: &mut C, x: f64, x_size: f64, temp: f64, color: Color, fill: bool) {
        let y = self.pos_y(temp);
        let y_min = (y - self.scale_y / 2.0).floor();
        let y_max = (y + self.scale_y / 2.0).floor();
        if fill {
            canvas.fill_rect(x - x_size, y_min, x_size, self.scale_y, color);
        } else {
            canvas.fill_rect(x - x_size, y_min, x_size, 1.0, color);
            canvas.fill_rect(x - x_size, y_max, x_size, 1.0, color);
        }
    }
}

/// Formats seconds as `h:mm`.
pub fn time_text(seconds: f64) -> String {
    if seconds.is_nan() {
        return String::new();
    }
    let total = seconds.round() as i64;
    let hours = total / 3600;
    let minutes = (total - hours * 3600) / 60;
    format!("{}:{:02}", hours, minutes)
}
