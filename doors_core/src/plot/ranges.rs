//! Time ranges between scenario changes.

use super::telemetry::{ScenarioMarker, TelemetryPoint};
use doors_env::DoorName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Control label for a door no marker has named yet.
pub const MANUAL: &str = "manual";

/// The regime one door ran under during a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub name: String,

    /// Mean arrival rate over the range, in people per minute
    pub average: f64,
}

impl Control {
    pub fn is_manual(&self) -> bool {
        self.name == MANUAL
    }
}

/// Which doors were under scripted control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimaryDoor {
    Both,
    Revolving,
    Swinging,
    Manual,
}

/// A `[start, end]` window with the controls in force.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRange {
    pub start: f64,
    pub end: f64,
    pub revolver: Control,
    pub swinger: Control,
}

impl ScenarioRange {
    fn new(start: f64, end: f64, revolver: String, swinger: String, points: &[TelemetryPoint]) -> Self {
        let mut range = Self {
            start,
            end,
            revolver: Control {
                name: revolver,
                average: 0.0,
            },
            swinger: Control {
                name: swinger,
                average: 0.0,
            },
        };
        range.measure(points);
        range
    }

    pub fn control(&self, door: DoorName) -> &Control {
        match door {
            DoorName::Revolver => &self.revolver,
            DoorName::Swinger => &self.swinger,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }

    /// The points of a time-sorted series that fall inside the range.
    pub fn points_in<'a>(&self, points: &'a [TelemetryPoint]) -> &'a [TelemetryPoint] {
        let first = points.partition_point(|p| p.time < self.start);
        let last = points.partition_point(|p| p.time <= self.end);
        &points[first..last.max(first)]
    }

    /// Recomputes the arrival averages from `points`.
    pub fn measure(&mut self, points: &[TelemetryPoint]) {
        let inside = self.points_in(points);
        for door in DoorName::ALL {
            let average = if inside.is_empty() {
                0.0
            } else {
                inside.iter().map(|p| p.arrivals.get(door)).sum::<f64>() / inside.len() as f64
            };
            match door {
                DoorName::Revolver => self.revolver.average = average,
                DoorName::Swinger => self.swinger.average = average,
            }
        }
    }

    /// Most frequent temperature difference in whole degrees. Ties go to the
    /// lowest difference.
    pub fn delta_mode(&self, points: &[TelemetryPoint]) -> Option<i64> {
        let mut frequency: BTreeMap<i64, usize> = BTreeMap::new();
        for point in self.points_in(points) {
            *frequency.entry((point.delta() / 3.0).round() as i64).or_default() += 1;
        }
        let mut best: Option<(i64, usize)> = None;
        for (delta, count) in frequency {
            if best.map_or(true, |(_, most)| count > most) {
                best = Some((delta, count));
            }
        }
        best.map(|(delta, _)| delta)
    }

    pub fn primary_door(&self) -> PrimaryDoor {
        match (self.revolver.is_manual(), self.swinger.is_manual()) {
            (false, false) => PrimaryDoor::Both,
            (false, true) => PrimaryDoor::Revolving,
            (true, false) => PrimaryDoor::Swinging,
            (true, true) => PrimaryDoor::Manual,
        }
    }
}

/// Splits the series at every marker. The first range runs from the first
/// point to the first marker, the last from the last marker to the last point.
pub fn scenario_ranges(points: &[TelemetryPoint], markers: &[ScenarioMarker]) -> Vec<ScenarioRange> {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    let mut ranges = Vec::with_capacity(markers.len() + 1);
    for i in -1..markers.len() as isize {
        let start = if i < 0 {
            first.time
        } else {
            markers[i as usize].time
        };
        let end = markers
            .get((i + 1) as usize)
            .map_or(last.time, |marker| marker.time);
        let applied = &markers[..(i + 1) as usize];
        let name = |door: DoorName| {
            applied
                .iter()
                .rev()
                .find(|marker| marker.door == door)
                .map_or_else(|| MANUAL.to_string(), |marker| marker.control.clone())
        };
        ranges.push(ScenarioRange::new(
            start,
            end,
            name(DoorName::Revolver),
            name(DoorName::Swinger),
            points,
        ));
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::telemetry::{parse_markers, parse_results};
    use approx::assert_relative_eq;

    fn series() -> Vec<TelemetryPoint> {
        parse_results(
            "0,0,0,70,71,69,68\n\
             100,6,0,70,71,76,77\n\
             200,4,0,70,70,76,76\n\
             300,0,2,70,70,70,70\n\
             400,0,4,70,70,70,71",
        )
        .unwrap()
    }

    #[test]
    fn test_ranges_follow_markers() {
        let points = series();
        let markers = parse_markers("100,revolver,rush\n300,swinger,quiet").unwrap();
        let ranges = scenario_ranges(&points, &markers);

        assert_eq!(ranges.len(), 3);
        assert_eq!((ranges[0].start, ranges[0].end), (0.0, 100.0));
        assert_eq!((ranges[2].start, ranges[2].end), (300.0, 400.0));

        assert_eq!(ranges[0].primary_door(), PrimaryDoor::Manual);
        assert_eq!(ranges[1].revolver.name, "rush");
        assert_eq!(ranges[1].swinger.name, MANUAL);
        assert_eq!(ranges[2].revolver.name, "rush", "regime persists until replaced");
        assert_eq!(ranges[2].primary_door(), PrimaryDoor::Both);
    }

    #[test]
    fn test_range_statistics() {
        let points = series();
        let markers = parse_markers("100,revolver,rush\n300,swinger,quiet").unwrap();
        let ranges = scenario_ranges(&points, &markers);

        // 100..=300 holds three points
        assert_eq!(ranges[1].points_in(&points).len(), 3);
        assert_relative_eq!(ranges[1].revolver.average, 10.0 / 3.0);
        assert_relative_eq!(ranges[2].swinger.average, 3.0);
        // deltas 6 and 6 and 0 in thirds of a degree
        assert_eq!(ranges[1].delta_mode(&points), Some(2));
    }

    #[test]
    fn test_no_points_no_ranges() {
        let markers = parse_markers("100,revolver,rush").unwrap();
        assert!(scenario_ranges(&[], &markers).is_empty());
    }
}
