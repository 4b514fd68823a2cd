//! Telemetry text: raw log rows, per-interval summaries and parsed points.
//!
//! Raw rows are `[time, revolver_arrived, swinger_arrived, temp...]` with one
//! row per step. Summaries have the same shape but carry arrival rates in
//! people per minute and temperatures averaged over the interval.

use crate::error::{DoorsError, Result};
use doors_env::DoorName;
use serde::{Deserialize, Serialize};

/// One raw or summarized telemetry row.
pub type TelemetryRow = Vec<f64>;

/// A field of a comma separated record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Field {
    Number(f64),
    Label(String),
}

impl Field {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Field::Number(n) => Some(*n),
            Field::Label(_) => None,
        }
    }
}

/// A non-blank line of comma separated fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 1-based line number in the source text
    pub line: usize,
    pub fields: Vec<Field>,
}

/// Finds the first `-?\d+(\.\d+)?` in a field.
fn leading_number(field: &str) -> Option<&str> {
    let bytes = field.as_bytes();
    let first = bytes.iter().position(|b| b.is_ascii_digit())?;
    let start = if first > 0 && bytes[first - 1] == b'-' {
        first - 1
    } else {
        first
    };
    let mut end = first;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end + 1 < bytes.len() && bytes[end] == b'.' && bytes[end + 1].is_ascii_digit() {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    Some(&field[start..end])
}

/// Splits text into records, probing each field for a number.
pub fn parse_fields(text: &str) -> Vec<Record> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| Record {
            line: index + 1,
            fields: line
                .split(',')
                .map(|raw| {
                    let field = raw.trim();
                    match leading_number(field).and_then(|n| n.parse::<f64>().ok()) {
                        Some(number) => Field::Number(number),
                        None => Field::Label(field.to_string()),
                    }
                })
                .collect(),
        })
        .collect()
}

/// Arrival rates per door.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Arrivals {
    pub revolver: f64,
    pub swinger: f64,
}

impl Arrivals {
    pub fn get(&self, door: DoorName) -> f64 {
        match door {
            DoorName::Revolver => self.revolver,
            DoorName::Swinger => self.swinger,
        }
    }
}

/// One summarized telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    /// Seconds since the server started
    pub time: f64,

    /// People per minute
    pub arrivals: Arrivals,

    /// Temperatures in thirds of a degree: two outdoor, then two indoor
    pub temps: Vec<f64>,
}

impl TelemetryPoint {
    /// Average indoor minus average outdoor temperature. Missing readings
    /// count as zero.
    pub fn delta(&self) -> f64 {
        let temp = |i: usize| self.temps.get(i).copied().unwrap_or(0.0);
        (temp(2) + temp(3) - temp(0) - temp(1)) / 2.0
    }
}

fn numbers(record: &Record) -> Result<Vec<f64>> {
    record
        .fields
        .iter()
        .map(|field| match field {
            Field::Number(n) => Ok(*n),
            Field::Label(label) => Err(DoorsError::parse(record.line, format!("expected a number, got '{}'", label))),
        })
        .collect()
}

/// Parses `time, revolver ppm, swinger ppm, temp0..tempN` records.
pub fn parse_results(text: &str) -> Result<Vec<TelemetryPoint>> {
    parse_fields(text)
        .iter()
        .map(|record| {
            let row = numbers(record)?;
            if row.len() < 7 {
                return Err(DoorsError::parse(
                    record.line,
                    format!("need time, two arrival rates and four temperatures, got {} fields", row.len()),
                ));
            }
            Ok(TelemetryPoint {
                time: row[0],
                arrivals: Arrivals {
                    revolver: row[1],
                    swinger: row[2],
                },
                temps: row[3..].to_vec(),
            })
        })
        .collect()
}

/// A scenario change recorded by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioMarker {
    pub time: f64,
    pub door: DoorName,

    /// Name of the regime that took over
    pub control: String,
}

/// Parses `time, door, control` records; times must strictly increase.
pub fn parse_markers(text: &str) -> Result<Vec<ScenarioMarker>> {
    let mut markers: Vec<ScenarioMarker> = Vec::new();
    for record in parse_fields(text) {
        let [time, door, control] = record.fields.as_slice() else {
            return Err(DoorsError::parse(record.line, "expected time, door and control"));
        };
        let time = time
            .as_number()
            .ok_or_else(|| DoorsError::parse(record.line, "marker time is not a number"))?;
        let door = match door {
            Field::Label(name) => name.parse::<DoorName>().map_err(|e| DoorsError::parse(record.line, e))?,
            Field::Number(n) => return Err(DoorsError::parse(record.line, format!("bad door {}", n))),
        };
        let control = match control {
            Field::Label(name) => name.clone(),
            Field::Number(n) => n.to_string(),
        };
        if let Some(last) = markers.last() {
            if time <= last.time {
                return Err(DoorsError::parse(
                    record.line,
                    format!("marker at {} does not follow {}", time, last.time),
                ));
            }
        }
        markers.push(ScenarioMarker { time, door, control });
    }
    Ok(markers)
}

/// Summarizes raw rows into one row per `secs_per_row` interval.
///
/// A row is emitted each time a record passes the interval edge. Arrival sums
/// become people per minute; temperatures are averaged over the records in
/// the interval.
pub fn summarize(log: &[TelemetryRow], secs_per_row: f64) -> Vec<TelemetryRow> {
    let mut summary = Vec::new();
    let mut edge = secs_per_row;
    let mut count = 0usize;
    let mut sums: Vec<f64> = Vec::new();
    for row in log {
        let Some((&time, values)) = row.split_first() else {
            continue;
        };
        count += 1;
        if sums.len() < values.len() {
            sums.resize(values.len(), 0.0);
        }
        for (sum, value) in sums.iter_mut().zip(values) {
            *sum += value;
        }
        if time > edge {
            let mut out = Vec::with_capacity(sums.len() + 1);
            out.push(time);
            for (i, sum) in sums.iter().enumerate() {
                if i < 2 {
                    out.push(60.0 / secs_per_row * sum);
                } else {
                    out.push(sum / count as f64);
                }
            }
            summary.push(out);
            edge += secs_per_row;
            count = 0;
            sums.iter_mut().for_each(|s| *s = 0.0);
        }
    }
    summary
}

/// Formats rows as comma separated lines. Values never need escaping.
pub fn to_csv(rows: &[TelemetryRow]) -> String {
    rows.iter()
        .map(|row| row.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses comma separated numeric rows.
pub fn from_csv(text: &str) -> Result<Vec<TelemetryRow>> {
    parse_fields(text).iter().map(numbers).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_leading_number() {
        assert_eq!(leading_number("600"), Some("600"));
        assert_eq!(leading_number("-3.25"), Some("-3.25"));
        assert_eq!(leading_number("12."), Some("12"));
        assert_eq!(leading_number("revolver"), None);
    }

    #[test]
    fn test_parse_fields_skips_blank_lines() {
        let records = parse_fields("1,rush\n\n  \n2.5,quiet\n");
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].line, 4);
        assert_eq!(records[0].fields[1], Field::Label("rush".to_string()));
        assert_eq!(records[1].fields[0], Field::Number(2.5));
    }

    #[test]
    fn test_delta_with_missing_temps() {
        let point = TelemetryPoint {
            time: 0.0,
            arrivals: Arrivals::default(),
            temps: vec![3.0, 5.0],
        };
        assert_relative_eq!(point.delta(), -4.0);

        let empty = TelemetryPoint { temps: Vec::new(), ..point };
        assert_relative_eq!(empty.delta(), 0.0);
    }

    #[test]
    fn test_parse_results_and_delta() {
        let points = parse_results("0,2,3,70,71,69,68\n600,2,3,71,71,70,69").unwrap();

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].arrivals.swinger, 3.0);
        assert_relative_eq!(points[0].delta(), -2.0);
        assert_relative_eq!(points[1].delta(), -1.5);
        assert_eq!(points[1].time, 600.0);
    }

    #[test]
    fn test_parse_results_needs_four_temps() {
        let err = parse_results("0,2,3,70,71,69").unwrap_err();
        assert!(matches!(err, DoorsError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_parse_markers() {
        let markers = parse_markers("12.5,revolver,rush\n40,swinger,quiet\n").unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].door, DoorName::Revolver);
        assert_eq!(markers[1].control, "quiet");

        assert!(parse_markers("40,swinger,quiet\n12.5,revolver,rush").is_err());
        assert!(parse_markers("1,sliding,rush").is_err());
    }

    #[test]
    fn test_summarize_rates_and_averages() {
        let log = vec![
            vec![5.0, 1.0, 0.0, 30.0, 33.0, 90.0, 96.0],
            vec![10.0, 0.0, 1.0, 30.0, 33.0, 90.0, 96.0],
            vec![16.0, 1.0, 1.0, 33.0, 36.0, 93.0, 99.0],
            vec![20.0, 0.0, 0.0, 30.0, 33.0, 90.0, 96.0],
        ];
        let summary = summarize(&log, 15.0);

        assert_eq!(summary.len(), 1);
        let row = &summary[0];
        assert_eq!(row[0], 16.0);
        assert_relative_eq!(row[1], 8.0);
        assert_relative_eq!(row[2], 8.0);
        assert_relative_eq!(row[3], 31.0);
        assert_relative_eq!(row[6], 97.0);
    }

    #[test]
    fn test_csv_round_trip() {
        let rows = vec![vec![0.625, 1.0, 0.0, 30.0], vec![1.25, 0.0, 2.0, 33.0]];
        let text = to_csv(&rows);
        assert_eq!(text, "0.625,1,0,30\n1.25,0,2,33");
        assert_eq!(from_csv(&text).unwrap(), rows);
    }
}
