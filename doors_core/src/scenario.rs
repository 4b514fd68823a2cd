//! Scenario scripts: a named schedule of arrivals for one door.
//!
//! Scripts are plain text with three sections separated by blank lines:
//!
//! ```text
//! Rush hour
//!
//! Steady stream of people
//! arriving every other step.
//!
//! 1
//! 0
//! ```
//!
//! The arrivals section holds one integer per line, one line per step, and is
//! replayed cyclically.

use crate::error::{DoorsError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A parsed scenario script.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScenarioScript {
    pub title: String,
    pub description: String,

    /// People arriving per step
    pub arrivals: Vec<u32>,
}

impl ScenarioScript {
    /// Parses the three-section script format.
    pub fn parse(source: &str) -> Result<Self> {
        let mut script = Self::default();
        let mut section = 0;
        for (index, raw) in source.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                if section < 2 {
                    section += 1;
                }
                continue;
            }
            match section {
                0 => append_words(&mut script.title, line),
                1 => append_words(&mut script.description, line),
                _ => {
                    let count = line.parse::<u32>().map_err(|e| {
                        DoorsError::parse(index + 1, format!("bad arrival count '{}': {}", line, e))
                    })?;
                    script.arrivals.push(count);
                }
            }
        }
        Ok(script)
    }

    /// A script that only ever schedules `count` arrivals per step.
    pub fn constant(title: impl Into<String>, count: u32) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            arrivals: vec![count],
        }
    }

    /// Number of steps in one cycle of the script.
    pub fn cycle_len(&self) -> usize {
        self.arrivals.len().max(1)
    }

    /// Scheduled arrivals for the given step since the scenario started.
    pub fn arrivals_at(&self, step: u64) -> u32 {
        if self.arrivals.is_empty() {
            return 0;
        }
        self.arrivals[(step % self.arrivals.len() as u64) as usize]
    }
}

impl FromStr for ScenarioScript {
    type Err = DoorsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn append_words(target: &mut String, line: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_sections() {
        let script = ScenarioScript::parse(
            "Rush hour\n\nSteady stream of people\n  arriving every other step.\n\n1\n0\n2\n",
        )
        .unwrap();

        assert_eq!(script.title, "Rush hour");
        assert_eq!(script.description, "Steady stream of people arriving every other step.");
        assert_eq!(script.arrivals, vec![1, 0, 2]);
    }

    #[test]
    fn test_arrivals_are_cyclic() {
        let script: ScenarioScript = "Loop\n\n\n1\n0\n2".parse().unwrap();
        assert_eq!(script.arrivals_at(0), 1);
        assert_eq!(script.arrivals_at(2), 2);
        assert_eq!(script.arrivals_at(3), 1);
        assert_eq!(script.cycle_len(), 3);
    }

    #[test]
    fn test_empty_arrivals_schedule_nobody() {
        let script = ScenarioScript::parse("Quiet\n\nNobody comes").unwrap();
        assert!(script.arrivals.is_empty());
        assert_eq!(script.arrivals_at(7), 0);
        assert_eq!(script.cycle_len(), 1);
    }

    #[test]
    fn test_bad_arrival_reports_line() {
        let err = ScenarioScript::parse("T\n\nD\n\n1\nmany\n").unwrap_err();
        match err {
            DoorsError::Parse { line, .. } => assert_eq!(line, 6),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
