//! Abstract door models.
//!
//! Doors move in discrete steps depending on whether someone is in them or
//! waiting to use them. The same models run on the authoritative step server
//! and in the monitor's local shadow, so every computation here must be
//! deterministic down to the last bit of every angle.

use crate::error::{DoorsError, Result};
use doors_env::{DoorName, DoorState};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Signed magnitude of motion for one discrete tick.
pub type Motion = i32;

/// Checks that two angles in radians are within tolerance of each other,
/// wrapping around the full circle.
pub fn close_to(a: f64, b: f64, tolerance: f64) -> bool {
    let full = PI * 2.0;
    let max = (b + tolerance) % full;
    let min = (b + full - tolerance) % full;
    if max < min {
        a > min || a < max
    } else {
        a > min && a < max
    }
}

/// Capabilities shared by every door variant.
pub trait Door: Send {
    /// Which door this is.
    fn kind(&self) -> DoorName;

    /// Number of discrete positions the door moves through.
    fn granularity(&self) -> u32;

    /// People waiting to enter.
    fn arriving(&self) -> u32;

    /// Adds people to the waiting queue.
    fn add_arrivals(&mut self, count: u32);

    /// Occupancy per cell.
    fn occupied(&self) -> &[bool];

    /// Current discrete position.
    fn position(&self) -> u32;

    /// Radians covered by one unit of motion.
    fn step_angle(&self) -> f64;

    /// Advances the door one tick and returns the motion.
    fn step(&mut self) -> Motion;

    /// Exports the mutable state.
    fn snapshot(&self) -> DoorState {
        DoorState {
            arriving: self.arriving(),
            occupied: self.occupied().to_vec(),
            position: self.position(),
        }
    }

    /// Replaces the mutable state wholesale.
    fn absorb(&mut self, state: &DoorState) -> Result<()>;
}

fn check_state(door: DoorName, state: &DoorState, cells: usize, max_position: u32) -> Result<()> {
    if state.occupied.len() != cells {
        return Err(DoorsError::InvalidState {
            door,
            message: format!("expected {} cells, got {}", cells, state.occupied.len()),
        });
    }
    if state.position > max_position {
        return Err(DoorsError::InvalidState {
            door,
            message: format!("position {} beyond {}", state.position, max_position),
        });
    }
    Ok(())
}

// =============================================================================
// REVOLVING DOOR
// =============================================================================

/// A four-wing revolving door.
#[derive(Debug, Clone, PartialEq)]
pub struct RevolvingDoor {
    /// Steps per full rotation (multiple of 8)
    granularity: u32,

    /// Angle a person needs to enter, in radians
    tolerance: f64,

    arriving: u32,
    position: u32,
    occupied: [bool; 4],
}

impl RevolvingDoor {
    /// Creates a revolving door that takes `granularity` steps to rotate a
    /// complete circle. `tolerance_steps` is the angle a person requires to
    /// enter the door, in half steps.
    pub fn new(granularity: u32, tolerance_steps: u32) -> Result<Self> {
        if granularity == 0 || granularity % 8 != 0 {
            return Err(DoorsError::configuration(format!(
                "granularity must be a positive multiple of 8, not {}",
                granularity
            )));
        }
        if tolerance_steps == 0 || tolerance_steps > granularity / 4 {
            return Err(DoorsError::configuration(format!(
                "tolerance must be within 1..={}, not {}",
                granularity / 4,
                tolerance_steps
            )));
        }
        Ok(Self {
            granularity,
            tolerance: PI / granularity as f64 * tolerance_steps as f64,
            arriving: 0,
            position: 0,
            occupied: [false; 4],
        })
    }

    /// Entry tolerance in radians.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The angle that bisects the given quadrant in the current position.
    pub fn angle(&self, quadrant: u32) -> f64 {
        let index = (self.position + quadrant * self.granularity / 4) % self.granularity;
        PI * 2.0 / self.granularity as f64 * index as f64
    }
}

impl Door for RevolvingDoor {
    fn kind(&self) -> DoorName {
        DoorName::Revolver
    }

    fn granularity(&self) -> u32 {
        self.granularity
    }

    fn arriving(&self) -> u32 {
        self.arriving
    }

    fn add_arrivals(&mut self, count: u32) {
        self.arriving = self.arriving.saturating_add(count);
    }

    fn occupied(&self) -> &[bool] {
        &self.occupied
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn step_angle(&self) -> f64 {
        PI * 2.0 / self.granularity as f64
    }

    /// Rotates one step if anyone is inside, letting occupants out at the far
    /// side and newcomers in at the near side. Returns 1 or 0.
    fn step(&mut self) -> Motion {
        let exit_tolerance = PI / self.granularity as f64;
        let mut steps = 0;
        for cell in 0..4 {
            let angle = self.angle(cell);
            let cell = cell as usize;
            if self.occupied[cell] {
                if close_to(angle, PI, exit_tolerance) {
                    self.occupied[cell] = false;
                } else {
                    steps = 1;
                }
            } else if self.arriving > 0 && close_to(angle, 0.0, self.tolerance) {
                self.occupied[cell] = true;
                self.arriving -= 1;
            }
        }
        self.position = (self.position + steps) % self.granularity;
        steps as Motion
    }

    fn absorb(&mut self, state: &DoorState) -> Result<()> {
        check_state(DoorName::Revolver, state, 4, self.granularity - 1)?;
        self.arriving = state.arriving;
        self.position = state.position;
        self.occupied.copy_from_slice(&state.occupied);
        Ok(())
    }
}

// =============================================================================
// SWINGING DOOR
// =============================================================================

/// A single-leaf swinging door.
#[derive(Debug, Clone, PartialEq)]
pub struct SwingingDoor {
    /// Closing steps per quarter circle
    granularity: u32,

    /// How far the door opens to let a person in, in steps
    open: u32,

    arriving: u32,
    position: u32,
    occupied: [bool; 1],
}

impl SwingingDoor {
    /// Creates a swinging door. The door opens quicker than it closes: it
    /// moves up to four steps at a time on the opening cycle.
    pub fn new(granularity: u32, open_to: u32) -> Result<Self> {
        if granularity == 0 {
            return Err(DoorsError::configuration("granularity must be positive"));
        }
        if open_to == 0 || open_to > granularity {
            return Err(DoorsError::configuration(format!(
                "open must be within 1..={}, not {}",
                granularity, open_to
            )));
        }
        Ok(Self {
            granularity,
            open: open_to,
            arriving: 0,
            position: 0,
            occupied: [false],
        })
    }

    /// Open position in steps.
    pub fn open(&self) -> u32 {
        self.open
    }

    /// The door's openness in radians.
    pub fn angle(&self) -> f64 {
        PI / 2.0 / self.granularity as f64 * self.position as f64
    }
}

impl Door for SwingingDoor {
    fn kind(&self) -> DoorName {
        DoorName::Swinger
    }

    fn granularity(&self) -> u32 {
        self.granularity
    }

    fn arriving(&self) -> u32 {
        self.arriving
    }

    fn add_arrivals(&mut self, count: u32) {
        self.arriving = self.arriving.saturating_add(count);
    }

    fn occupied(&self) -> &[bool] {
        &self.occupied
    }

    fn position(&self) -> u32 {
        self.position
    }

    fn step_angle(&self) -> f64 {
        PI / 2.0 / self.granularity as f64
    }

    fn step(&mut self) -> Motion {
        self.occupied[0] = false;
        let position = self.position as Motion;
        let steps = if self.arriving > 0 {
            (position + 4).min(self.open as Motion) - position
        } else if position > 0 {
            -1
        } else {
            0
        };
        self.position = (position + steps) as u32;
        if self.position == self.open {
            self.arriving = self.arriving.saturating_sub(1);
            self.occupied[0] = true;
        }
        steps
    }

    fn absorb(&mut self, state: &DoorState) -> Result<()> {
        check_state(DoorName::Swinger, state, 1, self.granularity)?;
        self.arriving = state.arriving;
        self.position = state.position;
        self.occupied.copy_from_slice(&state.occupied);
        Ok(())
    }
}

// =============================================================================
// DOOR PAIR
// =============================================================================

/// Per-door motions of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Motions {
    pub revolver: Motion,
    pub swinger: Motion,
}

impl Motions {
    pub fn get(&self, door: DoorName) -> Motion {
        match door {
            DoorName::Revolver => self.revolver,
            DoorName::Swinger => self.swinger,
        }
    }

    pub fn set(&mut self, door: DoorName, motion: Motion) {
        match door {
            DoorName::Revolver => self.revolver = motion,
            DoorName::Swinger => self.swinger = motion,
        }
    }

    /// True when neither door moved.
    pub fn is_rest(&self) -> bool {
        self.revolver == 0 && self.swinger == 0
    }
}

/// Geometry of the door pair, loadable from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DoorGeometry {
    pub revolver_granularity: u32,
    pub revolver_tolerance: u32,
    pub swinger_granularity: u32,
    pub swinger_open: u32,
}

impl Default for DoorGeometry {
    fn default() -> Self {
        Self {
            revolver_granularity: 16,
            revolver_tolerance: 3,
            swinger_granularity: 8,
            swinger_open: 7,
        }
    }
}

impl DoorGeometry {
    /// Builds a fresh door pair at rest.
    pub fn build(&self) -> Result<Doors> {
        Ok(Doors {
            revolver: RevolvingDoor::new(self.revolver_granularity, self.revolver_tolerance)?,
            swinger: SwingingDoor::new(self.swinger_granularity, self.swinger_open)?,
        })
    }
}

/// One revolving and one swinging door sharing a canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Doors {
    pub revolver: RevolvingDoor,
    pub swinger: SwingingDoor,
}

impl Doors {
    pub fn new(revolver: RevolvingDoor, swinger: SwingingDoor) -> Self {
        Self { revolver, swinger }
    }

    pub fn door(&self, name: DoorName) -> &dyn Door {
        match name {
            DoorName::Revolver => &self.revolver,
            DoorName::Swinger => &self.swinger,
        }
    }

    pub fn door_mut(&mut self, name: DoorName) -> &mut dyn Door {
        match name {
            DoorName::Revolver => &mut self.revolver,
            DoorName::Swinger => &mut self.swinger,
        }
    }

    /// Steps both doors, revolver first.
    pub fn step_all(&mut self) -> Motions {
        let mut motions = Motions::default();
        for name in DoorName::ALL {
            motions.set(name, self.door_mut(name).step());
        }
        motions
    }
}

impl Default for Doors {
    fn default() -> Self {
        Self {
            revolver: RevolvingDoor {
                granularity: 16,
                tolerance: PI / 16.0 * 3.0,
                arriving: 0,
                position: 0,
                occupied: [false; 4],
            },
            swinger: SwingingDoor {
                granularity: 8,
                open: 7,
                arriving: 0,
                position: 0,
                occupied: [false],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_close_to() {
        assert!(close_to(0.0, 0.0, PI / 16.0), "zero is close to itself");
        assert!(close_to(1.0, 1.0, PI / 16.0), "one is close to itself");
        assert!(!close_to(1.0, 0.0, PI / 16.0), "one is not close to zero");
        assert!(close_to(PI / 32.0, 0.0, PI / 16.0), "half of tolerance is still close");
        assert!(close_to(PI * 2.0 - PI / 32.0, 0.0, PI / 16.0), "almost a full circle is almost zero");
    }

    #[test]
    fn test_revolver_rejects_bad_geometry() {
        assert!(RevolvingDoor::new(12, 1).is_err());
        assert!(RevolvingDoor::new(0, 1).is_err());
        assert!(RevolvingDoor::new(16, 0).is_err());
        assert!(RevolvingDoor::new(16, 5).is_err());
        assert!(SwingingDoor::new(8, 9).is_err());
        assert!(SwingingDoor::new(8, 0).is_err());
    }

    #[test]
    fn test_arrivals_saturate() {
        let mut revolver = RevolvingDoor::new(16, 1).unwrap();
        revolver.add_arrivals(u32::MAX);
        revolver.add_arrivals(u32::MAX);
        assert_eq!(revolver.arriving(), u32::MAX);

        let mut swinger = SwingingDoor::new(8, 1).unwrap();
        swinger.add_arrivals(u32::MAX - 1);
        swinger.add_arrivals(2);
        assert_eq!(swinger.arriving(), u32::MAX);
    }

    #[test]
    fn test_revolver_one_person() {
        let mut revolver = RevolvingDoor::new(16, 1).unwrap();
        assert_eq!(revolver.angle(0), 0.0, "quadrant zero starts at angle zero");
        assert_eq!(revolver.angle(1), PI / 2.0, "quadrant one starts at quarter circle");
        assert_eq!(revolver.step(), 0, "zero steps when no one waiting");

        revolver.add_arrivals(1);
        assert_eq!(revolver.step(), 0, "no motion when entering the door");
        assert_eq!(revolver.arriving(), 0);
        assert!(revolver.occupied()[0], "person occupied cell zero");

        for _ in 0..4 {
            assert_eq!(revolver.step(), 1, "moves when occupied");
        }
        assert_eq!(revolver.angle(0), PI / 2.0);
        assert_eq!(revolver.angle(3), 0.0, "last section is now at angle zero");

        for _ in 0..4 {
            revolver.step();
        }
        assert_eq!(revolver.angle(0), PI, "half rotation for one person");
        assert!(revolver.occupied()[0]);

        assert_eq!(revolver.step(), 0);
        assert!(!revolver.occupied()[0], "occupant left");
        assert_eq!(revolver.angle(0), PI, "door did not move for occupant exit");
    }

    #[test]
    fn test_revolver_two_people() {
        let mut revolver = RevolvingDoor::new(16, 1).unwrap();
        revolver.absorb(&DoorState {
            arriving: 2,
            occupied: vec![false; 4],
            position: 8,
        }).unwrap();

        revolver.step(); // first person enters
        for _ in 0..8 {
            revolver.step();
        }
        assert_eq!(revolver.arriving(), 0, "all people entered door");
        assert!(revolver.occupied()[2] && revolver.occupied()[1]);
        assert_eq!(revolver.position(), 0, "position wraps after a full turn");
        assert_eq!(revolver.angle(0), 0.0);

        for _ in 0..4 {
            revolver.step();
        }
        assert!(!revolver.occupied()[2], "first occupant exited");
        assert!(revolver.occupied()[1]);
        revolver.step();
        assert!(!revolver.occupied()[1], "three quarter rotation moves two people through");
    }

    #[test]
    fn test_revolver_tolerance_admits_late_arrival() {
        let mut revolver = RevolvingDoor::new(16, 3).unwrap();
        revolver.add_arrivals(1);
        for _ in 0..6 {
            revolver.step();
        }
        revolver.add_arrivals(1);
        revolver.step();
        assert_eq!(revolver.arriving(), 0, "higher tolerance allows person in later");

        for _ in 0..8 {
            revolver.step();
        }
        assert!(revolver.occupied().iter().all(|o| !o), "everyone left");
        assert_eq!(revolver.angle(3), PI, "door stopped in correct position");
    }

    #[test]
    fn test_swinger_cycle() {
        let mut swinger = SwingingDoor::new(8, 7).unwrap();
        let step_size = PI / 2.0 / 8.0;

        assert_eq!(swinger.angle(), 0.0);
        assert_eq!(swinger.step(), 0, "zero steps when no one waiting");

        swinger.add_arrivals(2);
        assert_eq!(swinger.step(), 4, "four steps to start opening");
        assert_eq!(swinger.angle(), step_size * 4.0);
        assert_eq!(swinger.step(), 3, "three steps to finish opening");
        assert_eq!(swinger.angle(), step_size * 7.0, "door does not open past max");
        assert_eq!(swinger.arriving(), 1, "person entered on same step as full open");

        assert_eq!(swinger.step(), 0, "door holds while the next person enters");
        assert_eq!(swinger.arriving(), 0);

        assert_eq!(swinger.step(), -1, "door direction reverses on closing");
        assert_eq!(swinger.angle(), step_size * 6.0);
        for _ in 0..6 {
            assert_eq!(swinger.step(), -1, "door continues closing");
        }
        assert_eq!(swinger.angle(), 0.0, "door fully closed");
    }

    #[test]
    fn test_absorb_rejects_wrong_shape() {
        let mut doors = Doors::default();
        let bad = DoorState {
            arriving: 0,
            occupied: vec![false; 3],
            position: 0,
        };
        assert!(doors.door_mut(DoorName::Revolver).absorb(&bad).is_err());

        let out_of_range = DoorState {
            arriving: 0,
            occupied: vec![false; 4],
            position: 16,
        };
        assert!(doors.door_mut(DoorName::Revolver).absorb(&out_of_range).is_err());
    }

    #[test]
    fn test_default_matches_geometry() {
        assert_eq!(DoorGeometry::default().build().unwrap(), Doors::default());
    }

    proptest! {
        #[test]
        fn prop_revolver_position_in_range(
            eighths in 1u32..5,
            tolerance_pick in 0u32..100,
            arrivals in proptest::collection::vec(0u32..3, 0..200),
        ) {
            let granularity = eighths * 8;
            let tolerance = tolerance_pick % (granularity / 4) + 1;
            let mut revolver = RevolvingDoor::new(granularity, tolerance).unwrap();
            for n in arrivals {
                revolver.add_arrivals(n);
                let motion = revolver.step();
                prop_assert!(motion == 0 || motion == 1);
                prop_assert!(revolver.position() < granularity);
                prop_assert_eq!(revolver.occupied().len(), 4);
            }
        }

        #[test]
        fn prop_swinger_position_in_range(
            arrivals in proptest::collection::vec(0u32..2, 0..200),
        ) {
            let mut swinger = SwingingDoor::new(8, 7).unwrap();
            for n in arrivals {
                swinger.add_arrivals(n);
                swinger.step();
                prop_assert!(swinger.position() <= swinger.open());
            }
        }
    }
}
