//! The guided step sequence the operator walks through.

use super::marker::Marker;
use crate::viewport::{FocusPoint, ImageSize};

/// Zoom used for the overview step.
pub const OVERVIEW_ZOOM: u32 = 1;

/// Zoom used when framing a single corner marker.
pub const CORNER_ZOOM: u32 = 4;

/// Number of steps in the sequence (start + four corners).
pub const STEP_COUNT: usize = 5;

/// What a step asks the operator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTarget {
    /// Placeholder row shown before the first corner and after the last.
    Start,
    /// Confirm the position of one marker.
    Corner(Marker),
}

/// Navigation direction between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// A single step of the calibration sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationStep {
    pub target: StepTarget,
    /// Human-readable description, as shown next to the step.
    pub description: &'static str,
    /// Where the viewport is framed while this step is active.
    pub focus: FocusPoint,
}

impl CalibrationStep {
    /// Short name of the step ("start" or the marker name).
    pub fn name(&self) -> &'static str {
        match self.target {
            StepTarget::Start => "start",
            StepTarget::Corner(marker) => marker.as_str(),
        }
    }

    pub fn marker(&self) -> Option<Marker> {
        match self.target {
            StepTarget::Start => None,
            StepTarget::Corner(marker) => Some(marker),
        }
    }

    /// Whether the description agrees with the marker's compass position.
    pub fn description_matches_marker(&self) -> bool {
        match self.target {
            StepTarget::Start => true,
            StepTarget::Corner(marker) => marker.compass_name() == self.description,
        }
    }

    /// Build the step sequence for a frame of the given size.
    ///
    /// The corner order walks the frame counter-clockwise from the top left.
    // TODO: the descriptions of the SW and NE steps read "North East" and
    // "South West", transposed relative to their marker and focus point.
    // Confirm against the engraved layout before correcting the strings.
    pub fn sequence(frame: ImageSize) -> Vec<CalibrationStep> {
        let (w, h) = (frame.width, frame.height);
        vec![
            CalibrationStep {
                target: StepTarget::Start,
                description: "click to start",
                focus: FocusPoint::new(0.0, 0.0, OVERVIEW_ZOOM),
            },
            CalibrationStep {
                target: StepTarget::Corner(Marker::NW),
                description: "North West",
                focus: FocusPoint::new(0.0, 0.0, CORNER_ZOOM),
            },
            CalibrationStep {
                target: StepTarget::Corner(Marker::SW),
                description: "North East",
                focus: FocusPoint::new(0.0, h, CORNER_ZOOM),
            },
            CalibrationStep {
                target: StepTarget::Corner(Marker::SE),
                description: "South East",
                focus: FocusPoint::new(w, h, CORNER_ZOOM),
            },
            CalibrationStep {
                target: StepTarget::Corner(Marker::NE),
                description: "South West",
                focus: FocusPoint::new(w, 0.0, CORNER_ZOOM),
            },
        ]
    }
}

/// Index of the step reached from `current` in `direction`.
///
/// Step 0 is only landed on when `complete` is true; otherwise it is skipped
/// to the neighbouring corner step.
pub fn step_after(current: usize, direction: Direction, complete: bool) -> usize {
    match direction {
        Direction::Next => {
            let next = (current + 1) % STEP_COUNT;
            if !complete && next == 0 {
                1
            } else {
                next
            }
        }
        Direction::Previous => {
            let mut prev = current as isize - 1;
            if !complete && prev == 0 {
                prev = -1;
            }
            if prev < 0 {
                STEP_COUNT - 1
            } else {
                prev as usize
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> ImageSize {
        ImageSize::new(2048.0, 1536.0)
    }

    #[test]
    fn test_sequence_focus_points() {
        let steps = CalibrationStep::sequence(frame());
        assert_eq!(steps.len(), STEP_COUNT);
        assert_eq!(steps[0].target, StepTarget::Start);
        assert_eq!(steps[0].focus, FocusPoint::new(0.0, 0.0, 1));

        let corners: Vec<(Marker, FocusPoint)> = steps
            .iter()
            .filter_map(|s| s.marker().map(|m| (m, s.focus)))
            .collect();
        assert_eq!(
            corners,
            vec![
                (Marker::NW, FocusPoint::new(0.0, 0.0, 4)),
                (Marker::SW, FocusPoint::new(0.0, 1536.0, 4)),
                (Marker::SE, FocusPoint::new(2048.0, 1536.0, 4)),
                (Marker::NE, FocusPoint::new(2048.0, 0.0, 4)),
            ]
        );
    }

    #[test]
    fn test_transposed_descriptions_are_flagged() {
        let steps = CalibrationStep::sequence(frame());
        let mismatched: Vec<&str> = steps
            .iter()
            .filter(|s| !s.description_matches_marker())
            .map(|s| s.name())
            .collect();
        assert_eq!(mismatched, vec!["SW", "NE"]);
    }

    #[test]
    fn test_next_skips_start_until_complete() {
        assert_eq!(step_after(0, Direction::Next, false), 1);
        assert_eq!(step_after(4, Direction::Next, false), 1);
        assert_eq!(step_after(4, Direction::Next, true), 0);
    }

    #[test]
    fn test_previous_skips_start_until_complete() {
        assert_eq!(step_after(1, Direction::Previous, false), 4);
        assert_eq!(step_after(1, Direction::Previous, true), 0);
        assert_eq!(step_after(0, Direction::Previous, true), 4);
    }

    #[test]
    fn test_next_then_previous_round_trips() {
        for complete in [false, true] {
            for i in 1..STEP_COUNT {
                let there = step_after(i, Direction::Next, complete);
                assert_eq!(step_after(there, Direction::Previous, complete), i);
            }
        }
        // From the review step, the round trip only holds once complete.
        let there = step_after(0, Direction::Next, true);
        assert_eq!(step_after(there, Direction::Previous, true), 0);
        let there = step_after(0, Direction::Next, false);
        assert_ne!(step_after(there, Direction::Previous, false), 0);
    }
}
