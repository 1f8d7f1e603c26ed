//! Operator commands and their text form.

use std::str::FromStr;

use thiserror::Error;

use crate::calibration::{Direction, PictureVariant, UnknownPictureVariant};

/// Command parsing errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandParseError {
    #[error("Empty command")]
    Empty,
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Missing argument <{argument}> for '{command}'")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("Invalid number for '{command}': {value}")]
    InvalidNumber { command: &'static str, value: String },
    #[error("Expected 'in' or 'out', got: {0}")]
    InvalidZoom(String),
    #[error(transparent)]
    InvalidPicture(#[from] UnknownPictureVariant),
}

/// A request from the operator to the calibration session.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationCommand {
    Start,
    Advance(Direction),
    /// Click at a fractional position (`0.0..=1.0`) of the picture element.
    Click { x_rel: f64, y_rel: f64 },
    /// Click at an image pixel.
    ClickImage { x: f64, y: f64 },
    ZoomIn,
    ZoomOut,
    Pan { dx: f64, dy: f64 },
    ResetPan,
    Picture(PictureVariant),
    Capture,
    /// Capture, then move the setup workflow to its next page.
    ContinueToCalibration,
    Submit,
    Abort,
    GenerateMarkers,
    EngraveMarkers { intensity: u32, feedrate: u32 },
    SettingsShown,
}

fn arg<'a>(
    args: &[&'a str],
    index: usize,
    command: &'static str,
    argument: &'static str,
) -> Result<&'a str, CommandParseError> {
    args.get(index)
        .copied()
        .ok_or(CommandParseError::MissingArgument { command, argument })
}

fn number<T: FromStr>(
    args: &[&str],
    index: usize,
    command: &'static str,
    argument: &'static str,
) -> Result<T, CommandParseError> {
    let value = arg(args, index, command, argument)?;
    value.parse().map_err(|_| CommandParseError::InvalidNumber {
        command,
        value: value.to_string(),
    })
}

impl FromStr for CalibrationCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let (name, args) = parts.split_first().ok_or(CommandParseError::Empty)?;

        let command = match name.to_lowercase().as_str() {
            "start" => CalibrationCommand::Start,
            "next" | "n" => CalibrationCommand::Advance(Direction::Next),
            "prev" | "previous" | "p" => CalibrationCommand::Advance(Direction::Previous),
            "click" => CalibrationCommand::Click {
                x_rel: number(args, 0, "click", "xrel")?,
                y_rel: number(args, 1, "click", "yrel")?,
            },
            "clickimg" => CalibrationCommand::ClickImage {
                x: number(args, 0, "clickimg", "x")?,
                y: number(args, 1, "clickimg", "y")?,
            },
            "zoom" => match arg(args, 0, "zoom", "in|out")?.to_lowercase().as_str() {
                "in" | "+" => CalibrationCommand::ZoomIn,
                "out" | "-" => CalibrationCommand::ZoomOut,
                other => return Err(CommandParseError::InvalidZoom(other.to_string())),
            },
            "pan" => CalibrationCommand::Pan {
                dx: number(args, 0, "pan", "dx")?,
                dy: number(args, 1, "pan", "dy")?,
            },
            "resetpan" => CalibrationCommand::ResetPan,
            "picture" | "pic" => {
                CalibrationCommand::Picture(arg(args, 0, "picture", "raw|lens|cropped")?.parse()?)
            }
            "capture" => CalibrationCommand::Capture,
            "continue" => CalibrationCommand::ContinueToCalibration,
            "submit" => CalibrationCommand::Submit,
            "abort" | "cancel" => CalibrationCommand::Abort,
            "generate" => CalibrationCommand::GenerateMarkers,
            "engrave" => CalibrationCommand::EngraveMarkers {
                intensity: number(args, 0, "engrave", "intensity")?,
                feedrate: number(args, 1, "engrave", "feedrate")?,
            },
            "settings" => CalibrationCommand::SettingsShown,
            _ => return Err(CommandParseError::UnknownCommand(name.to_string())),
        };
        Ok(command)
    }
}
