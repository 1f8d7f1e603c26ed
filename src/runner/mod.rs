//! Session runner: the async event loop around the calibration state machine.

mod command;
mod session_loop;

pub use command::{CalibrationCommand, CommandParseError};
pub use session_loop::{
    CalibrationHandle, CalibrationRunner, NoticeCallback, RunnerConfig, RunnerError,
};
