// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The debugger-side view of the target.
//!
//! [`TargetController`] is the contract this crate consumes: everything that talks to the chip
//! (the debugger session, the transport behind it) lives on the other side of this trait. The
//! controller is constructed once per process and passed explicitly to whatever needs it.

pub mod exec;
pub mod sim;

use crate::errors::TargetError;
use camino::Utf8Path;
use serde::Deserialize;
use std::{fmt, time::Duration};

/// The run state of the target, as reported by the debugger.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TargetState {
    /// The target is halted.
    Stopped,

    /// The target is executing.
    Running,

    /// The debugger doesn't know, typically because a transition is in flight.
    Unknown,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Why the target last stopped.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum StopReason {
    /// A breakpoint was hit.
    Breakpoint,

    /// A single step completed.
    Stepped,

    /// The target stopped on a trap signal.
    Trap,

    /// The target stopped on an interrupt signal.
    Interrupt,

    /// Any other reason, as reported by the debugger.
    Other(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Breakpoint => write!(f, "breakpoint-hit"),
            Self::Stepped => write!(f, "end-stepping-range"),
            Self::Trap => write!(f, "signal-received (SIGTRAP)"),
            Self::Interrupt => write!(f, "signal-received (SIGINT)"),
            Self::Other(reason) => write!(f, "{reason}"),
        }
    }
}

/// An address in the target's address space.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize)]
#[serde(transparent)]
pub struct TargetAddress(pub u64);

impl fmt::Display for TargetAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A handle to a breakpoint set through [`TargetController::add_breakpoint`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BreakpointId(pub u32);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The innermost call frame of a stopped target.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StackFrame {
    /// The program counter.
    pub address: TargetAddress,

    /// The function containing the program counter, if symbols are available.
    pub function: Option<String>,

    /// The source file, if known.
    pub file: Option<String>,

    /// The source line, if known.
    pub line: Option<u32>,
}

impl StackFrame {
    /// Creates a frame with just an address and function name.
    pub fn new(address: TargetAddress, function: Option<String>) -> Self {
        Self {
            address,
            function,
            file: None,
            line: None,
        }
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if let Some(function) = &self.function {
            write!(f, " in {function}")?;
        }
        if let Some(file) = &self.file {
            write!(f, " at {file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
        }
        Ok(())
    }
}

/// Operations the harness needs from a debugger connected to the target.
///
/// Every method blocks until the debugger has acknowledged the command. Only
/// [`wait_target_state`](Self::wait_target_state) waits for the *target* to do something, and it
/// does so with a hard deadline.
pub trait TargetController {
    /// Returns the current run state and, if stopped, the reason for the last stop.
    fn target_state(&mut self) -> Result<(TargetState, Option<StopReason>), TargetError>;

    /// Blocks until the target reaches `expected`, or fails with [`TargetError::Timeout`] once
    /// `timeout` has elapsed.
    ///
    /// Returns the stop reason when `expected` is [`TargetState::Stopped`].
    fn wait_target_state(
        &mut self,
        expected: TargetState,
        timeout: Duration,
    ) -> Result<Option<StopReason>, TargetError>;

    /// Asks a running target to halt.
    fn exec_interrupt(&mut self) -> Result<(), TargetError>;

    /// Resumes execution from the current program counter.
    fn exec_continue(&mut self) -> Result<(), TargetError>;

    /// Resumes execution at `address`.
    fn exec_jump(&mut self, address: TargetAddress) -> Result<(), TargetError>;

    /// Steps over one source line.
    fn exec_next(&mut self) -> Result<(), TargetError>;

    /// Sets a breakpoint on `symbol`.
    fn add_breakpoint(&mut self, symbol: &str) -> Result<BreakpointId, TargetError>;

    /// Removes a breakpoint set earlier.
    fn delete_breakpoint(&mut self, breakpoint: BreakpointId) -> Result<(), TargetError>;

    /// Returns the innermost frame of the stopped target.
    fn current_frame(&mut self) -> Result<StackFrame, TargetError>;

    /// Performs a full reset of the target, leaving it halted.
    fn target_reset(&mut self) -> Result<(), TargetError>;

    /// Writes the binary at `image` to flash at `offset`.
    fn target_program(&mut self, image: &Utf8Path, offset: u32) -> Result<(), TargetError>;

    /// Loads symbol information from `elf`.
    fn exec_file_set(&mut self, elf: &Utf8Path) -> Result<(), TargetError>;

    /// Evaluates `expression` in the context of the stopped program, returning the result.
    fn data_eval_expr(&mut self, expression: &str) -> Result<String, TargetError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(TargetAddress(0x4000_0450), "0x40000450"; "flash address")]
    #[test_case(TargetAddress(0), "0x0"; "zero")]
    fn address_display(address: TargetAddress, expected: &str) {
        assert_eq!(address.to_string(), expected);
    }

    #[test]
    fn frame_display() {
        let mut frame = StackFrame::new(TargetAddress(0x400d_1234), Some("app_main".to_owned()));
        assert_eq!(frame.to_string(), "0x400d1234 in app_main");

        frame.file = Some("main/test_app_main.c".to_owned());
        frame.line = Some(42);
        assert_eq!(
            frame.to_string(),
            "0x400d1234 in app_main at main/test_app_main.c:42"
        );
    }
}
