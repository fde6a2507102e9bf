// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! An in-process [`TargetController`] that simulates a well-behaved target.
//!
//! `SimulatedTarget` honors the controller contract without any hardware: resuming a target with a
//! breakpoint set stops at that breakpoint, resets halt the target, and flash writes are recorded.
//! Anomalies (spurious stops, hung resets, failing flash writes) can be scripted, which makes the
//! simulator useful for dry runs of a test plan and for exercising recovery paths.
//!
//! Every call is recorded and can be inspected with [`SimulatedTarget::calls`].

use super::{BreakpointId, StackFrame, StopReason, TargetAddress, TargetController, TargetState};
use crate::errors::{TargetError, TargetTimeout};
use camino::{Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

/// A call made to a [`SimulatedTarget`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TargetCall {
    /// [`TargetController::target_state`]
    TargetState,
    /// [`TargetController::wait_target_state`]
    WaitTargetState(TargetState, Duration),
    /// [`TargetController::exec_interrupt`]
    ExecInterrupt,
    /// [`TargetController::exec_continue`]
    ExecContinue,
    /// [`TargetController::exec_jump`]
    ExecJump(TargetAddress),
    /// [`TargetController::exec_next`]
    ExecNext,
    /// [`TargetController::add_breakpoint`]
    AddBreakpoint(String),
    /// [`TargetController::delete_breakpoint`]
    DeleteBreakpoint(BreakpointId),
    /// [`TargetController::current_frame`]
    CurrentFrame,
    /// [`TargetController::target_reset`]
    TargetReset,
    /// [`TargetController::target_program`]
    TargetProgram(Utf8PathBuf, u32),
    /// [`TargetController::exec_file_set`]
    ExecFileSet(Utf8PathBuf),
    /// [`TargetController::data_eval_expr`]
    DataEvalExpr(String),
}

/// A stop that a [`SimulatedTarget`] will report the next time it is resumed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SimulatedStop {
    reason: StopReason,
    frame: StackFrame,
}

impl SimulatedStop {
    /// Creates a stop for `reason` at `address`, with no symbol information.
    pub fn new(reason: StopReason, address: TargetAddress) -> Self {
        Self {
            reason,
            frame: StackFrame::new(address, None),
        }
    }

    /// Sets the function the target appears to stop in.
    pub fn in_function(mut self, function: impl Into<String>) -> Self {
        self.frame.function = Some(function.into());
        self
    }
}

/// A simulated target. See the [module documentation](self) for details.
#[derive(Clone, Debug)]
pub struct SimulatedTarget {
    state: TargetState,
    last_reason: Option<StopReason>,
    frame: StackFrame,
    step_pending: bool,
    scripted_stops: VecDeque<SimulatedStop>,
    breakpoints: BTreeMap<BreakpointId, String>,
    next_breakpoint: u32,
    hung_resets: usize,
    fail_program_offset: Option<u32>,
    programmed: Vec<(Utf8PathBuf, u32)>,
    symbol_file: Option<Utf8PathBuf>,
    variables: BTreeMap<String, String>,
    calls: Vec<TargetCall>,
}

impl Default for SimulatedTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTarget {
    /// The program counter after a reset.
    pub const RESET_VECTOR: TargetAddress = TargetAddress(0x4000_0400);

    /// The address at which breakpoints are hit.
    pub const BREAKPOINT_ADDRESS: TargetAddress = TargetAddress(0x400d_0f00);

    /// Creates a new simulated target, halted at the reset vector.
    pub fn new() -> Self {
        Self {
            state: TargetState::Stopped,
            last_reason: None,
            frame: StackFrame::new(Self::RESET_VECTOR, None),
            step_pending: false,
            scripted_stops: VecDeque::new(),
            breakpoints: BTreeMap::new(),
            next_breakpoint: 1,
            hung_resets: 0,
            fail_program_offset: None,
            programmed: Vec::new(),
            symbol_file: None,
            variables: BTreeMap::new(),
            calls: Vec::new(),
        }
    }

    // ---
    // Scripting
    // ---

    /// Puts the target into the running state without a pending stop.
    pub fn set_running(&mut self) {
        self.state = TargetState::Running;
        self.last_reason = None;
    }

    /// Queues a stop to be reported the next time the running target is waited on, ahead of any
    /// breakpoint or step.
    pub fn push_stop(&mut self, stop: SimulatedStop) {
        self.scripted_stops.push_back(stop);
    }

    /// Makes the next `count` resets leave the target in an unknown state that never settles on
    /// its own. An interrupt halts a hung target.
    pub fn hang_next_resets(&mut self, count: usize) {
        self.hung_resets = count;
    }

    /// Makes flash writes at `offset` fail.
    pub fn fail_program_at(&mut self, offset: Option<u32>) {
        self.fail_program_offset = offset;
    }

    // ---
    // Inspection
    // ---

    /// Returns every call made so far, in order.
    pub fn calls(&self) -> &[TargetCall] {
        &self.calls
    }

    /// Forgets the calls recorded so far.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Counts the calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&TargetCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    /// Returns the images written to flash so far, with their offsets.
    pub fn programmed(&self) -> &[(Utf8PathBuf, u32)] {
        &self.programmed
    }

    /// Returns the ELF file symbols were last loaded from.
    pub fn symbol_file(&self) -> Option<&Utf8Path> {
        self.symbol_file.as_deref()
    }

    /// Returns the value last assigned to `name` through [`TargetController::data_eval_expr`].
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Returns the number of breakpoints currently set.
    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    /// Returns the current run state, without recording a call.
    pub fn state(&self) -> TargetState {
        self.state
    }

    // ---
    // Helper methods
    // ---

    fn require_stopped(&self, command: &str) -> Result<(), TargetError> {
        if self.state == TargetState::Stopped {
            Ok(())
        } else {
            Err(TargetError::command(
                command,
                format!("target is {}", self.state),
            ))
        }
    }

    fn timeout(&self, expected: TargetState, timeout: Duration) -> TargetError {
        TargetTimeout {
            expected,
            timeout,
            last_state: self.state,
        }
        .into()
    }

    fn stop(&mut self, reason: StopReason, frame: StackFrame) {
        self.state = TargetState::Stopped;
        self.last_reason = Some(reason);
        self.frame = frame;
    }

    fn resume(&mut self) {
        self.state = TargetState::Running;
        self.last_reason = None;
    }

    /// Works out where a running target stops next, if anywhere.
    fn settle(&mut self) -> bool {
        if let Some(stop) = self.scripted_stops.pop_front() {
            self.step_pending = false;
            self.stop(stop.reason, stop.frame);
            return true;
        }
        if self.step_pending {
            self.step_pending = false;
            let frame = StackFrame::new(
                TargetAddress(self.frame.address.0.wrapping_add(4)),
                self.frame.function.clone(),
            );
            self.stop(StopReason::Stepped, frame);
            return true;
        }
        if let Some(symbol) = self.breakpoints.values().next().cloned() {
            self.stop(
                StopReason::Breakpoint,
                StackFrame::new(Self::BREAKPOINT_ADDRESS, Some(symbol)),
            );
            return true;
        }
        false
    }
}

impl TargetController for SimulatedTarget {
    fn target_state(&mut self) -> Result<(TargetState, Option<StopReason>), TargetError> {
        self.calls.push(TargetCall::TargetState);
        Ok((self.state, self.last_reason.clone()))
    }

    fn wait_target_state(
        &mut self,
        expected: TargetState,
        timeout: Duration,
    ) -> Result<Option<StopReason>, TargetError> {
        self.calls
            .push(TargetCall::WaitTargetState(expected, timeout));
        match (expected, self.state) {
            (TargetState::Stopped, TargetState::Stopped) => Ok(self.last_reason.clone()),
            (TargetState::Stopped, TargetState::Running) => {
                if self.settle() {
                    Ok(self.last_reason.clone())
                } else {
                    Err(self.timeout(expected, timeout))
                }
            }
            (TargetState::Running, TargetState::Running) => Ok(None),
            _ => Err(self.timeout(expected, timeout)),
        }
    }

    fn exec_interrupt(&mut self) -> Result<(), TargetError> {
        self.calls.push(TargetCall::ExecInterrupt);
        if self.state != TargetState::Stopped {
            let frame = self.frame.clone();
            self.stop(StopReason::Interrupt, frame);
        }
        Ok(())
    }

    fn exec_continue(&mut self) -> Result<(), TargetError> {
        self.calls.push(TargetCall::ExecContinue);
        self.require_stopped("exec-continue")?;
        self.resume();
        Ok(())
    }

    fn exec_jump(&mut self, address: TargetAddress) -> Result<(), TargetError> {
        self.calls.push(TargetCall::ExecJump(address));
        self.require_stopped("exec-jump")?;
        self.frame = StackFrame::new(address, None);
        self.resume();
        Ok(())
    }

    fn exec_next(&mut self) -> Result<(), TargetError> {
        self.calls.push(TargetCall::ExecNext);
        self.require_stopped("exec-next")?;
        self.step_pending = true;
        self.resume();
        Ok(())
    }

    fn add_breakpoint(&mut self, symbol: &str) -> Result<BreakpointId, TargetError> {
        self.calls.push(TargetCall::AddBreakpoint(symbol.to_owned()));
        let id = BreakpointId(self.next_breakpoint);
        self.next_breakpoint += 1;
        self.breakpoints.insert(id, symbol.to_owned());
        Ok(id)
    }

    fn delete_breakpoint(&mut self, breakpoint: BreakpointId) -> Result<(), TargetError> {
        self.calls.push(TargetCall::DeleteBreakpoint(breakpoint));
        match self.breakpoints.remove(&breakpoint) {
            Some(_) => Ok(()),
            None => Err(TargetError::command(
                "break-delete",
                format!("no breakpoint number {breakpoint}"),
            )),
        }
    }

    fn current_frame(&mut self) -> Result<StackFrame, TargetError> {
        self.calls.push(TargetCall::CurrentFrame);
        self.require_stopped("stack-info-frame")?;
        Ok(self.frame.clone())
    }

    fn target_reset(&mut self) -> Result<(), TargetError> {
        self.calls.push(TargetCall::TargetReset);
        self.step_pending = false;
        if self.hung_resets > 0 {
            self.hung_resets -= 1;
            self.state = TargetState::Unknown;
            self.last_reason = None;
        } else {
            self.state = TargetState::Stopped;
            self.last_reason = None;
            self.frame = StackFrame::new(Self::RESET_VECTOR, None);
        }
        Ok(())
    }

    fn target_program(&mut self, image: &Utf8Path, offset: u32) -> Result<(), TargetError> {
        self.calls
            .push(TargetCall::TargetProgram(image.to_owned(), offset));
        self.require_stopped("program")?;
        if self.fail_program_offset == Some(offset) {
            return Err(TargetError::command(
                "program",
                format!("flash write at {offset:#x} failed"),
            ));
        }
        self.programmed.push((image.to_owned(), offset));
        Ok(())
    }

    fn exec_file_set(&mut self, elf: &Utf8Path) -> Result<(), TargetError> {
        self.calls.push(TargetCall::ExecFileSet(elf.to_owned()));
        self.symbol_file = Some(elf.to_owned());
        Ok(())
    }

    fn data_eval_expr(&mut self, expression: &str) -> Result<String, TargetError> {
        self.calls
            .push(TargetCall::DataEvalExpr(expression.to_owned()));
        match expression.split_once('=') {
            Some((name, value)) => {
                let value = value.trim().to_owned();
                self.variables
                    .insert(name.trim().to_owned(), value.clone());
                Ok(value)
            }
            None => self
                .variables
                .get(expression.trim())
                .cloned()
                .ok_or_else(|| {
                    TargetError::command(
                        "data-evaluate-expression",
                        format!("no symbol \"{expression}\" in current context"),
                    )
                }),
        }
    }
}
