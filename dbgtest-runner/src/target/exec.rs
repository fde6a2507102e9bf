// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stop, resume and step primitives built on top of a [`TargetController`].

use super::{StopReason, TargetAddress, TargetController, TargetState};
use crate::{
    config::BringupTimeouts,
    errors::{TargetError, TestFailure},
};
use std::time::Duration;
use tracing::debug;

/// Execution control over a target, with the timeouts from the active profile.
pub struct ExecControl<'a> {
    target: &'a mut dyn TargetController,
    timeouts: &'a BringupTimeouts,
}

impl<'a> ExecControl<'a> {
    /// Creates a new `ExecControl`.
    pub fn new(target: &'a mut dyn TargetController, timeouts: &'a BringupTimeouts) -> Self {
        Self { target, timeouts }
    }

    /// Returns the underlying controller.
    pub fn target(&mut self) -> &mut dyn TargetController {
        &mut *self.target
    }

    /// Returns the timeouts in use.
    pub fn timeouts(&self) -> &BringupTimeouts {
        self.timeouts
    }

    /// Halts the target if it isn't already stopped, waiting for it to stop.
    pub fn ensure_stopped(&mut self) -> Result<(), TargetError> {
        let (state, _) = self.target.target_state()?;
        if state != TargetState::Stopped {
            self.target.exec_interrupt()?;
            self.target
                .wait_target_state(TargetState::Stopped, self.timeouts.stop)?;
        }
        Ok(())
    }

    /// Resumes the target if it isn't already running, waiting for it to start.
    ///
    /// If `resume_at` is specified, execution resumes at that address rather than at the current
    /// program counter.
    pub fn ensure_running(&mut self, resume_at: Option<TargetAddress>) -> Result<(), TargetError> {
        let (state, _) = self.target.target_state()?;
        if state != TargetState::Running {
            match resume_at {
                Some(address) => {
                    debug!("resume from addr {address}");
                    self.target.exec_jump(address)?;
                }
                None => self.target.exec_continue()?,
            }
            self.target
                .wait_target_state(TargetState::Running, self.timeouts.run)?;
        }
        Ok(())
    }

    /// Steps one source line, failing unless the target stops because the step completed.
    pub fn single_step(&mut self) -> Result<(), TestFailure> {
        self.target.exec_next()?;
        self.target
            .wait_target_state(TargetState::Running, self.timeouts.step)?;
        let reason = self.wait_stopped(self.timeouts.step)?;
        if reason != Some(StopReason::Stepped) {
            return Err(TestFailure::UnexpectedStep { actual: reason });
        }
        Ok(())
    }

    /// Waits for the target to stop, returning the reason.
    pub fn wait_stopped(&mut self, timeout: Duration) -> Result<Option<StopReason>, TargetError> {
        self.target.wait_target_state(TargetState::Stopped, timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::sim::{SimulatedStop, SimulatedTarget, TargetCall};
    use pretty_assertions::assert_eq;

    #[test]
    fn ensure_stopped_is_noop_when_stopped() {
        let mut target = SimulatedTarget::new();
        let timeouts = BringupTimeouts::default();
        ExecControl::new(&mut target, &timeouts)
            .ensure_stopped()
            .expect("already stopped");
        assert_eq!(target.calls(), &[TargetCall::TargetState]);
    }

    #[test]
    fn ensure_stopped_interrupts_running_target() {
        let mut target = SimulatedTarget::new();
        target.set_running();
        let timeouts = BringupTimeouts::default();
        ExecControl::new(&mut target, &timeouts)
            .ensure_stopped()
            .expect("interrupt succeeds");
        assert_eq!(
            target.calls(),
            &[
                TargetCall::TargetState,
                TargetCall::ExecInterrupt,
                TargetCall::WaitTargetState(TargetState::Stopped, timeouts.stop),
            ]
        );
    }

    #[test]
    fn ensure_running_jumps_when_requested() {
        let mut target = SimulatedTarget::new();
        let timeouts = BringupTimeouts::default();
        ExecControl::new(&mut target, &timeouts)
            .ensure_running(Some(TargetAddress(0x400d_0000)))
            .expect("jump succeeds");
        assert_eq!(
            target.calls(),
            &[
                TargetCall::TargetState,
                TargetCall::ExecJump(TargetAddress(0x400d_0000)),
                TargetCall::WaitTargetState(TargetState::Running, timeouts.run),
            ]
        );
    }

    #[test]
    fn ensure_running_is_noop_when_running() {
        let mut target = SimulatedTarget::new();
        target.set_running();
        let timeouts = BringupTimeouts::default();
        ExecControl::new(&mut target, &timeouts)
            .ensure_running(None)
            .expect("already running");
        assert_eq!(target.calls(), &[TargetCall::TargetState]);
    }

    #[test]
    fn single_step_succeeds() {
        let mut target = SimulatedTarget::new();
        let timeouts = BringupTimeouts::default();
        ExecControl::new(&mut target, &timeouts)
            .single_step()
            .expect("step completes");
    }

    #[test]
    fn single_step_rejects_other_stop_reason() {
        let mut target = SimulatedTarget::new();
        target.push_stop(SimulatedStop::new(StopReason::Breakpoint, TargetAddress(0x400d_2000)));
        let timeouts = BringupTimeouts::default();
        let error = ExecControl::new(&mut target, &timeouts)
            .single_step()
            .expect_err("breakpoint is not a completed step");
        assert_eq!(
            error,
            TestFailure::UnexpectedStep {
                actual: Some(StopReason::Breakpoint)
            }
        );
        assert!(error.is_failure());
    }
}
