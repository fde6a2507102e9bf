// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bringing the target to a known state before tests run.
//!
//! Two operations are provided:
//!
//! * [`TargetBringup::load_image`] writes a group's bootloader, partition table and application to
//!   flash, once per group.
//! * [`TargetBringup::setup`] runs before every test: it halts and resets the target, then runs it
//!   to the application's entry symbol and leaves it stopped there with no breakpoints set. Some
//!   targets stop spuriously the first time they are resumed after a reset; one such stop is
//!   tolerated before the entry symbol must be reached.

use crate::{
    app_config::{AppImageConfig, FlashSegment},
    config::{BringupTimeouts, HarnessProfile},
    errors::{AssertionFailure, BringupError, BringupStep, LoadImageError},
    target::{BreakpointId, StopReason, TargetAddress, TargetController, exec::ExecControl},
};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

/// Loads application images and synchronizes the target on the entry symbol.
#[derive(Clone, Debug)]
pub struct TargetBringup {
    apps_dir: Utf8PathBuf,
    entry_symbol: String,
    spurious_trap_address: TargetAddress,
    timeouts: BringupTimeouts,
}

impl TargetBringup {
    /// Creates a new `TargetBringup` with the default entry symbol, trap address and timeouts.
    pub fn new(apps_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            apps_dir: apps_dir.into(),
            entry_symbol: "app_main".to_owned(),
            spurious_trap_address: TargetAddress(0x4000_0450),
            timeouts: BringupTimeouts::default(),
        }
    }

    /// Creates a new `TargetBringup` from a configuration profile.
    pub fn from_profile(profile: &HarnessProfile<'_>) -> Self {
        Self {
            apps_dir: profile.test_apps_dir().to_owned(),
            entry_symbol: profile.entry_symbol().to_owned(),
            spurious_trap_address: profile.spurious_trap_address(),
            timeouts: profile.timeouts(),
        }
    }

    /// Sets the symbol the target is run to.
    pub fn set_entry_symbol(&mut self, entry_symbol: impl Into<String>) -> &mut Self {
        self.entry_symbol = entry_symbol.into();
        self
    }

    /// Sets the address of the spurious trap that is stepped over once.
    pub fn set_spurious_trap_address(&mut self, address: TargetAddress) -> &mut Self {
        self.spurious_trap_address = address;
        self
    }

    /// Sets the bounds on waits for target state transitions.
    pub fn set_timeouts(&mut self, timeouts: BringupTimeouts) -> &mut Self {
        self.timeouts = timeouts;
        self
    }

    /// Returns the directory application binaries are located under.
    pub fn apps_dir(&self) -> &Utf8Path {
        &self.apps_dir
    }

    /// Returns the entry symbol.
    pub fn entry_symbol(&self) -> &str {
        &self.entry_symbol
    }

    /// Returns the timeouts in use.
    pub fn timeouts(&self) -> &BringupTimeouts {
        &self.timeouts
    }

    /// Writes the image described by `config` to flash, then resets the target.
    ///
    /// The target is halted first if it is running. Segments are written in
    /// [`FlashSegment::LOAD_ORDER`]; the first failed write aborts the load.
    pub fn load_image(
        &self,
        target: &mut dyn TargetController,
        config: &AppImageConfig,
    ) -> Result<(), LoadImageError> {
        // Resolve every path up front so that a misconfigured image doesn't get partially written.
        let mut segments = Vec::with_capacity(FlashSegment::LOAD_ORDER.len());
        for segment in FlashSegment::LOAD_ORDER {
            let path = config.segment_path(&self.apps_dir, segment).ok_or_else(|| {
                LoadImageError::MissingSegmentPath {
                    app_name: config.app_name().to_owned(),
                    segment,
                }
            })?;
            segments.push((segment, path, config.offset(segment)));
        }

        let mut exec = ExecControl::new(target, &self.timeouts);
        exec.ensure_stopped().map_err(LoadImageError::Quiesce)?;

        for (segment, path, offset) in segments {
            debug!("writing {segment} `{path}` at {offset:#x}");
            exec.target()
                .target_program(&path, offset)
                .map_err(|source| LoadImageError::ProgrammingFailure {
                    segment,
                    path,
                    offset,
                    source,
                })?;
        }

        exec.target()
            .target_reset()
            .map_err(LoadImageError::Reset)
    }

    /// Points the debugger at the symbols in `elf`.
    pub fn attach_symbols(
        &self,
        target: &mut dyn TargetController,
        elf: &Utf8Path,
    ) -> Result<(), LoadImageError> {
        debug!("loading symbols from `{elf}`");
        target
            .exec_file_set(elf)
            .map_err(|source| LoadImageError::SymbolFile {
                path: elf.to_owned(),
                source,
            })
    }

    /// Brings the target to the entry symbol.
    ///
    /// On success the target is stopped at the entry symbol with the entry breakpoint removed. If
    /// `resume_at` is specified, the first resume after reset starts there.
    pub fn setup(
        &self,
        target: &mut dyn TargetController,
        resume_at: Option<TargetAddress>,
    ) -> Result<(), BringupError> {
        let mut exec = ExecControl::new(target, &self.timeouts);

        exec.ensure_stopped()
            .map_err(|error| BringupError::from_target(BringupStep::Quiesce, error))?;

        exec.target()
            .target_reset()
            .and_then(|()| exec.wait_stopped(self.timeouts.reset))
            .map_err(|error| BringupError::from_target(BringupStep::Reset, error))?;

        let breakpoint = exec
            .target()
            .add_breakpoint(&self.entry_symbol)
            .map_err(|error| BringupError::from_target(BringupStep::Arm, error))?;

        match self.run_to_entry_and_verify(&mut exec, resume_at) {
            Ok(()) => exec
                .target()
                .delete_breakpoint(breakpoint)
                .map_err(|error| BringupError::from_target(BringupStep::Disarm, error)),
            Err(error) => {
                self.disarm_after_failure(&mut exec, breakpoint);
                Err(error)
            }
        }
    }

    // ---
    // Helper methods
    // ---

    fn run_to_entry_and_verify(
        &self,
        exec: &mut ExecControl<'_>,
        resume_at: Option<TargetAddress>,
    ) -> Result<(), BringupError> {
        let mut reason = self.run_to_entry(exec, resume_at)?;

        match reason {
            Some(StopReason::Trap) => {
                let frame = exec
                    .target()
                    .current_frame()
                    .map_err(|error| BringupError::from_target(BringupStep::RunToEntry, error))?;
                if frame.address != self.spurious_trap_address {
                    return Err(BringupError::UnexpectedStopReason {
                        step: BringupStep::RunToEntry,
                        expected: StopReason::Breakpoint,
                        actual: reason,
                        frame: Some(frame),
                    });
                }
                warn!(
                    "unexpected trap during setup at {}, applying workaround",
                    frame.address
                );
                reason = self.run_to_entry(exec, None)?;
            }
            Some(StopReason::Interrupt) => {
                // The interrupt address varies, so it isn't checked.
                warn!("unexpected interrupt during setup, applying workaround");
                reason = self.run_to_entry(exec, None)?;
            }
            _ => {}
        }

        if reason != Some(StopReason::Breakpoint) {
            let frame = exec.target().current_frame().ok();
            return Err(BringupError::UnexpectedStopReason {
                step: BringupStep::Verify,
                expected: StopReason::Breakpoint,
                actual: reason,
                frame,
            });
        }

        let frame = exec
            .target()
            .current_frame()
            .map_err(|error| BringupError::from_target(BringupStep::Verify, error))?;
        if frame.function.as_deref() != Some(self.entry_symbol.as_str()) {
            return Err(BringupError::Assertion {
                step: BringupStep::Verify,
                source: AssertionFailure::new(
                    "function at entry breakpoint",
                    &self.entry_symbol,
                    frame.function.as_deref().unwrap_or("<unknown>"),
                ),
            });
        }

        debug!("target stopped at {frame}");
        Ok(())
    }

    fn run_to_entry(
        &self,
        exec: &mut ExecControl<'_>,
        resume_at: Option<TargetAddress>,
    ) -> Result<Option<StopReason>, BringupError> {
        exec.ensure_running(resume_at)
            .and_then(|()| exec.wait_stopped(self.timeouts.entry))
            .map_err(|error| BringupError::from_target(BringupStep::RunToEntry, error))
    }

    fn disarm_after_failure(&self, exec: &mut ExecControl<'_>, breakpoint: BreakpointId) {
        if let Err(error) = exec.target().delete_breakpoint(breakpoint) {
            debug!("failed to remove entry breakpoint {breakpoint} after setup failure: {error}");
        }
    }
}
