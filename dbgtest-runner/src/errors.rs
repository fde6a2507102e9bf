// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by the harness.

use crate::{
    app_config::FlashSegment,
    target::{StackFrame, StopReason, TargetState},
};
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{fmt, time::Duration};
use thiserror::Error;

/// A bounded wait for a target state transition expired.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error(
    "timed out after {timeout:?} waiting for target to be {expected} \
     (last observed state: {last_state})"
)]
pub struct TargetTimeout {
    /// The state that was waited for.
    pub expected: TargetState,

    /// The bound that expired.
    pub timeout: Duration,

    /// The last state the debugger reported before giving up.
    pub last_state: TargetState,
}

/// An error returned by a [`TargetController`](crate::target::TargetController).
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TargetError {
    /// A wait for a target state expired.
    #[error(transparent)]
    Timeout(#[from] TargetTimeout),

    /// The debugger rejected or failed a command.
    #[error("debugger command `{command}` failed: {message}")]
    Command {
        /// The command that was issued.
        command: String,

        /// The debugger's description of the failure.
        message: String,
    },
}

impl TargetError {
    /// Creates a new `Command` error.
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// A step of the bringup sequence run before each test.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BringupStep {
    /// Halting the target if it was running.
    Quiesce,

    /// Resetting the target.
    Reset,

    /// Setting the entry breakpoint.
    Arm,

    /// Resuming until the entry breakpoint is hit.
    RunToEntry,

    /// Checking where the target stopped.
    Verify,

    /// Removing the entry breakpoint.
    Disarm,
}

impl fmt::Display for BringupStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quiesce => write!(f, "quiesce"),
            Self::Reset => write!(f, "reset"),
            Self::Arm => write!(f, "arm"),
            Self::RunToEntry => write!(f, "run-to-entry"),
            Self::Verify => write!(f, "verify"),
            Self::Disarm => write!(f, "disarm"),
        }
    }
}

/// A verification that didn't hold.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("assertion failed: {what}: expected {expected}, got {actual}")]
pub struct AssertionFailure {
    /// What was being checked.
    pub what: String,

    /// The expected value, rendered.
    pub expected: String,

    /// The actual value, rendered.
    pub actual: String,
}

impl AssertionFailure {
    /// Creates a new assertion failure.
    pub fn new(
        what: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        Self {
            what: what.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// An error that occurred while bringing the target up to the entry breakpoint.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BringupError {
    /// A bounded wait expired.
    #[error("bringup step `{step}` timed out")]
    Timeout {
        /// The step that was running.
        step: BringupStep,

        /// The timeout.
        #[source]
        source: TargetTimeout,
    },

    /// The target stopped for a reason other than the one expected.
    #[error(
        "bringup step `{step}`: expected target to stop with {expected}, \
         but it stopped with {}{}",
        DisplayStopReason(.actual.as_ref()),
        DisplayFrame(.frame.as_ref()),
    )]
    UnexpectedStopReason {
        /// The step that was running.
        step: BringupStep,

        /// The expected reason.
        expected: StopReason,

        /// The actual reason, if the debugger reported one.
        actual: Option<StopReason>,

        /// Where the target stopped, if it could be read.
        frame: Option<StackFrame>,
    },

    /// A verification failed.
    #[error("bringup step `{step}` failed verification")]
    Assertion {
        /// The step that was running.
        step: BringupStep,

        /// The failed assertion.
        #[source]
        source: AssertionFailure,
    },

    /// The debugger failed a command.
    #[error("bringup step `{step}` failed")]
    Target {
        /// The step that was running.
        step: BringupStep,

        /// The underlying error.
        #[source]
        source: TargetError,
    },
}

impl BringupError {
    /// Wraps a controller error, lifting timeouts into [`Self::Timeout`].
    pub(crate) fn from_target(step: BringupStep, error: TargetError) -> Self {
        match error {
            TargetError::Timeout(source) => Self::Timeout { step, source },
            source => Self::Target { step, source },
        }
    }

    /// The step that failed.
    pub fn step(&self) -> BringupStep {
        match self {
            Self::Timeout { step, .. }
            | Self::UnexpectedStopReason { step, .. }
            | Self::Assertion { step, .. }
            | Self::Target { step, .. } => *step,
        }
    }

    /// Returns true if this error is a verification failure rather than a harness error.
    pub fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedStopReason { .. } | Self::Assertion { .. }
        )
    }
}

struct DisplayStopReason<'a>(Option<&'a StopReason>);

impl fmt::Display for DisplayStopReason<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(reason) => write!(f, "{reason}"),
            None => write!(f, "no reason"),
        }
    }
}

struct DisplayFrame<'a>(Option<&'a StackFrame>);

impl fmt::Display for DisplayFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(frame) => write!(f, " at {frame}"),
            None => Ok(()),
        }
    }
}

struct DisplayMissingSelector<'a>(Option<&'a str>);

impl fmt::Display for DisplayMissingSelector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(app_name) => write!(f, "application `{app_name}` has no selector variable"),
            None => write!(f, "test has no application config"),
        }
    }
}

/// An error that occurred while writing an application image to the target.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LoadImageError {
    /// The target couldn't be halted before programming.
    #[error("failed to halt target before programming")]
    Quiesce(#[source] TargetError),

    /// A flash write failed.
    #[error("failed to program {segment} `{path}` at offset {offset:#x}")]
    ProgrammingFailure {
        /// The segment being written.
        segment: FlashSegment,

        /// The binary being written.
        path: Utf8PathBuf,

        /// The flash offset.
        offset: u32,

        /// The underlying error.
        #[source]
        source: TargetError,
    },

    /// The target couldn't be reset after programming.
    #[error("failed to reset target after programming")]
    Reset(#[source] TargetError),

    /// A partition-table or bootloader path was required but not configured.
    #[error("application `{app_name}` has no {segment} path configured")]
    MissingSegmentPath {
        /// The application being loaded.
        app_name: String,

        /// The segment without a path.
        segment: FlashSegment,
    },

    /// Symbols couldn't be loaded from the application's ELF file.
    #[error("failed to load symbols from `{path}`")]
    SymbolFile {
        /// The ELF file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        source: TargetError,
    },
}

/// The reason a test (or its setup) didn't pass.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TestFailure {
    /// A check made by the test failed.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// The per-test bringup sequence failed.
    #[error("test setup failed")]
    Bringup(#[from] BringupError),

    /// The group's image couldn't be loaded, so the test wasn't run.
    #[error("application image was not loaded")]
    ImageLoad(#[from] LoadImageError),

    /// A bounded wait made by the test itself expired.
    #[error(transparent)]
    Timeout(#[from] TargetTimeout),

    /// A single step stopped for some other reason.
    #[error("expected step to complete, but target stopped with {}", DisplayStopReason(.actual.as_ref()))]
    UnexpectedStep {
        /// The reason reported by the debugger.
        actual: Option<StopReason>,
    },

    /// A sub-test was requested for an application without a selector variable.
    #[error("cannot select sub-test {sub_test}: {}", DisplayMissingSelector(.app_name.as_deref()))]
    NoSubTestSelector {
        /// The application, if the test has one.
        app_name: Option<String>,

        /// The requested sub-test.
        sub_test: u32,
    },

    /// Any other debugger error.
    #[error("debugger error")]
    Target(#[source] TargetError),
}

impl From<TargetError> for TestFailure {
    fn from(error: TargetError) -> Self {
        match error {
            TargetError::Timeout(timeout) => Self::Timeout(timeout),
            other => Self::Target(other),
        }
    }
}

impl TestFailure {
    /// Returns true if this is a test failure, as opposed to an error in the harness or target.
    ///
    /// Verification failures (assertions, unexpected stop reasons) are failures. Timeouts,
    /// programming failures and debugger errors are errors.
    pub fn is_failure(&self) -> bool {
        match self {
            Self::Assertion(_) | Self::UnexpectedStep { .. } => true,
            Self::Bringup(error) => error.is_assertion(),
            Self::ImageLoad(_)
            | Self::Timeout(_)
            | Self::NoSubTestSelector { .. }
            | Self::Target(_) => false,
        }
    }
}

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse harness config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &camino::Utf8Path {
        &self.config_file
    }
}

/// An error which indicates that a profile was requested but not known.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurs while parsing a [`MaxFail`](crate::config::MaxFail) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for max-fail: {reason}")]
pub struct MaxFailParseError {
    reason: String,
}

impl MaxFailParseError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\n  caused by:")?;
        }
        while let Some(error) = source {
            write!(f, "\n  - {error}")?;
            source = error.source();
        }
        Ok(())
    }
}
