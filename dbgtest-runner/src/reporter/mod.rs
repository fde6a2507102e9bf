// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collecting test results.
//!
//! A [`TestResult`] records the outcome of every test in a run, keeps [`RunStats`] up to date, and
//! decides when the run should stop early. It can be exported as a JUnit report with
//! [`TestResult::to_junit`].

mod junit;

use crate::{
    config::MaxFail,
    errors::{DisplayErrorChain, TestFailure},
    grouping::GroupKey,
    stopwatch::{StopwatchSnapshot, StopwatchStart, stopwatch},
};
use chrono::{DateTime, Local};
use quick_junit::Report;
use std::{fmt, time::Duration};

/// The outcome of a single test.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TestStatus {
    /// The test passed.
    Pass,

    /// A check made by the test, or a verification during its setup, failed.
    Fail,

    /// The test couldn't be run to completion: a timeout, a debugger error, or a failed image load.
    Error,

    /// The test was disabled.
    Skip,
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Error => write!(f, "ERROR"),
            Self::Skip => write!(f, "SKIP"),
        }
    }
}

/// The recorded result of a single test.
#[derive(Clone, Debug)]
pub struct TestRecord {
    /// The name of the test.
    pub name: String,

    /// The group the test ran in.
    pub group: GroupKey,

    /// The outcome.
    pub status: TestStatus,

    /// A one-line description of why the test didn't pass, or the skip reason.
    pub message: Option<String>,

    /// The full error chain for failed and errored tests.
    pub description: Option<String>,

    /// When the test started.
    pub start_time: DateTime<Local>,

    /// How long the test took, including its setup.
    pub duration: Duration,
}

impl TestRecord {
    /// Creates a record for a test that passed.
    pub fn pass(name: impl Into<String>, group: GroupKey) -> Self {
        Self::new(name, group, TestStatus::Pass)
    }

    /// Creates a record for a test that was skipped.
    pub fn skip(name: impl Into<String>, group: GroupKey, reason: impl Into<String>) -> Self {
        let mut record = Self::new(name, group, TestStatus::Skip);
        record.message = Some(reason.into());
        record
    }

    /// Creates a record for a test that didn't pass, classifying `failure` as a failure or an
    /// error.
    pub fn failed(name: impl Into<String>, group: GroupKey, failure: &TestFailure) -> Self {
        let status = if failure.is_failure() {
            TestStatus::Fail
        } else {
            TestStatus::Error
        };
        let mut record = Self::new(name, group, status);
        record.message = Some(failure.to_string());
        record.description = Some(DisplayErrorChain::new(failure).to_string());
        record
    }

    fn new(name: impl Into<String>, group: GroupKey, status: TestStatus) -> Self {
        Self {
            name: name.into(),
            group,
            status,
            message: None,
            description: None,
            start_time: Local::now(),
            duration: Duration::ZERO,
        }
    }

    pub(crate) fn with_timing(mut self, snapshot: StopwatchSnapshot) -> Self {
        self.start_time = snapshot.start_time;
        self.duration = snapshot.duration;
        self
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the beginning.
    ///
    /// If the test run is stopped early, this will be more than `final_run_count`.
    pub initial_run_count: usize,

    /// The total number of tests that were recorded, including skipped ones.
    pub final_run_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that errored.
    pub errored: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run can be marked as failed if any of the following are true:
    /// * the run was stopped early: the initial run count is greater than the final run count
    /// * any tests failed
    /// * any tests errored
    pub fn is_success(&self) -> bool {
        if self.initial_run_count > self.final_run_count {
            return false;
        }
        if self.failed > 0 || self.errored > 0 {
            return false;
        }
        true
    }

    fn on_test_finished(&mut self, status: TestStatus) {
        self.final_run_count += 1;
        match status {
            TestStatus::Pass => self.passed += 1,
            TestStatus::Fail => self.failed += 1,
            TestStatus::Error => self.errored += 1,
            TestStatus::Skip => self.skipped += 1,
        }
    }
}

/// Collects the results of a run.
#[derive(Clone, Debug)]
pub struct TestResult {
    max_fail: MaxFail,
    stop_requested: bool,
    run_stats: RunStats,
    records: Vec<TestRecord>,
    stopwatch: StopwatchStart,
}

impl TestResult {
    /// Creates a new collector that asks for the run to stop once `max_fail` is exceeded.
    pub fn new(max_fail: MaxFail) -> Self {
        Self {
            max_fail,
            stop_requested: false,
            run_stats: RunStats::default(),
            records: Vec::new(),
            stopwatch: stopwatch(),
        }
    }

    /// Adds `count` tests to the number expected to run.
    pub fn run_started(&mut self, count: usize) {
        self.run_stats.initial_run_count += count;
    }

    /// Records the result of a test.
    pub fn record(&mut self, record: TestRecord) {
        self.run_stats.on_test_finished(record.status);
        self.records.push(record);
    }

    /// Asks for the run to stop before the next test.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Returns true if the run should stop: either [`stop`](Self::stop) was called, or enough
    /// tests have failed or errored to exceed the max-fail limit.
    pub fn should_stop(&self) -> bool {
        self.stop_requested
            || self
                .max_fail
                .is_exceeded(self.run_stats.failed + self.run_stats.errored)
    }

    /// Returns the statistics for the run so far.
    pub fn run_stats(&self) -> RunStats {
        self.run_stats
    }

    /// Returns the recorded results, in the order tests finished.
    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Returns the records for the tests with the given status.
    pub fn records_with_status(&self, status: TestStatus) -> impl Iterator<Item = &TestRecord> {
        self.records
            .iter()
            .filter(move |record| record.status == status)
    }

    /// Builds a JUnit report for the run, with one test suite per group.
    pub fn to_junit(&self, report_name: &str) -> Report {
        let snapshot = self.stopwatch.snapshot();
        junit::build_report(report_name, snapshot, &self.records)
    }
}
