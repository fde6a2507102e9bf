// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`].

use crate::{
    app_config::AppImageConfig,
    bringup::TargetBringup,
    config::HarnessProfile,
    errors::{DisplayErrorChain, LoadImageError, TestFailure},
    grouping::{GroupKey, TestGroup, TestGroups},
    list::{TestBody, TestCase, TestContext, TestTree},
    reporter::{RunStats, TestRecord, TestResult},
    stopwatch::stopwatch,
    target::TargetController,
};
use camino::Utf8PathBuf;
use tracing::{debug, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    load_app_bins: Option<bool>,
    bringup: Option<TargetBringup>,
}

impl TestRunnerBuilder {
    /// Sets whether application images are written to flash before each group.
    ///
    /// When disabled, the target is assumed to already hold the right image; symbols are still
    /// attached per group.
    pub fn set_load_app_bins(&mut self, load_app_bins: bool) -> &mut Self {
        self.load_app_bins = Some(load_app_bins);
        self
    }

    /// Overrides the bringup sequence derived from the profile.
    pub fn set_bringup(&mut self, bringup: TargetBringup) -> &mut Self {
        self.bringup = Some(bringup);
        self
    }

    /// Creates a new test runner driving `target`.
    pub fn build<'a>(
        self,
        target: &'a mut dyn TargetController,
        profile: &HarnessProfile<'_>,
    ) -> TestRunner<'a> {
        let load_app_bins = self
            .load_app_bins
            .unwrap_or_else(|| profile.load_app_bins());
        let bringup = self
            .bringup
            .unwrap_or_else(|| TargetBringup::from_profile(profile));

        TestRunner {
            target,
            bringup,
            load_app_bins,
            last_elf: None,
        }
    }
}

/// Runs a tree of tests group by group against a single target.
///
/// Created with [`TestRunnerBuilder`].
pub struct TestRunner<'a> {
    target: &'a mut dyn TargetController,
    bringup: TargetBringup,
    load_app_bins: bool,
    // The symbol file most recently attached. Groups without an image keep using it.
    last_elf: Option<Utf8PathBuf>,
}

impl TestRunner<'_> {
    /// Returns the bringup sequence used before each test.
    pub fn bringup(&self) -> &TargetBringup {
        &self.bringup
    }

    /// Runs every test in `tree`, recording outcomes in `result`.
    ///
    /// Tests are grouped by image with [`TestGroups::group`] and groups run in order of first
    /// appearance. Failures never abort the run on their own: they are recorded against the
    /// affected tests. The run stops early only when [`TestResult::should_stop`] returns true,
    /// which is checked before every group and every test.
    pub fn run(&mut self, tree: TestTree, result: &mut TestResult) -> RunStats {
        let groups = TestGroups::group(tree);
        debug!(
            "running {} tests in {} groups",
            groups.test_count(),
            groups.len()
        );
        result.run_started(groups.test_count());

        for group in groups {
            if result.should_stop() {
                debug!("stop requested, not running remaining groups");
                break;
            }
            self.run_group(group, result);
        }

        result.run_stats()
    }

    // ---
    // Helper methods
    // ---

    fn run_group(&mut self, group: TestGroup, result: &mut TestResult) {
        let fully_skipped = group.is_fully_skipped();
        let (key, tests) = group.into_parts();

        if fully_skipped {
            debug!("skip loading `{key}` for {} tests", tests.len());
        } else {
            debug!("load `{key}` for {} tests", tests.len());
            if let Err(error) = self.prepare_group(key.app_config().map(|config| &**config)) {
                warn!(
                    "failed to prepare group `{key}`: {}",
                    DisplayErrorChain::new(&error)
                );
                let failure = TestFailure::ImageLoad(error);
                for test in tests {
                    if result.should_stop() {
                        break;
                    }
                    let record = match test.skip_reason() {
                        Some(reason) => TestRecord::skip(test.name(), key.clone(), reason),
                        None => TestRecord::failed(test.name(), key.clone(), &failure),
                    };
                    result.record(record);
                }
                return;
            }
        }

        for test in tests {
            if result.should_stop() {
                break;
            }
            self.run_test(&key, test, result);
        }
    }

    fn prepare_group(&mut self, app_config: Option<&AppImageConfig>) -> Result<(), LoadImageError> {
        if let Some(config) = app_config {
            if self.load_app_bins {
                self.bringup.load_image(&mut *self.target, config)?;
            }
            self.last_elf = Some(config.app_elf_path(self.bringup.apps_dir()));
        }

        if let Some(elf) = &self.last_elf {
            self.bringup.attach_symbols(&mut *self.target, elf)?;
        }
        Ok(())
    }

    fn run_test(&mut self, key: &GroupKey, test: TestCase, result: &mut TestResult) {
        if let Some(reason) = test.skip_reason() {
            debug!("SKIP {}: {reason}", test.name());
            result.record(TestRecord::skip(test.name(), key.clone(), reason));
            return;
        }

        let name = test.name().to_owned();
        let sub_test = test.sub_test();
        let app_config = test.app_config().cloned();
        debug!("<<<<<<<<< START {name} >>>>>>>>>");

        let stopwatch = stopwatch();
        let outcome = self.execute(&name, app_config.as_deref(), sub_test, test.into_body());
        let record = match outcome {
            Ok(()) => TestRecord::pass(&name, key.clone()),
            Err(failure) => TestRecord::failed(&name, key.clone(), &failure),
        }
        .with_timing(stopwatch.snapshot());

        debug!("========= END {name}: {} =========", record.status);
        result.record(record);
    }

    fn execute(
        &mut self,
        name: &str,
        app_config: Option<&AppImageConfig>,
        sub_test: Option<u32>,
        body: TestBody,
    ) -> Result<(), TestFailure> {
        // Tests that need an image start from the entry symbol.
        if app_config.is_some() {
            self.bringup.setup(&mut *self.target, None)?;
        }

        let timeouts = *self.bringup.timeouts();
        let mut cx = TestContext::new(name, app_config, &mut *self.target, &timeouts);
        if let Some(sub_test) = sub_test {
            cx.select_sub_test(sub_test)?;
        }
        body(&mut cx)
    }
}
