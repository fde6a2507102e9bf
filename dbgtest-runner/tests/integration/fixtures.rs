// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8Path;
use color_eyre::eyre::Result;
use dbgtest_runner::{
    app_config::{APP_FLASH_OFFSET, AppImageConfig, FlashSegment},
    config::{HarnessConfig, MaxFail},
    list::{TestCase, TestTree},
    reporter::{TestResult, TestStatus},
    runner::TestRunnerBuilder,
    target::sim::{SimulatedTarget, TargetCall},
};
use std::sync::Arc;

pub(crate) static APPS_DIR: &str = "/opt/test-apps";

pub(crate) fn test_init() {
    // Installing twice fails; the first install wins.
    let _ = color_eyre::install();
}

/// The dual-core generic test app.
pub(crate) fn image_x() -> Arc<AppImageConfig> {
    Arc::new(AppImageConfig::gen_ut_app_dual())
}

/// The single-core generic test app.
pub(crate) fn image_y() -> Arc<AppImageConfig> {
    Arc::new(AppImageConfig::gen_ut_app_single())
}

pub(crate) fn passing(name: &str, image: Option<&Arc<AppImageConfig>>) -> TestCase {
    let test = TestCase::new(name, |cx| {
        // Every test that needs an image starts stopped at the entry symbol.
        if cx.app_config().is_some() {
            let frame = cx.target().current_frame()?;
            assert_eq!(frame.function.as_deref(), Some("app_main"));
        }
        Ok(())
    });
    match image {
        Some(image) => test.with_app_config(image.clone()),
        None => test,
    }
}

/// Runs `tree` with the default profile rooted at [`APPS_DIR`].
pub(crate) fn run_default(
    target: &mut SimulatedTarget,
    tree: TestTree,
    max_fail: MaxFail,
) -> Result<TestResult> {
    let config = HarnessConfig::default_config(APPS_DIR);
    let profile = config.profile(HarnessConfig::DEFAULT_PROFILE)?;
    let mut result = TestResult::new(max_fail);
    TestRunnerBuilder::default()
        .build(target, &profile)
        .run(tree, &mut result);
    Ok(result)
}

pub(crate) fn statuses(result: &TestResult) -> Vec<(&str, TestStatus)> {
    result
        .records()
        .iter()
        .map(|record| (record.name.as_str(), record.status))
        .collect()
}

/// The application binaries written to flash, in order. One per image load.
pub(crate) fn loaded_apps(target: &SimulatedTarget) -> Vec<String> {
    target
        .calls()
        .iter()
        .filter_map(|call| match call {
            TargetCall::TargetProgram(path, offset)
                if *offset == APP_FLASH_OFFSET =>
            {
                Some(path.to_string())
            }
            _ => None,
        })
        .collect()
}

pub(crate) fn app_bin(image: &AppImageConfig) -> String {
    image
        .segment_path(Utf8Path::new(APPS_DIR), FlashSegment::Application)
        .map(|path| path.to_string())
        .unwrap_or_default()
}
