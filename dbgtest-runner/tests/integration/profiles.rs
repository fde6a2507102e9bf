// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use camino_tempfile::{Utf8TempDir, tempdir};
use color_eyre::eyre::{Result, ensure};
use dbgtest_runner::{
    config::HarnessConfig,
    list::{TestCase, TestTree},
    reporter::{TestResult, TestStatus},
    runner::TestRunnerBuilder,
    target::{TargetAddress, sim::SimulatedTarget},
};
use indoc::indoc;
use pretty_assertions::assert_eq;

fn workspace_with_config(contents: &str) -> Result<Utf8TempDir> {
    let dir = tempdir()?;
    let config_dir = dir.path().join(".config");
    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(config_dir.join("dbgtest.toml"), contents)?;
    Ok(dir)
}

static CONFIG_CONTENTS: &str = indoc! {r#"
    [profile.default]
    test-apps-dir = "test-apps"

    [profile.ci]
    load-app-bins = false
    fail-fast = true

    [profile.ci.timeouts]
    reset = "3s"

    [profile.bringup-board]
    entry-symbol = "board_main"
    spurious-trap-address = 0x40000460
"#};

#[test]
fn ci_profile_stops_on_first_error() -> Result<()> {
    test_init();
    let dir = workspace_with_config(CONFIG_CONTENTS)?;
    let config = HarnessConfig::from_sources(dir.path(), None)?;
    let profile = config.profile("ci")?;

    let x = image_x();
    let mut target = SimulatedTarget::new();
    target.hang_next_resets(1);
    let tree: TestTree = [passing("test_a", Some(&x)), passing("test_b", Some(&x))]
        .into_iter()
        .collect();

    let mut result = TestResult::new(profile.max_fail());
    let stats = TestRunnerBuilder::default()
        .build(&mut target, &profile)
        .run(tree, &mut result);

    assert_eq!(statuses(&result), [("test_a", TestStatus::Error)]);
    assert_eq!((stats.initial_run_count, stats.final_run_count), (2, 1));
    ensure!(
        target.programmed().is_empty(),
        "images aren't loaded with load-app-bins = false"
    );
    assert_eq!(
        target.symbol_file(),
        Some(
            x.app_elf_path(&dir.path().join("test-apps"))
                .as_path()
        ),
        "symbols are attached from the configured apps dir"
    );

    let description = result.records()[0].description.as_deref().unwrap_or_default();
    ensure!(
        description.contains("timed out after 3s"),
        "profile reset timeout is used: {description}"
    );
    Ok(())
}

#[test]
fn profile_entry_symbol_and_trap_address() -> Result<()> {
    test_init();
    let dir = workspace_with_config(CONFIG_CONTENTS)?;
    let config = HarnessConfig::from_sources(dir.path(), None)?;
    let profile = config.profile("bringup-board")?;
    assert_eq!(profile.entry_symbol(), "board_main");
    assert_eq!(profile.spurious_trap_address(), TargetAddress(0x4000_0460));

    let x = image_x();
    let mut target = SimulatedTarget::new();
    let tree: TestTree = [TestCase::new("board", |cx| {
        let frame = cx.target().current_frame()?;
        assert_eq!(frame.function.as_deref(), Some("board_main"));
        Ok(())
    })
    .with_app_config(x.clone())]
    .into_iter()
    .collect();

    let mut result = TestResult::new(profile.max_fail());
    TestRunnerBuilder::default()
        .build(&mut target, &profile)
        .run(tree, &mut result);

    assert_eq!(statuses(&result), [("board", TestStatus::Pass)]);
    let bins_dir = x.bins_dir(&dir.path().join("test-apps"));
    let programmed = target
        .programmed()
        .iter()
        .map(|(path, _)| path.strip_prefix(&bins_dir).map(Utf8Path::as_str))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(
        programmed,
        [
            "bootloader/bootloader.bin",
            "partitions_singleapp.bin",
            "gen_ut_app.bin"
        ]
    );
    Ok(())
}

#[test]
fn unknown_profile_lists_known_ones() -> Result<()> {
    test_init();
    let dir = workspace_with_config(CONFIG_CONTENTS)?;
    let config = HarnessConfig::from_sources(dir.path(), None)?;
    let error = match config.profile("nightly") {
        Ok(_) => color_eyre::eyre::bail!("nightly profile should not exist"),
        Err(error) => error,
    };
    assert_eq!(
        error.to_string(),
        "profile `nightly` not found (known profiles: bringup-board, ci, default)"
    );
    Ok(())
}
