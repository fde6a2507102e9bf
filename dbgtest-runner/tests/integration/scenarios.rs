// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use color_eyre::eyre::{Result, ensure};
use dbgtest_runner::{
    config::MaxFail,
    list::{TestSuite, TestTree},
    reporter::TestStatus,
    target::{
        StopReason, TargetAddress,
        sim::{SimulatedStop, SimulatedTarget, TargetCall},
    },
};
use pretty_assertions::assert_eq;

#[test]
fn shared_images_are_loaded_once() -> Result<()> {
    test_init();
    let x = image_x();
    let y = image_y();

    let mut target = SimulatedTarget::new();
    let tree: TestTree = [
        passing("test_a", Some(&x)),
        passing("test_b", Some(&x)),
        passing("test_c", Some(&y)),
    ]
    .into_iter()
    .collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    assert_eq!(
        statuses(&result),
        [
            ("test_a", TestStatus::Pass),
            ("test_b", TestStatus::Pass),
            ("test_c", TestStatus::Pass),
        ]
    );
    assert_eq!(loaded_apps(&target), [app_bin(&x), app_bin(&y)]);
    assert_eq!(
        target.breakpoint_count(),
        0,
        "no breakpoint left behind after bringup"
    );
    ensure!(result.run_stats().is_success(), "run succeeded");
    Ok(())
}

#[test]
fn nested_suites_share_groups() -> Result<()> {
    test_init();
    let x = image_x();
    let y = image_y();

    let mut inner = TestSuite::new("inner");
    inner
        .add(passing("inner_x", Some(&x)))
        .add(passing("inner_plain", None));
    let mut outer = TestSuite::new("outer");
    outer.add(passing("outer_y", Some(&y))).add(inner);

    let mut tree = TestTree::new();
    tree.add(passing("first_x", Some(&x)))
        .add(outer)
        .add(passing("last_plain", None));

    let mut target = SimulatedTarget::new();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    let order: Vec<_> = statuses(&result).into_iter().map(|(name, _)| name).collect();
    assert_eq!(
        order,
        ["first_x", "inner_x", "outer_y", "inner_plain", "last_plain"]
    );
    assert_eq!(loaded_apps(&target), [app_bin(&x), app_bin(&y)]);
    Ok(())
}

#[test]
fn fully_disabled_group_is_not_loaded() -> Result<()> {
    test_init();
    let x = image_x();

    let mut target = SimulatedTarget::new();
    let tree: TestTree = [
        passing("test_a", Some(&x)).disabled("needs a second board"),
        passing("test_b", Some(&x)).disabled("needs a second board"),
    ]
    .into_iter()
    .collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    assert_eq!(
        statuses(&result),
        [("test_a", TestStatus::Skip), ("test_b", TestStatus::Skip)]
    );
    assert!(
        target.calls().is_empty(),
        "target untouched, got: {:?}",
        target.calls()
    );
    assert_eq!(result.run_stats().skipped, 2);
    Ok(())
}

#[test]
fn partially_disabled_group_is_loaded() -> Result<()> {
    test_init();
    let x = image_x();

    let mut target = SimulatedTarget::new();
    let tree: TestTree = [
        passing("test_a", Some(&x)).disabled("flaky"),
        passing("test_b", Some(&x)),
    ]
    .into_iter()
    .collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    assert_eq!(
        statuses(&result),
        [("test_a", TestStatus::Skip), ("test_b", TestStatus::Pass)]
    );
    assert_eq!(loaded_apps(&target), [app_bin(&x)]);
    assert_eq!(
        target.count_calls(|call| matches!(call, TargetCall::AddBreakpoint(_))),
        1,
        "only the enabled test is brought up"
    );
    Ok(())
}

#[test]
fn spurious_trap_is_recovered() -> Result<()> {
    test_init();
    let x = image_x();

    let mut target = SimulatedTarget::new();
    target.push_stop(SimulatedStop::new(
        StopReason::Trap,
        TargetAddress(0x4000_0450),
    ));
    let tree: TestTree = [passing("test_a", Some(&x))].into_iter().collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    assert_eq!(statuses(&result), [("test_a", TestStatus::Pass)]);
    assert_eq!(
        target.count_calls(|call| matches!(call, TargetCall::ExecContinue)),
        2,
        "run-to-entry retried exactly once"
    );
    Ok(())
}

#[test]
fn second_anomaly_fails_the_test() -> Result<()> {
    test_init();
    let x = image_x();

    let mut target = SimulatedTarget::new();
    target.push_stop(SimulatedStop::new(
        StopReason::Trap,
        TargetAddress(0x4000_0450),
    ));
    target.push_stop(SimulatedStop::new(
        StopReason::Interrupt,
        TargetAddress(0x4000_921a),
    ));
    let tree: TestTree = [passing("test_a", Some(&x)), passing("test_b", Some(&x))]
        .into_iter()
        .collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    // The second test's bringup is independent of the first's failure.
    assert_eq!(
        statuses(&result),
        [("test_a", TestStatus::Fail), ("test_b", TestStatus::Pass)]
    );
    let message = result.records()[0]
        .description
        .as_deref()
        .unwrap_or_default();
    ensure!(
        message.contains("signal-received (SIGINT)"),
        "failure names the second stop reason: {message}"
    );
    Ok(())
}

#[test]
fn hung_reset_errors_the_group_and_the_run_continues() -> Result<()> {
    test_init();
    let x = image_x();
    let y = image_y();

    let mut target = SimulatedTarget::new();
    // The reset after loading X and the reset in each of X's two setups never settle.
    target.hang_next_resets(3);
    let tree: TestTree = [
        passing("test_x1", Some(&x)),
        passing("test_x2", Some(&x)),
        passing("test_y", Some(&y)),
    ]
    .into_iter()
    .collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    assert_eq!(
        statuses(&result),
        [
            ("test_x1", TestStatus::Error),
            ("test_x2", TestStatus::Error),
            ("test_y", TestStatus::Pass),
        ]
    );
    for record in &result.records()[..2] {
        let description = record.description.as_deref().unwrap_or_default();
        ensure!(
            description.contains("bringup step `reset` timed out"),
            "{}: {description}",
            record.name
        );
        ensure!(
            description.contains("timed out after 10s") && description.contains("unknown"),
            "{}: timeout reports bound and last state: {description}",
            record.name
        );
    }
    assert_eq!(loaded_apps(&target), [app_bin(&x), app_bin(&y)]);

    let stats = result.run_stats();
    assert_eq!((stats.passed, stats.errored), (1, 2));
    ensure!(!stats.is_success(), "errored tests fail the run");
    Ok(())
}

#[test]
fn fail_fast_skips_remaining_groups() -> Result<()> {
    test_init();
    let x = image_x();
    let y = image_y();

    let mut target = SimulatedTarget::new();
    target.hang_next_resets(2);
    let tree: TestTree = [
        passing("test_x1", Some(&x)),
        passing("test_x2", Some(&x)),
        passing("test_y", Some(&y)),
    ]
    .into_iter()
    .collect();
    let result = run_default(&mut target, tree, MaxFail::Count(1))?;

    assert_eq!(statuses(&result), [("test_x1", TestStatus::Error)]);
    assert_eq!(loaded_apps(&target), [app_bin(&x)], "Y never loaded");
    let stats = result.run_stats();
    assert_eq!((stats.initial_run_count, stats.final_run_count), (3, 1));
    Ok(())
}
