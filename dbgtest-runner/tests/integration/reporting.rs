// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino_tempfile::tempdir;
use color_eyre::eyre::{Result, ensure};
use dbgtest_runner::{
    config::MaxFail,
    errors::AssertionFailure,
    grouping::GroupKey,
    list::{TestCase, TestTree},
    target::sim::SimulatedTarget,
};
use pretty_assertions::assert_eq;
use std::fs::File;

#[test]
fn junit_report_has_a_suite_per_group() -> Result<()> {
    test_init();
    let x = image_x();
    let y = image_y();

    let mut target = SimulatedTarget::new();
    let tree: TestTree = [
        passing("test_a", Some(&x)),
        TestCase::new("test_b", |_| {
            Err(AssertionFailure::new("core id", 1, 0).into())
        })
        .with_app_config(x.clone()),
        passing("test_c", Some(&y)).disabled("single-core board unavailable"),
        passing("test_d", None),
    ]
    .into_iter()
    .collect();
    let result = run_default(&mut target, tree, MaxFail::All)?;

    let report = result.to_junit("dbgtest");
    assert_eq!(report.tests, 4);
    assert_eq!(report.failures, 1);
    assert_eq!(report.errors, 0);

    let suites: Vec<_> = report
        .test_suites
        .iter()
        .map(|suite| (suite.name.as_str().to_owned(), suite.tests))
        .collect();
    assert_eq!(
        suites,
        [
            (GroupKey::for_config(Some(&x)).to_string(), 2),
            (GroupKey::for_config(Some(&y)).to_string(), 1),
            ("@no-image".to_owned(), 1),
        ]
    );

    let dir = tempdir()?;
    let junit_path = dir.path().join("junit.xml");
    report.serialize(File::create(&junit_path)?)?;
    let xml = std::fs::read_to_string(&junit_path)?;
    ensure!(
        xml.contains("assertion failed: core id: expected 1, got 0"),
        "failure message is in the report:\n{xml}"
    );
    Ok(())
}
