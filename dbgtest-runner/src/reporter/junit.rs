// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{TestRecord, TestStatus};
use crate::{grouping::GroupKey, stopwatch::StopwatchSnapshot};
use indexmap::IndexMap;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};

/// The suite name used for tests that don't need a firmware image.
static NO_IMAGE_SUITE: &str = "@no-image";

pub(super) fn build_report(
    report_name: &str,
    snapshot: StopwatchSnapshot,
    records: &[TestRecord],
) -> Report {
    let mut test_suites: IndexMap<&GroupKey, TestSuite> = IndexMap::new();
    for record in records {
        let test_suite = test_suites
            .entry(&record.group)
            .or_insert_with(|| TestSuite::new(suite_name(&record.group)));

        let mut testcase = TestCase::new(record.name.as_str(), testcase_status(record));
        testcase
            .set_classname(test_suite.name.clone())
            .set_timestamp(record.start_time)
            .set_time(record.duration);
        test_suite.add_test_case(testcase);
    }

    let mut report = Report::new(report_name);
    report
        .set_timestamp(snapshot.start_time)
        .set_time(snapshot.duration)
        .add_test_suites(test_suites.into_values());
    report
}

fn suite_name(key: &GroupKey) -> String {
    match key {
        GroupKey::NoConfig => NO_IMAGE_SUITE.to_owned(),
        GroupKey::Config(config) => config.id().to_string(),
    }
}

fn testcase_status(record: &TestRecord) -> TestCaseStatus {
    let mut status = match record.status {
        TestStatus::Pass => return TestCaseStatus::success(),
        TestStatus::Skip => TestCaseStatus::skipped(),
        TestStatus::Fail => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
            status.set_type("test failure");
            status
        }
        TestStatus::Error => {
            let mut status = TestCaseStatus::non_success(NonSuccessKind::Error);
            status.set_type("harness error");
            status
        }
    };
    if let Some(message) = &record.message {
        status.set_message(message.as_str());
    }
    if let Some(description) = &record.description {
        status.set_description(description.as_str());
    }
    status
}
