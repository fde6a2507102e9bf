// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test cases and the trees they're organized into.
//!
//! A [`TestTree`] is what test discovery hands to the runner. It may contain nested
//! [`TestSuite`]s; grouping walks them depth-first. Each leaf is a [`TestCase`]: a name, an
//! optional [`AppImageConfig`] naming the firmware it needs, and a body that runs with a
//! [`TestContext`] once the target has been brought up.

use crate::{
    app_config::AppImageConfig,
    config::BringupTimeouts,
    errors::TestFailure,
    target::{TargetAddress, TargetController, exec::ExecControl},
};
use std::{fmt, sync::Arc};
use tracing::debug;

/// The body of a test.
pub type TestBody = Box<dyn FnOnce(&mut TestContext<'_>) -> Result<(), TestFailure>>;

/// A single test.
pub struct TestCase {
    name: String,
    app_config: Option<Arc<AppImageConfig>>,
    sub_test: Option<u32>,
    skip_reason: Option<String>,
    body: TestBody,
}

impl TestCase {
    /// Creates a new test case that doesn't need a firmware image.
    pub fn new(
        name: impl Into<String>,
        body: impl FnOnce(&mut TestContext<'_>) -> Result<(), TestFailure> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            app_config: None,
            sub_test: None,
            skip_reason: None,
            body: Box::new(body),
        }
    }

    /// Sets the firmware image this test runs against.
    ///
    /// Tests sharing an image should share the `Arc`, though configs that compare equal are
    /// grouped together either way.
    pub fn with_app_config(mut self, app_config: Arc<AppImageConfig>) -> Self {
        self.app_config = Some(app_config);
        self
    }

    /// Selects a sub-test within a multi-scenario image. The selection is written to the image's
    /// selector variable after setup, before the body runs.
    pub fn with_sub_test(mut self, sub_test: u32) -> Self {
        self.sub_test = Some(sub_test);
        self
    }

    /// Disables this test. Disabled tests are reported as skipped and don't touch the target.
    pub fn disabled(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    /// The name of the test.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The firmware image this test needs, if any.
    pub fn app_config(&self) -> Option<&Arc<AppImageConfig>> {
        self.app_config.as_ref()
    }

    /// The sub-test to select, if any.
    pub fn sub_test(&self) -> Option<u32> {
        self.sub_test
    }

    /// The reason this test is disabled, if it is.
    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    /// Returns true if this test is disabled.
    pub fn is_disabled(&self) -> bool {
        self.skip_reason.is_some()
    }

    pub(crate) fn into_body(self) -> TestBody {
        self.body
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("app_config", &self.app_config)
            .field("sub_test", &self.sub_test)
            .field("skip_reason", &self.skip_reason)
            .finish_non_exhaustive()
    }
}

/// A named collection of tests and nested suites.
#[derive(Debug)]
pub struct TestSuite {
    name: String,
    nodes: Vec<TestNode>,
}

impl TestSuite {
    /// Creates a new, empty suite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }

    /// Adds a test or nested suite to the end of this suite.
    pub fn add(&mut self, node: impl Into<TestNode>) -> &mut Self {
        self.nodes.push(node.into());
        self
    }

    /// The name of the suite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The direct children of this suite.
    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    /// Returns the number of test cases in this suite, including nested suites.
    pub fn test_count(&self) -> usize {
        count_tests(&self.nodes)
    }

    pub(crate) fn into_nodes(self) -> Vec<TestNode> {
        self.nodes
    }
}

/// An item in a test tree.
#[derive(Debug)]
pub enum TestNode {
    /// A single test.
    Case(TestCase),

    /// A nested suite.
    Suite(TestSuite),
}

impl From<TestCase> for TestNode {
    fn from(case: TestCase) -> Self {
        Self::Case(case)
    }
}

impl From<TestSuite> for TestNode {
    fn from(suite: TestSuite) -> Self {
        Self::Suite(suite)
    }
}

/// The root of a test tree, as produced by test discovery.
#[derive(Debug, Default)]
pub struct TestTree {
    nodes: Vec<TestNode>,
}

impl TestTree {
    /// Creates a new, empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a test or suite to the end of the tree.
    pub fn add(&mut self, node: impl Into<TestNode>) -> &mut Self {
        self.nodes.push(node.into());
        self
    }

    /// Appends the contents of another tree in place, without nesting it.
    pub fn append(&mut self, other: TestTree) -> &mut Self {
        debug!("appending {} tests", other.test_count());
        self.nodes.extend(other.nodes);
        self
    }

    /// The top-level items of the tree.
    pub fn nodes(&self) -> &[TestNode] {
        &self.nodes
    }

    /// Returns the number of test cases in the tree, including nested suites.
    pub fn test_count(&self) -> usize {
        count_tests(&self.nodes)
    }

    /// Returns true if the tree has no test cases.
    pub fn is_empty(&self) -> bool {
        self.test_count() == 0
    }

    pub(crate) fn into_nodes(self) -> Vec<TestNode> {
        self.nodes
    }
}

impl<N: Into<TestNode>> FromIterator<N> for TestTree {
    fn from_iter<I: IntoIterator<Item = N>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<N: Into<TestNode>> Extend<N> for TestTree {
    fn extend<I: IntoIterator<Item = N>>(&mut self, iter: I) {
        self.nodes.extend(iter.into_iter().map(Into::into));
    }
}

fn count_tests(nodes: &[TestNode]) -> usize {
    nodes
        .iter()
        .map(|node| match node {
            TestNode::Case(_) => 1,
            TestNode::Suite(suite) => suite.test_count(),
        })
        .sum()
}

/// What a test body gets to work with: the target, stopped at the entry symbol, and helpers to
/// drive it.
pub struct TestContext<'a> {
    name: &'a str,
    app_config: Option<&'a AppImageConfig>,
    exec: ExecControl<'a>,
}

impl<'a> TestContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        app_config: Option<&'a AppImageConfig>,
        target: &'a mut dyn TargetController,
        timeouts: &'a BringupTimeouts,
    ) -> Self {
        Self {
            name,
            app_config,
            exec: ExecControl::new(target, timeouts),
        }
    }

    /// The name of the running test.
    pub fn name(&self) -> &str {
        self.name
    }

    /// The firmware image the test is running against, if any.
    pub fn app_config(&self) -> Option<&AppImageConfig> {
        self.app_config
    }

    /// Direct access to the target.
    pub fn target(&mut self) -> &mut dyn TargetController {
        self.exec.target()
    }

    /// The timeouts in use for this run.
    pub fn timeouts(&self) -> &BringupTimeouts {
        self.exec.timeouts()
    }

    /// Halts the target if it's running.
    pub fn stop_exec(&mut self) -> Result<(), TestFailure> {
        Ok(self.exec.ensure_stopped()?)
    }

    /// Resumes the target if it's stopped, optionally at `resume_at`.
    pub fn resume_exec(&mut self, resume_at: Option<TargetAddress>) -> Result<(), TestFailure> {
        Ok(self.exec.ensure_running(resume_at)?)
    }

    /// Steps over one source line, failing unless the step completes.
    pub fn step(&mut self) -> Result<(), TestFailure> {
        self.exec.single_step()
    }

    /// Writes `sub_test` to the image's selector variable.
    pub fn select_sub_test(&mut self, sub_test: u32) -> Result<(), TestFailure> {
        let var = self
            .app_config
            .and_then(|config| config.test_select_var())
            .ok_or_else(|| TestFailure::NoSubTestSelector {
                app_name: self.app_config.map(|config| config.app_name().to_owned()),
                sub_test,
            })?;
        debug!("selecting sub-test {sub_test} through `{var}`");
        self.exec.target().data_eval_expr(&format!("{var}={sub_test}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{
        TargetState,
        sim::{SimulatedTarget, TargetCall},
    };
    use pretty_assertions::assert_eq;

    fn noop(name: &str) -> TestCase {
        TestCase::new(name, |_| Ok(()))
    }

    #[test]
    fn tree_counts_nested_tests() {
        let mut inner = TestSuite::new("inner");
        inner.add(noop("b")).add(noop("c"));
        let mut outer = TestSuite::new("outer");
        outer.add(inner).add(noop("d"));

        let mut tree = TestTree::new();
        tree.add(noop("a")).add(outer).add(TestSuite::new("empty"));

        assert_eq!(tree.test_count(), 4);
        assert_eq!(tree.nodes().len(), 3);
        assert!(!tree.is_empty());
        assert!(TestTree::new().is_empty());
    }

    #[test]
    fn append_splices_in_place() {
        let mut tree: TestTree = [noop("a")].into_iter().collect();
        let other: TestTree = [noop("b"), noop("c")].into_iter().collect();
        tree.append(other).add(noop("d"));

        let names: Vec<_> = tree
            .nodes()
            .iter()
            .map(|node| match node {
                TestNode::Case(case) => case.name(),
                TestNode::Suite(suite) => suite.name(),
            })
            .collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
    }

    #[test]
    fn disabled_tests() {
        let case = noop("a").disabled("needs JTAG rework");
        assert!(case.is_disabled());
        assert_eq!(case.skip_reason(), Some("needs JTAG rework"));
        assert!(!noop("b").is_disabled());
    }

    #[test]
    fn select_sub_test_writes_selector() {
        let config = AppImageConfig::gen_ut_app_dual();
        let mut target = SimulatedTarget::new();
        let timeouts = BringupTimeouts::default();
        let mut cx = TestContext::new("blink", Some(&config), &mut target, &timeouts);
        cx.select_sub_test(3).expect("selector exists");
        assert_eq!(target.variable("run_test"), Some("3"));
        assert_eq!(
            target.calls(),
            &[TargetCall::DataEvalExpr("run_test=3".to_owned())]
        );
    }

    #[test]
    fn select_sub_test_needs_selector() {
        let config = AppImageConfig::builder("blink").build();
        let mut target = SimulatedTarget::new();
        let timeouts = BringupTimeouts::default();

        let mut cx = TestContext::new("blink", Some(&config), &mut target, &timeouts);
        let error = cx.select_sub_test(1).expect_err("no selector variable");
        assert_eq!(
            error.to_string(),
            "cannot select sub-test 1: application `blink` has no selector variable"
        );

        let mut cx = TestContext::new("none", None, &mut target, &timeouts);
        let error = cx.select_sub_test(1).expect_err("no application");
        assert_eq!(
            error.to_string(),
            "cannot select sub-test 1: test has no application config"
        );
        assert!(!error.is_failure());
    }

    #[test]
    fn context_drives_target() {
        let mut target = SimulatedTarget::new();
        let timeouts = BringupTimeouts::default();
        let mut cx = TestContext::new("drive", None, &mut target, &timeouts);

        cx.step().expect("step completes");
        cx.resume_exec(None).expect("target resumes");
        assert_eq!(cx.target().target_state().unwrap().0, TargetState::Running);
        cx.stop_exec().expect("target halts");
        assert_eq!(cx.target().target_state().unwrap().0, TargetState::Stopped);
    }
}
