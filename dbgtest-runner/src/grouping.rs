// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Partitioning a test tree by firmware image.
//!
//! Grouping happens in two phases. The tree is first flattened depth-first into a list of tests,
//! each tagged with a [`GroupKey`] derived from its image config. Groups are then built from that
//! list in order of first appearance, so that each image is loaded once and tests run in the order
//! they were discovered within their group.
//!
//! Keys compare whole configs, not their [`AppConfigId`](crate::app_config::AppConfigId) strings,
//! so configs that differ in any field never share a group.

use crate::{
    app_config::AppImageConfig,
    list::{TestCase, TestNode, TestTree},
};
use indexmap::IndexMap;
use std::{fmt, sync::Arc};

/// The key tests are grouped by.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum GroupKey {
    /// Tests that don't need a firmware image.
    NoConfig,

    /// Tests that need this image. Equal configs are the same key, even if they are separate
    /// allocations.
    Config(Arc<AppImageConfig>),
}

impl GroupKey {
    /// Returns the key for a test with the given image config.
    pub fn for_config(app_config: Option<&Arc<AppImageConfig>>) -> Self {
        match app_config {
            Some(config) => Self::Config(config.clone()),
            None => Self::NoConfig,
        }
    }

    /// The image this key stands for, if any.
    pub fn app_config(&self) -> Option<&Arc<AppImageConfig>> {
        match self {
            Self::NoConfig => None,
            Self::Config(config) => Some(config),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoConfig => Ok(()),
            Self::Config(config) => write!(f, "{}", config.id()),
        }
    }
}

/// Tests that share a firmware image (or share not needing one).
#[derive(Debug)]
pub struct TestGroup {
    key: GroupKey,
    tests: Vec<TestCase>,
}

impl TestGroup {
    fn new(key: GroupKey) -> Self {
        Self {
            key,
            tests: Vec::new(),
        }
    }

    /// The key of this group.
    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// The image this group's tests need, if any. This is the config of the first test added;
    /// every other test in the group has an equal one.
    pub fn app_config(&self) -> Option<&Arc<AppImageConfig>> {
        self.key.app_config()
    }

    /// The tests in this group, in discovery order.
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Returns the number of tests in this group.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if this group has no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Returns the number of disabled tests in this group.
    pub fn skip_count(&self) -> usize {
        self.tests.iter().filter(|test| test.is_disabled()).count()
    }

    /// Returns true if every test in this group is disabled, in which case the group's image
    /// doesn't need to be loaded.
    pub fn is_fully_skipped(&self) -> bool {
        self.skip_count() == self.tests.len()
    }

    pub(crate) fn into_parts(self) -> (GroupKey, Vec<TestCase>) {
        (self.key, self.tests)
    }
}

/// A test tree partitioned by firmware image.
#[derive(Debug, Default)]
pub struct TestGroups {
    groups: IndexMap<GroupKey, TestGroup>,
}

impl TestGroups {
    /// Partitions `tree` into groups.
    ///
    /// Every test lands in exactly one group. Groups are ordered by the first appearance of their
    /// key in a depth-first walk of the tree, and tests keep their relative order within a group.
    pub fn group(tree: TestTree) -> Self {
        let mut flat = Vec::with_capacity(tree.test_count());
        flatten(tree.into_nodes(), &mut flat);

        let mut groups: IndexMap<GroupKey, TestGroup> = IndexMap::new();
        for (key, test) in flat {
            groups
                .entry(key)
                .or_insert_with_key(|key| TestGroup::new(key.clone()))
                .tests
                .push(test);
        }

        Self { groups }
    }

    /// Returns the number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Returns the total number of tests across all groups.
    pub fn test_count(&self) -> usize {
        self.groups.values().map(TestGroup::len).sum()
    }

    /// Returns the group for `key`, if any.
    pub fn get(&self, key: &GroupKey) -> Option<&TestGroup> {
        self.groups.get(key)
    }

    /// Iterates over the groups in execution order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TestGroup> + '_ {
        self.groups.values()
    }

    /// Iterates over the group keys in execution order.
    pub fn keys(&self) -> impl ExactSizeIterator<Item = &GroupKey> + '_ {
        self.groups.keys()
    }
}

impl IntoIterator for TestGroups {
    type Item = TestGroup;
    type IntoIter = indexmap::map::IntoValues<GroupKey, TestGroup>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_values()
    }
}

fn flatten(nodes: Vec<TestNode>, out: &mut Vec<(GroupKey, TestCase)>) {
    for node in nodes {
        match node {
            TestNode::Case(test) => {
                let key = GroupKey::for_config(test.app_config());
                out.push((key, test));
            }
            TestNode::Suite(suite) => flatten(suite.into_nodes(), out),
        }
    }
}
