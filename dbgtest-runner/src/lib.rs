// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Grouped on-target test execution over a remote debugger.
//!
//! Tests that run against an embedded target are expensive to set up: every change of firmware
//! means reflashing the bootloader, partition table and application, then resetting the chip. This
//! crate batches tests by the firmware image they need, so that each image is written at most once
//! per run, and synchronizes the target to a known state (stopped at the application entry point)
//! before every test.
//!
//! The basic flow is:
//!
//! 1. Build a tree of [`list::TestCase`]s, each optionally tagged with an
//!    [`app_config::AppImageConfig`].
//! 2. [`grouping::TestGroups::group`] flattens the tree and partitions it by image.
//! 3. [`runner::TestRunner::run`] loads each group's image through a
//!    [`target::TargetController`], brings the target up before every test with
//!    [`bringup::TargetBringup`], and records outcomes in a [`reporter::TestResult`].

pub mod app_config;
pub mod bringup;
pub mod config;
pub mod errors;
pub mod grouping;
pub mod list;
pub mod reporter;
pub mod runner;
mod stopwatch;
pub mod target;
