// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests
//!
//! These tests run whole test trees through [`TestRunner`](dbgtest_runner::runner::TestRunner)
//! against a [`SimulatedTarget`](dbgtest_runner::target::sim::SimulatedTarget), checking which
//! debugger commands were issued and how each test was reported.

mod fixtures;
mod profiles;
mod reporting;
mod scenarios;
