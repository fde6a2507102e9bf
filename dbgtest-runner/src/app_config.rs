// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Descriptors for the firmware images tests run against.
//!
//! An [`AppImageConfig`] says where an application's binaries live and where each of them goes in
//! flash. Binaries are located under `<apps-dir>/<app-name>/<bin-dir>`; the apps directory comes
//! from the harness profile, so the same config can be shared across machines.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Default flash offset of the second-stage bootloader.
pub const BOOTLOADER_FLASH_OFFSET: u32 = 0x1000;

/// Default flash offset of the partition table.
pub const PARTITION_TABLE_FLASH_OFFSET: u32 = 0x8000;

/// Default flash offset of the application image.
pub const APP_FLASH_OFFSET: u32 = 0x10000;

/// One of the binaries written to flash when an image is loaded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FlashSegment {
    /// The second-stage bootloader.
    Bootloader,

    /// The partition table.
    PartitionTable,

    /// The application itself.
    Application,
}

impl FlashSegment {
    /// Segments in the order they are written to flash.
    pub const LOAD_ORDER: [FlashSegment; 3] = [
        FlashSegment::Bootloader,
        FlashSegment::PartitionTable,
        FlashSegment::Application,
    ];
}

impl fmt::Display for FlashSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bootloader => write!(f, "bootloader"),
            Self::PartitionTable => write!(f, "partition table"),
            Self::Application => write!(f, "application"),
        }
    }
}

/// Describes a firmware image: its binaries and their flash offsets.
///
/// Configs are immutable once built. Tests that need the same image should share one instance
/// (typically through an `Arc`), though two separately-built configs with identical fields are
/// treated as the same image for grouping.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct AppImageConfig {
    app_name: String,
    bin_dir: Utf8PathBuf,
    build_dir: Utf8PathBuf,
    app_offset: u32,
    bootloader_path: Option<Utf8PathBuf>,
    bootloader_offset: u32,
    partition_table_path: Option<Utf8PathBuf>,
    partition_table_offset: u32,
    test_select_var: Option<String>,
}

impl AppImageConfig {
    /// Name of the generic unit-test application.
    pub const GEN_UT_APP: &'static str = "gen_ut_app";

    /// Starts building a config for the application called `app_name`.
    pub fn builder(app_name: impl Into<String>) -> AppImageConfigBuilder {
        AppImageConfigBuilder::new(app_name)
    }

    /// The generic unit-test application, built for dual-core operation.
    pub fn gen_ut_app_dual() -> Self {
        Self::gen_ut_app_builder()
            .bin_dir("output/default")
            .build_dir("builds/default")
            .build()
    }

    /// The generic unit-test application, built for single-core operation.
    pub fn gen_ut_app_single() -> Self {
        Self::gen_ut_app_builder()
            .bin_dir("output/single_core")
            .build_dir("builds/single_core")
            .build()
    }

    fn gen_ut_app_builder() -> AppImageConfigBuilder {
        Self::builder(Self::GEN_UT_APP)
            .bootloader_path("bootloader/bootloader.bin")
            .partition_table_path("partitions_singleapp.bin")
            .test_select_var("run_test")
    }

    /// Returns the identity used to group tests by image.
    pub fn id(&self) -> AppConfigId {
        AppConfigId::new(self)
    }

    /// The application name.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// The binaries directory, relative to the application's source directory.
    pub fn bin_dir(&self) -> &Utf8Path {
        &self.bin_dir
    }

    /// The build objects directory, relative to the application's source directory.
    pub fn build_dir(&self) -> &Utf8Path {
        &self.build_dir
    }

    /// Returns the flash offset for `segment`.
    pub fn offset(&self, segment: FlashSegment) -> u32 {
        match segment {
            FlashSegment::Bootloader => self.bootloader_offset,
            FlashSegment::PartitionTable => self.partition_table_offset,
            FlashSegment::Application => self.app_offset,
        }
    }

    /// The name of the variable in the application that selects which sub-test runs.
    pub fn test_select_var(&self) -> Option<&str> {
        self.test_select_var.as_deref()
    }

    // ---
    // Paths
    // ---

    /// `<apps_dir>/<app_name>`
    pub fn src_dir(&self, apps_dir: &Utf8Path) -> Utf8PathBuf {
        apps_dir.join(&self.app_name)
    }

    /// `<apps_dir>/<app_name>/<build_dir>`
    pub fn obj_dir(&self, apps_dir: &Utf8Path) -> Utf8PathBuf {
        self.src_dir(apps_dir).join(&self.build_dir)
    }

    /// `<apps_dir>/<app_name>/<bin_dir>`
    pub fn bins_dir(&self, apps_dir: &Utf8Path) -> Utf8PathBuf {
        self.src_dir(apps_dir).join(&self.bin_dir)
    }

    /// Returns the path to the binary for `segment`, or `None` if no path was configured for it.
    ///
    /// The application binary is always `<bins_dir>/<app_name>.bin`.
    pub fn segment_path(&self, apps_dir: &Utf8Path, segment: FlashSegment) -> Option<Utf8PathBuf> {
        let bins_dir = self.bins_dir(apps_dir);
        match segment {
            FlashSegment::Bootloader => self.bootloader_path.as_ref().map(|p| bins_dir.join(p)),
            FlashSegment::PartitionTable => {
                self.partition_table_path.as_ref().map(|p| bins_dir.join(p))
            }
            FlashSegment::Application => Some(self.app_bin_path(apps_dir)),
        }
    }

    /// `<bins_dir>/<app_name>.bin`
    pub fn app_bin_path(&self, apps_dir: &Utf8Path) -> Utf8PathBuf {
        self.bins_dir(apps_dir)
            .join(format!("{}.bin", self.app_name))
    }

    /// `<bins_dir>/<app_name>.elf`
    pub fn app_elf_path(&self, apps_dir: &Utf8Path) -> Utf8PathBuf {
        self.bins_dir(apps_dir)
            .join(format!("{}.elf", self.app_name))
    }
}

/// Builder for [`AppImageConfig`].
#[derive(Clone, Debug)]
#[must_use]
pub struct AppImageConfigBuilder {
    inner: AppImageConfig,
}

impl AppImageConfigBuilder {
    fn new(app_name: impl Into<String>) -> Self {
        Self {
            inner: AppImageConfig {
                app_name: app_name.into(),
                bin_dir: Utf8PathBuf::new(),
                build_dir: Utf8PathBuf::new(),
                app_offset: APP_FLASH_OFFSET,
                bootloader_path: None,
                bootloader_offset: BOOTLOADER_FLASH_OFFSET,
                partition_table_path: None,
                partition_table_offset: PARTITION_TABLE_FLASH_OFFSET,
                test_select_var: None,
            },
        }
    }

    /// Sets the binaries directory, relative to the application's source directory.
    pub fn bin_dir(mut self, bin_dir: impl Into<Utf8PathBuf>) -> Self {
        self.inner.bin_dir = bin_dir.into();
        self
    }

    /// Sets the build objects directory, relative to the application's source directory.
    pub fn build_dir(mut self, build_dir: impl Into<Utf8PathBuf>) -> Self {
        self.inner.build_dir = build_dir.into();
        self
    }

    /// Overrides the application's flash offset.
    pub fn app_offset(mut self, offset: u32) -> Self {
        self.inner.app_offset = offset;
        self
    }

    /// Sets the bootloader binary, relative to the binaries directory.
    pub fn bootloader_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.inner.bootloader_path = Some(path.into());
        self
    }

    /// Overrides the bootloader's flash offset.
    pub fn bootloader_offset(mut self, offset: u32) -> Self {
        self.inner.bootloader_offset = offset;
        self
    }

    /// Sets the partition table binary, relative to the binaries directory.
    pub fn partition_table_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.inner.partition_table_path = Some(path.into());
        self
    }

    /// Overrides the partition table's flash offset.
    pub fn partition_table_offset(mut self, offset: u32) -> Self {
        self.inner.partition_table_offset = offset;
        self
    }

    /// Sets the name of the variable that selects the sub-test to run.
    pub fn test_select_var(mut self, var: impl Into<String>) -> Self {
        self.inner.test_select_var = Some(var.into());
        self
    }

    /// Builds the config.
    pub fn build(self) -> AppImageConfig {
        self.inner
    }
}

/// The canonical display form of an [`AppImageConfig`], used in logs and report suite names.
///
/// Built from every field of the config. Missing paths and selector variables are written as
/// `None` and `-`, so two different configs can render the same ID; compare configs directly to
/// tell images apart.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AppConfigId(String);

impl AppConfigId {
    fn new(config: &AppImageConfig) -> Self {
        Self(format!(
            "{}/{}/{}/{:x}-{}/{:x}-{}/{:x}/{}",
            config.app_name,
            config.bin_dir,
            config.build_dir,
            config.app_offset,
            DisplayOptPath(config.bootloader_path.as_deref()),
            config.bootloader_offset,
            DisplayOptPath(config.partition_table_path.as_deref()),
            config.partition_table_offset,
            config.test_select_var.as_deref().unwrap_or("-"),
        ))
    }

    /// Returns the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppConfigId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct DisplayOptPath<'a>(Option<&'a Utf8Path>);

impl fmt::Display for DisplayOptPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(path) => write!(f, "{path}"),
            None => write!(f, "None"),
        }
    }
}
