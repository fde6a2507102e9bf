// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for the harness.
//!
//! Configuration is organized into profiles, obtained through [`HarnessConfig::profile`]. The
//! `default` profile always exists; other profiles fall back to it for any key they don't set.

mod max_fail;

pub use max_fail::MaxFail;

use crate::{
    errors::{ConfigParseError, ProfileNotFound},
    target::TargetAddress,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use max_fail::{deserialize_fail_fast, require_deserialize_fail_fast};
use serde::Deserialize;
use std::{collections::HashMap, time::Duration};

/// Overall configuration for the harness.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    root: Utf8PathBuf,
    inner: HarnessConfigImpl,
}

impl HarnessConfig {
    /// The default location of the config within the root: `.config/dbgtest.toml`.
    pub const CONFIG_PATH: &'static str = ".config/dbgtest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// User configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from the given file, or if not specified from `.config/dbgtest.toml` in
    /// `root`.
    ///
    /// If no config file is specified and `root` doesn't have `.config/dbgtest.toml`, uses the
    /// default config options. Relative paths in the config are resolved against `root`.
    pub fn from_sources(
        root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let root = root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let inner = Self::make_default_config()
            .add_source(source)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigParseError::new(config_file, err))?;

        Ok(Self { root, inner })
    }

    /// Returns the default config.
    pub fn default_config(root: impl Into<Utf8PathBuf>) -> Self {
        let config = Self::make_default_config()
            .build()
            .expect("default config is always valid");

        let inner = config
            .try_deserialize()
            .expect("default config is always valid");
        Self {
            root: root.into(),
            inner,
        }
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<HarnessProfile<'_>, ProfileNotFound> {
        let name = name.as_ref();
        let custom_profile = self.inner.profiles.get(name)?;
        let default_profile = &self.inner.profiles.default;

        let test_apps_dir = match custom_profile
            .and_then(|profile| profile.test_apps_dir.as_deref())
            .or(default_profile.test_apps_dir.as_deref())
        {
            Some(dir) => self.root.join(dir),
            None => self.root.clone(),
        };

        Ok(HarnessProfile {
            name: name.to_owned(),
            test_apps_dir,
            default_profile,
            custom_profile,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }
}

/// A configuration profile. Contains everything the runner and the bringup sequence read from
/// configuration.
///
/// Returned by [`HarnessConfig::profile`].
#[derive(Clone, Debug)]
pub struct HarnessProfile<'cfg> {
    name: String,
    test_apps_dir: Utf8PathBuf,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl HarnessProfile<'_> {
    /// Returns the name of the profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the absolute directory containing test applications.
    pub fn test_apps_dir(&self) -> &Utf8Path {
        &self.test_apps_dir
    }

    /// Returns whether application images are written to flash before each group.
    pub fn load_app_bins(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.load_app_bins)
            .unwrap_or(self.default_profile.load_app_bins)
    }

    /// Returns the number of failures and errors after which the run stops.
    pub fn max_fail(&self) -> MaxFail {
        self.custom_profile
            .and_then(|profile| profile.max_fail)
            .unwrap_or(self.default_profile.max_fail)
    }

    /// Returns the symbol the target is run to before every test.
    pub fn entry_symbol(&self) -> &str {
        self.custom_profile
            .and_then(|profile| profile.entry_symbol.as_deref())
            .unwrap_or(&self.default_profile.entry_symbol)
    }

    /// Returns the address of the known spurious trap stepped over during setup.
    pub fn spurious_trap_address(&self) -> TargetAddress {
        self.custom_profile
            .and_then(|profile| profile.spurious_trap_address)
            .unwrap_or(self.default_profile.spurious_trap_address)
    }

    /// Returns the bounds on every wait for a target state transition.
    pub fn timeouts(&self) -> BringupTimeouts {
        let default = &self.default_profile.timeouts;
        match self.custom_profile.and_then(|profile| profile.timeouts.as_ref()) {
            Some(custom) => BringupTimeouts {
                stop: custom.stop.unwrap_or(default.stop),
                reset: custom.reset.unwrap_or(default.reset),
                run: custom.run.unwrap_or(default.run),
                entry: custom.entry.unwrap_or(default.entry),
                step: custom.step.unwrap_or(default.step),
            },
            None => *default,
        }
    }
}

/// Bounds on waits for target state transitions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BringupTimeouts {
    /// How long to wait for a running target to halt after an interrupt.
    #[serde(with = "humantime_serde")]
    pub stop: Duration,

    /// How long to wait for the target to halt after a reset.
    #[serde(with = "humantime_serde")]
    pub reset: Duration,

    /// How long to wait for the target to start running after a resume.
    #[serde(with = "humantime_serde")]
    pub run: Duration,

    /// How long to wait for the target to reach the entry symbol.
    #[serde(with = "humantime_serde")]
    pub entry: Duration,

    /// How long to wait for each half of a single step.
    #[serde(with = "humantime_serde")]
    pub step: Duration,
}

impl Default for BringupTimeouts {
    fn default() -> Self {
        Self {
            stop: Duration::from_secs(5),
            reset: Duration::from_secs(10),
            run: Duration::from_secs(5),
            entry: Duration::from_secs(10),
            step: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HarnessConfigImpl {
    #[serde(rename = "profile")]
    profiles: HarnessProfilesImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct HarnessProfilesImpl {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: HashMap<String, CustomProfileImpl>,
}

impl HarnessProfilesImpl {
    fn get(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            HarnessConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(HarnessConfig::DEFAULT_PROFILE))
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    #[serde(default)]
    test_apps_dir: Option<Utf8PathBuf>,
    load_app_bins: bool,
    #[serde(rename = "fail-fast", deserialize_with = "require_deserialize_fail_fast")]
    max_fail: MaxFail,
    entry_symbol: String,
    spurious_trap_address: TargetAddress,
    timeouts: BringupTimeouts,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    test_apps_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    load_app_bins: Option<bool>,
    #[serde(
        default,
        rename = "fail-fast",
        deserialize_with = "deserialize_fail_fast"
    )]
    max_fail: Option<MaxFail>,
    #[serde(default)]
    entry_symbol: Option<String>,
    #[serde(default)]
    spurious_trap_address: Option<TargetAddress>,
    #[serde(default)]
    timeouts: Option<CustomTimeoutsImpl>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomTimeoutsImpl {
    #[serde(default, with = "humantime_serde::option")]
    stop: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    reset: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    run: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    entry: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    step: Option<Duration>,
}
