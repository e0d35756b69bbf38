//! 🔧 App Configuration — the sacred env-and-TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment. Layers, lowest priority first:
//!   1. the serde defaults on every struct below
//!   2. `RCTK_*` environment variables, nested with `__` (`RCTK_RETRY__MAX_ATTEMPTS=3`)
//!   3. the TOML file passed with `--config`, if any
//!   4. `--profile` / `--region` on the command line ([`AppConfig::with_overrides`])
//!
//! Once built, the config is handed to the client constructors by reference and
//! never touched again.

use std::path::{Path, PathBuf};

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

pub use crate::retry::RetryConfig;

/// 🔑 Environment variable prefix. Everything under it is fair game.
pub const ENV_PREFIX: &str = "RCTK_";

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub aws: AwsConfig,
    pub retry: RetryConfig,
    pub runtime: RuntimeConfig,
}

/// ☁️ Where the SDK clients point. `None` means "let the default provider chain decide".
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AwsConfig {
    pub profile: Option<String>,
    pub region: Option<String>,
    /// e.g. a localstack URL
    pub endpoint_url: Option<String>,
}

/// 🏃 Knobs for how commands run, as opposed to where they connect.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// workers for `modify-batch` and `invoke-batch`
    pub batch_concurrency: usize,
    /// where the observer's sources, role policy and bundle live
    pub observer_dir: PathBuf,
    /// run inside `observer_dir` before install, unless `--skip-build`
    pub observer_build_command: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_concurrency: 1,
            observer_dir: PathBuf::from("observer"),
            observer_build_command: "yarn archive".to_string(),
        }
    }
}

impl AppConfig {
    /// 🎯 Command-line flags win over everything else.
    pub fn with_overrides(mut self, profile: Option<String>, region: Option<String>) -> Self {
        if profile.is_some() {
            self.aws.profile = profile;
        }
        if region.is_some() {
            self.aws.region = region;
        }
        self
    }
}

/// 🚀 Load the config — from env vars, from a file, or from the sheer power of defaults.
///
/// - `config_file_name` is None → defaults + env vars. No file. No assumptions.
/// - `config_file_name` is Some → defaults + env vars + TOML file. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable, with a message naming the file and the
/// env prefix so you know where to start looking.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables ({ENV_PREFIX}*). \
             The file exists in our hearts, but apparently not in a shape serde recognises.",
            path.display()
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({ENV_PREFIX}*). \
             No file was provided — this one's all on the environment. Classic."
        ),
    };

    config.extract().context(context_msg)
}
