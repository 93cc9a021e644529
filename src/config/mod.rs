mod basic;
mod gpu;
mod roles;
mod tiers;

pub use basic::BasicConfig;
pub use gpu::{GpuDeviceConfig, GpuPoolConfig};
pub use roles::RolesConfig;
pub use tiers::{TierLimits, TiersConfig};

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// GPU inventory (see `gpu_pool` table in config.toml).
    #[serde(default)]
    pub gpu_pool: GpuPoolConfig,

    /// Per-tier rate limits (see `tiers` table in config.toml).
    #[serde(default)]
    pub tiers: TiersConfig,

    /// Data-driven role table (see `roles` array in config.toml).
    #[serde(default)]
    pub roles: RolesConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults and a config TOML file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration by merging defaults and `config.toml` if present.
    ///
    /// Does not validate required fields (e.g. `basic.signing_key_path`). Binaries should call
    /// `Config::from_toml()` instead to avoid running with an ungenerated signing key silently.
    pub fn from_optional_toml() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional config.toml): {err}")
        })
    }

    /// Loads configuration from the TOML file (with defaults) and validates required fields.
    pub fn from_toml() -> Self {
        if !PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            panic!("config file not found: {}", DEFAULT_CONFIG_FILE);
        }
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!(
                "failed to extract configuration from {}: {err}",
                DEFAULT_CONFIG_FILE
            )
        });
        if cfg.gpu_pool.devices.is_empty() {
            panic!("gpu_pool.devices must describe at least one device");
        }
        cfg
    }
}

/// Global, lazily-initialized configuration instance for library code and tests.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_optional_toml);
