//! Binding configuration.
//!
//! Everything is optional; an empty object selects the defaults.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::Result;
use crate::option::OptionValue;

/// API version used when none is configured.
pub const DEFAULT_API_VERSION: i32 = 620;

/// Environment variable naming the client library to load.
pub const LIBRARY_PATH_ENV: &str = "FDB_LIBRARY_PATH";

#[cfg(target_os = "macos")]
const DEFAULT_LIBRARY: &str = "libfdb_c.dylib";
#[cfg(target_os = "windows")]
const DEFAULT_LIBRARY: &str = "fdb_c.dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DEFAULT_LIBRARY: &str = "libfdb_c.so";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NetworkOption {
    pub code: u32,
    #[serde(default = "none_value")]
    pub value: OptionValue,
}

fn none_value() -> OptionValue {
    OptionValue::None
}

fn default_api_version() -> i32 {
    DEFAULT_API_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    #[serde(default = "default_api_version")]
    pub api_version: i32,
    #[serde(default)]
    pub library_path: Option<PathBuf>,
    /// Applied in order before the network starts.
    #[serde(default)]
    pub network_options: Vec<NetworkOption>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION,
            library_path: None,
            network_options: Vec::new(),
        }
    }
}

impl NetworkConfig {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_value(v: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(v)?)
    }

    /// Library to load: configured path, then `FDB_LIBRARY_PATH`, then the
    /// platform's default name.
    pub fn resolve_library_path(&self) -> PathBuf {
        self.resolve_library_path_with(std::env::var_os(LIBRARY_PATH_ENV).map(PathBuf::from))
    }

    fn resolve_library_path_with(&self, env: Option<PathBuf>) -> PathBuf {
        self.library_path
            .clone()
            .or(env)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY))
    }
}
