//! Layered configuration.
//!
//! Built-in defaults, then `liveload.toml` in the working directory (or the
//! file passed with `--config`), then `LIVELOAD_*` environment variables.
//! Nested keys use `__` in variable names, e.g. `LIVELOAD_REMOTE__PORT=6000`,
//! and `LIVELOAD_MODULE_PATH` is a `:` separated list.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::server::{DEFAULT_HOST, DEFAULT_PORT};

pub const DEFAULT_CONFIG: &str = "liveload";

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSettings {
    pub host: String,
    pub port: u16,
    /// Start the HTTP listener together with the REPL.
    pub listen_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub remote: RemoteSettings,
    /// Initial state of the per-unit trace output.
    pub trace: bool,
    /// Directories searched for `<module>.lv` on import.
    pub module_path: Vec<PathBuf>,
    /// Log filter used when `RUST_LOG` is not set.
    pub log: String,
}

impl Settings {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let builder = Config::builder()
            .set_default("remote.host", DEFAULT_HOST)?
            .set_default("remote.port", i64::from(DEFAULT_PORT))?
            .set_default("remote.listen_on_start", false)?
            .set_default("trace", false)?
            .set_default("module_path", vec!["."])?
            .set_default("log", "info")?;
        let builder = match path {
            Some(path) => builder.add_source(File::from(path).required(true)),
            None => builder.add_source(File::with_name(DEFAULT_CONFIG).required(false)),
        };
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("LIVELOAD")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(":")
                    .with_list_parse_key("module_path")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
