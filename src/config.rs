use crate::dap::convention::{ClientConvention, PathFormat};
use crate::engine::provider::EngineOptions;
use crate::engine::EngineSettings;
use crate::error::Error;
use crate::gateway::{
    GatewayOptions, DEFAULT_IDLE_POLL, DEFAULT_JOIN_TIMEOUT, DEFAULT_MAX_FRAMES,
    DEFAULT_REQUEST_TIMEOUT,
};
use crate::{muted_error, weak_error};
use log::error;
use serde::Deserialize;
use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Adapter settings from the TOML config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AdapterConfig {
    pub request_timeout_secs: u64,
    pub join_timeout_secs: u64,
    pub idle_poll_ms: u64,
    pub max_frames: usize,
    pub source_paths: Vec<String>,
    pub symbol_paths: Vec<String>,
    pub source_level_stepping: bool,
    /// Directory with native engine libraries.
    pub engine_path: Option<PathBuf>,
    /// Line numbering of the engine, 1-based by default.
    pub debugger_lines_start_at1: bool,
    /// Path form of the engine side: `path` (default) or `uri`.
    pub debugger_path_format: PathFormat,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            join_timeout_secs: DEFAULT_JOIN_TIMEOUT.as_secs(),
            idle_poll_ms: DEFAULT_IDLE_POLL.as_millis() as u64,
            max_frames: DEFAULT_MAX_FRAMES,
            source_paths: vec![],
            symbol_paths: vec![],
            source_level_stepping: true,
            engine_path: None,
            debugger_lines_start_at1: true,
            debugger_path_format: PathFormat::Path,
        }
    }
}

impl AdapterConfig {
    const DEFAULT_PATH: &'static str = ".config/dbgeng-dap/config.toml";

    pub fn parse(data: &str) -> Result<Self, Error> {
        Ok(toml::de::from_str(data)?)
    }

    /// Load config from `path` or from the default location. Return defaults on errors.
    pub fn load(path: Option<&Path>) -> Self {
        let data = match path {
            None => {
                let Some(home) = home::home_dir() else {
                    return Self::default();
                };
                match muted_error!(read_to_string(home.join(Self::DEFAULT_PATH))) {
                    Some(data) => data,
                    None => return Self::default(),
                }
            }
            Some(path) => match read_to_string(path) {
                Ok(data) => data,
                Err(err) => {
                    error!(target: "dap", "Error while load config file {}: {err}", path.display());
                    return Self::default();
                }
            },
        };

        weak_error!(Self::parse(&data), "invalid adapter config:").unwrap_or_default()
    }

    pub fn gateway_options(&self, std_lib_path: Option<PathBuf>) -> GatewayOptions {
        GatewayOptions {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            join_timeout: Duration::from_secs(self.join_timeout_secs),
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            max_frames: self.max_frames,
            settings: EngineSettings {
                source_level_stepping: self.source_level_stepping,
                ..EngineSettings::default()
            },
            source_paths: self.source_paths.clone(),
            symbol_paths: self.symbol_paths.clone(),
            std_lib_path,
        }
    }

    /// Conventions of a session before the client declares its own.
    pub fn convention(&self) -> ClientConvention {
        ClientConvention::new(self.debugger_lines_start_at1, self.debugger_path_format)
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            engine_path: self.engine_path.clone(),
        }
    }
}
