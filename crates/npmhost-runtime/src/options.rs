//! Host configuration (npmhost.toml)
//!
//! All settings are optional. The file is looked up at `$NPMHOST_CONFIG`
//! first, then `<cwd>/npmhost.toml`; environment overrides are applied last.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::HostError;

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "npmhost.toml";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "NPMHOST_CONFIG";

/// Environment variable overriding [`HostOptions::strategy`].
pub const STRATEGY_ENV: &str = "NPMHOST_STRATEGY";

/// Environment variable with extra whitespace-separated engine flags.
pub const ENGINE_FLAGS_ENV: &str = "NPMHOST_V8_FLAGS";

/// How the entry script is started inside the context.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Require the entry through the managed module system and call it
    #[default]
    Managed,
    /// Read, compile and run the entry file as a top-level program
    Direct,
}

impl std::str::FromStr for Strategy {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "managed" => Ok(Strategy::Managed),
            "direct" => Ok(Strategy::Direct),
            other => Err(HostError::Configuration(format!(
                "unknown strategy '{}' (expected 'managed' or 'direct')",
                other
            ))),
        }
    }
}

/// Process-wide engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Flags handed to the engine before the platform starts
    pub flags: Vec<String>,

    /// Background worker threads (0 = hardware concurrency)
    pub worker_threads: usize,

    /// Heap ceiling in MiB (0 = engine default)
    pub max_heap_mb: usize,
}

impl EngineOptions {
    /// Worker pool size for the engine platform.
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get()
        } else {
            self.worker_threads
        }
    }
}

/// Host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HostOptions {
    /// Package directory name under `node_modules` (default: "npm")
    pub package_manager: String,

    /// Entry script, relative to the package root (default: "lib/cli.js")
    pub entry: String,

    /// Entry strategy
    pub strategy: Strategy,

    /// Engine settings
    pub engine: EngineOptions,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            package_manager: "npm".to_string(),
            entry: "lib/cli.js".to_string(),
            strategy: Strategy::Managed,
            engine: EngineOptions::default(),
        }
    }
}

impl HostOptions {
    /// Load options for a run started in `cwd`, applying environment overrides.
    pub fn load(cwd: &Path) -> Result<Self, HostError> {
        let mut options = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => {
                let local = cwd.join(CONFIG_FILE_NAME);
                if local.is_file() {
                    Self::from_file(&local)?
                } else {
                    Self::default()
                }
            }
        };
        options.apply_env(|key| std::env::var(key).ok())?;
        options.validate()?;
        Ok(options)
    }

    /// Parse options from a file
    pub fn from_file(path: &Path) -> Result<Self, HostError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HostError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_str(&content)
    }

    /// Parse options from a string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, HostError> {
        let options: HostOptions = toml::from_str(content)?;
        options.validate()?;
        Ok(options)
    }

    /// Apply `NPMHOST_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), HostError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(strategy) = lookup(STRATEGY_ENV) {
            self.strategy = strategy.parse()?;
        }
        if let Some(flags) = lookup(ENGINE_FLAGS_ENV) {
            self.engine
                .flags
                .extend(flags.split_whitespace().map(str::to_string));
        }
        Ok(())
    }

    /// Validate the options
    pub fn validate(&self) -> Result<(), HostError> {
        if self.package_manager.trim().is_empty() {
            return Err(HostError::Configuration(
                "package_manager cannot be empty".to_string(),
            ));
        }
        if self.entry.trim().is_empty() {
            return Err(HostError::Configuration("entry cannot be empty".to_string()));
        }
        if Path::new(&self.entry).is_absolute() {
            return Err(HostError::Configuration(format!(
                "entry must be relative to the package root, got {}",
                self.entry
            )));
        }
        Ok(())
    }
}
