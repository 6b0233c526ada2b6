//! Host error types.

use std::path::PathBuf;

use crate::engine::{GuestError, GuestErrorKind};

/// Errors that can occur while bootstrapping or running the guest program.
///
/// Every variant maps to exit status 1; the guest only gets a different
/// status by requesting one itself.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// No arguments after the program name
    #[error("Usage: {program} [--package-dir <path>] <args...>")]
    Usage { program: String },

    /// `--package-dir` given without a value
    #[error("--package-dir requires a path")]
    MissingPackageDir,

    /// A required path is absent on disk
    #[error("{} does not exist", .0.display())]
    PathNotFound(PathBuf),

    /// Invalid host configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Failed to parse the configuration file
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The engine rejected its process-wide setup
    #[error("Failed to initialize the engine")]
    EngineInit { diagnostics: Vec<String> },

    /// The execution context could not be constructed
    #[error("Failed to create the execution context")]
    ContextCreation { diagnostics: Vec<String> },

    /// The module resolution override raised inside the guest
    #[error("Failed to install module resolution override: {0}")]
    ResolutionOverride(String),

    /// The entry script is not valid source
    #[error("Compile error: {0}")]
    Compile(String),

    /// The guest program threw and nothing caught it
    #[error("Uncaught exception: {0}")]
    ScriptRuntime(String),

    /// File I/O error
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Lines written to the error stream for this failure.
    pub fn diagnostics(&self) -> Vec<String> {
        if let HostError::Usage { .. } = self {
            return vec![self.to_string()];
        }
        let mut lines = vec![format!("Error: {}", self)];
        match self {
            HostError::EngineInit { diagnostics } | HostError::ContextCreation { diagnostics } => {
                lines.extend(diagnostics.iter().map(|d| format!("  {}", d)));
            }
            _ => {}
        }
        lines
    }

    /// Map a guest failure onto the host taxonomy.
    pub(crate) fn from_guest(err: GuestError) -> Self {
        match err.kind {
            GuestErrorKind::Compile => HostError::Compile(err.detail),
            GuestErrorKind::Runtime => HostError::ScriptRuntime(err.detail),
        }
    }
}
