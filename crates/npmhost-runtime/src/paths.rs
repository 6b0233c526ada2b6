//! Package-manager location and host flag handling.
//!
//! Runs before anything touches the engine, so every failure here is cheap.

use std::path::{Path, PathBuf};

use crate::error::HostError;
use crate::options::HostOptions;

/// Host-only flag naming the package-manager directory.
pub const PACKAGE_DIR_FLAG: &str = "--package-dir";

/// Locations every later stage works from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Root of the package-manager tree
    pub package_root: PathBuf,
    /// Entry script inside the tree
    pub entry_script: PathBuf,
    /// Path of the running executable
    pub executable: PathBuf,
}

/// Resolved paths plus the arguments handed to the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub paths: ResolvedPaths,
    /// Arguments after the program name, host flags removed
    pub forwarded: Vec<String>,
}

impl Invocation {
    /// `process.argv` as the guest sees it: executable, entry script, then
    /// the forwarded arguments.
    pub fn guest_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.forwarded.len() + 2);
        argv.push(self.paths.executable.display().to_string());
        argv.push(self.paths.entry_script.display().to_string());
        argv.extend(self.forwarded.iter().cloned());
        argv
    }
}

/// Resolves the package-manager tree from the command line.
pub struct PathResolver<'a> {
    options: &'a HostOptions,
}

impl<'a> PathResolver<'a> {
    pub fn new(options: &'a HostOptions) -> Self {
        Self { options }
    }

    /// Default package root: `<cwd>/node_modules/<package_manager>`.
    pub fn default_root(&self, cwd: &Path) -> PathBuf {
        cwd.join("node_modules").join(&self.options.package_manager)
    }

    /// Resolve `args` (program name first) into an [`Invocation`].
    ///
    /// Only the first `--package-dir` is consumed; a relative value is taken
    /// against `cwd`.
    pub fn resolve(&self, args: &[String], cwd: &Path) -> Result<Invocation, HostError> {
        let Some(program) = args.first() else {
            return Err(HostError::Usage {
                program: "npmhost".to_string(),
            });
        };
        if args.len() < 2 {
            return Err(HostError::Usage {
                program: program.clone(),
            });
        }

        let mut forwarded: Vec<String> = args[1..].to_vec();
        let mut package_root = self.default_root(cwd);

        if let Some(index) = forwarded.iter().position(|a| a == PACKAGE_DIR_FLAG) {
            let Some(value) = forwarded.get(index + 1) else {
                return Err(HostError::MissingPackageDir);
            };
            package_root = cwd.join(value);
            if !package_root.exists() {
                return Err(HostError::PathNotFound(PathBuf::from(value)));
            }
            forwarded.drain(index..index + 2);
        }

        if !package_root.exists() {
            return Err(HostError::PathNotFound(package_root));
        }

        let entry_script = package_root.join(&self.options.entry);
        if !entry_script.is_file() {
            return Err(HostError::PathNotFound(entry_script));
        }

        let executable = std::env::current_exe().unwrap_or_else(|_| cwd.join(program));

        tracing::info!(
            root = %package_root.display(),
            entry = %entry_script.display(),
            "resolved package manager"
        );

        Ok(Invocation {
            paths: ResolvedPaths {
                package_root,
                entry_script,
                executable,
            },
            forwarded,
        })
    }
}
