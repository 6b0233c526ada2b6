//! npmhost runtime
//!
//! Embeds V8, builds one managed CommonJS context, redirects module
//! resolution into a package-manager tree and runs that package manager's
//! CLI until it exits or its event loop drains.
//!
//! The stages run strictly in order and none is retried:
//!
//! ```text
//! PathResolver -> EngineProcessState -> ExecutionContextHost
//!   -> ModuleResolutionShim -> EntryScriptRunner -> EventLoopDriver -> ExitHandler
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use npmhost_runtime::{run, HostOptions, V8Engine};
//!
//! let args: Vec<String> = std::env::args().collect();
//! let cwd = std::env::current_dir()?;
//! let result = run(V8Engine::new(), &args, &cwd, &HostOptions::default());
//! std::process::exit(result.exit_code);
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod options;
pub mod paths;
pub mod process_state;
pub mod resolution;
pub mod runner;
pub mod v8;

use std::path::Path;

pub use context::{ExecutionContext, ExecutionContextHost};
pub use engine::{ContextSetup, Engine, GuestContext, GuestError, RunState, ScopeLayer};
pub use error::HostError;
pub use event_loop::{EventLoopDriver, ExitHandler};
pub use options::{EngineOptions, HostOptions, Strategy};
pub use paths::{Invocation, PathResolver, ResolvedPaths};
pub use process_state::EngineProcessState;
pub use resolution::{ModuleResolutionOverride, ModuleResolutionShim};
pub use runner::EntryScriptRunner;
pub use v8::V8Engine;

/// Outcome of one host run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    /// Lines for the error stream; empty on success
    pub errors: Vec<String>,
}

impl From<Result<i32, HostError>> for RunResult {
    fn from(result: Result<i32, HostError>) -> Self {
        match result {
            Ok(exit_code) => Self {
                exit_code,
                errors: Vec::new(),
            },
            Err(err) => Self {
                exit_code: err.exit_code(),
                errors: err.diagnostics(),
            },
        }
    }
}

/// Run the package manager named by `options` with the process arguments `args`.
pub fn run<E: Engine>(engine: E, args: &[String], cwd: &Path, options: &HostOptions) -> RunResult {
    RunResult::from(try_run(engine, args, cwd, options))
}

fn try_run<E: Engine>(
    engine: E,
    args: &[String],
    cwd: &Path,
    options: &HostOptions,
) -> Result<i32, HostError> {
    let invocation = PathResolver::new(options).resolve(args, cwd)?;

    let state = EngineProcessState::initialize(engine, &options.engine)?;
    let outcome = run_in_context(&state, &invocation, cwd, options);
    ExitHandler::dispose_engine(state);
    outcome
}

fn run_in_context<E: Engine>(
    state: &EngineProcessState<E>,
    invocation: &Invocation,
    cwd: &Path,
    options: &HostOptions,
) -> Result<i32, HostError> {
    let setup = ContextSetup::new(invocation, cwd, options);
    let mut context = ExecutionContextHost::new(state).create(setup)?;

    ModuleResolutionShim::install(&mut context, &invocation.paths)?;
    let started = EntryScriptRunner::new(options.strategy, &invocation.paths).run(&mut context)?;
    let code = EventLoopDriver::drive(&mut context, started)?;

    Ok(ExitHandler::close_context(context, code))
}
