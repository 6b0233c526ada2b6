//! Engine seam.
//!
//! The bootstrap stages talk to the embedded engine only through [`Engine`]
//! and [`GuestContext`]. The V8 backend lives in [`crate::v8`]; tests use a
//! recording double.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::options::{EngineOptions, HostOptions};
use crate::paths::{Invocation, ResolvedPaths};
use crate::resolution::ModuleResolutionOverride;

#[cfg(test)]
pub(crate) mod testing;

/// One layer of the context's scope chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeLayer {
    /// Exclusive execution lock for the current thread
    ExecutionLock,
    /// Isolate entered on this thread
    Isolate,
    /// Handle scope for the heap
    Heap,
    /// Global context activated
    Global,
}

impl ScopeLayer {
    /// Acquisition order. Release runs in reverse.
    pub const NESTING: [ScopeLayer; 4] = [
        ScopeLayer::ExecutionLock,
        ScopeLayer::Isolate,
        ScopeLayer::Heap,
        ScopeLayer::Global,
    ];
}

impl fmt::Display for ScopeLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScopeLayer::ExecutionLock => "execution lock",
            ScopeLayer::Isolate => "isolate scope",
            ScopeLayer::Heap => "heap scope",
            ScopeLayer::Global => "global context scope",
        };
        f.write_str(name)
    }
}

/// Whether a guest failure happened before or after the code started running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestErrorKind {
    Compile,
    Runtime,
}

/// A guest-level failure with the engine's own description and stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestError {
    pub kind: GuestErrorKind,
    pub detail: String,
}

impl GuestError {
    pub fn compile(detail: impl Into<String>) -> Self {
        Self {
            kind: GuestErrorKind::Compile,
            detail: detail.into(),
        }
    }

    pub fn runtime(detail: impl Into<String>) -> Self {
        Self {
            kind: GuestErrorKind::Runtime,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for GuestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.detail)
    }
}

/// Where the guest stands after its synchronous start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Returned normally; pending work may remain on the event loop
    Running,
    /// Called `process.exit` with this code
    Exited(i32),
}

/// Everything a context needs to build the managed environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSetup {
    pub paths: ResolvedPaths,
    /// `process.argv` for the guest
    pub argv: Vec<String>,
    /// Working directory reported to the guest
    pub cwd: PathBuf,
    /// Specifier the managed strategy requires (e.g. `lib/cli.js`)
    pub entry_specifier: String,
    /// Heap ceiling in MiB (0 = engine default)
    pub max_heap_mb: usize,
}

impl ContextSetup {
    pub fn new(invocation: &Invocation, cwd: &Path, options: &HostOptions) -> Self {
        Self {
            paths: invocation.paths.clone(),
            argv: invocation.guest_argv(),
            cwd: cwd.to_path_buf(),
            entry_specifier: options.entry.replace('\\', "/"),
            max_heap_mb: options.engine.max_heap_mb,
        }
    }
}

/// Process-wide engine initialization and context factory.
pub trait Engine {
    type Context: GuestContext;

    /// One-time platform and flag setup. Errors are engine diagnostics.
    fn initialize(&mut self, options: &EngineOptions) -> Result<(), Vec<String>>;

    /// Build one context with the managed environment loaded.
    fn create_context(&self, setup: ContextSetup) -> Result<Self::Context, Vec<String>>;

    /// Tear down the platform. Called once, after every context is gone.
    fn dispose(&mut self);
}

/// One isolated heap plus global scope.
pub trait GuestContext {
    /// Acquire `layer`. Layers arrive in [`ScopeLayer::NESTING`] order.
    fn enter(&mut self, layer: ScopeLayer) -> Result<(), String>;

    /// Release `layer`. Layers leave in reverse nesting order.
    fn exit(&mut self, layer: ScopeLayer);

    /// Replace the guest module loader's lookup-path function.
    fn install_resolution_override(
        &mut self,
        resolution: &ModuleResolutionOverride,
    ) -> Result<(), GuestError>;

    /// Managed strategy: require the entry specifier and call it with `process`.
    fn load_environment(&mut self) -> Result<RunState, GuestError>;

    /// Direct strategy, step one: compile `source` without running it.
    fn compile_entry(&mut self, filename: &Path, source: &str) -> Result<(), GuestError>;

    /// Direct strategy, step two: run what [`GuestContext::compile_entry`] built.
    fn run_entry(&mut self) -> Result<RunState, GuestError>;

    /// Drive the event loop until it drains or the guest exits; returns the exit code.
    fn spin_event_loop(&mut self) -> Result<i32, GuestError>;

    /// Stop the environment. Called exactly once by the owning context.
    fn stop(&mut self);
}
