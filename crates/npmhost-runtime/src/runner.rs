//! Entry script start-up.

use crate::context::ExecutionContext;
use crate::engine::{GuestContext, RunState};
use crate::error::HostError;
use crate::options::Strategy;
use crate::paths::ResolvedPaths;

/// Starts the package manager's entry point inside the context.
pub struct EntryScriptRunner<'a> {
    strategy: Strategy,
    paths: &'a ResolvedPaths,
}

impl<'a> EntryScriptRunner<'a> {
    pub fn new(strategy: Strategy, paths: &'a ResolvedPaths) -> Self {
        Self { strategy, paths }
    }

    /// Run the synchronous part of the entry script.
    pub fn run<C: GuestContext>(
        &self,
        context: &mut ExecutionContext<'_, C>,
    ) -> Result<RunState, HostError> {
        tracing::debug!(strategy = ?self.strategy, entry = %self.paths.entry_script.display(), "starting entry script");
        match self.strategy {
            Strategy::Managed => context
                .guest_mut()
                .load_environment()
                .map_err(HostError::from_guest),
            Strategy::Direct => {
                let source = std::fs::read_to_string(&self.paths.entry_script)?;
                let guest = context.guest_mut();
                guest
                    .compile_entry(&self.paths.entry_script, strip_shebang(&source))
                    .map_err(|err| HostError::Compile(err.detail))?;
                guest.run_entry().map_err(HostError::from_guest)
            }
        }
    }
}

/// Blank out a leading `#!` line, keeping line numbers intact.
pub fn strip_shebang(source: &str) -> &str {
    if source.starts_with("#!") {
        match source.find('\n') {
            Some(end) => &source[end..],
            None => "",
        }
    } else {
        source
    }
}
