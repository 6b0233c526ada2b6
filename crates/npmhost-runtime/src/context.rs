//! Execution context ownership and scope nesting.

use std::marker::PhantomData;

use crate::engine::{ContextSetup, Engine, GuestContext, ScopeLayer};
use crate::error::HostError;
use crate::process_state::EngineProcessState;

/// The one context a run executes in.
///
/// Holds the guest context together with the stack of scope layers it has
/// entered. Dropping it stops the environment (once) and then releases the
/// layers in reverse order, whichever way the run ended.
pub struct ExecutionContext<'p, C: GuestContext> {
    guest: C,
    entered: Vec<ScopeLayer>,
    stopped: bool,
    _state: PhantomData<&'p ()>,
}

impl<'p, C: GuestContext> ExecutionContext<'p, C> {
    pub(crate) fn guest_mut(&mut self) -> &mut C {
        &mut self.guest
    }

    /// Layers currently held, outermost first.
    pub fn entered(&self) -> &[ScopeLayer] {
        &self.entered
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stop the environment. Later calls are no-ops.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            tracing::debug!("stopping environment");
            self.guest.stop();
        }
    }

    fn enter_all(&mut self) -> Result<(), HostError> {
        for layer in ScopeLayer::NESTING {
            self.guest
                .enter(layer)
                .map_err(|diagnostic| HostError::ContextCreation {
                    diagnostics: vec![format!("cannot enter {}: {}", layer, diagnostic)],
                })?;
            self.entered.push(layer);
        }
        Ok(())
    }
}

impl<C: GuestContext> Drop for ExecutionContext<'_, C> {
    fn drop(&mut self) {
        self.stop();
        while let Some(layer) = self.entered.pop() {
            self.guest.exit(layer);
        }
    }
}

/// Creates the execution context against the process-wide engine state.
pub struct ExecutionContextHost<'p, E: Engine> {
    state: &'p EngineProcessState<E>,
}

impl<'p, E: Engine> ExecutionContextHost<'p, E> {
    pub fn new(state: &'p EngineProcessState<E>) -> Self {
        Self { state }
    }

    /// Build the context and enter every scope layer.
    ///
    /// A failure part-way through releases the layers already entered.
    pub fn create(
        &self,
        setup: ContextSetup,
    ) -> Result<ExecutionContext<'p, E::Context>, HostError> {
        let guest = self
            .state
            .engine()
            .create_context(setup)
            .map_err(|diagnostics| HostError::ContextCreation { diagnostics })?;

        let mut context = ExecutionContext {
            guest,
            entered: Vec::with_capacity(ScopeLayer::NESTING.len()),
            stopped: false,
            _state: PhantomData,
        };
        context.enter_all()?;
        tracing::debug!("execution context ready");
        Ok(context)
    }
}
