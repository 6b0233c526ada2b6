//! Event loop driving and ordered shutdown.

use crate::context::ExecutionContext;
use crate::engine::{Engine, GuestContext, RunState};
use crate::error::HostError;
use crate::process_state::EngineProcessState;

/// Drives the guest's event loop to completion.
pub struct EventLoopDriver;

impl EventLoopDriver {
    /// Spin the loop once it has work, returning the guest's exit code.
    ///
    /// A guest that already exited during start-up is not spun again.
    pub fn drive<C: GuestContext>(
        context: &mut ExecutionContext<'_, C>,
        started: RunState,
    ) -> Result<i32, HostError> {
        match started {
            RunState::Exited(code) => {
                tracing::debug!(code, "guest exited during start-up");
                Ok(code)
            }
            RunState::Running => {
                let code = context
                    .guest_mut()
                    .spin_event_loop()
                    .map_err(HostError::from_guest)?;
                tracing::debug!(code, "event loop finished");
                Ok(code)
            }
        }
    }
}

/// Ordered teardown: stop the environment, release the context, dispose the engine.
///
/// Both steps consume what they tear down, so neither can run twice.
pub struct ExitHandler;

impl ExitHandler {
    /// Stop the environment and release the context's scopes.
    pub fn close_context<C: GuestContext>(mut context: ExecutionContext<'_, C>, code: i32) -> i32 {
        context.stop();
        drop(context);
        code
    }

    /// Dispose the engine and its platform.
    pub fn dispose_engine<E: Engine>(state: EngineProcessState<E>) {
        state.dispose();
    }
}
