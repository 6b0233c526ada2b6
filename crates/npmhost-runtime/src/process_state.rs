//! Process-wide engine state.

use crate::engine::Engine;
use crate::error::HostError;
use crate::options::EngineOptions;

/// The initialized engine platform, owned by the process.
///
/// Contexts borrow it, and [`EngineProcessState::dispose`] consumes it, so
/// the platform cannot be disposed while a context is alive. Dropping an
/// undisposed state disposes it.
pub struct EngineProcessState<E: Engine> {
    engine: E,
    disposed: bool,
}

impl<E: Engine> EngineProcessState<E> {
    /// Initialize `engine` for this process.
    pub fn initialize(mut engine: E, options: &EngineOptions) -> Result<Self, HostError> {
        tracing::debug!(
            flags = ?options.flags,
            workers = options.resolved_worker_threads(),
            "initializing engine platform"
        );
        engine
            .initialize(options)
            .map_err(|diagnostics| HostError::EngineInit { diagnostics })?;
        Ok(Self {
            engine,
            disposed: false,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Dispose the engine and its platform.
    pub fn dispose(mut self) {
        self.dispose_once();
    }

    fn dispose_once(&mut self) {
        if !self.disposed {
            self.disposed = true;
            tracing::debug!("disposing engine platform");
            self.engine.dispose();
        }
    }
}

impl<E: Engine> Drop for EngineProcessState<E> {
    fn drop(&mut self) {
        self.dispose_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Event, StubEngine};

    #[test]
    fn test_dispose_runs_once() {
        let engine = StubEngine::default();
        let journal = engine.journal();

        let state = EngineProcessState::initialize(engine, &EngineOptions::default()).unwrap();
        state.dispose();

        assert_eq!(journal.events(), vec![Event::Initialize, Event::Dispose]);
    }

    #[test]
    fn test_drop_disposes() {
        let engine = StubEngine::default();
        let journal = engine.journal();

        {
            let _state =
                EngineProcessState::initialize(engine, &EngineOptions::default()).unwrap();
        }

        assert_eq!(journal.count(&Event::Dispose), 1);
    }

    #[test]
    fn test_init_failure_carries_diagnostics() {
        let mut engine = StubEngine::default();
        engine.script.init_error = Some(vec!["bad option: --bogus".to_string()]);
        let journal = engine.journal();

        let result = EngineProcessState::initialize(engine, &EngineOptions::default());
        match result {
            Err(HostError::EngineInit { diagnostics }) => {
                assert_eq!(diagnostics, vec!["bad option: --bogus"])
            }
            _ => panic!("expected EngineInit"),
        }
        assert_eq!(journal.count(&Event::Dispose), 0);
    }
}
