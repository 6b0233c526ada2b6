//! Recording engine double for bootstrap tests.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{ContextSetup, Engine, GuestContext, GuestError, RunState, ScopeLayer};
use crate::options::EngineOptions;
use crate::paths::ResolvedPaths;
use crate::resolution::ModuleResolutionOverride;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Initialize,
    CreateContext { argv: Vec<String> },
    Enter(ScopeLayer),
    Exit(ScopeLayer),
    /// Candidates the fake loader got back for a lookup from the entry's directory
    InstallOverride { candidates: Vec<PathBuf> },
    LoadEnvironment { specifier: String },
    Compile(PathBuf),
    RunEntry,
    SpinEventLoop,
    Stop,
    Dispose,
}

/// Shared event log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Event>>>);

impl Journal {
    fn push(&self, event: Event) {
        self.0.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().clone()
    }

    pub fn count(&self, event: &Event) -> usize {
        self.0.borrow().iter().filter(|e| *e == event).count()
    }

    /// Layers entered and not yet exited.
    pub fn held_layers(&self) -> usize {
        let events = self.0.borrow();
        let enters = events.iter().filter(|e| matches!(e, Event::Enter(_))).count();
        let exits = events.iter().filter(|e| matches!(e, Event::Exit(_))).count();
        enters - exits
    }

    pub fn contains(&self, event: &Event) -> bool {
        self.count(event) > 0
    }
}

/// Scripted outcomes for each engine call.
#[derive(Debug, Clone)]
pub struct StubScript {
    pub init_error: Option<Vec<String>>,
    pub context_error: Option<Vec<String>>,
    pub fail_enter: Option<ScopeLayer>,
    pub override_error: Option<String>,
    pub load: Result<RunState, GuestError>,
    pub compile_error: Option<GuestError>,
    pub run: Result<RunState, GuestError>,
    pub event_loop: Result<i32, GuestError>,
    pub panic_on_load: bool,
}

impl Default for StubScript {
    fn default() -> Self {
        Self {
            init_error: None,
            context_error: None,
            fail_enter: None,
            override_error: None,
            load: Ok(RunState::Running),
            compile_error: None,
            run: Ok(RunState::Running),
            event_loop: Ok(0),
            panic_on_load: false,
        }
    }
}

#[derive(Default)]
pub struct StubEngine {
    journal: Journal,
    pub script: StubScript,
}

impl StubEngine {
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl Engine for StubEngine {
    type Context = StubContext;

    fn initialize(&mut self, _options: &EngineOptions) -> Result<(), Vec<String>> {
        if let Some(diagnostics) = self.script.init_error.clone() {
            return Err(diagnostics);
        }
        self.journal.push(Event::Initialize);
        Ok(())
    }

    fn create_context(&self, setup: ContextSetup) -> Result<StubContext, Vec<String>> {
        if let Some(diagnostics) = self.script.context_error.clone() {
            return Err(diagnostics);
        }
        self.journal.push(Event::CreateContext {
            argv: setup.argv.clone(),
        });
        Ok(StubContext {
            journal: self.journal.clone(),
            script: self.script.clone(),
            setup,
            held: Vec::new(),
        })
    }

    fn dispose(&mut self) {
        self.journal.push(Event::Dispose);
    }
}

pub struct StubContext {
    journal: Journal,
    script: StubScript,
    setup: ContextSetup,
    held: Vec<ScopeLayer>,
}

impl StubContext {
    fn check_scopes(&self) -> Result<(), GuestError> {
        if self.held.len() == ScopeLayer::NESTING.len() {
            Ok(())
        } else {
            Err(GuestError::runtime("guest code ran outside the context scopes"))
        }
    }
}

impl GuestContext for StubContext {
    fn enter(&mut self, layer: ScopeLayer) -> Result<(), String> {
        assert_eq!(ScopeLayer::NESTING[self.held.len()], layer, "out-of-order enter");
        if self.script.fail_enter == Some(layer) {
            return Err("scripted failure".to_string());
        }
        self.held.push(layer);
        self.journal.push(Event::Enter(layer));
        Ok(())
    }

    fn exit(&mut self, layer: ScopeLayer) {
        assert_eq!(self.held.pop(), Some(layer), "out-of-order exit");
        self.journal.push(Event::Exit(layer));
    }

    fn install_resolution_override(
        &mut self,
        resolution: &ModuleResolutionOverride,
    ) -> Result<(), GuestError> {
        self.check_scopes()?;
        if let Some(message) = self.script.override_error.clone() {
            return Err(GuestError::runtime(message));
        }
        // Fake loader: ask for the lookup paths of a module in the entry's directory.
        let requesting = self.setup.paths.entry_script.parent().map(Path::to_path_buf);
        let candidates = resolution.lookup_paths(requesting.as_deref());
        self.journal.push(Event::InstallOverride { candidates });
        Ok(())
    }

    fn load_environment(&mut self) -> Result<RunState, GuestError> {
        self.check_scopes()?;
        self.journal.push(Event::LoadEnvironment {
            specifier: self.setup.entry_specifier.clone(),
        });
        if self.script.panic_on_load {
            panic!("guest callback panicked");
        }
        self.script.load.clone()
    }

    fn compile_entry(&mut self, filename: &Path, _source: &str) -> Result<(), GuestError> {
        self.check_scopes()?;
        self.journal.push(Event::Compile(filename.to_path_buf()));
        match self.script.compile_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn run_entry(&mut self) -> Result<RunState, GuestError> {
        self.check_scopes()?;
        self.journal.push(Event::RunEntry);
        self.script.run.clone()
    }

    fn spin_event_loop(&mut self) -> Result<i32, GuestError> {
        self.check_scopes()?;
        self.journal.push(Event::SpinEventLoop);
        self.script.event_loop.clone()
    }

    fn stop(&mut self) {
        self.journal.push(Event::Stop);
    }
}

/// A setup pointing at paths that need not exist.
pub fn sample_setup() -> ContextSetup {
    ContextSetup {
        paths: ResolvedPaths {
            package_root: PathBuf::from("/opt/npm"),
            entry_script: PathBuf::from("/opt/npm/lib/cli.js"),
            executable: PathBuf::from("/usr/bin/npmhost"),
        },
        argv: vec![
            "/usr/bin/npmhost".to_string(),
            "/opt/npm/lib/cli.js".to_string(),
        ],
        cwd: PathBuf::from("/work"),
        entry_specifier: "lib/cli.js".to_string(),
        max_heap_mb: 0,
    }
}
