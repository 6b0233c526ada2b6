//! V8 backend.
//!
//! [`V8Engine`] owns the process-wide platform; [`V8Context`] wraps one
//! `JsRuntime` with the managed environment loaded, plus the single-threaded
//! event loop that drives its timers and async ops.

mod ops;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use parking_lot::{Mutex, MutexGuard};

use crate::engine::{ContextSetup, Engine, GuestContext, GuestError, RunState, ScopeLayer};
use crate::options::EngineOptions;
use crate::resolution::ModuleResolutionOverride;

use ops::{CompileFailure, ExitState, HostInfo};

const NODE_ENV_JS: &str = include_str!("js/node_env.js");
const RESOLUTION_SHIM_JS: &str = include_str!("js/resolution_shim.js");

/// Set once a platform has been handed to V8; V8 cannot be re-initialized.
static PLATFORM_CLAIMED: AtomicBool = AtomicBool::new(false);

/// One guest may execute at a time.
static EXECUTION_LOCK: Mutex<()> = parking_lot::const_mutex(());

/// The V8 engine platform.
#[derive(Default)]
pub struct V8Engine {
    platform: Option<v8::SharedRef<v8::Platform>>,
}

impl V8Engine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for V8Engine {
    type Context = V8Context;

    fn initialize(&mut self, options: &EngineOptions) -> Result<(), Vec<String>> {
        if PLATFORM_CLAIMED.swap(true, Ordering::SeqCst) {
            return Err(vec![
                "engine platform already initialized for this process".to_string()
            ]);
        }

        let rejected = apply_flags(&options.flags);
        if !rejected.is_empty() {
            return Err(rejected
                .into_iter()
                .map(|flag| format!("bad option: {}", flag))
                .collect());
        }

        let threads = u32::try_from(options.resolved_worker_threads()).unwrap_or(u32::MAX);
        let platform = v8::new_default_platform(threads, false).make_shared();
        JsRuntime::init_platform(Some(platform.clone()), false);
        self.platform = Some(platform);
        Ok(())
    }

    fn create_context(&self, setup: ContextSetup) -> Result<V8Context, Vec<String>> {
        if self.platform.is_none() {
            return Err(vec!["engine platform is not initialized".to_string()]);
        }
        V8Context::new(&setup).map_err(|diagnostic| vec![diagnostic])
    }

    fn dispose(&mut self) {
        if self.platform.take().is_some() {
            // SAFETY: every isolate is gone; contexts borrow the engine state
            // that calls this, so none can outlive it.
            unsafe {
                v8::V8::dispose();
            }
            v8::V8::dispose_platform();
        }
    }
}

/// Hand `flags` to V8 and return the ones it did not recognize.
fn apply_flags(flags: &[String]) -> Vec<String> {
    if flags.is_empty() {
        return Vec::new();
    }
    let mut argv = Vec::with_capacity(flags.len() + 1);
    argv.push("npmhost".to_string());
    argv.extend(flags.iter().cloned());
    // The first element handed back is the program name.
    v8::V8::set_flags_from_command_line(argv)
        .into_iter()
        .skip(1)
        .collect()
}

/// One runtime with the managed environment loaded.
///
/// Only the execution lock layer holds a real resource. The isolate, heap and
/// global layers are bookkeeping that gates guest calls on correct nesting;
/// deno_core opens the matching V8 scopes itself around every call. The
/// environment is evaluated at construction, before any layer is entered, so
/// no guest code runs in it.
pub struct V8Context {
    runtime: JsRuntime,
    event_loop: tokio::runtime::Runtime,
    isolate: v8::IsolateHandle,
    lock: Option<MutexGuard<'static, ()>>,
    active: Vec<ScopeLayer>,
}

impl V8Context {
    fn new(setup: &ContextSetup) -> Result<Self, String> {
        let event_loop = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| format!("cannot start event loop: {}", err))?;

        let create_params = (setup.max_heap_mb > 0)
            .then(|| v8::CreateParams::default().heap_limits(0, setup.max_heap_mb * 1024 * 1024));

        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![ops::npmhost_env::init_ops_and_esm(HostInfo::new(setup))],
            create_params,
            ..Default::default()
        });

        let isolate = runtime.v8_isolate().thread_safe_handle();
        runtime.op_state().borrow_mut().put(isolate.clone());

        {
            let _enter = event_loop.enter();
            runtime
                .execute_script("[npmhost:env]", NODE_ENV_JS.to_string())
                .map_err(|err| err.to_string())?;
        }
        tracing::debug!(argv = ?setup.argv, "managed environment loaded");

        Ok(Self {
            runtime,
            event_loop,
            isolate,
            lock: None,
            active: Vec::with_capacity(ScopeLayer::NESTING.len()),
        })
    }

    fn check_scopes(&self) -> Result<(), GuestError> {
        if self.active.len() == ScopeLayer::NESTING.len() {
            Ok(())
        } else {
            Err(GuestError::runtime("context scopes are not entered"))
        }
    }

    fn exit_requested(&mut self) -> Option<i32> {
        let state = self.runtime.op_state();
        let requested = state
            .borrow()
            .try_borrow::<ExitState>()
            .and_then(|exit| exit.requested);
        requested
    }

    fn execute(
        &mut self,
        name: &'static str,
        source: String,
    ) -> Result<v8::Global<v8::Value>, String> {
        let _enter = self.event_loop.enter();
        self.runtime
            .execute_script(name, source)
            .map_err(|err| err.to_string())
    }

    fn compile_failed(&mut self) -> bool {
        let state = self.runtime.op_state();
        let failed = state
            .borrow()
            .try_borrow::<CompileFailure>()
            .is_some_and(|failure| failure.0);
        failed
    }

    /// Run guest code whose only result is whether it asked to exit.
    ///
    /// Failures are reported as runtime errors.
    fn run_script(&mut self, name: &'static str, source: &str) -> Result<RunState, GuestError> {
        self.check_scopes()?;
        let outcome = self.execute(name, source.to_string());
        match (outcome, self.exit_requested()) {
            (_, Some(code)) => Ok(RunState::Exited(code)),
            (Ok(_), None) => Ok(RunState::Running),
            (Err(report), None) => Err(GuestError::runtime(report)),
        }
    }
}

impl GuestContext for V8Context {
    fn enter(&mut self, layer: ScopeLayer) -> Result<(), String> {
        if ScopeLayer::NESTING.get(self.active.len()) != Some(&layer) {
            return Err(format!("{} entered out of order", layer));
        }
        if layer == ScopeLayer::ExecutionLock {
            let guard = EXECUTION_LOCK
                .try_lock()
                .ok_or_else(|| "another context holds the execution lock".to_string())?;
            self.lock = Some(guard);
        }
        self.active.push(layer);
        Ok(())
    }

    fn exit(&mut self, layer: ScopeLayer) {
        if self.active.last() == Some(&layer) {
            self.active.pop();
            if layer == ScopeLayer::ExecutionLock {
                self.lock = None;
            }
        }
    }

    fn install_resolution_override(
        &mut self,
        resolution: &ModuleResolutionOverride,
    ) -> Result<(), GuestError> {
        self.check_scopes()?;
        self.runtime.op_state().borrow_mut().put(resolution.clone());

        let result = self
            .execute("[npmhost:resolution]", RESOLUTION_SHIM_JS.to_string())
            .map_err(GuestError::runtime)?;
        let scope = &mut self.runtime.handle_scope();
        let value = v8::Local::new(scope, result);
        if value.is_string() {
            Err(GuestError::runtime(value.to_rust_string_lossy(scope)))
        } else {
            Ok(())
        }
    }

    fn load_environment(&mut self) -> Result<RunState, GuestError> {
        self.run_script("[npmhost:main]", "globalThis.__npmhost.runMain();")
            .map_err(|err| {
                if self.compile_failed() {
                    GuestError::compile(err.detail)
                } else {
                    err
                }
            })
    }

    fn compile_entry(&mut self, filename: &Path, source: &str) -> Result<(), GuestError> {
        self.check_scopes()?;
        let wrapped = format!(
            "globalThis.__npmhost.setEntryFactory(function (exports, require, module, __filename, __dirname) {{\n{}\n}});\n//# sourceURL={}",
            source,
            source_url(filename),
        );
        self.execute("[npmhost:entry]", wrapped)
            .map(|_| ())
            .map_err(GuestError::compile)
    }

    fn run_entry(&mut self) -> Result<RunState, GuestError> {
        self.run_script("[npmhost:run]", "globalThis.__npmhost.runCompiledEntry();")
    }

    fn spin_event_loop(&mut self) -> Result<i32, GuestError> {
        self.check_scopes()?;
        if let Some(code) = self.exit_requested() {
            return Ok(code);
        }

        let drained = self
            .event_loop
            .block_on(self.runtime.run_event_loop(PollEventLoopOptions::default()));
        if let Err(err) = drained {
            return match self.exit_requested() {
                Some(code) => Ok(code),
                None => Err(GuestError::runtime(err.to_string())),
            };
        }

        let outcome = self.execute("[npmhost:exit]", "globalThis.__npmhost.emitExit();".to_string());
        if let Some(code) = self.exit_requested() {
            return Ok(code);
        }
        let value = outcome.map_err(GuestError::runtime)?;
        let scope = &mut self.runtime.handle_scope();
        let code = v8::Local::new(scope, value).int32_value(scope);
        Ok(code.unwrap_or(0))
    }

    fn stop(&mut self) {
        self.isolate.terminate_execution();
    }
}

/// A `sourceURL` value that cannot end the comment line early.
fn source_url(filename: &Path) -> String {
    filename
        .display()
        .to_string()
        .replace(['\r', '\n'], "")
}
