//! Host ops backing the managed environment.
//!
//! Everything the guest's `process`, `fs`, `path` and module loader need
//! from the host goes through these. Values cross the boundary as op
//! arguments, never as generated source.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR_STR};
use std::time::Duration;

use deno_core::{op2, v8, OpState};
use serde::Serialize;

use crate::engine::ContextSetup;
use crate::resolution::{self, ModuleResolutionOverride};

/// Node release the managed environment reports through `process.version`.
const NODE_COMPAT_VERSION: &str = "v20.11.1";

/// Host facts handed to the environment bootstrap.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub argv: Vec<String>,
    pub exec_path: String,
    pub cwd: String,
    pub entry_path: String,
    pub entry_specifier: String,
    pub platform: &'static str,
    pub arch: &'static str,
    pub path_sep: &'static str,
    pub version: &'static str,
    pub pid: u32,
    pub cpus: usize,
    pub env: BTreeMap<String, String>,
}

impl HostInfo {
    pub fn new(setup: &ContextSetup) -> Self {
        let env = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        Self {
            argv: setup.argv.clone(),
            exec_path: setup.paths.executable.display().to_string(),
            cwd: setup.cwd.display().to_string(),
            entry_path: setup.paths.entry_script.display().to_string(),
            entry_specifier: setup.entry_specifier.clone(),
            platform: node_platform(),
            arch: node_arch(),
            path_sep: MAIN_SEPARATOR_STR,
            version: NODE_COMPAT_VERSION,
            pid: std::process::id(),
            cpus: num_cpus::get(),
            env,
        }
    }
}

fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

fn node_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

/// Set once the guest calls `process.exit`.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ExitState {
    pub requested: Option<i32>,
}

/// Set when a module failed to compile while the main module was loading.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CompileFailure(pub bool);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub is_file: bool,
    pub is_directory: bool,
    pub size: u64,
}

deno_core::extension!(
    npmhost_env,
    ops = [
        op_host_info,
        op_exit,
        op_mark_compile_failure,
        op_sleep,
        op_module_node_modules_paths,
        op_module_lookup_paths,
        op_module_probe,
        op_module_root_anchor,
        op_fs_read_file,
        op_fs_stat,
        op_fs_read_dir,
        op_fs_realpath,
        op_path_join,
        op_path_resolve,
        op_path_normalize,
        op_path_dirname,
        op_path_basename,
        op_path_extname,
        op_path_relative,
    ],
    options = { host: HostInfo },
    state = |state, options| {
        state.put(options.host);
        state.put(ExitState::default());
        state.put(CompileFailure::default());
    },
);

#[op2]
#[serde]
fn op_host_info(state: &mut OpState) -> HostInfo {
    state.borrow::<HostInfo>().clone()
}

/// Record the exit request and unwind the guest.
#[op2(fast)]
fn op_exit(state: &mut OpState, code: i32) {
    state.borrow_mut::<ExitState>().requested = Some(code);
    tracing::debug!(code, "guest requested exit");
    state.borrow::<v8::IsolateHandle>().terminate_execution();
}

#[op2(fast)]
fn op_mark_compile_failure(state: &mut OpState) {
    state.put(CompileFailure(true));
}

#[op2(async)]
async fn op_sleep(#[serde] millis: u64) {
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

/// Default lookup: `node_modules` in the directory and its ancestors.
#[op2]
#[serde]
fn op_module_node_modules_paths(#[string] dir: String) -> Vec<String> {
    to_strings(resolution::default_lookup_paths(Path::new(&dir)))
}

/// Lookup through the installed override, falling back to the default.
#[op2]
#[serde]
fn op_module_lookup_paths(state: &mut OpState, #[string] dir: String) -> Vec<String> {
    let requesting = (!dir.is_empty()).then(|| Path::new(&dir));
    match state.try_borrow::<ModuleResolutionOverride>() {
        Some(resolution) => to_strings(resolution.lookup_paths(requesting)),
        None => requesting
            .map(|dir| to_strings(resolution::default_lookup_paths(dir)))
            .unwrap_or_default(),
    }
}

#[op2]
#[serde]
fn op_module_probe(#[string] request: String, #[serde] paths: Vec<String>) -> Option<String> {
    let dirs: Vec<PathBuf> = paths.into_iter().map(PathBuf::from).collect();
    resolution::probe(&request, &dirs).map(|found| normalize(&found).display().to_string())
}

#[op2]
#[serde]
fn op_module_root_anchor(state: &mut OpState) -> Option<String> {
    state
        .try_borrow::<ModuleResolutionOverride>()
        .map(|resolution| resolution.root_anchor().display().to_string())
}

#[op2]
#[serde]
fn op_fs_read_file(#[string] path: String) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

#[op2]
#[serde]
fn op_fs_stat(#[string] path: String) -> Option<FileStat> {
    let metadata = std::fs::metadata(path).ok()?;
    Some(FileStat {
        is_file: metadata.is_file(),
        is_directory: metadata.is_dir(),
        size: metadata.len(),
    })
}

#[op2]
#[serde]
fn op_fs_read_dir(#[string] path: String) -> Option<Vec<String>> {
    let entries = std::fs::read_dir(path).ok()?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    Some(names)
}

#[op2]
#[serde]
fn op_fs_realpath(#[string] path: String) -> Option<String> {
    std::fs::canonicalize(path)
        .ok()
        .map(|real| real.display().to_string())
}

#[op2]
#[string]
fn op_path_join(#[serde] parts: Vec<String>) -> String {
    display(&join(&parts))
}

#[op2]
#[string]
fn op_path_resolve(#[string] cwd: String, #[serde] parts: Vec<String>) -> String {
    display(&resolve(Path::new(&cwd), &parts))
}

#[op2]
#[string]
fn op_path_normalize(#[string] path: String) -> String {
    display(&normalize(Path::new(&path)))
}

#[op2]
#[string]
fn op_path_dirname(#[string] path: String) -> String {
    dirname(Path::new(&path))
}

#[op2]
#[string]
fn op_path_basename(#[string] path: String) -> String {
    Path::new(&path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[op2]
#[string]
fn op_path_extname(#[string] path: String) -> String {
    Path::new(&path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[op2]
#[string]
fn op_path_relative(#[string] from: String, #[string] to: String) -> String {
    relative(Path::new(&from), Path::new(&to))
        .display()
        .to_string()
}

fn to_strings(paths: Vec<PathBuf>) -> Vec<String> {
    paths.into_iter().map(|p| p.display().to_string()).collect()
}

fn display(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        ".".to_string()
    } else {
        path.display().to_string()
    }
}

/// Lexically collapse `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Concatenate every non-empty segment, absolute ones included.
pub(crate) fn join(parts: &[String]) -> PathBuf {
    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(MAIN_SEPARATOR_STR);
    normalize(Path::new(&joined))
}

/// Right-to-left resolution: the last absolute segment wins.
pub(crate) fn resolve(cwd: &Path, parts: &[String]) -> PathBuf {
    let mut out = cwd.to_path_buf();
    for part in parts.iter().filter(|part| !part.is_empty()) {
        out.push(part);
    }
    normalize(&out)
}

pub(crate) fn dirname(path: &Path) -> String {
    match path.parent() {
        Some(parent) if parent.as_os_str().is_empty() => ".".to_string(),
        Some(parent) => parent.display().to_string(),
        None => display(path),
    }
}

pub(crate) fn relative(from: &Path, to: &Path) -> PathBuf {
    let from = normalize(from);
    let to = normalize(to);
    let from_parts: Vec<Component> = from.components().collect();
    let to_parts: Vec<Component> = to.components().collect();
    let common = from_parts
        .iter()
        .zip(&to_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from_parts.len() {
        out.push("..");
    }
    for part in &to_parts[common..] {
        out.push(part.as_os_str());
    }
    out
}
