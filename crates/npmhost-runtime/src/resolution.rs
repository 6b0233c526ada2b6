//! Module resolution for the guest's CommonJS loader.
//!
//! The override itself is a plain function from the requesting module's
//! directory to an ordered list of search directories. The guest loader
//! calls back into it through a host op, so the package root never appears
//! in guest source text.

use std::path::{Path, PathBuf};

use crate::context::ExecutionContext;
use crate::engine::GuestContext;
use crate::error::HostError;
use crate::paths::ResolvedPaths;

/// File name of the anchor module that the rebound root `require` belongs to.
pub const ROOT_ANCHOR: &str = "[npmhost-root].js";

/// Extensions tried, in order, when a request names a file without one.
pub const EXTENSIONS: [&str; 3] = [".js", ".json", ".cjs"];

/// Redirects every lookup into the package-manager tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleResolutionOverride {
    package_root: PathBuf,
}

impl ModuleResolutionOverride {
    pub fn new(package_root: impl Into<PathBuf>) -> Self {
        Self {
            package_root: package_root.into(),
        }
    }

    pub fn for_paths(paths: &ResolvedPaths) -> Self {
        Self::new(paths.package_root.clone())
    }

    pub fn package_root(&self) -> &Path {
        &self.package_root
    }

    /// Search directories for a request made from `requesting_dir`:
    /// the requesting directory, the package root, then its `node_modules`.
    pub fn lookup_paths(&self, requesting_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::with_capacity(3);
        if let Some(dir) = requesting_dir {
            paths.push(dir.to_path_buf());
        }
        paths.push(self.package_root.clone());
        paths.push(self.package_root.join("node_modules"));
        paths
    }

    /// Filename of the module the rebound `require` is created for.
    pub fn root_anchor(&self) -> PathBuf {
        self.package_root.join(ROOT_ANCHOR)
    }
}

/// Search directories without an override: `node_modules` in `dir` and
/// each of its ancestors, nearest first.
pub fn default_lookup_paths(dir: &Path) -> Vec<PathBuf> {
    dir.ancestors()
        .filter(|d| d.file_name().map_or(true, |name| name != "node_modules"))
        .map(|d| d.join("node_modules"))
        .collect()
}

/// Find the file `request` names, trying each of `search_dirs` in order.
pub fn probe(request: &str, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    search_dirs.iter().find_map(|dir| {
        let base = dir.join(request);
        load_as_file(&base).or_else(|| load_as_directory(&base))
    })
}

fn load_as_file(base: &Path) -> Option<PathBuf> {
    if base.is_file() {
        return Some(base.to_path_buf());
    }
    let raw = base.as_os_str();
    EXTENSIONS.iter().find_map(|ext| {
        let mut candidate = raw.to_os_string();
        candidate.push(ext);
        let candidate = PathBuf::from(candidate);
        candidate.is_file().then_some(candidate)
    })
}

fn load_as_directory(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    if let Some(main) = package_main(dir) {
        let target = dir.join(main);
        if let Some(found) = load_as_file(&target).or_else(|| load_index(&target)) {
            return Some(found);
        }
    }
    load_index(dir)
}

fn load_index(dir: &Path) -> Option<PathBuf> {
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("index{}", ext)))
        .find(|candidate| candidate.is_file())
}

fn package_main(dir: &Path) -> Option<String> {
    let manifest = std::fs::read_to_string(dir.join("package.json")).ok()?;
    let value: serde_json::Value = serde_json::from_str(&manifest).ok()?;
    value
        .get("main")
        .and_then(serde_json::Value::as_str)
        .filter(|main| !main.is_empty())
        .map(str::to_string)
}

/// Installs the override into a live context.
pub struct ModuleResolutionShim;

impl ModuleResolutionShim {
    /// Swap the guest loader's lookup-path function and rebind `require`
    /// to the package root.
    pub fn install<C: GuestContext>(
        context: &mut ExecutionContext<'_, C>,
        paths: &ResolvedPaths,
    ) -> Result<ModuleResolutionOverride, HostError> {
        let resolution = ModuleResolutionOverride::for_paths(paths);
        context
            .guest_mut()
            .install_resolution_override(&resolution)
            .map_err(|err| {
                tracing::warn!(error = %err, "module resolution override rejected");
                HostError::ResolutionOverride(err.detail)
            })?;
        tracing::debug!(root = %resolution.package_root().display(), "module resolution override installed");
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContextHost;
    use crate::engine::testing::{sample_setup, Event, StubEngine};
    use crate::options::EngineOptions;
    use crate::process_state::EngineProcessState;
    use std::fs;

    #[test]
    fn test_lookup_order() {
        let resolution = ModuleResolutionOverride::new("/opt/npm");
        let paths = resolution.lookup_paths(Some(Path::new("/opt/npm/lib/commands")));
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/opt/npm/lib/commands"),
                PathBuf::from("/opt/npm"),
                PathBuf::from("/opt/npm/node_modules"),
            ]
        );
    }

    #[test]
    fn test_lookup_ignores_requesting_location_outside_tree() {
        let resolution = ModuleResolutionOverride::new("/opt/npm");
        let paths = resolution.lookup_paths(Some(Path::new("/home/user/project")));
        assert_eq!(paths[1], PathBuf::from("/opt/npm"));
        assert_eq!(paths[2], PathBuf::from("/opt/npm/node_modules"));
    }

    #[test]
    fn test_lookup_without_parent() {
        let resolution = ModuleResolutionOverride::new("/opt/npm");
        assert_eq!(
            resolution.lookup_paths(None),
            vec![PathBuf::from("/opt/npm"), PathBuf::from("/opt/npm/node_modules")]
        );
    }

    #[test]
    fn test_root_with_quotes_stays_data() {
        let resolution = ModuleResolutionOverride::new("/tmp/it's \"npm\"\\x");
        assert_eq!(
            resolution.lookup_paths(None)[0],
            PathBuf::from("/tmp/it's \"npm\"\\x")
        );
        assert!(resolution.root_anchor().starts_with("/tmp/it's \"npm\"\\x"));
    }

    #[test]
    fn test_default_lookup_walks_ancestors() {
        let paths = default_lookup_paths(Path::new("/a/node_modules/b/lib"));
        assert_eq!(paths[0], PathBuf::from("/a/node_modules/b/lib/node_modules"));
        assert_eq!(paths[1], PathBuf::from("/a/node_modules/b/node_modules"));
        assert!(!paths.contains(&PathBuf::from("/a/node_modules/node_modules")));
        assert_eq!(paths.last(), Some(&PathBuf::from("/node_modules")));
    }

    #[test]
    fn test_probe_files_and_extensions() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/cli.js"), "").unwrap();
        fs::write(root.join("lib/config.json"), "{}").unwrap();

        let dirs = vec![root.join("missing"), root.to_path_buf()];
        assert_eq!(probe("lib/cli.js", &dirs), Some(root.join("lib/cli.js")));
        assert_eq!(probe("lib/cli", &dirs), Some(root.join("lib/cli.js")));
        assert_eq!(probe("lib/config", &dirs), Some(root.join("lib/config.json")));
        assert_eq!(probe("lib/nothing", &dirs), None);
    }

    #[test]
    fn test_probe_package_main_and_index() {
        let temp = tempfile::tempdir().unwrap();
        let modules = temp.path().join("node_modules");
        fs::create_dir_all(modules.join("semver/dist")).unwrap();
        fs::write(
            modules.join("semver/package.json"),
            r#"{ "name": "semver", "main": "dist/semver" }"#,
        )
        .unwrap();
        fs::write(modules.join("semver/dist/semver.js"), "").unwrap();

        fs::create_dir_all(modules.join("abbrev")).unwrap();
        fs::write(modules.join("abbrev/index.js"), "").unwrap();

        let dirs = vec![modules.clone()];
        assert_eq!(probe("semver", &dirs), Some(modules.join("semver/dist/semver.js")));
        assert_eq!(probe("abbrev", &dirs), Some(modules.join("abbrev/index.js")));
    }

    #[test]
    fn test_probe_respects_search_order() {
        let temp = tempfile::tempdir().unwrap();
        let near = temp.path().join("near");
        let far = temp.path().join("far");
        fs::create_dir_all(&near).unwrap();
        fs::create_dir_all(&far).unwrap();
        fs::write(near.join("util.js"), "").unwrap();
        fs::write(far.join("util.js"), "").unwrap();

        assert_eq!(probe("util", &[near.clone(), far]), Some(near.join("util.js")));
    }

    #[test]
    fn test_shim_hands_override_to_guest_loader() {
        let engine = StubEngine::default();
        let journal = engine.journal();
        let state = EngineProcessState::initialize(engine, &EngineOptions::default()).unwrap();
        let setup = sample_setup();
        let paths = setup.paths.clone();

        {
            let mut context = ExecutionContextHost::new(&state).create(setup).unwrap();
            let resolution = ModuleResolutionShim::install(&mut context, &paths).unwrap();
            assert_eq!(resolution.package_root(), Path::new("/opt/npm"));
        }

        assert!(journal.contains(&Event::InstallOverride {
            candidates: vec![
                PathBuf::from("/opt/npm/lib"),
                PathBuf::from("/opt/npm"),
                PathBuf::from("/opt/npm/node_modules"),
            ],
        }));
    }

    #[test]
    fn test_shim_failure_is_contained() {
        let mut engine = StubEngine::default();
        engine.script.override_error = Some("Module._resolveLookupPaths is frozen".to_string());
        let journal = engine.journal();
        let state = EngineProcessState::initialize(engine, &EngineOptions::default()).unwrap();
        let setup = sample_setup();
        let paths = setup.paths.clone();

        {
            let mut context = ExecutionContextHost::new(&state).create(setup).unwrap();
            let err = ModuleResolutionShim::install(&mut context, &paths).unwrap_err();
            assert!(matches!(err, HostError::ResolutionOverride(_)));
            assert!(err.to_string().contains("frozen"));
        }

        assert_eq!(journal.held_layers(), 0);
    }
}
