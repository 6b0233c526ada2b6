//! npmhost launcher
//!
//! Runs the npm CLI inside an embedded V8 context:
//!
//! ```text
//! npmhost [--package-dir <path>] <npm args...>
//! ```
//!
//! Every argument except the host's own `--package-dir <path>` is handed to
//! npm untouched, `--help` and `--version` included. The process exits with
//! whatever status npm settles on, or 1 if the host itself fails.

mod logging;
mod output;

use anyhow::Context;
use npmhost_runtime::{run, HostOptions, RunResult, V8Engine};
use output::{resolve_color_choice, StyledOutput};

fn main() {
    logging::init();

    let result = launch().unwrap_or_else(|err| RunResult {
        exit_code: 1,
        errors: vec![format!("Error: {:#}", err)],
    });

    if !result.errors.is_empty() {
        StyledOutput::new(resolve_color_choice()).errors(&result.errors);
    }
    std::process::exit(result.exit_code);
}

fn launch() -> anyhow::Result<RunResult> {
    let args: Vec<String> = std::env::args_os()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();
    let cwd = std::env::current_dir().context("cannot read the working directory")?;
    let options = HostOptions::load(&cwd).context("cannot load host configuration")?;
    tracing::debug!(strategy = ?options.strategy, "host options loaded");

    Ok(run(V8Engine::new(), &args, &cwd, &options))
}
