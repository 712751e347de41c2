use std::path::Path;

use anyhow::Context;
use triage_core::config::Config;
use triage_core::env::Env;

use crate::output::{print_json, print_report};

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let env = Env::from_process();
    let config = Config::load(config_path, &env)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        tasks = config.tasks.len(),
        "starting run"
    );

    let runner = super::build_runner(config, env)?;
    let report = super::runtime()?.block_on(runner.run())?;

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(())
}
