use std::path::Path;

use anyhow::Context;
use serde::Serialize;
use triage_core::config::ConfigFile;
use triage_core::env::Env;

use crate::output::print_json;

#[derive(Serialize)]
struct CheckResult {
    ok: bool,
    errors: Vec<String>,
}

pub fn run(config_path: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let file = ConfigFile::parse(&data)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    let errors = file.check_syntax(&Env::from_process());

    if json {
        print_json(&CheckResult {
            ok: errors.is_empty(),
            errors: errors.clone(),
        })?;
    } else if errors.is_empty() {
        println!("OK");
    } else {
        for e in &errors {
            println!("  {e}");
        }
    }

    if !errors.is_empty() {
        anyhow::bail!(
            "{} has {} syntax error(s)",
            config_path.display(),
            errors.len()
        );
    }
    Ok(())
}
