use anyhow::Context;
use std::path::{Path, PathBuf};

const CONFIG_TEMPLATE: &str = r#"---
# generated by triage init
tasks:
  -
    id: set-question-label
    if: 'is_issue and labels|length == 0 and title is endingwith("?")'
    do:
      labels: [question]
    ok:
      run: echo 'Set labels'
    ng:
      run: echo 'failed'
    name: Set 'question' label
"#;

const WORKFLOW_TEMPLATE: &str = r#"name: triage workflow
on:
  issues:
    types: [opened]
  issue_comment:
    types: [created]
  pull_request:
    types: [opened]

jobs:
  run-workflow:
    name: Run workflow
    runs-on: ubuntu-latest
    steps:
      - name: Checkout
        uses: actions/checkout@v4
      - name: Run triage
        run: triage run {config}
        env:
          GITHUB_TOKEN: ${{ secrets.GITHUB_TOKEN }}
"#;

pub fn run(name: &str, workflow: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from(format!("{name}.yml"));
    create_new(&config_path, CONFIG_TEMPLATE)?;
    println!("  created: {}", config_path.display());

    if workflow {
        let dir = Path::new(".github").join("workflows");
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let workflow_path = dir.join("triage_workflow.yml");
        let body = WORKFLOW_TEMPLATE.replace("{config}", &config_path.to_string_lossy());
        create_new(&workflow_path, &body)?;
        println!("  created: {}", workflow_path.display());
    }
    Ok(())
}

fn create_new(path: &Path, content: &str) -> anyhow::Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::config::Config;
    use triage_core::env::Env;

    #[test]
    fn skeleton_is_a_valid_config() {
        let config = Config::from_yaml(CONFIG_TEMPLATE, &Env::new()).unwrap();
        assert_eq!(config.tasks.len(), 1);
        assert_eq!(config.tasks[0].id, "set-question-label");
    }

    #[test]
    fn workflow_runs_the_generated_config() {
        let body = WORKFLOW_TEMPLATE.replace("{config}", "triage.yml");
        assert!(body.contains("run: triage run triage.yml"));
        assert!(body.contains("${{ secrets.GITHUB_TOKEN }}"));
    }
}
