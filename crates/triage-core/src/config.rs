use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::env::{Env, GITHUB_ASSIGNEES, GITHUB_REVIEWERS};
use crate::error::{Result, TriageError};
use crate::names::LinkedNames;
use crate::task::{is_valid_state, Action, RawAction, Task};

// ---------------------------------------------------------------------------
// ConfigFile
// ---------------------------------------------------------------------------

/// The YAML document as written, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub tasks: Vec<TaskFile>,
    #[serde(default, deserialize_with = "string_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default, rename = "linkedNames")]
    pub linked_names: LinkedNames,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskFile {
    pub id: String,
    #[serde(default, rename = "if")]
    pub condition: Option<String>,
    #[serde(default, rename = "do")]
    pub do_action: Option<RawAction>,
    #[serde(default, rename = "ok")]
    pub ok_action: Option<RawAction>,
    #[serde(default, rename = "ng")]
    pub ng_action: Option<RawAction>,
    #[serde(default, deserialize_with = "string_map")]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ConfigFile {
    pub fn parse(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Every problem in the document, one message each. Empty means valid.
    pub fn check_syntax(&self, process_env: &Env) -> Vec<String> {
        let mut errors = Vec::new();
        let ids: HashSet<&str> = self.tasks.iter().map(|t| t.id.as_str()).collect();
        let mut seen = HashSet::new();

        for task in &self.tasks {
            let prefix = format!("[{}] ", task.id);
            if task.id.trim().is_empty() {
                errors.push("task id must not be empty".to_string());
            }
            if !seen.insert(task.id.as_str()) {
                errors.push(format!("duplicate task id: {}", task.id));
            }

            let (empty_assignees, empty_reviewers) = self.fallbacks(task, process_env);
            let phases = [
                ("do", task.do_action.as_ref()),
                ("ok", task.ok_action.as_ref()),
                ("ng", task.ng_action.as_ref()),
            ];
            if task.do_action.is_none() {
                errors.push(format!("{prefix}not found `do:` action"));
            }
            for (phase, raw) in phases {
                let Some(raw) = raw else { continue };
                let defs = raw.definitions(empty_assignees, empty_reviewers);
                if defs.len() != 1 {
                    errors.push(format!(
                        "{prefix}invalid `{phase}:` action (want 1 definition, got {})",
                        defs.len()
                    ));
                    continue;
                }
                match &defs[0] {
                    Action::State(state) if !is_valid_state(state) => {
                        errors.push(format!("{prefix}invalid `{phase}:` state: {state}"));
                    }
                    Action::Next(next) => {
                        for id in next.iter().filter(|id| !ids.contains(id.as_str())) {
                            errors.push(format!("{prefix}`{phase}:` calls unknown task: {id}"));
                        }
                    }
                    _ => {}
                }
            }
        }

        errors.extend(self.linked_names.check_syntax());
        errors
    }

    /// Validate and convert into the typed model.
    pub fn into_config(self, process_env: &Env) -> Result<Config> {
        let errors = self.check_syntax(process_env);
        if !errors.is_empty() {
            return Err(TriageError::InvalidConfig(errors.join("\n")));
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for task in &self.tasks {
            let (empty_assignees, empty_reviewers) = self.fallbacks(task, process_env);
            let convert = |raw: &Option<RawAction>| -> Option<Action> {
                raw.as_ref()
                    .and_then(|r| r.definitions(empty_assignees, empty_reviewers).pop())
            };
            let do_action = convert(&task.do_action).ok_or_else(|| {
                TriageError::InvalidConfig(format!("[{}] not found `do:` action", task.id))
            })?;
            tasks.push(Arc::new(Task {
                id: task.id.clone(),
                name: task.name.clone().filter(|n| !n.is_empty()),
                condition: task
                    .condition
                    .as_ref()
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty()),
                do_action,
                ok_action: convert(&task.ok_action),
                ng_action: convert(&task.ng_action),
                env: task.env.clone(),
            }));
        }

        Ok(Config {
            tasks,
            env: self.env,
            linked_names: self.linked_names,
        })
    }

    /// Whether an empty assignees / reviewers list has a fallback value.
    fn fallbacks(&self, task: &TaskFile, process_env: &Env) -> (bool, bool) {
        let available = |key: &str| {
            task.env.get(key).is_some_and(|v| !v.is_empty())
                || self.env.get(key).is_some_and(|v| !v.is_empty())
                || process_env.non_empty(key).is_some()
        };
        (available(GITHUB_ASSIGNEES), available(GITHUB_REVIEWERS))
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// A validated configuration. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub tasks: Vec<Arc<Task>>,
    pub env: BTreeMap<String, String>,
    pub linked_names: LinkedNames,
}

impl Config {
    pub fn load(path: &Path, process_env: &Env) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data, process_env)
    }

    pub fn from_yaml(yaml: &str, process_env: &Env) -> Result<Self> {
        ConfigFile::parse(yaml)?.into_config(process_env)
    }

    pub fn find_task(&self, id: &str) -> Result<Arc<Task>> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| TriageError::TaskNotFound(id.to_string()))
    }
}

/// Env maps accept strings, numbers and booleans.
fn string_map<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<BTreeMap<String, serde_yaml::Value>> = Option::deserialize(deserializer)?;
    raw.unwrap_or_default()
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                serde_yaml::Value::Null => String::new(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::String(s) => s,
                other => {
                    return Err(D::Error::custom(format!(
                        "env value for '{k}' must be a scalar, got {other:?}"
                    )))
                }
            };
            Ok((k, value))
        })
        .collect()
}
