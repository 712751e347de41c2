use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::env::{split_list, Env, CALLER_TASK_ID, FORWARDED_KEYS, TASK_ID};
use crate::event::GithubEvent;
use crate::target::Target;
use crate::task::Task;

/// What a task hands to the tasks it chains to with `next`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallerFrame {
    pub task_id: String,
    pub seed: i64,
    pub exclude: Option<usize>,
    /// Only the forwardable keys of the caller's namespace.
    pub env: Env,
}

/// The namespace one invocation runs in.
///
/// Built fresh for every invocation from the session base environment, so
/// actions may write result keys into it freely.
#[derive(Debug, Clone)]
pub struct Context {
    pub target: Arc<Target>,
    pub task: Arc<Task>,
    pub caller: Option<String>,
    pub env: Env,
}

impl Context {
    /// Layering: base, target fields, task id, config env, task env, then the
    /// caller's forwarded keys.
    pub fn build(
        base: &Env,
        config_env: &BTreeMap<String, String>,
        target: Arc<Target>,
        task: Arc<Task>,
        caller: Option<&CallerFrame>,
    ) -> Self {
        let mut env = base.clone();
        target.flatten_into(&mut env);
        env.set(TASK_ID, task.id.clone());
        env.apply(config_env);
        env.apply(&task.env);
        if let Some(frame) = caller {
            env.set(CALLER_TASK_ID, frame.task_id.clone());
            env.overlay(&frame.env);
        }
        Self {
            caller: caller.map(|f| f.task_id.clone()),
            target,
            task,
            env,
        }
    }

    pub fn is_called(&self) -> bool {
        self.caller.is_some()
    }

    /// Variables handed to the condition evaluator.
    pub fn condition_vars(&self, event: Option<&GithubEvent>) -> Value {
        let mut vars: Map<String, Value> = self.target.vars();

        let github = match event {
            Some(e) => json!({ "event_name": e.name, "event": e.payload }),
            None => json!({ "event_name": "", "event": {} }),
        };
        vars.insert("github".to_string(), github);
        vars.insert("env".to_string(), json!(self.env.as_map()));

        if let Some(caller) = &self.caller {
            vars.insert("caller_task_id".to_string(), json!(caller));
        }
        for key in FORWARDED_KEYS {
            let Some(value) = self.env.get(key) else {
                continue;
            };
            let name = format!(
                "caller_{}",
                key.trim_start_matches("TRIAGE_").to_ascii_lowercase()
            );
            let value = if key.ends_with("_UPDATED") {
                json!(split_list(value))
            } else {
                json!(value)
            };
            vars.insert(name, value);
        }
        Value::Object(vars)
    }
}
