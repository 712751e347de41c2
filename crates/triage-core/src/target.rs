use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env::{join_list, Env, TARGET_PREFIX};

/// An open issue or pull request as seen by the engine.
///
/// Field names double as condition variables (`is_issue`, `labels`, ...) and,
/// upper-cased under `TRIAGE_TARGET_`, as environment keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub number: u64,
    pub state: String,
    pub title: String,
    pub body: String,
    pub url: String,
    pub author: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub reviewers: Vec<String>,
    pub code_owners: Vec<String>,
    pub reviewers_who_approved: Vec<String>,
    pub code_owners_who_approved: Vec<String>,
    pub is_issue: bool,
    pub is_pull_request: bool,
    pub is_approved: bool,
    pub is_review_required: bool,
    pub is_change_requested: bool,
    pub mergeable: bool,
    pub changed_files: u64,
    pub hours_elapsed_since_created: i64,
    pub hours_elapsed_since_updated: i64,
    pub number_of_comments: u64,
    pub latest_comment_author: String,
    pub latest_comment_body: String,
    pub number_of_consecutive_comments: u64,
    pub login: String,
}

/// Targets keyed by number, iterated in ascending order.
pub type Targets = BTreeMap<u64, Target>;

impl Target {
    /// Reviewers that were requested explicitly rather than through code
    /// ownership.
    pub fn no_code_owner_reviewers(&self) -> Vec<String> {
        self.reviewers
            .iter()
            .filter(|r| !self.code_owners.contains(r))
            .cloned()
            .collect()
    }

    pub fn kind(&self) -> &'static str {
        if self.is_pull_request {
            "pull request"
        } else {
            "issue"
        }
    }

    /// Condition variables: every field at the top level plus
    /// `no_code_owner_reviewers`.
    pub fn vars(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut map = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        map.insert(
            "no_code_owner_reviewers".to_string(),
            serde_json::json!(self.no_code_owner_reviewers()),
        );
        map
    }

    /// Write every field into `env` as `TRIAGE_TARGET_<FIELD>`.
    pub fn flatten_into(&self, env: &mut Env) {
        for (key, value) in self.vars() {
            let rendered = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Array(items) => {
                    let items: Vec<String> = items
                        .into_iter()
                        .map(|v| match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect();
                    join_list(&items)
                }
                other => other.to_string(),
            };
            env.set(
                format!("{TARGET_PREFIX}{}", key.to_ascii_uppercase()),
                rendered,
            );
        }
    }
}
