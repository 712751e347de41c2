use std::path::Path;

use serde::Deserialize;

use crate::env::{Env, GITHUB_EVENT_NAME, GITHUB_EVENT_PATH};
use crate::error::{Result, TriageError};

/// The workflow event that started this session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GithubEvent {
    pub name: String,
    /// Issue or pull request number from the payload, 0 when there is none.
    pub number: u64,
    pub state: String,
    pub payload: serde_json::Value,
}

#[derive(Deserialize, Default)]
struct Subject {
    #[serde(default)]
    number: u64,
    #[serde(default)]
    state: String,
}

#[derive(Deserialize, Default)]
struct Envelope {
    #[serde(default)]
    pull_request: Option<Subject>,
    #[serde(default)]
    issue: Option<Subject>,
}

impl GithubEvent {
    /// Read `GITHUB_EVENT_NAME` and the payload at `GITHUB_EVENT_PATH`.
    /// `None` when no event name is set.
    pub fn from_env(env: &Env) -> Result<Option<Self>> {
        let Some(name) = env.non_empty(GITHUB_EVENT_NAME) else {
            return Ok(None);
        };
        let path = env
            .non_empty(GITHUB_EVENT_PATH)
            .ok_or_else(|| TriageError::MissingEnv(GITHUB_EVENT_PATH.to_string()))?;
        Self::from_file(name, Path::new(path)).map(Some)
    }

    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::decode(name, &data)
    }

    pub fn decode(name: &str, data: &str) -> Result<Self> {
        let payload: serde_json::Value = serde_json::from_str(data)?;
        let envelope: Envelope = serde_json::from_value(payload.clone())
            .map_err(|e| TriageError::InvalidEvent(e.to_string()))?;
        let subject = envelope
            .pull_request
            .filter(|s| s.number > 0)
            .or(envelope.issue.filter(|s| s.number > 0))
            .unwrap_or_default();
        if subject.number == 0 && is_single_target_name(name) {
            return Err(TriageError::InvalidEvent(format!(
                "can not parse target number from {name} event"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            number: subject.number,
            state: subject.state,
            payload,
        })
    }

    /// Events that are about exactly one issue or pull request.
    pub fn is_single_target(&self) -> bool {
        self.number > 0 && is_single_target_name(&self.name)
    }

    pub fn is_open(&self) -> bool {
        self.state == "open"
    }
}

fn is_single_target_name(name: &str) -> bool {
    name.starts_with("issue") || name.starts_with("pull_request")
}
