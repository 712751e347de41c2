use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Do,
    Ok,
    Ng,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Do => "do",
            Phase::Ok => "ok",
            Phase::Ng => "ng",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// Exactly one side effect. Empty `Assignees` / `Reviewers` lists mean "take
/// them from `GITHUB_ASSIGNEES` / `GITHUB_REVIEWERS`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run(String),
    Labels(Vec<String>),
    Assignees(Vec<String>),
    Reviewers(Vec<String>),
    Comment(String),
    State(String),
    Notify(String),
    Next(Vec<String>),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Run(_) => "run",
            Action::Labels(_) => "labels",
            Action::Assignees(_) => "assignees",
            Action::Reviewers(_) => "reviewers",
            Action::Comment(_) => "comment",
            Action::State(_) => "state",
            Action::Notify(_) => "notify",
            Action::Next(_) => "next",
        }
    }
}

pub const STATE_CLOSE: [&str; 2] = ["close", "closed"];
pub const STATE_MERGE: [&str; 2] = ["merge", "merged"];

pub fn is_valid_state(state: &str) -> bool {
    STATE_CLOSE.contains(&state) || STATE_MERGE.contains(&state)
}

/// Action as written in YAML: every kind optional, converted with
/// [`RawAction::into_action`] once the "exactly one" rule has been checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notify: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<Vec<String>>,
}

impl RawAction {
    /// Every kind this action defines. `allow_empty_*` say whether an empty
    /// list still counts because a fallback variable is available.
    pub fn definitions(&self, allow_empty_assignees: bool, allow_empty_reviewers: bool) -> Vec<Action> {
        let mut out = Vec::new();
        if let Some(run) = self.run.as_ref().filter(|s| !s.is_empty()) {
            out.push(Action::Run(run.clone()));
        }
        if let Some(labels) = self.labels.as_ref().filter(|v| !v.is_empty()) {
            out.push(Action::Labels(labels.clone()));
        }
        if let Some(assignees) = &self.assignees {
            if !assignees.is_empty() || allow_empty_assignees {
                out.push(Action::Assignees(assignees.clone()));
            }
        }
        if let Some(reviewers) = &self.reviewers {
            if !reviewers.is_empty() || allow_empty_reviewers {
                out.push(Action::Reviewers(reviewers.clone()));
            }
        }
        if let Some(comment) = self.comment.as_ref().filter(|s| !s.is_empty()) {
            out.push(Action::Comment(comment.clone()));
        }
        if let Some(state) = self.state.as_ref().filter(|s| !s.is_empty()) {
            out.push(Action::State(state.clone()));
        }
        if let Some(notify) = self.notify.as_ref().filter(|s| !s.is_empty()) {
            out.push(Action::Notify(notify.clone()));
        }
        if let Some(next) = self.next.as_ref().filter(|v| !v.is_empty()) {
            out.push(Action::Next(next.clone()));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub name: Option<String>,
    pub condition: Option<String>,
    pub do_action: Action,
    pub ok_action: Option<Action>,
    pub ng_action: Option<Action>,
    pub env: BTreeMap<String, String>,
}

impl Task {
    pub fn action(&self, phase: Phase) -> Option<&Action> {
        match phase {
            Phase::Do => Some(&self.do_action),
            Phase::Ok => self.ok_action.as_ref(),
            Phase::Ng => self.ng_action.as_ref(),
        }
    }

    /// Tasks without a condition only run when another task calls them.
    pub fn is_callable_only(&self) -> bool {
        self.condition.is_none()
    }
}
