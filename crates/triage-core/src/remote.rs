//! Seams to the issue tracker and the chat service.
//!
//! The engine only talks to the outside world through these traits; the
//! concrete HTTP clients live in `triage-remote`.

use async_trait::async_trait;

use crate::error::Result;
use crate::target::{Target, Targets};

#[async_trait]
pub trait Tracker: Send + Sync {
    /// Every open issue and non-draft pull request.
    async fn fetch_targets(&self) -> Result<Targets>;

    /// One target. Closed, merged or draft items yield `TriageError::NotOpen`.
    async fn fetch_target(&self, number: u64) -> Result<Target>;

    async fn set_labels(&self, number: u64, labels: &[String]) -> Result<()>;

    async fn set_assignees(&self, number: u64, assignees: &[String]) -> Result<()>;

    async fn set_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()>;

    async fn add_comment(&self, number: u64, body: &str) -> Result<()>;

    async fn close_issue(&self, number: u64) -> Result<()>;

    async fn merge_pull_request(&self, number: u64) -> Result<()>;

    /// Expand `org/team` handles into member logins and strip leading `@`.
    async fn resolve_users(&self, names: &[String]) -> Result<Vec<String>>;
}

/// A chat message and the target/task it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub repository: String,
    pub number: u64,
    pub url: String,
    pub task_id: String,
}

#[async_trait]
pub trait Chat: Send + Sync {
    /// False for transports (incoming webhooks) that cannot address people.
    fn supports_mentions(&self) -> bool;

    async fn post_message(&self, message: &Message) -> Result<()>;

    /// The token that mentions `name` in a message, e.g. `<@U123>`.
    async fn mention_link(&self, name: &str) -> Result<String>;
}
