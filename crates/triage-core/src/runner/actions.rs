use std::collections::BTreeSet;
use std::sync::Arc;

use super::{command, Invocation, Runner, Scope};
use crate::context::CallerFrame;
use crate::env::{
    join_list, ASSIGNEES_BEHAVIOR, ASSIGNEES_UPDATED, COMMENT_CREATED, COMMENT_MAX,
    GITHUB_ASSIGNEES, GITHUB_ASSIGNEES_SAMPLE, GITHUB_COMMENT_MENTIONS,
    GITHUB_COMMENT_MENTIONS_SAMPLE, GITHUB_REPOSITORY, GITHUB_REVIEWERS, GITHUB_REVIEWERS_SAMPLE,
    LABELS_BEHAVIOR, LABELS_UPDATED, NOTIFY_SENT, REVIEWERS_UPDATED, SLACK_MENTIONS,
    SLACK_MENTIONS_SAMPLE, STATE_CHANGED,
};
use crate::error::{Result, TriageError};
use crate::remote::Message;
use crate::task::{Action, STATE_CLOSE, STATE_MERGE};

const DEFAULT_COMMENT_MAX: usize = 5;

/// Hidden marker appended to every comment the engine writes.
pub fn comment_signature(task_id: &str, phase: &str) -> String {
    format!("<!-- triage:{task_id}:{phase} -->")
}

impl Runner {
    pub(crate) async fn perform(&self, action: &Action, scope: &mut Scope<'_>) -> Result<()> {
        scope.sampler.init_seed();
        tracing::debug!(phase = %scope.phase, action = action.kind(), "perform");
        match action {
            Action::Run(command) => self.perform_run(command, scope).await,
            Action::Labels(labels) => self.perform_labels(labels, scope).await,
            Action::Assignees(assignees) => self.perform_assignees(assignees, scope).await,
            Action::Reviewers(reviewers) => self.perform_reviewers(reviewers, scope).await,
            Action::Comment(comment) => self.perform_comment(comment, scope).await,
            Action::State(state) => self.perform_state(state, scope).await,
            Action::Notify(notify) => self.perform_notify(notify, scope).await,
            Action::Next(next) => self.perform_next(next, scope),
        }
    }

    async fn perform_run(&self, command: &str, scope: &mut Scope<'_>) -> Result<()> {
        tracing::info!(phase = %scope.phase, "run command: {command}");
        command::run_command(command, &mut scope.ctx.env).await
    }

    async fn perform_labels(&self, labels: &[String], scope: &mut Scope<'_>) -> Result<()> {
        let target = Arc::clone(&scope.ctx.target);
        let behavior = scope.ctx.env.get(LABELS_BEHAVIOR).unwrap_or_default();
        let desired = apply_behavior(LABELS_BEHAVIOR, behavior, labels, &target.labels)?;

        scope.ctx.env.set(LABELS_UPDATED, join_list(&desired));
        if same_set(&desired, &target.labels) {
            return Err(TriageError::AlreadyInState(format!(
                "labels: {}",
                join_list(&desired)
            )));
        }
        tracing::info!(phase = %scope.phase, "set labels: {}", join_list(&desired));
        self.tracker.set_labels(target.number, &desired).await
    }

    async fn perform_assignees(&self, assignees: &[String], scope: &mut Scope<'_>) -> Result<()> {
        let target = Arc::clone(&scope.ctx.target);
        let names = self.requested_names(assignees, GITHUB_ASSIGNEES, scope);
        let resolved = self.tracker.resolve_users(&names).await?;
        let limit = scope.ctx.env.usize_setting(GITHUB_ASSIGNEES_SAMPLE)?;
        let sampled = scope.sampler.sample(resolved, limit);

        let behavior = scope.ctx.env.get(ASSIGNEES_BEHAVIOR).unwrap_or_default();
        let desired = apply_behavior(ASSIGNEES_BEHAVIOR, behavior, &sampled, &target.assignees)?;

        scope.ctx.env.set(ASSIGNEES_UPDATED, join_list(&desired));
        if same_set(&desired, &target.assignees) {
            return Err(TriageError::AlreadyInState(format!(
                "assignees: {}",
                join_list(&desired)
            )));
        }
        tracing::info!(phase = %scope.phase, "set assignees: {}", join_list(&desired));
        self.tracker.set_assignees(target.number, &desired).await
    }

    async fn perform_reviewers(&self, reviewers: &[String], scope: &mut Scope<'_>) -> Result<()> {
        let target = Arc::clone(&scope.ctx.target);
        let names: BTreeSet<String> = self
            .requested_names(reviewers, GITHUB_REVIEWERS, scope)
            .into_iter()
            .collect();
        let names: Vec<String> = names.into_iter().collect();

        // An author cannot review their own pull request.
        if let Some(i) = names.iter().position(|n| *n == target.author) {
            scope.sampler.set_exclude(i);
        }
        let limit = scope.ctx.env.usize_setting(GITHUB_REVIEWERS_SAMPLE)?;
        let sampled = scope.sampler.sample(names, limit);
        if sampled.is_empty() {
            return Err(TriageError::NoReviewer(format!(
                "no candidates for #{}",
                target.number
            )));
        }

        let mut requested: Vec<String> = sampled
            .into_iter()
            .filter(|r| !target.code_owners.contains(r))
            .collect();
        requested.sort();
        scope.ctx.env.set(REVIEWERS_UPDATED, join_list(&requested));
        if requested.is_empty() || same_set(&requested, &target.no_code_owner_reviewers()) {
            return Err(TriageError::AlreadyInState(format!(
                "reviewers: {}",
                join_list(&target.reviewers)
            )));
        }
        tracing::info!(phase = %scope.phase, "set reviewers: {}", join_list(&requested));
        self.tracker.set_reviewers(target.number, &requested).await
    }

    async fn perform_comment(&self, template: &str, scope: &mut Scope<'_>) -> Result<()> {
        let target = Arc::clone(&scope.ctx.target);
        let max = scope
            .ctx
            .env
            .usize_setting(COMMENT_MAX)?
            .unwrap_or(DEFAULT_COMMENT_MAX);
        if target.number_of_consecutive_comments >= max as u64 {
            return Err(TriageError::TooManyComments(
                target.number_of_consecutive_comments,
            ));
        }

        let mut body = scope.ctx.env.expand(template);
        let mentions = self
            .config
            .linked_names
            .to_primary_names(&scope.ctx.env.list(GITHUB_COMMENT_MENTIONS));
        let limit = scope.ctx.env.usize_setting(GITHUB_COMMENT_MENTIONS_SAMPLE)?;
        let mentions: Vec<String> = scope
            .sampler
            .sample(mentions, limit)
            .into_iter()
            .map(|m| {
                if m.starts_with('@') {
                    m
                } else {
                    format!("@{m}")
                }
            })
            .collect();
        if !mentions.is_empty() {
            body = format!("{} {body}", mentions.join(" "));
        }

        let rendered = format!(
            "{body}\n{}",
            comment_signature(&scope.ctx.task.id, scope.phase.as_str())
        );
        if target.latest_comment_body.trim() == rendered.trim() {
            scope.ctx.env.set(COMMENT_CREATED, body);
            return Err(TriageError::AlreadyInState(format!(
                "comment on #{} is the latest one",
                target.number
            )));
        }
        tracing::info!(phase = %scope.phase, "add comment: {body}");
        self.tracker.add_comment(target.number, &rendered).await?;
        scope.ctx.env.set(COMMENT_CREATED, body);
        Ok(())
    }

    async fn perform_state(&self, state: &str, scope: &mut Scope<'_>) -> Result<()> {
        let number = scope.ctx.target.number;
        let changed = if STATE_CLOSE.contains(&state) {
            tracing::info!(phase = %scope.phase, "close #{number}");
            self.tracker.close_issue(number).await?;
            "closed"
        } else if STATE_MERGE.contains(&state) {
            tracing::info!(phase = %scope.phase, "merge #{number}");
            self.tracker.merge_pull_request(number).await?;
            "merged"
        } else {
            return Err(TriageError::InvalidState(state.to_string()));
        };
        scope.ctx.env.set(STATE_CHANGED, changed);
        Ok(())
    }

    async fn perform_notify(&self, template: &str, scope: &mut Scope<'_>) -> Result<()> {
        let mut text = scope.ctx.env.expand(template);
        let mentions = self
            .config
            .linked_names
            .to_alias_names(&scope.ctx.env.list(SLACK_MENTIONS));
        let limit = scope.ctx.env.usize_setting(SLACK_MENTIONS_SAMPLE)?;
        let mentions = scope.sampler.sample(mentions, limit);

        if !mentions.is_empty() {
            if !self.chat.supports_mentions() {
                return Err(TriageError::MentionsUnsupported);
            }
            let mut links = Vec::with_capacity(mentions.len());
            for name in &mentions {
                links.push(self.chat.mention_link(name).await?);
            }
            text = format!("{} {text}", links.join(" "));
        }

        let message = Message {
            text: text.clone(),
            repository: scope
                .ctx
                .env
                .get(GITHUB_REPOSITORY)
                .unwrap_or_default()
                .to_string(),
            number: scope.ctx.target.number,
            url: scope.ctx.target.url.clone(),
            task_id: scope.ctx.task.id.clone(),
        };
        tracing::info!(phase = %scope.phase, "send notification: {text}");
        self.chat.post_message(&message).await?;
        scope.ctx.env.set(NOTIFY_SENT, text);
        Ok(())
    }

    fn perform_next(&self, next: &[String], scope: &mut Scope<'_>) -> Result<()> {
        let tasks = next
            .iter()
            .map(|id| self.config.find_task(id))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(phase = %scope.phase, "call next task: {}", join_list(next));
        for task in tasks {
            scope.queue.push_back(Invocation {
                target: Arc::clone(&scope.ctx.target),
                task,
                caller: Some(CallerFrame {
                    task_id: scope.ctx.task.id.clone(),
                    seed: scope.sampler.seed(),
                    exclude: scope.sampler.exclude(),
                    env: scope.ctx.env.forwarded(),
                }),
            });
        }
        Ok(())
    }

    /// The configured names, or the fallback variable when the list is
    /// empty, translated to tracker logins.
    fn requested_names(&self, names: &[String], fallback: &str, scope: &Scope<'_>) -> Vec<String> {
        let names = if names.is_empty() {
            scope.ctx.env.list(fallback)
        } else {
            names.to_vec()
        };
        self.config.linked_names.to_primary_names(&names)
    }
}

/// Combine `requested` with `current` per behavior. Result is sorted and
/// unique.
fn apply_behavior(
    key: &str,
    behavior: &str,
    requested: &[String],
    current: &[String],
) -> Result<Vec<String>> {
    let set: BTreeSet<&String> = match behavior {
        "add" => current.iter().chain(requested).collect(),
        "remove" => current.iter().filter(|c| !requested.contains(*c)).collect(),
        "" | "replace" => requested.iter().collect(),
        other => {
            return Err(TriageError::InvalidBehavior {
                key: key.to_string(),
                value: other.to_string(),
            })
        }
    };
    Ok(set.into_iter().cloned().collect())
}

fn same_set(a: &[String], b: &[String]) -> bool {
    let a: BTreeSet<&String> = a.iter().collect();
    let b: BTreeSet<&String> = b.iter().collect();
    a == b
}
