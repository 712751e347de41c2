//! The scheduler: a FIFO worklist of (target, task) invocations drained until
//! nothing is left.

mod actions;
pub mod command;

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use tracing::Instrument;

use crate::condition::Evaluator;
use crate::config::Config;
use crate::context::{CallerFrame, Context};
use crate::env::{Env, DO_ERROR, SAMPLE_WITH_SAME_SEED};
use crate::error::{Result, TriageError};
use crate::event::GithubEvent;
use crate::remote::{Chat, Tracker};
use crate::sampling::Sampler;
use crate::target::{Target, Targets};
use crate::task::{Action, Phase, Task};

// ---------------------------------------------------------------------------
// Invocation / report types
// ---------------------------------------------------------------------------

/// One scheduled attempt to run a task against a target.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub target: Arc<Target>,
    pub task: Arc<Task>,
    /// Present when queued by a `next` action.
    pub caller: Option<CallerFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// The condition evaluated to false.
    NotMatched,
    /// No condition and not called by another task.
    CallableOnly,
    /// Nothing to do, the target closed, or the condition could not be
    /// evaluated.
    Skipped(String),
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvocationRecord {
    pub number: u64,
    pub task_id: String,
    pub called: bool,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Every processed invocation in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub invocations: Vec<InvocationRecord>,
}

impl RunReport {
    pub fn failures(&self) -> usize {
        self.invocations
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

pub struct Runner {
    config: Config,
    tracker: Arc<dyn Tracker>,
    chat: Arc<dyn Chat>,
    evaluator: Box<dyn Evaluator>,
    base_env: Env,
    event: Option<GithubEvent>,
}

/// Mutable state of the phase being executed.
pub(crate) struct Scope<'a> {
    pub ctx: &'a mut Context,
    pub sampler: &'a mut Sampler,
    pub phase: Phase,
    pub queue: &'a mut VecDeque<Invocation>,
}

impl Runner {
    /// `base_env` is the session environment every invocation starts from;
    /// the triggering event is decoded from it.
    pub fn new(
        config: Config,
        tracker: Arc<dyn Tracker>,
        chat: Arc<dyn Chat>,
        evaluator: Box<dyn Evaluator>,
        base_env: Env,
    ) -> Result<Self> {
        let event = GithubEvent::from_env(&base_env)?;
        Ok(Self {
            config,
            tracker,
            chat,
            evaluator,
            base_env,
            event,
        })
    }

    pub fn with_event(mut self, event: Option<GithubEvent>) -> Self {
        self.event = event;
        self
    }

    /// Fetch targets and drain the worklist. Only a failure to fetch the
    /// initial targets is returned as an error.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        let Some(targets) = self.fetch_initial_targets().await? else {
            return Ok(report);
        };
        tracing::info!(
            targets = targets.len(),
            tasks = self.config.tasks.len(),
            "starting session"
        );

        let mut queue: VecDeque<Invocation> = VecDeque::new();
        for target in targets.into_values() {
            let target = Arc::new(target);
            for task in &self.config.tasks {
                queue.push_back(Invocation {
                    target: Arc::clone(&target),
                    task: Arc::clone(task),
                    caller: None,
                });
            }
        }

        while let Some(invocation) = queue.pop_front() {
            let record_base = (
                invocation.target.number,
                invocation.task.id.clone(),
                invocation.caller.is_some(),
            );
            let span = tracing::info_span!(
                "invocation",
                number = invocation.target.number,
                task = %invocation.task.id,
                called = invocation.caller.is_some(),
            );
            let outcome = self.process(invocation, &mut queue).instrument(span).await;
            report.invocations.push(InvocationRecord {
                number: record_base.0,
                task_id: record_base.1,
                called: record_base.2,
                outcome,
            });
        }

        tracing::info!(
            invocations = report.invocations.len(),
            failures = report.failures(),
            "session finished"
        );
        Ok(report)
    }

    /// `None` when the triggering item is no longer open.
    async fn fetch_initial_targets(&self) -> Result<Option<Targets>> {
        match &self.event {
            Some(event) if event.is_single_target() => {
                if !event.is_open() {
                    tracing::info!(
                        number = event.number,
                        state = %event.state,
                        "[SKIP] #{} is not open",
                        event.number
                    );
                    return Ok(None);
                }
                match self.tracker.fetch_target(event.number).await {
                    Ok(target) => Ok(Some(Targets::from([(target.number, target)]))),
                    Err(e @ TriageError::NotOpen(_)) => {
                        tracing::info!("[SKIP] {e}");
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => self.tracker.fetch_targets().await.map(Some),
        }
    }

    async fn process(&self, invocation: Invocation, queue: &mut VecDeque<Invocation>) -> Outcome {
        let Invocation {
            target,
            task,
            caller,
        } = invocation;

        // Called tasks see the target as it is after the caller's effects.
        let target = match &caller {
            Some(_) => match self.tracker.fetch_target(target.number).await {
                Ok(fresh) => Arc::new(fresh),
                Err(e @ TriageError::NotOpen(_)) => {
                    tracing::info!("[SKIP] {e}");
                    return Outcome::Skipped(e.to_string());
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to refresh target");
                    return Outcome::Failed(e.to_string());
                }
            },
            None => target,
        };

        let mut ctx = Context::build(
            &self.base_env,
            &self.config.env,
            target,
            Arc::clone(&task),
            caller.as_ref(),
        );
        let mut sampler = Sampler::new(ctx.env.flag(SAMPLE_WITH_SAME_SEED));
        if let Some(frame) = &caller {
            sampler.adopt(frame.seed, frame.exclude);
        }

        match &task.condition {
            Some(condition) => {
                let vars = ctx.condition_vars(self.event.as_ref());
                match self.evaluator.eval(condition, &vars) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(condition = %condition, "condition not matched");
                        return Outcome::NotMatched;
                    }
                    Err(e) => {
                        tracing::warn!(condition = %condition, "[SKIP] {e}");
                        return Outcome::Skipped(e.to_string());
                    }
                }
            }
            None if !ctx.is_called() => return Outcome::CallableOnly,
            None => {}
        }
        tracing::info!(name = task.name.as_deref().unwrap_or(""), "start task");

        let mut scope = Scope {
            ctx: &mut ctx,
            sampler: &mut sampler,
            phase: Phase::Do,
            queue,
        };
        match self.perform(&task.do_action, &mut scope).await {
            Ok(()) => match self.follow_up(Phase::Ok, &task, &mut scope).await {
                Some(e) => Outcome::Failed(e),
                None => Outcome::Succeeded,
            },
            Err(e) if e.is_skip() => {
                tracing::info!(phase = "do", "[SKIP] {e}");
                scope.sampler.reset();
                Outcome::Skipped(e.to_string())
            }
            Err(e) => {
                tracing::error!(phase = "do", error = %e, "action failed");
                scope.ctx.env.set(DO_ERROR, e.to_string());
                self.follow_up(Phase::Ng, &task, &mut scope).await;
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Run the `ok` or `ng` action if the task has one. Returns the failure
    /// message, if any; skips are logged only.
    async fn follow_up(&self, phase: Phase, task: &Task, scope: &mut Scope<'_>) -> Option<String> {
        let action = task.action(phase)?;
        scope.phase = phase;
        match self.perform(action, scope).await {
            Ok(()) => None,
            Err(e) if e.is_skip() => {
                tracing::info!(phase = %phase, "[SKIP] {e}");
                None
            }
            Err(e) => {
                tracing::error!(phase = %phase, error = %e, "action failed");
                Some(e.to_string())
            }
        }
    }

    /// Perform one action against one target outside of any task.
    ///
    /// The number comes from `number` or, failing that, the triggering event.
    pub async fn perform_oneshot(&self, number: Option<u64>, action: Action) -> Result<()> {
        let number = number
            .or_else(|| self.event.as_ref().map(|e| e.number).filter(|n| *n > 0))
            .ok_or_else(|| TriageError::MissingEnv("target number (--number)".to_string()))?;
        let target = Arc::new(self.tracker.fetch_target(number).await?);
        let task = Arc::new(Task {
            id: "oneshot".to_string(),
            name: None,
            condition: None,
            do_action: action,
            ok_action: None,
            ng_action: None,
            env: Default::default(),
        });
        let mut ctx = Context::build(&self.base_env, &self.config.env, target, Arc::clone(&task), None);
        let mut sampler = Sampler::new(ctx.env.flag(SAMPLE_WITH_SAME_SEED));
        let mut queue = VecDeque::new();
        let mut scope = Scope {
            ctx: &mut ctx,
            sampler: &mut sampler,
            phase: Phase::Do,
            queue: &mut queue,
        };
        self.perform(&task.do_action, &mut scope).await
    }
}

#[cfg(test)]
mod tests;
