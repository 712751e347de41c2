pub mod check;
pub mod do_action;
pub mod init;
pub mod run;

use std::sync::Arc;

use anyhow::Context;
use triage_core::condition::JinjaEvaluator;
use triage_core::config::Config;
use triage_core::env::Env;
use triage_core::runner::Runner;
use triage_remote::{GithubClient, SlackClient};

/// Wire the GitHub and Slack clients into a runner for `config`.
pub(crate) fn build_runner(config: Config, env: Env) -> anyhow::Result<Runner> {
    let tracker = GithubClient::from_env(&env).context("failed to configure GitHub client")?;
    let chat = SlackClient::from_env(&env).context("failed to configure Slack client")?;
    let runner = Runner::new(
        config,
        Arc::new(tracker),
        Arc::new(chat),
        Box::new(JinjaEvaluator::new()),
        env,
    )
    .context("failed to read the triggering event")?;
    Ok(runner)
}

pub(crate) fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}
