use anyhow::Context;
use clap::Subcommand;
use triage_core::config::Config;
use triage_core::env::Env;
use triage_core::task::Action;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum DoSubcommand {
    /// Run a shell command
    Run {
        command: String,
    },

    /// Set labels (mode from TRIAGE_ACTION_LABELS_BEHAVIOR)
    Labels {
        #[arg(required = true)]
        labels: Vec<String>,
    },

    /// Set assignees (empty: GITHUB_ASSIGNEES)
    Assignees {
        assignees: Vec<String>,
    },

    /// Request reviewers (empty: GITHUB_REVIEWERS)
    Reviewers {
        reviewers: Vec<String>,
    },

    /// Add a comment
    Comment {
        comment: String,
    },

    /// Close or merge the target
    State {
        /// `close` or `merge`
        state: String,
    },

    /// Post a chat notification
    Notify {
        message: String,
    },
}

impl DoSubcommand {
    fn into_action(self) -> Action {
        match self {
            Self::Run { command } => Action::Run(command),
            Self::Labels { labels } => Action::Labels(labels),
            Self::Assignees { assignees } => Action::Assignees(assignees),
            Self::Reviewers { reviewers } => Action::Reviewers(reviewers),
            Self::Comment { comment } => Action::Comment(comment),
            Self::State { state } => Action::State(state),
            Self::Notify { message } => Action::Notify(message),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(number: Option<u64>, subcmd: DoSubcommand) -> anyhow::Result<()> {
    let action = subcmd.into_action();
    let kind = action.kind();
    let runner = super::build_runner(Config::default(), Env::from_process())?;
    super::runtime()?
        .block_on(runner.perform_oneshot(number, action))
        .with_context(|| format!("{kind} action failed"))?;
    tracing::info!(action = kind, "done");
    Ok(())
}
