use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::TempDir;

use super::*;
use crate::condition::JinjaEvaluator;
use crate::remote::Message;

// ─── Fakes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Call {
    SetLabels(u64, Vec<String>),
    SetAssignees(u64, Vec<String>),
    SetReviewers(u64, Vec<String>),
    AddComment(u64, String),
    Close(u64),
    Merge(u64),
}

#[derive(Default)]
struct FakeTracker {
    targets: Mutex<Targets>,
    teams: HashMap<String, Vec<String>>,
    calls: Mutex<Vec<Call>>,
    fetches: Mutex<Vec<u64>>,
    fetch_all_fails: bool,
}

impl FakeTracker {
    fn with(targets: Vec<Target>) -> Self {
        Self {
            targets: Mutex::new(targets.into_iter().map(|t| (t.number, t)).collect()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn target(&self, number: u64) -> Target {
        self.targets.lock().unwrap()[&number].clone()
    }

    fn record(&self, call: Call, number: u64, update: impl FnOnce(&mut Target)) {
        self.calls.lock().unwrap().push(call);
        if let Some(t) = self.targets.lock().unwrap().get_mut(&number) {
            update(t);
        }
    }
}

#[async_trait]
impl Tracker for FakeTracker {
    async fn fetch_targets(&self) -> Result<Targets> {
        if self.fetch_all_fails {
            return Err(TriageError::Tracker("rate limited".into()));
        }
        Ok(self
            .targets
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, t)| t.state == "open")
            .map(|(n, t)| (*n, t.clone()))
            .collect())
    }

    async fn fetch_target(&self, number: u64) -> Result<Target> {
        self.fetches.lock().unwrap().push(number);
        let target = self
            .targets
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| TriageError::Tracker(format!("#{number} not found")))?;
        if target.state != "open" {
            return Err(TriageError::NotOpen(format!("#{number} is {}", target.state)));
        }
        Ok(target)
    }

    async fn set_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        self.record(Call::SetLabels(number, labels.to_vec()), number, |t| {
            t.labels = labels.to_vec()
        });
        Ok(())
    }

    async fn set_assignees(&self, number: u64, assignees: &[String]) -> Result<()> {
        self.record(Call::SetAssignees(number, assignees.to_vec()), number, |t| {
            t.assignees = assignees.to_vec()
        });
        Ok(())
    }

    async fn set_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        self.record(Call::SetReviewers(number, reviewers.to_vec()), number, |t| {
            let mut all = t.code_owners.clone();
            all.extend(reviewers.iter().cloned());
            t.reviewers = all;
        });
        Ok(())
    }

    async fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        self.record(Call::AddComment(number, body.to_string()), number, |t| {
            t.latest_comment_body = body.to_string();
            t.number_of_comments += 1;
            t.number_of_consecutive_comments += 1;
        });
        Ok(())
    }

    async fn close_issue(&self, number: u64) -> Result<()> {
        self.record(Call::Close(number), number, |t| t.state = "closed".into());
        Ok(())
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        self.record(Call::Merge(number), number, |t| t.state = "merged".into());
        Ok(())
    }

    async fn resolve_users(&self, names: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for name in names {
            let name = name.trim_start_matches('@');
            match self.teams.get(name) {
                Some(members) => out.extend(members.iter().cloned()),
                None => out.push(name.to_string()),
            }
        }
        Ok(out)
    }
}

struct FakeChat {
    mentions: bool,
    posts: Mutex<Vec<Message>>,
}

impl FakeChat {
    fn api() -> Self {
        Self {
            mentions: true,
            posts: Mutex::new(Vec::new()),
        }
    }

    fn webhook() -> Self {
        Self {
            mentions: false,
            posts: Mutex::new(Vec::new()),
        }
    }

    fn texts(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl Chat for FakeChat {
    fn supports_mentions(&self) -> bool {
        self.mentions
    }

    async fn post_message(&self, message: &Message) -> Result<()> {
        self.posts.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn mention_link(&self, name: &str) -> Result<String> {
        Ok(format!("<@{name}>"))
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────

struct Harness {
    tracker: Arc<FakeTracker>,
    chat: Arc<FakeChat>,
    runner: Runner,
    dir: TempDir,
}

impl Harness {
    fn log(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("log.txt")).unwrap_or_default()
    }
}

fn harness(yaml: &str, targets: Vec<Target>) -> Harness {
    harness_with(yaml, FakeTracker::with(targets), FakeChat::api())
}

fn harness_with(yaml: &str, tracker: FakeTracker, chat: FakeChat) -> Harness {
    let dir = TempDir::new().unwrap();
    let mut base = Env::new();
    base.set("PATH", std::env::var("PATH").unwrap_or_default());
    base.set("LOG", dir.path().join("log.txt").to_string_lossy());
    base.set(crate::env::GITHUB_REPOSITORY, "acme/widgets");

    let config = Config::from_yaml(yaml, &base).unwrap();
    let tracker = Arc::new(tracker);
    let chat = Arc::new(chat);
    let runner = Runner::new(
        config,
        tracker.clone(),
        chat.clone(),
        Box::new(JinjaEvaluator::new()),
        base,
    )
    .unwrap();
    Harness {
        tracker,
        chat,
        runner,
        dir,
    }
}

fn issue(number: u64, title: &str) -> Target {
    Target {
        number,
        state: "open".into(),
        title: title.into(),
        author: "reporter".into(),
        is_issue: true,
        login: "triage-bot".into(),
        ..Default::default()
    }
}

fn pull_request(number: u64, author: &str, reviewers: &[&str]) -> Target {
    Target {
        number,
        state: "open".into(),
        title: "Add feature".into(),
        author: author.into(),
        reviewers: reviewers.iter().map(|s| s.to_string()).collect(),
        is_pull_request: true,
        ..Default::default()
    }
}

fn names(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

fn outcomes(report: &RunReport) -> Vec<(u64, &str, bool, Outcome)> {
    report
        .invocations
        .iter()
        .map(|r| (r.number, r.task_id.as_str(), r.called, r.outcome.clone()))
        .collect()
}

// ─── Scheduler ────────────────────────────────────────────────────────────

const QUESTION_TASK: &str = r#"
tasks:
  - id: set-question-label
    if: 'is_issue and labels|length == 0 and title is endingwith("?")'
    do:
      labels: [question]
    ok:
      run: echo ok >> "$LOG"
    ng:
      run: echo ng >> "$LOG"
"#;

#[tokio::test]
async fn question_issue_gets_labeled_and_ok_runs() {
    let h = harness(QUESTION_TASK, vec![issue(19, "How do I configure this?")]);
    let report = h.runner.run().await.unwrap();

    assert_eq!(h.tracker.calls(), vec![Call::SetLabels(19, names(&["question"]))]);
    assert_eq!(h.log(), "ok\n");
    assert_eq!(
        outcomes(&report),
        vec![(19, "set-question-label", false, Outcome::Succeeded)]
    );
}

#[tokio::test]
async fn second_session_is_idempotent() {
    let yaml = r#"
tasks:
  - id: label
    if: 'is_issue'
    do:
      labels: [question]
    ng:
      run: echo ng >> "$LOG"
"#;
    let h = harness(yaml, vec![issue(1, "Help?")]);
    h.runner.run().await.unwrap();
    let report = h.runner.run().await.unwrap();

    assert_eq!(h.tracker.calls().len(), 1);
    assert!(matches!(report.invocations[0].outcome, Outcome::Skipped(_)));
    assert_eq!(h.log(), "", "ng must not run for an already-satisfied action");
}

#[tokio::test]
async fn unmatched_condition_does_nothing() {
    let h = harness(QUESTION_TASK, vec![issue(2, "Crash on start")]);
    let report = h.runner.run().await.unwrap();
    assert!(h.tracker.calls().is_empty());
    assert_eq!(report.invocations[0].outcome, Outcome::NotMatched);
}

#[tokio::test]
async fn chained_invocations_run_after_everything_queued_earlier() {
    let yaml = r#"
tasks:
  - id: a
    if: 'true'
    do:
      next: [c]
  - id: b
    if: 'true'
    do:
      run: echo "b $TRIAGE_TARGET_NUMBER" >> "$LOG"
  - id: c
    do:
      run: echo "c $TRIAGE_TARGET_NUMBER" >> "$LOG"
"#;
    let h = harness(yaml, vec![issue(1, "one"), issue(2, "two")]);
    let report = h.runner.run().await.unwrap();

    assert_eq!(
        outcomes(&report),
        vec![
            (1, "a", false, Outcome::Succeeded),
            (1, "b", false, Outcome::Succeeded),
            (1, "c", false, Outcome::CallableOnly),
            (2, "a", false, Outcome::Succeeded),
            (2, "b", false, Outcome::Succeeded),
            (2, "c", false, Outcome::CallableOnly),
            (1, "c", true, Outcome::Succeeded),
            (2, "c", true, Outcome::Succeeded),
        ]
    );
    assert_eq!(h.log(), "b 1\nb 2\nc 1\nc 2\n");
    assert_eq!(*h.tracker.fetches.lock().unwrap(), vec![1, 2]);
}

#[tokio::test]
async fn caller_results_are_forwarded_to_callee() {
    let yaml = r#"
tasks:
  - id: label
    if: 'labels|length == 0'
    do:
      labels: [bug]
    ok:
      next: [report]
  - id: report
    if: "'bug' in caller_action_labels_updated and caller_task_id == 'label'"
    do:
      run: echo "$TRIAGE_CALLER_TASK_ID:$TRIAGE_ACTION_LABELS_UPDATED:$TRIAGE_TARGET_LABELS" >> "$LOG"
"#;
    let h = harness(yaml, vec![issue(3, "Broken")]);
    h.runner.run().await.unwrap();
    assert_eq!(h.log(), "label:bug:bug\n");
}

#[tokio::test]
async fn called_task_on_closed_target_is_skipped() {
    let yaml = r#"
tasks:
  - id: close
    if: 'true'
    do:
      state: close
    ok:
      next: [after]
  - id: after
    do:
      run: echo after >> "$LOG"
"#;
    let h = harness(yaml, vec![issue(4, "stale")]);
    let report = h.runner.run().await.unwrap();

    assert_eq!(h.tracker.calls(), vec![Call::Close(4)]);
    assert_eq!(h.log(), "");
    let last = report.invocations.last().unwrap();
    assert!(last.called);
    assert!(matches!(last.outcome, Outcome::Skipped(_)));
}

#[tokio::test]
async fn do_failure_records_error_and_runs_ng() {
    let yaml = r#"
tasks:
  - id: flaky
    if: 'true'
    do:
      run: exit 3
    ok:
      run: echo ok >> "$LOG"
    ng:
      run: echo "ng:$TRIAGE_ACTION_DO_ERROR" >> "$LOG"
"#;
    let h = harness(yaml, vec![issue(5, "x")]);
    let report = h.runner.run().await.unwrap();

    let log = h.log();
    assert!(log.starts_with("ng:command failed"), "{log}");
    assert!(!log.contains("ok"));
    assert_eq!(report.failures(), 1);
}

#[tokio::test]
async fn ok_phase_skip_is_not_a_failure() {
    let yaml = r#"
tasks:
  - id: keep
    if: 'true'
    do:
      run: "true"
    ok:
      labels: [bug]
"#;
    let mut target = issue(6, "x");
    target.labels = names(&["bug"]);
    let h = harness(yaml, vec![target]);
    let report = h.runner.run().await.unwrap();
    assert!(h.tracker.calls().is_empty());
    assert_eq!(report.invocations[0].outcome, Outcome::Succeeded);
}

#[tokio::test]
async fn condition_errors_skip_the_invocation() {
    let yaml = r#"
tasks:
  - id: broken
    if: 'is_issue and ('
    do:
      labels: [bug]
"#;
    let h = harness(yaml, vec![issue(7, "x")]);
    let report = h.runner.run().await.unwrap();
    assert!(h.tracker.calls().is_empty());
    assert!(matches!(report.invocations[0].outcome, Outcome::Skipped(_)));
    assert_eq!(report.failures(), 0);
}

#[tokio::test]
async fn initial_fetch_failure_aborts_the_session() {
    let tracker = FakeTracker {
        fetch_all_fails: true,
        ..Default::default()
    };
    let h = harness_with(QUESTION_TASK, tracker, FakeChat::api());
    assert!(matches!(h.runner.run().await, Err(TriageError::Tracker(_))));
}

#[tokio::test]
async fn closed_event_target_ends_the_session_cleanly() {
    let h = harness(QUESTION_TASK, vec![issue(8, "Why?")]);
    let event = GithubEvent::decode(
        "issues",
        r#"{"action":"closed","issue":{"number":8,"state":"closed"}}"#,
    )
    .unwrap();
    let runner = h.runner.with_event(Some(event));
    let report = runner.run().await.unwrap();
    assert!(report.invocations.is_empty());
    assert!(h.tracker.calls().is_empty());
}

#[tokio::test]
async fn event_target_is_the_only_target() {
    let h = harness(QUESTION_TASK, vec![issue(8, "Why?"), issue(9, "How?")]);
    let event =
        GithubEvent::decode("issues", r#"{"issue":{"number":9,"state":"open"}}"#).unwrap();
    let runner = h.runner.with_event(Some(event));
    let report = runner.run().await.unwrap();
    assert_eq!(report.invocations.len(), 1);
    assert_eq!(h.tracker.calls(), vec![Call::SetLabels(9, names(&["question"]))]);
}

// ─── Actions ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn label_behaviors_combine_with_current_labels() {
    let cases: &[(&str, &[&str])] = &[
        ("add", &["bug", "question", "triage"]),
        ("remove", &["question"]),
        ("replace", &["bug", "triage"]),
    ];
    for (behavior, want) in cases {
        let yaml = format!(
            r#"
tasks:
  - id: label
    if: 'true'
    do:
      labels: [bug, triage]
    env:
      TRIAGE_ACTION_LABELS_BEHAVIOR: {behavior}
"#
        );
        let mut target = issue(10, "x");
        target.labels = names(&["bug", "question"]);
        let h = harness(&yaml, vec![target]);
        h.runner.run().await.unwrap();
        assert_eq!(
            h.tracker.calls(),
            vec![Call::SetLabels(10, names(want))],
            "behavior {behavior}"
        );
    }
}

#[tokio::test]
async fn assignees_resolve_teams_and_aliases() {
    let yaml = r#"
linkedNames:
  - github: alice
    slack: alice_s
tasks:
  - id: assign
    if: 'true'
    do:
      assignees: [alice_s, "@acme/ops"]
"#;
    let mut tracker = FakeTracker::with(vec![issue(11, "x")]);
    tracker
        .teams
        .insert("acme/ops".into(), names(&["dave", "erin"]));
    let h = harness_with(yaml, tracker, FakeChat::api());
    h.runner.run().await.unwrap();
    assert_eq!(
        h.tracker.calls(),
        vec![Call::SetAssignees(11, names(&["alice", "dave", "erin"]))]
    );
}

#[tokio::test]
async fn empty_assignees_fall_back_to_env() {
    let yaml = r#"
tasks:
  - id: assign
    if: 'true'
    do:
      assignees: []
    env:
      GITHUB_ASSIGNEES: carol bob
"#;
    let h = harness(yaml, vec![issue(12, "x")]);
    h.runner.run().await.unwrap();
    assert_eq!(
        h.tracker.calls(),
        vec![Call::SetAssignees(12, names(&["bob", "carol"]))]
    );
}

#[tokio::test]
async fn reviewers_already_requested_are_left_alone() {
    let yaml = r#"
tasks:
  - id: review
    if: 'is_pull_request'
    do:
      reviewers: [alice, bob]
"#;
    let h = harness(yaml, vec![pull_request(20, "carol", &["alice", "bob"])]);
    let report = h.runner.run().await.unwrap();
    assert!(h.tracker.calls().is_empty());
    assert!(matches!(report.invocations[0].outcome, Outcome::Skipped(_)));
}

#[tokio::test]
async fn reviewers_never_include_the_author() {
    let yaml = r#"
tasks:
  - id: review
    if: 'is_pull_request'
    do:
      reviewers: [carol, alice, bob]
"#;
    let h = harness(yaml, vec![pull_request(21, "alice", &[])]);
    h.runner.run().await.unwrap();
    assert_eq!(
        h.tracker.calls(),
        vec![Call::SetReviewers(21, names(&["bob", "carol"]))]
    );
}

#[tokio::test]
async fn only_the_author_means_no_reviewer() {
    let yaml = r#"
tasks:
  - id: review
    if: 'is_pull_request'
    do:
      reviewers: [alice]
    ng:
      run: echo ng >> "$LOG"
"#;
    let h = harness(yaml, vec![pull_request(22, "alice", &[])]);
    let report = h.runner.run().await.unwrap();
    assert!(h.tracker.calls().is_empty());
    assert!(matches!(report.invocations[0].outcome, Outcome::Skipped(_)));
    assert_eq!(h.log(), "");
}

#[tokio::test]
async fn sampled_reviewer_is_the_one_notified() {
    let yaml = r#"
env:
  TRIAGE_SAMPLE_WITH_SAME_SEED: true
  GITHUB_REVIEWERS_SAMPLE: 1
  SLACK_MENTIONS: alice bob carol dave
  SLACK_MENTIONS_SAMPLE: 1
tasks:
  - id: review
    if: 'is_pull_request'
    do:
      reviewers: [alice, bob, carol, dave]
    ok:
      notify: please review
"#;
    for number in 30..40 {
        let h = harness(yaml, vec![pull_request(number, "carol", &[])]);
        h.runner.run().await.unwrap();

        let calls = h.tracker.calls();
        let Call::SetReviewers(_, requested) = &calls[0] else {
            panic!("unexpected call {calls:?}");
        };
        assert_eq!(requested.len(), 1);
        assert_ne!(requested[0], "carol");
        assert_eq!(
            h.chat.texts(),
            vec![format!("<@{}> please review", requested[0])]
        );
    }
}

/// `review` requests one reviewer and calls `tell`, which notifies.
fn review_then_tell(env: &str) -> String {
    format!(
        r#"
env:
  GITHUB_REVIEWERS_SAMPLE: 1
  SLACK_MENTIONS: alice bob carol dave
{env}
tasks:
  - id: review
    if: 'is_pull_request'
    do:
      reviewers: [alice, bob, carol, dave]
    ok:
      next: [tell]
  - id: tell
    do:
      notify: please review
"#
    )
}

#[tokio::test]
async fn called_task_notifies_the_requested_reviewer() {
    let yaml = review_then_tell(
        "  TRIAGE_SAMPLE_WITH_SAME_SEED: true\n  SLACK_MENTIONS_SAMPLE: 1",
    );
    for number in 30..40 {
        let h = harness(&yaml, vec![pull_request(number, "carol", &[])]);
        let report = h.runner.run().await.unwrap();
        assert_eq!(report.failures(), 0);

        let calls = h.tracker.calls();
        let Call::SetReviewers(_, requested) = &calls[0] else {
            panic!("unexpected call {calls:?}");
        };
        assert_eq!(requested.len(), 1);
        assert_ne!(requested[0], "carol");
        assert_eq!(
            h.chat.texts(),
            vec![format!("<@{}> please review", requested[0])]
        );
    }
}

#[tokio::test]
async fn called_task_reseeds_without_same_seed() {
    let yaml = review_then_tell("  SLACK_MENTIONS_SAMPLE: 4");
    let h = harness(&yaml, vec![pull_request(30, "carol", &[])]);
    let report = h.runner.run().await.unwrap();
    assert_eq!(report.failures(), 0);

    // The author's exclusion does not carry over, so all four are mentioned.
    let texts = h.chat.texts();
    assert_eq!(texts.len(), 1);
    for name in ["alice", "bob", "carol", "dave"] {
        assert!(
            texts[0].contains(&format!("<@{name}>")),
            "{name} missing from {texts:?}"
        );
    }
}

#[tokio::test]
async fn comment_appends_mentions_and_signature() {
    let yaml = r#"
tasks:
  - id: greet
    if: 'true'
    do:
      comment: 'Thanks for #${TRIAGE_TARGET_NUMBER}'
    env:
      GITHUB_COMMENT_MENTIONS: alice
"#;
    let h = harness(yaml, vec![issue(13, "x")]);
    h.runner.run().await.unwrap();
    assert_eq!(
        h.tracker.calls(),
        vec![Call::AddComment(
            13,
            "@alice Thanks for #13\n<!-- triage:greet:do -->".into()
        )]
    );

    // Same body again: nothing new is written.
    let report = h.runner.run().await.unwrap();
    assert_eq!(h.tracker.calls().len(), 1);
    assert!(matches!(report.invocations[0].outcome, Outcome::Skipped(_)));
}

#[tokio::test]
async fn comment_cap_blocks_the_tracker_call() {
    let yaml = r#"
tasks:
  - id: nag
    if: 'true'
    do:
      comment: ping
    ng:
      run: echo "$TRIAGE_ACTION_DO_ERROR" >> "$LOG"
"#;
    let mut target = issue(14, "x");
    target.number_of_consecutive_comments = 5;
    let h = harness(yaml, vec![target]);
    let report = h.runner.run().await.unwrap();
    assert!(h.tracker.calls().is_empty());
    assert!(h.log().contains("too many comments"));
    assert_eq!(report.failures(), 1);
}

#[tokio::test]
async fn comment_cap_is_configurable() {
    let yaml = r#"
tasks:
  - id: nag
    if: 'true'
    do:
      comment: ping
    env:
      TRIAGE_ACTION_COMMENT_MAX: 10
"#;
    let mut target = issue(15, "x");
    target.number_of_consecutive_comments = 5;
    let h = harness(yaml, vec![target]);
    h.runner.run().await.unwrap();
    assert_eq!(h.tracker.calls().len(), 1);
}

#[tokio::test]
async fn state_merge_and_record() {
    let yaml = r#"
tasks:
  - id: merge
    if: 'is_pull_request and is_approved'
    do:
      state: merged
    ok:
      run: echo "$TRIAGE_ACTION_STATE_CHANGED" >> "$LOG"
"#;
    let mut pr = pull_request(16, "alice", &[]);
    pr.is_approved = true;
    let h = harness(yaml, vec![pr]);
    h.runner.run().await.unwrap();
    assert_eq!(h.tracker.calls(), vec![Call::Merge(16)]);
    assert_eq!(h.log(), "merged\n");
    assert_eq!(h.tracker.target(16).state, "merged");
}

#[tokio::test]
async fn webhook_notifications_cannot_mention() {
    let yaml = r#"
tasks:
  - id: ping
    if: 'true'
    do:
      notify: 'new issue #${TRIAGE_TARGET_NUMBER}'
    env:
      SLACK_MENTIONS: alice
"#;
    let h = harness_with(yaml, FakeTracker::with(vec![issue(17, "x")]), FakeChat::webhook());
    let report = h.runner.run().await.unwrap();
    assert!(h.chat.texts().is_empty());
    assert!(matches!(report.invocations[0].outcome, Outcome::Failed(_)));

    let plain = r#"
tasks:
  - id: ping
    if: 'true'
    do:
      notify: 'new issue #${TRIAGE_TARGET_NUMBER}'
"#;
    let h = harness_with(plain, FakeTracker::with(vec![issue(17, "x")]), FakeChat::webhook());
    h.runner.run().await.unwrap();
    assert_eq!(h.chat.texts(), vec!["new issue #17".to_string()]);
    let posted = h.chat.posts.lock().unwrap()[0].clone();
    assert_eq!(posted.repository, "acme/widgets");
    assert_eq!(posted.task_id, "ping");
}

#[tokio::test]
async fn notify_translates_aliases() {
    let yaml = r#"
linkedNames:
  - github: alice
    slack: alice_s
tasks:
  - id: ping
    if: 'true'
    do:
      notify: hello
    env:
      SLACK_MENTIONS: alice
"#;
    let h = harness(yaml, vec![issue(18, "x")]);
    h.runner.run().await.unwrap();
    assert_eq!(h.chat.texts(), vec!["<@alice_s> hello".to_string()]);
}

#[tokio::test]
async fn oneshot_performs_a_single_action() {
    let h = harness("tasks: []", vec![issue(23, "x")]);
    h.runner
        .perform_oneshot(Some(23), Action::Labels(names(&["bug"])))
        .await
        .unwrap();
    assert_eq!(h.tracker.calls(), vec![Call::SetLabels(23, names(&["bug"]))]);

    let err = h
        .runner
        .perform_oneshot(None, Action::State("close".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::MissingEnv(_)));

    let err = h
        .runner
        .perform_oneshot(Some(23), Action::State("reopen".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, TriageError::InvalidState(_)));
}

#[tokio::test]
async fn actions_write_only_their_own_context() {
    let yaml = r#"
tasks:
  - id: first
    if: 'true'
    do:
      labels: [bug]
  - id: second
    if: 'true'
    do:
      run: echo "[$TRIAGE_ACTION_LABELS_UPDATED][$TRIAGE_TASK_ID]" >> "$LOG"
"#;
    let h = harness(yaml, vec![issue(24, "x")]);
    h.runner.run().await.unwrap();
    assert_eq!(h.log(), "[][second]\n");
}
