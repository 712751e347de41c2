//! The string key/value namespace shared by conditions, actions and child
//! processes.
//!
//! An [`Env`] is a plain owned map. Every invocation works on its own copy, so
//! nothing written by one task can leak into an unrelated one.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::{Result, TriageError};

// ---------------------------------------------------------------------------
// Well-known keys
// ---------------------------------------------------------------------------

pub const TASK_ID: &str = "TRIAGE_TASK_ID";
pub const CALLER_TASK_ID: &str = "TRIAGE_CALLER_TASK_ID";
pub const TARGET_PREFIX: &str = "TRIAGE_TARGET_";

pub const RUN_STDOUT: &str = "TRIAGE_ACTION_RUN_STDOUT";
pub const RUN_STDERR: &str = "TRIAGE_ACTION_RUN_STDERR";
pub const LABELS_UPDATED: &str = "TRIAGE_ACTION_LABELS_UPDATED";
pub const ASSIGNEES_UPDATED: &str = "TRIAGE_ACTION_ASSIGNEES_UPDATED";
pub const REVIEWERS_UPDATED: &str = "TRIAGE_ACTION_REVIEWERS_UPDATED";
pub const COMMENT_CREATED: &str = "TRIAGE_ACTION_COMMENT_CREATED";
pub const STATE_CHANGED: &str = "TRIAGE_ACTION_STATE_CHANGED";
pub const NOTIFY_SENT: &str = "TRIAGE_ACTION_NOTIFY_SENT";
pub const DO_ERROR: &str = "TRIAGE_ACTION_DO_ERROR";

/// Keys copied from a caller into the tasks it chains to with `next`.
pub const FORWARDED_KEYS: [&str; 9] = [
    RUN_STDOUT,
    RUN_STDERR,
    LABELS_UPDATED,
    ASSIGNEES_UPDATED,
    REVIEWERS_UPDATED,
    COMMENT_CREATED,
    STATE_CHANGED,
    NOTIFY_SENT,
    DO_ERROR,
];

pub const LABELS_BEHAVIOR: &str = "TRIAGE_ACTION_LABELS_BEHAVIOR";
pub const ASSIGNEES_BEHAVIOR: &str = "TRIAGE_ACTION_ASSIGNEES_BEHAVIOR";
pub const COMMENT_MAX: &str = "TRIAGE_ACTION_COMMENT_MAX";
pub const SAMPLE_WITH_SAME_SEED: &str = "TRIAGE_SAMPLE_WITH_SAME_SEED";

pub const RUN_RETRY_MAX: &str = "TRIAGE_ACTION_RUN_RETRY_MAX";
pub const RUN_RETRY_TIMEOUT: &str = "TRIAGE_ACTION_RUN_RETRY_TIMEOUT";
pub const RUN_RETRY_MIN_INTERVAL: &str = "TRIAGE_ACTION_RUN_RETRY_MIN_INTERVAL";
pub const RUN_RETRY_MAX_INTERVAL: &str = "TRIAGE_ACTION_RUN_RETRY_MAX_INTERVAL";
pub const RUN_RETRY_JITTER_FACTOR: &str = "TRIAGE_ACTION_RUN_RETRY_JITTER_FACTOR";

pub const GITHUB_ASSIGNEES: &str = "GITHUB_ASSIGNEES";
pub const GITHUB_ASSIGNEES_SAMPLE: &str = "GITHUB_ASSIGNEES_SAMPLE";
pub const GITHUB_REVIEWERS: &str = "GITHUB_REVIEWERS";
pub const GITHUB_REVIEWERS_SAMPLE: &str = "GITHUB_REVIEWERS_SAMPLE";
pub const GITHUB_COMMENT_MENTIONS: &str = "GITHUB_COMMENT_MENTIONS";
pub const GITHUB_COMMENT_MENTIONS_SAMPLE: &str = "GITHUB_COMMENT_MENTIONS_SAMPLE";
pub const SLACK_MENTIONS: &str = "SLACK_MENTIONS";
pub const SLACK_MENTIONS_SAMPLE: &str = "SLACK_MENTIONS_SAMPLE";

pub const GITHUB_EVENT_NAME: &str = "GITHUB_EVENT_NAME";
pub const GITHUB_EVENT_PATH: &str = "GITHUB_EVENT_PATH";
pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";

// ---------------------------------------------------------------------------
// Env
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Env {
    vars: BTreeMap<String, String>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current process environment.
    pub fn from_process() -> Self {
        std::env::vars().collect()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value of `key`, treating an empty string as unset.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.vars.iter()
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// True for `1`, `true`, `yes` and `on` (any case).
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.get(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("1" | "true" | "yes" | "on")
        )
    }

    /// The list stored under `key`, empty when unset.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(split_list).unwrap_or_default()
    }

    /// Parse a non-negative integer setting. Unset or empty yields `None`.
    pub fn usize_setting(&self, key: &str) -> Result<Option<usize>> {
        match self.non_empty(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| invalid_setting(key, raw)),
        }
    }

    pub fn duration_setting(&self, key: &str) -> Result<Option<Duration>> {
        match self.non_empty(key) {
            None => Ok(None),
            Some(raw) => parse_duration(raw)
                .map(Some)
                .ok_or_else(|| invalid_setting(key, raw)),
        }
    }

    /// Apply `overrides`, expanding `${NAME}` references against the
    /// namespace as it was before any of them were applied.
    pub fn apply(&mut self, overrides: &BTreeMap<String, String>) {
        let expanded: Vec<(String, String)> = overrides
            .iter()
            .map(|(k, v)| (k.clone(), expand_braced(v, self)))
            .collect();
        for (k, v) in expanded {
            self.set(k, v);
        }
    }

    /// Expand `$NAME` and `${NAME}` references. Unknown names expand to `""`.
    pub fn expand(&self, template: &str) -> String {
        shell_var_re()
            .replace_all(template, |caps: &regex::Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                self.get(name).unwrap_or_default().to_string()
            })
            .into_owned()
    }

    /// Copy of only the keys that are forwarded along a call chain.
    pub fn forwarded(&self) -> Env {
        FORWARDED_KEYS
            .iter()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v.to_string())))
            .collect()
    }

    pub fn overlay(&mut self, other: &Env) {
        for (k, v) in other.iter() {
            self.set(k.clone(), v.clone());
        }
    }
}

impl FromIterator<(String, String)> for Env {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            vars: iter.into_iter().collect(),
        }
    }
}

fn invalid_setting(key: &str, value: &str) -> TriageError {
    TriageError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

static BRACED_RE: OnceLock<Regex> = OnceLock::new();
static SHELL_VAR_RE: OnceLock<Regex> = OnceLock::new();

fn braced_re() -> &'static Regex {
    BRACED_RE.get_or_init(|| Regex::new(r"\$\{\s*([^{}\s]+)\s*\}").unwrap())
}

fn shell_var_re() -> &'static Regex {
    SHELL_VAR_RE.get_or_init(|| {
        Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}|\$([A-Za-z_][A-Za-z0-9_]*)").unwrap()
    })
}

/// Config values only honour the braced form so shell snippets like `$1`
/// survive untouched.
fn expand_braced(value: &str, env: &Env) -> String {
    braced_re()
        .replace_all(value, |caps: &regex::Captures<'_>| {
            env.get(&caps[1]).unwrap_or_default().to_string()
        })
        .into_owned()
}

// ---------------------------------------------------------------------------
// Lists
// ---------------------------------------------------------------------------

/// Split a list value. Commas win over whitespace; quotes group words.
///
/// `bug, question` / `bug question` / `bug 'help wanted'` all parse.
pub fn split_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    let items: Vec<String> = if raw.contains(',') {
        raw.split(',')
            .map(|s| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
            .collect()
    } else {
        shell_words::split(raw)
            .unwrap_or_else(|_| raw.split_whitespace().map(str::to_string).collect())
    };
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

static DURATION_RE: OnceLock<Regex> = OnceLock::new();

/// Parse `300`, `1.5s`, `0.01sec`, `250ms`, `5min`, `1h`, `2d`. A bare number
/// means seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let re = DURATION_RE
        .get_or_init(|| Regex::new(r"^\s*([0-9]+(?:\.[0-9]+)?)\s*([a-zA-Z]*)\s*$").unwrap());
    let caps = re.captures(raw)?;
    let value: f64 = caps[1].parse().ok()?;
    let unit = match caps[2].to_ascii_lowercase().as_str() {
        "ns" | "nsec" => 1e-9,
        "us" | "usec" | "µs" => 1e-6,
        "ms" | "msec" => 1e-3,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86400.0,
        _ => return None,
    };
    Duration::try_from_secs_f64(value * unit).ok()
}
