//! The `run` action: a shell command with bounded retries.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::process::Command;
use tokio::time::Instant;

use crate::env::{
    Env, RUN_RETRY_JITTER_FACTOR, RUN_RETRY_MAX, RUN_RETRY_MAX_INTERVAL, RUN_RETRY_MIN_INTERVAL,
    RUN_RETRY_TIMEOUT, RUN_STDERR, RUN_STDOUT,
};
use crate::error::{Result, TriageError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_JITTER_FACTOR: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub max_retries: u32,
    /// Bounds every attempt and every wait together.
    pub timeout: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            timeout: DEFAULT_TIMEOUT,
            min_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Retry knobs only take effect when a max count or a timeout is set.
    pub fn from_env(env: &Env) -> Result<Self> {
        let mut policy = Self::default();
        if env.non_empty(RUN_RETRY_MAX).is_none() && env.non_empty(RUN_RETRY_TIMEOUT).is_none() {
            return Ok(policy);
        }
        if let Some(max) = env.usize_setting(RUN_RETRY_MAX)? {
            policy.max_retries = u32::try_from(max).map_err(|_| TriageError::InvalidSetting {
                key: RUN_RETRY_MAX.to_string(),
                value: max.to_string(),
            })?;
        }
        if let Some(timeout) = env.duration_setting(RUN_RETRY_TIMEOUT)? {
            policy.timeout = timeout;
        }
        if let Some(min) = env.duration_setting(RUN_RETRY_MIN_INTERVAL)? {
            policy.min_interval = min;
        }
        if let Some(max) = env.duration_setting(RUN_RETRY_MAX_INTERVAL)? {
            policy.max_interval = max;
        }
        if let Some(raw) = env.non_empty(RUN_RETRY_JITTER_FACTOR) {
            policy.jitter_factor = raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| (0.0..=1.0).contains(f))
                .ok_or_else(|| TriageError::InvalidSetting {
                    key: RUN_RETRY_JITTER_FACTOR.to_string(),
                    value: raw.to_string(),
                })?;
        }
        Ok(policy)
    }

    /// Wait before retry number `retry` (1-based): exponential from the min
    /// interval, capped by the max interval, with jitter.
    pub fn interval(&self, retry: u32) -> Duration {
        if self.min_interval.is_zero() {
            return Duration::ZERO;
        }
        let exp = 2_f64.powi(retry.saturating_sub(1).min(30) as i32);
        let mut secs = self.min_interval.as_secs_f64() * exp;
        if !self.max_interval.is_zero() {
            secs = secs.min(self.max_interval.as_secs_f64());
        }
        if self.jitter_factor > 0.0 {
            let jitter = rand::thread_rng().gen_range(-self.jitter_factor..=self.jitter_factor);
            secs *= 1.0 + jitter;
        }
        Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Run `command` with `sh -c`, the namespace as its whole environment.
///
/// The stdout and stderr of the last finished attempt are stored in `env`
/// whether or not it succeeded.
pub async fn run_command(command: &str, env: &mut Env) -> Result<()> {
    let policy = RetryPolicy::from_env(env)?;
    let deadline = Instant::now()
        .checked_add(policy.timeout)
        .ok_or_else(|| TriageError::InvalidSetting {
            key: RUN_RETRY_TIMEOUT.to_string(),
            value: format!("{:?}", policy.timeout),
        })?;
    let mut attempts: u32 = 0;

    loop {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .env_clear()
            .envs(env.iter())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout_at(deadline, cmd.output()).await {
            Ok(output) => output?,
            Err(_) => return Err(TriageError::CommandTimeout(policy.timeout)),
        };
        attempts += 1;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let _ = std::io::stdout().write_all(stdout.as_bytes());
        let _ = std::io::stderr().write_all(stderr.as_bytes());
        env.set(RUN_STDOUT, stdout);
        env.set(RUN_STDERR, stderr);

        if output.status.success() {
            return Ok(());
        }
        let failure = TriageError::CommandFailed(format!("`{command}` exited with {}", output.status));
        if attempts > policy.max_retries {
            if policy.max_retries > 0 {
                tracing::warn!(max = policy.max_retries, "exceeded max retry count");
            }
            return Err(failure);
        }

        let wait = policy.interval(attempts);
        if Instant::now().checked_add(wait).map_or(true, |at| at >= deadline) {
            return Err(TriageError::CommandTimeout(policy.timeout));
        }
        tracing::debug!(attempt = attempts, wait_ms = wait.as_millis() as u64, "retrying command");
        tokio::time::sleep(wait).await;
    }
}
