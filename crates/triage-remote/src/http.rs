use std::time::Duration;

use serde::de::DeserializeOwned;

const DEFAULT_ATTEMPTS: usize = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
const ERROR_BODY_LIMIT: usize = 800;

/// A `reqwest::Client` that retries throttled and transient failures.
///
/// Errors come back as plain strings; each client wraps them in its own
/// `TriageError` variant.
#[derive(Clone)]
pub(crate) struct Http {
    client: reqwest::Client,
    max_attempts: usize,
    base_delay: Duration,
}

impl Http {
    pub(crate) fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Send the request built by `build`, retrying 429/5xx and connection
    /// errors, and return the successful response.
    pub(crate) async fn send<F>(
        &self,
        operation: &str,
        mut build: F,
    ) -> Result<reqwest::Response, String>
    where
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt += 1;
            match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.max_attempts && is_retryable_status(status.as_u16()) {
                        tracing::debug!(operation, status = status.as_u16(), attempt, "retrying");
                        tokio::time::sleep(self.delay(attempt, retry_after)).await;
                        continue;
                    }
                    return Err(format!(
                        "{operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate(&body, ERROR_BODY_LIMIT)
                    ));
                }
                Err(e) => {
                    if attempt < self.max_attempts && (e.is_timeout() || e.is_connect()) {
                        tracing::debug!(operation, attempt, error = %e, "retrying");
                        tokio::time::sleep(self.delay(attempt, None)).await;
                        continue;
                    }
                    return Err(format!("{operation} request failed: {e}"));
                }
            }
        }
    }

    pub(crate) async fn json<T, F>(&self, operation: &str, build: F) -> Result<T, String>
    where
        T: DeserializeOwned,
        F: FnMut(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        self.send(operation, build)
            .await?
            .json::<T>()
            .await
            .map_err(|e| format!("failed to decode {operation} response: {e}"))
    }

    fn delay(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        if let Some(after) = retry_after {
            return after;
        }
        let exp = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(6);
        self.base_delay.saturating_mul(2_u32.pow(exp))
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(502));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(422));
    }

    #[test]
    fn delay_doubles_per_attempt() {
        let http = Http::new(reqwest::Client::new()).with_base_delay(Duration::from_millis(10));
        assert_eq!(http.delay(1, None), Duration::from_millis(10));
        assert_eq!(http.delay(3, None), Duration::from_millis(40));
        assert_eq!(
            http.delay(3, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn truncate_long_bodies() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[tokio::test]
    async fn server_errors_are_retried_up_to_the_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(DEFAULT_ATTEMPTS)
            .create_async()
            .await;
        let http = Http::new(reqwest::Client::new()).with_base_delay(Duration::from_millis(1));
        let url = format!("{}/flaky", server.url());
        let err = http
            .json::<serde_json::Value, _>("get flaky", |c| c.get(&url))
            .await
            .unwrap_err();
        assert!(err.contains("status 503"), "{err}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn decodes_successful_responses() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/thing")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;
        let http = Http::new(reqwest::Client::new());
        let url = format!("{}/thing", server.url());
        let value: serde_json::Value = http.json("get thing", |c| c.get(&url)).await.unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body("nope")
            .expect(1)
            .create_async()
            .await;
        let http = Http::new(reqwest::Client::new()).with_base_delay(Duration::from_millis(1));
        let url = format!("{}/missing", server.url());
        let err = http
            .json::<serde_json::Value, _>("get missing", |c| c.get(&url))
            .await
            .unwrap_err();
        assert!(err.contains("status 404"), "{err}");
        assert!(err.contains("nope"), "{err}");
        mock.assert_async().await;
    }
}
