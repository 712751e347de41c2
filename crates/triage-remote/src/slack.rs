//! Slack chat: the Web API when a bot token is configured, otherwise an
//! incoming webhook.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use triage_core::env::Env;
use triage_core::remote::{Chat, Message};
use triage_core::{Result, TriageError};

use crate::http::Http;

const DEFAULT_API_URL: &str = "https://slack.com/api";
const LIST_LIMIT: &str = "1000";

pub const SLACK_API_TOKEN: &str = "SLACK_API_TOKEN";
pub const SLACK_CHANNEL: &str = "SLACK_CHANNEL";
pub const SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";
pub const SLACK_API_URL: &str = "SLACK_API_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackTransport {
    Api {
        token: String,
        channel: Option<String>,
    },
    Webhook {
        url: String,
    },
    Unconfigured,
}

impl SlackTransport {
    /// The token wins over the webhook when both are set.
    pub fn from_env(env: &Env) -> Self {
        if let Some(token) = env.non_empty(SLACK_API_TOKEN) {
            return Self::Api {
                token: token.trim().to_string(),
                channel: env.non_empty(SLACK_CHANNEL).map(str::to_string),
            };
        }
        if let Some(url) = env.non_empty(SLACK_WEBHOOK_URL) {
            return Self::Webhook {
                url: url.to_string(),
            };
        }
        Self::Unconfigured
    }
}

pub struct SlackClient {
    http: Http,
    transport: SlackTransport,
    api_url: String,
    channel_id: OnceCell<String>,
    users: OnceCell<HashMap<String, String>>,
    user_groups: OnceCell<HashMap<String, String>>,
}

impl SlackClient {
    pub fn new(transport: SlackTransport) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("triage"),
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TriageError::Chat(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http: Http::new(client),
            transport,
            api_url: DEFAULT_API_URL.to_string(),
            channel_id: OnceCell::new(),
            users: OnceCell::new(),
            user_groups: OnceCell::new(),
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn from_env(env: &Env) -> Result<Self> {
        let client = Self::new(SlackTransport::from_env(env))?;
        Ok(match env.non_empty(SLACK_API_URL) {
            Some(url) => client.with_api_url(url),
            None => client,
        })
    }

    pub fn transport(&self) -> &SlackTransport {
        &self.transport
    }

    fn token(&self) -> Result<&str> {
        match &self.transport {
            SlackTransport::Api { token, .. } => Ok(token),
            _ => Err(TriageError::MentionsUnsupported),
        }
    }

    /// GET a Web API method and fail on `"ok": false`.
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.token()?;
        let url = format!("{}/{method}", self.api_url);
        let value: Value = self
            .http
            .json(method, |c| c.get(&url).bearer_auth(token).query(query))
            .await
            .map_err(TriageError::Chat)?;
        check_ok(method, &value)?;
        serde_json::from_value(value).map_err(|e| TriageError::Chat(format!("{method}: {e}")))
    }

    /// Walk a cursor-paginated list method, collecting `field` from each page.
    async fn list_all<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        field: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor = String::new();
        loop {
            let mut page: Value = self
                .call(method, &[("limit", LIST_LIMIT), ("cursor", cursor.as_str())])
                .await?;
            if let Some(entries) = page.get_mut(field).map(Value::take) {
                let entries: Vec<T> = serde_json::from_value(entries)
                    .map_err(|e| TriageError::Chat(format!("{method}: {e}")))?;
                items.extend(entries);
            }
            cursor = page
                .pointer("/response_metadata/next_cursor")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if cursor.is_empty() {
                return Ok(items);
            }
        }
    }

    async fn channel_id(&self, channel: &str) -> Result<&String> {
        let name = channel.trim_start_matches('#').to_string();
        self.channel_id
            .get_or_try_init(|| async {
                let channels: Vec<Named> = self.list_all("conversations.list", "channels").await?;
                channels
                    .into_iter()
                    .find(|c| c.name == name)
                    .map(|c| c.id)
                    .ok_or_else(|| TriageError::Chat(format!("channel not found: {name}")))
            })
            .await
    }

    async fn users(&self) -> Result<&HashMap<String, String>> {
        self.users
            .get_or_try_init(|| async {
                let members: Vec<Named> = self.list_all("users.list", "members").await?;
                Ok(members.into_iter().map(|m| (m.name, m.id)).collect())
            })
            .await
    }

    async fn user_groups(&self) -> Result<&HashMap<String, String>> {
        self.user_groups
            .get_or_try_init(|| async {
                let response: UserGroups = self.call("usergroups.list", &[]).await?;
                Ok(response
                    .usergroups
                    .into_iter()
                    .map(|g| (g.handle, g.id))
                    .collect())
            })
            .await
    }

    async fn post_api(&self, channel: Option<&str>, message: &Message) -> Result<()> {
        let channel = channel.ok_or_else(|| TriageError::MissingEnv(SLACK_CHANNEL.to_string()))?;
        let channel_id = self.channel_id(channel).await?.clone();
        let token = self.token()?;
        let url = format!("{}/chat.postMessage", self.api_url);
        let body = json!({
            "channel": channel_id,
            "text": message.text,
            "blocks": blocks(message),
        });
        let value: Value = self
            .http
            .json("chat.postMessage", |c| c.post(&url).bearer_auth(token).json(&body))
            .await
            .map_err(TriageError::Chat)?;
        check_ok("chat.postMessage", &value)
    }

    async fn post_webhook(&self, url: &str, message: &Message) -> Result<()> {
        let body = json!({ "text": message.text, "blocks": blocks(message) });
        self.http
            .send("webhook", |c| c.post(url).json(&body))
            .await
            .map_err(TriageError::Chat)?;
        Ok(())
    }
}

#[async_trait]
impl Chat for SlackClient {
    fn supports_mentions(&self) -> bool {
        matches!(self.transport, SlackTransport::Api { .. })
    }

    async fn post_message(&self, message: &Message) -> Result<()> {
        match &self.transport {
            SlackTransport::Api { channel, .. } => self.post_api(channel.as_deref(), message).await,
            SlackTransport::Webhook { url } => self.post_webhook(url, message).await,
            SlackTransport::Unconfigured => Err(TriageError::Chat(format!(
                "{SLACK_API_TOKEN} or {SLACK_WEBHOOK_URL} is not set"
            ))),
        }
    }

    async fn mention_link(&self, name: &str) -> Result<String> {
        let name = name.trim_start_matches('@');
        if matches!(name, "channel" | "here" | "everyone") {
            return Ok(format!("<!{name}>"));
        }
        if let Some(id) = self.users().await?.get(name) {
            return Ok(format!("<@{id}>"));
        }
        if let Some(id) = self.user_groups().await?.get(name) {
            return Ok(format!("<!subteam^{id}>"));
        }
        Err(TriageError::Chat(format!("user or user group not found: {name}")))
    }
}

#[derive(Deserialize)]
struct Named {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct UserGroups {
    #[serde(default)]
    usergroups: Vec<UserGroup>,
}

#[derive(Deserialize)]
struct UserGroup {
    id: String,
    handle: String,
}

fn check_ok(method: &str, value: &Value) -> Result<()> {
    if value.get("ok").and_then(Value::as_bool) == Some(true) {
        return Ok(());
    }
    let error = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Err(TriageError::Chat(format!("{method}: {error}")))
}

/// Message body plus a `repo | <url|#n> | task` footer.
fn blocks(message: &Message) -> Value {
    let footer = format!(
        "{} | <{}|#{}> | {}",
        message.repository, message.url, message.number, message.task_id
    );
    json!([
        { "type": "section", "text": { "type": "mrkdwn", "text": message.text } },
        { "type": "context", "block_id": "footer", "elements": [{ "type": "mrkdwn", "text": footer }] }
    ])
}
