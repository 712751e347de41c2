//! GitHub tracker: targets are read through GraphQL in one round trip,
//! mutations go through the REST API.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use triage_core::env::{Env, GITHUB_REPOSITORY};
use triage_core::remote::Tracker;
use triage_core::target::{Target, Targets};
use triage_core::{Result, TriageError};

use crate::http::Http;

const DEFAULT_API_URL: &str = "https://api.github.com";
const PAGE_LIMIT: usize = 100;

pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const GITHUB_GRAPHQL_URL: &str = "GITHUB_GRAPHQL_URL";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GithubSettings {
    pub token: String,
    /// `owner/repo`.
    pub repository: String,
    pub api_url: String,
    pub graphql_url: String,
}

impl GithubSettings {
    pub fn new(token: impl Into<String>, repository: impl Into<String>) -> Self {
        let api_url = DEFAULT_API_URL.to_string();
        Self {
            token: token.into(),
            repository: repository.into(),
            graphql_url: format!("{api_url}/graphql"),
            api_url,
        }
    }

    /// Point both endpoints at `api_url`, e.g. a GitHub Enterprise host or a
    /// local mock server.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        self.graphql_url = format!("{api_url}/graphql");
        self.api_url = api_url;
        self
    }

    pub fn from_env(env: &Env) -> Result<Self> {
        let token = env
            .non_empty(GITHUB_TOKEN)
            .ok_or_else(|| TriageError::MissingEnv(GITHUB_TOKEN.to_string()))?;
        let repository = env
            .non_empty(GITHUB_REPOSITORY)
            .ok_or_else(|| TriageError::MissingEnv(GITHUB_REPOSITORY.to_string()))?;
        let mut settings = Self::new(token, repository);
        if let Some(api_url) = env.non_empty(GITHUB_API_URL) {
            settings = settings.with_api_url(api_url);
        }
        if let Some(graphql_url) = env.non_empty(GITHUB_GRAPHQL_URL) {
            settings.graphql_url = graphql_url.to_string();
        }
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GithubClient {
    http: Http,
    owner: String,
    repo: String,
    api_url: String,
    graphql_url: String,
}

impl GithubClient {
    pub fn new(settings: GithubSettings) -> Result<Self> {
        let (owner, repo) = settings
            .repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| TriageError::InvalidSetting {
                key: GITHUB_REPOSITORY.to_string(),
                value: settings.repository.clone(),
            })?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("triage"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        let auth = format!("Bearer {}", settings.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth)
                .map_err(|e| TriageError::Tracker(format!("invalid authorization header: {e}")))?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TriageError::Tracker(format!("failed to build http client: {e}")))?;

        Ok(Self {
            http: Http::new(client),
            owner: owner.to_string(),
            repo: repo.to_string(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            graphql_url: settings.graphql_url,
        })
    }

    pub fn from_env(env: &Env) -> Result<Self> {
        Self::new(GithubSettings::from_env(env)?)
    }

    fn issue_url(&self, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/issues/{number}",
            self.api_url, self.owner, self.repo
        )
    }

    fn pull_url(&self, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{number}",
            self.api_url, self.owner, self.repo
        )
    }

    async fn graphql<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T> {
        let body = json!({ "query": query, "variables": variables });
        let response: GraphqlResponse<T> = self
            .http
            .json(operation, |c| c.post(&self.graphql_url).json(&body))
            .await
            .map_err(TriageError::Tracker)?;
        if !response.errors.is_empty() {
            let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
            return Err(TriageError::Tracker(format!(
                "{operation}: {}",
                messages.join("; ")
            )));
        }
        response
            .data
            .ok_or_else(|| TriageError::Tracker(format!("{operation}: empty response")))
    }

    async fn edit_issue(&self, operation: &str, number: u64, body: serde_json::Value) -> Result<()> {
        let url = self.issue_url(number);
        self.http
            .send(operation, |c| c.patch(&url).json(&body))
            .await
            .map_err(TriageError::Tracker)?;
        Ok(())
    }
}

#[async_trait]
impl Tracker for GithubClient {
    async fn fetch_targets(&self) -> Result<Targets> {
        let data: TargetsData = self
            .graphql(
                "fetch targets",
                &format!("{TARGETS_QUERY}{ISSUE_FIELDS}{PULL_REQUEST_FIELDS}"),
                json!({ "owner": self.owner, "repo": self.repo }),
            )
            .await?;
        let repository = data
            .repository
            .ok_or_else(|| TriageError::Tracker(format!("repository {}/{} not found", self.owner, self.repo)))?;
        if repository.issues.page_info.has_next_page {
            return Err(TriageError::Tracker(format!(
                "too many open issues (limit: {PAGE_LIMIT})"
            )));
        }
        if repository.pull_requests.page_info.has_next_page {
            return Err(TriageError::Tracker(format!(
                "too many open pull requests (limit: {PAGE_LIMIT})"
            )));
        }

        let now = Utc::now();
        let login = data.viewer.login;
        let mut targets = Targets::new();
        for issue in repository.issues.nodes {
            let target = issue.into_target(&login, now)?;
            targets.insert(target.number, target);
        }
        for pull in repository.pull_requests.nodes {
            if pull.is_draft {
                tracing::debug!(number = pull.common.number, "skipping draft pull request");
                continue;
            }
            let target = pull.into_target(&login, now)?;
            targets.insert(target.number, target);
        }
        tracing::debug!(count = targets.len(), "fetched targets");
        Ok(targets)
    }

    async fn fetch_target(&self, number: u64) -> Result<Target> {
        let data: TargetData = self
            .graphql(
                "fetch target",
                &format!("{TARGET_QUERY}{ISSUE_FIELDS}{PULL_REQUEST_FIELDS}"),
                json!({ "owner": self.owner, "repo": self.repo, "number": number }),
            )
            .await?;
        let item = data
            .repository
            .and_then(|r| r.issue_or_pull_request)
            .ok_or_else(|| TriageError::Tracker(format!("#{number} not found")))?;

        let now = Utc::now();
        let login = data.viewer.login;
        match item {
            Item::Issue(issue) => {
                if !issue.common.is_open() {
                    return Err(TriageError::NotOpen(format!("#{number}")));
                }
                issue.into_target(&login, now)
            }
            Item::PullRequest(pull) => {
                if !pull.common.is_open() || pull.is_draft {
                    return Err(TriageError::NotOpen(format!("#{number}")));
                }
                pull.into_target(&login, now)
            }
        }
    }

    async fn set_labels(&self, number: u64, labels: &[String]) -> Result<()> {
        self.edit_issue("set labels", number, json!({ "labels": labels }))
            .await
    }

    async fn set_assignees(&self, number: u64, assignees: &[String]) -> Result<()> {
        self.edit_issue("set assignees", number, json!({ "assignees": assignees }))
            .await
    }

    async fn set_reviewers(&self, number: u64, reviewers: &[String]) -> Result<()> {
        let mut users = BTreeSet::new();
        let mut teams = BTreeSet::new();
        for reviewer in reviewers {
            let name = reviewer.trim_start_matches('@');
            match name.split_once('/') {
                Some((_, slug)) => teams.insert(slug.to_string()),
                None => users.insert(name.to_string()),
            };
        }

        let url = format!("{}/requested_reviewers", self.pull_url(number));
        let current: RequestedReviewers = self
            .http
            .json("list requested reviewers", |c| c.get(&url))
            .await
            .map_err(TriageError::Tracker)?;

        let mut drop_users = Vec::new();
        for user in current.users {
            if !users.remove(&user.login) {
                drop_users.push(user.login);
            }
        }
        let mut drop_teams = Vec::new();
        for team in current.teams {
            if !teams.remove(&team.slug) {
                drop_teams.push(team.slug);
            }
        }

        if !drop_users.is_empty() || !drop_teams.is_empty() {
            let body = json!({ "reviewers": drop_users, "team_reviewers": drop_teams });
            self.http
                .send("remove reviewers", |c| c.delete(&url).json(&body))
                .await
                .map_err(TriageError::Tracker)?;
        }
        if !users.is_empty() || !teams.is_empty() {
            let body = json!({ "reviewers": users, "team_reviewers": teams });
            self.http
                .send("request reviewers", |c| c.post(&url).json(&body))
                .await
                .map_err(TriageError::Tracker)?;
        }
        Ok(())
    }

    async fn add_comment(&self, number: u64, body: &str) -> Result<()> {
        let url = format!("{}/comments", self.issue_url(number));
        let payload = json!({ "body": body });
        self.http
            .send("add comment", |c| c.post(&url).json(&payload))
            .await
            .map_err(TriageError::Tracker)?;
        Ok(())
    }

    async fn close_issue(&self, number: u64) -> Result<()> {
        self.edit_issue("close", number, json!({ "state": "closed" }))
            .await
    }

    async fn merge_pull_request(&self, number: u64) -> Result<()> {
        let url = format!("{}/merge", self.pull_url(number));
        self.http
            .send("merge pull request", |c| c.put(&url).json(&json!({})))
            .await
            .map_err(TriageError::Tracker)?;
        Ok(())
    }

    async fn resolve_users(&self, names: &[String]) -> Result<Vec<String>> {
        let mut resolved: Vec<String> = Vec::new();
        for name in names {
            let name = name.trim_start_matches('@');
            let Some((org, slug)) = name.split_once('/') else {
                resolved.push(name.to_string());
                continue;
            };
            let url = format!("{}/orgs/{org}/teams/{slug}/members", self.api_url);
            let members: Vec<Login> = self
                .http
                .json("list team members", |c| {
                    c.get(&url).query(&[("per_page", PAGE_LIMIT.to_string())])
                })
                .await
                .map_err(TriageError::Tracker)?;
            resolved.extend(members.into_iter().map(|m| m.login));
        }
        let mut seen = BTreeSet::new();
        resolved.retain(|name| seen.insert(name.clone()));
        Ok(resolved)
    }
}

// ---------------------------------------------------------------------------
// GraphQL documents
// ---------------------------------------------------------------------------

const TARGETS_QUERY: &str = r#"
query($owner: String!, $repo: String!) {
  viewer { login }
  repository(owner: $owner, name: $repo) {
    issues(first: 100, states: OPEN, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes { ...IssueFields }
      pageInfo { hasNextPage }
    }
    pullRequests(first: 100, states: OPEN, orderBy: {field: CREATED_AT, direction: DESC}) {
      nodes { ...PullRequestFields }
      pageInfo { hasNextPage }
    }
  }
}
"#;

const TARGET_QUERY: &str = r#"
query($owner: String!, $repo: String!, $number: Int!) {
  viewer { login }
  repository(owner: $owner, name: $repo) {
    issueOrPullRequest(number: $number) {
      __typename
      ...IssueFields
      ...PullRequestFields
    }
  }
}
"#;

const ISSUE_FIELDS: &str = r#"
fragment IssueFields on Issue {
  author { login }
  number state title body url createdAt updatedAt
  labels(first: 100) { nodes { name } }
  assignees(first: 100) { nodes { login } }
  comments(first: 100) { nodes { author { login } body createdAt } pageInfo { hasNextPage } }
}
"#;

const PULL_REQUEST_FIELDS: &str = r#"
fragment PullRequestFields on PullRequest {
  author { login }
  number state title body url createdAt updatedAt
  isDraft changedFiles mergeable reviewDecision
  labels(first: 100) { nodes { name } }
  assignees(first: 100) { nodes { login } }
  comments(first: 100) { nodes { author { login } body createdAt } pageInfo { hasNextPage } }
  reviewRequests(first: 100) {
    nodes {
      asCodeOwner
      requestedReviewer {
        __typename
        ... on User { login }
        ... on Team { slug organization { login } }
      }
    }
  }
  latestReviews(first: 100) { nodes { author { login } state } }
}
"#;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct TargetsData {
    viewer: Login,
    repository: Option<TargetsRepository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetsRepository {
    issues: Page<IssueNode>,
    pull_requests: Page<PullRequestNode>,
}

#[derive(Deserialize)]
struct TargetData {
    viewer: Login,
    repository: Option<TargetRepository>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetRepository {
    issue_or_pull_request: Option<Item>,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum Item {
    Issue(IssueNode),
    PullRequest(PullRequestNode),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    nodes: Vec<T>,
    #[serde(default)]
    page_info: PageInfo,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<T>,
}

#[derive(Deserialize, Clone)]
struct Login {
    login: String,
}

#[derive(Deserialize)]
struct Label {
    name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentNode {
    author: Option<Login>,
    body: String,
    created_at: DateTime<Utc>,
}

impl CommentNode {
    fn author_login(&self) -> &str {
        self.author.as_ref().map(|a| a.login.as_str()).unwrap_or_default()
    }
}

/// Fields shared by issues and pull requests.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommonFields {
    author: Option<Login>,
    number: u64,
    state: String,
    title: String,
    body: String,
    url: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    labels: Nodes<Label>,
    assignees: Nodes<Login>,
    comments: Page<CommentNode>,
}

impl CommonFields {
    fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }

    /// A target with everything but the pull-request specific fields.
    fn into_target(self, login: &str, now: DateTime<Utc>) -> Result<Target> {
        if self.comments.page_info.has_next_page {
            return Err(TriageError::Tracker(format!(
                "too many comments on #{} (limit: {PAGE_LIMIT})",
                self.number
            )));
        }
        let metrics = CommentMetrics::new(self.comments.nodes, login);
        Ok(Target {
            number: self.number,
            state: self.state.to_lowercase(),
            title: self.title,
            body: self.body,
            url: self.url,
            author: self.author.map(|a| a.login).unwrap_or_default(),
            labels: self.labels.nodes.into_iter().map(|l| l.name).collect(),
            assignees: self.assignees.nodes.into_iter().map(|a| a.login).collect(),
            hours_elapsed_since_created: (now - self.created_at).num_hours(),
            hours_elapsed_since_updated: (now - self.updated_at).num_hours(),
            number_of_comments: metrics.count,
            latest_comment_author: metrics.latest_author,
            latest_comment_body: metrics.latest_body,
            number_of_consecutive_comments: metrics.consecutive,
            login: login.to_string(),
            ..Target::default()
        })
    }
}

#[derive(Deserialize)]
struct IssueNode {
    #[serde(flatten)]
    common: CommonFields,
}

impl IssueNode {
    fn into_target(self, login: &str, now: DateTime<Utc>) -> Result<Target> {
        let mut target = self.common.into_target(login, now)?;
        target.is_issue = true;
        Ok(target)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullRequestNode {
    #[serde(flatten)]
    common: CommonFields,
    is_draft: bool,
    changed_files: u64,
    mergeable: String,
    review_decision: Option<String>,
    review_requests: Nodes<ReviewRequest>,
    latest_reviews: Nodes<Review>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewRequest {
    as_code_owner: bool,
    requested_reviewer: Option<RequestedReviewer>,
}

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum RequestedReviewer {
    User { login: String },
    Team { slug: String, organization: Login },
    #[serde(other)]
    Other,
}

impl RequestedReviewer {
    fn name(&self) -> Option<String> {
        match self {
            Self::User { login } => Some(login.clone()),
            Self::Team { slug, organization } => Some(format!("{}/{slug}", organization.login)),
            Self::Other => None,
        }
    }
}

#[derive(Deserialize)]
struct Review {
    author: Option<Login>,
    state: String,
}

impl PullRequestNode {
    fn into_target(self, login: &str, now: DateTime<Utc>) -> Result<Target> {
        let mut reviewers: Vec<String> = Vec::new();
        let mut code_owners: Vec<String> = Vec::new();
        for request in &self.review_requests.nodes {
            let Some(name) = request.requested_reviewer.as_ref().and_then(|r| r.name()) else {
                continue;
            };
            if request.as_code_owner {
                code_owners.push(name.clone());
            }
            reviewers.push(name);
        }
        let mut approved: Vec<String> = Vec::new();
        for review in self.latest_reviews.nodes {
            let Some(author) = review.author else {
                continue;
            };
            if review.state == "APPROVED" {
                approved.push(author.login.clone());
            }
            reviewers.push(author.login);
        }
        let mut seen = BTreeSet::new();
        reviewers.retain(|r| seen.insert(r.clone()));
        let code_owners_who_approved = approved
            .iter()
            .filter(|r| code_owners.contains(r))
            .cloned()
            .collect();

        let decision = self.review_decision.as_deref().unwrap_or_default();
        let mut target = self.common.into_target(login, now)?;
        target.is_pull_request = true;
        target.reviewers = reviewers;
        target.code_owners = code_owners;
        target.reviewers_who_approved = approved;
        target.code_owners_who_approved = code_owners_who_approved;
        target.is_approved = decision == "APPROVED";
        target.is_review_required = decision == "REVIEW_REQUIRED";
        target.is_change_requested = decision == "CHANGES_REQUESTED";
        target.mergeable = self.mergeable == "MERGEABLE";
        target.changed_files = self.changed_files;
        Ok(target)
    }
}

#[derive(Deserialize)]
struct RequestedReviewers {
    #[serde(default)]
    users: Vec<Login>,
    #[serde(default)]
    teams: Vec<TeamSlug>,
}

#[derive(Deserialize)]
struct TeamSlug {
    slug: String,
}

struct CommentMetrics {
    count: u64,
    latest_author: String,
    latest_body: String,
    consecutive: u64,
}

impl CommentMetrics {
    /// `consecutive` counts the newest comments written by `login` before
    /// anyone else spoke.
    fn new(mut comments: Vec<CommentNode>, login: &str) -> Self {
        comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let consecutive = comments
            .iter()
            .take_while(|c| c.author_login() == login)
            .count() as u64;
        let (latest_author, latest_body) = comments
            .first()
            .map(|c| (c.author_login().to_string(), c.body.clone()))
            .unwrap_or_default();
        Self {
            count: comments.len() as u64,
            latest_author,
            latest_body,
            consecutive,
        }
    }
}
