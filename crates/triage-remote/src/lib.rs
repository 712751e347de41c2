//! HTTP implementations of the engine's `Tracker` and `Chat` seams.
//!
//! - [`GithubClient`]: targets through GraphQL, mutations through REST.
//! - [`SlackClient`]: Web API (`chat.postMessage`) or an incoming webhook.

pub mod github;
pub mod slack;

mod http;

pub use github::{GithubClient, GithubSettings};
pub use slack::{SlackClient, SlackTransport};
