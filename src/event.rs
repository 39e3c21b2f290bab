//! Canonical webhook event records and their display messages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kinds of repository activity that get recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Push,
    PullRequest,
    Merge,
}

impl Action {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Push => "PUSH",
            Self::PullRequest => "PULL_REQUEST",
            Self::Merge => "MERGE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct ParseActionError(pub String);

impl FromStr for Action {
    type Err = ParseActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PUSH" => Ok(Self::Push),
            "PULL_REQUEST" => Ok(Self::PullRequest),
            "MERGE" => Ok(Self::Merge),
            other => Err(ParseActionError(other.to_owned())),
        }
    }
}

/// A normalized webhook delivery, ready to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub request_id: String,
    pub author: String,
    pub action: Action,
    pub from_branch: Option<String>,
    pub to_branch: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub raw_payload: Value,
}

impl WebhookEvent {
    pub fn message(&self) -> String {
        render_message(
            self.action.as_str(),
            &self.author,
            self.from_branch.as_deref(),
            self.to_branch.as_deref(),
            self.occurred_at,
        )
    }
}

/// A record read back from an [`EventStore`](crate::store::EventStore).
///
/// `action` stays a string so rows written by older schemas still render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: i64,
    pub request_id: String,
    pub author: String,
    pub action: String,
    pub from_branch: Option<String>,
    pub to_branch: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn message(&self) -> String {
        render_message(
            &self.action,
            &self.author,
            self.from_branch.as_deref(),
            self.to_branch.as_deref(),
            self.occurred_at,
        )
    }
}

/// Renders the dashboard line for an event.
///
/// Unknown actions fall back to `"{author}" performed {action} on {timestamp}`.
pub fn render_message(
    action: &str,
    author: &str,
    from_branch: Option<&str>,
    to_branch: Option<&str>,
    at: DateTime<Utc>,
) -> String {
    let when = format_timestamp(at);
    let from = from_branch.unwrap_or_default();
    let to = to_branch.unwrap_or_default();
    match action.parse::<Action>() {
        Ok(Action::Push) => format!("\"{author}\" pushed to \"{to}\" on {when}"),
        Ok(Action::PullRequest) => {
            format!("\"{author}\" submitted a pull request from \"{from}\" to \"{to}\" on {when}")
        }
        Ok(Action::Merge) => format!("\"{author}\" merged branch \"{from}\" to \"{to}\" on {when}"),
        Err(_) => format!("\"{author}\" performed {action} on {when}"),
    }
}

/// Formats as `5th July 2025 - 07:30 PM UTC`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    let day = at.day();
    format!(
        "{day}{} {}",
        ordinal_suffix(day),
        at.format("%B %Y - %I:%M %p UTC")
    )
}

pub const fn ordinal_suffix(day: u32) -> &'static str {
    match day {
        1 | 21 | 31 => "st",
        2 | 22 => "nd",
        3 | 23 => "rd",
        _ => "th",
    }
}
