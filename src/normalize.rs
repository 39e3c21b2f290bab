//! Turns raw GitHub deliveries into [`WebhookEvent`]s.
//!
//! Only three shapes are recorded: `push`, `pull_request` with action
//! `opened`, and `pull_request` with action `closed` where the pull request was
//! merged. Everything else is reported as [`Normalized::Skipped`] rather than
//! as an error, because GitHub sends many event kinds nobody asked to record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::event::{Action, WebhookEvent};

const UNKNOWN_AUTHOR: &str = "Unknown";
const SHORT_SHA_LEN: usize = 7;

/// Outcome of normalizing one delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Event(WebhookEvent),
    Skipped(SkipReason),
}

/// Why a delivery was not turned into an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedEvent(String),
    UnsupportedAction { event: String, action: String },
    /// The event kind is recorded but the payload lacks a required field.
    Malformed { event: String, missing: &'static str },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedEvent(event) => write!(f, "unsupported event type `{event}`"),
            Self::UnsupportedAction { event, action } => {
                write!(f, "unsupported `{event}` action `{action}`")
            }
            Self::Malformed { event, missing } => {
                write!(f, "`{event}` payload is missing `{missing}`")
            }
        }
    }
}

type TextExtractor = fn(&Value) -> Option<&str>;

/// Push author candidates, in priority order.
const PUSH_AUTHORS: &[TextExtractor] = &[
    |p| text(p, "/pusher/name"),
    |p| text(p, "/head_commit/author/name"),
    |p| text(p, "/sender/login"),
    |p| text(p, "/commits/0/author/name"),
];

const PUSH_COMMIT_IDS: &[TextExtractor] = &[
    |p| text(p, "/head_commit/id"),
    |p| text(p, "/commits/0/id"),
];

const PUSH_TIMESTAMPS: &[TextExtractor] = &[
    |p| text(p, "/head_commit/timestamp"),
    |p| text(p, "/commits/0/timestamp"),
];

/// Normalizes a delivery.
///
/// `received_at` stands in for any timestamp the payload lacks or that fails
/// to parse.
pub fn normalize(event_type: &str, payload: &Value, received_at: DateTime<Utc>) -> Normalized {
    let result = match event_type {
        "push" => normalize_push(payload, received_at),
        "pull_request" => normalize_pull_request(payload, received_at),
        other => return Normalized::Skipped(SkipReason::UnsupportedEvent(other.to_owned())),
    };
    match result {
        Ok(event) => Normalized::Event(event),
        Err(reason) => Normalized::Skipped(reason),
    }
}

fn normalize_push(payload: &Value, received_at: DateTime<Utc>) -> Result<WebhookEvent, SkipReason> {
    let git_ref = text(payload, "/ref").ok_or(SkipReason::Malformed {
        event: "push".to_owned(),
        missing: "ref",
    })?;
    let to_branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);

    let author = first_text(payload, PUSH_AUTHORS).unwrap_or(UNKNOWN_AUTHOR);
    let request_id = first_text(payload, PUSH_COMMIT_IDS).map_or_else(
        || format!("push-{}", received_at.timestamp_millis()),
        |sha| sha.chars().take(SHORT_SHA_LEN).collect(),
    );
    let occurred_at = first_text(payload, PUSH_TIMESTAMPS)
        .and_then(parse_timestamp)
        .unwrap_or(received_at);

    Ok(WebhookEvent {
        request_id,
        author: author.to_owned(),
        action: Action::Push,
        from_branch: None,
        to_branch: Some(to_branch.to_owned()),
        occurred_at,
        raw_payload: payload.clone(),
    })
}

fn normalize_pull_request(
    payload: &Value,
    received_at: DateTime<Utc>,
) -> Result<WebhookEvent, SkipReason> {
    let action = text(payload, "/action").unwrap_or_default();
    let merged = payload
        .pointer("/pull_request/merged")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let (kind, author_path, timestamp_path) = match action {
        "opened" => (Action::PullRequest, "/pull_request/user/login", "/pull_request/created_at"),
        "closed" if merged => (Action::Merge, "/sender/login", "/pull_request/merged_at"),
        other => {
            return Err(SkipReason::UnsupportedAction {
                event: "pull_request".to_owned(),
                action: if other == "closed" {
                    "closed (not merged)".to_owned()
                } else {
                    other.to_owned()
                },
            });
        }
    };

    let number = payload
        .pointer("/pull_request/number")
        .and_then(Value::as_u64)
        .ok_or(SkipReason::Malformed {
            event: "pull_request".to_owned(),
            missing: "pull_request.number",
        })?;

    Ok(WebhookEvent {
        request_id: number.to_string(),
        author: text(payload, author_path).unwrap_or(UNKNOWN_AUTHOR).to_owned(),
        action: kind,
        from_branch: text(payload, "/pull_request/head/ref").map(str::to_owned),
        to_branch: text(payload, "/pull_request/base/ref").map(str::to_owned),
        occurred_at: text(payload, timestamp_path)
            .and_then(parse_timestamp)
            .unwrap_or(received_at),
        raw_payload: payload.clone(),
    })
}

/// Non-empty string at a JSON pointer.
fn text<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn first_text<'a>(payload: &'a Value, chain: &[TextExtractor]) -> Option<&'a str> {
    chain.iter().find_map(|extract| extract(payload))
}

/// Parses RFC 3339 timestamps, `Z` or `+HH:MM` offsets alike.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => Some(parsed.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(raw, error = %e, "unparseable payload timestamp");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};
    use serde_json::json;

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 5, 19, 30, 0).unwrap()
    }

    fn event(normalized: Normalized) -> WebhookEvent {
        match normalized {
            Normalized::Event(event) => event,
            Normalized::Skipped(reason) => panic!("unexpectedly skipped: {reason}"),
        }
    }

    #[rstest]
    fn push_by_pusher(now: DateTime<Utc>) {
        let payload = json!({
            "ref": "refs/heads/main",
            "pusher": { "name": "Travis" },
            "head_commit": {
                "id": "a1b2c3d4e5f60718293a4b5c6d7e8f9012345678",
                "timestamp": "2025-07-05T19:30:00Z",
            },
        });

        let event = event(normalize("push", &payload, now));

        assert_eq!(event.action, Action::Push);
        assert_eq!(event.request_id, "a1b2c3d");
        assert_eq!(event.author, "Travis");
        assert_eq!(event.from_branch, None);
        assert_eq!(event.to_branch.as_deref(), Some("main"));
        assert_eq!(
            event.message(),
            "\"Travis\" pushed to \"main\" on 5th July 2025 - 07:30 PM UTC"
        );
    }

    #[rstest]
    #[case("refs/heads/main", "main")]
    #[case("refs/heads/feature/refs/heads/x", "feature/refs/heads/x")]
    #[case("refs/tags/v1.0", "refs/tags/v1.0")]
    fn push_strips_branch_prefix(now: DateTime<Utc>, #[case] git_ref: &str, #[case] branch: &str) {
        let payload = json!({ "ref": git_ref, "pusher": { "name": "Travis" } });

        let event = event(normalize("push", &payload, now));

        assert_eq!(event.to_branch.as_deref(), Some(branch));
    }

    #[rstest]
    #[case::head_commit_author(json!({
        "head_commit": { "author": { "name": "Ada" } },
        "sender": { "login": "ada-l" },
    }), "Ada")]
    #[case::sender(json!({
        "pusher": { "name": "" },
        "sender": { "login": "ada-l" },
    }), "ada-l")]
    #[case::first_commit(json!({
        "commits": [{ "author": { "name": "Grace" } }],
    }), "Grace")]
    #[case::nobody(json!({}), "Unknown")]
    fn push_author_fallbacks(now: DateTime<Utc>, #[case] payload: Value, #[case] author: &str) {
        let mut payload = payload;
        payload["ref"] = json!("refs/heads/main");

        assert_eq!(event(normalize("push", &payload, now)).author, author);
    }

    #[rstest]
    fn push_falls_back_to_first_commit(now: DateTime<Utc>) {
        let payload = json!({
            "ref": "refs/heads/dev",
            "commits": [{
                "id": "0123456789abcdef",
                "timestamp": "2025-07-06T01:00:00+05:30",
            }],
        });

        let event = event(normalize("push", &payload, now));

        assert_eq!(event.request_id, "0123456");
        assert_eq!(
            event.occurred_at,
            Utc.with_ymd_and_hms(2025, 7, 5, 19, 30, 0).unwrap()
        );
    }

    #[rstest]
    fn push_without_commits_gets_synthetic_id_and_receipt_time(now: DateTime<Utc>) {
        let payload = json!({ "ref": "refs/heads/gone", "deleted": true, "commits": [] });

        let event = event(normalize("push", &payload, now));

        assert_eq!(event.request_id, format!("push-{}", now.timestamp_millis()));
        assert_eq!(event.occurred_at, now);
    }

    #[rstest]
    fn push_with_bad_timestamp_uses_receipt_time(now: DateTime<Utc>) {
        let payload = json!({
            "ref": "refs/heads/main",
            "head_commit": { "id": "abc", "timestamp": "yesterday" },
        });

        let event = event(normalize("push", &payload, now));

        assert_eq!(event.occurred_at, now);
        assert_eq!(event.request_id, "abc");
    }

    #[rstest]
    fn push_without_ref_is_skipped(now: DateTime<Utc>) {
        let payload = json!({ "pusher": { "name": "Travis" } });

        assert_eq!(
            normalize("push", &payload, now),
            Normalized::Skipped(SkipReason::Malformed {
                event: "push".to_owned(),
                missing: "ref",
            })
        );
    }

    #[rstest]
    fn pull_request_opened(now: DateTime<Utc>) {
        let payload = json!({
            "action": "opened",
            "pull_request": {
                "number": 17,
                "user": { "login": "Travis" },
                "head": { "ref": "staging" },
                "base": { "ref": "master" },
                "created_at": "2025-07-01T08:15:00Z",
            },
            "sender": { "login": "someone-else" },
        });

        let event = event(normalize("pull_request", &payload, now));

        assert_eq!(event.action, Action::PullRequest);
        assert_eq!(event.request_id, "17");
        assert_eq!(event.author, "Travis");
        assert_eq!(
            event.message(),
            "\"Travis\" submitted a pull request from \"staging\" to \"master\" on 1st July 2025 - 08:15 AM UTC"
        );
    }

    #[rstest]
    fn pull_request_merged(now: DateTime<Utc>) {
        let payload = json!({
            "action": "closed",
            "pull_request": {
                "number": 18,
                "merged": true,
                "user": { "login": "author" },
                "head": { "ref": "dev" },
                "base": { "ref": "master" },
                "merged_at": "2025-07-02T14:00:00Z",
            },
            "sender": { "login": "Travis" },
        });

        let event = event(normalize("pull_request", &payload, now));

        assert_eq!(event.action, Action::Merge);
        assert_eq!(event.request_id, "18");
        assert_eq!(
            event.message(),
            "\"Travis\" merged branch \"dev\" to \"master\" on 2nd July 2025 - 02:00 PM UTC"
        );
    }

    #[rstest]
    fn pull_request_without_user_or_timestamp(now: DateTime<Utc>) {
        let payload = json!({ "action": "opened", "pull_request": { "number": 3 } });

        let event = event(normalize("pull_request", &payload, now));

        assert_eq!(event.author, "Unknown");
        assert_eq!(event.occurred_at, now);
        assert_eq!(event.from_branch, None);
    }

    #[rstest]
    #[case(json!({ "action": "closed", "pull_request": { "number": 1, "merged": false } }))]
    #[case(json!({ "action": "closed", "pull_request": { "number": 1 } }))]
    #[case(json!({ "action": "synchronize", "pull_request": { "number": 1 } }))]
    #[case(json!({ "action": "reopened", "pull_request": { "number": 1, "merged": true } }))]
    #[case(json!({ "pull_request": { "number": 1 } }))]
    fn other_pull_request_actions_are_skipped(now: DateTime<Utc>, #[case] payload: Value) {
        assert!(matches!(
            normalize("pull_request", &payload, now),
            Normalized::Skipped(SkipReason::UnsupportedAction { .. })
        ));
    }

    #[rstest]
    fn pull_request_without_number_is_skipped(now: DateTime<Utc>) {
        let payload = json!({ "action": "opened", "pull_request": { "user": { "login": "x" } } });

        assert!(matches!(
            normalize("pull_request", &payload, now),
            Normalized::Skipped(SkipReason::Malformed { missing: "pull_request.number", .. })
        ));
    }

    #[rstest]
    #[case("issues")]
    #[case("release")]
    #[case("")]
    fn other_event_types_are_skipped(now: DateTime<Utc>, #[case] event_type: &str) {
        assert_eq!(
            normalize(event_type, &json!({ "action": "opened" }), now),
            Normalized::Skipped(SkipReason::UnsupportedEvent(event_type.to_owned()))
        );
    }

    #[rstest]
    fn non_object_payloads_do_not_panic(now: DateTime<Utc>) {
        for payload in [json!(null), json!([1, 2]), json!("push"), json!(42)] {
            assert!(matches!(
                normalize("push", &payload, now),
                Normalized::Skipped(_)
            ));
            assert!(matches!(
                normalize("pull_request", &payload, now),
                Normalized::Skipped(_)
            ));
        }
    }
}
