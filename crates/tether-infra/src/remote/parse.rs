//! Decoding of remote chat server JSON.
//!
//! Servers in the wild disagree on field names, so every value is looked up
//! through a fixed list of JSON pointers tried in order:
//!
//! | value      | tried in order                                   |
//! |------------|--------------------------------------------------|
//! | role       | `/info/role`, `/role`                            |
//! | text parts | `/parts[type == "text"]/text`, then `/content`   |
//! | session id | `/id`, `/info/id`                                |
//! | created at | `/time/created`, `/createdAt`                    |
//! | share url  | `/share/url`, `/url`, `/shareUrl`                |
//! | summary    | `/summary`, `/text`                              |
//! | action     | `/action`, `/needs_action`, `/actionRequired`    |
//!
//! Decoders return [`Parsed`] so callers decide whether a malformed shape is
//! an error or a soft failure.

use serde_json::Value;
use tether_types::message::{RecentMessage, RemoteMessage};
use tether_types::remote::{Parsed, RemoteSession, SendOutcome, SummarizeOutcome};

const ROLE: &[&str] = &["/info/role", "/role"];
const SESSION_ID: &[&str] = &["/id", "/info/id"];
const TITLE: &[&str] = &["/title", "/info/title"];
const CREATED_AT: &[&str] = &["/time/created", "/createdAt"];
const SHARE_URL: &[&str] = &["/share/url", "/url", "/shareUrl"];
const SUMMARY: &[&str] = &["/summary", "/text"];
const ACTION: &[&str] = &["/action", "/needs_action", "/actionRequired"];
const ERROR: &[&str] = &["/error/data/message", "/error/message", "/error", "/info/error/data/message"];

fn first_str<'a>(value: &'a Value, pointers: &[&str]) -> Option<&'a str> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_str))
}

fn first_bool(value: &Value, pointers: &[&str]) -> Option<bool> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_bool))
}

fn first_i64(value: &Value, pointers: &[&str]) -> Option<i64> {
    pointers
        .iter()
        .find_map(|p| value.pointer(p).and_then(Value::as_i64))
}

/// Text fragments of one message: its `text` parts, else its `content`.
pub fn message_texts(value: &Value) -> Vec<String> {
    let from_parts: Vec<String> = value
        .get("parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if !from_parts.is_empty() {
        return from_parts;
    }
    value
        .get("content")
        .and_then(Value::as_str)
        .map(|c| vec![c.to_string()])
        .unwrap_or_default()
}

pub fn parse_message(value: &Value) -> Parsed<RemoteMessage> {
    if !value.is_object() {
        return Parsed::malformed("message is not an object");
    }
    Parsed::Ok(RemoteMessage {
        role: first_str(value, ROLE).map(str::to_string),
        texts: message_texts(value),
    })
}

/// Decode a message list: a bare array or `{"messages": [...]}`.
///
/// Non-object entries are skipped.
pub fn parse_messages(value: &Value) -> Parsed<Vec<RemoteMessage>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("messages").and_then(Value::as_array) {
            Some(items) => items,
            None => return Parsed::malformed("expected a message array"),
        },
        _ => return Parsed::malformed("expected a message array"),
    };
    Parsed::Ok(items.iter().filter_map(|v| parse_message(v).ok()).collect())
}

pub fn parse_session(value: &Value) -> Parsed<RemoteSession> {
    let Some(id) = first_str(value, SESSION_ID) else {
        return Parsed::malformed("session has no id");
    };
    Parsed::Ok(RemoteSession {
        id: id.to_string(),
        title: first_str(value, TITLE).map(str::to_string),
        created_at: first_i64(value, CREATED_AT),
        share_url: first_str(value, SHARE_URL).map(str::to_string),
    })
}

/// Decode a session list. Entries without an id are skipped.
pub fn parse_sessions(value: &Value) -> Parsed<Vec<RemoteSession>> {
    match value.as_array() {
        Some(items) => Parsed::Ok(items.iter().filter_map(|v| parse_session(v).ok()).collect()),
        None => Parsed::malformed("expected a session array"),
    }
}

pub fn parse_share_url(value: &Value) -> Parsed<String> {
    match first_str(value, SHARE_URL) {
        Some(url) => Parsed::Ok(url.to_string()),
        None => Parsed::malformed("share response has no url"),
    }
}

/// Decode the reply to a posted message.
pub fn parse_send_reply(value: &Value) -> SendOutcome {
    if let Some(error) = first_str(value, ERROR) {
        return SendOutcome::rejected(error);
    }
    if value.get("error").is_some_and(|e| !e.is_null()) {
        return SendOutcome::rejected(value["error"].to_string());
    }
    SendOutcome::sent(message_texts(value))
}

/// Interpret the assistant's reply to a summarization prompt.
///
/// Accepts a JSON object (possibly wrapped in prose or a code fence) or plain
/// text, which is taken as the summary with no action required.
pub fn parse_summary_reply(texts: &[String]) -> SummarizeOutcome {
    let reply = texts.join("\n");
    let reply = reply.trim();
    if reply.is_empty() {
        return SummarizeOutcome::failed("empty summarization reply");
    }

    if let Some(object) = extract_json_object(reply) {
        if let Some(summary) = first_str(&object, SUMMARY).map(str::trim).filter(|s| !s.is_empty()) {
            let action = first_bool(&object, ACTION).unwrap_or(false);
            return SummarizeOutcome::summarized(summary, action);
        }
    }
    SummarizeOutcome::summarized(reply, false)
}

fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&text[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Prompt sent to the scratch session: the instruction, then the window.
pub fn render_summary_prompt(instruction: &str, window: &[RecentMessage]) -> String {
    let mut prompt = String::from(instruction.trim());
    prompt.push_str("\n\n");
    for msg in window {
        prompt.push_str(&msg.role);
        prompt.push_str(": ");
        prompt.push_str(&msg.text);
        prompt.push('\n');
    }
    prompt
}
