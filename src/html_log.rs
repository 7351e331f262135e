// SPDX-License-Identifier: GPL-3.0-only

//! Parser for the older tag-based log format (`.AdiumHTMLLog`).
//!
//! These logs are not well-formed HTML: each logical event is one
//! `<div>`-delimited record of loosely structured markup, so the parser
//! works on marker substrings rather than a real HTML tree. Extraction is
//! tolerant throughout — a record missing an expected marker contributes
//! whatever fields it does have, and a stream with zero parseable records
//! still yields a valid empty [`Conversation`].
//!
//! # Record shapes
//!
//! ```text
//! <div class="receive"><span class="timestamp">11:18:15 AM</span>
//!     <span class="sender">bob: </span><pre class="message">hi</pre></div>
//! <div class="send">...same structure, attributed to the local account...</div>
//! <div class="status">bob has gone away (11:20:00 AM)</div>
//! ```

use crate::config::Config;
use crate::conversation::{Conversation, Message, MessageKind, Role, SYSTEM_SENDER};
use crate::dates;
use chrono::NaiveDate;
use std::path::Path;
use tracing::{debug, warn};

/// Classification of one `<div>`-delimited record, tried in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// An inbound message from the remote party.
    Receive,
    /// An outbound message from the local account.
    Send,
    /// A system event with the timestamp in trailing parenthesis text.
    Status,
    /// Anything else; logged and skipped, never fatal.
    Unknown,
}

/// Classifies a record by the first matching class marker.
#[must_use]
pub fn classify(record: &str) -> RecordKind {
    const PATTERNS: [(&str, RecordKind); 3] = [
        ("class=\"receive\"", RecordKind::Receive),
        ("class=\"send\"", RecordKind::Send),
        ("class=\"status\"", RecordKind::Status),
    ];
    for (marker, kind) in PATTERNS {
        if record.contains(marker) {
            return kind;
        }
    }
    RecordKind::Unknown
}

/// Parses an old-style HTML log into a [`Conversation`].
///
/// `path` is the log's on-disk location; its file name supplies the
/// conversation date and its directory shape is consulted for
/// service/account context. The file itself is not touched — `input` must
/// already hold the full document.
#[must_use]
pub fn parse_html_log(input: &str, path: &Path, config: &Config) -> Conversation {
    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let mut conv = Conversation::new(file_name);
    conv.im_client = "Adium".to_string();
    conv.derive_account_context(path);

    conv.start_date = dates::filename_timestamp(&conv.origin_file_name, config.timezone);
    let log_date = conv.start_date.map(|dt| dt.date_naive());

    for record in input.split("</div>") {
        if !record.contains("<div") {
            continue;
        }
        match classify(record) {
            RecordKind::Receive => parse_chat_record(&mut conv, record, log_date, Role::Remote, config),
            RecordKind::Send => parse_chat_record(&mut conv, record, log_date, Role::Local, config),
            RecordKind::Status => parse_status_record(&mut conv, record, log_date, config),
            RecordKind::Unknown => {
                warn!(
                    record = record.trim().chars().take(60).collect::<String>(),
                    "skipping unrecognized record"
                );
            }
        }
    }

    if conv.start_date.is_none() {
        // Skip undated records; one bad time string must not mask the rest.
        conv.start_date = conv.earliest_timestamp();
    }
    conv.ensure_two_participants();
    conv
}

fn parse_chat_record(
    conv: &mut Conversation,
    record: &str,
    log_date: Option<NaiveDate>,
    role: Role,
    config: &Config,
) {
    let sender = between(record, "<span class=\"sender\">", ": </span>");
    let time_of_day = between(record, "<span class=\"timestamp\">", "</span>");
    let mut body = between(record, "<pre class=\"message\">", "</pre>");
    if body.is_empty() {
        // Some log revisions omit the <pre> wrapper; fall back to whatever
        // trails the sender span.
        if let Some(idx) = record.rfind("</span>") {
            body = &record[idx + "</span>".len()..];
        }
    }

    if sender.is_empty() {
        debug!("chat record without a sender span");
    }
    let sender_id = sender.to_lowercase();
    if !sender_id.is_empty() {
        conv.add_participant(&sender_id);
        conv.set_role(&sender_id, role);
    }

    let mut msg = Message::new(MessageKind::Chat, sender_id);
    msg.timestamp = resolve_record_time(time_of_day, log_date, config);
    msg.plain_text = strip_tags(body).trim().to_string();
    let html = body.trim();
    if !html.is_empty() {
        msg.html_body = Some(html.to_string());
    }
    conv.add_message(msg);
}

fn parse_status_record(
    conv: &mut Conversation,
    record: &str,
    log_date: Option<NaiveDate>,
    config: &Config,
) {
    // Status lines carry the time in trailing parenthesis text rather than
    // a timestamp span.
    let time_of_day = record
        .rfind(" (")
        .and_then(|start| {
            let rest = &record[start + 2..];
            rest.find(')').map(|end| &rest[..end])
        })
        .unwrap_or_default();

    let mut msg = Message::new(MessageKind::Event, SYSTEM_SENDER);
    msg.timestamp = resolve_record_time(time_of_day, log_date, config);
    msg.plain_text = strip_tags(record).trim().to_string();
    conv.add_message(msg);
}

fn resolve_record_time(
    time_of_day: &str,
    log_date: Option<NaiveDate>,
    config: &Config,
) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    if time_of_day.is_empty() {
        debug!("record without a usable time-of-day");
        return None;
    }
    let date = log_date?;
    let resolved = dates::combine_date_time(date, time_of_day, config.timezone);
    if resolved.is_none() {
        debug!(time_of_day, "record time-of-day did not parse");
    }
    resolved
}

/// Returns the text between `start` and the next occurrence of `end`, or
/// the empty string when either marker is absent. Never fails: malformed
/// individual lines must not abort the whole conversation.
#[must_use]
pub fn between<'a>(haystack: &'a str, start: &str, end: &str) -> &'a str {
    let Some(s) = haystack.find(start) else {
        return "";
    };
    let after = &haystack[s + start.len()..];
    let Some(e) = after.find(end) else {
        return "";
    };
    &after[..e]
}

/// Strips markup tags, keeping only text content.
#[must_use]
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const FILE: &str = "bob (2011-03-16T11.18.15-0400).AdiumHTMLLog";

    fn receive(time: &str, sender: &str, body: &str) -> String {
        format!(
            "<div class=\"receive\"><span class=\"timestamp\">{time}</span> \
             <span class=\"sender\">{sender}: </span><pre class=\"message\">{body}</pre></div>"
        )
    }

    fn send(time: &str, sender: &str, body: &str) -> String {
        format!(
            "<div class=\"send\"><span class=\"timestamp\">{time}</span> \
             <span class=\"sender\">{sender}: </span><pre class=\"message\">{body}</pre></div>"
        )
    }

    #[test]
    fn classifies_known_records() {
        assert_eq!(classify("<div class=\"receive\">x"), RecordKind::Receive);
        assert_eq!(classify("<div class=\"send\">x"), RecordKind::Send);
        assert_eq!(classify("<div class=\"status\">x"), RecordKind::Status);
        assert_eq!(classify("<div class=\"banner\">x"), RecordKind::Unknown);
    }

    #[test]
    fn first_classification_wins() {
        let mixed = "<div class=\"receive\">quoting a class=\"status\" marker";
        assert_eq!(classify(mixed), RecordKind::Receive);
    }

    #[test]
    fn between_is_tolerant() {
        assert_eq!(between("a [x] b", "[", "]"), "x");
        assert_eq!(between("no markers here", "[", "]"), "");
        assert_eq!(between("open [ but never closed", "[", "]"), "");
    }

    #[test]
    fn strips_tags() {
        assert_eq!(strip_tags("<b>bold</b> text"), "bold text");
        assert_eq!(strip_tags("plain"), "plain");
    }

    #[test]
    fn parses_receive_and_send_records() {
        let input = format!(
            "{}{}",
            receive("11:18:20 AM", "bob", "hi"),
            send("11:18:25 AM", "me", "hello")
        );
        let conv = parse_html_log(&input, Path::new(FILE), &Config::default());

        assert_eq!(conv.messages().len(), 2);
        assert_eq!(conv.messages()[0].plain_text, "hi");
        assert_eq!(conv.messages()[0].sender_id, "bob");
        assert_eq!(conv.messages()[1].sender_id, "me");

        let bob = &conv.participants()[0];
        let me = &conv.participants()[1];
        assert_eq!((bob.user_id.as_str(), bob.role), ("bob", Role::Remote));
        assert_eq!((me.user_id.as_str(), me.role), ("me", Role::Local));
    }

    #[test]
    fn combines_filename_date_with_record_time() {
        let input = receive("1:02:03 PM", "bob", "hi");
        let conv = parse_html_log(&input, Path::new(FILE), &Config::default());

        let ts = conv.messages()[0].timestamp.unwrap();
        assert_eq!(ts.date_naive().to_string(), "2011-03-16");
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (13, 2, 3));
    }

    #[test]
    fn twenty_four_hour_time_is_second_attempt() {
        let input = receive("13:02:03", "bob", "hi");
        let conv = parse_html_log(&input, Path::new(FILE), &Config::default());
        assert_eq!(conv.messages()[0].timestamp.unwrap().hour(), 13);
    }

    #[test]
    fn status_record_takes_time_from_parenthesis() {
        let input = "<div class=\"status\">bob has gone away (11:20:00 AM)</div>".to_string();
        let conv = parse_html_log(&input, Path::new(FILE), &Config::default());

        let msg = &conv.messages()[0];
        assert_eq!(msg.kind, MessageKind::Event);
        assert_eq!(msg.sender_id, SYSTEM_SENDER);
        assert_eq!(msg.plain_text, "bob has gone away (11:20:00 AM)");
        assert_eq!(msg.timestamp.unwrap().hour(), 11);
    }

    #[test]
    fn unrecognized_records_are_skipped() {
        let input = format!(
            "<div class=\"banner\">advert</div>{}",
            receive("11:18:20 AM", "bob", "hi")
        );
        let conv = parse_html_log(&input, Path::new(FILE), &Config::default());
        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn missing_markers_yield_empty_fields_not_errors() {
        let input = "<div class=\"receive\">no spans at all</div>";
        let conv = parse_html_log(input, Path::new(FILE), &Config::default());

        assert_eq!(conv.messages().len(), 1);
        let msg = &conv.messages()[0];
        assert!(msg.sender_id.is_empty());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn empty_stream_yields_valid_empty_conversation() {
        let conv = parse_html_log("", Path::new(FILE), &Config::default());
        assert!(conv.messages().is_empty());
        assert_eq!(conv.participants().len(), 2);
    }

    #[test]
    fn start_date_comes_from_filename() {
        let conv = parse_html_log("", Path::new(FILE), &Config::default());
        assert_eq!(
            conv.start_date.unwrap().date_naive().to_string(),
            "2011-03-16"
        );
    }

    #[test]
    fn undated_filename_leaves_start_date_unset() {
        let input = receive("11:18:20 AM", "bob", "hi");
        let conv = parse_html_log(&input, Path::new("bob.AdiumHTMLLog"), &Config::default());

        // Without a filename date there is nothing to anchor times to.
        assert!(conv.messages()[0].timestamp.is_none());
        assert!(conv.start_date.is_none());
    }

    #[test]
    fn path_hierarchy_supplies_account_context() {
        let full = format!("Logs/AIM.myname/bob/{FILE}");
        let input = receive("11:18:20 AM", "bob", "hi");
        let conv = parse_html_log(&input, Path::new(&full), &Config::default());

        assert_eq!(conv.service, "AIM");
        assert_eq!(conv.local_account_id, "myname");
        assert_eq!(conv.remote_account_id, "bob");
    }

    #[test]
    fn flat_path_leaves_context_blank() {
        let conv = parse_html_log("", Path::new(FILE), &Config::default());
        assert!(conv.service.is_empty());
        assert!(conv.local_account_id.is_empty());
    }

    #[test]
    fn parse_is_deterministic() {
        let input = format!(
            "{}{}",
            receive("11:18:20 AM", "bob", "hi"),
            send("11:18:25 AM", "me", "hello")
        );
        let a = parse_html_log(&input, Path::new(FILE), &Config::default());
        let b = parse_html_log(&input, Path::new(FILE), &Config::default());
        assert_eq!(a, b);
    }
}
