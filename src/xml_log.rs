// SPDX-License-Identifier: GPL-3.0-only

//! Parser for the newer structured log format (`.chatlog` XML).
//!
//! These logs are well-formed XML with a `<chat>` root carrying `service`
//! and `account` attributes and a flat sequence of `<message>`, `<event>`
//! and `<status>` children. The document is parsed into a read-only DOM;
//! there is no schema validation. A root element that is not literally
//! `chat` is the one fatal condition — everything below the root degrades
//! per element: malformed timestamps become `None`, unknown event types
//! produce empty text, unknown elements are skipped with a diagnostic.

use crate::config::Config;
use crate::conversation::{Conversation, Message, MessageKind, Role, SYSTEM_SENDER};
use crate::dates;
use roxmltree::{Document, Node};
use snafu::prelude::*;
use std::fmt::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Error type for structural XML parse failures.
#[derive(Debug, Snafu)]
pub enum ParseError {
    /// The document is not well-formed XML.
    #[snafu(display("malformed XML: {source}"))]
    Syntax {
        /// The underlying XML parse error.
        source: roxmltree::Error,
    },

    /// The root element is not `<chat>`.
    #[snafu(display("root element is <{found}>, expected <chat>"))]
    MalformedRoot {
        /// Local name of the root element actually found.
        found: String,
    },
}

/// Parses a structured XML log into a [`Conversation`].
///
/// `path` supplies the file name for date derivation and the directory
/// shape for account context; the file itself is not read.
///
/// # Errors
///
/// [`ParseError::Syntax`] when the document is not well-formed,
/// [`ParseError::MalformedRoot`] when the root element is not `<chat>`.
/// Per-element problems are absorbed with best-effort fallback.
pub fn parse_xml_log(input: &str, path: &Path, config: &Config) -> Result<Conversation, ParseError> {
    let doc = Document::parse(input).context(SyntaxSnafu)?;
    let root = doc.root_element();
    ensure!(
        root.tag_name().name() == "chat",
        MalformedRootSnafu {
            found: root.tag_name().name().to_string(),
        }
    );

    let file_name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mut conv = Conversation::new(file_name);
    conv.im_client = "Adium".to_string();
    conv.service = root.attribute("service").unwrap_or_default().to_string();
    conv.local_account_id = root
        .attribute("account")
        .unwrap_or_default()
        .to_lowercase();
    // Directory-derived context wins over the XML attributes: the directory
    // reflects the account that actually fetched the log, while the
    // `account` attribute may name only one party.
    conv.derive_account_context(path);

    for child in root.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "message" => parse_message_element(&mut conv, child),
            "event" | "status" => parse_event_element(&mut conv, child),
            other => warn!(element = other, "skipping unknown element"),
        }
    }

    // Fallback must skip undated messages so one malformed time attribute
    // cannot mask the dated evidence around it.
    conv.start_date = dates::filename_timestamp(&conv.origin_file_name, config.timezone)
        .or_else(|| conv.earliest_timestamp());
    conv.ensure_two_participants();
    Ok(conv)
}

fn parse_message_element(conv: &mut Conversation, element: Node<'_, '_>) {
    let sender_id = element.attribute("sender").unwrap_or_default().to_lowercase();
    if sender_id.is_empty() {
        debug!("message element without a sender attribute");
    } else {
        conv.add_participant(&sender_id);
        if let Some(alias) = element.attribute("alias") {
            conv.resolve_real_name(&sender_id, alias);
        }
        let role = if sender_id.eq_ignore_ascii_case(&conv.local_account_id) {
            Role::Local
        } else {
            Role::Remote
        };
        conv.set_role(&sender_id, role);
    }

    let mut msg = Message::new(MessageKind::Chat, sender_id);
    msg.timestamp = element.attribute("time").and_then(dates::parse_attr_timestamp);
    msg.plain_text = inner_text(element);
    msg.html_body = element
        .children()
        .find(Node::is_element)
        .map(|body| serialize_element(unwrap_redundant_container(body)));
    conv.add_message(msg);
}

fn parse_event_element(conv: &mut Conversation, element: Node<'_, '_>) {
    let kind = element.attribute("type").unwrap_or_default();
    let sender = element.attribute("sender").unwrap_or_default();
    let who = if sender.is_empty() { "Contact" } else { sender };

    // Small fixed vocabulary; anything else yields a message with empty
    // text rather than an error, so future event types cannot crash old
    // tooling.
    let text = match kind {
        "windowOpened" => format!("{who} opened the chat window"),
        "windowClosed" => format!("{who} closed the chat window"),
        "online" => format!("{who} went online"),
        "offline" => format!("{who} went offline"),
        "idle" => format!("{who} became idle"),
        "available" => format!("{who} became available"),
        other => {
            debug!(event_type = other, "no text for unrecognized event type");
            String::new()
        }
    };

    let mut msg = Message::new(MessageKind::Event, SYSTEM_SENDER);
    msg.timestamp = element.attribute("time").and_then(dates::parse_attr_timestamp);
    msg.plain_text = text;
    conv.add_message(msg);
}

/// Concatenates all descendant text nodes in document order.
///
/// Uses an explicit worklist rather than recursion so deeply nested markup
/// cannot exhaust the stack.
fn inner_text(element: Node<'_, '_>) -> String {
    let mut out = String::new();
    let mut stack: Vec<Node<'_, '_>> = element.children().collect();
    stack.reverse();
    while let Some(node) = stack.pop() {
        if node.is_text() {
            out.push_str(node.text().unwrap_or_default());
        } else {
            let top = stack.len();
            stack.extend(node.children());
            stack[top..].reverse();
        }
    }
    out
}

/// Strips exactly one redundant wrapping container: an element whose only
/// meaningful content is a single child element.
fn unwrap_redundant_container<'a, 'input>(element: Node<'a, 'input>) -> Node<'a, 'input> {
    let element_children: Vec<Node<'_, '_>> = element.children().filter(Node::is_element).collect();
    let own_text_is_blank = element
        .children()
        .filter(Node::is_text)
        .all(|t| t.text().unwrap_or_default().trim().is_empty());
    if element_children.len() == 1 && own_text_is_blank {
        element_children[0]
    } else {
        element
    }
}

/// Serializes an element subtree back to markup using local names, via the
/// same worklist discipline as [`inner_text`].
fn serialize_element(element: Node<'_, '_>) -> String {
    enum Task<'a, 'input> {
        Open(Node<'a, 'input>),
        Close(&'a str),
    }

    let mut out = String::new();
    let mut stack = vec![Task::Open(element)];
    while let Some(task) = stack.pop() {
        match task {
            Task::Open(node) => {
                if node.is_text() {
                    out.push_str(&escape_text(node.text().unwrap_or_default()));
                    continue;
                }
                if !node.is_element() {
                    continue;
                }
                let name = node.tag_name().name();
                out.push('<');
                out.push_str(name);
                for attr in node.attributes() {
                    let _ = write!(out, " {}=\"{}\"", attr.name(), escape_attr(attr.value()));
                }
                if node.children().next().is_none() {
                    out.push_str("/>");
                    continue;
                }
                out.push('>');
                stack.push(Task::Close(name));
                let top = stack.len();
                stack.extend(node.children().map(Task::Open));
                stack[top..].reverse();
            }
            Task::Close(name) => {
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
    out
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const FILE: &str = "bob (2011-03-16T11.18.15-0400).chatlog";

    fn parse(input: &str) -> Conversation {
        parse_xml_log(input, Path::new(FILE), &Config::default()).unwrap()
    }

    #[test]
    fn rejects_non_chat_root() {
        let err = parse_xml_log("<log/>", Path::new(FILE), &Config::default()).unwrap_err();
        assert!(matches!(err, ParseError::MalformedRoot { found } if found == "log"));
    }

    #[test]
    fn rejects_unparseable_document() {
        let err = parse_xml_log("<chat", Path::new(FILE), &Config::default()).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn reads_root_attributes() {
        let conv = parse(r#"<chat service="AIM" account="Me"/>"#);
        assert_eq!(conv.service, "AIM");
        assert_eq!(conv.local_account_id, "me");
    }

    #[test]
    fn accepts_namespaced_root() {
        let conv = parse(
            r#"<chat xmlns="http://purl.org/net/ulf/ns/0.4-02" service="AIM" account="me"/>"#,
        );
        assert_eq!(conv.service, "AIM");
    }

    #[test]
    fn directory_context_wins_over_account_attribute() {
        let full = format!("Logs/AIM.myname/bob/{FILE}");
        let conv = parse_xml_log(
            r#"<chat service="Jabber" account="someoneelse"/>"#,
            Path::new(&full),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(conv.service, "AIM");
        assert_eq!(conv.local_account_id, "myname");
        assert_eq!(conv.remote_account_id, "bob");
    }

    #[test]
    fn parses_message_text_and_sender() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" time="2021-01-01T10:00:00-05:00"><div><span>hi</span></div></message>
               </chat>"#,
        );

        let msg = &conv.messages()[0];
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.sender_id, "bob");
        assert_eq!(msg.plain_text, "hi");
        assert_eq!(msg.timestamp.unwrap().hour(), 10);
    }

    #[test]
    fn sender_roles_follow_local_account() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="me" time="2021-01-01T10:00:00-05:00">one</message>
                 <message sender="bob" time="2021-01-01T10:00:05-05:00">two</message>
               </chat>"#,
        );

        assert_eq!(conv.participants()[0].role, Role::Local);
        assert_eq!(conv.participants()[1].role, Role::Remote);
    }

    #[test]
    fn redundant_wrapper_is_stripped_once() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob"><div><span style="color: #000000;">hi</span></div></message>
               </chat>"#,
        );

        assert_eq!(
            conv.messages()[0].html_body.as_deref(),
            Some(r#"<span style="color: #000000;">hi</span>"#)
        );
    }

    #[test]
    fn wrapper_with_siblings_is_kept() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob"><div><span>hi</span><span>there</span></div></message>
               </chat>"#,
        );

        assert_eq!(
            conv.messages()[0].html_body.as_deref(),
            Some("<div><span>hi</span><span>there</span></div>")
        );
    }

    #[test]
    fn alias_becomes_display_name() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" alias="Robert Tables">hi</message>
               </chat>"#,
        );

        assert_eq!(conv.participants()[0].real_name.as_deref(), Some("Robert Tables"));
    }

    #[test]
    fn known_event_types_synthesize_text() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <event type="online" sender="bob" time="2021-01-01T10:00:00-05:00"/>
                 <status type="windowClosed" sender="me" time="2021-01-01T10:05:00-05:00"/>
               </chat>"#,
        );

        assert_eq!(conv.messages()[0].plain_text, "bob went online");
        assert_eq!(conv.messages()[0].kind, MessageKind::Event);
        assert_eq!(conv.messages()[0].sender_id, SYSTEM_SENDER);
        assert_eq!(conv.messages()[1].plain_text, "me closed the chat window");
    }

    #[test]
    fn unknown_event_type_yields_empty_text() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <event type="fileTransferStarted" sender="bob"/>
               </chat>"#,
        );

        assert_eq!(conv.messages().len(), 1);
        assert_eq!(conv.messages()[0].plain_text, "");
    }

    #[test]
    fn unknown_elements_are_skipped() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <topic>old business</topic>
                 <message sender="bob">hi</message>
               </chat>"#,
        );

        assert_eq!(conv.messages().len(), 1);
    }

    #[test]
    fn malformed_time_attribute_is_tolerated() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" time="whenever">hi</message>
               </chat>"#,
        );

        assert!(conv.messages()[0].timestamp.is_none());
    }

    #[test]
    fn start_date_prefers_filename_over_messages() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" time="2021-01-01T10:00:00-05:00">hi</message>
               </chat>"#,
        );

        assert_eq!(
            conv.start_date.unwrap().date_naive().to_string(),
            "2011-03-16"
        );
    }

    #[test]
    fn one_malformed_time_does_not_mask_dated_messages() {
        let conv = parse_xml_log(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" time="garbage">hi</message>
                 <message sender="bob" time="2021-01-01T10:00:00-05:00">again</message>
               </chat>"#,
            Path::new("bob.chatlog"),
            &Config::default(),
        )
        .unwrap();

        assert!(conv.messages()[0].timestamp.is_none());
        assert_eq!(
            conv.start_date.unwrap().to_rfc3339(),
            "2021-01-01T10:00:00-05:00"
        );
    }

    #[test]
    fn start_date_falls_back_to_oldest_message() {
        let conv = parse_xml_log(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" time="2021-01-01T10:00:05-05:00">later</message>
                 <message sender="bob" time="2021-01-01T10:00:00-05:00">earlier</message>
               </chat>"#,
            Path::new("bob.chatlog"),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(
            conv.start_date.unwrap().to_rfc3339(),
            "2021-01-01T10:00:00-05:00"
        );
    }

    #[test]
    fn participants_padded_to_two() {
        let conv = parse(
            r#"<chat service="AIM" account="me">
                 <message sender="bob" time="2021-01-01T10:00:00-05:00">hi</message>
               </chat>"#,
        );

        assert_eq!(conv.participants().len(), 2);
        assert_eq!(conv.participants()[1].user_id, "UNKNOWN");
    }

    #[test]
    fn parse_is_deterministic() {
        let input = r#"<chat service="AIM" account="me">
            <message sender="bob" time="2021-01-01T10:00:00-05:00">hi</message>
        </chat>"#;
        let a = parse(input);
        let b = parse(input);
        assert_eq!(a, b);
    }
}
