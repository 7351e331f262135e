// SPDX-License-Identifier: GPL-3.0-only

//! EML rendering for parsed conversations.
//!
//! This module projects a populated [`Conversation`] into a multi-part,
//! dual-representation (plain text and HTML) email message with
//! deterministic, content-derived identifiers. The source logs carry no
//! real email addresses, so From/To are RFC-shaped strings built on a
//! synthetic non-routable domain such as `aim.adium.invalid`.
//!
//! Rendering the same conversation twice yields byte-identical output:
//! Message-ID hashes the Date header, Subject and full plain transcript,
//! References hashes the normalized participant list, and the MIME
//! boundaries are derived from the Message-ID digest rather than drawn
//! from a random source.
//!
//! # Example
//!
//! ```
//! use chat2eml::config::Config;
//! use chat2eml::html_log::parse_html_log;
//! use chat2eml::renderer::{render_eml, RenderOptions};
//! use std::path::Path;
//!
//! let log = concat!(
//!     "<div class=\"receive\"><span class=\"timestamp\">11:18:20 AM</span> ",
//!     "<span class=\"sender\">bob: </span><pre class=\"message\">hi</pre></div>",
//! );
//! let conv = parse_html_log(
//!     log,
//!     Path::new("bob (2011-03-16T11.18.15-0400).AdiumHTMLLog"),
//!     &Config::default(),
//! );
//!
//! let eml = render_eml(&conv, &RenderOptions::default(), &Config::default()).unwrap();
//! assert!(eml.header("Message-ID").is_some());
//! ```

use crate::config::Config;
use crate::conversation::{
    Conversation, ConversationError, Message, MessageKind, Participant, Role,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, FixedOffset};
use md5::{Digest, Md5};
use regex::Regex;
use snafu::prelude::*;
use std::fmt::Write;
use std::sync::LazyLock;

/// Stylesheet embedded in the HTML part of every rendered message.
const CSS: &str = "\
body { font-family: sans-serif; }
p.message { margin: 0.2em 0; }
p.message.local span.screenname { color: #16569e; font-weight: bold; }
p.message.remote span.screenname { color: #a82f2f; font-weight: bold; }
p.system_message { color: #777777; font-style: italic; }
span.timestamp { color: #999999; font-size: smaller; }
span.attachment { font-size: smaller; }";

static BACKGROUND_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"background-color:\s*[^;"']*;?\s*"#).expect("static regex"));

/// Errors that can occur while rendering a conversation.
#[derive(Debug, Snafu)]
pub enum RenderError {
    /// No start date and no messages to take a Date header from.
    #[snafu(display("cannot derive a Date header: conversation has no messages"))]
    NoMessages {
        /// The underlying empty-conversation error.
        source: ConversationError,
    },

    /// Messages exist but none of them carries a timestamp.
    #[snafu(display("cannot derive a Date header: conversation carries no dated evidence"))]
    Undated,
}

/// Configuration options for EML rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Strip `background-color` rules from pass-through message markup.
    ///
    /// Some clients logged per-message background colors that render
    /// poorly in mail readers; this drops them while keeping the rest of
    /// the inline styling.
    pub no_background: bool,
}

/// One attachment hoisted to a top-level MIME part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentPart {
    /// File name used in the Content-Disposition header.
    pub file_name: String,
    /// MIME type of the payload.
    pub mime_type: String,
    /// Content-derived identifier; matches the `cid:` anchor in the HTML body.
    pub content_id: String,
    /// Raw payload, base64-encoded at serialization time.
    pub payload: Vec<u8>,
}

/// A complete multi-part message, ready for literal serialization.
///
/// Headers are kept in insertion order. The core emits From, To, Date,
/// Subject, References, Message-ID and MIME-Version; callers may append
/// further process-identifying headers before writing the bytes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmlMessage {
    headers: Vec<(String, String)>,
    text_body: String,
    html_body: String,
    attachments: Vec<AttachmentPart>,
    boundary_seed: String,
}

impl EmlMessage {
    /// Headers in emission order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First value of the named header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Appends a header after the core-owned set.
    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// The plain-text alternative body.
    #[must_use]
    pub fn text_body(&self) -> &str {
        &self.text_body
    }

    /// The HTML alternative body.
    #[must_use]
    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    /// Attachment parts, siblings of the alternative pair.
    #[must_use]
    pub fn attachments(&self) -> &[AttachmentPart] {
        &self.attachments
    }

    /// Serializes the message to its on-disk `.eml` form: a
    /// multipart/related envelope holding a text/plain + text/html
    /// alternative pair and zero or more base64 attachment parts.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let related = format!("----=_rel_{}", self.boundary_seed);
        let alternative = format!("----=_alt_{}", self.boundary_seed);

        let mut out = String::new();
        for (name, value) in &self.headers {
            let _ = write!(out, "{name}: {value}\r\n");
        }
        let _ = write!(
            out,
            "Content-Type: multipart/related; boundary=\"{related}\"\r\n\r\n"
        );

        let _ = write!(out, "--{related}\r\n");
        let _ = write!(
            out,
            "Content-Type: multipart/alternative; boundary=\"{alternative}\"\r\n\r\n"
        );
        let _ = write!(
            out,
            "--{alternative}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}\r\n",
            self.text_body
        );
        let _ = write!(
            out,
            "--{alternative}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Transfer-Encoding: 8bit\r\n\r\n{}\r\n",
            self.html_body
        );
        let _ = write!(out, "--{alternative}--\r\n");

        for att in &self.attachments {
            let _ = write!(out, "--{related}\r\n");
            let _ = write!(out, "Content-Type: {}\r\n", att.mime_type);
            let _ = write!(out, "Content-Transfer-Encoding: base64\r\n");
            let _ = write!(
                out,
                "Content-Disposition: attachment; filename=\"{}\"\r\n",
                att.file_name
            );
            let _ = write!(out, "Content-ID: <{}>\r\n\r\n", att.content_id);
            let encoded = BASE64.encode(&att.payload);
            // RFC 2045 line-length limit.
            for chunk in encoded.as_bytes().chunks(76) {
                out.push_str(std::str::from_utf8(chunk).expect("base64 is ASCII"));
                out.push_str("\r\n");
            }
        }
        let _ = write!(out, "--{related}--\r\n");

        out.into_bytes()
    }
}

/// Renders a conversation into a complete [`EmlMessage`].
///
/// The conversation is read-only here and must already satisfy the
/// two-participant invariant; callers are expected to have obtained it
/// from one of the parsers, which guarantee the padding.
///
/// # Errors
///
/// [`RenderError::NoMessages`] or [`RenderError::Undated`] when neither a
/// start date nor any message timestamp is available for the Date header.
pub fn render_eml(
    conv: &Conversation,
    opts: &RenderOptions,
    config: &Config,
) -> Result<EmlMessage, RenderError> {
    let domain = synthetic_domain(conv, config);

    let date = match conv.start_date {
        Some(date) => date,
        None => {
            conv.oldest_message().context(NoMessagesSnafu)?;
            // Any dated message will do for the header; undated ones must
            // not mask it.
            conv.earliest_timestamp().context(UndatedSnafu)?
        }
    };
    let date_header = date.format("%a, %d %b %Y %H:%M:%S %z").to_string();

    let from = address(&conv.participants()[0], &domain);
    let to = address(&conv.participants()[1], &domain);
    let subject = subject_line(conv, &date);

    let text_body = render_text(conv);
    let (html_body, attachments) = render_html(conv, opts);

    let references = format!("<{}@{domain}>", references_hash(conv));
    let message_id = format!(
        "<{}@{domain}>",
        digest_hex(&[
            date_header.as_bytes(),
            subject.as_bytes(),
            text_body.as_bytes()
        ])
    );
    // Boundaries reuse the Message-ID digest so a fixed conversation
    // serializes identically run to run.
    let boundary_seed = digest_hex(&[message_id.as_bytes()])[..16].to_string();

    let headers = vec![
        ("From".to_string(), from),
        ("To".to_string(), to),
        ("Date".to_string(), date_header),
        ("Subject".to_string(), subject),
        ("References".to_string(), references),
        ("Message-ID".to_string(), message_id),
        ("MIME-Version".to_string(), "1.0".to_string()),
    ];

    Ok(EmlMessage {
        headers,
        text_body,
        html_body,
        attachments,
        boundary_seed,
    })
}

/// Builds the synthetic, non-routable domain for address-shaped strings,
/// e.g. `aim.adium.invalid`. Falls back to the configured literal domain
/// when the conversation names neither a service nor a client.
fn synthetic_domain(conv: &Conversation, config: &Config) -> String {
    let mut parts = Vec::new();
    if !conv.service.is_empty() {
        parts.push(conv.service.to_lowercase());
    }
    if !conv.im_client.is_empty() {
        parts.push(conv.im_client.to_lowercase());
    }
    if parts.is_empty() {
        return config.fallback_domain.clone();
    }
    parts.push("invalid".to_string());
    parts.join(".")
}

/// `"Display Name" <userid@domain>`, with a literal `@` inside the user id
/// substituted so an email-shaped id cannot produce a double-`@` address.
fn address(participant: &Participant, domain: &str) -> String {
    let local_part = participant.user_id.replace('@', "[at]");
    format!("\"{}\" <{local_part}@{domain}>", participant.display_name())
}

fn subject_line(conv: &Conversation, date: &DateTime<FixedOffset>) -> String {
    let counterpart = conv
        .participants()
        .iter()
        .find(|p| p.role == Role::Remote)
        .unwrap_or(&conv.participants()[0])
        .display_name();
    let day = date.format("%Y-%m-%d");
    if conv.service.is_empty() {
        format!("Chat with {counterpart} on {day}")
    } else {
        format!("{} chat with {counterpart} on {day}", conv.service)
    }
}

/// One line of plain text per message, in stored order.
fn render_text(conv: &Conversation) -> String {
    let mut lines = Vec::with_capacity(conv.messages().len());
    for msg in conv.messages() {
        let mut parts = Vec::new();
        if let Some(ts) = msg.timestamp {
            parts.push(format!("({})", ts.format("%I:%M:%S %p")));
        }
        // System lines skip the sender prefix.
        if msg.kind == MessageKind::Chat && !msg.sender_id.is_empty() {
            parts.push(format!("{}:", msg.sender_id));
        }
        if !msg.plain_text.is_empty() {
            parts.push(msg.plain_text.clone());
        }
        lines.push(parts.join(" "));
    }
    lines.join("\n")
}

/// One paragraph of HTML per message, plus the hoisted attachment parts.
fn render_html(conv: &Conversation, opts: &RenderOptions) -> (String, Vec<AttachmentPart>) {
    let mut out = String::new();
    let mut attachments = Vec::new();

    out.push_str("<!DOCTYPE HTML PUBLIC \"-//W3C//DTD HTML 4.01 Transitional//EN\">\n");
    out.push_str("<html>\n<head>\n<style>\n");
    out.push_str(CSS);
    out.push_str("\n</style>\n</head>\n<body>\n");

    for msg in conv.messages() {
        match msg.kind {
            MessageKind::Event => render_event_html(&mut out, msg),
            MessageKind::Chat => render_chat_html(&mut out, msg, conv, opts, &mut attachments),
        }
        out.push('\n');
    }

    out.push_str("</body>\n</html>\n");
    (out, attachments)
}

fn render_event_html(out: &mut String, msg: &Message) {
    out.push_str("<p class=\"system_message\">");
    if let Some(ts) = msg.timestamp {
        let _ = write!(
            out,
            "<span class=\"timestamp\">({})&nbsp;</span>",
            ts.format("%I:%M:%S %p")
        );
    }
    out.push_str("<span class=\"message_text\">");
    if let Some(html) = &msg.html_body {
        out.push_str(html);
    } else {
        out.push_str(&escape_html(&msg.plain_text).replace('\n', "<br>"));
    }
    out.push_str("</span></p>");
}

fn render_chat_html(
    out: &mut String,
    msg: &Message,
    conv: &Conversation,
    opts: &RenderOptions,
    attachments: &mut Vec<AttachmentPart>,
) {
    // Local and remote senders get distinct classes so the stylesheet can
    // tell the two sides apart.
    let side = match sender_role(conv, &msg.sender_id) {
        Role::Local => " local",
        Role::Remote => " remote",
        Role::Unknown => "",
    };
    let _ = write!(out, "<p class=\"message{side}\">");
    if let Some(ts) = msg.timestamp {
        let _ = write!(
            out,
            "<span class=\"timestamp\">({})&nbsp;</span>",
            ts.format("%I:%M:%S %p")
        );
    }
    if !msg.sender_id.is_empty() {
        let _ = write!(
            out,
            "<span class=\"screenname\">{}:&ensp;</span>",
            escape_html(&msg.sender_id)
        );
    }

    if let Some(html) = &msg.html_body {
        // Recorded markup passes through verbatim, except for the optional
        // background strip.
        let html = if opts.no_background {
            BACKGROUND_RULE.replace_all(html, "").into_owned()
        } else {
            html.clone()
        };
        let _ = write!(out, "<span class=\"message_text\">{html}</span>");
    } else if !msg.plain_text.is_empty() {
        out.push_str("<span");
        if let Some(style) = msg.style.as_ref().filter(|s| !s.is_empty()) {
            out.push_str(" style=\"");
            if let Some(font) = &style.font_family {
                let _ = write!(out, "font-family: {font}; ");
            }
            if let Some(size) = style.font_size {
                let _ = write!(out, "font-size: {size}pt; ");
            }
            if let Some(color) = &style.foreground {
                let _ = write!(out, "color: {color}; ");
            }
            if let Some(color) = &style.background
                && !opts.no_background
            {
                let _ = write!(out, "background-color: {color}; ");
            }
            out.push('"');
        }
        let _ = write!(
            out,
            " class=\"message_text\">{}</span>",
            escape_html(&msg.plain_text).replace('\n', "<br>")
        );
    }

    for att in &msg.attachments {
        let _ = write!(
            out,
            "<br><span class=\"attachment\">Attachment:&nbsp;<a href=\"cid:{}\">{}</a></span>",
            att.content_id(),
            escape_html(&att.file_name)
        );
        attachments.push(AttachmentPart {
            file_name: att.file_name.clone(),
            mime_type: att.mime_type.clone(),
            content_id: att.content_id().to_string(),
            payload: att.payload().to_vec(),
        });
    }

    out.push_str("</p>");
}

fn sender_role(conv: &Conversation, sender_id: &str) -> Role {
    conv.participants()
        .iter()
        .find(|p| p.user_id.eq_ignore_ascii_case(sender_id))
        .map_or(Role::Unknown, |p| p.role)
}

/// MD5 of the case- and order-normalized participant id list, so repeated
/// exports of the same conversation thread together under one References
/// value.
fn references_hash(conv: &Conversation) -> String {
    let mut ids: Vec<String> = conv
        .participant_user_ids()
        .iter()
        .map(|id| id.to_lowercase())
        .collect();
    ids.sort();
    digest_hex(&[ids.join(" ").as_bytes()])
}

fn digest_hex(inputs: &[&[u8]]) -> String {
    let mut hasher = Md5::new();
    for input in inputs {
        hasher.update(input);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
