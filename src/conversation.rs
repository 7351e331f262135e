// SPDX-License-Identifier: GPL-3.0-only

//! Canonical, format-agnostic representation of one chat session.
//!
//! Both log parsers produce a [`Conversation`]; the EML renderer consumes
//! one. The types here are plain data containers plus a handful of
//! integrity-preserving mutators — no I/O and no formatting.
//!
//! # Example
//!
//! ```
//! use chat2eml::conversation::{Conversation, Message, MessageKind, Role};
//!
//! let mut conv = Conversation::new("bob (2011-03-16T11.18.15-0400).AdiumHTMLLog");
//! conv.add_participant("Bob");
//! conv.set_role("bob", Role::Remote);
//! conv.add_message(Message::new(MessageKind::Chat, "bob"));
//! conv.ensure_two_participants();
//!
//! assert_eq!(conv.participants().len(), 2);
//! assert_eq!(conv.participants()[1].user_id, "UNKNOWN");
//! ```

use chrono::{DateTime, FixedOffset};
use md5::{Digest, Md5};
use snafu::prelude::*;
use tracing::warn;

/// Placeholder user id appended when a log names fewer than two parties.
pub const UNKNOWN_PARTICIPANT: &str = "UNKNOWN";

/// Sender id used for system events that have no authoring participant.
pub const SYSTEM_SENDER: &str = "System";

/// Error type for conversation queries.
#[derive(Debug, Snafu)]
pub enum ConversationError {
    /// A timestamp-extremal query was made against a conversation with no
    /// messages. Callers that tolerate empty logs must check the message
    /// count first.
    #[snafu(display("conversation contains no messages"))]
    Empty,
}

/// Which end of the conversation a participant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Not yet determined.
    #[default]
    Unknown,
    /// The log owner's own account.
    Local,
    /// The other party.
    Remote,
}

/// One conversation endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Primary key, lowercase-normalized.
    pub user_id: String,
    /// Human-readable alias, when the log records one.
    pub real_name: Option<String>,
    /// Secondary identifier from the source system, when present.
    pub external_system_id: Option<String>,
    /// Local/remote assignment, set at most once.
    pub role: Role,
}

impl Participant {
    fn new(user_id: String) -> Self {
        Self {
            user_id,
            real_name: None,
            external_system_id: None,
            role: Role::Unknown,
        }
    }

    /// Display name if known, otherwise the user id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.real_name.as_deref().unwrap_or(&self.user_id)
    }
}

/// Whether a message is a user-authored line or a system notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A user-authored message.
    Chat,
    /// A system notice (join/leave/status change).
    Event,
}

/// Legacy formatting metadata carried by some log lines.
///
/// Only consulted when rendering HTML; has no other bearing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyleHints {
    /// CSS font family.
    pub font_family: Option<String>,
    /// Font size in points.
    pub font_size: Option<u32>,
    /// Foreground color, any CSS color syntax.
    pub foreground: Option<String>,
    /// Background color, any CSS color syntax.
    pub background: Option<String>,
}

impl StyleHints {
    /// True if no hint is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.font_family.is_none()
            && self.font_size.is_none()
            && self.foreground.is_none()
            && self.background.is_none()
    }
}

/// Binary payload referenced by a message.
///
/// The content id is an MD5 digest of the payload, recomputed whenever the
/// payload changes, so identical bytes always carry the same MIME
/// `Content-ID` and downstream tooling can suppress duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name as recorded in the log.
    pub file_name: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    payload: Vec<u8>,
    content_id: String,
}

impl Attachment {
    /// Creates an attachment and derives its content id from the payload.
    #[must_use]
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, payload: Vec<u8>) -> Self {
        let content_id = digest_hex(&payload);
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            payload,
            content_id,
        }
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Replaces the payload and recomputes the content id.
    pub fn set_payload(&mut self, payload: Vec<u8>) {
        self.content_id = digest_hex(&payload);
        self.payload = payload;
    }

    /// Content-derived identifier, stable for identical payloads.
    #[must_use]
    pub fn content_id(&self) -> &str {
        &self.content_id
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    let digest = Md5::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        write!(out, "{b:02x}").unwrap();
    }
    out
}

/// One discrete conversational event.
#[derive(Debug, Clone)]
pub struct Message {
    /// Chat line or system event.
    pub kind: MessageKind,
    /// Participant user id, or [`SYSTEM_SENDER`] for events.
    pub sender_id: String,
    /// Present for chat messages; best-effort for malformed status lines.
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Fallback/plain rendering.
    pub plain_text: String,
    /// Markup rendering; preferred over `plain_text` at render time.
    pub html_body: Option<String>,
    /// Legacy formatting metadata.
    pub style: Option<StyleHints>,
    /// Usually zero or one entries.
    pub attachments: Vec<Attachment>,
    /// Stable unique identifier, when the source format provides one.
    pub guid: Option<String>,
}

impl Message {
    /// Creates an empty message of the given kind.
    #[must_use]
    pub fn new(kind: MessageKind, sender_id: impl Into<String>) -> Self {
        Self {
            kind,
            sender_id: sender_id.into(),
            timestamp: None,
            plain_text: String::new(),
            html_body: None,
            style: None,
            attachments: Vec::new(),
            guid: None,
        }
    }
}

impl PartialEq for Message {
    /// Identifiers present on both sides compare by identifier only;
    /// otherwise duplicate detection falls back to full-field equality.
    fn eq(&self, other: &Self) -> bool {
        if let (Some(a), Some(b)) = (&self.guid, &other.guid) {
            return a == b;
        }
        self.kind == other.kind
            && self.sender_id == other.sender_id
            && self.timestamp == other.timestamp
            && self.plain_text == other.plain_text
            && self.html_body == other.html_body
            && self.style == other.style
            && self.attachments == other.attachments
    }
}

impl Eq for Message {}

/// One logical chat session.
///
/// Created empty by a parser, mutated only during parsing, then treated as
/// immutable by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    /// Source file name; used for subject-line and fallback date derivation.
    pub origin_file_name: String,
    /// Software that produced the log (e.g. "Adium"); empty if unknown.
    pub im_client: String,
    /// Messaging service/protocol (e.g. "AIM"); empty if unknown.
    pub service: String,
    /// The log owner's account id; empty if undeterminable.
    pub local_account_id: String,
    /// The other party's account id; empty if undeterminable.
    pub remote_account_id: String,
    /// Authoritative conversation start, when derivable.
    pub start_date: Option<DateTime<FixedOffset>>,
    participants: Vec<Participant>,
    messages: Vec<Message>,
}

impl Conversation {
    /// Creates an empty conversation for the named source file.
    #[must_use]
    pub fn new(origin_file_name: impl Into<String>) -> Self {
        Self {
            origin_file_name: origin_file_name.into(),
            im_client: String::new(),
            service: String::new(),
            local_account_id: String::new(),
            remote_account_id: String::new(),
            start_date: None,
            participants: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Participants in order of first appearance, unique by user id
    /// (except for the padding described on
    /// [`Self::ensure_two_participants`]).
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Messages in insertion order, which is parse order (not guaranteed
    /// date-sorted).
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Registers a participant, normalizing case; a no-op when the id is
    /// already present.
    ///
    /// If the id matches the known local or remote account, that role is
    /// assigned.
    pub fn add_participant(&mut self, user_id: &str) {
        let normalized = user_id.to_lowercase();
        if normalized.is_empty()
            || self
                .participants
                .iter()
                .any(|p| p.user_id.eq_ignore_ascii_case(&normalized))
        {
            return;
        }
        let mut participant = Participant::new(normalized.clone());
        if !self.local_account_id.is_empty()
            && normalized.eq_ignore_ascii_case(&self.local_account_id)
        {
            participant.role = Role::Local;
        } else if !self.remote_account_id.is_empty()
            && normalized.eq_ignore_ascii_case(&self.remote_account_id)
        {
            participant.role = Role::Remote;
        }
        self.participants.push(participant);
    }

    /// Appends a message. No validation beyond the kind it already carries.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The message with the earliest timestamp.
    ///
    /// Messages without timestamps order before all dated ones; ties go to
    /// the first inserted.
    ///
    /// # Errors
    ///
    /// [`ConversationError::Empty`] when the conversation has no messages.
    pub fn oldest_message(&self) -> Result<&Message, ConversationError> {
        let mut iter = self.messages.iter();
        let mut best = iter.next().context(EmptySnafu)?;
        for msg in iter {
            if msg.timestamp < best.timestamp {
                best = msg;
            }
        }
        Ok(best)
    }

    /// The message with the latest timestamp; ties go to the first inserted.
    ///
    /// # Errors
    ///
    /// [`ConversationError::Empty`] when the conversation has no messages.
    pub fn youngest_message(&self) -> Result<&Message, ConversationError> {
        let mut iter = self.messages.iter();
        let mut best = iter.next().context(EmptySnafu)?;
        for msg in iter {
            if msg.timestamp > best.timestamp {
                best = msg;
            }
        }
        Ok(best)
    }

    /// The earliest timestamp carried by any message, skipping undated
    /// ones.
    ///
    /// This is the date-evidence query: unlike [`Self::oldest_message`],
    /// a message whose timestamp failed to parse does not mask the dated
    /// messages around it. `None` only when no message is dated at all.
    #[must_use]
    pub fn earliest_timestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.messages.iter().filter_map(|m| m.timestamp).min()
    }

    /// Records a human-readable alias for a participant.
    ///
    /// Unknown ids are a logged no-op, preserving the historical
    /// tolerate-silent-miss behavior.
    pub fn resolve_real_name(&mut self, user_id: &str, name: &str) {
        match self.participant_mut(user_id) {
            Some(p) => {
                if p.real_name.is_none() {
                    p.real_name = Some(name.to_string());
                }
            }
            None => warn!(user_id, "real name for unknown participant ignored"),
        }
    }

    /// Assigns a role to a participant, at most once.
    ///
    /// Re-assigning the same role is a no-op; conflicting assignments keep
    /// the first role so a participant is never both local and remote.
    /// Unknown ids are a logged no-op.
    pub fn set_role(&mut self, user_id: &str, role: Role) {
        match self.participant_mut(user_id) {
            Some(p) => {
                if p.role == Role::Unknown {
                    p.role = role;
                } else if p.role != role {
                    warn!(user_id, "conflicting role assignment ignored");
                }
            }
            None => warn!(user_id, "role for unknown participant ignored"),
        }
    }

    /// Pads the participant list with [`UNKNOWN_PARTICIPANT`] until two
    /// parties are present, so two-party header construction never indexes
    /// out of range.
    ///
    /// The pad stands in for whichever end of the conversation is missing:
    /// it takes the local role when no local participant is known, the
    /// remote role when no remote one is. A conversation that named nobody
    /// at all gets two pads sharing the placeholder id — the one sanctioned
    /// exception to id uniqueness, with the ends still distinguished by
    /// role.
    pub fn ensure_two_participants(&mut self) {
        while self.participants.len() < 2 {
            let mut pad = Participant::new(UNKNOWN_PARTICIPANT.to_string());
            if !self.participants.iter().any(|p| p.role == Role::Local) {
                pad.role = Role::Local;
            } else if !self.participants.iter().any(|p| p.role == Role::Remote) {
                pad.role = Role::Remote;
            }
            self.participants.push(pad);
        }
    }

    /// All participant user ids, in first-appearance order.
    #[must_use]
    pub fn participant_user_ids(&self) -> Vec<&str> {
        self.participants.iter().map(|p| p.user_id.as_str()).collect()
    }

    /// Opportunistically derives service and account context from the log's
    /// directory shape.
    ///
    /// The client stores logs as `.../<Service>.<LocalAccount>/<RemoteAccount>/<file>`;
    /// when that hierarchy is detected the directory-derived values win over
    /// anything the log itself claims, since the directory reflects the
    /// account that actually fetched the log. Otherwise the fields are left
    /// untouched.
    pub fn derive_account_context(&mut self, path: &std::path::Path) {
        let Some(remote_dir) = path.parent().and_then(std::path::Path::file_name) else {
            return;
        };
        let Some(account_dir) = path
            .parent()
            .and_then(std::path::Path::parent)
            .and_then(std::path::Path::file_name)
        else {
            return;
        };
        let account_dir = account_dir.to_string_lossy();
        let Some((service, local)) = account_dir.split_once('.') else {
            return;
        };
        if service.is_empty() || local.is_empty() {
            return;
        }
        self.service = service.to_string();
        self.local_account_id = local.to_string();
        self.remote_account_id = remote_dir.to_string_lossy().into_owned();
    }

    fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.user_id.eq_ignore_ascii_case(user_id))
    }
}
