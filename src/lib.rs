// SPDX-License-Identifier: GPL-3.0-only

//! Convert Adium instant-messaging logs to email messages.
//!
//! This crate parses the two historical Adium log formats into a canonical
//! conversation model and renders that model as a multi-part `.eml` file
//! suitable for import into a mail archive.
//!
//! # Overview
//!
//! Adium wrote logs in two generations of formats:
//!
//! 1. The older tag-soup HTML format (`.AdiumHTMLLog`), handled by
//!    [`html_log`] with tolerant substring extraction
//! 2. The newer XML format (`.chatlog`), handled by [`xml_log`] with a
//!    real XML parser
//!
//! Both produce a [`conversation::Conversation`], which [`renderer`]
//! turns into a deterministic multi-part email: same log in, identical
//! bytes out, so repeated archive runs do not churn.
//!
//! # Example
//!
//! ```no_run
//! use chat2eml::config::Config;
//! use chat2eml::html_log;
//! use chat2eml::renderer::{self, RenderOptions};
//! use std::path::Path;
//!
//! let path = Path::new("bob (2011-03-16T11.18.15-0400).AdiumHTMLLog");
//! let input = std::fs::read_to_string(path).unwrap();
//! let config = Config::default();
//!
//! let conv = html_log::parse_html_log(&input, path, &config);
//! let eml = renderer::render_eml(&conv, &RenderOptions::default(), &config).unwrap();
//!
//! std::fs::write("chat.eml", eml.to_bytes()).unwrap();
//! ```
//!
//! # Modules
//!
//! - [`conversation`]: the canonical in-memory model both parsers target
//! - [`html_log`]: parser for the legacy HTML log format
//! - [`xml_log`]: parser for the XML log format
//! - [`renderer`]: EML generation with deterministic identifiers
//! - [`dates`]: permissive timestamp reconciliation helpers
//! - [`config`]: shared conversion settings

#![deny(missing_docs)]

pub mod config;
pub mod conversation;
pub mod dates;
pub mod html_log;
pub mod renderer;
pub mod xml_log;
