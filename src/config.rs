// SPDX-License-Identifier: GPL-3.0-only

//! Conversion configuration.
//!
//! The historical tool kept its timezone and fallback domain in process-wide
//! globals; here they are an explicit value threaded through the parser and
//! renderer entry points, so batch runs over many logs stay independent.

use chrono::FixedOffset;

/// Settings shared by the parsers and the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Fixed local timezone applied to log times that carry no offset of
    /// their own. The logs record wall-clock times only.
    pub timezone: FixedOffset,

    /// Non-routable domain used to build RFC-shaped address strings and
    /// identifiers when the log names no service at all. Never a real
    /// deliverable domain.
    pub fallback_domain: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // The original logs were written on machines in US Eastern time
            // and record no offset; -0500 matches the historical output.
            timezone: FixedOffset::west_opt(5 * 3600).expect("static offset"),
            fallback_domain: "adium.invalid".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timezone_is_minus_0500() {
        let config = Config::default();
        assert_eq!(config.timezone.local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn default_domain_is_non_routable() {
        let config = Config::default();
        assert!(config.fallback_domain.ends_with(".invalid"));
    }
}
