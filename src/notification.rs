//! Transport-neutral notification payload.
//!
//! The shape follows the Discord webhook execute body, so the Discord
//! transport serializes it as-is and other transports render from it.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Embed colour used for every ETF News notification.
pub const BRAND_COLOR: u32 = 0x00658F;
pub const BRAND_NAME: &str = "ETF News";
pub const BRAND_ICON: &str =
    "https://pbs.twimg.com/profile_images/3588382817/fc429cf1113d956cee2e85b503b0cfc4.jpeg";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub content: String,
    pub embeds: Vec<Embed>,
}

impl Notification {
    /// A notification with no plain content and a single embed.
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: String::new(),
            embeds: vec![embed],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Footer>,
    pub timestamp: DateTime<Utc>,
}

impl Embed {
    /// Embed carrying the ETF News colour and footer, stamped with the current time.
    pub fn branded(title: String, url: String, description: String) -> Self {
        Self {
            title,
            url,
            description,
            color: BRAND_COLOR,
            footer: Some(Footer {
                text: BRAND_NAME.to_string(),
                icon_url: BRAND_ICON.to_string(),
            }),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Footer {
    pub text: String,
    pub icon_url: String,
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
