//! Telegram transport using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::debug;

use super::{Transport, TransportError};
use crate::notification::{Notification, truncate_chars};

/// Telegram rejects messages over 4096 characters; leave room for markup.
const MAX_TEXT: usize = 4000;

pub struct TelegramTransport {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramTransport {
    pub fn new(bot_token: &str, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(bot_token),
            chat_id: ChatId(chat_id),
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn transport(&self, notification: &Notification) -> Result<(), TransportError> {
        let text = render(notification);
        self.bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(|e| TransportError::Api(format!("Failed to send: {e}")))?;

        debug!("Delivered notification to Telegram chat {}", self.chat_id.0);
        Ok(())
    }
}

fn html_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

/// Render as Telegram HTML: linked bold title, blank line, description.
fn render(notification: &Notification) -> String {
    let mut parts = Vec::new();
    if !notification.content.is_empty() {
        parts.push(html_escape(&notification.content));
    }
    for embed in &notification.embeds {
        let budget = MAX_TEXT.saturating_sub(embed.title.chars().count() + embed.url.len());
        parts.push(format!(
            "<b><a href=\"{}\">{}</a></b>\n\n{}",
            html_escape(&embed.url),
            html_escape(&embed.title),
            html_escape(truncate_chars(&embed.description, budget)),
        ));
    }
    parts.join("\n\n")
}
