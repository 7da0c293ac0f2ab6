//! Transports deliver formatted notifications to a chat.

pub mod discord;
pub mod telegram;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::TransportConfig;
use crate::notification::Notification;

pub use discord::DiscordTransport;
pub use telegram::TelegramTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn transport(&self, notification: &Notification) -> Result<(), TransportError>;

    async fn kill(&self) {}
}

#[derive(Debug)]
pub enum TransportError {
    Http(String),
    Api(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Api(e) => write!(f, "API error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

pub fn build(config: &TransportConfig) -> Result<Arc<dyn Transport>, String> {
    let transport: Arc<dyn Transport> = match config {
        TransportConfig::Discord { url, id, token } => {
            let webhook = match (url, id, token) {
                (Some(url), _, _) => url.clone(),
                (None, Some(id), Some(token)) => discord::webhook_url(id, token),
                _ => return Err("discord transport needs either url or id and token".into()),
            };
            Arc::new(DiscordTransport::new(&webhook)?)
        }
        TransportConfig::Telegram { bot_token, chat_id } => {
            Arc::new(TelegramTransport::new(bot_token, *chat_id))
        }
    };
    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_discord_variants() {
        let by_url = TransportConfig::Discord {
            url: Some("https://discord.com/api/webhooks/1/abc".into()),
            id: None,
            token: None,
        };
        assert!(build(&by_url).is_ok());

        let by_id = TransportConfig::Discord {
            url: None,
            id: Some("1".into()),
            token: Some("abc".into()),
        };
        assert!(build(&by_id).is_ok());

        let incomplete = TransportConfig::Discord {
            url: None,
            id: Some("1".into()),
            token: None,
        };
        assert!(build(&incomplete).is_err());
    }

    #[test]
    fn test_build_discord_bad_url() {
        let config = TransportConfig::Discord {
            url: Some("::not a url".into()),
            id: None,
            token: None,
        };
        assert!(build(&config).is_err());
    }
}
