//! Discord webhook transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use super::{Transport, TransportError};
use crate::notification::Notification;

const DISCORD_WEBHOOK_BASE: &str = "https://discord.com/api/webhooks";

/// Upper bound on a single webhook call, connect included.
const SEND_TIMEOUT: Duration = Duration::from_secs(30);

pub fn webhook_url(id: &str, token: &str) -> String {
    format!("{DISCORD_WEBHOOK_BASE}/{id}/{token}")
}

pub struct DiscordTransport {
    webhook: Url,
    http: reqwest::Client,
}

impl DiscordTransport {
    pub fn new(webhook: &str) -> Result<Self, String> {
        Self::with_timeout(webhook, SEND_TIMEOUT)
    }

    pub fn with_timeout(webhook: &str, timeout: Duration) -> Result<Self, String> {
        let webhook =
            Url::parse(webhook).map_err(|e| format!("Invalid webhook URL '{webhook}': {e}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
        Ok(Self { webhook, http })
    }
}

#[async_trait]
impl Transport for DiscordTransport {
    async fn transport(&self, notification: &Notification) -> Result<(), TransportError> {
        let response = self
            .http
            .post(self.webhook.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Api(format!("{status}: {body}")));
        }

        debug!("Delivered {} embed(s) to Discord", notification.embeds.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Embed;
    use mockito::Matcher;
    use serde_json::json;

    fn notification() -> Notification {
        Notification::embed(Embed::branded(
            "Stranica 'Vesti' ažurirana!".into(),
            "https://etf.bg.ac.rs/vesti".into(),
            "```diff\n+ nova vest```".into(),
        ))
    }

    #[test]
    fn test_webhook_url() {
        assert_eq!(webhook_url("123", "tok"), "https://discord.com/api/webhooks/123/tok");
    }

    #[tokio::test]
    async fn test_posts_embed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/webhooks/123/tok")
            .match_header("content-type", "application/json")
            .match_body(Matcher::PartialJson(json!({
                "content": "",
                "embeds": [{
                    "title": "Stranica 'Vesti' ažurirana!",
                    "url": "https://etf.bg.ac.rs/vesti",
                    "color": 0x00658F,
                    "footer": {"text": "ETF News"}
                }]
            })))
            .with_status(204)
            .create_async()
            .await;

        let transport = DiscordTransport::new(&format!("{}/api/webhooks/123/tok", server.url())).unwrap();
        transport.transport(&notification()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/webhooks/123/tok")
            .with_status(404)
            .with_body(r#"{"message": "Unknown Webhook", "code": 10015}"#)
            .create_async()
            .await;

        let transport = DiscordTransport::new(&format!("{}/api/webhooks/123/tok", server.url())).unwrap();
        let err = transport.transport(&notification()).await.unwrap_err();

        assert!(matches!(err, TransportError::Api(_)));
        assert!(err.to_string().contains("Unknown Webhook"));
    }

    #[tokio::test]
    async fn test_silent_webhook_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever answering.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let transport = DiscordTransport::with_timeout(
            &format!("http://{addr}/api/webhooks/123/tok"),
            Duration::from_millis(200),
        )
        .unwrap();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            transport.transport(&notification()),
        )
        .await
        .expect("transport should give up on its own");

        assert!(matches!(result, Err(TransportError::Http(_))));
        server.abort();
    }
}
