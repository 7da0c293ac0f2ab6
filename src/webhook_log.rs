use std::time::Duration;

use reqwest::Url;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Discord's message length limit.
const MAX_MESSAGE: usize = 2000;

/// Upper bound on one webhook post.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Log message with priority.
#[derive(Debug, PartialEq)]
enum LogMessage {
    /// High priority (WARN/ERROR) - send immediately
    Urgent(String),
    /// Low priority (INFO) - batch and send periodically
    Info(String),
}

/// Mirrors the bot's own log output into a Discord channel.
pub struct WebhookLogLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl WebhookLogLayer {
    pub fn new(webhook: Url) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();
        let http = log_client(SEND_TIMEOUT);

        tokio::spawn(async move {
            let mut info_buffer: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(Duration::from_secs(5));

            loop {
                tokio::select! {
                    msg = rx.recv() => {
                        match msg {
                            Some(LogMessage::Urgent(text)) => {
                                send_log(&http, &webhook, &text).await;
                            }
                            Some(LogMessage::Info(text)) => {
                                info_buffer.push(text);
                                if info_buffer.len() >= 50 {
                                    flush_buffer(&http, &webhook, &mut info_buffer).await;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = interval.tick() => {
                        if !info_buffer.is_empty() {
                            flush_buffer(&http, &webhook, &mut info_buffer).await;
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

fn log_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to build log webhook client, using defaults: {e}");
            reqwest::Client::new()
        })
}

async fn send_log(http: &reqwest::Client, webhook: &Url, text: &str) {
    let body = json!({ "content": clamp(text) });
    // Can't log here: the event would loop back into this layer.
    match http.post(webhook.clone()).json(&body).send().await {
        Ok(response) if !response.status().is_success() => {
            eprintln!("Failed to send log to Discord: {}", response.status());
        }
        Ok(_) => {}
        Err(e) => eprintln!("Failed to send log to Discord: {e}"),
    }
}

async fn flush_buffer(http: &reqwest::Client, webhook: &Url, buffer: &mut Vec<String>) {
    if buffer.is_empty() {
        return;
    }
    let combined = buffer.join("\n");
    buffer.clear();
    send_log(http, webhook, &combined).await;
}

fn clamp(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE {
        let truncated: String = text.chars().take(MAX_MESSAGE - 3).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for WebhookLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();

        if level > Level::INFO {
            return;
        }
        // HTTP client internals would otherwise echo every webhook post.
        let target = event.metadata().target();
        if !target.starts_with(env!("CARGO_CRATE_NAME")) && level > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        let msg = match level {
            Level::ERROR => LogMessage::Urgent(format!("❌ {}", visitor.message)),
            Level::WARN => LogMessage::Urgent(format!("⚠️ {}", visitor.message)),
            _ => LogMessage::Info(visitor.message),
        };

        if self.tx.send(msg).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp("short"), "short");
        let long = "ž".repeat(MAX_MESSAGE + 1);
        let clamped = clamp(&long);
        assert_eq!(clamped.chars().count(), MAX_MESSAGE);
        assert!(clamped.ends_with("..."));
    }

    #[tokio::test]
    async fn test_flush_posts_batched_lines() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(mockito::Matcher::Json(json!({"content": "one\ntwo"})))
            .with_status(204)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let webhook = Url::parse(&format!("{}/hook", server.url())).unwrap();
        let mut buffer = vec!["one".to_string(), "two".to_string()];
        flush_buffer(&http, &webhook, &mut buffer).await;

        assert!(buffer.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_silent_webhook_does_not_block_sender() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let http = log_client(Duration::from_millis(200));
        let webhook = Url::parse(&format!("http://{addr}/hook")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), send_log(&http, &webhook, "stuck"))
            .await
            .expect("send should give up on its own");
        server.abort();
    }

    #[test]
    fn test_forwards_only_relevant_events() {
        use tracing_subscriber::prelude::*;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(WebhookLogLayer { tx });

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("tick finished");
            tracing::trace!("polling");
            tracing::info!(target: "hyper::proto", "connection reused");
            tracing::info!("page relayed");
            tracing::warn!("disk full");
            tracing::warn!(target: "reqwest::connect", "slow handshake");
            tracing::error!("webhook rejected");
        });

        let mut forwarded = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            forwarded.push(msg);
        }
        assert_eq!(
            forwarded,
            vec![
                LogMessage::Info("page relayed".into()),
                LogMessage::Urgent("⚠️ disk full".into()),
                LogMessage::Urgent("⚠️ slow handshake".into()),
                LogMessage::Urgent("❌ webhook rejected".into()),
            ]
        );
    }
}
