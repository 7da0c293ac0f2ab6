use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use etfnews::client::Client;
use etfnews::config::Config;
use etfnews::store::Store;
use etfnews::webhook_log::WebhookLogLayer;

fn start_client(config: &Config) -> Client {
    let store = Arc::new(Store::open(&config.data_dir, config.history));
    let mut client = Client::new(config, store);
    if client.page_names().is_empty() {
        warn!("No page is fully configured, nothing to watch");
    } else {
        info!("Pages: {:?}", client.page_names());
    }
    client.start();
    client
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "etfnews.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("etfnews.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(ref webhook) = config.log_webhook {
        registry.with(WebhookLogLayer::new(webhook.clone())).init();
    } else {
        registry.init();
    }

    info!("🚀 Starting etfnews...");
    info!("Loaded config from {config_path}");

    let mut client = start_client(&config);
    let mut reload = reload::Reload::new();

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            _ = reload.recv() => {
                info!("🔄 Reloading config from {config_path}");
                match Config::load(&config_path) {
                    Ok(new_config) => {
                        client.kill().await;
                        client = start_client(&new_config);
                    }
                    Err(e) => error!("Reload failed, keeping current configuration: {e}"),
                }
            }
        }
    }

    info!("👋 Shutting down");
    client.kill().await;
}

#[cfg(unix)]
mod reload {
    use tokio::signal::unix::{Signal, SignalKind, signal};
    use tracing::warn;

    /// SIGHUP listener.
    pub struct Reload(Option<Signal>);

    impl Reload {
        pub fn new() -> Self {
            match signal(SignalKind::hangup()) {
                Ok(sig) => Self(Some(sig)),
                Err(e) => {
                    warn!("Config reload on SIGHUP unavailable: {e}");
                    Self(None)
                }
            }
        }

        pub async fn recv(&mut self) {
            if let Some(sig) = self.0.as_mut()
                && sig.recv().await.is_some()
            {
                return;
            }
            self.0 = None;
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
mod reload {
    pub struct Reload;

    impl Reload {
        pub fn new() -> Self {
            Self
        }

        pub async fn recv(&mut self) {
            std::future::pending::<()>().await;
        }
    }
}
