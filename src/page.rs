//! A single page's fetch → format → transport cycle.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::fetcher::Fetcher;
use crate::format::Format;
use crate::store::Store;
use crate::transport::Transport;

/// What one refresh of a page ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    FetchFailed,
    /// Fetcher returned nothing; treated as "no content this time".
    Empty,
    /// First content seen; stored without notifying.
    Baseline,
    FormatFailed,
    Unchanged,
    Delivered,
    TransportFailed,
}

pub struct Page {
    name: String,
    url: Url,
    title: Option<String>,
    interval: Duration,
    fetcher: Arc<dyn Fetcher>,
    format: Arc<dyn Format>,
    transport: Arc<dyn Transport>,
    store: Arc<Store>,
    old_content: Option<String>,
}

impl Page {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: String,
        url: Url,
        title: Option<String>,
        interval: Duration,
        fetcher: Arc<dyn Fetcher>,
        format: Arc<dyn Format>,
        transport: Arc<dyn Transport>,
        store: Arc<Store>,
    ) -> Self {
        Self {
            name,
            url,
            title,
            interval,
            fetcher,
            format,
            transport,
            store,
            old_content: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Pick up the baseline persisted by a previous run, if any.
    pub async fn restore_baseline(&mut self) {
        if let Some(content) = self.store.baseline(&self.name).await {
            debug!("Restored baseline for '{}' ({} bytes)", self.name, content.len());
            self.old_content = Some(content);
        }
    }

    /// Refresh the page once.
    pub async fn tick(&mut self) -> TickOutcome {
        let content = match self.fetcher.fetch(&self.url).await {
            Ok(content) => content,
            Err(e) => {
                error!("Failed to fetch content for '{}': {e}", self.name);
                return TickOutcome::FetchFailed;
            }
        };

        if content.is_empty() {
            return TickOutcome::Empty;
        }

        let Some(ref old_content) = self.old_content else {
            info!("📄 Baseline for '{}' established", self.name);
            self.set_baseline(content).await;
            return TickOutcome::Baseline;
        };

        let notification = match self
            .format
            .format(&self.url, self.title.as_deref(), &content, old_content)
            .await
        {
            Ok(Some(notification)) => notification,
            Ok(None) => return TickOutcome::Unchanged,
            Err(e) => {
                error!("Failed to format content for '{}': {e}", self.name);
                return TickOutcome::FormatFailed;
            }
        };

        let outcome = match self.transport.transport(&notification).await {
            Ok(()) => {
                info!("📨 Relayed update of '{}'", self.name);
                self.store.record_history(&self.name, &content);
                TickOutcome::Delivered
            }
            Err(e) => {
                error!("Failed to transport content for '{}': {e}", self.name);
                TickOutcome::TransportFailed
            }
        };

        // Baseline advances even when delivery failed.
        self.set_baseline(content).await;
        outcome
    }

    async fn set_baseline(&mut self, content: String) {
        self.store.update_baseline(&self.name, &content).await;
        self.old_content = Some(content);
    }

    /// Refresh on a fixed interval until the task is aborted.
    pub fn spawn(mut self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.restore_baseline().await;

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let outcome = self.tick().await;
                debug!("'{}' tick: {:?}", self.name, outcome);
            }
        })
    }
}
