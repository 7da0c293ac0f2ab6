//! Builds the configured submodules and pages and owns their lifecycle.
//!
//! Misconfigured entries are reported and skipped so the remaining pages
//! still run.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Url;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::fetcher::{self, Fetcher};
use crate::format::{self, Format};
use crate::page::Page;
use crate::store::Store;
use crate::transport::{self, Transport};

pub struct Client {
    transports: BTreeMap<String, Arc<dyn Transport>>,
    formats: BTreeMap<String, Arc<dyn Format>>,
    fetchers: BTreeMap<String, Arc<dyn Fetcher>>,
    /// Pages waiting to be started.
    pending: Vec<Page>,
    running: Vec<(String, JoinHandle<()>)>,
    page_names: Vec<String>,
}

impl Client {
    pub fn new(config: &Config, store: Arc<Store>) -> Self {
        let transports = build_all("transport", &config.transports, transport::build);
        let formats = build_all("format", &config.formats, |c| Ok(format::build(c)));
        let fetchers = build_all("fetcher", &config.fetchers, |c| {
            fetcher::build(c, &config.user_agent)
        });

        let mut pending = Vec::new();
        for (name, page) in &config.pages {
            let (Some(fetcher_name), Some(format_name), Some(transport_name)) =
                (&page.fetcher, &page.format, &page.transport)
            else {
                warn!("Page '{name}' does not have a configured fetcher, transport or format.");
                continue;
            };
            let Some(transport) = transports.get(transport_name) else {
                warn!("Page '{name}' uses an uninitialized transport.");
                continue;
            };
            let Some(format) = formats.get(format_name) else {
                warn!("Page '{name}' uses an uninitialized format.");
                continue;
            };
            let Some(fetcher) = fetchers.get(fetcher_name) else {
                warn!("Page '{name}' uses an uninitialized fetcher.");
                continue;
            };
            let url = match Url::parse(&page.url) {
                Ok(url) => url,
                Err(e) => {
                    warn!("Page '{name}' failed to configure: invalid URL '{}': {e}", page.url);
                    continue;
                }
            };

            pending.push(Page::new(
                name.clone(),
                url,
                page.title.clone(),
                page.refresh_interval(),
                fetcher.clone(),
                format.clone(),
                transport.clone(),
                store.clone(),
            ));
        }

        let page_names = pending.iter().map(|p| p.name().to_string()).collect();
        Self {
            transports,
            formats,
            fetchers,
            pending,
            running: Vec::new(),
            page_names,
        }
    }

    /// Names of the pages that were configured successfully.
    pub fn page_names(&self) -> &[String] {
        &self.page_names
    }

    /// Spawn one polling task per page.
    pub fn start(&mut self) {
        for page in self.pending.drain(..) {
            info!("👀 Watching '{}' every {:?}", page.name(), page.interval());
            let name = page.name().to_string();
            self.running.push((name, page.spawn()));
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.iter().any(|(_, handle)| !handle.is_finished())
    }

    /// Stop every page, then release the submodules.
    pub async fn kill(&mut self) {
        for (name, handle) in self.running.drain(..) {
            handle.abort();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!("Page '{name}' task ended abnormally: {e}");
            }
        }
        for transport in self.transports.values() {
            transport.kill().await;
        }
        for format in self.formats.values() {
            format.kill().await;
        }
        for fetcher in self.fetchers.values() {
            fetcher.kill().await;
        }
        self.pending.clear();
        info!("Client stopped");
    }
}

fn build_all<C, T: ?Sized>(
    kind: &str,
    configs: &BTreeMap<String, C>,
    build: impl Fn(&C) -> Result<Arc<T>, String>,
) -> BTreeMap<String, Arc<T>> {
    configs
        .iter()
        .filter_map(|(name, config)| match build(config) {
            Ok(built) => Some((name.clone(), built)),
            Err(e) => {
                warn!("A configuration error occurred in {kind} '{name}': {e}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FetcherConfig, FormatConfig, PageConfig, TransportConfig};
    use crate::store::{ContentCache, History};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn page(fetcher: &str, format: &str, transport: &str) -> PageConfig {
        PageConfig {
            url: "https://etf.bg.ac.rs/vesti".into(),
            title: None,
            interval: Some(60_000),
            fetcher: Some(fetcher.into()),
            format: Some(format.into()),
            transport: Some(transport.into()),
        }
    }

    fn config(pages: BTreeMap<String, PageConfig>) -> Config {
        Config {
            config_path: PathBuf::from("test.json"),
            data_dir: PathBuf::from("."),
            user_agent: "etfnews-test".into(),
            history: false,
            log_webhook: None,
            transports: BTreeMap::from([
                (
                    "main".to_string(),
                    TransportConfig::Discord {
                        url: Some("https://discord.com/api/webhooks/1/abc".into()),
                        id: None,
                        token: None,
                    },
                ),
                (
                    "broken".to_string(),
                    TransportConfig::Discord { url: None, id: None, token: None },
                ),
            ]),
            formats: BTreeMap::from([("page".to_string(), FormatConfig::Page)]),
            fetchers: BTreeMap::from([("basic".to_string(), FetcherConfig::Basic)]),
            pages,
        }
    }

    fn store(dir: &TempDir) -> Arc<Store> {
        Arc::new(Store::new(
            ContentCache::new(dir.path().join("cache.json")),
            History::disabled(),
        ))
    }

    #[tokio::test]
    async fn test_skips_misconfigured_pages() {
        let dir = TempDir::new().unwrap();
        let mut bad_url = page("basic", "page", "main");
        bad_url.url = "not a url".into();
        let mut unwired = page("basic", "page", "main");
        unwired.transport = None;

        let config = config(BTreeMap::from([
            ("good".to_string(), page("basic", "page", "main")),
            ("broken-transport".to_string(), page("basic", "page", "broken")),
            ("unknown-format".to_string(), page("basic", "diff", "main")),
            ("unknown-fetcher".to_string(), page("ftp", "page", "main")),
            ("bad-url".to_string(), bad_url),
            ("unwired".to_string(), unwired),
        ]));

        let client = Client::new(&config, store(&dir));
        assert_eq!(client.page_names(), ["good".to_string()]);
    }

    #[tokio::test]
    async fn test_start_and_kill() {
        let dir = TempDir::new().unwrap();
        let config = config(BTreeMap::from([(
            "good".to_string(),
            page("basic", "page", "main"),
        )]));

        let mut client = Client::new(&config, store(&dir));
        assert!(!client.is_running());
        client.start();
        assert!(client.is_running());
        client.kill().await;
        assert!(!client.is_running());
    }
}
