//! Last-seen content per page and relayed snapshot history.
//!
//! The cache is a flat JSON object persisted to `cache.json` and rewritten
//! wholesale on every save.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Last fetched content keyed by page name.
#[derive(Debug, Default)]
pub struct ContentCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl ContentCache {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: BTreeMap::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read: {e}"))?;

        let entries: BTreeMap<String, String> = serde_json::from_str(&json)
            .map_err(|e| format!("Failed to parse: {e}"))?;

        info!("Loaded cache from {:?} ({} pages)", path, entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn load_or_new(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(cache) => cache,
                Err(e) => {
                    warn!("Failed to load cache: {e}");
                    Self::new(path.to_path_buf())
                }
            }
        } else {
            info!("No cache file, starting fresh");
            Self::new(path.to_path_buf())
        }
    }

    pub fn get(&self, page: &str) -> Option<&str> {
        self.entries.get(page).map(String::as_str)
    }

    pub fn set(&mut self, page: &str, content: String) {
        self.entries.insert(page.to_string(), content);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create cache dir: {e}"))?;
        }

        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| format!("Failed to serialize: {e}"))?;

        std::fs::write(&self.path, json)
            .map_err(|e| format!("Failed to write: {e}"))?;

        debug!("💾 Saved cache ({} pages)", self.entries.len());
        Ok(())
    }
}

/// Writes relayed snapshots to `hist/<page>/<unix millis>.html`.
#[derive(Debug, Clone)]
pub struct History {
    dir: Option<PathBuf>,
}

impl History {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir: Some(dir) }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn record(&self, page: &str, content: &str) -> Result<Option<PathBuf>, String> {
        let Some(ref dir) = self.dir else {
            return Ok(None);
        };

        let page_dir = dir.join(page);
        std::fs::create_dir_all(&page_dir)
            .map_err(|e| format!("Failed to create history dir: {e}"))?;

        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);

        let path = page_dir.join(format!("{timestamp_ms}.html"));
        std::fs::write(&path, content)
            .map_err(|e| format!("Failed to write history snapshot: {e}"))?;

        Ok(Some(path))
    }
}

/// Cache and history shared by every page.
pub struct Store {
    cache: Mutex<ContentCache>,
    history: History,
}

impl Store {
    pub fn new(cache: ContentCache, history: History) -> Self {
        Self {
            cache: Mutex::new(cache),
            history,
        }
    }

    /// Open the store under `data_dir`.
    pub fn open(data_dir: &Path, keep_history: bool) -> Self {
        let cache = ContentCache::load_or_new(&data_dir.join("cache.json"));
        let history = if keep_history {
            History::new(data_dir.join("hist"))
        } else {
            History::disabled()
        };
        Self::new(cache, history)
    }

    pub async fn baseline(&self, page: &str) -> Option<String> {
        self.cache.lock().await.get(page).map(str::to_string)
    }

    /// Replace a page's baseline and persist the whole cache.
    pub async fn update_baseline(&self, page: &str, content: &str) {
        let mut cache = self.cache.lock().await;
        cache.set(page, content.to_string());
        if let Err(e) = cache.save() {
            warn!("Failed to save cache: {e}");
        }
    }

    pub fn record_history(&self, page: &str, content: &str) {
        match self.history.record(page, content) {
            Ok(Some(path)) => debug!("Saved snapshot of '{page}' to {}", path.display()),
            Ok(None) => {}
            Err(e) => warn!("Failed to record history for '{page}': {e}"),
        }
    }
}
