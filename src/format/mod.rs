//! Formats turn a page's old and new content into a notification.

pub mod directory;
pub mod news;
pub mod page;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;

use crate::config::FormatConfig;
use crate::notification::Notification;

pub use directory::DirectoryFormat;
pub use news::NewsFormat;
pub use page::PageFormat;

/// Longest embed description Discord is sent.
pub const MAX_DESCRIPTION: usize = 2000;

#[async_trait]
pub trait Format: Send + Sync {
    /// Compare `new` against `old`; `None` means there is nothing worth relaying.
    async fn format(
        &self,
        url: &Url,
        title: Option<&str>,
        new: &str,
        old: &str,
    ) -> Result<Option<Notification>, FormatError>;

    async fn kill(&self) {}
}

#[derive(Debug)]
pub enum FormatError {
    /// Content could not be interpreted.
    Content(String),
    /// HTML to Markdown conversion failed.
    Markdown(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(msg) => write!(f, "invalid content: {msg}"),
            Self::Markdown(msg) => write!(f, "markdown conversion failed: {msg}"),
        }
    }
}

impl std::error::Error for FormatError {}

pub fn build(config: &FormatConfig) -> Arc<dyn Format> {
    match config {
        FormatConfig::Page => Arc::new(PageFormat),
        FormatConfig::Directory => Arc::new(DirectoryFormat),
        FormatConfig::News => Arc::new(NewsFormat),
    }
}

/// The page title if configured, else its URL.
pub(crate) fn display_title(url: &Url, title: Option<&str>) -> String {
    title.map(str::to_string).unwrap_or_else(|| url.to_string())
}
