//! Format for items produced by the news fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;

use super::{Format, FormatError, MAX_DESCRIPTION};
use crate::fetcher::etf::NewsItem;
use crate::notification::{Embed, Notification, truncate_chars};

pub struct NewsFormat;

#[async_trait]
impl Format for NewsFormat {
    async fn format(
        &self,
        _url: &Url,
        _title: Option<&str>,
        new: &str,
        old: &str,
    ) -> Result<Option<Notification>, FormatError> {
        if new.is_empty() || new == old {
            return Ok(None);
        }

        let item: NewsItem = serde_json::from_str(new)
            .map_err(|e| FormatError::Content(format!("not a news item: {e}")))?;

        let mut embed = Embed::branded(
            item.title,
            item.url,
            truncate_chars(&item.snippet, MAX_DESCRIPTION).to_string(),
        );
        if let Ok(published) = DateTime::parse_from_rfc3339(&item.date) {
            embed.timestamp = published.with_timezone(&Utc);
        }

        Ok(Some(Notification::embed(embed)))
    }
}
