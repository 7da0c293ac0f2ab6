//! Plain page fetcher.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use reqwest::header::HeaderMap;

use super::{FetchError, Fetcher, get_text, http_client, now_millis, with_query};

static HTML_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));

pub struct BasicFetcher {
    client: reqwest::Client,
}

impl BasicFetcher {
    pub fn new(user_agent: &str) -> Result<Self, String> {
        Ok(Self {
            client: http_client(user_agent, HeaderMap::new(), false)?,
        })
    }
}

#[async_trait]
impl Fetcher for BasicFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let t = now_millis();
        let body = get_text(&self.client, with_query(url, t, &[])).await?;
        Ok(normalize(&body, &t.to_string()))
    }
}

/// Strip the echoed cache-buster and HTML comments, trim every line and drop
/// blank ones, so cosmetic churn doesn't register as a change.
pub fn normalize(body: &str, cache_buster: &str) -> String {
    let body = body.replace(cache_buster, "");
    HTML_COMMENT
        .replace_all(&body, "")
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
