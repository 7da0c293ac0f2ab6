//! News fetcher for the faculty's main page.
//!
//! The news archive answers AJAX requests with a jQuery snippet that injects
//! the rendered list. Only items published since the last successful fetch
//! are requested, so an empty list means nothing new.

use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Local, SecondsFormat, Utc};
use regex::Regex;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{FetchError, Fetcher, get_text, http_client, now_millis, with_query};

const NEWS_BASE_URL: &str = "https://etf.bg.ac.rs/";

static NEWS_ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\$\('#vesti-arhiva-filtered'\)\.html\("(.*)"\);\n\$\('#vesti-arhiva-pagination'\)\.html\(""#,
    )
    .expect("static regex")
});

static NEWS_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<h3 class="vest-naslov"><a href="/([^"]+)">([^<]+)</a></h3><time class="vest-objavljeno" datetime="([^"]+)" title="[^"]+">[^<]+</time></header><div class="vest-ukratko"><p>([^<]+)</p>"#,
    )
    .expect("static regex")
});

static ESCAPED_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\n+\s*").expect("static regex"));

/// A single news item, serialized as the fetcher's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub date: String,
    pub snippet: String,
    pub title: String,
    pub url: String,
}

pub struct EtfFetcher {
    client: reqwest::Client,
    /// Publication cut-off for the next request.
    since: Mutex<DateTime<Local>>,
}

impl EtfFetcher {
    pub fn new(user_agent: &str) -> Result<Self, String> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("text/javascript"));
        headers.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );

        Ok(Self {
            client: http_client(user_agent, headers, false)?,
            since: Mutex::new(Local::now()),
        })
    }
}

#[async_trait]
impl Fetcher for EtfFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let since = self.since.lock().await.format("%d-%m-%Y %H:%M:%S").to_string();
        let request_url = with_query(url, now_millis(), &[("q[objavljeno_od]", since.as_str())]);

        let body = get_text(&self.client, request_url).await?;
        let html = extract_news_html(&body)?;
        if html.is_empty() {
            debug!("No news since {since}");
            return Ok(String::new());
        }

        *self.since.lock().await = Local::now();

        let item = parse_news_item(&html)?;
        serde_json::to_string(&item).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

/// Pull the injected HTML out of the jQuery response and undo its string escaping.
pub fn extract_news_html(body: &str) -> Result<String, FetchError> {
    let raw = NEWS_ENVELOPE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| FetchError::Parse("news list not found in response".into()))?
        .as_str();

    let unescaped = raw.replace("\\/", "/").replace("\\\"", "\"");
    Ok(ESCAPED_NEWLINES.replace_all(&unescaped, " ").trim().to_string())
}

pub fn parse_news_item(html: &str) -> Result<NewsItem, FetchError> {
    let caps = NEWS_ITEM
        .captures(html)
        .ok_or_else(|| FetchError::Parse("no news item in list".into()))?;

    Ok(NewsItem {
        date: normalize_date(&caps[3]),
        snippet: caps[4].to_string(),
        title: caps[2].to_string(),
        url: format!("{NEWS_BASE_URL}{}", &caps[1]),
    })
}

fn normalize_date(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|_| raw.to_string())
}
