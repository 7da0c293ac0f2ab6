//! Fetchers retrieve the current content of a watched page.

pub mod basic;
pub mod etf;
pub mod moodle;

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, USER_AGENT};
use reqwest::{StatusCode, Url};

use crate::config::FetcherConfig;

pub use basic::BasicFetcher;
pub use etf::EtfFetcher;
pub use moodle::MoodleFetcher;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the current content at `url`.
    async fn fetch(&self, url: &Url) -> Result<String, FetchError>;

    async fn kill(&self) {}
}

#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Status { url: Url, status: StatusCode },
    Parse(String),
    Login(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => {
                let url = e.url().map(Url::as_str).unwrap_or("<unknown>");
                if e.is_timeout() {
                    return write!(f, "connection timed out on {url}");
                }
                match io_error_kind(e) {
                    Some(io::ErrorKind::ConnectionRefused) => {
                        return write!(f, "connection refused by {url}");
                    }
                    Some(io::ErrorKind::ConnectionReset) => {
                        return write!(f, "connection reset by {url}");
                    }
                    _ => {}
                }
                if e.is_connect() {
                    write!(f, "could not connect to {url}: {e}")
                } else {
                    write!(f, "request to {url} failed: {e}")
                }
            }
            Self::Status { url, status } => write!(f, "server at {url} responded with {status}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Login(msg) => write!(f, "login error: {msg}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

/// Kind of the first I/O error in the source chain, if any.
fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<io::ErrorKind> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            return Some(io_err.kind());
        }
        current = e.source();
    }
    None
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

/// Build the fetcher described by `config`.
pub fn build(config: &FetcherConfig, user_agent: &str) -> Result<Arc<dyn Fetcher>, String> {
    let fetcher: Arc<dyn Fetcher> = match config {
        FetcherConfig::Basic => Arc::new(BasicFetcher::new(user_agent)?),
        FetcherConfig::Etf => Arc::new(EtfFetcher::new(user_agent)?),
        FetcherConfig::Moodle { url, username, password } => Arc::new(MoodleFetcher::new(
            url,
            username.clone(),
            password.clone(),
            user_agent,
        )?),
    };
    Ok(fetcher)
}

pub(crate) fn http_client(
    user_agent: &str,
    mut headers: HeaderMap,
    cookies: bool,
) -> Result<reqwest::Client, String> {
    let agent = user_agent
        .parse()
        .map_err(|e| format!("Invalid user agent '{user_agent}': {e}"))?;
    headers.insert(USER_AGENT, agent);

    reqwest::Client::builder()
        .default_headers(headers)
        .cookie_store(cookies)
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .map_err(|e| format!("Failed to build HTTP client: {e}"))
}

pub(crate) fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Copy of `url` with the cache-busting `t` parameter and any `extra` pairs appended.
pub(crate) fn with_query(url: &Url, t: u128, extra: &[(&str, &str)]) -> Url {
    let mut url = url.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("t", &t.to_string());
        for (key, value) in extra {
            query.append_pair(key, value);
        }
    }
    url
}

/// GET `url` and return the body, treating non-2xx responses as errors.
pub(crate) async fn get_text(client: &reqwest::Client, url: Url) -> Result<String, FetchError> {
    let response = client.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status { url, status });
    }
    Ok(response.text().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_query_keeps_existing_params() {
        let url = Url::parse("https://example.com/vesti?kategorija=5").unwrap();
        let busted = with_query(&url, 1234, &[("q[objavljeno_od]", "01-02-2024 10:00:00")]);

        let pairs: Vec<(String, String)> = busted
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("kategorija".to_string(), "5".to_string()),
                ("t".to_string(), "1234".to_string()),
                ("q[objavljeno_od]".to_string(), "01-02-2024 10:00:00".to_string()),
            ]
        );
        assert_eq!(busted.path(), "/vesti");
    }

    #[test]
    fn test_build_every_kind() {
        let agent = "etfnews-test";
        assert!(build(&FetcherConfig::Basic, agent).is_ok());
        assert!(build(&FetcherConfig::Etf, agent).is_ok());
        assert!(build(
            &FetcherConfig::Moodle {
                url: "https://moodle.example.com".into(),
                username: "u".into(),
                password: "p".into(),
            },
            agent
        )
        .is_ok());
    }

    #[test]
    fn test_build_rejects_bad_moodle_url() {
        let result = build(
            &FetcherConfig::Moodle {
                url: "not a url".into(),
                username: "u".into(),
                password: "p".into(),
            },
            "etfnews-test",
        );
        assert!(result.is_err());
    }

    #[derive(Debug)]
    struct Wrapped(io::Error);

    impl fmt::Display for Wrapped {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "wrapped")
        }
    }

    impl std::error::Error for Wrapped {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_io_error_kind_walks_sources() {
        let reset = Wrapped(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(io_error_kind(&reset), Some(io::ErrorKind::ConnectionReset));

        let plain = FetchError::Parse("x".into());
        assert_eq!(io_error_kind(&plain), None);
    }

    #[tokio::test]
    async fn test_refused_connection_message() {
        let addr = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let client = http_client("etfnews-test", HeaderMap::new(), false).unwrap();
        let url = Url::parse(&format!("http://{addr}/vesti")).unwrap();
        let err = get_text(&client, url).await.unwrap_err();

        assert!(err.to_string().starts_with("connection refused by"), "{err}");
    }

    #[test]
    fn test_invalid_user_agent() {
        assert!(http_client("bad\nagent", HeaderMap::new(), false).is_err());
    }
}
