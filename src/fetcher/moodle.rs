//! Moodle course fetcher.
//!
//! Keeps a cookie session and logs in again whenever Moodle serves the
//! logged-out layout. Pages sharing one fetcher share one session.

use async_trait::async_trait;
use reqwest::Url;
use reqwest::header::HeaderMap;
use scraper::{Html, Selector};
use tokio::sync::Mutex;
use tracing::info;

use super::{FetchError, Fetcher, get_text, http_client, now_millis, with_query};

pub struct MoodleFetcher {
    client: reqwest::Client,
    login_url: Url,
    username: String,
    password: String,
    /// Bumped after every login so waiters can tell someone else already logged in.
    login_generation: Mutex<u64>,
}

/// What a course page turned out to be.
#[derive(Debug, PartialEq)]
enum CoursePage {
    LoggedOut,
    Content(String),
}

impl MoodleFetcher {
    pub fn new(
        base_url: &str,
        username: String,
        password: String,
        user_agent: &str,
    ) -> Result<Self, String> {
        let login_url = Url::parse(&format!("{}/login/index.php", base_url.trim_end_matches('/')))
            .map_err(|e| format!("Invalid Moodle URL '{base_url}': {e}"))?;

        Ok(Self {
            client: http_client(user_agent, HeaderMap::new(), true)?,
            login_url,
            username,
            password,
            login_generation: Mutex::new(0),
        })
    }

    async fn fetch_page(&self, url: &Url) -> Result<CoursePage, FetchError> {
        let t = now_millis();
        let body = get_text(&self.client, with_query(url, t, &[])).await?;
        inspect_course_page(&body.replace(&t.to_string(), ""))
    }

    /// Log in unless another page already did since `seen_generation`.
    async fn ensure_login(&self, seen_generation: u64) -> Result<(), FetchError> {
        let mut generation = self.login_generation.lock().await;
        if *generation != seen_generation {
            return Ok(());
        }

        info!("🔑 Logging in to Moodle as {}...", self.username);
        self.login().await?;
        *generation += 1;
        info!("Login procedure finished executing.");
        Ok(())
    }

    async fn login(&self) -> Result<(), FetchError> {
        let login_page = get_text(&self.client, self.login_url.clone()).await?;
        let token = login_token(&login_page)?;

        let response = self
            .client
            .post(self.login_url.clone())
            .form(&[
                ("logintoken", token.as_str()),
                ("password", self.password.as_str()),
                ("rememberusername", "1"),
                ("username", self.username.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.login_url.clone(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for MoodleFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, FetchError> {
        let generation = *self.login_generation.lock().await;
        if let CoursePage::Content(content) = self.fetch_page(url).await? {
            return Ok(content);
        }

        self.ensure_login(generation).await?;

        match self.fetch_page(url).await? {
            CoursePage::Content(content) => Ok(content),
            CoursePage::LoggedOut => Err(FetchError::Login("Login to Moodle unsuccessful!".into())),
        }
    }
}

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn inspect_course_page(body: &str) -> Result<CoursePage, FetchError> {
    let document = Html::parse_document(body);
    if document.select(&selector(".usermenu .login")).next().is_some() {
        return Ok(CoursePage::LoggedOut);
    }

    document
        .select(&selector(".course-content"))
        .next()
        .map(|element| CoursePage::Content(element.html()))
        .ok_or_else(|| FetchError::Parse("course content not found".into()))
}

fn login_token(body: &str) -> Result<String, FetchError> {
    let document = Html::parse_document(body);
    document
        .select(&selector(r#".loginsub [name="logintoken"]"#))
        .next()
        .and_then(|element| element.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| FetchError::Login("login token not found".into()))
}
