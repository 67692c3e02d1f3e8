//! The page-fetching seam and the HTTP implementation.
//!
//! A [`PageFetcher`] behaves like a single browser tab: one navigation at a
//! time, a current page whose content can be read, a scroll action that may
//! trigger more search requests, and a response subscription. Every response
//! the fetcher receives while subscribed is pushed into a [`ResponseSink`];
//! the owner of the matching [`ResponseCollector`] unsubscribes and then
//! drains, so responses that land late are still collected.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use tokio::sync::mpsc;

use crate::error::FetchError;

/// A network response observed while a page was loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub url: String,
    pub content_type: Option<String>,
    pub body: String,
}

pub type ResponseSink = mpsc::UnboundedSender<CapturedResponse>;

/// Browser-like page access. Methods take `&self`; implementations keep
/// their per-page state behind interior mutability.
#[allow(async_fn_in_trait)]
pub trait PageFetcher {
    /// Loads `url` as the current page.
    async fn navigate(&self, url: &str) -> Result<(), FetchError>;

    /// Advances the current page by one scroll step.
    async fn scroll(&self) -> Result<(), FetchError>;

    /// Returns the current page's content.
    async fn content(&self) -> Result<String, FetchError>;

    /// Starts forwarding every received response to `sink`.
    fn subscribe(&self, sink: ResponseSink);

    /// Stops forwarding and drops the sink.
    fn unsubscribe(&self);
}

/// Receiving half of a response subscription.
#[derive(Debug)]
pub struct ResponseCollector {
    rx: mpsc::UnboundedReceiver<CapturedResponse>,
}

impl ResponseCollector {
    #[must_use]
    pub fn new() -> (Self, ResponseSink) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, tx)
    }

    /// Receives until every sink has been dropped.
    pub async fn drain(mut self) -> Vec<CapturedResponse> {
        let mut responses = Vec::new();
        while let Some(response) = self.rx.recv().await {
            responses.push(response);
        }
        responses
    }
}

/// Accepts JSON responses whose URL contains one of the search-endpoint patterns.
#[derive(Debug, Clone)]
pub struct SearchEndpointMatcher {
    patterns: Vec<String>,
}

impl SearchEndpointMatcher {
    #[must_use]
    pub fn new(patterns: &[String]) -> Self {
        Self {
            patterns: patterns.to_vec(),
        }
    }

    #[must_use]
    pub fn matches(&self, response: &CapturedResponse) -> bool {
        let is_json = response
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
        is_json && self.patterns.iter().any(|p| response.url.contains(p.as_str()))
    }
}

#[derive(Debug, Default)]
struct PageState {
    current_url: Option<String>,
    page: u32,
    body: Option<String>,
    sink: Option<ResponseSink>,
}

/// [`PageFetcher`] over plain HTTP.
///
/// Scrolling is emulated by requesting the next page of the last search URL
/// through `scroll_page_param`; without one, scrolling is a no-op.
pub struct HttpPageFetcher {
    client: Client,
    timeout_secs: u64,
    scroll_page_param: Option<String>,
    state: Mutex<PageState>,
}

impl HttpPageFetcher {
    /// Creates a fetcher with the given per-request timeout and `User-Agent`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            timeout_secs,
            scroll_page_param: None,
            state: Mutex::new(PageState::default()),
        })
    }

    #[must_use]
    pub fn with_scroll_param(mut self, param: Option<String>) -> Self {
        self.scroll_page_param = param;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self, url: &str) -> Result<CapturedResponse, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_owned(),
                    timeout_secs: self.timeout_secs,
                }
            } else if e.is_builder() {
                FetchError::InvalidUrl {
                    url: url.to_owned(),
                    reason: e.to_string(),
                }
            } else {
                FetchError::Http(e)
            }
        })?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(FetchError::RateLimited {
                url: url.to_owned(),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_owned(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                FetchError::Http(e)
            }
        })?;

        Ok(CapturedResponse {
            url: url.to_owned(),
            content_type,
            body,
        })
    }

    fn forward(&self, response: &CapturedResponse) {
        let state = self.state();
        if let Some(sink) = &state.sink {
            if sink.send(response.clone()).is_err() {
                tracing::debug!(url = %response.url, "response collector already closed");
            }
        }
    }
}

impl PageFetcher for HttpPageFetcher {
    async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        let response = self.fetch(url).await?;
        self.forward(&response);
        let mut state = self.state();
        state.current_url = Some(url.to_owned());
        state.page = 1;
        state.body = Some(response.body);
        Ok(())
    }

    async fn scroll(&self) -> Result<(), FetchError> {
        let Some(param) = &self.scroll_page_param else {
            return Ok(());
        };
        let (current, next_page) = {
            let state = self.state();
            match &state.current_url {
                Some(url) => (url.clone(), state.page + 1),
                None => return Ok(()),
            }
        };

        let next_url = with_query_param(&current, param, &next_page.to_string())?;
        let response = self.fetch(&next_url).await?;
        self.forward(&response);
        self.state().page = next_page;
        Ok(())
    }

    async fn content(&self) -> Result<String, FetchError> {
        let state = self.state();
        match (&state.body, &state.current_url) {
            (Some(body), _) => Ok(body.clone()),
            (None, url) => Err(FetchError::Navigation {
                url: url.clone().unwrap_or_default(),
                reason: "no page has been loaded".to_owned(),
            }),
        }
    }

    fn subscribe(&self, sink: ResponseSink) {
        self.state().sink = Some(sink);
    }

    fn unsubscribe(&self) {
        self.state().sink = None;
    }
}

/// Returns `url` with `name` set to `value`, replacing any existing value.
fn with_query_param(url: &str, name: &str, value: &str) -> Result<String, FetchError> {
    let mut parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_owned(),
        reason: e.to_string(),
    })?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(name, value);
    Ok(parsed.to_string())
}
