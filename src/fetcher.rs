use std::time::Duration;

use futures::future::join_all;
use reqwest::header::ACCEPT;
use reqwest::Client;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ChannelConfig, FetchConfig, SourceConfig};
use crate::images::RejectList;
use crate::item::NewsItem;
use crate::parser::parse_source;

const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// Why a single source contributed nothing.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
}

/// Outcome of one source within a channel fetch.
#[derive(Debug)]
pub struct SourceReport {
    pub source: String,
    /// Number of items contributed, or the error that occurred
    pub result: Result<usize, FetchError>,
}

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<NewsItem>,
    pub reports: Vec<SourceReport>,
}

impl FetchOutcome {
    /// True when at least one source was attempted and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.reports.is_empty() && self.reports.iter().all(|r| r.result.is_err())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceReport> {
        self.reports.iter().filter(|r| r.result.is_err())
    }
}

pub fn build_client(settings: &FetchConfig) -> reqwest::Result<Client> {
    Client::builder().user_agent(&settings.user_agent).build()
}

pub struct Fetcher {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
    reject: RejectList,
}

impl Fetcher {
    pub fn new(client: Client, settings: &FetchConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(settings.source_timeout_secs),
            max_bytes: settings.max_source_bytes,
            reject: RejectList::new(&settings.reject_patterns),
        }
    }

    /// Fetches every source of `channel` concurrently and parses the results.
    ///
    /// Each source runs under its own timeout. A failing or slow source never
    /// delays or cancels its siblings; it is logged, reported, and otherwise
    /// contributes nothing. This never fails as a whole.
    pub async fn fetch_channel(&self, channel: &ChannelConfig) -> FetchOutcome {
        info!(
            "Fetching {} sources for channel '{}'",
            channel.sources.len(),
            channel.name
        );

        let attempts = channel.sources.iter().map(|source| async move {
            let result = self.fetch_source(source).await.map(|body| {
                parse_source(&body, source, channel.item_cap(source), &self.reject)
            });
            (source, result)
        });

        let mut outcome = FetchOutcome::default();
        for (source, result) in join_all(attempts).await {
            match result {
                Ok(items) => {
                    info!(
                        "Source '{}' ({}) contributed {} items",
                        source.name,
                        source.category,
                        items.len()
                    );
                    outcome.reports.push(SourceReport {
                        source: source.name.clone(),
                        result: Ok(items.len()),
                    });
                    outcome.items.extend(items);
                }
                Err(e) => {
                    warn!("Failed to fetch source '{}' ({}): {}", source.name, source.url, e);
                    outcome.reports.push(SourceReport {
                        source: source.name.clone(),
                        result: Err(e),
                    });
                }
            }
        }

        outcome
    }

    /// Downloads one source's payload within the configured timeout.
    pub async fn fetch_source(&self, source: &SourceConfig) -> Result<String, FetchError> {
        tokio::time::timeout(self.timeout, self.download(&source.url))
            .await
            .map_err(|_| FetchError::Timeout)?
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let mut response = self.client.get(url).header(ACCEPT, FEED_ACCEPT).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(FetchError::ResponseTooLarge);
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len().saturating_add(chunk.len()) > self.max_bytes {
                return Err(FetchError::ResponseTooLarge);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
