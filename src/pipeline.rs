use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{ChannelConfig, FetchConfig};
use crate::fetcher::{build_client, Fetcher};
use crate::images::ImageResolver;
use crate::item::NewsItem;
use crate::selector::select;

/// Response body of one digest run.
///
/// `error` is only present when nothing could be fetched at all; partial
/// failures still produce a plain `{ "news": [...] }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub news: Vec<NewsItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Digest {
    pub fn ok(news: Vec<NewsItem>) -> Self {
        Self { news, error: None }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            news: Vec::new(),
            error: Some(reason.into()),
        }
    }
}

/// Fetch, select and enrich. Holds no state between runs.
pub struct Pipeline {
    fetcher: Fetcher,
    images: ImageResolver,
}

impl Pipeline {
    pub fn new(settings: &FetchConfig) -> anyhow::Result<Self> {
        let client = build_client(settings)?;
        Ok(Self {
            fetcher: Fetcher::new(client.clone(), settings),
            images: ImageResolver::new(client, settings),
        })
    }

    pub async fn run(&self, channel: &ChannelConfig) -> Digest {
        if channel.sources.is_empty() {
            warn!("Channel '{}' has no sources configured", channel.name);
            return Digest::failed("no sources configured");
        }

        let outcome = self.fetcher.fetch_channel(channel).await;
        if outcome.all_failed() {
            error!(
                "All {} sources of channel '{}' failed",
                outcome.reports.len(),
                channel.name
            );
            return Digest::failed(format!(
                "all {} sources are currently unavailable",
                outcome.reports.len()
            ));
        }

        let collected = outcome.items.len();
        let failed = outcome.failures().count();
        let mut news = select(outcome.items, channel.per_category_cap);
        if let Some(max) = channel.max_results {
            news.truncate(max);
        }

        // Only items that made the cut are worth a page fetch.
        self.images.fill_missing(&mut news).await;

        info!(
            "Channel '{}': {} items collected, {} returned, {} sources failed",
            channel.name,
            collected,
            news.len(),
            failed
        );

        Digest::ok(news)
    }
}
