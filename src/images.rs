use std::time::Duration;

use futures::stream::{self, StreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::{FetchConfig, DEFAULT_REJECT_PATTERNS};
use crate::item::NewsItem;
use crate::parser::{attribute, open_tags};

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp", ".gif"];

/// Page metadata fields holding a preview image, most preferred first.
const PREVIEW_FIELDS: &[&str] = &["og:image", "twitter:image"];

/// Discards image candidates that are not worth showing.
#[derive(Debug, Clone)]
pub struct RejectList {
    patterns: Vec<String>,
}

impl RejectList {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// True for absolute http(s) URLs free of every reject pattern.
    pub fn accepts(&self, candidate: &str) -> bool {
        let absolute = Url::parse(candidate)
            .map(|u| matches!(u.scheme(), "http" | "https") && u.has_host())
            .unwrap_or(false);
        if !absolute {
            return false;
        }

        let lower = candidate.to_lowercase();
        !self.patterns.iter().any(|p| lower.contains(p.as_str()))
    }
}

impl Default for RejectList {
    fn default() -> Self {
        Self::new(DEFAULT_REJECT_PATTERNS)
    }
}

type Strategy = fn(&str) -> Vec<String>;

/// Cheap extraction strategies, tried in order.
const INLINE_STRATEGIES: &[Strategy] = &[media_content, media_thumbnail, image_enclosure, img_tag];

fn media_content(markup: &str) -> Vec<String> {
    open_tags(markup, "media:content")
        .filter_map(|tag| attribute(tag, "url"))
        .filter(|url| has_image_extension(url))
        .collect()
}

fn media_thumbnail(markup: &str) -> Vec<String> {
    open_tags(markup, "media:thumbnail")
        .filter_map(|tag| attribute(tag, "url"))
        .collect()
}

fn image_enclosure(markup: &str) -> Vec<String> {
    open_tags(markup, "enclosure")
        .filter(|tag| {
            attribute(tag, "type").is_some_and(|t| t.to_ascii_lowercase().starts_with("image"))
        })
        .filter_map(|tag| attribute(tag, "url"))
        .collect()
}

fn img_tag(markup: &str) -> Vec<String> {
    open_tags(markup, "img")
        .filter_map(|tag| attribute(tag, "src"))
        .collect()
}

fn has_image_extension(candidate: &str) -> bool {
    let decoded = html_escape::decode_html_entities(candidate);
    Url::parse(&decoded)
        .map(|u| {
            let path = u.path().to_ascii_lowercase();
            IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
        })
        .unwrap_or(false)
}

fn normalize_candidate(candidate: &str) -> String {
    html_escape::decode_html_entities(candidate).trim().to_string()
}

/// Picks an image from a record block and its description markup.
///
/// Each strategy is tried in turn and the first candidate the reject list
/// accepts wins. The description is unescaped first so that entity-encoded
/// `<img>` tags are visible.
pub fn inline_image(block: &str, description: &str, reject: &RejectList) -> Option<String> {
    let description = html_escape::decode_html_entities(description);
    INLINE_STRATEGIES.iter().find_map(|strategy| {
        strategy(block)
            .into_iter()
            .chain(strategy(&description))
            .map(|candidate| normalize_candidate(&candidate))
            .find(|candidate| reject.accepts(candidate))
    })
}

/// Reads the preview image advertised by an HTML document head.
pub fn preview_image(html: &str, reject: &RejectList) -> Option<String> {
    PREVIEW_FIELDS.iter().find_map(|field| {
        open_tags(html, "meta")
            .filter(|tag| {
                ["property", "name"].iter().any(|key| {
                    attribute(tag, key).is_some_and(|v| v.trim().eq_ignore_ascii_case(field))
                })
            })
            .filter_map(|tag| attribute(tag, "content"))
            .map(|candidate| normalize_candidate(&candidate))
            .find(|candidate| reject.accepts(candidate))
    })
}

#[derive(Debug, Error)]
pub enum ImageFetchError {
    #[error("Not a fetchable link: {0}")]
    InvalidLink(String),
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
}

/// Network fallback for items whose payload carried no usable image.
pub struct ImageResolver {
    client: Client,
    timeout: Duration,
    max_bytes: usize,
    concurrency: usize,
    reject: RejectList,
}

impl ImageResolver {
    pub fn new(client: Client, settings: &FetchConfig) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(settings.image_timeout_secs),
            max_bytes: settings.image_max_bytes,
            concurrency: settings.fallback_concurrency.max(1),
            reject: RejectList::new(&settings.reject_patterns),
        }
    }

    /// Fetches the head of `link` and looks for a preview image in it.
    pub async fn fetch_preview_image(&self, link: &str) -> Result<Option<String>, ImageFetchError> {
        let url = Url::parse(link)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| ImageFetchError::InvalidLink(link.to_string()))?;

        let head = tokio::time::timeout(self.timeout, self.read_head(url))
            .await
            .map_err(|_| ImageFetchError::Timeout)??;

        Ok(preview_image(&String::from_utf8_lossy(&head), &self.reject))
    }

    async fn read_head(&self, url: Url) -> Result<Vec<u8>, ImageFetchError> {
        let mut response = self
            .client
            .get(url)
            .header(ACCEPT, "text/html")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageFetchError::HttpStatus(response.status().as_u16()));
        }

        // Preview metadata lives near the top of the document.
        let mut head = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            head.extend_from_slice(&chunk);
            if head.len() >= self.max_bytes {
                head.truncate(self.max_bytes);
                break;
            }
        }

        Ok(head)
    }

    /// Like [`fetch_preview_image`](Self::fetch_preview_image), but every
    /// failure becomes "no image".
    pub async fn resolve(&self, link: &str) -> Option<String> {
        match self.fetch_preview_image(link).await {
            Ok(image) => image,
            Err(e) => {
                debug!("Image fallback for {} failed: {}", link, e);
                None
            }
        }
    }

    /// Fills `image` on every item that lacks one, with at most
    /// `fallback_concurrency` page requests in flight. Returns how many
    /// items gained an image.
    pub async fn fill_missing(&self, items: &mut [NewsItem]) -> usize {
        let targets: Vec<(usize, String)> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.has_image())
            .map(|(idx, item)| (idx, item.link.clone()))
            .collect();

        if targets.is_empty() {
            return 0;
        }

        let wanted = targets.len();
        let resolved: Vec<(usize, Option<String>)> = stream::iter(targets)
            .map(|(idx, link)| async move { (idx, self.resolve(&link).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut filled = 0;
        for (idx, image) in resolved {
            if let Some(image) = image {
                items[idx].image = image;
                filled += 1;
            }
        }

        info!("Image fallback resolved {} of {} items", filled, wanted);
        filled
    }
}
