use serde::{Deserialize, Serialize};

use crate::config::Category;

/// Fields pulled out of one record block before filtering.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawItem {
    pub title: String,
    pub link: String,
    /// Free-form timestamp exactly as the source wrote it, possibly empty
    pub published_at: String,
    /// Cleaned, untruncated summary text
    pub summary: String,
    pub inline_image: Option<String>,
}

/// One entry of a digest response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub published_at: String,
    pub source: String,
    pub summary: String,
    pub category: Category,
    /// Empty when no usable image was found
    pub image: String,
}

impl NewsItem {
    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }
}
