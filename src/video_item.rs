use serde::{Deserialize, Serialize};

/// A piece of content the host wants to play with ads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoItem {
    pub content_url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Content positions (seconds) where mid-roll breaks are requested.
    #[serde(default)]
    pub midroll_positions: Vec<f64>,
}

/// Targeting data handed to the ad session when it is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContentMetadata {
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Ad request options handed to the ad session when it is created.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestSettings {
    /// Empty means the ad session decides where linear breaks go.
    pub linear_playback_positions: Vec<f64>,
}

impl VideoItem {
    pub fn new(content_url: impl Into<String>) -> Self {
        VideoItem {
            content_url: content_url.into(),
            title: None,
            category: None,
            tags: Vec::new(),
            midroll_positions: Vec::new(),
        }
    }

    pub fn content_metadata(&self) -> ContentMetadata {
        ContentMetadata {
            category: self.category.clone(),
            tags: self.tags.clone(),
        }
    }

    pub fn request_settings(&self) -> RequestSettings {
        RequestSettings {
            linear_playback_positions: self.midroll_positions.clone(),
        }
    }
}
