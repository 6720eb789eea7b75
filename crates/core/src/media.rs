//! Mapping from stable image identifiers to CDN URLs.
//!
//! The projector stores only the resolved primary URL; size variants are the
//! media collaborator's concern.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSize {
    Thumbnail,
    Card,
    Hero,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumbnail => "thumbnail",
            Self::Card => "card",
            Self::Hero => "hero",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "thumbnail" => Some(Self::Thumbnail),
            "card" => Some(Self::Card),
            "hero" => Some(Self::Hero),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUrls {
    pub thumbnail: String,
    pub card: String,
    pub hero: String,
}

impl MediaUrls {
    pub fn get(&self, size: ImageSize) -> &str {
        match size {
            ImageSize::Thumbnail => &self.thumbnail,
            ImageSize::Card => &self.card,
            ImageSize::Hero => &self.hero,
        }
    }
}

pub trait MediaResolver: Send + Sync {
    fn resolve(&self, image_id: &str) -> Option<MediaUrls>;

    fn primary_url(&self, image_id: &str) -> Option<String>;
}

#[derive(Clone, Debug)]
pub struct CdnMediaResolver {
    base_url: String,
    primary_size: ImageSize,
}

impl CdnMediaResolver {
    pub fn new(base_url: impl Into<String>, primary_size: ImageSize) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, primary_size }
    }

    fn url(&self, image_id: &str, size: ImageSize) -> String {
        format!("{}/{}/{}", self.base_url, image_id, size.as_str())
    }
}

impl MediaResolver for CdnMediaResolver {
    fn resolve(&self, image_id: &str) -> Option<MediaUrls> {
        let image_id = image_id.trim();
        if image_id.is_empty() {
            return None;
        }

        Some(MediaUrls {
            thumbnail: self.url(image_id, ImageSize::Thumbnail),
            card: self.url(image_id, ImageSize::Card),
            hero: self.url(image_id, ImageSize::Hero),
        })
    }

    fn primary_url(&self, image_id: &str) -> Option<String> {
        self.resolve(image_id).map(|urls| urls.get(self.primary_size).to_string())
    }
}
