//! CMS REST client.
//!
//! The publish worker only depends on the [`CmsClient`] trait. The
//! production implementation, [`WordPressClient`], talks to the WordPress
//! REST API (`/wp-json/wp/v2`) with application-password basic auth.

mod guard;
mod wordpress;

use std::sync::Arc;

use async_trait::async_trait;
use seoflow_shared::{CmsConnection, Result};
use serde::{Deserialize, Serialize};

pub use wordpress::WordPressClient;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An uploaded media item.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Media {
    pub id: u64,
    #[serde(default)]
    pub source_url: Option<String>,
}

/// A downloaded binary asset (e.g. the hero image).
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub filename: String,
}

/// Body of a post/page creation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub status: String,
    pub slug: String,
    /// RFC 3339 publish time, interpreted as GMT by the CMS.
    #[serde(rename = "date_gmt", skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
}

/// A created post or page.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemotePost {
    pub id: u64,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Taxonomies the publish payload references by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taxonomy {
    Categories,
    Tags,
}

impl Taxonomy {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Categories => "categories",
            Self::Tags => "tags",
        }
    }
}

/// A category or tag.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Term {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub count: Option<u64>,
}

/// A registered post type and its REST collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostType {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub rest_base: Option<String>,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Authenticated CMS operations used by publishing.
#[async_trait]
pub trait CmsClient: Send + Sync {
    async fn upload_media(&self, bytes: Vec<u8>, filename: &str, mime: &str) -> Result<Media>;

    async fn set_media_alt_text(&self, media_id: u64, alt_text: &str) -> Result<()>;

    /// Download an external asset so it can be re-uploaded as media.
    async fn fetch_asset(&self, url: &str) -> Result<Asset>;

    /// Create a post in the collection `post_type` (e.g. `posts`, `pages`).
    async fn create_post(&self, post_type: &str, post: &NewPost) -> Result<RemotePost>;

    /// All terms of a taxonomy, following pagination.
    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<Term>>;

    async fn list_post_types(&self) -> Result<Vec<PostType>>;

    /// Cheap authenticated request that fails on bad credentials.
    async fn test_credentials(&self) -> Result<()>;
}

/// Builds a client for a project's connection.
pub trait CmsClientFactory: Send + Sync {
    fn client_for(&self, connection: &CmsConnection) -> Result<Arc<dyn CmsClient>>;
}

impl<F> CmsClientFactory for F
where
    F: Fn(&CmsConnection) -> Result<Arc<dyn CmsClient>> + Send + Sync,
{
    fn client_for(&self, connection: &CmsConnection) -> Result<Arc<dyn CmsClient>> {
        self(connection)
    }
}

/// Factory producing [`WordPressClient`]s with a fixed timeout.
#[derive(Debug, Clone, Copy)]
pub struct WordPressFactory {
    pub timeout_secs: u64,
}

impl CmsClientFactory for WordPressFactory {
    fn client_for(&self, connection: &CmsConnection) -> Result<Arc<dyn CmsClient>> {
        Ok(Arc::new(WordPressClient::new(connection, self.timeout_secs)?))
    }
}
