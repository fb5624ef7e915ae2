//! WordPress REST API client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, header};
use seoflow_shared::{CmsConnection, Result, SeoflowError};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};
use url::Url;

use crate::guard::{asset_filename, asset_redirect_policy, is_ssrf_target};
use crate::{Asset, CmsClient, Media, NewPost, PostType, RemotePost, Taxonomy, Term};

/// User-Agent string for CMS requests.
const USER_AGENT: &str = concat!("seoflow/", env!("CARGO_PKG_VERSION"));

/// Page size for collection listings (the REST API maximum).
const PER_PAGE: u32 = 100;

/// Hard stop for pagination in case the total-pages header lies.
const MAX_PAGES: u32 = 50;

/// Largest asset we are willing to re-upload (20 MB).
const MAX_ASSET_SIZE: u64 = 20 * 1024 * 1024;

/// Client for one WordPress site.
pub struct WordPressClient {
    client: Client,
    /// Separate client whose redirects are re-checked against the host guard.
    asset_client: Client,
    api_base: String,
    username: String,
    app_password: String,
    allow_private_hosts: bool,
    max_asset_size: u64,
}

impl WordPressClient {
    /// Build a client for the connection's site.
    ///
    /// `base_url` may be the site root or already point at `/wp-json/...`.
    pub fn new(connection: &CmsConnection, timeout_secs: u64) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(timeout)
            .build()
            .map_err(|e| SeoflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            asset_client: build_asset_client(timeout, false)?,
            api_base: api_base(&connection.base_url),
            username: connection.username.clone(),
            app_password: connection.app_password.clone(),
            allow_private_hosts: false,
            max_asset_size: MAX_ASSET_SIZE,
        })
    }

    /// Allow asset downloads from localhost/private IPs (mock servers).
    #[cfg(test)]
    pub(crate) fn allow_private_hosts(mut self) -> Self {
        self.allow_private_hosts = true;
        self.asset_client = build_asset_client(Duration::from_secs(5), true).expect("asset client");
        self
    }

    #[cfg(test)]
    pub(crate) fn with_max_asset_size(mut self, max: u64) -> Self {
        self.max_asset_size = max;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.app_password))
    }

    async fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| SeoflowError::Network(format!("{what}: {e}")))?;
        ensure_success(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, what: &str) -> Result<T> {
        let response = self.send(builder, what).await?;
        response
            .json()
            .await
            .map_err(|e| SeoflowError::Network(format!("{what}: unreadable response: {e}")))
    }
}

fn build_asset_client(timeout: Duration, allow_private_hosts: bool) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(asset_redirect_policy(allow_private_hosts))
        .timeout(timeout)
        .build()
        .map_err(|e| SeoflowError::Network(format!("failed to build HTTP client: {e}")))
}

/// REST root for a site URL.
fn api_base(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    if trimmed.contains("/wp-json") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/wp-json/wp/v2")
    }
}

/// Turn a non-2xx response into a `Cms` error with the raw body.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SeoflowError::Cms {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or("").to_string(),
        body,
    })
}

fn total_pages(response: &Response) -> u32 {
    response
        .headers()
        .get("x-wp-totalpages")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(1)
}

#[async_trait]
impl CmsClient for WordPressClient {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_media(&self, bytes: Vec<u8>, filename: &str, mime: &str) -> Result<Media> {
        let disposition = format!(
            "attachment; filename=\"{}\"",
            filename.replace(['"', '\\', '\r', '\n'], "_")
        );
        let builder = self
            .client
            .post(self.endpoint("media"))
            .header(header::CONTENT_TYPE, mime)
            .header(header::CONTENT_DISPOSITION, disposition)
            .body(bytes);

        let media: Media = self.send_json(builder, "upload media").await?;
        info!(media_id = media.id, "media uploaded");
        Ok(media)
    }

    async fn set_media_alt_text(&self, media_id: u64, alt_text: &str) -> Result<()> {
        let builder = self
            .client
            .post(self.endpoint(&format!("media/{media_id}")))
            .json(&serde_json::json!({ "alt_text": alt_text }));
        self.send(builder, "set media alt text").await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fetch_asset(&self, url: &str) -> Result<Asset> {
        let parsed = Url::parse(url)
            .map_err(|e| SeoflowError::validation(format!("invalid asset URL {url:?}: {e}")))?;
        if !self.allow_private_hosts && is_ssrf_target(&parsed) {
            return Err(SeoflowError::validation(format!(
                "refusing to download asset from {url}"
            )));
        }

        // Assets live outside the CMS, so no credentials are attached.
        let response = self
            .asset_client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| SeoflowError::Network(format!("{url}: {e}")))?;
        let mut response = ensure_success(response).await?;

        let max = self.max_asset_size;
        let too_large = |len: u64| {
            SeoflowError::validation(format!("{url}: asset too large ({len} bytes, max {max})"))
        };
        if let Some(len) = response.content_length() {
            if len > max {
                return Err(too_large(len));
            }
        }

        let mime = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        // Content-Length is optional (chunked bodies), so the cap is also
        // enforced while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| SeoflowError::Network(format!("{url}: body read failed: {e}")))?
        {
            let len = (bytes.len() + chunk.len()) as u64;
            if len > max {
                return Err(too_large(len));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(size = bytes.len(), %mime, "asset downloaded");
        Ok(Asset {
            filename: asset_filename(&parsed, &mime),
            bytes,
            mime,
        })
    }

    #[instrument(skip(self, post), fields(slug = %post.slug))]
    async fn create_post(&self, post_type: &str, post: &NewPost) -> Result<RemotePost> {
        let builder = self.client.post(self.endpoint(post_type)).json(post);
        let remote: RemotePost = self.send_json(builder, "create post").await?;
        info!(post_id = remote.id, "post created");
        Ok(remote)
    }

    async fn list_terms(&self, taxonomy: Taxonomy) -> Result<Vec<Term>> {
        let mut terms = Vec::new();
        let mut page = 1;

        loop {
            let builder = self
                .client
                .get(self.endpoint(taxonomy.path()))
                .query(&[("per_page", PER_PAGE), ("page", page)]);
            let response = self.send(builder, taxonomy.path()).await?;
            let pages = total_pages(&response).min(MAX_PAGES);

            let batch: Vec<Term> = response.json().await.map_err(|e| {
                SeoflowError::Network(format!("{}: unreadable response: {e}", taxonomy.path()))
            })?;
            debug!(page, pages, count = batch.len(), "fetched terms page");
            terms.extend(batch);

            if page >= pages {
                break;
            }
            page += 1;
        }
        Ok(terms)
    }

    async fn list_post_types(&self) -> Result<Vec<PostType>> {
        let builder = self.client.get(self.endpoint("types"));
        let types: BTreeMap<String, PostType> = self.send_json(builder, "types").await?;
        Ok(types.into_values().collect())
    }

    async fn test_credentials(&self) -> Result<()> {
        let builder = self
            .client
            .get(self.endpoint("posts"))
            .query(&[("per_page", 1)]);
        self.send(builder, "test credentials").await?;
        Ok(())
    }
}
