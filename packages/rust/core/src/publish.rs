//! Publish job service: enqueue, retry, and inspect CMS publish jobs.
//!
//! A job's payload is derived once, at enqueue time, from the draft, its
//! hero image, and the project's CMS connection. The worker only replays
//! that payload against the CMS.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use seoflow_cms::NewPost;
use seoflow_markup::slugify;
use seoflow_shared::{
    CmsConfig, CmsConnection, Draft, HeroImageAsset, JobStatus, PublishJob, Result, SeoflowError,
    new_id,
};
use seoflow_storage::{JobFilter, Storage};

/// Default page size for [`PublishService::list`].
pub const DEFAULT_LIST_LIMIT: u32 = 20;
/// Largest page size for [`PublishService::list`].
pub const MAX_LIST_LIMIT: u32 = 100;

/// Post statuses a caller may force through overrides.
const ALLOWED_STATUSES: [&str; 5] = ["publish", "future", "draft", "pending", "private"];

// ---------------------------------------------------------------------------
// Connection resolution
// ---------------------------------------------------------------------------

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Finds the CMS connection for a project: configuration first, then the
/// connection stored for the project.
#[derive(Clone)]
pub struct ConnectionResolver {
    config: CmsConfig,
    storage: Arc<Storage>,
    lookup: EnvLookup,
}

impl ConnectionResolver {
    /// Resolver reading secrets from the process environment.
    pub fn new(config: CmsConfig, storage: Arc<Storage>) -> Self {
        Self::with_lookup(config, storage, |key| std::env::var(key).ok())
    }

    pub fn with_lookup(
        config: CmsConfig,
        storage: Arc<Storage>,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            storage,
            lookup: Arc::new(lookup),
        }
    }

    /// Resolve the connection for `project_id`.
    ///
    /// Without a project only the configured connection can apply.
    pub async fn resolve(&self, project_id: Option<&str>) -> Result<CmsConnection> {
        if let Some(conn) = self
            .config
            .connection(project_id.unwrap_or_default(), |k| (self.lookup)(k))
        {
            debug!(source = "config", "CMS connection resolved");
            return Ok(conn);
        }

        if let Some(project_id) = project_id {
            if let Some(conn) = self.storage.get_cms_connection(project_id).await? {
                debug!(source = "storage", project_id, "CMS connection resolved");
                return Ok(conn);
            }
        }

        Err(SeoflowError::IntegrationNotConfigured {
            message: format!(
                "no CMS connection for project {}; set [cms] base_url, username and ${} or store a connection",
                project_id.unwrap_or("<unknown>"),
                self.config.app_password_env
            ),
        })
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Caller overrides applied on top of the derived payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishOverrides {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub category_ids: Option<Vec<u64>>,
    #[serde(default)]
    pub tag_ids: Option<Vec<u64>>,
}

/// Everything the worker needs to create the remote post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    pub post_type: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub slug: String,
    pub status: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub categories: Vec<u64>,
    #[serde(default)]
    pub tags: Vec<u64>,
    pub featured_image_url: String,
    #[serde(default)]
    pub featured_image_alt: Option<String>,
}

impl PublishPayload {
    /// Request body for the CMS, with the uploaded hero image attached.
    pub fn to_new_post(&self, featured_media: Option<u64>) -> NewPost {
        NewPost {
            title: self.title.clone(),
            content: self.content.clone(),
            excerpt: self.excerpt.clone(),
            status: self.status.clone(),
            slug: self.slug.clone(),
            date: Some(self.date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            categories: self.categories.clone(),
            tags: self.tags.clone(),
            featured_media,
        }
    }
}

/// Derive the publish payload. Pure: same inputs, same payload.
pub fn derive_payload(
    draft: &Draft,
    hero: &HeroImageAsset,
    connection: &CmsConnection,
    publish_at: DateTime<Utc>,
    now: DateTime<Utc>,
    overrides: Option<&PublishOverrides>,
) -> Result<PublishPayload> {
    let (post_type, categories, tags) = connection.target_for(draft.content_type);

    let slug = match slugify(&draft.title) {
        s if s.is_empty() => fallback_slug(&draft.id),
        s => s,
    };
    let status = if publish_at > now { "future" } else { "publish" };

    let mut payload = PublishPayload {
        post_type: post_type.to_string(),
        title: draft.title.trim().to_string(),
        content: draft.body.clone(),
        excerpt: draft.summary.clone(),
        slug,
        status: status.to_string(),
        date: publish_at,
        categories: categories.to_vec(),
        tags: tags.to_vec(),
        featured_image_url: hero.url.clone(),
        featured_image_alt: hero.alt_text.clone(),
    };

    let Some(overrides) = overrides else {
        return Ok(payload);
    };
    if let Some(status) = overrides.status.as_deref().map(str::trim) {
        if !ALLOWED_STATUSES.contains(&status) {
            return Err(SeoflowError::validation(format!(
                "unsupported post status {status:?} (expected one of {})",
                ALLOWED_STATUSES.join(", ")
            )));
        }
        payload.status = status.to_string();
    }
    if let Some(slug) = overrides.slug.as_deref() {
        let slug = slugify(slug);
        if slug.is_empty() {
            return Err(SeoflowError::validation("slug override is empty after normalization"));
        }
        payload.slug = slug;
    }
    if let Some(ids) = &overrides.category_ids {
        payload.categories = ids.clone();
    }
    if let Some(ids) = &overrides.tag_ids {
        payload.tags = ids.clone();
    }
    Ok(payload)
}

fn fallback_slug(draft_id: &str) -> String {
    let compact: String = draft_id.chars().filter(char::is_ascii_alphanumeric).collect();
    let start = compact.len().saturating_sub(12);
    format!("post-{}", compact[start..].to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Input of [`PublishService::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueRequest {
    pub draft_id: String,
    /// Defaults to the draft's idea.
    pub idea_id: Option<String>,
    pub user_id: String,
    /// Defaults to now (publish immediately).
    pub publish_at: Option<DateTime<Utc>>,
    pub overrides: Option<PublishOverrides>,
}

pub struct PublishService {
    storage: Arc<Storage>,
    resolver: ConnectionResolver,
}

impl PublishService {
    pub fn new(storage: Arc<Storage>, resolver: ConnectionResolver) -> Self {
        Self { storage, resolver }
    }

    /// Queue a draft for publishing, or reschedule its queued job.
    #[instrument(skip_all, fields(draft_id = %request.draft_id))]
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<PublishJob> {
        let draft = self.storage.get_draft(&request.draft_id).await?;
        let connection = self
            .resolver
            .resolve(draft.as_ref().map(|d| d.project_id.as_str()))
            .await?;
        let draft = draft.ok_or_else(|| SeoflowError::not_found("draft", &request.draft_id))?;

        if draft.title.trim().is_empty() {
            return Err(SeoflowError::DraftIncomplete {
                draft_id: draft.id.clone(),
                missing: "title",
            });
        }
        if draft.body.trim().is_empty() {
            return Err(SeoflowError::DraftIncomplete {
                draft_id: draft.id.clone(),
                missing: "body",
            });
        }
        let hero = self
            .storage
            .get_hero_image(&draft.id)
            .await?
            .ok_or_else(|| SeoflowError::MissingHeroImage {
                draft_id: draft.id.clone(),
            })?;

        let now = Utc::now();
        let publish_at = request.publish_at.unwrap_or(now);
        let payload = derive_payload(
            &draft,
            &hero,
            &connection,
            publish_at,
            now,
            request.overrides.as_ref(),
        )?;
        let payload_json = serde_json::to_value(&payload)
            .map_err(|e| SeoflowError::Storage(format!("payload serialization failed: {e}")))?;
        let idea_id = request.idea_id.clone().or_else(|| Some(draft.idea_id.clone()));

        if let Some(active) = self.storage.find_active_job_for_draft(&draft.id).await? {
            return self
                .reschedule(active, &request, idea_id.as_deref(), &payload_json)
                .await;
        }

        let job = PublishJob {
            id: new_id(),
            draft_id: draft.id.clone(),
            idea_id,
            project_id: draft.project_id.clone(),
            hypothesis_id: draft.hypothesis_id.clone(),
            target_site: connection.target_site.clone(),
            status: JobStatus::Queued,
            publish_at,
            payload: payload_json,
            error: None,
            message: format!("Queued by {}", request.user_id),
            started_at: None,
            finished_at: None,
            remote_post_id: None,
            remote_url: None,
            created_by: request.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_publish_job(&job).await?;

        info!(job_id = %job.id, status = %payload.status, %publish_at, "publish job queued");
        Ok(job)
    }

    /// Only a queued job with an explicit new time is rescheduled.
    async fn reschedule(
        &self,
        active: PublishJob,
        request: &EnqueueRequest,
        idea_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<PublishJob> {
        let duplicate = || SeoflowError::DuplicateJob {
            draft_id: active.draft_id.clone(),
            job_id: active.id.clone(),
        };

        let Some(publish_at) = request.publish_at else {
            return Err(duplicate());
        };
        // Only queued jobs move, even with an explicit `publish_at`. A
        // publishing job may already have a remote post.
        if active.status != JobStatus::Queued {
            return Err(duplicate());
        }

        let message = format!(
            "Rescheduled by {} for {}",
            request.user_id,
            publish_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        if !self
            .storage
            .refresh_queued_job(&active.id, idea_id, &publish_at, payload, &message)
            .await?
        {
            // Claimed by a worker after we looked.
            return Err(duplicate());
        }

        info!(job_id = %active.id, %publish_at, "publish job rescheduled");
        self.get(&active.id).await
    }

    /// Put a finished job back in the queue.
    #[instrument(skip_all, fields(job_id = %job_id))]
    pub async fn retry(&self, job_id: &str, user_id: &str) -> Result<PublishJob> {
        let job = self.get(job_id).await?;
        if job.status == JobStatus::Publishing {
            return Err(SeoflowError::JobInFlight {
                job_id: job.id,
            });
        }

        let message = format!("Retried by {user_id}");
        if !self.storage.reset_job_for_retry(job_id, &message).await? {
            return Err(SeoflowError::JobInFlight {
                job_id: job_id.to_string(),
            });
        }

        info!(job_id, from = %job.status, "publish job requeued");
        self.get(job_id).await
    }

    /// Jobs newest first. The limit is clamped to `1..=100`.
    pub async fn list(
        &self,
        project_id: Option<String>,
        hypothesis_id: Option<String>,
        limit: Option<u32>,
    ) -> Result<Vec<PublishJob>> {
        let filter = JobFilter {
            project_id,
            hypothesis_id,
            limit: clamp_limit(limit),
        };
        self.storage.list_publish_jobs(&filter).await
    }

    pub async fn get(&self, job_id: &str) -> Result<PublishJob> {
        self.storage
            .get_publish_job(job_id)
            .await?
            .ok_or_else(|| SeoflowError::not_found("publish job", job_id))
    }
}

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{connection, seed_draft, temp_storage};
    use chrono::{Duration, TimeZone};
    use seoflow_shared::ContentType;

    fn configured() -> CmsConfig {
        CmsConfig {
            base_url: Some("https://cms.example.test/".into()),
            username: Some("bot".into()),
            ..Default::default()
        }
    }

    fn password(key: &str) -> Option<String> {
        (key == "SEOFLOW_CMS_APP_PASSWORD").then(|| "pw".to_string())
    }

    async fn service_with_connection() -> (PublishService, Arc<Storage>) {
        let storage = temp_storage().await;
        let resolver = ConnectionResolver::with_lookup(configured(), storage.clone(), password);
        (PublishService::new(storage.clone(), resolver), storage)
    }

    async fn publishable_draft(storage: &Storage, content_type: ContentType) -> Draft {
        let draft = seed_draft(storage, content_type).await;
        storage
            .upsert_hero_image(&HeroImageAsset::new(
                "D1",
                "https://cdn.invoicer.test/hero.png",
                Some("Invoice on a desk".into()),
            ))
            .await
            .unwrap();
        draft
    }

    fn request(publish_at: Option<DateTime<Utc>>) -> EnqueueRequest {
        EnqueueRequest {
            draft_id: "D1".into(),
            user_id: "U1".into(),
            publish_at,
            ..Default::default()
        }
    }

    fn hero() -> HeroImageAsset {
        HeroImageAsset::new("D1", "https://cdn.test/h.png", None)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 11, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn payload_follows_content_type() {
        let storage = temp_storage().await;
        let mut draft = seed_draft(&storage, ContentType::Article).await;
        let conn = connection();

        let article = derive_payload(&draft, &hero(), &conn, at(9), at(8), None).unwrap();
        assert_eq!(article.post_type, "posts");
        assert_eq!(article.categories, [3]);
        assert_eq!(article.tags, [5, 8]);
        assert_eq!(article.status, "future");
        assert_eq!(article.slug, "why-freelancers-get-paid-late");
        assert_eq!(article.excerpt, draft.summary);

        draft.content_type = ContentType::LandingPage;
        let page = derive_payload(&draft, &hero(), &conn, at(8), at(9), None).unwrap();
        assert_eq!(page.post_type, "pages");
        assert!(page.categories.is_empty());
        assert_eq!(page.status, "publish");

        let again = derive_payload(&draft, &hero(), &conn, at(8), at(9), None).unwrap();
        assert_eq!(page, again);
    }

    #[tokio::test]
    async fn overrides_and_slug_fallback() {
        let storage = temp_storage().await;
        let mut draft = seed_draft(&storage, ContentType::Article).await;
        draft.title = "日本語のタイトル".into();
        draft.id = "0192f0a4-7b3c-7def-8a12-3456789abcde".into();

        let payload = derive_payload(&draft, &hero(), &connection(), at(9), at(9), None).unwrap();
        assert_eq!(payload.slug, "post-3456789abcde");

        let overrides = PublishOverrides {
            status: Some("draft".into()),
            slug: Some("Custom Slug".into()),
            category_ids: Some(vec![]),
            tag_ids: Some(vec![42]),
        };
        let payload =
            derive_payload(&draft, &hero(), &connection(), at(9), at(9), Some(&overrides)).unwrap();
        assert_eq!(payload.status, "draft");
        assert_eq!(payload.slug, "custom-slug");
        assert!(payload.categories.is_empty());
        assert_eq!(payload.tags, [42]);

        let bad = PublishOverrides {
            status: Some("live".into()),
            ..Default::default()
        };
        assert!(matches!(
            derive_payload(&draft, &hero(), &connection(), at(9), at(9), Some(&bad)),
            Err(SeoflowError::Validation { .. })
        ));
    }

    #[test]
    fn new_post_carries_gmt_date() {
        let payload = PublishPayload {
            post_type: "posts".into(),
            title: "T".into(),
            content: "<p>x</p>".into(),
            excerpt: "e".into(),
            slug: "t".into(),
            status: "future".into(),
            date: at(9),
            categories: vec![1],
            tags: vec![],
            featured_image_url: "https://cdn.test/h.png".into(),
            featured_image_alt: None,
        };
        let post = payload.to_new_post(Some(7));
        assert_eq!(post.date.as_deref(), Some("2026-11-01T09:00:00Z"));
        assert_eq!(post.featured_media, Some(7));
    }

    #[tokio::test]
    async fn missing_connection_is_reported_first() {
        let storage = temp_storage().await;
        let resolver = ConnectionResolver::with_lookup(CmsConfig::default(), storage.clone(), |_| None);
        let service = PublishService::new(storage, resolver);

        let err = service.enqueue(request(None)).await.unwrap_err();
        assert!(matches!(err, SeoflowError::IntegrationNotConfigured { .. }));
    }

    #[tokio::test]
    async fn configured_connection_wins_over_stored() {
        let storage = temp_storage().await;
        storage.upsert_cms_connection(&connection()).await.unwrap();

        let resolver = ConnectionResolver::with_lookup(configured(), storage.clone(), password);
        let conn = resolver.resolve(Some("P1")).await.unwrap();
        assert_eq!(conn.base_url, "https://cms.example.test");
        assert_eq!(conn.username, "bot");

        let resolver = ConnectionResolver::with_lookup(configured(), storage.clone(), |_| None);
        let conn = resolver.resolve(Some("P1")).await.unwrap();
        assert_eq!(conn.base_url, "https://blog.invoicer.test");

        let err = resolver.resolve(Some("P2")).await.unwrap_err();
        assert!(matches!(err, SeoflowError::IntegrationNotConfigured { .. }));
    }

    #[tokio::test]
    async fn stored_connection_drives_the_payload() {
        let storage = temp_storage().await;
        storage.upsert_cms_connection(&connection()).await.unwrap();
        publishable_draft(&storage, ContentType::Article).await;
        let resolver = ConnectionResolver::with_lookup(CmsConfig::default(), storage.clone(), |_| None);
        let service = PublishService::new(storage, resolver);

        let job = service.enqueue(request(None)).await.unwrap();
        assert_eq!(job.payload["post_type"], "posts");
        assert_eq!(job.payload["categories"], serde_json::json!([3]));
        assert_eq!(job.payload["featured_image_alt"], "Invoice on a desk");
        assert_eq!(job.target_site, "wordpress");
    }

    #[tokio::test]
    async fn preconditions_in_order() {
        let (service, storage) = service_with_connection().await;

        let err = service.enqueue(request(None)).await.unwrap_err();
        assert!(matches!(err, SeoflowError::NotFound { entity: "draft", .. }));

        seed_draft(&storage, ContentType::Article).await;
        let err = service.enqueue(request(None)).await.unwrap_err();
        assert!(matches!(err, SeoflowError::MissingHeroImage { .. }));

        storage.replace_draft_content("D1", "  ", "s").await.unwrap();
        let err = service.enqueue(request(None)).await.unwrap_err();
        assert!(matches!(err, SeoflowError::DraftIncomplete { missing: "body", .. }));
    }

    #[tokio::test]
    async fn duplicate_enqueue_without_time_is_rejected() {
        let (service, storage) = service_with_connection().await;
        publishable_draft(&storage, ContentType::Article).await;

        let first = service.enqueue(request(None)).await.unwrap();
        assert_eq!(first.status, JobStatus::Queued);
        assert_eq!(first.idea_id.as_deref(), Some("I1"));
        assert_eq!(first.payload["status"], "publish");

        let err = service.enqueue(request(None)).await.unwrap_err();
        match err {
            SeoflowError::DuplicateJob { job_id, .. } => assert_eq!(job_id, first.id),
            other => panic!("expected DuplicateJob, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn enqueue_with_time_reschedules_same_job() {
        let (service, storage) = service_with_connection().await;
        publishable_draft(&storage, ContentType::Article).await;

        let first = service.enqueue(request(None)).await.unwrap();
        let later = Utc::now() + Duration::days(3);
        let second = service.enqueue(request(Some(later))).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.status, JobStatus::Queued);
        assert_eq!(second.publish_at.timestamp(), later.timestamp());
        assert_eq!(second.payload["status"], "future");
        assert!(second.message.starts_with("Rescheduled by U1"));
        assert_eq!(service.list(None, None, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publishing_job_is_never_rescheduled() {
        let (service, storage) = service_with_connection().await;
        publishable_draft(&storage, ContentType::Article).await;

        let first = service.enqueue(request(None)).await.unwrap();
        storage
            .claim_next_job(&Utc::now(), Duration::minutes(15))
            .await
            .unwrap()
            .unwrap();

        let err = service
            .enqueue(request(Some(Utc::now() + Duration::hours(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, SeoflowError::DuplicateJob { .. }));

        let err = service.retry(&first.id, "U2").await.unwrap_err();
        assert!(matches!(err, SeoflowError::JobInFlight { .. }));
    }

    #[tokio::test]
    async fn retry_requeues_failed_job() {
        let (service, storage) = service_with_connection().await;
        publishable_draft(&storage, ContentType::Article).await;

        let job = service.enqueue(request(None)).await.unwrap();
        storage
            .claim_next_job(&Utc::now(), Duration::minutes(15))
            .await
            .unwrap()
            .unwrap();
        storage.mark_job_failed(&job.id, "HTTP 500").await.unwrap();

        let retried = service.retry(&job.id, "U2").await.unwrap();
        assert_eq!(retried.status, JobStatus::Queued);
        assert_eq!(retried.message, "Retried by U2");
        assert!(retried.error.is_none());
        assert!(retried.started_at.is_none());
        assert!(retried.finished_at.is_none());

        let err = service.retry("nope", "U2").await.unwrap_err();
        assert!(matches!(err, SeoflowError::NotFound { .. }));
    }

    #[test]
    fn list_limit_is_clamped() {
        assert_eq!(clamp_limit(None), 20);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(500)), 100);
        assert_eq!(clamp_limit(Some(35)), 35);
    }
}
