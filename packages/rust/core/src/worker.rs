//! Publish worker: drains due jobs from the queue into the CMS.
//!
//! One job is processed at a time. A job is claimed with a conditional
//! update, so two workers never publish the same job, and a failed job
//! stays failed until someone retries it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, instrument, warn};

use seoflow_cms::{CmsClientFactory, RemotePost};
use seoflow_shared::{PublishJob, Result, SeoflowError};
use seoflow_storage::Storage;

use crate::publish::{ConnectionResolver, PublishPayload};

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// The job queue as seen by the worker.
#[async_trait]
pub trait PublishQueue: Send + Sync {
    /// Move the oldest due job to `publishing` and return it. Jobs left in
    /// `publishing` by a dead worker become due again.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<PublishJob>>;

    async fn mark_published(
        &self,
        job_id: &str,
        remote_post_id: u64,
        remote_url: Option<&str>,
    ) -> Result<bool>;

    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<bool>;
}

/// Seconds a claimed job may stay in `publishing` before another worker
/// takes it over.
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 15 * 60;

/// [`PublishQueue`] over the local database.
///
/// Delivery is at-least-once: a job whose worker died mid-publish is claimed
/// again once its lease expires.
pub struct StorageQueue {
    storage: Arc<Storage>,
    lease: Duration,
}

impl StorageQueue {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            lease: Duration::seconds(DEFAULT_CLAIM_LEASE_SECS),
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

#[async_trait]
impl PublishQueue for StorageQueue {
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<PublishJob>> {
        self.storage.claim_next_job(&now, self.lease).await
    }

    async fn mark_published(
        &self,
        job_id: &str,
        remote_post_id: u64,
        remote_url: Option<&str>,
    ) -> Result<bool> {
        self.storage
            .mark_job_published(job_id, remote_post_id, remote_url)
            .await
    }

    async fn mark_failed(&self, job_id: &str, error: &str) -> Result<bool> {
        self.storage.mark_job_failed(job_id, error).await
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Result of processing one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Published {
        job_id: String,
        remote_post_id: u64,
        remote_url: Option<String>,
    },
    Failed {
        job_id: String,
        error: String,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Published { job_id, .. } | Self::Failed { job_id, .. } => job_id,
        }
    }
}

/// Progress callbacks for interactive front ends.
pub trait ProgressReporter: Send + Sync {
    fn job_started(&self, job: &PublishJob);
    fn step(&self, job_id: &str, step: &str);
    fn job_finished(&self, outcome: &JobOutcome);
}

/// Reports nothing.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn job_started(&self, _job: &PublishJob) {}
    fn step(&self, _job_id: &str, _step: &str) {}
    fn job_finished(&self, _outcome: &JobOutcome) {}
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct PublishWorker {
    queue: Arc<dyn PublishQueue>,
    resolver: ConnectionResolver,
    clients: Arc<dyn CmsClientFactory>,
    progress: Arc<dyn ProgressReporter>,
}

impl PublishWorker {
    pub fn new(
        queue: Arc<dyn PublishQueue>,
        resolver: ConnectionResolver,
        clients: Arc<dyn CmsClientFactory>,
    ) -> Self {
        Self {
            queue,
            resolver,
            clients,
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Process at most one due job. `None` when nothing is due.
    ///
    /// Publishing failures are recorded on the job, not returned; only
    /// queue (storage) failures surface as errors.
    pub async fn run_once(&self) -> Result<Option<JobOutcome>> {
        let Some(job) = self.queue.claim_next(Utc::now()).await? else {
            return Ok(None);
        };
        self.progress.job_started(&job);

        let outcome = match self.publish(&job).await {
            Ok(post) => {
                if !self
                    .queue
                    .mark_published(&job.id, post.id, post.link.as_deref())
                    .await?
                {
                    warn!(job_id = %job.id, "job left publishing before it was marked published");
                }
                info!(job_id = %job.id, remote_post_id = post.id, "job published");
                JobOutcome::Published {
                    job_id: job.id.clone(),
                    remote_post_id: post.id,
                    remote_url: post.link,
                }
            }
            Err(e) => {
                let error = e.to_string();
                if !self.queue.mark_failed(&job.id, &error).await? {
                    warn!(job_id = %job.id, "job left publishing before it was marked failed");
                }
                warn!(job_id = %job.id, kind = ?e.kind(), error = %error, "job failed");
                JobOutcome::Failed {
                    job_id: job.id.clone(),
                    error,
                }
            }
        };

        self.progress.job_finished(&outcome);
        Ok(Some(outcome))
    }

    /// Process due jobs until none is left or `max_jobs` were handled.
    pub async fn run_until_idle(&self, max_jobs: Option<usize>) -> Result<Vec<JobOutcome>> {
        let mut outcomes = Vec::new();
        while max_jobs.is_none_or(|max| outcomes.len() < max) {
            match self.run_once().await? {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        Ok(outcomes)
    }

    #[instrument(skip_all, fields(job_id = %job.id, draft_id = %job.draft_id))]
    async fn publish(&self, job: &PublishJob) -> Result<RemotePost> {
        let payload: PublishPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| SeoflowError::validation(format!("job payload is malformed: {e}")))?;

        let connection = self.resolver.resolve(Some(&job.project_id)).await?;
        let client = self.clients.client_for(&connection)?;

        self.progress.step(&job.id, "downloading hero image");
        let asset = client.fetch_asset(&payload.featured_image_url).await?;

        self.progress.step(&job.id, "uploading hero image");
        let media = client
            .upload_media(asset.bytes, &asset.filename, &asset.mime)
            .await?;

        if let Some(alt) = payload
            .featured_image_alt
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        {
            client.set_media_alt_text(media.id, alt).await?;
        }

        self.progress.step(&job.id, "creating post");
        client
            .create_post(&payload.post_type, &payload.to_new_post(Some(media.id)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publish::{EnqueueRequest, PublishService};
    use crate::test_support::{RecordingCms, connection, seed_draft, temp_storage};
    use seoflow_cms::CmsClient;
    use seoflow_shared::{CmsConfig, CmsConnection, ContentType, HeroImageAsset, JobStatus};

    struct Fixture {
        storage: Arc<Storage>,
        service: PublishService,
        worker: PublishWorker,
        cms: Arc<RecordingCms>,
    }

    async fn fixture(cms: RecordingCms) -> Fixture {
        let storage = temp_storage().await;
        storage.upsert_cms_connection(&connection()).await.unwrap();
        seed_draft(&storage, ContentType::Article).await;
        storage
            .upsert_hero_image(&HeroImageAsset::new(
                "D1",
                "https://cdn.invoicer.test/hero.png",
                Some("Invoice on a desk".into()),
            ))
            .await
            .unwrap();

        let resolver =
            ConnectionResolver::with_lookup(CmsConfig::default(), storage.clone(), |_| None);
        let cms = Arc::new(cms);
        let shared = cms.clone();
        let factory = move |_: &CmsConnection| -> Result<Arc<dyn CmsClient>> {
            let client: Arc<dyn CmsClient> = shared.clone();
            Ok(client)
        };
        let worker = PublishWorker::new(
            Arc::new(StorageQueue::new(storage.clone())),
            resolver.clone(),
            Arc::new(factory),
        );

        Fixture {
            service: PublishService::new(storage.clone(), resolver),
            storage,
            worker,
            cms,
        }
    }

    fn enqueue(publish_at: Option<DateTime<Utc>>) -> EnqueueRequest {
        EnqueueRequest {
            draft_id: "D1".into(),
            user_id: "U1".into(),
            publish_at,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn publishes_due_job() {
        let fx = fixture(RecordingCms::default()).await;
        let job = fx.service.enqueue(enqueue(None)).await.unwrap();

        let outcome = fx.worker.run_once().await.unwrap().unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Published {
                job_id: job.id.clone(),
                remote_post_id: 501,
                remote_url: Some("https://blog.invoicer.test/why-freelancers-get-paid-late".into()),
            }
        );

        assert_eq!(
            fx.cms.calls(),
            [
                "fetch https://cdn.invoicer.test/hero.png",
                "upload hero.png image/png 4",
                "alt 77 Invoice on a desk",
                "create posts",
            ]
        );
        let posts = fx.cms.posts.lock().unwrap().clone();
        assert_eq!(posts[0].1.featured_media, Some(77));
        assert_eq!(posts[0].1.tags, [5, 8]);

        let stored = fx.storage.get_publish_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Published);
        assert_eq!(stored.remote_post_id, Some(501));
        assert!(stored.finished_at.is_some());

        assert!(fx.worker.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cms_failure_marks_job_failed_without_retry() {
        let fx = fixture(RecordingCms {
            fail_create: true,
            ..Default::default()
        })
        .await;
        let job = fx.service.enqueue(enqueue(None)).await.unwrap();

        let outcomes = fx.worker.run_until_idle(None).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], JobOutcome::Failed { error, .. } if error.contains("HTTP 500")));

        let stored = fx.storage.get_publish_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.error.unwrap().contains("db down"));

        // Retried jobs are picked up again.
        fx.service.retry(&job.id, "U1").await.unwrap();
        assert_eq!(fx.worker.run_until_idle(Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn abandoned_job_is_published_after_lease() {
        let fx = fixture(RecordingCms::default()).await;
        let job = fx
            .service
            .enqueue(enqueue(Some(Utc::now() - Duration::hours(1))))
            .await
            .unwrap();

        // A worker claimed the job and died before finishing it.
        let crashed_at = Utc::now() - Duration::minutes(5);
        fx.storage
            .claim_next_job(&crashed_at, Duration::seconds(DEFAULT_CLAIM_LEASE_SECS))
            .await
            .unwrap()
            .unwrap();
        assert!(fx.worker.run_once().await.unwrap().is_none());

        let worker = PublishWorker::new(
            Arc::new(StorageQueue::new(fx.storage.clone()).with_lease(Duration::minutes(1))),
            fx.worker.resolver.clone(),
            fx.worker.clients.clone(),
        );
        let outcome = worker.run_once().await.unwrap().unwrap();
        assert!(matches!(outcome, JobOutcome::Published { ref job_id, .. } if *job_id == job.id));

        let stored = fx.storage.get_publish_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Published);
    }

    #[tokio::test]
    async fn future_jobs_wait() {
        let fx = fixture(RecordingCms::default()).await;
        fx.service
            .enqueue(enqueue(Some(Utc::now() + Duration::hours(2))))
            .await
            .unwrap();

        assert!(fx.worker.run_once().await.unwrap().is_none());
        assert!(fx.cms.calls().is_empty());
    }
}
