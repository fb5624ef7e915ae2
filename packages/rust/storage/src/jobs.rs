//! Publish job queue.
//!
//! Every status change is a conditional `UPDATE ... WHERE status = ...` so
//! concurrent workers and retries cannot both win the same transition.

use chrono::{DateTime, Duration, Utc};
use libsql::params;
use seoflow_shared::{JobStatus, PublishJob, Result, SeoflowError};
use tracing::{debug, warn};

use crate::{
    Storage, db_err, get_json, get_opt_str, get_opt_ts, get_str, get_ts, is_unique_violation,
    to_json, ts,
};

const JOB_COLUMNS: &str = "id, draft_id, idea_id, project_id, hypothesis_id, target_site, status,
     publish_at, payload_json, error, message, started_at, finished_at, remote_post_id,
     remote_url, created_by, created_at, updated_at";

/// Filter for listing publish jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub project_id: Option<String>,
    pub hypothesis_id: Option<String>,
    /// Maximum number of rows; callers clamp this before querying.
    pub limit: u32,
}

impl Storage {
    /// Insert a new publish job. If the draft already has a queued or
    /// publishing job, fails with `DuplicateJob` naming that job.
    pub async fn insert_publish_job(&self, job: &PublishJob) -> Result<()> {
        self.check_writable()?;
        let result = self
            .conn
            .execute(
                "INSERT INTO publish_jobs (id, draft_id, idea_id, project_id, hypothesis_id, target_site,
                   status, publish_at, payload_json, error, message, started_at, finished_at,
                   remote_post_id, remote_url, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                params![
                    job.id.as_str(),
                    job.draft_id.as_str(),
                    job.idea_id.as_deref(),
                    job.project_id.as_str(),
                    job.hypothesis_id.as_str(),
                    job.target_site.as_str(),
                    job.status.as_str(),
                    ts(&job.publish_at),
                    to_json(&job.payload)?,
                    job.error.as_deref(),
                    job.message.as_str(),
                    job.started_at.as_ref().map(ts),
                    job.finished_at.as_ref().map(ts),
                    job.remote_post_id.map(|id| id as i64),
                    job.remote_url.as_deref(),
                    job.created_by.as_str(),
                    ts(&job.created_at),
                    ts(&job.updated_at),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(self.duplicate_job_error(&job.draft_id).await),
            Err(e) => Err(db_err(e)),
        }
    }

    /// The queued or publishing job of a draft, if any.
    pub async fn find_active_job_for_draft(&self, draft_id: &str) -> Result<Option<PublishJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM publish_jobs
             WHERE draft_id = ?1 AND status IN ('queued', 'publishing')
             LIMIT 1"
        );
        let mut rows = self
            .conn
            .query(&sql, params![draft_id])
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Get a publish job by ID.
    pub async fn get_publish_job(&self, id: &str) -> Result<Option<PublishJob>> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM publish_jobs WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_job(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Refresh a still-queued job with a new schedule and payload.
    /// Returns false when the job has left `queued` in the meantime.
    pub async fn refresh_queued_job(
        &self,
        id: &str,
        idea_id: Option<&str>,
        publish_at: &DateTime<Utc>,
        payload: &serde_json::Value,
        message: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE publish_jobs SET
                   idea_id = COALESCE(?1, idea_id),
                   publish_at = ?2,
                   payload_json = ?3,
                   message = ?4,
                   error = NULL,
                   started_at = NULL,
                   finished_at = NULL,
                   updated_at = ?5
                 WHERE id = ?6 AND status = 'queued'",
                params![
                    idea_id,
                    ts(publish_at),
                    to_json(payload)?,
                    message,
                    now.as_str(),
                    id,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    /// Put a finished job back in the queue. Returns false when the job is
    /// currently publishing (or does not exist).
    pub async fn reset_job_for_retry(&self, id: &str, message: &str) -> Result<bool> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let result = self
            .conn
            .execute(
                "UPDATE publish_jobs SET
                   status = 'queued',
                   message = ?1,
                   error = NULL,
                   started_at = NULL,
                   finished_at = NULL,
                   updated_at = ?2
                 WHERE id = ?3 AND status <> 'publishing'",
                params![message, now.as_str(), id],
            )
            .await;

        match result {
            Ok(changed) => Ok(changed == 1),
            Err(e) if is_unique_violation(&e) => {
                // Another job for the same draft became active.
                let draft_id = match self.get_publish_job(id).await? {
                    Some(job) => job.draft_id,
                    None => return Err(db_err(e)),
                };
                Err(self.duplicate_job_error(&draft_id).await)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    /// List jobs newest first, scoped by project and/or hypothesis.
    pub async fn list_publish_jobs(&self, filter: &JobFilter) -> Result<Vec<PublishJob>> {
        let sql = format!(
            "SELECT {JOB_COLUMNS} FROM publish_jobs
             WHERE (?1 IS NULL OR project_id = ?1) AND (?2 IS NULL OR hypothesis_id = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params![
                    filter.project_id.as_deref(),
                    filter.hypothesis_id.as_deref(),
                    i64::from(filter.limit),
                ],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_job(&row)?);
        }
        Ok(results)
    }

    /// Claim the oldest due job for publishing.
    ///
    /// Due means queued with `publish_at <= now`, or stuck in `publishing`
    /// since before `now - lease` (its worker is presumed dead). Returns
    /// `None` when nothing is due. A lost race with another worker moves on
    /// to the next candidate.
    pub async fn claim_next_job(
        &self,
        now: &DateTime<Utc>,
        lease: Duration,
    ) -> Result<Option<PublishJob>> {
        self.check_writable()?;
        let now_s = ts(now);
        let stale_s = ts(&(*now - lease));

        loop {
            let mut rows = self
                .conn
                .query(
                    "SELECT id, status, started_at FROM publish_jobs
                     WHERE (status = 'queued' AND publish_at <= ?1)
                        OR (status = 'publishing' AND started_at IS NOT NULL AND started_at < ?2)
                     ORDER BY publish_at ASC, id ASC
                     LIMIT 1",
                    params![now_s.as_str(), stale_s.as_str()],
                )
                .await
                .map_err(db_err)?;

            let (id, status, started_at) = match rows.next().await.map_err(db_err)? {
                Some(row) => (get_str(&row, 0)?, get_str(&row, 1)?, get_opt_str(&row, 2)),
                None => return Ok(None),
            };
            drop(rows);

            // A stale claim is taken over only if nobody refreshed it first.
            let claimed = match started_at.filter(|_| status == JobStatus::Publishing.as_str()) {
                Some(started_at) => {
                    warn!(job_id = %id, %started_at, "reclaiming job whose lease expired");
                    self.conn
                        .execute(
                            "UPDATE publish_jobs SET started_at = ?1, updated_at = ?1
                             WHERE id = ?2 AND status = 'publishing' AND started_at = ?3",
                            params![now_s.as_str(), id.as_str(), started_at.as_str()],
                        )
                        .await
                }
                None => {
                    self.conn
                        .execute(
                            "UPDATE publish_jobs SET status = 'publishing', started_at = ?1, updated_at = ?1
                             WHERE id = ?2 AND status = 'queued'",
                            params![now_s.as_str(), id.as_str()],
                        )
                        .await
                }
            }
            .map_err(db_err)?;

            if claimed == 1 {
                return self.get_publish_job(&id).await;
            }
            debug!(job_id = %id, "job claimed by another worker");
        }
    }

    /// Record a successful publish. Returns false unless the job was publishing.
    pub async fn mark_job_published(
        &self,
        id: &str,
        remote_post_id: u64,
        remote_url: Option<&str>,
    ) -> Result<bool> {
        self.finish_job(id, JobStatus::Published, None, Some(remote_post_id), remote_url)
            .await
    }

    /// Record a failed publish. Returns false unless the job was publishing.
    pub async fn mark_job_failed(&self, id: &str, error: &str) -> Result<bool> {
        self.finish_job(id, JobStatus::Failed, Some(error), None, None)
            .await
    }

    async fn finish_job(
        &self,
        id: &str,
        status: JobStatus,
        error: Option<&str>,
        remote_post_id: Option<u64>,
        remote_url: Option<&str>,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE publish_jobs SET
                   status = ?1,
                   error = ?2,
                   remote_post_id = COALESCE(?3, remote_post_id),
                   remote_url = COALESCE(?4, remote_url),
                   finished_at = ?5,
                   updated_at = ?5
                 WHERE id = ?6 AND status = 'publishing'",
                params![
                    status.as_str(),
                    error,
                    remote_post_id.map(|v| v as i64),
                    remote_url,
                    now.as_str(),
                    id,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    async fn duplicate_job_error(&self, draft_id: &str) -> SeoflowError {
        match self.find_active_job_for_draft(draft_id).await {
            Ok(Some(active)) => SeoflowError::DuplicateJob {
                draft_id: draft_id.to_string(),
                job_id: active.id,
            },
            Ok(None) => SeoflowError::Storage(format!(
                "publish job for draft {draft_id} conflicted but no active job was found"
            )),
            Err(e) => e,
        }
    }
}

fn row_to_job(row: &libsql::Row) -> Result<PublishJob> {
    Ok(PublishJob {
        id: get_str(row, 0)?,
        draft_id: get_str(row, 1)?,
        idea_id: get_opt_str(row, 2),
        project_id: get_str(row, 3)?,
        hypothesis_id: get_str(row, 4)?,
        target_site: get_str(row, 5)?,
        status: get_str(row, 6)?.parse()?,
        publish_at: get_ts(row, 7)?,
        payload: get_json(row, 8)?,
        error: get_opt_str(row, 9),
        message: get_str(row, 10)?,
        started_at: get_opt_ts(row, 11)?,
        finished_at: get_opt_ts(row, 12)?,
        remote_post_id: row.get::<i64>(13).ok().map(|v| v as u64),
        remote_url: get_opt_str(row, 14),
        created_by: get_str(row, 15)?,
        created_at: get_ts(row, 16)?,
        updated_at: get_ts(row, 17)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use seoflow_shared::{JobStatus, PublishJob, SeoflowError, new_id};
    use serde_json::json;

    use super::JobFilter;
    use crate::test_support::test_storage;

    fn lease() -> Duration {
        Duration::minutes(15)
    }

    fn job(draft_id: &str, status: JobStatus) -> PublishJob {
        let now = Utc::now();
        PublishJob {
            id: new_id(),
            draft_id: draft_id.into(),
            idea_id: Some("i1".into()),
            project_id: "p1".into(),
            hypothesis_id: "h1".into(),
            target_site: "wordpress".into(),
            status,
            publish_at: now - Duration::minutes(1),
            payload: json!({ "title": "Late invoices" }),
            error: None,
            message: "Scheduled".into(),
            started_at: None,
            finished_at: None,
            remote_post_id: None,
            remote_url: None,
            created_by: "u1".into(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn second_active_job_is_rejected() {
        let storage = test_storage().await;
        let first = job("d1", JobStatus::Queued);
        storage.insert_publish_job(&first).await.unwrap();

        let err = storage
            .insert_publish_job(&job("d1", JobStatus::Queued))
            .await
            .unwrap_err();
        match err {
            SeoflowError::DuplicateJob { draft_id, job_id } => {
                assert_eq!(draft_id, "d1");
                assert_eq!(job_id, first.id);
            }
            other => panic!("expected DuplicateJob, got {other:?}"),
        }

        // Finished jobs do not count.
        storage
            .insert_publish_job(&job("d2", JobStatus::Failed))
            .await
            .unwrap();
        storage
            .insert_publish_job(&job("d2", JobStatus::Queued))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn refresh_only_touches_queued_jobs() {
        let storage = test_storage().await;
        let queued = job("d1", JobStatus::Queued);
        storage.insert_publish_job(&queued).await.unwrap();

        let later = Utc::now() + Duration::hours(2);
        let refreshed = storage
            .refresh_queued_job(&queued.id, None, &later, &json!({"title": "New"}), "Rescheduled")
            .await
            .unwrap();
        assert!(refreshed);

        let stored = storage.get_publish_job(&queued.id).await.unwrap().unwrap();
        assert_eq!(stored.payload["title"], "New");
        assert_eq!(stored.message, "Rescheduled");
        assert_eq!(stored.idea_id.as_deref(), Some("i1"));

        storage
            .claim_next_job(&(later + Duration::minutes(1)), lease())
            .await
            .unwrap();
        let refreshed = storage
            .refresh_queued_job(&queued.id, None, &later, &json!({}), "again")
            .await
            .unwrap();
        assert!(!refreshed);
    }

    #[tokio::test]
    async fn claim_publish_and_fail() {
        let storage = test_storage().await;
        let now = Utc::now();

        let mut future = job("d-future", JobStatus::Queued);
        future.publish_at = now + Duration::days(1);
        storage.insert_publish_job(&future).await.unwrap();
        let due = job("d-due", JobStatus::Queued);
        storage.insert_publish_job(&due).await.unwrap();

        let claimed = storage.claim_next_job(&now, lease()).await.unwrap().unwrap();
        assert_eq!(claimed.id, due.id);
        assert_eq!(claimed.status, JobStatus::Publishing);
        assert!(claimed.started_at.is_some());
        assert!(storage.claim_next_job(&now, lease()).await.unwrap().is_none());

        assert!(storage
            .mark_job_published(&due.id, 42, Some("https://cms.test/?p=42"))
            .await
            .unwrap());
        assert!(!storage.mark_job_failed(&due.id, "late").await.unwrap());

        let stored = storage.get_publish_job(&due.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Published);
        assert_eq!(stored.remote_post_id, Some(42));
        assert!(stored.finished_at.is_some());
    }

    #[tokio::test]
    async fn abandoned_claim_is_reclaimed_after_lease() {
        let storage = test_storage().await;
        let j = job("d1", JobStatus::Queued);
        storage.insert_publish_job(&j).await.unwrap();

        let now = Utc::now();
        let first = storage.claim_next_job(&now, lease()).await.unwrap().unwrap();
        assert_eq!(first.id, j.id);

        // Still inside the lease: nobody else may take it.
        let soon = now + Duration::minutes(5);
        assert!(storage.claim_next_job(&soon, lease()).await.unwrap().is_none());

        let later = now + Duration::minutes(20);
        let again = storage.claim_next_job(&later, lease()).await.unwrap().unwrap();
        assert_eq!(again.id, j.id);
        assert_eq!(again.status, JobStatus::Publishing);
        assert!(again.started_at > first.started_at);
        assert!(storage.claim_next_job(&later, lease()).await.unwrap().is_none());

        assert!(storage.mark_job_published(&j.id, 7, None).await.unwrap());
        let stored = storage.get_publish_job(&j.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Published);
    }

    #[tokio::test]
    async fn retry_skips_publishing_jobs() {
        let storage = test_storage().await;
        let j = job("d1", JobStatus::Queued);
        storage.insert_publish_job(&j).await.unwrap();
        storage.claim_next_job(&Utc::now(), lease()).await.unwrap();

        assert!(!storage.reset_job_for_retry(&j.id, "Retried by u1").await.unwrap());

        storage.mark_job_failed(&j.id, "HTTP 500").await.unwrap();
        assert!(storage.reset_job_for_retry(&j.id, "Retried by u1").await.unwrap());

        let stored = storage.get_publish_job(&j.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert_eq!(stored.error, None);
        assert_eq!(stored.message, "Retried by u1");
    }

    #[tokio::test]
    async fn retry_conflicts_with_newer_active_job() {
        let storage = test_storage().await;
        let old = job("d1", JobStatus::Failed);
        storage.insert_publish_job(&old).await.unwrap();
        let active = job("d1", JobStatus::Queued);
        storage.insert_publish_job(&active).await.unwrap();

        let err = storage.reset_job_for_retry(&old.id, "retry").await.unwrap_err();
        assert!(matches!(err, SeoflowError::DuplicateJob { job_id, .. } if job_id == active.id));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_limited() {
        let storage = test_storage().await;
        let mut ids = Vec::new();
        for i in 0..3 {
            let mut j = job(&format!("d{i}"), JobStatus::Queued);
            j.created_at = Utc::now() + Duration::seconds(i);
            ids.push(j.id.clone());
            storage.insert_publish_job(&j).await.unwrap();
        }

        let listed = storage
            .list_publish_jobs(&JobFilter {
                project_id: Some("p1".into()),
                hypothesis_id: None,
                limit: 2,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);

        let other = storage
            .list_publish_jobs(&JobFilter {
                project_id: Some("p2".into()),
                hypothesis_id: None,
                limit: 20,
            })
            .await
            .unwrap();
        assert!(other.is_empty());
    }
}
