//! Context source records: projects, hypotheses, summaries, profiles, clusters.

use chrono::Utc;
use libsql::params;
use seoflow_shared::{BusinessModelSummary, Hypothesis, KeywordCluster, Project, Result, SeoflowError};

use crate::{Storage, db_err, get_json, get_opt_str, get_str, to_json, ts};

impl Storage {
    // -----------------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------------

    /// Insert or update a project.
    pub async fn upsert_project(&self, project: &Project) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO projects (id, owner_id, title, description, language, settings_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                   owner_id = excluded.owner_id,
                   title = excluded.title,
                   description = excluded.description,
                   language = excluded.language,
                   settings_json = excluded.settings_json,
                   updated_at = excluded.updated_at",
                params![
                    project.id.as_str(),
                    project.owner_id.as_str(),
                    project.title.as_str(),
                    project.description.as_deref(),
                    project.language.as_deref(),
                    to_json(&project.settings)?,
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get a project by ID.
    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, owner_id, title, description, language, settings_json
                 FROM projects WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Project {
                id: get_str(&row, 0)?,
                owner_id: get_str(&row, 1)?,
                title: get_str(&row, 2)?,
                description: get_opt_str(&row, 3),
                language: get_opt_str(&row, 4),
                settings: get_json(&row, 5)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Hypotheses
    // -----------------------------------------------------------------------

    /// Insert or update a hypothesis.
    pub async fn upsert_hypothesis(&self, hypothesis: &Hypothesis) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO hypotheses (id, project_id, title, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                   project_id = excluded.project_id,
                   title = excluded.title,
                   description = excluded.description",
                params![
                    hypothesis.id.as_str(),
                    hypothesis.project_id.as_str(),
                    hypothesis.title.as_str(),
                    hypothesis.description.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get a hypothesis by ID, regardless of project.
    pub async fn get_hypothesis(&self, id: &str) -> Result<Option<Hypothesis>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, title, description FROM hypotheses WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_hypothesis(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List the hypotheses stored under a project, oldest first.
    pub async fn list_hypotheses_by_project(&self, project_id: &str) -> Result<Vec<Hypothesis>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, title, description FROM hypotheses
                 WHERE project_id = ?1 ORDER BY created_at, id",
                params![project_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_hypothesis(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Business-model summaries
    // -----------------------------------------------------------------------

    /// Insert or replace the summary of a hypothesis.
    pub async fn upsert_business_model_summary(&self, summary: &BusinessModelSummary) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO business_model_summaries (hypothesis_id, summary, value_proposition, revenue_model, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(hypothesis_id) DO UPDATE SET
                   summary = excluded.summary,
                   value_proposition = excluded.value_proposition,
                   revenue_model = excluded.revenue_model,
                   updated_at = excluded.updated_at",
                params![
                    summary.hypothesis_id.as_str(),
                    summary.summary.as_str(),
                    summary.value_proposition.as_deref(),
                    summary.revenue_model.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get the summary of a hypothesis.
    pub async fn get_business_model_summary(
        &self,
        hypothesis_id: &str,
    ) -> Result<Option<BusinessModelSummary>> {
        let mut rows = self
            .conn
            .query(
                "SELECT hypothesis_id, summary, value_proposition, revenue_model
                 FROM business_model_summaries WHERE hypothesis_id = ?1",
                params![hypothesis_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(BusinessModelSummary {
                hypothesis_id: get_str(&row, 0)?,
                summary: get_str(&row, 1)?,
                value_proposition: get_opt_str(&row, 2),
                revenue_model: get_opt_str(&row, 3),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Customer profiles (raw documents)
    // -----------------------------------------------------------------------

    /// Store the raw profile document of a hypothesis.
    pub async fn upsert_customer_profile(
        &self,
        hypothesis_id: &str,
        profile: &serde_json::Value,
    ) -> Result<()> {
        self.upsert_customer_profile_raw(hypothesis_id, &to_json(profile)?)
            .await
    }

    /// Store a profile document verbatim, without validating it.
    pub async fn upsert_customer_profile_raw(&self, hypothesis_id: &str, raw: &str) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO customer_profiles (hypothesis_id, profile_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(hypothesis_id) DO UPDATE SET
                   profile_json = excluded.profile_json,
                   updated_at = excluded.updated_at",
                params![hypothesis_id, raw, now.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get the raw profile document of a hypothesis.
    ///
    /// Fails when the stored document is not valid JSON.
    pub async fn get_customer_profile(
        &self,
        hypothesis_id: &str,
    ) -> Result<Option<serde_json::Value>> {
        let mut rows = self
            .conn
            .query(
                "SELECT profile_json FROM customer_profiles WHERE hypothesis_id = ?1",
                params![hypothesis_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(get_json(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // Keyword clusters
    // -----------------------------------------------------------------------

    /// Insert or update a keyword cluster.
    pub async fn upsert_keyword_cluster(&self, cluster: &KeywordCluster) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO keyword_clusters (id, hypothesis_id, name, intent, keywords_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   intent = excluded.intent,
                   keywords_json = excluded.keywords_json",
                params![
                    cluster.id.as_str(),
                    cluster.hypothesis_id.as_str(),
                    cluster.name.as_str(),
                    cluster.intent.as_deref(),
                    to_json(&cluster.keywords)?,
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// List the keyword clusters of a hypothesis.
    pub async fn list_keyword_clusters(&self, hypothesis_id: &str) -> Result<Vec<KeywordCluster>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, hypothesis_id, name, intent, keywords_json FROM keyword_clusters
                 WHERE hypothesis_id = ?1 ORDER BY created_at, id",
                params![hypothesis_id],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(KeywordCluster {
                id: get_str(&row, 0)?,
                hypothesis_id: get_str(&row, 1)?,
                name: get_str(&row, 2)?,
                intent: get_opt_str(&row, 3),
                keywords: get_json(&row, 4).map_err(|e| {
                    SeoflowError::Storage(format!("cluster keywords unreadable: {e}"))
                })?,
            });
        }
        Ok(results)
    }
}

fn row_to_hypothesis(row: &libsql::Row) -> Result<Hypothesis> {
    Ok(Hypothesis {
        id: get_str(row, 0)?,
        project_id: get_str(row, 1)?,
        title: get_str(row, 2)?,
        description: get_opt_str(row, 3),
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_storage;
    use seoflow_shared::{Hypothesis, KeywordCluster, Project};

    fn project(id: &str) -> Project {
        Project {
            id: id.into(),
            owner_id: "u1".into(),
            title: "Acme".into(),
            description: Some("Bookkeeping for freelancers".into()),
            language: None,
            settings: serde_json::json!({"language": "de"}),
        }
    }

    #[tokio::test]
    async fn project_roundtrip_and_update() {
        let storage = test_storage().await;
        storage.upsert_project(&project("p1")).await.expect("insert");

        let mut updated = project("p1");
        updated.title = "Acme Books".into();
        storage.upsert_project(&updated).await.expect("update");

        let found = storage.get_project("p1").await.unwrap().expect("project");
        assert_eq!(found.title, "Acme Books");
        assert_eq!(found.settings["language"], "de");
        assert!(storage.get_project("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hypotheses_by_project() {
        let storage = test_storage().await;
        for (id, project_id) in [("h1", "p1"), ("h2", "p1"), ("h3", "p2")] {
            storage
                .upsert_hypothesis(&Hypothesis {
                    id: id.into(),
                    project_id: project_id.into(),
                    title: format!("Hypothesis {id}"),
                    description: None,
                })
                .await
                .unwrap();
        }

        let listed = storage.list_hypotheses_by_project("p1").await.unwrap();
        let ids: Vec<_> = listed.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, ["h1", "h2"]);
        assert_eq!(
            storage.get_hypothesis("h3").await.unwrap().unwrap().project_id,
            "p2"
        );
    }

    #[tokio::test]
    async fn corrupt_profile_is_an_error() {
        let storage = test_storage().await;
        storage
            .upsert_customer_profile_raw("h1", "{not json")
            .await
            .unwrap();
        assert!(storage.get_customer_profile("h1").await.is_err());

        storage
            .upsert_customer_profile("h1", &serde_json::json!({"persona": "Freelancer"}))
            .await
            .unwrap();
        let profile = storage.get_customer_profile("h1").await.unwrap().unwrap();
        assert_eq!(profile["persona"], "Freelancer");
    }

    #[tokio::test]
    async fn clusters_keep_keywords() {
        let storage = test_storage().await;
        storage
            .upsert_keyword_cluster(&KeywordCluster {
                id: "c1".into(),
                hypothesis_id: "h1".into(),
                name: "invoicing".into(),
                intent: Some("commercial".into()),
                keywords: vec!["invoice template".into(), "send invoice".into()],
            })
            .await
            .unwrap();

        let clusters = storage.list_keyword_clusters("h1").await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].keywords.len(), 2);
        assert!(storage.list_keyword_clusters("h2").await.unwrap().is_empty());
    }
}
