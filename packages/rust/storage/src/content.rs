//! Content records: backlog ideas, drafts, hero images, CMS connections.

use chrono::Utc;
use libsql::params;
use seoflow_shared::{
    BacklogIdea, CmsConnection, Draft, HERO_ASSET_TYPE, HeroImageAsset, IdeaStatus, Result,
    SearchIntent,
};

use crate::{Storage, db_err, get_json, get_opt_str, get_str, get_ts, to_json, ts};

const IDEA_COLUMNS: &str = "id, project_id, hypothesis_id, cluster_id, title, description, category, status,
     primary_keyword, intent, search_volume, difficulty, opportunity_score,
     created_by, updated_by, created_at, updated_at";

const DRAFT_COLUMNS: &str = "id, project_id, hypothesis_id, idea_id, content_type, title, summary, body,
     structure_json, model, created_at, updated_at";

impl Storage {
    // -----------------------------------------------------------------------
    // Backlog ideas
    // -----------------------------------------------------------------------

    /// Insert an idea unless one with the same title key already exists for
    /// the project+hypothesis. Returns whether a row was inserted.
    pub async fn insert_idea(
        &self,
        idea: &BacklogIdea,
        title_key: &str,
        summary_key: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let inserted = self
            .conn
            .execute(
                "INSERT INTO backlog_ideas (id, project_id, hypothesis_id, cluster_id, title, description,
                   category, status, primary_keyword, intent, search_volume, difficulty, opportunity_score,
                   title_key, summary_key, created_by, updated_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                 ON CONFLICT(project_id, hypothesis_id, title_key) DO NOTHING",
                params![
                    idea.id.as_str(),
                    idea.project_id.as_str(),
                    idea.hypothesis_id.as_str(),
                    idea.cluster_id.as_deref(),
                    idea.title.as_str(),
                    idea.description.as_str(),
                    idea.category.as_str(),
                    idea.status.as_str(),
                    idea.primary_keyword.as_deref(),
                    idea.intent.as_str(),
                    idea.search_volume,
                    idea.difficulty,
                    idea.opportunity_score,
                    title_key,
                    summary_key,
                    idea.created_by.as_str(),
                    idea.updated_by.as_str(),
                    ts(&idea.created_at),
                    ts(&idea.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(inserted == 1)
    }

    /// Find an existing idea matching the normalized title key, or the
    /// normalized summary key when that key is non-empty.
    pub async fn find_idea_by_keys(
        &self,
        project_id: &str,
        hypothesis_id: &str,
        title_key: &str,
        summary_key: &str,
    ) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM backlog_ideas
                 WHERE project_id = ?1 AND hypothesis_id = ?2
                   AND (title_key = ?3 OR (?4 <> '' AND summary_key = ?4))
                 LIMIT 1",
                params![project_id, hypothesis_id, title_key, summary_key],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(get_str(&row, 0)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// Get an idea by ID.
    pub async fn get_idea(&self, id: &str) -> Result<Option<BacklogIdea>> {
        let sql = format!("SELECT {IDEA_COLUMNS} FROM backlog_ideas WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_idea(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List ideas of a project+hypothesis, newest first, optionally by status.
    pub async fn list_ideas(
        &self,
        project_id: &str,
        hypothesis_id: &str,
        status: Option<IdeaStatus>,
    ) -> Result<Vec<BacklogIdea>> {
        let sql = format!(
            "SELECT {IDEA_COLUMNS} FROM backlog_ideas
             WHERE project_id = ?1 AND hypothesis_id = ?2 AND (?3 IS NULL OR status = ?3)
             ORDER BY created_at DESC, id DESC"
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params![project_id, hypothesis_id, status.map(|s| s.as_str())],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_idea(&row)?);
        }
        Ok(results)
    }

    /// Move an idea from `from` to `to`. Returns false when the idea was not
    /// in `from` (or does not exist).
    pub async fn transition_idea_status(
        &self,
        id: &str,
        from: IdeaStatus,
        to: IdeaStatus,
        user_id: &str,
    ) -> Result<bool> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE backlog_ideas SET status = ?1, updated_by = ?2, updated_at = ?3
                 WHERE id = ?4 AND status = ?5",
                params![to.as_str(), user_id, now.as_str(), id, from.as_str()],
            )
            .await
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    // -----------------------------------------------------------------------
    // Drafts
    // -----------------------------------------------------------------------

    /// Insert a new draft.
    pub async fn insert_draft(&self, draft: &Draft) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO drafts (id, project_id, hypothesis_id, idea_id, content_type, title, summary,
                   body, structure_json, model, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    draft.id.as_str(),
                    draft.project_id.as_str(),
                    draft.hypothesis_id.as_str(),
                    draft.idea_id.as_str(),
                    draft.content_type.as_str(),
                    draft.title.as_str(),
                    draft.summary.as_str(),
                    draft.body.as_str(),
                    to_json(&draft.structure)?,
                    draft.model.as_str(),
                    ts(&draft.created_at),
                    ts(&draft.updated_at),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get a draft by ID.
    pub async fn get_draft(&self, id: &str) -> Result<Option<Draft>> {
        let sql = format!("SELECT {DRAFT_COLUMNS} FROM drafts WHERE id = ?1");
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_draft(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    /// List drafts of a project+hypothesis, newest first.
    pub async fn list_drafts(&self, project_id: &str, hypothesis_id: &str) -> Result<Vec<Draft>> {
        let sql = format!(
            "SELECT {DRAFT_COLUMNS} FROM drafts WHERE project_id = ?1 AND hypothesis_id = ?2
             ORDER BY created_at DESC, id DESC"
        );
        let mut rows = self
            .conn
            .query(&sql, params![project_id, hypothesis_id])
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_draft(&row)?);
        }
        Ok(results)
    }

    /// Replace a draft's body and summary in full. Returns false if the
    /// draft does not exist.
    pub async fn replace_draft_content(&self, id: &str, body: &str, summary: &str) -> Result<bool> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        let changed = self
            .conn
            .execute(
                "UPDATE drafts SET body = ?1, summary = ?2, updated_at = ?3 WHERE id = ?4",
                params![body, summary, now.as_str(), id],
            )
            .await
            .map_err(db_err)?;
        Ok(changed == 1)
    }

    // -----------------------------------------------------------------------
    // Hero images
    // -----------------------------------------------------------------------

    /// Record (or replace) the hero image of a draft.
    pub async fn upsert_hero_image(&self, asset: &HeroImageAsset) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO draft_assets (draft_id, asset_type, url, alt_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(draft_id, asset_type) DO UPDATE SET
                   url = excluded.url,
                   alt_text = excluded.alt_text",
                params![
                    asset.draft_id.as_str(),
                    HERO_ASSET_TYPE,
                    asset.url.as_str(),
                    asset.alt_text.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get the hero image of a draft.
    pub async fn get_hero_image(&self, draft_id: &str) -> Result<Option<HeroImageAsset>> {
        let mut rows = self
            .conn
            .query(
                "SELECT draft_id, url, alt_text FROM draft_assets
                 WHERE draft_id = ?1 AND asset_type = ?2",
                params![draft_id, HERO_ASSET_TYPE],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(HeroImageAsset::new(
                get_str(&row, 0)?,
                get_str(&row, 1)?,
                get_opt_str(&row, 2),
            ))),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    // -----------------------------------------------------------------------
    // CMS connections
    // -----------------------------------------------------------------------

    /// Store the CMS connection of a project.
    pub async fn upsert_cms_connection(&self, conn: &CmsConnection) -> Result<()> {
        self.check_writable()?;
        let now = ts(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO cms_connections (project_id, base_url, username, app_password, target_site,
                   article_post_type, page_post_type, article_category_ids_json, article_tag_ids_json,
                   page_category_ids_json, page_tag_ids_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(project_id) DO UPDATE SET
                   base_url = excluded.base_url,
                   username = excluded.username,
                   app_password = excluded.app_password,
                   target_site = excluded.target_site,
                   article_post_type = excluded.article_post_type,
                   page_post_type = excluded.page_post_type,
                   article_category_ids_json = excluded.article_category_ids_json,
                   article_tag_ids_json = excluded.article_tag_ids_json,
                   page_category_ids_json = excluded.page_category_ids_json,
                   page_tag_ids_json = excluded.page_tag_ids_json,
                   updated_at = excluded.updated_at",
                params![
                    conn.project_id.as_str(),
                    conn.base_url.as_str(),
                    conn.username.as_str(),
                    conn.app_password.as_str(),
                    conn.target_site.as_str(),
                    conn.article_post_type.as_str(),
                    conn.page_post_type.as_str(),
                    to_json(&conn.article_category_ids)?,
                    to_json(&conn.article_tag_ids)?,
                    to_json(&conn.page_category_ids)?,
                    to_json(&conn.page_tag_ids)?,
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Get the stored CMS connection of a project.
    pub async fn get_cms_connection(&self, project_id: &str) -> Result<Option<CmsConnection>> {
        let mut rows = self
            .conn
            .query(
                "SELECT project_id, base_url, username, app_password, target_site, article_post_type,
                   page_post_type, article_category_ids_json, article_tag_ids_json,
                   page_category_ids_json, page_tag_ids_json
                 FROM cms_connections WHERE project_id = ?1",
                params![project_id],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(CmsConnection {
                project_id: get_str(&row, 0)?,
                base_url: get_str(&row, 1)?,
                username: get_str(&row, 2)?,
                app_password: get_str(&row, 3)?,
                target_site: get_str(&row, 4)?,
                article_post_type: get_str(&row, 5)?,
                page_post_type: get_str(&row, 6)?,
                article_category_ids: get_json(&row, 7)?,
                article_tag_ids: get_json(&row, 8)?,
                page_category_ids: get_json(&row, 9)?,
                page_tag_ids: get_json(&row, 10)?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }
}

fn row_to_idea(row: &libsql::Row) -> Result<BacklogIdea> {
    Ok(BacklogIdea {
        id: get_str(row, 0)?,
        project_id: get_str(row, 1)?,
        hypothesis_id: get_str(row, 2)?,
        cluster_id: get_opt_str(row, 3),
        title: get_str(row, 4)?,
        description: get_str(row, 5)?,
        category: get_str(row, 6)?.parse()?,
        status: get_str(row, 7)?.parse()?,
        primary_keyword: get_opt_str(row, 8),
        intent: SearchIntent::parse_lenient(&get_str(row, 9)?),
        search_volume: row.get::<f64>(10).ok(),
        difficulty: row.get::<f64>(11).ok(),
        opportunity_score: row.get::<f64>(12).ok(),
        created_by: get_str(row, 13)?,
        updated_by: get_str(row, 14)?,
        created_at: get_ts(row, 15)?,
        updated_at: get_ts(row, 16)?,
    })
}

fn row_to_draft(row: &libsql::Row) -> Result<Draft> {
    Ok(Draft {
        id: get_str(row, 0)?,
        project_id: get_str(row, 1)?,
        hypothesis_id: get_str(row, 2)?,
        idea_id: get_str(row, 3)?,
        content_type: get_str(row, 4)?.parse()?,
        title: get_str(row, 5)?,
        summary: get_str(row, 6)?,
        body: get_str(row, 7)?,
        structure: get_json(row, 8)?,
        model: get_str(row, 9)?,
        created_at: get_ts(row, 10)?,
        updated_at: get_ts(row, 11)?,
    })
}
