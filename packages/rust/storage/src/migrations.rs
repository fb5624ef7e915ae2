//! SQL migration definitions for the seoflow database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Context sources: projects, hypotheses, summaries, profiles, clusters",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS projects (
    id            TEXT PRIMARY KEY,
    owner_id      TEXT NOT NULL,
    title         TEXT NOT NULL,
    description   TEXT,
    language      TEXT,
    settings_json TEXT NOT NULL DEFAULT 'null',
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS hypotheses (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_hypotheses_project ON hypotheses(project_id);

CREATE TABLE IF NOT EXISTS business_model_summaries (
    hypothesis_id     TEXT PRIMARY KEY,
    summary           TEXT NOT NULL,
    value_proposition TEXT,
    revenue_model     TEXT,
    updated_at        TEXT NOT NULL
);

-- Raw profile documents; field names drifted over time, so they are kept as JSON
CREATE TABLE IF NOT EXISTS customer_profiles (
    hypothesis_id TEXT PRIMARY KEY,
    profile_json  TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS keyword_clusters (
    id            TEXT PRIMARY KEY,
    hypothesis_id TEXT NOT NULL,
    name          TEXT NOT NULL,
    intent        TEXT,
    keywords_json TEXT NOT NULL DEFAULT '[]',
    created_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_clusters_hypothesis ON keyword_clusters(hypothesis_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Content: backlog ideas, drafts, draft assets",
            sql: r#"
CREATE TABLE IF NOT EXISTS backlog_ideas (
    id                TEXT PRIMARY KEY,
    project_id        TEXT NOT NULL,
    hypothesis_id     TEXT NOT NULL,
    cluster_id        TEXT,
    title             TEXT NOT NULL,
    description       TEXT NOT NULL,
    category          TEXT NOT NULL,
    status            TEXT NOT NULL DEFAULT 'backlog',
    primary_keyword   TEXT,
    intent            TEXT NOT NULL DEFAULT 'informational',
    search_volume     REAL,
    difficulty        REAL,
    opportunity_score REAL,
    title_key         TEXT NOT NULL,
    summary_key       TEXT NOT NULL,
    created_by        TEXT NOT NULL,
    updated_by        TEXT NOT NULL,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE(project_id, hypothesis_id, title_key)
);

CREATE INDEX IF NOT EXISTS idx_ideas_scope ON backlog_ideas(project_id, hypothesis_id);
CREATE INDEX IF NOT EXISTS idx_ideas_summary_key ON backlog_ideas(project_id, hypothesis_id, summary_key);

CREATE TABLE IF NOT EXISTS drafts (
    id             TEXT PRIMARY KEY,
    project_id     TEXT NOT NULL,
    hypothesis_id  TEXT NOT NULL,
    idea_id        TEXT NOT NULL,
    content_type   TEXT NOT NULL,
    title          TEXT NOT NULL,
    summary        TEXT NOT NULL,
    body           TEXT NOT NULL,
    structure_json TEXT NOT NULL DEFAULT '[]',
    model          TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_drafts_idea ON drafts(idea_id);

-- One asset per (draft, type); the hero image is type 'hero'
CREATE TABLE IF NOT EXISTS draft_assets (
    draft_id   TEXT NOT NULL,
    asset_type TEXT NOT NULL,
    url        TEXT NOT NULL,
    alt_text   TEXT,
    created_at TEXT NOT NULL,
    PRIMARY KEY (draft_id, asset_type)
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
        Migration {
            version: 3,
            description: "Publishing: CMS connections and publish job queue",
            sql: r#"
CREATE TABLE IF NOT EXISTS cms_connections (
    project_id                TEXT PRIMARY KEY,
    base_url                  TEXT NOT NULL,
    username                  TEXT NOT NULL,
    app_password              TEXT NOT NULL,
    target_site               TEXT NOT NULL,
    article_post_type         TEXT NOT NULL DEFAULT 'posts',
    page_post_type            TEXT NOT NULL DEFAULT 'pages',
    article_category_ids_json TEXT NOT NULL DEFAULT '[]',
    article_tag_ids_json      TEXT NOT NULL DEFAULT '[]',
    page_category_ids_json    TEXT NOT NULL DEFAULT '[]',
    page_tag_ids_json         TEXT NOT NULL DEFAULT '[]',
    updated_at                TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS publish_jobs (
    id             TEXT PRIMARY KEY,
    draft_id       TEXT NOT NULL,
    idea_id        TEXT,
    project_id     TEXT NOT NULL,
    hypothesis_id  TEXT NOT NULL,
    target_site    TEXT NOT NULL,
    status         TEXT NOT NULL,
    publish_at     TEXT NOT NULL,
    payload_json   TEXT NOT NULL,
    error          TEXT,
    message        TEXT NOT NULL DEFAULT '',
    started_at     TEXT,
    finished_at    TEXT,
    remote_post_id INTEGER,
    remote_url     TEXT,
    created_by     TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

-- At most one queued/publishing job per draft
CREATE UNIQUE INDEX IF NOT EXISTS idx_publish_jobs_active_draft
    ON publish_jobs(draft_id) WHERE status IN ('queued', 'publishing');

CREATE INDEX IF NOT EXISTS idx_publish_jobs_due ON publish_jobs(status, publish_at);
CREATE INDEX IF NOT EXISTS idx_publish_jobs_scope ON publish_jobs(project_id, hypothesis_id, created_at);

INSERT INTO schema_migrations (version) VALUES (3);
"#,
        },
    ]
}
