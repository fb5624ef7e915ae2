//! Core domain types for the content pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SeoflowError;

/// Generate a new time-sortable record identifier (UUID v7).
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Implements `Display`/`FromStr` over an enum's `as_str`/`ALL` pair.
macro_rules! string_enum {
    ($ty:ident, $entity:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = SeoflowError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                let wanted = s.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        SeoflowError::validation(format!("unknown {}: {s:?}", $entity))
                    })
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Context sources
// ---------------------------------------------------------------------------

/// A customer's project: the container for hypotheses and content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Explicit project language, if the owner set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Free-form nested settings (historically also carried the language).
    #[serde(default)]
    pub settings: serde_json::Value,
}

/// A customer-segment/positioning bet under a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub project_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Canonical business-model summary for a hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessModelSummary {
    pub hypothesis_id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_proposition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue_model: Option<String>,
}

/// Ideal-customer profile, resolved from the raw stored document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub pains: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

/// A keyword grouping used as generation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCluster {
    pub id: String,
    pub hypothesis_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Consistency-checked view of everything the generators need.
///
/// Built fresh for every request and only ever handed out by shared
/// reference once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub project: Project,
    pub hypothesis: Hypothesis,
    pub business_model_summary: Option<BusinessModelSummary>,
    pub customer_profile: Option<CustomerProfile>,
    pub clusters: Vec<KeywordCluster>,
    /// Language all downstream prompts are written for.
    pub language: String,
}

// ---------------------------------------------------------------------------
// Ideas
// ---------------------------------------------------------------------------

/// The angle an idea is generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdeaCategory {
    Pain,
    Goal,
    Trigger,
    Feature,
    Benefit,
    Faq,
    Comparison,
    Informational,
}

impl IdeaCategory {
    pub const ALL: [Self; 8] = [
        Self::Pain,
        Self::Goal,
        Self::Trigger,
        Self::Feature,
        Self::Benefit,
        Self::Faq,
        Self::Comparison,
        Self::Informational,
    ];

    /// Stable identifier used in storage and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pain => "PAIN",
            Self::Goal => "GOAL",
            Self::Trigger => "TRIGGER",
            Self::Feature => "FEATURE",
            Self::Benefit => "BENEFIT",
            Self::Faq => "FAQ",
            Self::Comparison => "COMPARISON",
            Self::Informational => "INFORMATIONAL",
        }
    }
}

string_enum!(IdeaCategory, "idea category");

/// Search intent of an idea. Unknown model output folds to `Informational`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchIntent {
    #[default]
    Informational,
    Commercial,
    Transactional,
    Navigational,
}

impl SearchIntent {
    pub const ALL: [Self; 4] = [
        Self::Informational,
        Self::Commercial,
        Self::Transactional,
        Self::Navigational,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Informational => "informational",
            Self::Commercial => "commercial",
            Self::Transactional => "transactional",
            Self::Navigational => "navigational",
        }
    }

    /// Parse model output, defaulting to `Informational` for anything unknown.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

string_enum!(SearchIntent, "search intent");

/// A content idea as returned by the model, before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaCandidate {
    pub title: String,
    pub summary: String,
    pub category: IdeaCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keyword: Option<String>,
    #[serde(default)]
    pub intent: SearchIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_score: Option<f64>,
}

/// Lifecycle of a persisted idea.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaStatus {
    Backlog,
    Scheduled,
    Archived,
}

impl IdeaStatus {
    pub const ALL: [Self; 3] = [Self::Backlog, Self::Scheduled, Self::Archived];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Scheduled => "scheduled",
            Self::Archived => "archived",
        }
    }

    /// `backlog → scheduled → archived`; archived is terminal.
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Backlog, Self::Scheduled)
                | (Self::Backlog, Self::Archived)
                | (Self::Scheduled, Self::Archived)
        )
    }
}

string_enum!(IdeaStatus, "idea status");

/// A persisted, not-yet-drafted content idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklogIdea {
    pub id: String,
    pub project_id: String,
    pub hypothesis_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    pub title: String,
    pub description: String,
    pub category: IdeaCategory,
    pub status: IdeaStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_keyword: Option<String>,
    pub intent: SearchIntent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opportunity_score: Option<f64>,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Drafts
// ---------------------------------------------------------------------------

/// What kind of content a draft is. Page variants publish as CMS pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Article,
    HowTo,
    Listicle,
    Guide,
    CaseStudy,
    LandingPage,
    ProductPage,
    ServicePage,
}

impl ContentType {
    pub const ALL: [Self; 8] = [
        Self::Article,
        Self::HowTo,
        Self::Listicle,
        Self::Guide,
        Self::CaseStudy,
        Self::LandingPage,
        Self::ProductPage,
        Self::ServicePage,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::HowTo => "how_to",
            Self::Listicle => "listicle",
            Self::Guide => "guide",
            Self::CaseStudy => "case_study",
            Self::LandingPage => "landing_page",
            Self::ProductPage => "product_page",
            Self::ServicePage => "service_page",
        }
    }

    /// Whether this content type publishes as a page rather than an article.
    pub fn is_page(&self) -> bool {
        matches!(
            self,
            Self::LandingPage | Self::ProductPage | Self::ServicePage
        )
    }
}

string_enum!(ContentType, "content type");

/// One `{heading, body}` entry of a draft outline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSection {
    #[serde(default)]
    pub heading: String,
    #[serde(default)]
    pub body: String,
}

/// A full generated content body tied to one backlog idea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    pub id: String,
    pub project_id: String,
    pub hypothesis_id: String,
    pub idea_id: String,
    pub content_type: ContentType,
    pub title: String,
    pub summary: String,
    pub body: String,
    /// Outline sections in canonical order.
    pub structure: Vec<DraftSection>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Asset type recorded for a draft's lead image.
pub const HERO_ASSET_TYPE: &str = "hero";

/// The mandatory lead image of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeroImageAsset {
    pub draft_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: String,
}

impl HeroImageAsset {
    pub fn new(draft_id: impl Into<String>, url: impl Into<String>, alt_text: Option<String>) -> Self {
        Self {
            draft_id: draft_id.into(),
            url: url.into(),
            alt_text,
            asset_type: HERO_ASSET_TYPE.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

/// Publish job state: `queued → publishing → {published | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Publishing,
    Published,
    Failed,
}

impl JobStatus {
    pub const ALL: [Self; 4] = [Self::Queued, Self::Publishing, Self::Published, Self::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Publishing => "publishing",
            Self::Published => "published",
            Self::Failed => "failed",
        }
    }

    /// Queued or publishing: counts toward the one-active-job-per-draft rule.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Publishing)
    }
}

string_enum!(JobStatus, "job status");

/// A queued unit of work: "push this draft to the CMS".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: String,
    pub draft_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idea_id: Option<String>,
    pub project_id: String,
    pub hypothesis_id: String,
    pub target_site: String,
    pub status: JobStatus,
    pub publish_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_post_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Credentials and taxonomy settings for one project's CMS.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CmsConnection {
    pub project_id: String,
    pub base_url: String,
    pub username: String,
    pub app_password: String,
    pub target_site: String,
    pub article_post_type: String,
    pub page_post_type: String,
    #[serde(default)]
    pub article_category_ids: Vec<u64>,
    #[serde(default)]
    pub article_tag_ids: Vec<u64>,
    #[serde(default)]
    pub page_category_ids: Vec<u64>,
    #[serde(default)]
    pub page_tag_ids: Vec<u64>,
}

impl fmt::Debug for CmsConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmsConnection")
            .field("project_id", &self.project_id)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("app_password", &"<redacted>")
            .field("target_site", &self.target_site)
            .finish_non_exhaustive()
    }
}

impl CmsConnection {
    /// Post type and taxonomy IDs for the given content type.
    pub fn target_for(&self, content_type: ContentType) -> (&str, &[u64], &[u64]) {
        if content_type.is_page() {
            (
                &self.page_post_type,
                &self.page_category_ids,
                &self.page_tag_ids,
            )
        } else {
            (
                &self.article_post_type,
                &self.article_category_ids,
                &self.article_tag_ids,
            )
        }
    }
}
