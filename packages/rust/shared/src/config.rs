//! Application configuration for seoflow.
//!
//! User config lives at `~/.seoflow/seoflow.toml`.
//! Environment overrides (`SEOFLOW_*`) win over the config file, which wins
//! over defaults. Secrets are never stored in the file: it only names the
//! environment variables that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoflowError};
use crate::types::CmsConnection;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "seoflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".seoflow";

// ---------------------------------------------------------------------------
// Config structs (matching seoflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// CMS connection settings.
    #[serde(default)]
    pub cms: CmsConfig,

    /// Local database settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Language used when neither profile nor project carries one.
    #[serde(default = "default_language")]
    pub language: String,

    /// Number of ideas requested when the caller does not say.
    #[serde(default = "default_idea_count")]
    pub idea_count: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            idea_count: default_idea_count(),
        }
    }
}

fn default_language() -> String {
    "en".into()
}
fn default_idea_count() -> usize {
    5
}

/// Sampling budget for one call type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LlmCallConfig {
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token budget.
    pub max_tokens: u32,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used when the caller does not pick one, and as the fallback.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Request timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Idea generation budget.
    #[serde(default = "default_ideas_call")]
    pub ideas: LlmCallConfig,

    /// Draft generation budget (large, to avoid truncated JSON).
    #[serde(default = "default_drafts_call")]
    pub drafts: LlmCallConfig,

    /// Draft refinement budget.
    #[serde(default = "default_refine_call")]
    pub refine: LlmCallConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_llm_base_url(),
            default_model: default_model(),
            timeout_secs: default_llm_timeout(),
            ideas: default_ideas_call(),
            drafts: default_drafts_call(),
            refine: default_refine_call(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o-mini".into()
}
fn default_llm_timeout() -> u64 {
    180
}
fn default_ideas_call() -> LlmCallConfig {
    LlmCallConfig {
        temperature: 0.4,
        max_tokens: 2_000,
    }
}
fn default_drafts_call() -> LlmCallConfig {
    LlmCallConfig {
        temperature: 0.7,
        max_tokens: 6_000,
    }
}
fn default_refine_call() -> LlmCallConfig {
    LlmCallConfig {
        temperature: 0.5,
        max_tokens: 6_000,
    }
}

/// `[cms]` section. All connection fields are optional: when any of them is
/// missing the persisted per-project connection record is used instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CmsConfig {
    /// REST API root, e.g. `https://example.com/wp-json/wp/v2`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// CMS user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Name of the env var holding the application password.
    #[serde(default = "default_app_password_env")]
    pub app_password_env: String,

    /// Label stored on publish jobs.
    #[serde(default = "default_target_site")]
    pub target_site: String,

    /// REST collection for article-like content.
    #[serde(default = "default_article_post_type")]
    pub article_post_type: String,

    /// REST collection for page-like content.
    #[serde(default = "default_page_post_type")]
    pub page_post_type: String,

    /// Category IDs applied to articles.
    #[serde(default)]
    pub article_category_ids: Vec<u64>,

    /// Tag IDs applied to articles.
    #[serde(default)]
    pub article_tag_ids: Vec<u64>,

    /// Category IDs applied to pages.
    #[serde(default)]
    pub page_category_ids: Vec<u64>,

    /// Tag IDs applied to pages.
    #[serde(default)]
    pub page_tag_ids: Vec<u64>,

    /// Request timeout in seconds.
    #[serde(default = "default_cms_timeout")]
    pub timeout_secs: u64,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            username: None,
            app_password_env: default_app_password_env(),
            target_site: default_target_site(),
            article_post_type: default_article_post_type(),
            page_post_type: default_page_post_type(),
            article_category_ids: Vec::new(),
            article_tag_ids: Vec::new(),
            page_category_ids: Vec::new(),
            page_tag_ids: Vec::new(),
            timeout_secs: default_cms_timeout(),
        }
    }
}

fn default_app_password_env() -> String {
    "SEOFLOW_CMS_APP_PASSWORD".into()
}
fn default_target_site() -> String {
    "wordpress".into()
}
fn default_article_post_type() -> String {
    "posts".into()
}
fn default_page_post_type() -> String {
    "pages".into()
}
fn default_cms_timeout() -> u64 {
    60
}

impl CmsConfig {
    /// Build a connection from config + the password env var, if complete.
    ///
    /// `lookup` resolves environment variables; pass `|k| std::env::var(k).ok()`
    /// in production.
    pub fn connection(
        &self,
        project_id: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<CmsConnection> {
        let base_url = self.base_url.as_deref().filter(|s| !s.trim().is_empty())?;
        let username = self.username.as_deref().filter(|s| !s.trim().is_empty())?;
        let app_password = lookup(&self.app_password_env).filter(|s| !s.trim().is_empty())?;

        Some(CmsConnection {
            project_id: project_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            app_password,
            target_site: self.target_site.clone(),
            article_post_type: self.article_post_type.clone(),
            page_post_type: self.page_post_type.clone(),
            article_category_ids: self.article_category_ids.clone(),
            article_tag_ids: self.article_tag_ids.clone(),
            page_category_ids: self.page_category_ids.clone(),
            page_tag_ids: self.page_tag_ids.clone(),
        })
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.seoflow/seoflow.db".into()
}

impl StorageConfig {
    /// Database path with a leading `~/` expanded to the home directory.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match self.database_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir()
                    .ok_or_else(|| SeoflowError::config("could not determine home directory"))?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.database_path)),
        }
    }
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply `SEOFLOW_*` overrides resolved through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("SEOFLOW_LLM_MODEL").filter(|v| !v.is_empty()) {
            self.llm.default_model = model;
        }
        if let Some(url) = lookup("SEOFLOW_CMS_URL").filter(|v| !v.is_empty()) {
            self.cms.base_url = Some(url);
        }
        if let Some(user) = lookup("SEOFLOW_CMS_USERNAME").filter(|v| !v.is_empty()) {
            self.cms.username = Some(user);
        }
        if let Some(path) = lookup("SEOFLOW_DATABASE").filter(|v| !v.is_empty()) {
            self.storage.database_path = path;
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.seoflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| SeoflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.seoflow/seoflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk and apply env overrides.
/// Falls back to defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    let mut config = if path.exists() {
        load_config_from(&path)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        AppConfig::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    Ok(config)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SeoflowError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| SeoflowError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SeoflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SeoflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SeoflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the LLM API key env var is set and non-empty, returning it.
pub fn validate_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.llm.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(SeoflowError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable."
        ))),
    }
}
