//! Shared types, error model, and configuration for seoflow.
//!
//! This crate is the foundation depended on by all other seoflow crates.
//! It provides:
//! - [`SeoflowError`]: the unified error type, with an [`ErrorKind`] per failure class
//! - Domain types ([`ContextSnapshot`], [`BacklogIdea`], [`Draft`], [`PublishJob`], ...)
//! - Configuration ([`AppConfig`], config loading, env overrides)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CmsConfig, DefaultsConfig, LlmCallConfig, LlmConfig, StorageConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{ErrorKind, Result, SeoflowError};
pub use types::{
    BacklogIdea, BusinessModelSummary, CmsConnection, ContentType, ContextSnapshot,
    CustomerProfile, Draft, DraftSection, HeroImageAsset, Hypothesis, IdeaCandidate, IdeaCategory,
    IdeaStatus, JobStatus, KeywordCluster, Project, PublishJob, SearchIntent, HERO_ASSET_TYPE, new_id,
};
