//! JSON bundle import for context sources and CMS settings.
//!
//! Records are upserted by id, so importing the same bundle twice is a
//! no-op apart from timestamps.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use seoflow_shared::{
    BusinessModelSummary, CmsConnection, HeroImageAsset, Hypothesis, KeywordCluster, Project,
    Result, SeoflowError,
};
use seoflow_storage::Storage;

/// A raw customer-profile document for one hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub hypothesis_id: String,
    /// Stored verbatim; field names are resolved at read time.
    pub profile: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportBundle {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    #[serde(default)]
    pub business_models: Vec<BusinessModelSummary>,
    #[serde(default)]
    pub customer_profiles: Vec<ProfileRecord>,
    #[serde(default)]
    pub keyword_clusters: Vec<KeywordCluster>,
    #[serde(default)]
    pub cms_connections: Vec<CmsConnection>,
    #[serde(default)]
    pub hero_images: Vec<HeroImageAsset>,
}

impl ImportBundle {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SeoflowError::io(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| SeoflowError::validation(format!("invalid import bundle: {e}")))
    }

    /// Hypotheses and connections must point at a project in the bundle or
    /// already stored.
    async fn check_references(&self, storage: &Storage) -> Result<()> {
        let in_bundle: HashSet<&str> = self.projects.iter().map(|p| p.id.as_str()).collect();
        let referenced = self
            .hypotheses
            .iter()
            .map(|h| h.project_id.as_str())
            .chain(self.cms_connections.iter().map(|c| c.project_id.as_str()));

        for project_id in referenced {
            if in_bundle.contains(project_id) {
                continue;
            }
            if storage.get_project(project_id).await?.is_none() {
                return Err(SeoflowError::validation(format!(
                    "bundle references unknown project {project_id}"
                )));
            }
        }
        Ok(())
    }
}

/// Record counts of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub projects: usize,
    pub hypotheses: usize,
    pub business_models: usize,
    pub customer_profiles: usize,
    pub keyword_clusters: usize,
    pub cms_connections: usize,
    pub hero_images: usize,
}

/// Upsert every record of the bundle.
#[instrument(skip_all)]
pub async fn import_bundle(storage: &Storage, bundle: &ImportBundle) -> Result<ImportSummary> {
    bundle.check_references(storage).await?;

    for project in &bundle.projects {
        storage.upsert_project(project).await?;
    }
    for hypothesis in &bundle.hypotheses {
        storage.upsert_hypothesis(hypothesis).await?;
    }
    for summary in &bundle.business_models {
        storage.upsert_business_model_summary(summary).await?;
    }
    for record in &bundle.customer_profiles {
        storage
            .upsert_customer_profile(&record.hypothesis_id, &record.profile)
            .await?;
    }
    for cluster in &bundle.keyword_clusters {
        storage.upsert_keyword_cluster(cluster).await?;
    }
    for connection in &bundle.cms_connections {
        storage.upsert_cms_connection(connection).await?;
    }
    for hero in &bundle.hero_images {
        storage.upsert_hero_image(hero).await?;
    }

    let summary = ImportSummary {
        projects: bundle.projects.len(),
        hypotheses: bundle.hypotheses.len(),
        business_models: bundle.business_models.len(),
        customer_profiles: bundle.customer_profiles.len(),
        keyword_clusters: bundle.keyword_clusters.len(),
        cms_connections: bundle.cms_connections.len(),
        hero_images: bundle.hero_images.len(),
    };
    info!(?summary, "bundle imported");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextAssembler;
    use crate::test_support::temp_storage;

    const BUNDLE: &str = r#"{
        "projects": [
            { "id": "P1", "owner_id": "U1", "title": "Invoicer",
              "settings": { "content": { "language": "fr" } } }
        ],
        "hypotheses": [ { "id": "H1", "project_id": "P1", "title": "Freelancers" } ],
        "business_models": [ { "hypothesis_id": "H1", "summary": "Subscription invoicing" } ],
        "customer_profiles": [
            { "hypothesis_id": "H1", "profile": { "problems": "no time\nlow budget" } }
        ],
        "keyword_clusters": [
            { "id": "C1", "hypothesis_id": "H1", "name": "late payments", "keywords": ["late invoices"] }
        ]
    }"#;

    #[tokio::test]
    async fn imported_bundle_assembles() {
        let storage = temp_storage().await;
        let bundle = ImportBundle::from_json(BUNDLE).unwrap();

        let summary = import_bundle(&storage, &bundle).await.unwrap();
        assert_eq!(summary.projects, 1);
        assert_eq!(summary.keyword_clusters, 1);
        assert_eq!(summary.hero_images, 0);

        // Importing twice is idempotent.
        import_bundle(&storage, &bundle).await.unwrap();

        let ctx = ContextAssembler::new(storage, "en")
            .load("P1", "H1", Some("U1"))
            .await
            .unwrap();
        assert_eq!(ctx.language, "fr");
        assert_eq!(ctx.customer_profile.unwrap().pains, ["no time", "low budget"]);
        assert_eq!(ctx.clusters.len(), 1);
    }

    #[tokio::test]
    async fn dangling_project_reference_is_rejected() {
        let storage = temp_storage().await;
        let bundle = ImportBundle::from_json(
            r#"{ "hypotheses": [ { "id": "H9", "project_id": "P9", "title": "x" } ] }"#,
        )
        .unwrap();

        let err = import_bundle(&storage, &bundle).await.unwrap_err();
        assert!(matches!(err, SeoflowError::Validation { .. }));
        assert!(storage.get_hypothesis("H9").await.unwrap().is_none());
    }

    #[test]
    fn malformed_bundle_is_validation_error() {
        assert!(matches!(
            ImportBundle::from_json("{ \"projects\": 3 }"),
            Err(SeoflowError::Validation { .. })
        ));
    }
}
