//! Context assembly: project + hypothesis + supporting records → snapshot.
//!
//! The project/hypothesis pair is mandatory and cross-checked. Everything
//! else (business-model summary, customer profile, keyword clusters) is
//! best-effort: a failed load degrades that field and is logged.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use seoflow_shared::{
    BusinessModelSummary, ContextSnapshot, CustomerProfile, KeywordCluster, Project, Result,
    SeoflowError,
};
use seoflow_storage::Storage;

use crate::fallback::FallbackChain;

// ---------------------------------------------------------------------------
// Customer profile resolution
// ---------------------------------------------------------------------------

/// Synonym chains used to read a raw customer-profile document.
pub struct ProfileChains {
    pub persona: FallbackChain<Map<String, Value>, String>,
    pub description: FallbackChain<Map<String, Value>, String>,
    pub pains: FallbackChain<Map<String, Value>, Vec<String>>,
    pub goals: FallbackChain<Map<String, Value>, Vec<String>>,
    pub triggers: FallbackChain<Map<String, Value>, Vec<String>>,
    pub language: FallbackChain<Map<String, Value>, String>,
    pub locale: FallbackChain<Map<String, Value>, String>,
}

impl ProfileChains {
    pub fn new() -> Self {
        Self {
            persona: FallbackChain::keys(
                "persona",
                &["persona", "personaName", "title", "name"],
                read_text,
            ),
            description: FallbackChain::keys(
                "description",
                &["description", "summary", "bio"],
                read_text,
            ),
            pains: FallbackChain::keys(
                "pains",
                &["pains", "painPoints", "problems", "challenges"],
                read_list,
            ),
            goals: FallbackChain::keys(
                "goals",
                &["goals", "desiredOutcomes", "objectives", "jobsToBeDone"],
                read_list,
            ),
            triggers: FallbackChain::keys(
                "triggers",
                &["triggers", "buyingTriggers", "purchaseTriggers", "events"],
                read_list,
            ),
            language: FallbackChain::keys("language", &["language", "lang"], read_text),
            locale: FallbackChain::keys("locale", &["locale", "region"], read_text),
        }
    }

    /// Resolve a raw stored document. Non-object documents resolve to `None`.
    pub fn resolve(&self, raw: &Value) -> Option<CustomerProfile> {
        let obj = raw.as_object()?;
        Some(CustomerProfile {
            persona: self.persona.resolve(obj),
            description: self.description.resolve(obj),
            pains: self.pains.resolve(obj).unwrap_or_default(),
            goals: self.goals.resolve(obj).unwrap_or_default(),
            triggers: self.triggers.resolve(obj).unwrap_or_default(),
            language: self.language.resolve(obj),
            locale: self.locale.resolve(obj),
        })
    }
}

impl Default for ProfileChains {
    fn default() -> Self {
        Self::new()
    }
}

/// A non-blank string value, trimmed.
fn read_text(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A non-empty list from an array of strings/objects or a delimited string.
fn read_list(value: &Value) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(read_list_item).collect(),
        Value::String(s) => s
            .split(['\n', ';'])
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    (!items.is_empty()).then_some(items)
}

fn read_list_item(item: &Value) -> Option<String> {
    match item {
        Value::Object(obj) => ["text", "name", "title", "description"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(read_text)),
        other => read_text(other),
    }
}

// ---------------------------------------------------------------------------
// Language resolution
// ---------------------------------------------------------------------------

/// Everything the language chain may read from.
pub struct LanguageSources<'a> {
    pub profile: Option<&'a CustomerProfile>,
    pub project: &'a Project,
    pub default_language: &'a str,
}

/// Language precedence for downstream prompts.
pub fn language_chain<'a>() -> FallbackChain<LanguageSources<'a>, String> {
    FallbackChain::new("language")
        .step("profile.language", |s: &LanguageSources<'_>| {
            s.profile.and_then(|p| p.language.as_deref()).and_then(non_blank)
        })
        .step("profile.locale", |s: &LanguageSources<'_>| {
            s.profile
                .and_then(|p| p.locale.as_deref())
                .and_then(primary_subtag)
        })
        .step("project.language", |s: &LanguageSources<'_>| {
            s.project.language.as_deref().and_then(non_blank)
        })
        .step("project.settings.language", |s: &LanguageSources<'_>| {
            s.project.settings.get("language").and_then(read_text)
        })
        .step("project.settings.content.language", |s: &LanguageSources<'_>| {
            s.project
                .settings
                .get("content")
                .and_then(|c| c.get("language"))
                .and_then(read_text)
        })
        .step("default", |s: &LanguageSources<'_>| non_blank(s.default_language))
}

fn non_blank(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// `fr-CA` / `fr_CA` → `fr`.
fn primary_subtag(locale: &str) -> Option<String> {
    locale
        .split(['-', '_'])
        .next()
        .and_then(non_blank)
        .map(|s| s.to_lowercase())
}

// ---------------------------------------------------------------------------
// Assembler
// ---------------------------------------------------------------------------

/// Builds [`ContextSnapshot`]s from storage. Nothing is cached between calls.
pub struct ContextAssembler {
    storage: Arc<Storage>,
    default_language: String,
    profile_chains: ProfileChains,
}

impl ContextAssembler {
    pub fn new(storage: Arc<Storage>, default_language: impl Into<String>) -> Self {
        Self {
            storage,
            default_language: default_language.into(),
            profile_chains: ProfileChains::new(),
        }
    }

    /// Load and cross-validate the context for a project/hypothesis pair.
    #[instrument(skip_all, fields(project_id = %project_id, hypothesis_id = %hypothesis_id))]
    pub async fn load(
        &self,
        project_id: &str,
        hypothesis_id: &str,
        user_id: Option<&str>,
    ) -> Result<ContextSnapshot> {
        let project = self
            .storage
            .get_project(project_id)
            .await?
            .ok_or_else(|| SeoflowError::not_found("project", project_id))?;

        if let Some(user_id) = user_id {
            if project.owner_id != user_id {
                return Err(SeoflowError::Ownership {
                    project_id: project.id.clone(),
                    user_id: user_id.to_string(),
                });
            }
        }

        let hypothesis = match self.storage.get_hypothesis(hypothesis_id).await? {
            Some(h) => h,
            None => return Err(self.hypothesis_not_found(project_id, hypothesis_id).await),
        };

        if hypothesis.project_id != project.id {
            return Err(SeoflowError::CrossReference {
                hypothesis_id: hypothesis.id,
                expected_project_id: project.id,
                actual_project_id: hypothesis.project_id,
            });
        }

        let (summary, raw_profile, clusters) = tokio::join!(
            self.storage.get_business_model_summary(hypothesis_id),
            self.storage.get_customer_profile(hypothesis_id),
            self.storage.list_keyword_clusters(hypothesis_id),
        );

        let business_model_summary: Option<BusinessModelSummary> =
            degrade("business model summary", summary).flatten();
        let customer_profile: Option<CustomerProfile> = degrade("customer profile", raw_profile)
            .flatten()
            .and_then(|raw| {
                let resolved = self.profile_chains.resolve(&raw);
                if resolved.is_none() {
                    warn!("customer profile is not a JSON object, ignoring");
                }
                resolved
            });
        let clusters: Vec<KeywordCluster> =
            degrade("keyword clusters", clusters).unwrap_or_default();

        let sources = LanguageSources {
            profile: customer_profile.as_ref(),
            project: &project,
            default_language: &self.default_language,
        };
        let (language_source, language) = language_chain()
            .resolve_traced(&sources)
            .unwrap_or(("fallback", "en".to_string()));

        debug!(
            %language,
            language_source,
            has_summary = business_model_summary.is_some(),
            has_profile = customer_profile.is_some(),
            clusters = clusters.len(),
            "context assembled"
        );

        Ok(ContextSnapshot {
            project,
            hypothesis,
            business_model_summary,
            customer_profile,
            clusters,
            language,
        })
    }

    /// Not-found error listing the project's other hypotheses.
    async fn hypothesis_not_found(&self, project_id: &str, hypothesis_id: &str) -> SeoflowError {
        let others = match self.storage.list_hypotheses_by_project(project_id).await {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "could not list hypotheses for diagnostics");
                Vec::new()
            }
        };

        let message = if others.is_empty() {
            format!("{hypothesis_id} (project {project_id} has no hypotheses)")
        } else {
            let listed = others
                .iter()
                .map(|h| format!("{} ({})", h.id, h.title))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{hypothesis_id} (available hypotheses for project {project_id}: {listed})")
        };
        SeoflowError::not_found("hypothesis", message)
    }
}

/// Log and drop a failed optional load.
fn degrade<T>(what: &str, result: Result<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "failed to load {what}, continuing without it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_context, temp_storage};
    use seoflow_shared::{Hypothesis, Project};
    use serde_json::json;

    fn project(settings: Value, language: Option<&str>) -> Project {
        Project {
            id: "P1".into(),
            owner_id: "U1".into(),
            title: "Invoicer".into(),
            description: None,
            language: language.map(str::to_string),
            settings,
        }
    }

    #[test]
    fn profile_synonyms_follow_precedence() {
        let chains = ProfileChains::new();
        assert_eq!(
            chains.persona.step_names(),
            ["persona", "personaName", "title", "name"]
        );
        assert_eq!(
            chains.goals.step_names(),
            ["goals", "desiredOutcomes", "objectives", "jobsToBeDone"]
        );

        let raw = json!({
            "name": "Fallback name",
            "title": "Freelance designer",
            "bio": "Works alone",
            "painPoints": [{ "text": "late payments" }, "no time", { "other": 1 }],
            "objectives": "Get paid faster; Spend less time on admin\n- Look professional",
            "purchaseTriggers": [],
            "lang": " de ",
        });
        let profile = chains.resolve(&raw).unwrap();

        assert_eq!(profile.persona.as_deref(), Some("Freelance designer"));
        assert_eq!(profile.description.as_deref(), Some("Works alone"));
        assert_eq!(profile.pains, ["late payments", "no time"]);
        assert_eq!(
            profile.goals,
            ["Get paid faster", "Spend less time on admin", "Look professional"]
        );
        assert!(profile.triggers.is_empty());
        assert_eq!(profile.language.as_deref(), Some("de"));
    }

    #[test]
    fn non_object_profile_is_ignored() {
        assert!(ProfileChains::new().resolve(&json!(["x"])).is_none());
    }

    #[test]
    fn language_precedence() {
        assert_eq!(
            language_chain().step_names(),
            [
                "profile.language",
                "profile.locale",
                "project.language",
                "project.settings.language",
                "project.settings.content.language",
                "default",
            ]
        );

        let nested = project(json!({ "content": { "language": "es" } }), None);
        let resolve = |profile: Option<&CustomerProfile>, project: &Project| {
            language_chain().resolve(&LanguageSources {
                profile,
                project,
                default_language: "en",
            })
        };

        assert_eq!(resolve(None, &nested).as_deref(), Some("es"));

        let flat = project(json!({ "language": "it", "content": { "language": "es" } }), None);
        assert_eq!(resolve(None, &flat).as_deref(), Some("it"));

        let explicit = project(json!({ "language": "it" }), Some("nl"));
        assert_eq!(resolve(None, &explicit).as_deref(), Some("nl"));

        let with_locale = CustomerProfile {
            locale: Some("fr_CA".into()),
            ..Default::default()
        };
        assert_eq!(resolve(Some(&with_locale), &explicit).as_deref(), Some("fr"));

        let with_language = CustomerProfile {
            language: Some("pt".into()),
            locale: Some("fr_CA".into()),
            ..Default::default()
        };
        assert_eq!(resolve(Some(&with_language), &explicit).as_deref(), Some("pt"));

        assert_eq!(resolve(None, &project(Value::Null, None)).as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn valid_pair_loads_snapshot() {
        let storage = temp_storage().await;
        seed_context(&storage).await;
        let assembler = ContextAssembler::new(storage, "en");

        let snapshot = assembler.load("P1", "H1", Some("U1")).await.unwrap();
        assert_eq!(snapshot.hypothesis.project_id, "P1");
        assert_eq!(snapshot.project.id, "P1");
        let profile = snapshot.customer_profile.unwrap();
        assert_eq!(profile.pains, ["no time", "low budget"]);
        assert_eq!(snapshot.clusters.len(), 1);
        assert!(snapshot.business_model_summary.is_some());
        assert_eq!(snapshot.language, "en");
    }

    #[tokio::test]
    async fn mismatched_pair_is_cross_reference() {
        let storage = temp_storage().await;
        seed_context(&storage).await;
        storage
            .upsert_project(&Project {
                id: "P2".into(),
                owner_id: "U1".into(),
                title: "Other".into(),
                description: None,
                language: None,
                settings: Value::Null,
            })
            .await
            .unwrap();
        let assembler = ContextAssembler::new(storage, "en");

        let err = assembler.load("P2", "H1", None).await.unwrap_err();
        match err {
            SeoflowError::CrossReference {
                expected_project_id,
                actual_project_id,
                ..
            } => {
                assert_eq!(expected_project_id, "P2");
                assert_eq!(actual_project_id, "P1");
            }
            other => panic!("expected CrossReference, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ownership_and_not_found() {
        let storage = temp_storage().await;
        seed_context(&storage).await;
        storage
            .upsert_hypothesis(&Hypothesis {
                id: "H2".into(),
                project_id: "P1".into(),
                title: "Agencies".into(),
                description: None,
            })
            .await
            .unwrap();
        let assembler = ContextAssembler::new(storage, "en");

        let err = assembler.load("P1", "H1", Some("U9")).await.unwrap_err();
        assert!(matches!(err, SeoflowError::Ownership { .. }));

        let err = assembler.load("P404", "H1", None).await.unwrap_err();
        assert!(matches!(err, SeoflowError::NotFound { entity: "project", .. }));

        let err = assembler.load("P1", "H404", None).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("H1 (Freelancers)"), "{message}");
        assert!(message.contains("H2 (Agencies)"), "{message}");
    }

    #[tokio::test]
    async fn corrupt_profile_degrades_to_none() {
        let storage = temp_storage().await;
        seed_context(&storage).await;
        storage
            .upsert_customer_profile_raw("H1", "{not json")
            .await
            .unwrap();
        let assembler = ContextAssembler::new(storage, "fr");

        let snapshot = assembler.load("P1", "H1", None).await.unwrap();
        assert!(snapshot.customer_profile.is_none());
        assert_eq!(snapshot.language, "fr");
        assert_eq!(snapshot.clusters.len(), 1);
    }
}
