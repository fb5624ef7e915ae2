//! Idea generation: context + category → content-idea candidates.
//!
//! The model must return `{"ideas": [...]}` with exactly the requested
//! number of items. Candidates are only persisted by [`IdeaGenerator::store`],
//! which drops duplicates of existing ideas (and of each other).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use seoflow_llm::{ChatClient, ChatRequest, extract_json_object};
use seoflow_markup::normalize_key;
use seoflow_shared::{
    BacklogIdea, ContextSnapshot, IdeaCandidate, IdeaCategory, IdeaStatus, KeywordCluster,
    LlmCallConfig, Result, SearchIntent, SeoflowError, new_id,
};
use seoflow_storage::Storage;

use crate::prompt::render_context;

/// Largest batch a single call may request.
pub const MAX_IDEAS: usize = 20;

const ROLE: &str = "You are an SEO content strategist for B2B and B2C products.";

/// Result of persisting a batch of candidates.
#[derive(Debug, Clone, Default)]
pub struct StoreOutcome {
    pub created: Vec<BacklogIdea>,
    pub skipped_duplicates: usize,
}

/// Generates and stores content ideas.
pub struct IdeaGenerator {
    llm: Arc<dyn ChatClient>,
    storage: Arc<Storage>,
    model: String,
    budget: LlmCallConfig,
}

impl IdeaGenerator {
    pub fn new(
        llm: Arc<dyn ChatClient>,
        storage: Arc<Storage>,
        model: impl Into<String>,
        budget: LlmCallConfig,
    ) -> Self {
        Self {
            llm,
            storage,
            model: model.into(),
            budget,
        }
    }

    /// Ask the model for exactly `count` ideas. Persists nothing.
    #[instrument(skip_all, fields(hypothesis_id = %ctx.hypothesis.id, category = %category, count))]
    pub async fn generate(
        &self,
        ctx: &ContextSnapshot,
        category: IdeaCategory,
        count: usize,
        language: &str,
    ) -> Result<Vec<IdeaCandidate>> {
        if !(1..=MAX_IDEAS).contains(&count) {
            return Err(SeoflowError::validation(format!(
                "idea count must be between 1 and {MAX_IDEAS}, got {count}"
            )));
        }

        let prompt = build_prompt(ctx, category, count, language);
        let request = ChatRequest::json(&self.model, ROLE, prompt)
            .with_budget(self.budget.temperature, self.budget.max_tokens);

        let response = self.llm.complete(request).await?;
        debug!(
            model = %response.model,
            tokens_in = response.tokens_in,
            tokens_out = response.tokens_out,
            "ideas completion received"
        );

        let candidates = parse_ideas(&response.content, count, category)?;
        info!(count = candidates.len(), "ideas generated");
        Ok(candidates)
    }

    /// Persist candidates as backlog ideas, skipping duplicates.
    #[instrument(skip_all, fields(hypothesis_id = %ctx.hypothesis.id, candidates = candidates.len()))]
    pub async fn store(
        &self,
        ctx: &ContextSnapshot,
        candidates: &[IdeaCandidate],
        user_id: &str,
    ) -> Result<StoreOutcome> {
        let project_id = &ctx.project.id;
        let hypothesis_id = &ctx.hypothesis.id;
        let mut outcome = StoreOutcome::default();
        let mut seen_titles = HashSet::new();
        let mut seen_summaries = HashSet::new();

        for candidate in candidates {
            let title_key = title_key(&candidate.title);
            let summary_key = normalize_key(&candidate.summary);

            let batch_duplicate = seen_titles.contains(&title_key)
                || (!summary_key.is_empty() && seen_summaries.contains(&summary_key));
            seen_titles.insert(title_key.clone());
            if !summary_key.is_empty() {
                seen_summaries.insert(summary_key.clone());
            }
            if batch_duplicate {
                debug!(title = %candidate.title, "duplicate within batch");
                outcome.skipped_duplicates += 1;
                continue;
            }

            if let Some(existing) = self
                .storage
                .find_idea_by_keys(project_id, hypothesis_id, &title_key, &summary_key)
                .await?
            {
                debug!(title = %candidate.title, %existing, "duplicate of stored idea");
                outcome.skipped_duplicates += 1;
                continue;
            }

            let now = Utc::now();
            let idea = BacklogIdea {
                id: new_id(),
                project_id: project_id.clone(),
                hypothesis_id: hypothesis_id.clone(),
                cluster_id: match_cluster(&ctx.clusters, candidate.primary_keyword.as_deref())
                    .map(|c| c.id.clone()),
                title: candidate.title.clone(),
                description: candidate.summary.clone(),
                category: candidate.category,
                status: IdeaStatus::Backlog,
                primary_keyword: candidate.primary_keyword.clone(),
                intent: candidate.intent,
                search_volume: candidate.search_volume,
                difficulty: candidate.difficulty,
                opportunity_score: candidate.opportunity_score,
                created_by: user_id.to_string(),
                updated_by: user_id.to_string(),
                created_at: now,
                updated_at: now,
            };

            // The unique title index catches a concurrent insert of the same idea.
            if self.storage.insert_idea(&idea, &title_key, &summary_key).await? {
                outcome.created.push(idea);
            } else {
                outcome.skipped_duplicates += 1;
            }
        }

        info!(
            created = outcome.created.len(),
            skipped = outcome.skipped_duplicates,
            "ideas stored"
        );
        Ok(outcome)
    }

    /// [`generate`](Self::generate) then [`store`](Self::store).
    pub async fn generate_and_store(
        &self,
        ctx: &ContextSnapshot,
        category: IdeaCategory,
        count: usize,
        language: &str,
        user_id: &str,
    ) -> Result<StoreOutcome> {
        let candidates = self.generate(ctx, category, count, language).await?;
        self.store(ctx, &candidates, user_id).await
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn category_guidance(category: IdeaCategory) -> &'static str {
    match category {
        IdeaCategory::Pain => {
            "Each idea addresses one of the customer's pains and shows how to relieve it."
        }
        IdeaCategory::Goal => "Each idea helps the customer reach one of their goals.",
        IdeaCategory::Trigger => {
            "Each idea targets the moment a buying trigger happens and what to do next."
        }
        IdeaCategory::Feature => "Each idea explains a product capability through a concrete use case.",
        IdeaCategory::Benefit => "Each idea demonstrates a measurable outcome the customer gets.",
        IdeaCategory::Faq => "Each idea answers a question the customer searches for before buying.",
        IdeaCategory::Comparison => {
            "Each idea compares approaches or alternatives the customer is weighing."
        }
        IdeaCategory::Informational => {
            "Each idea teaches something the customer needs to understand their problem space."
        }
    }
}

/// Full user prompt for an ideas call.
pub fn build_prompt(
    ctx: &ContextSnapshot,
    category: IdeaCategory,
    count: usize,
    language: &str,
) -> String {
    format!(
        "{context}
## Task
Propose exactly {count} SEO content ideas in the category {category}.
{guidance}
Write titles and summaries in language: {language}.

Return one JSON object of this shape, with exactly {count} items in \"ideas\":
{{\"ideas\": [{{\"title\": string, \"summary\": string, \"primary_keyword\": string, \
\"intent\": \"informational\" | \"commercial\" | \"transactional\" | \"navigational\", \
\"search_volume\": number | null, \"difficulty\": number | null, \"opportunity_score\": number | null}}]}}",
        context = render_context(ctx),
        category = category.as_str(),
        guidance = category_guidance(category),
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Parse and validate an ideas response.
pub fn parse_ideas(
    content: &str,
    count: usize,
    category: IdeaCategory,
) -> Result<Vec<IdeaCandidate>> {
    let obj = extract_json_object(content)?;
    let items = obj
        .get("ideas")
        .and_then(Value::as_array)
        .ok_or_else(|| SeoflowError::response_shape("response has no \"ideas\" array"))?;

    if items.len() != count {
        return Err(SeoflowError::response_shape(format!(
            "expected {count} ideas, got {}",
            items.len()
        )));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_item(i, item, category))
        .collect()
}

fn parse_item(index: usize, item: &Value, category: IdeaCategory) -> Result<IdeaCandidate> {
    let obj = item
        .as_object()
        .ok_or_else(|| SeoflowError::response_shape(format!("idea {index} is not an object")))?;

    let title = text_field(obj, &["title"])
        .ok_or_else(|| SeoflowError::response_shape(format!("idea {index} has no title")))?;

    Ok(IdeaCandidate {
        title,
        summary: text_field(obj, &["summary", "description"]).unwrap_or_default(),
        category,
        primary_keyword: text_field(obj, &["primary_keyword", "primaryKeyword", "keyword"]),
        intent: text_field(obj, &["intent", "search_intent", "searchIntent"])
            .map(|raw| SearchIntent::parse_lenient(&raw))
            .unwrap_or_default(),
        search_volume: metric_field(obj, &["search_volume", "searchVolume"]),
        difficulty: metric_field(obj, &["difficulty", "keyword_difficulty", "keywordDifficulty"]),
        opportunity_score: metric_field(obj, &["opportunity_score", "opportunityScore"]),
    })
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        obj.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn metric_field(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
        .and_then(coerce_metric)
}

/// A non-negative finite number from a JSON number or numeric string.
pub fn coerce_metric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| !matches!(c, ',' | '_') && !c.is_whitespace())
                .collect();
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    (n.is_finite() && n >= 0.0).then_some(n)
}

/// First cluster whose name or a keyword equals the primary keyword.
/// Dedup key of a title. Titles with no letters or digits fall back to
/// their trimmed, lower-cased text so they never share the empty key.
fn title_key(title: &str) -> String {
    let key = normalize_key(title);
    if key.is_empty() {
        title.trim().to_lowercase()
    } else {
        key
    }
}

fn match_cluster<'a>(
    clusters: &'a [KeywordCluster],
    primary_keyword: Option<&str>,
) -> Option<&'a KeywordCluster> {
    let wanted = normalize_key(primary_keyword?);
    if wanted.is_empty() {
        return None;
    }
    clusters.iter().find(|cluster| {
        normalize_key(&cluster.name) == wanted
            || cluster.keywords.iter().any(|k| normalize_key(k) == wanted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedChatClient, seed_context, snapshot, temp_storage};
    use serde_json::json;

    fn ideas_json(n: usize) -> String {
        let items: Vec<Value> = (0..n)
            .map(|i| {
                json!({
                    "title": format!("Idea number {i}"),
                    "summary": format!("Summary {i}"),
                    "primary_keyword": "late invoices",
                    "intent": "Commercial",
                    "search_volume": "1,200",
                    "difficulty": -3,
                    "opportunity_score": 0.7
                })
            })
            .collect();
        json!({ "ideas": items }).to_string()
    }

    fn budget() -> LlmCallConfig {
        LlmCallConfig {
            temperature: 0.4,
            max_tokens: 2_000,
        }
    }

    async fn generator(llm: Arc<ScriptedChatClient>) -> (IdeaGenerator, Arc<Storage>) {
        let storage = temp_storage().await;
        seed_context(&storage).await;
        (
            IdeaGenerator::new(llm, storage.clone(), "test-model", budget()),
            storage,
        )
    }

    #[test]
    fn metrics_are_coerced() {
        assert_eq!(coerce_metric(&json!(12)), Some(12.0));
        assert_eq!(coerce_metric(&json!("1,200")), Some(1200.0));
        assert_eq!(coerce_metric(&json!(" 3.5 ")), Some(3.5));
        assert_eq!(coerce_metric(&json!(-1)), None);
        assert_eq!(coerce_metric(&json!("NaN")), None);
        assert_eq!(coerce_metric(&json!("high")), None);
        assert_eq!(coerce_metric(&json!(true)), None);
        assert_eq!(coerce_metric(&json!([1])), None);
    }

    #[test]
    fn parse_exact_count() {
        let ideas = parse_ideas(&ideas_json(5), 5, IdeaCategory::Pain).unwrap();
        assert_eq!(ideas.len(), 5);
        assert_eq!(ideas[0].intent, SearchIntent::Commercial);
        assert_eq!(ideas[0].search_volume, Some(1200.0));
        assert_eq!(ideas[0].difficulty, None);
        assert_eq!(ideas[0].opportunity_score, Some(0.7));
        assert_eq!(ideas[0].category, IdeaCategory::Pain);
    }

    #[test]
    fn wrong_count_is_response_shape() {
        let err = parse_ideas(&ideas_json(3), 5, IdeaCategory::Pain).unwrap_err();
        assert!(matches!(err, SeoflowError::ResponseShape { .. }));
        let err = parse_ideas(&ideas_json(6), 5, IdeaCategory::Pain).unwrap_err();
        assert!(matches!(err, SeoflowError::ResponseShape { .. }));
    }

    #[test]
    fn contract_violations() {
        assert!(matches!(
            parse_ideas("", 1, IdeaCategory::Faq),
            Err(SeoflowError::EmptyResponse)
        ));
        assert!(matches!(
            parse_ideas("no json here", 1, IdeaCategory::Faq),
            Err(SeoflowError::InvalidJson { .. })
        ));
        assert!(matches!(
            parse_ideas(r#"{"items": []}"#, 1, IdeaCategory::Faq),
            Err(SeoflowError::ResponseShape { .. })
        ));
        assert!(matches!(
            parse_ideas(r#"{"ideas": [{"summary": "x"}]}"#, 1, IdeaCategory::Faq),
            Err(SeoflowError::ResponseShape { .. })
        ));
    }

    #[test]
    fn unknown_intent_defaults_and_description_alias() {
        let content = r#"{"ideas": [{"title": "T", "description": "D", "intent": "curious"}]}"#;
        let ideas = parse_ideas(content, 1, IdeaCategory::Goal).unwrap();
        assert_eq!(ideas[0].intent, SearchIntent::Informational);
        assert_eq!(ideas[0].summary, "D");
    }

    #[test]
    fn prompt_embeds_context_and_count() {
        let prompt = build_prompt(&snapshot(), IdeaCategory::Pain, 3, "en");
        assert!(prompt.contains("exactly 3 SEO content ideas in the category PAIN"));
        assert!(prompt.contains("- no time\n- low budget"));
        assert!(prompt.contains("language: en"));
    }

    #[tokio::test]
    async fn count_out_of_range_is_rejected_before_calling() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let (generator, _) = generator(llm.clone()).await;
        for count in [0, 21] {
            let err = generator
                .generate(&snapshot(), IdeaCategory::Pain, count, "en")
                .await
                .unwrap_err();
            assert!(matches!(err, SeoflowError::Validation { .. }));
        }
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn generate_uses_budget_and_json_mode() {
        let llm = Arc::new(ScriptedChatClient::new(vec![Ok(ideas_json(2))]));
        let (generator, _) = generator(llm.clone()).await;

        let ideas = generator
            .generate(&snapshot(), IdeaCategory::Goal, 2, "en")
            .await
            .unwrap();
        assert_eq!(ideas.len(), 2);

        let request = llm.requests().remove(0);
        assert_eq!(request.model, "test-model");
        assert_eq!(request.temperature, 0.4);
        assert_eq!(request.max_tokens, 2_000);
        assert!(request.json_mode);
        assert!(request.system.ends_with("Respond with valid JSON only."));
    }

    #[tokio::test]
    async fn storing_same_title_twice_keeps_one() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let (generator, storage) = generator(llm).await;
        let ctx = snapshot();
        let candidate = parse_ideas(&ideas_json(1), 1, IdeaCategory::Pain).unwrap();

        let first = generator.store(&ctx, &candidate, "U1").await.unwrap();
        assert_eq!(first.created.len(), 1);
        assert_eq!(first.created[0].cluster_id.as_deref(), Some("C1"));

        let mut again = candidate.clone();
        again[0].title = "  IDEA number 0!! ".into();
        again[0].summary = "Something else".into();
        let second = generator.store(&ctx, &again, "U1").await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.skipped_duplicates, 1);

        let stored = storage.list_ideas("P1", "H1", None).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, IdeaStatus::Backlog);
    }

    #[tokio::test]
    async fn duplicate_summary_within_batch_is_skipped() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let (generator, _) = generator(llm).await;
        let mut batch = parse_ideas(&ideas_json(2), 2, IdeaCategory::Pain).unwrap();
        batch[1].summary = batch[0].summary.to_uppercase();

        let outcome = generator.store(&snapshot(), &batch, "U1").await.unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.skipped_duplicates, 1);
    }

    #[tokio::test]
    async fn symbol_only_titles_are_distinct() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let (generator, storage) = generator(llm).await;
        let mut batch = parse_ideas(&ideas_json(2), 2, IdeaCategory::Pain).unwrap();
        batch[0].title = "???".into();
        batch[0].summary = "what to ask first".into();
        batch[1].title = "💸💸".into();
        batch[1].summary = "totally different money topic".into();

        let outcome = generator.store(&snapshot(), &batch, "U1").await.unwrap();
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(outcome.skipped_duplicates, 0);

        // The same symbol title is still a duplicate.
        let again = generator.store(&snapshot(), &batch[..1], "U1").await.unwrap();
        assert_eq!(again.skipped_duplicates, 1);
        assert_eq!(storage.list_ideas("P1", "H1", None).await.unwrap().len(), 2);
    }

    #[test]
    fn title_key_never_empty_for_non_blank_titles() {
        assert_eq!(title_key("  Late   Invoices! "), "late invoices");
        assert_eq!(title_key(" ??? "), "???");
        assert_ne!(title_key("???"), title_key("💸💸"));
    }

    #[tokio::test]
    async fn failed_generation_persists_nothing() {
        let llm = Arc::new(ScriptedChatClient::new(vec![Ok(ideas_json(2))]));
        let (generator, storage) = generator(llm).await;

        let err = generator
            .generate_and_store(&snapshot(), IdeaCategory::Pain, 3, "en", "U1")
            .await
            .unwrap_err();
        assert!(matches!(err, SeoflowError::ResponseShape { .. }));
        assert!(storage.list_ideas("P1", "H1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_pain_ideas() {
        let llm = Arc::new(ScriptedChatClient::new(vec![Ok(json!({
            "ideas": [
                { "title": "Invoicing when you have no time", "summary": "Batch admin in 15 minutes" },
                { "title": "Getting paid on a low budget", "summary": "Free tools that chase clients" },
                { "title": "Why freelancers get paid late", "summary": "Root causes and fixes" }
            ]
        })
        .to_string())]));
        let storage = temp_storage().await;
        seed_context(&storage).await;
        let assembler = crate::context::ContextAssembler::new(storage.clone(), "en");
        let ctx = assembler.load("P1", "H1", Some("U1")).await.unwrap();
        let generator = IdeaGenerator::new(llm.clone(), storage, "test-model", budget());

        let ideas = generator
            .generate(&ctx, IdeaCategory::Pain, 3, &ctx.language)
            .await
            .unwrap();
        assert_eq!(ideas.len(), 3);
        assert!(ideas.iter().all(|i| !i.title.is_empty()));

        let prompt = &llm.requests()[0].user;
        assert!(prompt.contains("- no time"));
        assert!(prompt.contains("- low budget"));
    }
}
