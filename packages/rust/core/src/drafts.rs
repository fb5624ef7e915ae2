//! Draft generation: context + backlog idea → structured multi-section draft.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use seoflow_llm::{ChatClient, ChatRequest, extract_json_object};
use seoflow_markup::assemble_body;
use seoflow_shared::{
    BacklogIdea, ContentType, ContextSnapshot, Draft, DraftSection, IdeaStatus, LlmCallConfig,
    Result, SeoflowError, new_id,
};
use seoflow_storage::Storage;

use crate::prompt::render_context;

const ROLE: &str = "You are a senior SEO copywriter who writes complete, well-structured web content.";

/// Caller-selected options for one draft.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRequest {
    pub content_type: ContentType,
    pub content_goal: Option<String>,
    pub funnel_stage: Option<String>,
    pub special_requirements: Option<String>,
    pub language_override: Option<String>,
    /// Model to try first; the configured default is the fallback.
    pub model: Option<String>,
}

impl DraftRequest {
    pub fn new(content_type: ContentType) -> Self {
        Self {
            content_type,
            content_goal: None,
            funnel_stage: None,
            special_requirements: None,
            language_override: None,
            model: None,
        }
    }
}

/// A validated draft, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftPayload {
    pub title: String,
    pub summary: String,
    pub body: String,
    pub structure: Vec<DraftSection>,
    /// Model that produced the payload.
    pub model: String,
}

pub struct DraftGenerator {
    llm: Arc<dyn ChatClient>,
    storage: Arc<Storage>,
    default_model: String,
    budget: LlmCallConfig,
}

impl DraftGenerator {
    pub fn new(
        llm: Arc<dyn ChatClient>,
        storage: Arc<Storage>,
        default_model: impl Into<String>,
        budget: LlmCallConfig,
    ) -> Self {
        Self {
            llm,
            storage,
            default_model: default_model.into(),
            budget,
        }
    }

    /// Generate a draft payload for `idea`. Persists nothing.
    ///
    /// A caller-chosen model that fails (transport or contract) is retried
    /// once with the default model.
    #[instrument(skip_all, fields(idea_id = %idea.id, content_type = %request.content_type))]
    pub async fn generate(
        &self,
        ctx: &ContextSnapshot,
        idea: &BacklogIdea,
        request: &DraftRequest,
    ) -> Result<DraftPayload> {
        let prompt = build_prompt(ctx, idea, request);
        let requested = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        let primary = requested.unwrap_or(&self.default_model);

        match self.attempt(primary, &prompt).await {
            Ok(payload) => Ok(payload),
            Err(e) if primary != self.default_model => {
                warn!(
                    model = primary,
                    fallback = %self.default_model,
                    error = %e,
                    "draft generation failed, retrying with default model"
                );
                self.attempt(&self.default_model, &prompt).await
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(&self, model: &str, prompt: &str) -> Result<DraftPayload> {
        let request = ChatRequest::json(model, ROLE, prompt)
            .with_budget(self.budget.temperature, self.budget.max_tokens);
        let response = self.llm.complete(request).await?;
        debug!(
            model = %response.model,
            tokens_out = response.tokens_out,
            "draft completion received"
        );
        let mut payload = parse_draft(&response.content)?;
        payload.model = response.model;
        Ok(payload)
    }

    /// Generate, persist the draft, and schedule its idea.
    #[instrument(skip_all, fields(idea_id = %idea_id))]
    pub async fn generate_and_store(
        &self,
        ctx: &ContextSnapshot,
        idea_id: &str,
        request: &DraftRequest,
        user_id: &str,
    ) -> Result<Draft> {
        let idea = self
            .storage
            .get_idea(idea_id)
            .await?
            .ok_or_else(|| SeoflowError::not_found("idea", idea_id))?;

        if idea.project_id != ctx.project.id || idea.hypothesis_id != ctx.hypothesis.id {
            return Err(SeoflowError::validation(format!(
                "idea {} belongs to {}/{}, not {}/{}",
                idea.id, idea.project_id, idea.hypothesis_id, ctx.project.id, ctx.hypothesis.id
            )));
        }
        if idea.status == IdeaStatus::Archived {
            return Err(SeoflowError::InvalidTransition {
                entity: "idea",
                from: idea.status.to_string(),
                to: IdeaStatus::Scheduled.to_string(),
            });
        }

        let payload = self.generate(ctx, &idea, request).await?;

        let now = Utc::now();
        let draft = Draft {
            id: new_id(),
            project_id: idea.project_id.clone(),
            hypothesis_id: idea.hypothesis_id.clone(),
            idea_id: idea.id.clone(),
            content_type: request.content_type,
            title: payload.title,
            summary: payload.summary,
            body: payload.body,
            structure: payload.structure,
            model: payload.model,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_draft(&draft).await?;

        if idea.status == IdeaStatus::Backlog
            && !self
                .storage
                .transition_idea_status(&idea.id, IdeaStatus::Backlog, IdeaStatus::Scheduled, user_id)
                .await?
        {
            warn!(idea_id = %idea.id, "idea left backlog concurrently");
        }

        info!(draft_id = %draft.id, sections = draft.structure.len(), "draft stored");
        Ok(draft)
    }
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn content_type_guidance(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::Article => {
            "Write a long-form article: an introduction, 4 to 7 body sections, and a conclusion."
        }
        ContentType::HowTo => {
            "Write a step-by-step how-to: prerequisites first, then one section per step, then troubleshooting."
        }
        ContentType::Listicle => {
            "Write a list article: a short introduction, one section per list item, and a wrap-up."
        }
        ContentType::Guide => {
            "Write a comprehensive guide that covers the topic from fundamentals to advanced practice."
        }
        ContentType::CaseStudy => {
            "Write a case study: context, challenge, approach, measurable results, and lessons learned."
        }
        ContentType::LandingPage => {
            "Write a landing page: a value-led hero section, benefits, social proof, objections, and a closing call to action."
        }
        ContentType::ProductPage => {
            "Write a product page: what it is, who it is for, key features framed as benefits, pricing cues, and FAQs."
        }
        ContentType::ServicePage => {
            "Write a service page: the problem solved, the process, deliverables, proof, and how to get started."
        }
    }
}

/// Full user prompt for a draft call.
pub fn build_prompt(ctx: &ContextSnapshot, idea: &BacklogIdea, request: &DraftRequest) -> String {
    let language = request
        .language_override
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(&ctx.language);

    let mut out = render_context(ctx);

    out.push_str("\n## Idea\n");
    out.push_str(&format!("Title: {}\n", idea.title));
    if !idea.description.trim().is_empty() {
        out.push_str(&format!("Summary: {}\n", idea.description.trim()));
    }
    out.push_str(&format!("Category: {}\n", idea.category));
    if let Some(keyword) = &idea.primary_keyword {
        out.push_str(&format!("Primary keyword: {keyword}\n"));
    }
    out.push_str(&format!("Search intent: {}\n", idea.intent));

    out.push_str("\n## Task\n");
    out.push_str(&format!(
        "Content type: {}. {}\n",
        request.content_type,
        content_type_guidance(request.content_type)
    ));
    for (label, value) in [
        ("Content goal", &request.content_goal),
        ("Funnel stage", &request.funnel_stage),
        ("Special requirements", &request.special_requirements),
    ] {
        if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            out.push_str(&format!("{label}: {v}\n"));
        }
    }
    out.push_str(&format!("Write everything in language: {language}.\n"));
    out.push_str(
        "Section bodies may use simple HTML (<p>, <ul>, <ol>, <li>, <strong>, <em>, <a>). \
         Do not repeat the heading inside the body.\n\n",
    );
    out.push_str(
        "Return one JSON object of this shape:\n\
         {\"title\": string, \"summary\": string, \
         \"outline\": [{\"heading\": string, \"body\": string}]}",
    );
    out
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Validate a draft response and assemble its body.
///
/// `model` is left empty; the caller fills it in.
pub fn parse_draft(content: &str) -> Result<DraftPayload> {
    let obj = extract_json_object(content)?;

    let title = text(&obj, "title");
    let summary = text(&obj, "summary");
    let outline = obj
        .get("outline")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty());

    let missing: Vec<&str> = [
        ("title", title.is_none()),
        ("summary", summary.is_none()),
        ("outline", outline.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    let (Some(title), Some(summary), Some(outline)) = (title, summary, outline) else {
        return Err(SeoflowError::IncompletePayload {
            missing: missing.join(", "),
        });
    };

    let sections: Vec<DraftSection> = outline.iter().filter_map(section).collect();
    let assembled = assemble_body(&sections);
    if assembled.sections.is_empty() {
        return Err(SeoflowError::IncompletePayload {
            missing: "outline".into(),
        });
    }

    Ok(DraftPayload {
        title,
        summary,
        body: assembled.body,
        structure: assembled.sections,
        model: String::new(),
    })
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// A bare string item is treated as a heading with no body.
fn section(item: &Value) -> Option<DraftSection> {
    match item {
        Value::Object(obj) => Some(DraftSection {
            heading: text(obj, "heading").or_else(|| text(obj, "title")).unwrap_or_default(),
            body: text(obj, "body").or_else(|| text(obj, "content")).unwrap_or_default(),
        }),
        Value::String(s) => Some(DraftSection {
            heading: s.trim().to_string(),
            body: String::new(),
        }),
        _ => None,
    }
}
