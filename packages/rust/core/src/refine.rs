//! In-place draft refinement.
//!
//! The refined body must keep the heading sequence of the original
//! (levels and order; heading text may change). Anything else is rejected
//! rather than stored.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use seoflow_llm::{ChatClient, ChatRequest, extract_json_object};
use seoflow_markup::{heading_levels, heading_outline, text_length};
use seoflow_shared::{Draft, LlmCallConfig, Result, SeoflowError};
use seoflow_storage::Storage;

const ROLE: &str = "You are an editor who revises existing web content in place.";

/// Refined length outside this ratio of the original is logged.
const LENGTH_DRIFT: (f64, f64) = (0.6, 1.5);

/// Replacement content for a draft.
#[derive(Debug, Clone, PartialEq)]
pub struct Refinement {
    pub body: String,
    pub summary: Option<String>,
}

/// Optional call to action to weave into the conclusion.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallToAction<'a> {
    pub url: Option<&'a str>,
    pub text: Option<&'a str>,
}

pub struct DraftRefiner {
    llm: Arc<dyn ChatClient>,
    storage: Arc<Storage>,
    model: String,
    budget: LlmCallConfig,
}

impl DraftRefiner {
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

    /// Ask the model to revise `draft` following `instructions`.
    #[instrument(skip_all, fields(draft_id = %draft.id))]
    pub async fn refine(
        &self,
        draft: &Draft,
        instructions: &str,
        cta: CallToAction<'_>,
    ) -> Result<Refinement> {
        if draft.body.trim().is_empty() {
            return Err(SeoflowError::EmptyDraft {
                draft_id: draft.id.clone(),
            });
        }
        if instructions.trim().is_empty() {
            return Err(SeoflowError::validation("refinement instructions are empty"));
        }

        let prompt = build_prompt(draft, instructions, cta);
        let request = ChatRequest::json(&self.model, ROLE, prompt)
            .with_budget(self.budget.temperature, self.budget.max_tokens);
        let response = self.llm.complete(request).await?;
        debug!(model = %response.model, tokens_out = response.tokens_out, "refine completion received");

        let refinement = parse_refinement(&response.content)?;
        check_structure(&draft.body, &refinement.body)?;

        let before = text_length(&draft.body);
        let after = text_length(&refinement.body);
        if before > 0 {
            let ratio = after as f64 / before as f64;
            if ratio < LENGTH_DRIFT.0 || ratio > LENGTH_DRIFT.1 {
                warn!(before, after, ratio, "refined body length drifted");
            }
        }

        Ok(refinement)
    }

    /// Load, refine, and replace body/summary of a stored draft.
    pub async fn refine_and_save(
        &self,
        draft_id: &str,
        instructions: &str,
        cta: CallToAction<'_>,
    ) -> Result<Draft> {
        let draft = self
            .storage
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| SeoflowError::not_found("draft", draft_id))?;

        let refinement = self.refine(&draft, instructions, cta).await?;
        let summary = refinement.summary.unwrap_or_else(|| draft.summary.clone());

        if !self
            .storage
            .replace_draft_content(draft_id, &refinement.body, &summary)
            .await?
        {
            return Err(SeoflowError::not_found("draft", draft_id));
        }

        info!(draft_id, "draft refined");
        self.storage
            .get_draft(draft_id)
            .await?
            .ok_or_else(|| SeoflowError::not_found("draft", draft_id))
    }
}

/// Full user prompt for a refine call.
pub fn build_prompt(draft: &Draft, instructions: &str, cta: CallToAction<'_>) -> String {
    let outline = heading_outline(&draft.body);

    let mut out = String::new();
    out.push_str("## Current draft\n");
    out.push_str(&format!("Title: {}\n", draft.title));
    out.push_str(&format!("Summary: {}\n", draft.summary));
    out.push_str("Body (HTML):\n");
    out.push_str(draft.body.trim());
    out.push_str("\n\n## Heading outline\n");
    if outline.is_empty() {
        out.push_str("(no headings)\n");
    }
    for (i, heading) in outline.iter().enumerate() {
        out.push_str(&format!("{}. <{}> {}\n", i + 1, heading.tag(), heading.text));
    }

    out.push_str("\n## Instructions\n");
    out.push_str(instructions.trim());
    out.push_str("\n\n## Rules\n");
    out.push_str("- Modify the draft in place: edit the existing paragraphs and sections.\n");
    out.push_str("- Do not append new sections.\n");
    out.push_str(&format!(
        "- Keep exactly {} headings, at the same levels and in the same order. Heading text may change.\n",
        outline.len()
    ));
    out.push_str("- Keep the overall length comparable unless the instructions ask otherwise.\n");
    out.push_str("- Keep the language of the draft.\n");

    match cta.url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => {
            let label = cta
                .text
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or("a clear call to action");
            out.push_str(&format!(
                "- Weave a link to {url} with the text \"{label}\" into the concluding section. \
                 Do not add a separate call-to-action heading.\n"
            ));
        }
        None => out.push_str(
            "- Leave any existing call to action untouched unless the instructions target it.\n",
        ),
    }

    out.push_str(
        "\nReturn one JSON object of this shape:\n\
         {\"body\": string (the full revised HTML body), \"summary\": string}",
    );
    out
}

/// Validate a refine response.
pub fn parse_refinement(content: &str) -> Result<Refinement> {
    let obj = extract_json_object(content)?;
    let body = obj
        .get("body")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .ok_or(SeoflowError::MissingBody)?;
    let summary = obj
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    Ok(Refinement {
        body: body.to_string(),
        summary,
    })
}

/// The heading level sequence must be unchanged.
pub fn check_structure(original: &str, refined: &str) -> Result<()> {
    let expected = heading_levels(original);
    let actual = heading_levels(refined);
    if expected != actual {
        return Err(SeoflowError::StructureMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedChatClient, seed_draft, temp_storage};
    use seoflow_shared::ContentType;
    use serde_json::json;

    const THREE: &str = "<h2>One</h2>\n\n<p>a</p>\n\n<h2>Two</h2>\n\n<p>b</p>\n\n<h3>Three</h3>\n\n<p>c</p>";

    fn budget() -> LlmCallConfig {
        LlmCallConfig {
            temperature: 0.5,
            max_tokens: 6_000,
        }
    }

    fn refiner(llm: Arc<ScriptedChatClient>, storage: Arc<Storage>) -> DraftRefiner {
        DraftRefiner::new(llm, storage, "test-model", budget())
    }

    fn three_heading_draft(mut draft: Draft) -> Draft {
        draft.body = THREE.into();
        draft
    }

    #[test]
    fn heading_levels_must_match() {
        assert!(check_structure(THREE, "<h2>Uno</h2><p>x</p><h2>Dos</h2><h3>Tres</h3>").is_ok());

        let err = check_structure(THREE, "<h2>One</h2><h2>Two</h2>").unwrap_err();
        match err {
            SeoflowError::StructureMismatch { expected, actual } => {
                assert_eq!(expected, ["h2", "h2", "h3"]);
                assert_eq!(actual, ["h2", "h2"]);
            }
            other => panic!("expected StructureMismatch, got {other:?}"),
        }

        // Same count, different order.
        assert!(check_structure(THREE, "<h3>x</h3><h2>y</h2><h2>z</h2>").is_err());
    }

    #[test]
    fn body_is_required() {
        assert!(matches!(parse_refinement(r#"{"summary": "s"}"#), Err(SeoflowError::MissingBody)));
        assert!(matches!(parse_refinement(r#"{"body": "  "}"#), Err(SeoflowError::MissingBody)));
        let r = parse_refinement(r#"{"body": "<p>x</p>"}"#).unwrap();
        assert_eq!(r.summary, None);
    }

    #[tokio::test]
    async fn empty_draft_fails_before_calling() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let storage = temp_storage().await;
        let mut draft = seed_draft(&storage, ContentType::Article).await;
        draft.body = "   ".into();

        let err = refiner(llm.clone(), storage)
            .refine(&draft, "shorter", CallToAction::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SeoflowError::EmptyDraft { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn blank_instructions_are_rejected() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let storage = temp_storage().await;
        let draft = seed_draft(&storage, ContentType::Article).await;

        let err = refiner(llm.clone(), storage)
            .refine(&draft, " \n", CallToAction::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SeoflowError::Validation { .. }));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn three_headings_survive_refinement() {
        let refined = "<h2>First</h2><p>a!</p><h2>Second</h2><p>b!</p><h3>Third</h3><p>c!</p>";
        let llm = Arc::new(ScriptedChatClient::new(vec![Ok(json!({ "body": refined }).to_string())]));
        let storage = temp_storage().await;
        let draft = three_heading_draft(seed_draft(&storage, ContentType::Article).await);

        let result = refiner(llm, storage)
            .refine(&draft, "more energetic", CallToAction::default())
            .await
            .unwrap();
        let texts: Vec<String> = heading_outline(&result.body).into_iter().map(|h| h.text).collect();
        assert_eq!(texts, ["First", "Second", "Third"]);
    }

    #[tokio::test]
    async fn dropped_heading_is_a_mismatch() {
        let refined = "<h2>First</h2><p>a</p><h2>Second</h2><p>b and c</p>";
        let llm = Arc::new(ScriptedChatClient::new(vec![Ok(json!({ "body": refined }).to_string())]));
        let storage = temp_storage().await;
        let draft = three_heading_draft(seed_draft(&storage, ContentType::Article).await);

        let err = refiner(llm, storage)
            .refine(&draft, "merge the last two sections", CallToAction::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SeoflowError::StructureMismatch { .. }));
        assert_eq!(err.kind(), seoflow_shared::ErrorKind::Contract);
    }

    #[tokio::test]
    async fn cta_rules_reach_the_prompt() {
        let storage = temp_storage().await;
        let draft = seed_draft(&storage, ContentType::Article).await;

        let with_cta = build_prompt(
            &draft,
            "add a CTA",
            CallToAction {
                url: Some("https://invoicer.test/trial"),
                text: Some("Start free trial"),
            },
        );
        assert!(with_cta.contains("https://invoicer.test/trial"));
        assert!(with_cta.contains("\"Start free trial\""));
        assert!(with_cta.contains("Do not add a separate call-to-action heading"));
        assert!(with_cta.contains("Keep exactly 2 headings"));

        let without = build_prompt(&draft, "tighten", CallToAction::default());
        assert!(without.contains("Leave any existing call to action untouched"));
    }

    #[tokio::test]
    async fn refine_and_save_replaces_body_and_keeps_summary() {
        let refined = "<h2>Causes</h2>\n\n<p>Unclear payment terms.</p>\n\n<h2>Fixes</h2>\n\n<p>Automatic reminders.</p>";
        let llm = Arc::new(ScriptedChatClient::new(vec![Ok(json!({ "body": refined }).to_string())]));
        let storage = temp_storage().await;
        let original = seed_draft(&storage, ContentType::Article).await;

        let saved = refiner(llm, storage.clone())
            .refine_and_save("D1", "be more specific", CallToAction::default())
            .await
            .unwrap();
        assert_eq!(saved.id, original.id);
        assert_eq!(saved.body, refined);
        assert_eq!(saved.summary, original.summary);
    }

    #[tokio::test]
    async fn missing_draft_is_not_found() {
        let llm = Arc::new(ScriptedChatClient::new(vec![]));
        let storage = temp_storage().await;
        let err = refiner(llm, storage)
            .refine_and_save("D404", "x", CallToAction::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SeoflowError::NotFound { entity: "draft", .. }));
    }
}
