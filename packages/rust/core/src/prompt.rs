//! Shared prompt rendering for the generators.

use seoflow_shared::ContextSnapshot;

/// Placeholder for an empty profile list.
pub const NONE_CAPTURED: &str = "- none captured";

/// Render a list as `- item` lines, or the placeholder when empty.
pub fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return NONE_CAPTURED.to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The context block every generator prompt starts with.
pub fn render_context(ctx: &ContextSnapshot) -> String {
    let mut out = String::new();

    out.push_str("## Project\n");
    out.push_str(&format!("Title: {}\n", ctx.project.title));
    if let Some(desc) = non_blank(ctx.project.description.as_deref()) {
        out.push_str(&format!("Description: {desc}\n"));
    }

    out.push_str("\n## Hypothesis\n");
    out.push_str(&format!("Title: {}\n", ctx.hypothesis.title));
    if let Some(desc) = non_blank(ctx.hypothesis.description.as_deref()) {
        out.push_str(&format!("Description: {desc}\n"));
    }

    if let Some(bms) = &ctx.business_model_summary {
        out.push_str("\n## Business model\n");
        out.push_str(&format!("{}\n", bms.summary.trim()));
        if let Some(vp) = non_blank(bms.value_proposition.as_deref()) {
            out.push_str(&format!("Value proposition: {vp}\n"));
        }
        if let Some(rm) = non_blank(bms.revenue_model.as_deref()) {
            out.push_str(&format!("Revenue model: {rm}\n"));
        }
    }

    if !ctx.clusters.is_empty() {
        out.push_str("\n## Keyword clusters\n");
        for cluster in &ctx.clusters {
            let intent = cluster
                .intent
                .as_deref()
                .map(|i| format!(" [{i}]"))
                .unwrap_or_default();
            out.push_str(&format!("- {}{intent}: {}\n", cluster.name, cluster.keywords.join(", ")));
        }
    }

    let profile = ctx.customer_profile.clone().unwrap_or_default();
    out.push_str("\n## Ideal customer\n");
    if let Some(persona) = non_blank(profile.persona.as_deref()) {
        out.push_str(&format!("Persona: {persona}\n"));
    }
    if let Some(desc) = non_blank(profile.description.as_deref()) {
        out.push_str(&format!("About: {desc}\n"));
    }
    out.push_str(&format!("Pains:\n{}\n", bullet_list(&profile.pains)));
    out.push_str(&format!("Goals:\n{}\n", bullet_list(&profile.goals)));
    out.push_str(&format!("Triggers:\n{}\n", bullet_list(&profile.triggers)));

    out
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
