//! Draft body markup: section assembly, heading outlines, previews.
//!
//! Draft bodies are HTML. Each outline section renders as an `<h2>` block
//! followed by its body, and sections are joined by a blank line. That
//! assembly order is the canonical section order the refiner checks
//! against, via [`heading_outline`].

mod preview;
mod text;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use seoflow_shared::{DraftSection, Result, SeoflowError};
use tracing::{debug, instrument};

pub use text::{fold_accents, normalize_key, slugify};

/// Separator between assembled section blocks.
pub const BLOCK_SEPARATOR: &str = "\n\n";

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// A rendered body and the sections that contributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledBody {
    pub body: String,
    /// Sections kept, in order (fully blank ones are dropped).
    pub sections: Vec<DraftSection>,
}

/// Render outline sections into one HTML body.
///
/// Sections whose heading and body are both blank are skipped. A blank
/// heading renders the body alone.
pub fn assemble_body(sections: &[DraftSection]) -> AssembledBody {
    let mut blocks = Vec::with_capacity(sections.len() * 2);
    let mut kept = Vec::with_capacity(sections.len());

    for section in sections {
        let heading = section.heading.trim();
        let body = section.body.trim();
        if heading.is_empty() && body.is_empty() {
            continue;
        }
        if !heading.is_empty() {
            blocks.push(format!("<h2>{}</h2>", escape_html(heading)));
        }
        if !body.is_empty() {
            blocks.push(render_section_body(body));
        }
        kept.push(DraftSection {
            heading: heading.to_string(),
            body: body.to_string(),
        });
    }

    AssembledBody {
        body: blocks.join(BLOCK_SEPARATOR),
        sections: kept,
    }
}

/// HTML passes through untouched; plain text becomes `<p>` paragraphs.
fn render_section_body(body: &str) -> String {
    static TAG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<(?:[a-zA-Z][a-zA-Z0-9]*|/[a-zA-Z])[^>]*>").expect("valid regex"));
    static PARA_SPLIT_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid regex"));

    if TAG_RE.is_match(body) {
        return body.to_string();
    }

    PARA_SPLIT_RE
        .split(body)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| {
            let joined = p.lines().map(str::trim).collect::<Vec<_>>().join(" ");
            format!("<p>{}</p>", escape_html(&joined))
        })
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}

/// Escape text for use inside HTML element content or attributes.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// One heading of a body, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

impl Heading {
    /// Tag name, e.g. `h2`.
    pub fn tag(&self) -> String {
        format!("h{}", self.level)
    }
}

/// All `h1`–`h6` headings of an HTML body, in document order.
pub fn heading_outline(html: &str) -> Vec<Heading> {
    static HEADING_SEL: LazyLock<Selector> =
        LazyLock::new(|| Selector::parse("h1, h2, h3, h4, h5, h6").expect("valid selector"));

    let doc = Html::parse_fragment(html);
    doc.select(&HEADING_SEL)
        .filter_map(|el| {
            let level = el.value().name().strip_prefix('h')?.parse().ok()?;
            let text = el.text().collect::<String>();
            Some(Heading {
                level,
                text: text.split_whitespace().collect::<Vec<_>>().join(" "),
            })
        })
        .collect()
}

/// Heading tag sequence (e.g. `["h2", "h2", "h3"]`) used for structure checks.
pub fn heading_levels(html: &str) -> Vec<String> {
    heading_outline(html).iter().map(Heading::tag).collect()
}

/// Number of visible characters, whitespace collapsed.
pub fn text_length(html: &str) -> usize {
    let doc = Html::parse_fragment(html);
    let text: String = doc.root_element().text().collect();
    text.split_whitespace()
        .map(|w| w.chars().count() + 1)
        .sum::<usize>()
        .saturating_sub(1)
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Convert a draft body to Markdown for terminal previews.
#[instrument(skip(html), fields(len = html.len()))]
pub fn to_markdown(html: &str) -> Result<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style", "iframe", "noscript"])
        .build();

    let raw = converter
        .convert(html)
        .map_err(|e| SeoflowError::validation(format!("markdown conversion failed: {e}")))?;

    let cleaned = preview::run_pipeline(&raw);
    debug!(raw_len = raw.len(), final_len = cleaned.len(), "preview rendered");
    Ok(cleaned)
}
