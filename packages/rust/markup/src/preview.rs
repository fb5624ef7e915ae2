//! Cleanup passes for the Markdown preview of a draft body.
//!
//! Each pass is a `&str -> String` function applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run all passes on raw converter output.
pub(crate) fn run_pipeline(md: &str) -> String {
    let mut result = md.to_string();

    result = strip_wrapper_tags(&result);
    result = collapse_blank_lines(&result);
    result = trim_line_ends(&result);
    result = ensure_trailing_newline(&result);

    result
}

/// Drop layout tags the converter leaves behind (keeps their content).
fn strip_wrapper_tags(md: &str) -> String {
    static WRAPPER_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|figure|figcaption)(?:\s[^>]*)?>")
            .expect("valid regex")
    });

    WRAPPER_RE.replace_all(md, "").to_string()
}

/// At most one blank line between blocks.
fn collapse_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_matches('\n');
    format!("{trimmed}\n")
}
