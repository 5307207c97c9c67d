//! Output sanitization.
//!
//! Model replies sometimes leak code blocks, raw JSON, or internal
//! identifiers. Everything that looks like that is stripped before the
//! reply reaches the user.

use filachat_config::SanitizerConfig;
use regex_lite::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```.*?```").expect("fence pattern is valid"));

static TRAILING_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)\{\s*"?[a-zA-Z_][\s\S]*?\}[ \t]*$"#).expect("json pattern is valid")
});

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\s\S]*?\]").expect("bracket pattern is valid"));

static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("newline pattern is valid"));

static SPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("space pattern is valid"));

static SPACE_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*\n[ \t]*").expect("newline space pattern is valid"));

/// Strips technical artifacts from model output.
#[derive(Debug, Clone)]
pub struct Sanitizer {
    terms: Vec<Regex>,
    fallback: String,
}

impl Sanitizer {
    pub fn new(config: &SanitizerConfig) -> Self {
        let terms = config
            .forbidden_terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .filter_map(|term| {
                let pattern = format!(r"(?i)\b{}\b", regex_lite::escape(term));
                match Regex::new(&pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(term, error = %e, "Skipping forbidden term");
                        None
                    }
                }
            })
            .collect();

        Self {
            terms,
            fallback: config.fallback.clone(),
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Run the full pipeline. Never returns an empty string.
    pub fn sanitize(&self, text: &str) -> String {
        let stripped = CODE_FENCE.replace_all(text, "");
        let stripped = TRAILING_JSON.replace_all(&stripped, "");
        let stripped = BRACKETED.replace_all(&stripped, "");
        let cleaned = self.filter_terms(&stripped);

        if cleaned.is_empty() {
            debug!("Sanitized reply is empty, using fallback");
            self.fallback.clone()
        } else {
            cleaned
        }
    }

    /// Remove forbidden terms and normalize whitespace, nothing else.
    pub fn filter_terms(&self, text: &str) -> String {
        let mut current = text.to_string();
        loop {
            let mut next = current.clone();
            for re in &self.terms {
                next = re.replace_all(&next, "").into_owned();
            }
            if next == current {
                break;
            }
            current = next;
        }
        normalize_whitespace(&current)
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new(&SanitizerConfig::default())
    }
}

fn normalize_whitespace(text: &str) -> String {
    let text = SPACE_AROUND_NEWLINE.replace_all(text, "\n");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    let text = SPACE_RUN.replace_all(&text, " ");
    text.trim().to_string()
}
