//! Prompt builder for generation requests.

use std::sync::LazyLock;

use anyhow::Result;
use minijinja::{Environment, context};
use regex::Regex;
use tracing::debug;

const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->")
        .expect("section marker regex should be valid")
});

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template("generator", GENERATOR_TEMPLATE)
            .expect("generator template should be valid");
        Self { env }
    }

    fn render_generator(&self, input: &PromptInputs) -> Result<String> {
        let template = self.env.get_template("generator")?;
        let rendered = template.render(context! {
            language => input.language.trim(),
            entry_point => input.entry_point.trim(),
            program_hint => input.program_hint.trim(),
            columns => &input.columns,
            document_path => &input.document_path,
            reference_path => &input.reference_path,
            page_count => input.page_count,
            excerpt => input.excerpt.trim(),
            prior_error => input.prior_error.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            previous_attempt => input.attempt.saturating_sub(1),
        })?;
        Ok(rendered)
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "excerpt").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let (Some(marker), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());

        // Content after marker, excluding the marker itself
        let content = rendered[marker.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }

    sections
}

/// Apply budget to parsed sections, dropping droppable sections as needed.
///
/// Only the document preview is droppable; feedback is never dropped, at most truncated.
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    let drop_order = ["excerpt"];
    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // If still over budget, truncate the last section
    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let Some(last) = sections.last_mut() else {
            return;
        };
        let before_len = last.content.len();
        if last.content.len() > allowed {
            let keep = if allowed > 12 { allowed - 12 } else { allowed };
            let cut = floor_char_boundary(&last.content, keep);
            last.content.truncate(cut);
            if allowed > 12 {
                last.content.push_str("\n[truncated]");
            }
            debug!(
                section = last.key,
                before_len,
                after_len = last.content.len(),
                "truncated section for budget"
            );
        }
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    (0..=index).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// All inputs needed to build a generation prompt.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    /// Language of the program to generate (e.g. "Python 3").
    pub language: String,
    /// Function name the program must define.
    pub entry_point: String,
    /// Library guidance for the program body.
    pub program_hint: String,
    /// Expected column names, in order.
    pub columns: Vec<String>,
    pub document_path: String,
    pub reference_path: String,
    pub page_count: usize,
    /// Leading text of the document's first page.
    pub excerpt: String,
    /// Diagnostic from the previous failed attempt.
    pub prior_error: Option<String>,
    /// 1-indexed number of the attempt this prompt is for.
    pub attempt: u32,
}

/// Builds a prompt within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build the prompt for one generation attempt.
    pub fn build(&self, input: &PromptInputs) -> Result<String> {
        let rendered = PromptEngine::new().render_generator(input)?;
        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(render_sections(&sections))
    }
}
