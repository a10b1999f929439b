//! Text preview of the source document for the generation prompt.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::io::config::ExcerptConfig;
use crate::io::process::{render_command, run_command_with_timeout};

const PAGE_BREAK: char = '\x0c';
const EXTRACT_OUTPUT_LIMIT_BYTES: usize = 50_000_000;

/// Bounded preview of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentExcerpt {
    /// Leading characters of the first page.
    pub text: String,
    /// Number of pages the extractor reported.
    pub page_count: usize,
}

/// Extract the first `max_chars` characters of the first page of `document`.
///
/// With an extractor command configured its stdout is used (pages separated by form
/// feeds); otherwise the document is read as text.
#[instrument(skip_all, fields(document = %document.display(), max_chars))]
pub fn extract_excerpt(
    document: &Path,
    config: &ExcerptConfig,
    max_chars: usize,
) -> Result<DocumentExcerpt> {
    if !document.is_file() {
        return Err(anyhow!("document not found: {}", document.display()));
    }
    let full_text = if config.command.is_empty() {
        let bytes =
            fs::read(document).with_context(|| format!("read document {}", document.display()))?;
        String::from_utf8_lossy(&bytes).into_owned()
    } else {
        run_extractor(document, config)?
    };
    let excerpt = excerpt_from_text(&full_text, max_chars);
    debug!(
        page_count = excerpt.page_count,
        chars = excerpt.text.chars().count(),
        "document excerpt extracted"
    );
    Ok(excerpt)
}

fn run_extractor(document: &Path, config: &ExcerptConfig) -> Result<String> {
    let document_arg = document.to_string_lossy();
    let cmd = render_command(&config.command, &[("document", document_arg.as_ref())])?;
    let output = run_command_with_timeout(
        cmd,
        None,
        Duration::from_secs(config.timeout_secs),
        EXTRACT_OUTPUT_LIMIT_BYTES,
    )
    .context("run document text extractor")?;
    if output.timed_out {
        return Err(anyhow!(
            "document text extractor timed out after {}s",
            config.timeout_secs
        ));
    }
    if !output.status.success() {
        return Err(anyhow!(
            "document text extractor failed with status {:?}: {}",
            output.status.code(),
            output.last_stderr_line().unwrap_or_default()
        ));
    }
    Ok(output.stdout_lossy())
}

/// Split extracted text into pages and keep the head of the first one.
pub fn excerpt_from_text(text: &str, max_chars: usize) -> DocumentExcerpt {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    // Extractors terminate every page with a form feed, leaving an empty tail.
    while pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    let first = pages.first().copied().unwrap_or_default();
    DocumentExcerpt {
        text: first.chars().take(max_chars).collect(),
        page_count: pages.len(),
    }
}
