//! Generator component: task context in, program source out.

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::fences::strip_code_fences;
use crate::io::config::ParsegenConfig;
use crate::io::document::DocumentExcerpt;
use crate::io::model::ModelClient;
use crate::io::prompt::{PromptBuilder, PromptInputs};

/// Everything one generation call needs to know.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    /// Expected column names, in order.
    pub schema: &'a [String],
    pub excerpt: &'a DocumentExcerpt,
    /// Diagnostic from the previous failed attempt.
    pub prior_error: Option<&'a str>,
    pub document_path: &'a str,
    pub reference_path: &'a str,
    /// 1-indexed attempt this request belongs to.
    pub attempt: u32,
}

/// Turns a [`GenerationRequest`] into loadable program source.
#[derive(Debug, Clone)]
pub struct Generator {
    prompts: PromptBuilder,
    language: String,
    entry_point: String,
    program_hint: String,
}

impl Generator {
    pub fn new(config: &ParsegenConfig) -> Self {
        Self {
            prompts: PromptBuilder::new(config.prompt_budget_bytes),
            language: config.generator.language.clone(),
            entry_point: config.execution.entry_point.clone(),
            program_hint: config.generator.program_hint.clone(),
        }
    }

    /// Build the prompt, make one model call, and return the unfenced program.
    #[instrument(skip_all, fields(attempt = request.attempt))]
    pub fn generate<M: ModelClient + ?Sized>(
        &self,
        client: &M,
        request: &GenerationRequest<'_>,
    ) -> Result<String> {
        let prompt = self.prompts.build(&PromptInputs {
            language: self.language.clone(),
            entry_point: self.entry_point.clone(),
            program_hint: self.program_hint.clone(),
            columns: request.schema.to_vec(),
            document_path: request.document_path.to_string(),
            reference_path: request.reference_path.to_string(),
            page_count: request.excerpt.page_count,
            excerpt: request.excerpt.text.clone(),
            prior_error: request.prior_error.map(str::to_string),
            attempt: request.attempt,
        })?;
        debug!(
            prompt_bytes = prompt.len(),
            has_feedback = request.prior_error.is_some(),
            "prompt built"
        );

        let completion = client.complete(&prompt)?;
        let source = strip_code_fences(&completion);
        if source.trim().is_empty() {
            return Err(anyhow!("model returned no program text"));
        }
        info!(source_bytes = source.len(), "program generated");
        Ok(source)
    }
}
