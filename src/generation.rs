use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::inference::model::{LanguageModel, SamplingParams};

/// Server side bounds applied to every generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationLimits {
    pub max_new_tokens: usize,
    pub default_temperature: f64,
    pub max_input_tokens: usize,
}

impl From<&Config> for GenerationLimits {
    fn from(config: &Config) -> Self {
        GenerationLimits {
            max_new_tokens: config.max_tokens,
            default_temperature: config.temperature,
            max_input_tokens: config.max_input_tokens,
        }
    }
}

impl GenerationLimits {
    /// The token budget never exceeds the configured ceiling.
    pub fn sampling(&self, max_tokens: Option<usize>, temperature: Option<f64>) -> SamplingParams {
        SamplingParams {
            max_new_tokens: max_tokens
                .unwrap_or(self.max_new_tokens)
                .min(self.max_new_tokens),
            temperature: temperature
                .filter(|t| t.is_finite())
                .unwrap_or(self.default_temperature),
            max_input_tokens: self.max_input_tokens,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutcome {
    pub response: String,
    pub tokens_used: usize,
    /// Wall clock seconds spent tokenizing, generating and decoding
    pub processing_time: f64,
}

#[tracing::instrument(level = "info", skip(model, prompt), fields(prompt_len = prompt.len()))]
pub fn run_generation(
    model: &dyn LanguageModel,
    prompt: &str,
    params: &SamplingParams,
) -> Result<GenerationOutcome> {
    let start = Instant::now();
    let completion = model.generate(prompt, params)?;
    let response = strip_prompt_echo(&completion.text, &[&completion.prompt, prompt]).to_string();
    let tokens_used = model.count_tokens(&response)?;

    Ok(GenerationOutcome {
        response,
        tokens_used,
        processing_time: start.elapsed().as_secs_f64(),
    })
}

/// Runs [`run_generation`] on the blocking thread pool.
pub async fn generate_blocking(
    model: Arc<dyn LanguageModel>,
    prompt: String,
    params: SamplingParams,
) -> Result<GenerationOutcome> {
    tokio::task::spawn_blocking(move || run_generation(model.as_ref(), &prompt, &params))
        .await
        .context("Generation task panicked")?
}

/// Removes every leading repetition of the prompts from the decoded output.
pub fn strip_prompt_echo<'a>(text: &'a str, prompts: &[&str]) -> &'a str {
    let mut text = text.trim();
    loop {
        let stripped = prompts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .find_map(|p| text.strip_prefix(p));
        match stripped {
            Some(rest) => text = rest.trim(),
            None => return text,
        }
    }
}
