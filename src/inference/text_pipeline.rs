use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::gemma3::{Config as Gemma3Config, Model as Gemma3};
use candle_transformers::models::quantized_gemma3::ModelWeights as QGemma3;
use rand::random;
use serde_json::Value;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::inference::device::device_kind;
use crate::inference::model::{Completion, DeviceKind, LanguageModel, Quantization, SamplingParams};

const STOP_TOKENS: [&str; 2] = ["<eos>", "<end_of_turn>"];

// Adapted from
// https://github.com/huggingface/candle/blob/main/candle-examples/examples/gemma/main.rs
// https://github.com/huggingface/candle/blob/main/candle-examples/examples/quantized-gemma/main.rs
#[derive(Clone)]
pub struct TextGeneratorPipeline {
    weights: Weights,
    device: Device,
    tokenizer: Tokenizer,
    stop_tokens: Vec<u32>,
}

#[derive(Clone)]
enum Weights {
    Quantized(QGemma3),
    Full(Gemma3),
}

impl Weights {
    fn forward(&mut self, input: &Tensor, start_pos: usize) -> Result<Tensor> {
        let logits = match self {
            Weights::Quantized(model) => model.forward(input, start_pos)?,
            Weights::Full(model) => model.forward(input, start_pos)?,
        };
        // (batch, vocab) for the quantized model, (batch, 1, vocab) otherwise
        Ok(logits.flatten_all()?.to_dtype(DType::F32)?)
    }
}

impl TextGeneratorPipeline {
    pub fn with_quantized_gguf(
        tokenizer_file: &Path,
        gguf_file: &Path,
        device: Device,
    ) -> Result<TextGeneratorPipeline> {
        let mut file = std::fs::File::open(gguf_file)?;
        let content = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(gguf_file))?;
        debug!(
            "GGUF file holds {} tensors and {} metadata entries",
            content.tensor_infos.len(),
            content.metadata.len()
        );
        let architecture = match content.metadata.get("general.architecture") {
            Some(value) => Some(value.to_string()?.as_str()),
            None => None,
        };
        ensure_supported(architecture)?;
        let model = QGemma3::from_gguf(content, &mut file, &device)?;

        Self::new(Weights::Quantized(model), tokenizer_file, device)
    }

    pub fn with_safetensors(
        config_file: &Path,
        tokenizer_file: &Path,
        weight_files: &[PathBuf],
        device: Device,
    ) -> Result<TextGeneratorPipeline> {
        let raw: Value = serde_json::from_str(&std::fs::read_to_string(config_file)?)?;
        let multimodal = raw.get("text_config").is_some();
        let raw = text_config(raw);
        ensure_supported(raw.get("model_type").and_then(Value::as_str))?;
        let config: Gemma3Config = serde_json::from_value(raw)
            .context("Unsupported model configuration")?;

        let dtype = if device.is_cpu() {
            DType::F32
        } else {
            DType::BF16
        };
        // Safety: the files are memory mapped and must not change while the model is alive
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weight_files, dtype, &device)? };
        let vb = if multimodal {
            vb.pp("language_model")
        } else {
            vb
        };
        let model = Gemma3::new(false, &config, vb)?;

        Self::new(Weights::Full(model), tokenizer_file, device)
    }

    fn new(weights: Weights, tokenizer_file: &Path, device: Device) -> Result<Self> {
        let tokenizer = Tokenizer::from_file(tokenizer_file).map_err(anyhow::Error::msg)?;
        let stop_tokens: Vec<u32> = STOP_TOKENS
            .iter()
            .filter_map(|token| tokenizer.token_to_id(token))
            .collect();
        if stop_tokens.is_empty() {
            bail!("Cannot find the <eos> token");
        }

        Ok(TextGeneratorPipeline {
            weights,
            device,
            tokenizer,
            stop_tokens,
        })
    }

    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, add_special_tokens)
            .map_err(anyhow::Error::msg)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(tokens, true)
            .map_err(|err| anyhow::anyhow!("Cannot decode tokens: {err}"))
    }
}

impl LanguageModel for TextGeneratorPipeline {
    #[tracing::instrument(level = "info", skip(self, prompt))]
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<Completion> {
        // Clones share the weights, each request gets its own KV cache
        let mut weights = self.weights.clone();
        if let Weights::Full(ref mut model) = weights {
            model.clear_kv_cache();
        }

        let prompt_tokens = self.encode(prompt, true)?;
        let (prompt_tokens, tokens) = decode_loop(
            |input, start_pos| weights.forward(input, start_pos),
            &self.device,
            prompt_tokens,
            &self.stop_tokens,
            params,
        )?;

        let generated_tokens = tokens.len() - prompt_tokens.len();
        debug!("Generated {} tokens", generated_tokens);
        Ok(Completion {
            prompt: self.decode(&prompt_tokens)?,
            text: self.decode(&tokens)?,
            generated_tokens,
        })
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(self.encode(text, false)?.len())
    }

    fn quantization(&self) -> Quantization {
        match self.weights {
            Weights::Quantized(_) => Quantization::Int8,
            Weights::Full(_) => Quantization::Full,
        }
    }

    fn device(&self) -> DeviceKind {
        device_kind(&self.device)
    }
}

/// Truncates the prompt, prefills it, then feeds back one sampled token per step.
///
/// Stops before a stop token or once `max_new_tokens` were generated. Returns the
/// truncated prompt and the full token sequence.
fn decode_loop<F>(
    mut forward: F,
    device: &Device,
    mut prompt_tokens: Vec<u32>,
    stop_tokens: &[u32],
    params: &SamplingParams,
) -> Result<(Vec<u32>, Vec<u32>)>
where
    F: FnMut(&Tensor, usize) -> Result<Tensor>,
{
    prompt_tokens.truncate(params.max_input_tokens);
    if prompt_tokens.is_empty() {
        bail!("Prompt is empty");
    }

    let temperature = (params.temperature > 0.).then_some(params.temperature);
    let mut logits_processor =
        LogitsProcessor::new(params.seed.unwrap_or_else(random), temperature, None);

    let mut tokens = prompt_tokens.clone();
    for index in 0..params.max_new_tokens {
        let context_size = if index > 0 { 1 } else { tokens.len() };
        let start_pos = tokens.len().saturating_sub(context_size);
        let input = Tensor::new(&tokens[start_pos..], device)?.unsqueeze(0)?;
        let logits = forward(&input, start_pos)?;

        let next_token = logits_processor.sample(&logits)?;
        if stop_tokens.contains(&next_token) {
            break;
        }
        tokens.push(next_token);
    }
    Ok((prompt_tokens, tokens))
}

/// Rejects checkpoints the Gemma 3 loaders cannot read, such as Gemma 3n.
fn ensure_supported(architecture: Option<&str>) -> Result<()> {
    match architecture {
        None | Some("gemma3") | Some("gemma3_text") => Ok(()),
        Some(other) => bail!(
            "Unsupported architecture `{other}`, use a Gemma 3 checkpoint (see README)"
        ),
    }
}

/// Multimodal checkpoints nest the language model settings under `text_config`.
fn text_config(raw: Value) -> Value {
    match raw {
        Value::Object(mut map) => match map.remove("text_config") {
            Some(text) => text,
            None => Value::Object(map),
        },
        other => other,
    }
}
