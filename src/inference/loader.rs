use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use candle_core::Device;
use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::inference::model::LanguageModel;
use crate::inference::text_pipeline::TextGeneratorPipeline;

/// Whether a failed quantized load may be retried with full-precision weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStrategy {
    QuantizedWithFallback,
    QuantizedOnly,
}

#[derive(Debug, Clone)]
pub struct ModelSource {
    pub model_name: String,
    pub revision: String,
    pub quantized_repo: String,
    pub quantized_file: String,
    pub token: Option<String>,
    pub cache_dir: Option<PathBuf>,
}

impl From<&Config> for ModelSource {
    fn from(config: &Config) -> Self {
        ModelSource {
            model_name: config.model_name.clone(),
            revision: config.model_revision.clone(),
            quantized_repo: config.quantized_repo.clone(),
            quantized_file: config.quantized_file.clone(),
            token: config.hf_token(),
            cache_dir: config.cache_dir(),
        }
    }
}

/// Loads the model, trying the 8-bit weights first.
///
/// Blocks for the whole download and load, run it off the async runtime.
#[tracing::instrument(level = "info", skip(source, device), fields(model = %source.model_name))]
pub fn load_model(
    source: &ModelSource,
    device: &Device,
    strategy: LoadStrategy,
) -> Result<Arc<dyn LanguageModel>> {
    let api = build_api(source)?;

    info!(
        "Loading model {} with 8-bit quantization from {}/{}",
        source.model_name, source.quantized_repo, source.quantized_file
    );
    let quantized_err = match load_quantized(&api, source, device) {
        Ok(pipeline) => {
            info!("Model loaded successfully with 8-bit quantization");
            return Ok(Arc::new(pipeline));
        }
        Err(err) => err,
    };
    error!("Failed to load quantized model: {:#}", quantized_err);

    if strategy == LoadStrategy::QuantizedOnly {
        return Err(quantized_err);
    }

    warn!("Attempting fallback without quantization...");
    match load_full(&api, source, device) {
        Ok(pipeline) => {
            info!("Model loaded successfully without quantization");
            Ok(Arc::new(pipeline))
        }
        Err(fallback_err) => {
            error!("Fallback also failed: {:#}", fallback_err);
            Err(fallback_err.context(format!("quantized load failed first: {quantized_err}")))
        }
    }
}

fn build_api(source: &ModelSource) -> Result<Api> {
    let mut builder = ApiBuilder::new().with_token(source.token.clone());
    if let Some(cache_dir) = &source.cache_dir {
        builder = builder.with_cache_dir(cache_dir.clone());
    }
    builder.build().context("Failed to create hub API")
}

fn model_repo(api: &Api, source: &ModelSource) -> ApiRepo {
    api.repo(Repo::with_revision(
        source.model_name.clone(),
        RepoType::Model,
        source.revision.clone(),
    ))
}

fn load_quantized(
    api: &Api,
    source: &ModelSource,
    device: &Device,
) -> Result<TextGeneratorPipeline> {
    info!("Loading tokenizer...");
    let tokenizer_file = model_repo(api, source)
        .get("tokenizer.json")
        .context("Failed to download tokenizer.json")?;

    let quantized_repo = api.repo(Repo::new(source.quantized_repo.clone(), RepoType::Model));
    let gguf_file = quantized_repo
        .get(&source.quantized_file)
        .with_context(|| format!("Failed to download {}", source.quantized_file))?;

    TextGeneratorPipeline::with_quantized_gguf(&tokenizer_file, &gguf_file, device.clone())
}

fn load_full(
    api: &Api,
    source: &ModelSource,
    device: &Device,
) -> Result<TextGeneratorPipeline> {
    let repo = model_repo(api, source);
    let config_file = repo
        .get("config.json")
        .context("Failed to download config.json")?;
    let tokenizer_file = repo
        .get("tokenizer.json")
        .context("Failed to download tokenizer.json")?;
    let weight_files = download_safetensors(&repo)?;
    info!("Downloaded {} weight files", weight_files.len());

    TextGeneratorPipeline::with_safetensors(
        &config_file,
        &tokenizer_file,
        &weight_files,
        device.clone(),
    )
}

fn download_safetensors(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    if let Ok(index_file) = repo.get("model.safetensors.index.json") {
        let index: Value = serde_json::from_str(&std::fs::read_to_string(index_file)?)?;
        return shard_names(&index)?
            .iter()
            .map(|name| {
                repo.get(name)
                    .with_context(|| format!("Failed to download {name}"))
            })
            .collect();
    }

    let single = repo
        .get("model.safetensors")
        .context("Could not find model weights (tried sharded and single safetensors)")?;
    Ok(vec![single])
}

/// Distinct shard file names of a `model.safetensors.index.json`.
fn shard_names(index: &Value) -> Result<BTreeSet<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("No weight map in model.safetensors.index.json"))?;
    Ok(weight_map
        .values()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn shard_names_are_deduplicated() {
        let index = json!({
            "metadata": { "total_size": 1024 },
            "weight_map": {
                "model.embed_tokens.weight": "model-00001-of-00002.safetensors",
                "model.layers.0.mlp.up_proj.weight": "model-00001-of-00002.safetensors",
                "lm_head.weight": "model-00002-of-00002.safetensors",
            }
        });
        let names: Vec<String> = shard_names(&index).unwrap().into_iter().collect();
        assert_eq!(
            names,
            vec![
                "model-00001-of-00002.safetensors",
                "model-00002-of-00002.safetensors"
            ]
        );
    }

    #[test]
    fn index_without_weight_map_is_rejected() {
        assert!(shard_names(&json!({ "metadata": {} })).is_err());
    }

    #[test]
    fn source_takes_credentials_from_config() {
        let config = Config {
            hf_token: "hf_secret".into(),
            ..Config::default()
        };
        let source = ModelSource::from(&config);
        assert_eq!(source.token.as_deref(), Some("hf_secret"));
        assert_eq!(source.model_name, "google/gemma-3n-E4B");
        assert!(source.cache_dir.is_none());
    }
}
