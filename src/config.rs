use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use clap_serde_derive::ClapSerde;

pub const DEFAULT_CONFIG_FILE: &str = "GemmaServer.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

#[derive(ClapSerde, Debug, Clone)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub address: String,

    /// The port the listener binds to
    #[default(8080)]
    #[arg(short, long, env)]
    pub port: u16,

    /// Hugging Face repository of the model, also echoed in responses
    #[default("google/gemma-3n-E4B".to_string())]
    #[arg(long, env)]
    pub model_name: String,

    /// Revision of the model repository
    #[default("main".to_string())]
    #[arg(long, env)]
    pub model_revision: String,

    /// Repository holding the 8-bit GGUF weights
    #[default("unsloth/gemma-3n-E4B-it-GGUF".to_string())]
    #[arg(long, env)]
    pub quantized_repo: String,

    /// Q8_0 GGUF file inside the quantized repository
    #[default("gemma-3n-E4B-it-Q8_0.gguf".to_string())]
    #[arg(long, env)]
    pub quantized_file: String,

    /// Access token used when downloading gated models
    #[default(String::new())]
    #[arg(long, env)]
    pub hf_token: String,

    /// Directory for downloaded model files, the hub default is used when empty
    #[default(String::new())]
    #[arg(long, env)]
    pub cache_dir: String,

    /// Upper bound for newly generated tokens
    #[default(2048)]
    #[arg(long, env)]
    pub max_tokens: usize,

    /// Sampling temperature used when the request does not set one
    #[default(0.7)]
    #[arg(long, env)]
    pub temperature: f64,

    /// Prompts are truncated to this many tokens
    #[default(512)]
    #[arg(long, env)]
    pub max_input_tokens: usize,

    /// Images larger than this on either side are downscaled
    #[default(1024)]
    #[arg(long, env)]
    pub max_image_size: u32,

    /// Force inference on the CPU even if an accelerator is available
    #[default(false)]
    #[arg(long, env, num_args = 0..=1, default_missing_value = "true")]
    pub cpu: bool,

    /// OTLP collector endpoint, telemetry export is disabled when empty
    #[default(String::new())]
    #[arg(long, env)]
    pub otlp_endpoint: String,

    /// Keep console logging enabled while exporting telemetry
    #[default(false)]
    #[arg(long, env, num_args = 0..=1, default_missing_value = "true")]
    pub console: bool,

    /// Write a Chrome trace to this file
    #[default(String::new())]
    #[arg(long, env)]
    pub chrome_trace: String,

    /// PEM certificate, TLS is enabled when both certificate and key are set
    #[default(String::new())]
    #[arg(long, env)]
    pub tls_cert_file: String,

    /// PEM private key
    #[default(String::new())]
    #[arg(long, env)]
    pub tls_key_file: String,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<<Config as ClapSerde>::Opt> {
        let str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {path}"))?;
        let config = toml::from_str(&str)
            .with_context(|| format!("Failed to parse configuration file {path}"))?;
        Ok(config)
    }

    /// Layers CLI and environment options over the TOML file.
    ///
    /// A missing default file is not an error, an explicitly named one is.
    pub fn load(config_file: &str, opt: &mut <Config as ClapSerde>::Opt) -> Result<Config> {
        match Config::from_toml(config_file) {
            Ok(file) => Ok(Config::from(file).merge(opt)),
            Err(_) if config_file == DEFAULT_CONFIG_FILE && !Path::new(config_file).exists() => {
                Ok(Config::from(opt))
            }
            Err(err) => Err(err),
        }
    }

    pub fn hf_token(&self) -> Option<String> {
        non_empty(&self.hf_token).map(str::to_string)
    }

    pub fn cache_dir(&self) -> Option<PathBuf> {
        non_empty(&self.cache_dir).map(PathBuf::from)
    }

    pub fn otlp_endpoint(&self) -> Option<String> {
        non_empty(&self.otlp_endpoint).map(str::to_string)
    }

    pub fn chrome_trace(&self) -> Option<PathBuf> {
        non_empty(&self.chrome_trace).map(PathBuf::from)
    }

    pub fn tls_files(&self) -> Option<(PathBuf, PathBuf)> {
        match (non_empty(&self.tls_cert_file), non_empty(&self.tls_key_file)) {
            (Some(cert), Some(key)) => Some((cert.into(), key.into())),
            _ => None,
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}
