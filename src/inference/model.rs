use std::fmt::{Display, Formatter};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Precision of the weights that were actually loaded.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantization {
    #[serde(rename = "8-bit")]
    Int8,
    #[serde(rename = "none")]
    Full,
}

impl Display for Quantization {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Quantization::Int8 => write!(f, "8-bit"),
            Quantization::Full => write!(f, "none"),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Metal,
}

impl Display for DeviceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "cpu"),
            DeviceKind::Cuda => write!(f, "cuda"),
            DeviceKind::Metal => write!(f, "metal"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    /// Maximum number of newly generated tokens
    pub max_new_tokens: usize,

    /// Values at or below zero select the most likely token
    pub temperature: f64,

    /// The prompt is truncated to this many tokens before generation
    pub max_input_tokens: usize,

    pub seed: Option<u64>,
}

/// Output of a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// The decoded input as seen by the model, after truncation
    pub prompt: String,

    /// The decoded prompt followed by the generated continuation
    pub text: String,

    pub generated_tokens: usize,
}

/// A loaded tokenizer and model pair.
///
/// Implementations take `&self` so one instance can serve concurrent requests.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<Completion>;

    /// Number of tokens in `text`, special tokens excluded.
    fn count_tokens(&self, text: &str) -> Result<usize>;

    fn quantization(&self) -> Quantization;

    fn device(&self) -> DeviceKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_serializes_like_it_displays() {
        for q in [Quantization::Int8, Quantization::Full] {
            assert_eq!(serde_json::to_value(q).unwrap(), q.to_string());
        }
    }

    #[test]
    fn device_kind_is_lowercase() {
        assert_eq!(serde_json::to_value(DeviceKind::Cuda).unwrap(), "cuda");
    }
}
