#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use axum::body::Body;
use axum::http::{header, Request, Response};
use gemma_server::config::Config;
use gemma_server::inference::model::{
    Completion, DeviceKind, LanguageModel, Quantization, SamplingParams,
};
use gemma_server::server::state::{AppState, ModelSlot};
use http_body_util::BodyExt;
use serde_json::Value;

/// Deterministic stand-in that echoes the prompt the way a causal model's decode does.
pub struct MockModel {
    pub reply: String,
    pub fail: bool,
    pub calls: Mutex<Vec<(String, SamplingParams)>>,
}

impl MockModel {
    pub fn new(reply: &str) -> Arc<Self> {
        Arc::new(MockModel {
            reply: reply.to_string(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(MockModel {
            reply: String::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<(String, SamplingParams)> {
        self.calls.lock().unwrap().clone()
    }
}

impl LanguageModel for MockModel {
    fn generate(&self, prompt: &str, params: &SamplingParams) -> Result<Completion> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), *params));
        if self.fail {
            bail!("CUDA out of memory");
        }
        let reply: Vec<&str> = self
            .reply
            .split_whitespace()
            .take(params.max_new_tokens)
            .collect();
        Ok(Completion {
            prompt: prompt.to_string(),
            text: format!("{prompt} {}", reply.join(" ")),
            generated_tokens: reply.len(),
        })
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }

    fn quantization(&self) -> Quantization {
        Quantization::Int8
    }

    fn device(&self) -> DeviceKind {
        DeviceKind::Cpu
    }
}

pub fn test_config() -> Config {
    Config {
        max_tokens: 64,
        max_image_size: 256,
        ..Config::default()
    }
}

pub fn ready_state(model: Arc<MockModel>) -> Arc<AppState> {
    Arc::new(AppState::new(
        &test_config(),
        DeviceKind::Cpu,
        ModelSlot::ready(model),
    ))
}

pub fn state_with_slot(slot: ModelSlot) -> Arc<AppState> {
    Arc::new(AppState::new(&test_config(), DeviceKind::Cpu, slot))
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
