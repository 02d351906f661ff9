use std::sync::{Arc, PoisonError, RwLock};

use crate::config::Config;
use crate::generation::GenerationLimits;
use crate::inference::model::{DeviceKind, LanguageModel};

#[derive(Clone)]
pub enum LoadState {
    Loading,
    Ready(Arc<dyn LanguageModel>),
    Failed(String),
}

/// Holds the process-wide model once loading finishes.
///
/// Leaves `Loading` exactly once, later transitions are ignored.
#[derive(Clone)]
pub struct ModelSlot {
    state: Arc<RwLock<LoadState>>,
}

impl Default for ModelSlot {
    fn default() -> Self {
        ModelSlot {
            state: Arc::new(RwLock::new(LoadState::Loading)),
        }
    }
}

impl ModelSlot {
    pub fn ready(model: Arc<dyn LanguageModel>) -> Self {
        let slot = ModelSlot::default();
        slot.finish(Ok(model));
        slot
    }

    pub fn finish(&self, result: anyhow::Result<Arc<dyn LanguageModel>>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*state, LoadState::Loading) {
            tracing::warn!("Ignoring repeated model load result");
            return;
        }
        *state = match result {
            Ok(model) => LoadState::Ready(model),
            Err(err) => LoadState::Failed(format!("{err:#}")),
        };
    }

    pub fn state(&self) -> LoadState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn model(&self) -> Option<Arc<dyn LanguageModel>> {
        match self.state() {
            LoadState::Ready(model) => Some(model),
            _ => None,
        }
    }
}

pub struct AppState {
    /// Identifier echoed in every response
    pub model_name: String,
    pub device: DeviceKind,
    pub limits: GenerationLimits,
    pub max_image_size: u32,
    pub slot: ModelSlot,
}

impl AppState {
    pub fn new(config: &Config, device: DeviceKind, slot: ModelSlot) -> Self {
        AppState {
            model_name: config.model_name.clone(),
            device,
            limits: GenerationLimits::from(config),
            max_image_size: config.max_image_size,
            slot,
        }
    }
}
