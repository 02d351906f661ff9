use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::inference::device::MemoryReport;
use crate::inference::model::{DeviceKind, Quantization};
use crate::server::state::{AppState, LoadState};

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Loading,
    Failed,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub model: String,
    pub device: DeviceKind,
    /// `unknown` until a model is loaded
    #[serde(with = "quantization_or_unknown")]
    pub quantization: Option<Quantization>,
    pub memory: MemoryReport,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[axum_macros::debug_handler]
pub async fn handle_health(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let (status, device, quantization, error) = match state.slot.state() {
        LoadState::Ready(model) => (
            HealthStatus::Healthy,
            model.device(),
            Some(model.quantization()),
            None,
        ),
        LoadState::Loading => (HealthStatus::Loading, state.device, None, None),
        LoadState::Failed(reason) => (HealthStatus::Failed, state.device, None, Some(reason)),
    };
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    (
        code,
        Json(HealthResponse {
            status,
            model: state.model_name.clone(),
            device,
            quantization,
            memory: MemoryReport::sample(device),
            timestamp,
            error,
        }),
    )
}

mod quantization_or_unknown {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::inference::model::Quantization;

    const UNKNOWN: &str = "unknown";

    pub fn serialize<S: Serializer>(
        value: &Option<Quantization>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(quantization) => quantization.serialize(serializer),
            None => serializer.serialize_str(UNKNOWN),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Quantization>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Known(Quantization),
            Other(String),
        }
        Ok(match Repr::deserialize(deserializer)? {
            Repr::Known(quantization) => Some(quantization),
            Repr::Other(_) => None,
        })
    }
}
