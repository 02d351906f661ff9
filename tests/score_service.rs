use anyhow::anyhow;
use axum::http::StatusCode;
use gemma_server::server::score_router;
use gemma_server::server::state::ModelSlot;
use serde_json::json;
use tower::util::ServiceExt;

mod common;

use common::{get, json_body, post_json, ready_state, state_with_slot, MockModel};

#[tokio::test]
async fn score_rejects_requests_before_the_model_loads() {
    let app = score_router(state_with_slot(ModelSlot::default()));

    let response = app
        .oneshot(post_json("/score", &json!({ "prompt": "Rate this hotel" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await, json!({ "error": "Model not loaded" }));
}

#[tokio::test]
async fn score_stays_unavailable_after_a_failed_load() {
    let slot = ModelSlot::default();
    slot.finish(Err(anyhow!("GGUF file not found")));
    let app = score_router(state_with_slot(slot));

    let health = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app
        .oneshot(post_json("/score", &json!({ "prompt": "Rate this hotel" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn score_returns_the_result_field() {
    let model = MockModel::new("8/10, clean rooms.");
    let app = score_router(ready_state(model.clone()));

    let response = app
        .oneshot(post_json(
            "/score",
            &json!({ "prompt": "Rate this hotel", "max_tokens": 16, "temperature": 0.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "result": "8/10, clean rooms." })
    );

    let params = model.calls()[0].1;
    assert_eq!(params.max_new_tokens, 16);
    assert_eq!(params.temperature, 0.0);
}

#[tokio::test]
async fn score_caps_the_requested_budget() {
    let model = MockModel::new("ok");
    let app = score_router(ready_state(model.clone()));

    app.oneshot(post_json(
        "/score",
        &json!({ "prompt": "Rate", "max_tokens": 4096 }),
    ))
    .await
    .unwrap();

    assert_eq!(model.calls()[0].1.max_new_tokens, 64);
}

#[tokio::test]
async fn score_requires_a_prompt() {
    let app = score_router(ready_state(MockModel::new("unused")));

    let response = app
        .oneshot(post_json("/score", &json!({ "max_tokens": 4 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn score_service_does_not_expose_analyze() {
    let app = score_router(ready_state(MockModel::new("unused")));

    let response = app
        .oneshot(post_json("/analyze", &json!({ "prompt": "hi" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
