//! Drives the real Axum router with `tower::ServiceExt::oneshot` against a
//! tempdir-backed `Retriever` — no TCP listener, no mocked handlers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use coldstore::ColdStore;
use hotstore::RedbHotStore;
use index::{HotIndex, ShardConfig};
use http_body_util::BodyExt;
use metrics_exporter_prometheus::PrometheusBuilder;
use retriever::{RetrievalPolicy, Retriever};
use serde_json::{json, Value};
use server::{build_router, ServerConfig, ServerState};
use std::sync::Arc;
use tower::ServiceExt;

fn build_state(tmp: &std::path::Path) -> Arc<ServerState> {
    let hot_index = Arc::new(HotIndex::new(tmp.join("hot"), vectorizer::DIM, ShardConfig::default()));
    let hot_store = Arc::new(RedbHotStore::open(tmp.join("hot.redb")).unwrap());
    let cold_store = Arc::new(ColdStore::open(tmp.join("cold.redb")).unwrap());
    let policy = RetrievalPolicy {
        threshold: 0.10,
        ..RetrievalPolicy::default()
    };
    let retriever = Arc::new(Retriever::new(hot_index, hot_store, cold_store, policy));
    let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
    Arc::new(ServerState::new(
        ServerConfig::default(),
        retriever,
        metrics_handle,
    ))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_reports_ok() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(build_state(tmp.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn post_then_pre_round_trips_the_ingested_turn() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(build_state(tmp.path()));

    let post_body = json!({
        "tenant_id": "t1",
        "user_id": "u1",
        "user_message": "alpha beta gamma",
        "assistant_message": "ok"
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/post")
                .header("content-type", "application/json")
                .body(Body::from(post_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let post_out = body_json(response).await;
    assert_eq!(post_out["status"], "ok");
    let turn_id = post_out["turn_id"].as_str().unwrap().to_string();

    let pre_body = json!({
        "tenant_id": "t1",
        "user_id": "u1",
        "query": "alpha beta"
    });
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/pre")
                .header("content-type", "application/json")
                .body(Body::from(pre_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let pre_out = body_json(response).await;
    assert_eq!(pre_out["reliable"], true);
    let evidence = pre_out["evidence"].as_array().unwrap();
    assert!(evidence.iter().any(|e| e["turn_id"] == turn_id));

    let forget_body = json!({
        "tenant_id": "t1",
        "user_id": "u1",
        "turn_id": turn_id
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/forget")
                .header("content-type", "application/json")
                .body(Body::from(forget_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let forget_out = body_json(response).await;
    assert_eq!(forget_out["status"], "ok");
}

#[tokio::test]
async fn unknown_route_returns_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(build_state(tmp.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
