//! HTTP API tests against a spawned server

mod helpers;

use helpers::{spawn_app, spawn_app_with, test_config};
use ragbot_rag::testing::{default_reply, ScriptedModel, UnavailableStore};
use ragbot_rag::{InMemoryVectorStore, Stage, UpstreamKind};
use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use std::sync::Arc;

async fn body(response: reqwest::Response) -> Value {
    response.json().await.expect("Response body is not JSON")
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let response = app.get_health().await;
    assert_eq!(response.status().as_u16(), 200);

    let health = body(response).await;
    assert_eq!(health["status"], "ok");
    assert_eq!(health["vector_store"], "ready");
    assert_eq!(health["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_health_with_unreachable_store() {
    let app = spawn_app_with(test_config(), ScriptedModel::happy(), Arc::new(UnavailableStore)).await;

    let response = app.get_health().await;
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(body(response).await["status"], "degraded");
}

#[tokio::test]
async fn test_ingest_then_chat() {
    let app = spawn_app().await;

    let report = app.ingest(&["The sky is blue."], "kb-1").await;
    assert_eq!(report["status"], "ok");
    assert_eq!(report["num_documents"], 1);
    assert_eq!(report["num_chunks"], 1);
    assert_eq!(report["namespace"], "kb-1");

    let response = app
        .post_chat(&json!({
            "question": "What color is the sky?",
            "namespace": "kb-1",
            "top_k": 1
        }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let chat = body(response).await;
    assert_eq!(chat["intent"], "RAG_QA");
    assert_eq!(chat["sources"].as_array().unwrap().len(), 1);
    assert_eq!(chat["sources"][0]["snippet"], "The sky is blue.");
    assert_eq!(chat["sources"][0]["metadata"]["namespace"], "kb-1");
    assert!(chat["sources"][0].get("content").is_none());
    assert!(chat["answer"].as_str().unwrap().contains("[S1]"));
    assert!(chat["suggested_questions"].as_array().unwrap().len() <= 5);
    assert!(chat.get("trace").is_none());
}

#[tokio::test]
async fn test_namespaces_do_not_leak() {
    let app = spawn_app().await;
    app.ingest(&["The sky is blue."], "kb-1").await;

    let chat = body(
        app.post_chat(&json!({ "question": "What color is the sky?", "namespace": "kb-2" }))
            .await,
    )
    .await;
    assert!(chat["sources"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_greeting_is_chitchat() {
    let app = spawn_app().await;

    let response = app.post_chat(&json!({ "question": "Hi", "history": [] })).await;
    assert_eq!(response.status().as_u16(), 200);

    let chat = body(response).await;
    assert_eq!(chat["intent"], "CHITCHAT");
    assert!(chat["sources"].as_array().unwrap().is_empty());
    assert!(chat["suggested_questions"].as_array().unwrap().is_empty());
    assert!(chat["answer"].as_str().unwrap().starts_with("Hello"));
}

#[tokio::test]
async fn test_empty_question_is_rejected() {
    let app = spawn_app().await;

    let response = app.post_chat(&json!({ "question": "" })).await;
    assert_eq!(response.status().as_u16(), 400);

    let error = body(response).await;
    assert_eq!(error["error"], "validation_error");
    assert_eq!(error["retryable"], false);
    assert_eq!(app.model.calls(), 0);
    assert_eq!(app.embedder.calls(), 0);
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .post(format!("{}/api/chat", app.address))
        .header("content-type", "application/json")
        .body("{\"question\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(body(response).await["error"], "validation_error");
}

#[tokio::test]
async fn test_debug_trace_and_history() {
    let app = spawn_app().await;

    let chat = body(
        app.post_chat(&json!({
            "question": "How fast is it?",
            "history": [
                { "role": "user", "content": "What is Rust?" },
                { "role": "assistant", "content": "A systems language." }
            ],
            "conversation_id": "conv-1",
            "debug": true
        }))
        .await,
    )
    .await;

    assert_eq!(chat["conversation_id"], "conv-1");
    let stages: Vec<&str> = chat["trace"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["stage"].as_str().unwrap())
        .collect();
    assert_eq!(
        stages,
        vec!["validate", "classify", "rewrite", "retrieve", "answer", "suggest"]
    );
    assert_eq!(app.model.calls_for(Stage::Rewrite), 1);
}

#[tokio::test]
async fn test_retryable_upstream_failure() {
    let app = spawn_app_with(
        test_config(),
        ScriptedModel::failing_at(Stage::Answer, UpstreamKind::RateLimited),
        Arc::new(InMemoryVectorStore::new()),
    )
    .await;

    let response = app.post_chat(&json!({ "question": "What is Rust?" })).await;
    assert_eq!(response.status().as_u16(), 503);

    let error = body(response).await;
    assert_eq!(error["error"], "pipeline_abort");
    assert_eq!(error["retryable"], true);
    assert!(error["message"].as_str().unwrap().contains("answer"));
}

#[tokio::test]
async fn test_malformed_upstream_response() {
    let model = ScriptedModel::new(|prompt| match prompt.task {
        Stage::Answer => Ok("   ".to_string()),
        _ => default_reply(prompt),
    });
    let app = spawn_app_with(test_config(), model, Arc::new(InMemoryVectorStore::new())).await;

    let response = app.post_chat(&json!({ "question": "What is Rust?" })).await;
    assert_eq!(response.status().as_u16(), 502);
    assert_eq!(body(response).await["retryable"], false);
}

#[tokio::test]
async fn test_store_failure_on_ingest() {
    let app = spawn_app_with(test_config(), ScriptedModel::happy(), Arc::new(UnavailableStore)).await;

    let response = app
        .post_ingest_text(&json!({ "texts": ["The sky is blue."] }))
        .await;
    assert_eq!(response.status().as_u16(), 503);
    assert_eq!(body(response).await["error"], "upstream_store_error");
}

#[tokio::test]
async fn test_ingest_validation() {
    let app = spawn_app().await;

    let response = app.post_ingest_text(&json!({ "texts": [] })).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post_ingest_text(&json!({ "texts": ["x"], "namespace": "../etc" }))
        .await;
    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn test_file_upload() {
    let app = spawn_app().await;

    let form = Form::new()
        .part(
            "file",
            Part::bytes(b"# Sky\n\nThe sky is blue.".to_vec()).file_name("sky.md"),
        )
        .text("namespace", "docs")
        .text("metadata", r#"{"source": "handbook"}"#);
    let response = app.post_ingest_file(form).await;
    assert_eq!(response.status().as_u16(), 200);
    let report = body(response).await;
    assert_eq!(report["namespace"], "docs");
    assert_eq!(report["num_chunks"], 1);

    let chat = body(
        app.post_chat(&json!({ "question": "What color is the sky?", "namespace": "docs" }))
            .await,
    )
    .await;
    let source = &chat["sources"][0];
    assert_eq!(source["title"], "sky.md");
    assert_eq!(source["metadata"]["filename"], "sky.md");
    assert_eq!(source["metadata"]["source"], "handbook");
}

#[tokio::test]
async fn test_file_upload_rejections() {
    let mut config = test_config();
    config.ingest.max_upload_bytes = 16;
    let app = spawn_app_with(config, ScriptedModel::happy(), Arc::new(InMemoryVectorStore::new())).await;

    let form = Form::new().part("file", Part::bytes(b"%PDF-1.4".to_vec()).file_name("doc.pdf"));
    let response = app.post_ingest_file(form).await;
    assert_eq!(response.status().as_u16(), 415);

    let form = Form::new().part(
        "file",
        Part::bytes(vec![b'a'; 64]).file_name("big.txt"),
    );
    let response = app.post_ingest_file(form).await;
    assert_eq!(response.status().as_u16(), 413);

    let form = Form::new().part("file", Part::bytes(vec![0xff, 0xfe, 0xfd]).file_name("bad.txt"));
    let response = app.post_ingest_file(form).await;
    assert_eq!(response.status().as_u16(), 400);

    let form = Form::new().text("namespace", "docs");
    let response = app.post_ingest_file(form).await;
    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(body(response).await["error"], "validation_error");
}

#[tokio::test]
async fn test_openapi_document() {
    let app = spawn_app().await;

    let response = app
        .api_client
        .get(format!("{}/api/openapi.json", app.address))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let document = body(response).await;
    assert_eq!(document["info"]["title"], "Ragbot API");
    assert!(document["paths"]["/api/ingest/text"]["post"].is_object());
}
