//! `POST /api/` end to end with scripted collaborators

use analyst_core::PipelineController;
use analyst_server::routes;
use analyst_test_utils::{
    chart_findings, error_outcome, ok_outcome, sales_findings, test_config, Reply, ScriptedAuthor,
    ScriptedSandbox, ScriptedScout, ScriptedVision,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

const BOUNDARY: &str = "analyst-test-boundary";

fn multipart(parts: &[(&str, &str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, file_name, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n").as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn controller(sandbox: Arc<ScriptedSandbox>) -> Arc<PipelineController> {
    Arc::new(
        PipelineController::builder(test_config())
            .with_scout(Arc::new(ScriptedScout::new("scout", Reply::Ok(sales_findings()))))
            .with_vision(Arc::new(ScriptedVision::new("vision", Reply::Ok(chart_findings()))))
            .with_author(Arc::new(ScriptedAuthor::always("print(20)")))
            .with_sandbox(sandbox)
            .build()
            .unwrap(),
    )
}

async fn post(controller: Arc<PipelineController>, body: Vec<u8>) -> (u16, Value) {
    let filter = routes(controller, 1024 * 1024);
    let reply = warp::test::request()
        .method("POST")
        .path("/api/")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(body)
        .reply(&filter)
        .await;
    let json = serde_json::from_slice(reply.body()).unwrap_or(Value::Null);
    (reply.status().as_u16(), json)
}

#[tokio::test]
async fn question_and_files_produce_a_response() {
    let sandbox = Arc::new(ScriptedSandbox::new(ok_outcome(r#"{"average": 20}"#)));
    let body = multipart(&[
        ("questions", "question.txt", "What is the average sales?"),
        ("data", "sales.csv", "region,sales\nnorth,10\nsouth,30\n"),
    ]);

    let (status, json) = post(controller(sandbox.clone()), body).await;

    assert_eq!(status, 200);
    assert_eq!(json, json!({"result": {"average": 20}, "degraded": false}));
    let runs = sandbox.runs();
    assert_eq!(runs[0].artifacts.len(), 1);
    assert_eq!(runs[0].artifacts[0].name(), "sales.csv");
}

#[tokio::test]
async fn missing_question_is_bad_request() {
    let sandbox = Arc::new(ScriptedSandbox::new(ok_outcome("1")));
    let body = multipart(&[("data", "sales.csv", "a,b\n1,2\n")]);

    let (status, json) = post(controller(sandbox.clone()), body).await;

    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("question.txt"));
    assert!(sandbox.runs().is_empty());
}

#[tokio::test]
async fn duplicate_artifacts_are_bad_request() {
    let sandbox = Arc::new(ScriptedSandbox::new(ok_outcome("1")));
    let body = multipart(&[
        ("q", "question.txt", "Sum it"),
        ("a", "data.csv", "x\n1\n"),
        ("b", "data.csv", "x\n2\n"),
    ]);

    let (status, json) = post(controller(sandbox), body).await;

    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("duplicate"));
}

#[tokio::test]
async fn failing_pipeline_still_returns_ok_status() {
    let sandbox = Arc::new(ScriptedSandbox::new(error_outcome("boom")));
    let body = multipart(&[("q", "question.txt", "What is 2 + 2?")]);

    let (status, json) = post(controller(sandbox), body).await;

    assert_eq!(status, 200);
    assert_eq!(json["degraded"], json!(true));
    assert!(json["notes"].as_str().unwrap().contains("debug exhaustion"));
}

#[tokio::test]
async fn health_endpoint() {
    let sandbox = Arc::new(ScriptedSandbox::new(ok_outcome("1")));
    let filter = routes(controller(sandbox), 1024);
    let reply = warp::test::request().path("/health").reply(&filter).await;
    assert_eq!(reply.status().as_u16(), 200);
}
