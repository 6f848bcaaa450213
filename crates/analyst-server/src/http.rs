//! HTTP surface: `POST /api/` with a multipart upload
//!
//! The part whose file name is `question.txt` carries the question; every
//! other file part becomes an artifact. Once a question is present the reply
//! is always 200 with the pipeline's Response.

use analyst_core::{Artifact, PipelineController, Request, RequestError};
use bytes::BufMut;
use futures::{TryFutureExt, TryStreamExt};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};
use warp::http::StatusCode;
use warp::multipart::{FormData, Part};
use warp::reply::{Reply, Response as HttpResponse};
use warp::Filter;

/// File name that marks the question part
pub const QUESTION_FILE: &str = "question.txt";

/// Problems with the upload itself
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("missing {QUESTION_FILE} part")]
    MissingQuestion,

    #[error("{QUESTION_FILE} is not valid UTF-8")]
    QuestionEncoding,

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// All routes, ready for `warp::serve`
pub fn routes(
    controller: Arc<PipelineController>,
    max_upload_bytes: u64,
) -> impl Filter<Extract = (HttpResponse,), Error = warp::Rejection> + Clone {
    let health = warp::get()
        .and(warp::path("health"))
        .and(warp::path::end())
        .map(|| warp::reply::json(&json!({"status": "ok"})).into_response());

    let analyze = warp::post()
        .and(warp::path("api"))
        .and(warp::path::end())
        .and(warp::multipart::form().max_length(max_upload_bytes))
        .and(warp::any().map(move || Arc::clone(&controller)))
        .and_then(handle_analyze);

    health.or(analyze).unify()
}

async fn handle_analyze(
    form: FormData,
    controller: Arc<PipelineController>,
) -> Result<HttpResponse, Infallible> {
    let request = match read_request(form).await {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "rejecting upload");
            return Ok(error_reply(StatusCode::BAD_REQUEST, &e.to_string()));
        }
    };

    info!(
        artifacts = request.artifact_count(),
        question_chars = request.question().chars().count(),
        "analysis request received"
    );
    let response = controller.run(request).await;
    Ok(warp::reply::json(&response).into_response())
}

fn error_reply(status: StatusCode, message: &str) -> HttpResponse {
    warp::reply::with_status(warp::reply::json(&json!({"error": message})), status).into_response()
}

/// Turn a multipart form into a pipeline request
///
/// # Errors
/// `UploadError` for an unreadable body, a missing or undecodable question,
/// or an invalid artifact
pub async fn read_request(form: FormData) -> Result<Request, UploadError> {
    let parts: Vec<Part> = form
        .try_collect()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?;

    let mut question = None;
    let mut artifacts = Vec::new();
    for part in parts {
        let field = part.name().to_string();
        let file_name = part.filename().map(str::to_string);
        let bytes = read_part(part).await?;

        match file_name {
            Some(name) if name == QUESTION_FILE && question.is_none() => {
                question = Some(String::from_utf8(bytes).map_err(|_| UploadError::QuestionEncoding)?);
            }
            Some(name) => artifacts.push(Artifact::inferred(name, bytes)?),
            None => warn!(field, "ignoring non-file form field"),
        }
    }

    let question = question.ok_or(UploadError::MissingQuestion)?;
    Ok(artifacts
        .into_iter()
        .fold(Request::builder(question), |builder, artifact| builder.artifact(artifact))
        .build()?)
}

async fn read_part(part: Part) -> Result<Vec<u8>, UploadError> {
    part.stream()
        .try_fold(Vec::new(), |mut acc, buf| async move {
            acc.put(buf);
            Ok(acc)
        })
        .map_err(|e| UploadError::Multipart(e.to_string()))
        .await
}
