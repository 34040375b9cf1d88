//! Job API handlers.

use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use transcoder_core::{JobSummary, RawJobRequest, Submission, TaskSummary};

use super::error::{engine_error, error_response, ApiError};
use crate::state::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response for an accepted task
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub job: JobSummary,
    pub task: TaskSummary,
}

/// Response for listing jobs
#[derive(Debug, Serialize, Deserialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a task, or only flag a job complete when `complete` is set.
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let request = read_form(&state, multipart).await?;

    match state.engine().submit(request).await.map_err(engine_error)? {
        Submission::Task { job, task } => {
            info!(job_id = %job.job_id, task_id = %task.task_id, "Task accepted");
            Ok((StatusCode::CREATED, Json(SubmitResponse { job, task })).into_response())
        }
        Submission::Completed(job) => Ok(Json(job).into_response()),
    }
}

pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<ListJobsResponse> {
    let jobs = state.engine().jobs().await;
    let total = jobs.len();
    Json(ListJobsResponse { jobs, total })
}

pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    state.engine().job(&id).await.map(Json).map_err(engine_error)
}

pub async fn complete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    state
        .engine()
        .complete_job(&id)
        .await
        .map(Json)
        .map_err(engine_error)
}

pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobSummary>, ApiError> {
    let summary = state.engine().delete_job(&id).await.map_err(engine_error)?;
    info!(job_id = %id, "Job deleted");
    Ok(Json(summary))
}

/// Adaptive master playlist of a job's segmented outputs.
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let playlist = state.engine().playlist(&id).await.map_err(engine_error)?;
    Ok(([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], playlist).into_response())
}

// ============================================================================
// Multipart form
// ============================================================================

/// Reads the submission form, streaming an uploaded `video` part to disk.
/// A partially written upload is removed when the form turns out invalid.
async fn read_form(state: &AppState, mut multipart: Multipart) -> Result<RawJobRequest, ApiError> {
    let mut request = RawJobRequest::default();
    if let Err(e) = fill_request(state, &mut multipart, &mut request).await {
        if let Some(path) = request.upload.take() {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                debug!(path = %path.display(), error = %err, "Could not remove partial upload");
            }
        }
        return Err(e);
    }
    Ok(request)
}

async fn fill_request(
    state: &AppState,
    multipart: &mut Multipart,
    request: &mut RawJobRequest,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();

        if name == "video" {
            if let Some(file_name) = field.file_name().map(str::to_string) {
                if request.upload.is_some() {
                    return Err(error_response(
                        StatusCode::BAD_REQUEST,
                        "Only one video upload is accepted",
                    ));
                }
                let path = state.upload_path(&file_name);
                request.upload = Some(path.clone());
                save_upload(field, &path).await?;
                continue;
            }
        }

        let value = field.text().await.map_err(form_error)?;
        match name.as_str() {
            "jobid" => request.job_id = Some(value),
            "taskid" => request.task_id = Some(value),
            "complete" => request.complete = is_enabled(&value),
            "tag" => request.tag = Some(value),
            "video" => request.video_url = Some(value),
            "encoding-options" => request.encoding_options = Some(value),
            "callback" => request.callback = Some(value),
            "extension" => request.extension = Some(value),
            "multipass" => request.multipass = is_enabled(&value),
            "multipass-extension" => request.multipass_extension = Some(value),
            "multipass-options" => request.multipass_options = Some(value),
            "segment" => request.segment = Some(value),
            other => debug!(field = other, "Ignoring unknown form field"),
        }
    }
    Ok(())
}

async fn save_upload(mut field: Field<'_>, path: &std::path::Path) -> Result<(), ApiError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }
    let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(form_error)? {
        file.write_all(&chunk).await.map_err(io_error)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(io_error)?;
    debug!(path = %path.display(), bytes = written, "Upload stored");
    Ok(())
}

/// Form flags accept `true`, `1`, `yes` and `on`.
fn is_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn form_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    error_response(err.status(), format!("Invalid form data: {}", err.body_text()))
}

fn io_error(err: std::io::Error) -> ApiError {
    warn!(error = %err, "Failed to store upload");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload")
}
