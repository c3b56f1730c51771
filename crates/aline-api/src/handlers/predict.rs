//! Upload and example prediction handlers.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use aline_models::{PipelineParams, PredictionResult, UploadKind};

use crate::error::{ApiError, ApiResult};
use crate::metrics::record_upload;
use crate::state::AppState;

/// Highest canned example id.
const MAX_EXAMPLE_ID: u32 = 3;

/// An upload written to the upload directory.
struct StoredUpload {
    path: PathBuf,
    media_url: String,
}

/// `POST /api/upload_video`: predict actions for an uploaded video.
pub async fn upload_video(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<PredictionResult>> {
    let upload = store_upload(&state, multipart, UploadKind::Video).await?;
    let result = run_prediction(&state, UploadKind::Video, upload).await?;
    Ok(Json(result))
}

/// `POST /api/upload_image`: predict actions for an uploaded still image.
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<PredictionResult>> {
    let upload = store_upload(&state, multipart, UploadKind::Image).await?;
    let result = run_prediction(&state, UploadKind::Image, upload).await?;
    Ok(Json(result))
}

/// `GET /api/example/:id`: predict actions for one of the bundled videos.
pub async fn example(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PredictionResult>> {
    let id: u32 = id
        .parse()
        .ok()
        .filter(|id| *id <= MAX_EXAMPLE_ID)
        .ok_or_else(|| ApiError::bad_request("Invalid Example"))?;

    let file_name = format!("video{id}.webm");
    let path = state.config.examples_dir().join(&file_name);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        return Err(ApiError::not_found(format!("example {id}")));
    }

    let upload = StoredUpload {
        path,
        media_url: format!("/videos/examples/{file_name}"),
    };
    let result = run_prediction(&state, UploadKind::Video, upload).await?;
    Ok(Json(result))
}

/// Save the multipart field for `kind` under its sanitized name.
async fn store_upload(
    state: &AppState,
    mut multipart: Multipart,
    kind: UploadKind,
) -> ApiResult<StoredUpload> {
    let label = kind.field_name();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        debug!(error = %e, "Malformed multipart body");
        ApiError::invalid_file()
    })? {
        if field.name() != Some(kind.field_name()) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let name = match kind.validate_filename(&file_name) {
            Ok(name) => name,
            Err(e) => {
                debug!(file_name = %file_name, error = %e, "Rejected upload");
                record_upload(label, "rejected", 0);
                return Err(ApiError::invalid_file());
            }
        };

        let data = field.bytes().await.map_err(|e| {
            debug!(error = %e, "Upload body could not be read");
            ApiError::invalid_file()
        })?;
        if data.is_empty() {
            record_upload(label, "rejected", 0);
            return Err(ApiError::invalid_file());
        }

        tokio::fs::create_dir_all(&state.config.upload_dir)
            .await
            .map_err(|e| ApiError::internal(format!("upload dir: {e}")))?;
        // Unique per request; two uploads of the same name must not clobber
        let name = format!("{}_{}", Uuid::new_v4(), name);
        let path = state.config.upload_dir.join(&name);
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| ApiError::internal(format!("saving upload: {e}")))?;

        record_upload(label, "accepted", data.len());
        info!(kind = label, file = %name, bytes = data.len(), "Upload stored");

        return Ok(StoredUpload {
            path,
            media_url: format!("/videos/{name}"),
        });
    }

    record_upload(label, "rejected", 0);
    Err(ApiError::invalid_file())
}

/// Run the pipeline for `upload` under the request timeout.
///
/// The pipeline runs in its own task so a timed-out request still releases
/// its workspace when the work finishes.
async fn run_prediction(
    state: &AppState,
    kind: UploadKind,
    upload: StoredUpload,
) -> ApiResult<PredictionResult> {
    let pipeline = Arc::clone(&state.pipeline);
    let ranking = pipeline.config().ranking;
    let params = match kind {
        UploadKind::Video => PipelineParams::video(),
        UploadKind::Image => PipelineParams::image(),
    }
    .with_ranking(ranking);

    let StoredUpload { path, media_url } = upload;
    let task = tokio::spawn(async move {
        match kind {
            UploadKind::Video => pipeline.predict_video(&path, &media_url, &params).await,
            UploadKind::Image => pipeline.predict_image(&path, &media_url, &params).await,
        }
    });

    let timeout = state.config.request_timeout;
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => Ok(result?),
        Ok(Err(e)) => Err(ApiError::internal(format!("prediction task failed: {e}"))),
        Err(_) => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "Prediction exceeded request timeout, finishing in background"
            );
            Err(ApiError::Timeout(timeout.as_secs()))
        }
    }
}
