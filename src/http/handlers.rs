use super::state::AppState;
use crate::audio::convert::needs_conversion;
use crate::error::TranscriptionError;
use crate::session::SessionStats;
use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub message: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub transcription: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub transcription: String,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

impl IntoResponse for TranscriptionError {
    fn into_response(self) -> Response {
        let status = match &self {
            TranscriptionError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            TranscriptionError::Conversion(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TranscriptionError::RecognitionStream(_) => StatusCode::BAD_GATEWAY,
            TranscriptionError::Publish(_) | TranscriptionError::Export(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        error_response(status, self.to_string())
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn home() -> impl IntoResponse {
    Json(MessageResponse {
        message: "Welcome to real-time transcription api".to_string(),
    })
}

/// POST /start/?userId=
/// Start transcribing the host microphone for a user
pub async fn start_recording(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    info!("Start requested for user: {}", query.user_id);

    match state.registry.start_from_microphone(&query.user_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Recording started".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start recording for {}: {}", query.user_id, e);
            e.into_response()
        }
    }
}

/// POST /upload/?userId=
/// Save an uploaded audio file, convert it to WAV if needed and transcribe it
pub async fn upload_audio(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
    mut multipart: Multipart,
) -> Response {
    let mut upload: Option<(String, PathBuf)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
            }
        };

        if field.name() != Some("file") {
            continue;
        }

        let Some(filename) = field.file_name().and_then(safe_file_name) else {
            return error_response(StatusCode::BAD_REQUEST, "Upload is missing a file name");
        };

        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e))
            }
        };

        // Distinct names so concurrent uploads of "audio.mp3" don't collide
        let stored = state.settings.upload_dir.join(format!(
            "{}-{}",
            uuid::Uuid::new_v4().simple(),
            filename
        ));

        if let Err(e) = tokio::fs::create_dir_all(&state.settings.upload_dir).await {
            error!("Failed to create upload dir: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload");
        }
        if let Err(e) = tokio::fs::write(&stored, &bytes).await {
            error!("Failed to write upload {}: {}", stored.display(), e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload");
        }

        info!("Stored upload {} ({} bytes)", stored.display(), bytes.len());
        upload = Some((filename, stored));
        break;
    }

    let Some((filename, stored)) = upload else {
        return error_response(StatusCode::BAD_REQUEST, "Missing multipart field `file`");
    };

    let sample_rate = state.settings.sample_rate;
    let check = stored.clone();
    let convert_first = tokio::task::spawn_blocking(move || needs_conversion(&check, sample_rate))
        .await
        .unwrap_or(true);

    let audio_path = if !convert_first {
        stored
    } else {
        match convert(&state, stored.clone()).await {
            Ok(converted) => {
                remove_quietly(&stored).await;
                converted
            }
            Err(e) => {
                warn!("Conversion failed for {}: {}", filename, e);
                remove_quietly(&stored).await;
                return e.into_response();
            }
        }
    };

    info!("File ready for transcription: {}", audio_path.display());

    match state
        .registry
        .start_from_file(&query.user_id, &audio_path)
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(UploadResponse {
                filename,
                user_id: query.user_id,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start file transcription for {}: {}", query.user_id, e);
            remove_quietly(&audio_path).await;
            e.into_response()
        }
    }
}

/// POST /stop/?userId=
/// Stop a user's session and return its final transcript
pub async fn stop_recording(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    info!("Stop requested for user: {}", query.user_id);

    let transcription = state
        .registry
        .stop(&query.user_id)
        .await
        .unwrap_or_default();

    (
        StatusCode::OK,
        Json(StopResponse {
            message: "Recording stopped".to_string(),
            user_id: query.user_id,
            transcription,
        }),
    )
        .into_response()
}

/// GET /transcript/?userId=
/// Transcript accumulated so far (empty when no session is active)
pub async fn get_transcript(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> impl IntoResponse {
    let transcription = state.registry.get_transcript(&query.user_id).await;

    Json(TranscriptResponse {
        user_id: query.user_id,
        transcription,
    })
}

/// GET /status/?userId=
pub async fn get_status(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    match state.registry.status(&query.user_id).await {
        Some(stats) => (StatusCode::OK, Json::<SessionStats>(stats)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No active session for user {}", query.user_id),
        ),
    }
}

/// POST /save/?userId=
/// Export the current transcript to a timestamped file
pub async fn save_transcript(
    State(state): State<AppState>,
    Query(query): Query<UserQuery>,
) -> Response {
    match state
        .registry
        .save_transcript(&query.user_id, &state.settings.transcript_dir)
        .await
    {
        Ok(Some(path)) => (
            StatusCode::OK,
            Json(SaveResponse {
                user_id: query.user_id,
                path: path.display().to_string(),
            }),
        )
            .into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("No active session for user {}", query.user_id),
        ),
        Err(e) => {
            error!("Failed to save transcript for {}: {}", query.user_id, e);
            e.into_response()
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Helpers
// ============================================================================

async fn convert(state: &AppState, input: PathBuf) -> Result<PathBuf, TranscriptionError> {
    let converter = state.converter.clone();
    tokio::task::spawn_blocking(move || converter.convert(&input))
        .await
        .map_err(|e| TranscriptionError::Conversion(format!("converter task failed: {}", e)))?
}

/// Final path component of a client-supplied file name
fn safe_file_name(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .map(str::to_string)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
