// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use utoipa::{IntoParams, OpenApi, ToSchema};
use video_annotate::config::{DEFAULT_RUN_DIR, default_output_name};
use video_annotate::{
    AnnotateError, Annotated, Annotator, PipelineConfig, UploadError, YoloDetector, handle_upload,
    init_detector,
};

/// Largest accepted upload.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

// Shared application state
struct AppState {
    detector: &'static YoloDetector,
    config: PipelineConfig,
    // Runs share one working directory and output path
    run_lock: Mutex<()>,
}

// Query parameters for annotation
#[derive(Debug, Deserialize, IntoParams)]
struct PredictParams {
    /// Confidence threshold (0.0 - 1.0). Default: 0.25
    #[param(minimum = 0.0, maximum = 1.0, example = 0.25)]
    conf: Option<f32>,
    /// Square inference size. Default: the model's exported size
    #[param(minimum = 32, maximum = 4096, example = 640)]
    imgsz: Option<usize>,
    /// Send the result as an attachment instead of inline
    #[param(example = false)]
    download: Option<bool>,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    /// Error message
    error: String,
    /// Pipeline stage that failed, for video uploads
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct InfoResponse {
    /// Path to the loaded model
    model_path: String,
    /// Model task type
    task: String,
    /// Number of classes
    num_classes: usize,
    /// Input image size (height, width)
    imgsz: (usize, usize),
    /// Whether MP4 and other FFmpeg containers are supported
    video_support: bool,
}

#[derive(Serialize, ToSchema)]
struct HealthResponse {
    /// Server status
    status: String,
    /// API version
    version: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Ultralytics Video Annotation Server",
        description = "Upload an image or a video and get it back with YOLO detections drawn on every frame.\n\n## Query Parameters\n- `conf`: Confidence threshold (0.0-1.0, default: 0.25)\n- `imgsz`: Inference size (default: model size)\n- `download`: Return the result as an attachment",
        version = "0.1.0",
        license(name = "AGPL-3.0", url = "https://github.com/ultralytics/inference/blob/main/LICENSE"),
        contact(name = "Ultralytics", url = "https://ultralytics.com")
    ),
    paths(root, health, info, predict),
    components(schemas(ErrorResponse, InfoResponse, HealthResponse)),
    tags(
        (name = "annotation", description = "Image and video annotation endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let model_path = env::var("MODEL_PATH").unwrap_or_else(|_| "yolo11n.onnx".to_string());
    let run_dir = PathBuf::from(DEFAULT_RUN_DIR);
    let work_dir = env::var("WORK_DIR").map_or_else(|_| run_dir.join("work"), PathBuf::from);
    let output_path = env::var("OUTPUT_PATH")
        .map_or_else(|_| run_dir.join(default_output_name()), PathBuf::from);

    tracing::info!(model = %model_path, "loading model");
    let detector = init_detector(&model_path)?;
    detector.warmup()?;
    tracing::info!(
        classes = detector.num_classes(),
        imgsz = ?detector.imgsz(),
        "model loaded"
    );

    let config = PipelineConfig::new()
        .with_work_dir(work_dir)
        .with_output(output_path);
    config.validate()?;

    let state = Arc::new(AppState {
        detector,
        config,
        run_lock: Mutex::new(()),
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/predict", post(predict))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state);

    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Root endpoint
///
/// Returns a welcome message.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Welcome message", body = String)
    )
)]
async fn root() -> &'static str {
    "Ultralytics Video Annotation Server - POST /predict with an image or video in the 'file' field. OpenAPI at /api-docs/openapi.json"
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: video_annotate::VERSION.to_string(),
    })
}

/// Model information endpoint
///
/// Returns the loaded model's path, class count and input size.
#[utoipa::path(
    get,
    path = "/info",
    tag = "annotation",
    responses(
        (status = 200, description = "Model information", body = InfoResponse)
    )
)]
async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    let detector = state.detector;
    Json(InfoResponse {
        model_path: detector.model_path().to_string(),
        task: "detect".to_string(),
        num_classes: detector.num_classes(),
        imgsz: detector.imgsz(),
        video_support: cfg!(feature = "video"),
    })
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Annotate an uploaded image or video
///
/// Images come back as PNG. Videos are split into frames, annotated frame by
/// frame and reassembled. Uploads are processed one at a time.
#[utoipa::path(
    post,
    path = "/predict",
    tag = "annotation",
    params(PredictParams),
    request_body(content_type = "multipart/form-data", description = "Image or video in the 'file' field"),
    responses(
        (status = 200, description = "Annotated image or video", content_type = "application/octet-stream"),
        (status = 400, description = "Missing field or invalid parameters", body = ErrorResponse),
        (status = 415, description = "Unsupported media type", body = ErrorResponse),
        (status = 422, description = "Unreadable, empty or inconsistent input", body = ErrorResponse),
        (status = 503, description = "Detector unavailable", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
async fn predict(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PredictParams>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut detect = state.config.params;
    if let Some(conf) = params.conf {
        detect = detect.with_confidence(conf);
    }
    if let Some(sz) = params.imgsz {
        detect = detect.with_imgsz(sz, sz);
    }
    let config = state.config.clone().with_params(detect);
    config.validate().map_err(|e| upload_error(&UploadError::from(e)))?;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }

        let mime = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            error_response(StatusCode::BAD_REQUEST, format!("Failed to read field: {e}"), None)
        })?;

        let _guard = state.run_lock.lock().await;
        let detector = state.detector;
        let outcome = tokio::task::spawn_blocking(move || {
            handle_upload(detector, Annotator::new(), &config, &data, &mime)
        })
        .await
        .map_err(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Annotation task failed: {e}"),
                None,
            )
        })?;

        let annotated = outcome.map_err(|e| upload_error(&e))?;
        return Ok(annotated_response(annotated, params.download.unwrap_or(false)));
    }

    Err(error_response(
        StatusCode::BAD_REQUEST,
        "Missing 'file' field".to_string(),
        None,
    ))
}

fn annotated_response(annotated: Annotated, download: bool) -> Response {
    match &annotated {
        Annotated::Image { summary, .. } => tracing::info!(%summary, "image annotated"),
        Annotated::Video { frames, summary, .. } => tracing::info!(frames, %summary, "video annotated"),
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(annotated.media_type()),
    );
    let disposition = if download { "attachment" } else { "inline" };
    if let Ok(value) = HeaderValue::from_str(&format!(
        "{disposition}; filename=\"{}\"",
        annotated.filename()
    )) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    let body = match annotated {
        Annotated::Image { bytes, .. } | Annotated::Video { bytes, .. } => Body::from(bytes),
    };
    (StatusCode::OK, headers, body).into_response()
}

const fn status_for(error: &AnnotateError) -> StatusCode {
    match error {
        AnnotateError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        AnnotateError::DetectorUnavailable(_) | AnnotateError::Inference(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AnnotateError::ConfigError(_) => StatusCode::BAD_REQUEST,
        e if e.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn upload_error(error: &UploadError) -> ApiError {
    let status = status_for(error.error());
    tracing::warn!(%error, status = status.as_u16(), "upload failed");
    error_response(
        status,
        error.to_string(),
        error.stage().map(|stage| stage.to_string()),
    )
}

fn error_response(status: StatusCode, error: String, stage: Option<String>) -> ApiError {
    (status, Json(ErrorResponse { error, stage }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_annotate::{RunFailure, Stage};

    #[test]
    fn test_status_codes() {
        assert_eq!(
            status_for(&AnnotateError::UnsupportedMedia("text/plain".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_for(&AnnotateError::EmptyFrameSequence),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&AnnotateError::DetectorUnavailable("no weights".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_for(&AnnotateError::Io(std::io::Error::other("disk full"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_run_failure_carries_stage() {
        let error = UploadError::from(RunFailure {
            stage: Stage::Extracting,
            error: AnnotateError::SourceUnreadable("clip.mp4".into()),
        });
        let (status, Json(body)) = upload_error(&error);
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.stage.as_deref(), Some("extraction"));
        assert!(body.error.starts_with("extraction failed"));
    }
}
