//! Audio guide HTTP server.
//!
//! Exposes guide ingestion, listing, segmentation, translation, narration,
//! image generation and assistant deployment as a JSON HTTP API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/upload` | Store a guide, or delete one with `action: "delete"` |
//! | `GET`  | `/api/guides` | List guides (`?wallet=` filters by creator) |
//! | `GET`  | `/api/guides/list` | Same listing as `/api/guides` |
//! | `POST` | `/api/segment` | Split content into titled segments |
//! | `POST` | `/api/translate` | Translate content (`translatedText`) |
//! | `POST` | `/api/process-guide` | Translate content (`translatedContent`) |
//! | `POST` | `/api/process-content` | Split content into narration chunks |
//! | `POST` | `/api/text-to-speech` | Narrate content, raw `audio/mpeg` |
//! | `POST` | `/api/speech` | Narrate text, base64 audio in JSON |
//! | `POST` | `/api/generate-image` | Generate a guide illustration |
//! | `GET`/`POST` | `/api/logs` | Read or append the log ring |
//! | `GET`/`POST` | `/api/deploy-agent` | List or deploy guide assistants |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "content is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `upstream_error` (500),
//! `invalid_model_output` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted for the browser client.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::agent::{AgentRegistry, Deployment, KnowledgeItem};
use crate::completion::{create_completion_client, CompletionClient, DisabledClient, ModelOutputError};
use crate::config::Config;
use crate::image::{create_image_client, DisabledImageGenerator, GeneratedImages, ImageGenerator};
use crate::library::GuideLibrary;
use crate::logs::{log_requests, LogRing};
use crate::markdown::chunk_narration;
use crate::models::{FileId, Guide, Language, LogEntry, Segment};
use crate::segment::{segment_content, translate_segments};
use crate::speech::{create_speech_client, voice_for, DisabledSynthesizer, SpeechSynthesizer, AUDIO_MPEG};
use crate::storage::{create_agent, StorageAgent};
use crate::store::GuideStore;
use crate::translate::translate;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub library: Arc<GuideLibrary>,
    pub logs: Arc<LogRing>,
    pub completion: Arc<dyn CompletionClient>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub images: Arc<dyn ImageGenerator>,
    pub agents: Arc<AgentRegistry>,
}

impl AppState {
    /// Build the state for `config`: storage agent, guide library and the
    /// vendor clients.
    ///
    /// A vendor client that cannot be constructed (usually a missing API
    /// key) is replaced by its disabled variant, so the server still starts
    /// and only the affected endpoints fail.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let storage: Arc<dyn StorageAgent> = Arc::from(create_agent(&config.storage)?);
        tracing::info!(agent = storage.name(), namespace = %config.storage.namespace, "storage agent ready");
        if let Err(e) = storage.setup(&config.storage.namespace).await {
            tracing::warn!(namespace = %config.storage.namespace, error = %e, "storage namespace setup failed");
        }

        let library = Arc::new(GuideLibrary::new(
            Arc::new(GuideStore::new()),
            storage,
            config.library.clone(),
        ));

        let completion: Arc<dyn CompletionClient> = match create_completion_client(&config.completion) {
            Ok(client) => Arc::from(client),
            Err(e) => {
                tracing::warn!(error = %e, "completion disabled");
                Arc::new(DisabledClient)
            }
        };
        let speech: Arc<dyn SpeechSynthesizer> = match create_speech_client(&config.speech) {
            Ok(client) => Arc::from(client),
            Err(e) => {
                tracing::warn!(error = %e, "speech disabled");
                Arc::new(DisabledSynthesizer)
            }
        };
        let images: Arc<dyn ImageGenerator> = match create_image_client(&config.image) {
            Ok(client) => Arc::from(client),
            Err(e) => {
                tracing::warn!(error = %e, "image generation disabled");
                Arc::new(DisabledImageGenerator)
            }
        };

        Ok(Self {
            config: Arc::new(config.clone()),
            library,
            logs: Arc::new(LogRing::new(config.logs.capacity)),
            completion,
            speech,
            images,
            agents: Arc::new(AgentRegistry::new()),
        })
    }
}

/// Assemble the router with request logging and CORS applied.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/api/upload", post(handle_upload))
        .route("/api/guides", get(handle_list_guides))
        .route("/api/guides/list", get(handle_list_guides))
        .route("/api/segment", post(handle_segment))
        .route("/api/translate", post(handle_translate))
        .route("/api/process-guide", post(handle_process_guide))
        .route("/api/process-content", post(handle_process_content))
        .route("/api/text-to-speech", post(handle_text_to_speech))
        .route("/api/speech", post(handle_speech))
        .route("/api/generate-image", post(handle_generate_image))
        .route("/api/logs", get(handle_get_logs).post(handle_post_log))
        .route(
            "/api/deploy-agent",
            get(handle_list_agents).post(handle_deploy_agent),
        )
        .fallback(handle_not_found)
        .layer(middleware::from_fn_with_state(state.logs.clone(), log_requests))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server.
///
/// Binds to `[server].bind`, recovers previously stored guides, and serves
/// until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;

    match state.library.ensure_recovered().await {
        Ok(count) => state.logs.record(format!("Recovered {} guides", count)).await,
        Err(e) => tracing::warn!(error = %e, "startup recovery failed, will retry on first listing"),
    }

    let bind_addr = config.server.bind.clone();
    let app = build_router(state);

    tracing::info!(%bind_addr, "audio guide server listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

/// Map a vendor or storage failure to a 500. Malformed model replies get
/// their own code so clients can tell them from transport failures.
fn upstream(context: &str, err: anyhow::Error) -> AppError {
    if let Some(output) = err.downcast_ref::<ModelOutputError>() {
        tracing::warn!(error = %output, "{}", context);
        return AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "invalid_model_output",
            message: format!("{}: {}", context, output),
        };
    }

    tracing::error!(error = %err, "{}", context);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "upstream_error",
        message: format!("{}: {:#}", context, err),
    }
}

/// Unwrap a JSON body, reporting malformed payloads in the error contract.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| bad_request(rejection.body_text()))
}

/// A required, non-blank string field.
fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| bad_request(format!("{} is required", field)))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_not_found(uri: axum::http::Uri) -> AppError {
    not_found(format!("no route for {}", uri.path()))
}

// ============ POST /api/upload ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    file_id: Option<FileId>,
    #[serde(default)]
    wallet_address: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteResponse {
    success: bool,
    file_id: FileId,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<String>,
}

async fn handle_upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;

    if req.action.as_deref() == Some("delete") {
        let file_id = req
            .file_id
            .ok_or_else(|| bad_request("fileId is required for delete"))?;
        if state.library.is_index(file_id) {
            return Err(bad_request("the guide index cannot be deleted"));
        }

        let outcome = state
            .library
            .delete(file_id)
            .await
            .map_err(|e| upstream("Failed to delete guide", e))?;
        if outcome.removed {
            state.logs.record(format!("Guide deleted: {}", file_id)).await;
        }

        return Ok(Json(DeleteResponse {
            success: outcome.removed,
            file_id,
            hash: outcome.hash,
        })
        .into_response());
    }

    let content = required(&req.content, "content")?;
    let wallet = required(&req.wallet_address, "walletAddress")?;

    let guide = state
        .library
        .upload(content, wallet.trim())
        .await
        .map_err(|e| upstream("Failed to store guide", e))?;
    state
        .logs
        .record(format!("Guide added: {} ({})", guide.title, guide.file_id))
        .await;

    Ok(Json(guide).into_response())
}

// ============ GET /api/guides ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    #[serde(default, alias = "walletAddress")]
    wallet: Option<String>,
}

#[derive(Serialize)]
struct GuidesResponse {
    guides: Vec<Guide>,
}

async fn handle_list_guides(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<GuidesResponse> {
    let guides = state.library.list(query.wallet.as_deref()).await;
    Json(GuidesResponse { guides })
}

// ============ POST /api/segment ============

#[derive(Deserialize)]
struct ContentRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default, rename = "voiceId")]
    voice_id: Option<String>,
}

#[derive(Serialize)]
struct SegmentsResponse {
    segments: Vec<Segment>,
}

/// Segments the content; with a `language`, each segment is also translated.
async fn handle_segment(
    State(state): State<AppState>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<SegmentsResponse>, AppError> {
    let req = json_body(body)?;
    let content = required(&req.content, "content")?;

    let mut segments = segment_content(state.completion.as_ref(), content)
        .await
        .map_err(|e| upstream("Failed to segment content", e))?;

    if let Some(code) = req.language.as_deref().filter(|c| !c.trim().is_empty()) {
        translate_segments(
            state.completion.as_ref(),
            &mut segments,
            Language::from_code(Some(code)),
        )
        .await
        .map_err(|e| upstream("Failed to translate segments", e))?;
    }

    Ok(Json(SegmentsResponse { segments }))
}

// ============ POST /api/translate, /api/process-guide ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessGuideResponse {
    translated_content: String,
}

async fn translate_request(
    state: &AppState,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<String, AppError> {
    let req = json_body(body)?;
    let content = required(&req.content, "content")?;
    let language = Language::from_code(req.language.as_deref());

    translate(state.completion.as_ref(), content, language)
        .await
        .map_err(|e| upstream("Failed to translate content", e))
}

async fn handle_translate(
    State(state): State<AppState>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, AppError> {
    let translated_text = translate_request(&state, body).await?;
    Ok(Json(TranslateResponse { translated_text }))
}

async fn handle_process_guide(
    State(state): State<AppState>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<ProcessGuideResponse>, AppError> {
    let translated_content = translate_request(&state, body).await?;
    Ok(Json(ProcessGuideResponse { translated_content }))
}

// ============ POST /api/process-content ============

#[derive(Serialize)]
struct ChunksResponse {
    chunks: Vec<String>,
}

async fn handle_process_content(
    State(state): State<AppState>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Json<ChunksResponse>, AppError> {
    let req = json_body(body)?;
    let content = required(&req.content, "content")?;
    let chunks = chunk_narration(content, state.config.speech.max_chunk_chars);
    Ok(Json(ChunksResponse { chunks }))
}

// ============ POST /api/text-to-speech, /api/speech ============

async fn handle_text_to_speech(
    State(state): State<AppState>,
    body: Result<Json<ContentRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;
    let content = required(&req.content, "content")?;
    let voice = voice_for(
        Language::from_code(req.language.as_deref()),
        req.voice_id.as_deref(),
    );

    let audio = state
        .speech
        .synthesize(content, &voice)
        .await
        .map_err(|e| upstream("Failed to generate speech", e))?;

    Ok(([(header::CONTENT_TYPE, AUDIO_MPEG)], audio).into_response())
}

#[derive(Deserialize)]
struct SpeechRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "voiceId")]
    voice_id: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Serialize)]
struct SpeechResponse {
    audio: String,
}

async fn handle_speech(
    State(state): State<AppState>,
    body: Result<Json<SpeechRequest>, JsonRejection>,
) -> Result<Json<SpeechResponse>, AppError> {
    let req = json_body(body)?;
    let text = required(&req.text, "text")?;
    let voice = voice_for(
        Language::from_code(req.language.as_deref()),
        req.voice_id.as_deref(),
    );

    let audio = state
        .speech
        .synthesize(text, &voice)
        .await
        .map_err(|e| upstream("Failed to generate speech", e))?;

    Ok(Json(SpeechResponse {
        audio: base64::engine::general_purpose::STANDARD.encode(audio),
    }))
}

// ============ POST /api/generate-image ============

#[derive(Deserialize)]
struct ImageRequest {
    #[serde(default)]
    prompt: Option<String>,
}

async fn handle_generate_image(
    State(state): State<AppState>,
    body: Result<Json<ImageRequest>, JsonRejection>,
) -> Result<Json<GeneratedImages>, AppError> {
    let req = json_body(body)?;
    let prompt = required(&req.prompt, "prompt")?;

    let generated = state
        .images
        .generate(prompt)
        .await
        .map_err(|e| upstream("Failed to generate image", e))?;
    Ok(Json(generated))
}

// ============ GET/POST /api/logs ============

const NO_LOG: (&str, &str) = ("no-log", "true");

#[derive(Serialize)]
struct LogsResponse {
    logs: Vec<LogEntry>,
}

#[derive(Deserialize)]
struct LogRequest {
    #[serde(default)]
    log: Option<LogEntry>,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

async fn handle_get_logs(State(state): State<AppState>) -> impl IntoResponse {
    let logs = state.logs.entries().await;
    ([NO_LOG], Json(LogsResponse { logs }))
}

async fn handle_post_log(
    State(state): State<AppState>,
    body: Result<Json<LogRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let req = json_body(body)?;
    let entry = req.log.ok_or_else(|| bad_request("log is required"))?;
    state.logs.push(entry).await;
    Ok(([NO_LOG], Json(SuccessResponse { success: true })).into_response())
}

// ============ GET/POST /api/deploy-agent ============

#[derive(Deserialize)]
struct DeployRequest {
    #[serde(default)]
    guides: Option<Vec<KnowledgeItem>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployResponse {
    success: bool,
    message: String,
    agent_id: String,
}

#[derive(Serialize)]
struct AgentsResponse {
    agents: Vec<Deployment>,
}

async fn handle_deploy_agent(
    State(state): State<AppState>,
    body: Result<Json<DeployRequest>, JsonRejection>,
) -> Result<Json<DeployResponse>, AppError> {
    let req = json_body(body)?;
    let guides = req.guides.unwrap_or_default();
    if guides.is_empty() {
        return Err(bad_request("No guides provided"));
    }

    let deployment = state
        .agents
        .deploy(guides)
        .await
        .ok_or_else(|| internal("Failed to deploy agent"))?;
    state
        .logs
        .record(format!("Agent deployed: {}", deployment.agent_id))
        .await;

    Ok(Json(DeployResponse {
        success: true,
        message: "Agent deployed successfully".to_string(),
        agent_id: deployment.agent_id,
    }))
}

async fn handle_list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: state.agents.list().await,
    })
}
