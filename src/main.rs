//! Aura Advisor - document analysis server with candidate-model fallback.

mod config;
mod document;
mod fallback;
mod gemini;
mod history;
mod prompts;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::Settings;
use fallback::{FailureKind, FallbackInvoker, InvokeError, Payload};
use gemini::GeminiClient;
use history::{HistoryEntry, SessionHistory};
use prompts::Mode;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    invoker: Arc<FallbackInvoker<GeminiClient>>,
    history: SessionHistory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aura_advisor=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    if settings.candidates.is_empty() {
        warn!("AURA_MODELS resolved to an empty list; every request will fail");
    }
    info!("Candidate models (in priority order): {:?}", settings.candidates);

    let client = GeminiClient::new(&settings.api_key);
    let invoker = FallbackInvoker::new(client, settings.candidates.clone());

    // Build application state
    let state = AppState {
        invoker: Arc::new(invoker),
        history: SessionHistory::new(),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/analyze", post(analyze_document))
        .route("/advise", post(advise))
        .route("/history", get(get_history).delete(clear_history))
        .layer(DefaultBodyLimit::max(25 * 1024 * 1024)) // 25MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// List models available to the configured API key.
///
/// Diagnostic companion to the candidate list: when every candidate is
/// unavailable, this shows what the account can actually use.
async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<Vec<gemini::ModelInfo>>, (StatusCode, String)> {
    state
        .invoker
        .backend()
        .list_models()
        .await
        .map(Json)
        .map_err(|e| {
            error!("Model listing failed: {e:#}");
            (StatusCode::BAD_GATEWAY, format!("Model listing failed: {e}"))
        })
}

#[derive(serde::Deserialize)]
struct AnalyzeQuery {
    mode: Option<String>,
}

#[derive(serde::Serialize)]
struct AdviceResponse {
    text: String,
}

/// Upload a document (JPG, PNG or PDF) and get an analysis.
async fn analyze_document(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    mut multipart: Multipart,
) -> Result<Json<AdviceResponse>, (StatusCode, String)> {
    let mode = parse_mode(query.mode.as_deref(), Mode::Analyze)?;

    // Read the uploaded file
    let mut filename = String::new();
    let mut file_data = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e)))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().unwrap_or("document").to_string();
            file_data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e)))?
                .to_vec();
            break;
        }
    }

    if file_data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    let mime = document::detect_mime(&filename, &file_data).ok_or_else(|| {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Only JPG, PNG and PDF uploads are supported".to_string(),
        )
    })?;

    info!(
        "Received file: {} ({} bytes, {}) in mode: {}",
        filename,
        file_data.len(),
        mime,
        mode.as_str()
    );

    // Best-effort text enrichment for PDFs; failure is a missing hint only.
    let extracted = if mime == "application/pdf" {
        match document::extract_pdf_text(&file_data) {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                warn!("PDF text extraction failed: {e}");
                None
            }
        }
    } else {
        None
    };

    let prompt = prompts::document_prompt(mode, extracted.as_deref());
    let payload = Payload::text(prompt).with_attachment(mime, file_data.clone());

    let text = state
        .invoker
        .invoke(&payload)
        .await
        .map_err(failure_response)?;

    let hash = document::content_hash(&file_data);
    state
        .history
        .record(format!("Analyzed: {filename}"), Some(hash));

    Ok(Json(AdviceResponse { text }))
}

#[derive(serde::Deserialize)]
struct AdviseRequest {
    text: String,
    mode: Option<String>,
}

/// Describe a problem in free text and get advice.
async fn advise(
    State(state): State<AppState>,
    Json(request): Json<AdviseRequest>,
) -> Result<Json<AdviceResponse>, (StatusCode, String)> {
    if request.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Empty problem description".to_string(),
        ));
    }
    let mode = parse_mode(request.mode.as_deref(), Mode::Advise)?;

    let payload = Payload::text(prompts::text_prompt(mode, &request.text));
    let text = state
        .invoker
        .invoke(&payload)
        .await
        .map_err(failure_response)?;

    state
        .history
        .record(format!("Question: {}", short_label(&request.text, 30)), None);

    Ok(Json(AdviceResponse { text }))
}

/// List this session's history, oldest first.
async fn get_history(State(state): State<AppState>) -> Json<Vec<HistoryEntry>> {
    Json(state.history.entries())
}

/// Clear this session's history.
async fn clear_history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let cleared = state.history.clear();
    info!("Cleared {} history entries", cleared);
    Json(serde_json::json!({ "cleared": cleared }))
}

// ============================================================================
// Helper functions
// ============================================================================

fn parse_mode(raw: Option<&str>, default: Mode) -> Result<Mode, (StatusCode, String)> {
    match raw {
        Some(raw) => Mode::from_str(raw)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, format!("Unknown mode: {raw}"))),
        None => Ok(default),
    }
}

/// Map a total-failure classification to an HTTP status and user guidance.
fn failure_response(err: InvokeError) -> (StatusCode, String) {
    let kind = err.kind();
    let response = match kind {
        FailureKind::QuotaExhausted => (
            StatusCode::TOO_MANY_REQUESTS,
            "Model quota is exhausted. Check billing and quota limits for this API key."
                .to_string(),
        ),
        FailureKind::ModelUnavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            "No candidate model is available to this account. Check /models and adjust AURA_MODELS."
                .to_string(),
        ),
        FailureKind::Other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Generation failed: {err}"),
        ),
    };
    error!("Invocation failed ({:?}): {:#}", kind, anyhow::Error::new(err));
    response
}

/// Char-safe truncation for history labels.
fn short_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
