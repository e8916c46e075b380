//! HTTP front end: POST /summarize, POST /extract, GET /health.
//!
//! Every POST is checked in the same order: bearer token (401), rate limit
//! (429), then body validation (400). Error bodies carry a stable kind and a
//! fixed message; internal detail only goes to the log.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::cache::{CacheStats, ResponseCache, cache_key};
use crate::engine::{Engine, TranscriptInput};
use crate::error::{Error, Result};
use crate::output::{self, OutputFormat};
use crate::ratelimit::RateLimiter;
use crate::summarize::SummaryRequest;

/// Largest summary budget a request may ask for
pub const MAX_WORDS_LIMIT: u32 = 5000;

/// Defaults applied to fields a request leaves out
#[derive(Debug, Clone)]
pub struct RequestDefaults {
    pub target_lang: String,
    pub max_words: u32,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            target_lang: "ja".to_string(),
            max_words: 300,
        }
    }
}

/// Process-wide state shared by all handlers
pub struct AppState {
    pub engine: Engine,
    pub limiter: RateLimiter,
    pub cache: ResponseCache<SummarizeResponse>,
    /// `None` disables authentication
    pub auth_token: Option<String>,
    pub defaults: RequestDefaults,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub url: Option<String>,
    pub transcript: Option<String>,
    pub lang: Option<String>,
    pub target_lang: Option<String>,
    pub max_words: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SummarizeResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_lang: Option<String>,
    pub target_lang: String,
    pub transcript_length: usize,
    pub chunks: usize,
    pub summary: String,
    pub ai_generated: bool,
    pub cached: bool,
    /// Seconds spent serving this request
    pub processing_time: f64,
}

fn default_lang() -> String {
    "auto".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub url: String,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Serialize)]
pub struct ExtractStats {
    pub segment_count: usize,
    pub char_count: usize,
    pub normalized_char_count: usize,
    pub duration_seconds: f64,
    pub detected_language: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub video_id: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub language: String,
    pub requested_lang: String,
    pub format: OutputFormat,
    pub raw_transcript: String,
    pub normalized_transcript: String,
    pub stats: ExtractStats,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub generative_service: bool,
    pub cache: CacheStats,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidReference(_)
        | Error::NoTranscriptAvailable { .. }
        | Error::TranscriptsDisabled { .. }
        | Error::MalformedInput(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        Error::CaptionSource(_) => StatusCode::BAD_GATEWAY,
        Error::GenerativeService(_) | Error::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!("Request failed: {self}");
        } else {
            info!("Request rejected: {self}");
        }

        let retry_after = self.retry_after().map(|d| d.as_secs().max(1));
        let body = ErrorBody {
            error: self.kind(),
            message: self.public_message(),
            retry_after,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Rate-limit key for the caller: first `X-Forwarded-For` hop, else the peer address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientKey {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let key = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());
        Ok(ClientKey(key))
    }
}

/// Compare the `Authorization: Bearer` token with the configured one
pub fn authorize(headers: &HeaderMap, expected: Option<&str>) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(Error::Unauthorized),
    }
}

impl AppState {
    /// Auth then rate limit, shared by every POST handler
    fn admit(&self, headers: &HeaderMap, client: &ClientKey) -> Result<()> {
        authorize(headers, self.auth_token.as_deref())?;
        self.limiter.check(&client.0)
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0
}

async fn handle_summarize(
    State(state): State<Arc<AppState>>,
    client: ClientKey,
    headers: HeaderMap,
    body: std::result::Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Json<SummarizeResponse>> {
    let started = Instant::now();
    state.admit(&headers, &client)?;
    let Json(body) = body.map_err(|e| Error::MalformedInput(e.body_text()))?;

    let input = TranscriptInput::from_parts(body.url.as_deref(), body.transcript.as_deref(), body.lang.as_deref())?;
    let target_lang = body
        .target_lang
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| state.defaults.target_lang.clone());
    let max_words = body.max_words.unwrap_or(state.defaults.max_words);
    if !(1..=MAX_WORDS_LIMIT).contains(&max_words) {
        return Err(Error::MalformedInput(format!("max_words must be 1..={MAX_WORDS_LIMIT}")));
    }

    let max_words_field = max_words.to_string();
    let key = match &input {
        TranscriptInput::Text(text) => cache_key(&["text", text, &target_lang, &max_words_field]),
        TranscriptInput::Reference { url, lang } => {
            let video_id = crate::resolve(url)?;
            cache_key(&["video", video_id.as_str(), lang, &target_lang, &max_words_field])
        }
    };

    if let Some(mut hit) = state.cache.get(&key) {
        debug!("Cache hit for summary {key}");
        hit.cached = true;
        hit.processing_time = elapsed_secs(started);
        return Ok(Json(hit));
    }

    let request = SummaryRequest {
        target_lang: &target_lang,
        max_words,
        title: None,
    };
    let outcome = state.engine.summarize(&input, &request).await?;

    let url = outcome
        .video_id
        .as_ref()
        .map(|id| id.watch_url())
        .or(body.url)
        .unwrap_or_default();
    let response = SummarizeResponse {
        url,
        title: outcome.title,
        channel: outcome.channel,
        original_lang: outcome.original_lang,
        target_lang,
        transcript_length: outcome.transcript_length,
        chunks: outcome.summary.chunks,
        summary: outcome.summary.text,
        ai_generated: outcome.summary.ai_generated,
        cached: false,
        processing_time: elapsed_secs(started),
    };
    // An extractive stand-in for a failed generation is served once, never cached
    if response.ai_generated || !state.engine.is_generative() {
        state.cache.insert(key, response.clone());
    } else {
        debug!("Not caching degraded summary {key}");
    }
    info!(
        "Summarized {} in {:.3}s ({} chunks, ai_generated={})",
        response.url, response.processing_time, response.chunks, response.ai_generated
    );
    Ok(Json(response))
}

async fn handle_extract(
    State(state): State<Arc<AppState>>,
    client: ClientKey,
    headers: HeaderMap,
    body: std::result::Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractResponse>> {
    state.admit(&headers, &client)?;
    let Json(body) = body.map_err(|e| Error::MalformedInput(e.body_text()))?;

    let extraction = state.engine.extract(&body.url, &body.lang).await?;
    let transcript = &extraction.transcript;
    let raw_transcript = output::render(body.format, transcript);

    let stats = ExtractStats {
        segment_count: transcript.segments.len(),
        char_count: transcript.plain_text().chars().count(),
        normalized_char_count: extraction.normalized.chars().count(),
        duration_seconds: transcript.duration(),
        detected_language: transcript.language.clone(),
    };
    info!(
        "Extracted {} segments from {} ({})",
        stats.segment_count, transcript.video_id, transcript.language
    );

    Ok(Json(ExtractResponse {
        video_id: transcript.video_id.to_string(),
        title: transcript.title.clone(),
        channel: transcript.channel.clone(),
        language: transcript.language.clone(),
        requested_lang: extraction.requested_lang.clone(),
        format: body.format,
        raw_transcript,
        normalized_transcript: extraction.normalized,
        stats,
    }))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("GIT_DESCRIBE"),
        generative_service: state.engine.is_generative(),
        cache: state.cache.stats(),
    })
}

/// Build the router over shared state
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/summarize", post(handle_summarize))
        .route("/extract", post(handle_extract))
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM; in-flight requests complete before exit
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> eyre::Result<()> {
    if state.auth_token.is_none() {
        warn!("No auth token configured; /summarize and /extract are open to any caller");
    }
    if !state.engine.is_generative() {
        warn!("No generative service configured; summaries will be extractive");
    }

    let listener = TcpListener::bind(bind_addr).await?;
    info!(
        "Listening on {bind_addr} (rate limit window {}s)",
        state.limiter.window().as_secs()
    );
    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn headers(auth: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(value) = auth {
            map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_authorize() {
        assert!(authorize(&headers(None), None).is_ok());
        assert!(authorize(&headers(Some("Bearer secret")), Some("secret")).is_ok());
        assert!(matches!(authorize(&headers(None), Some("secret")), Err(Error::Unauthorized)));
        assert!(authorize(&headers(Some("Bearer wrong")), Some("secret")).is_err());
        assert!(authorize(&headers(Some("secret")), Some("secret")).is_err());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&Error::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&Error::TranscriptsDisabled {
                video_id: "x".to_string()
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::CaptionSource("down".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::RateLimited {
                retry_after: Duration::from_secs(60)
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_rate_limited_response_has_retry_after_header() {
        let response = Error::RateLimited {
            retry_after: Duration::from_secs(60),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "60");
    }
}
