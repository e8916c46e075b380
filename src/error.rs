use std::time::Duration;

use crate::llm::GenerationError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors surfaced by the transcript pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("could not extract a video ID from: {0}")]
    InvalidReference(String),

    #[error("no transcript available for video {video_id}")]
    NoTranscriptAvailable { video_id: String },

    #[error("transcripts are disabled for video {video_id}")]
    TranscriptsDisabled { video_id: String },

    #[error("caption source request failed: {0}")]
    CaptionSource(String),

    #[error("rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("generative service error: {0}")]
    GenerativeService(#[from] GenerationError),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("missing or invalid bearer token")]
    Unauthorized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Stable machine-readable kind, returned to HTTP clients
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidReference(_) => "invalid_reference",
            Error::NoTranscriptAvailable { .. } => "no_transcript_available",
            Error::TranscriptsDisabled { .. } => "transcripts_disabled",
            Error::CaptionSource(_) => "caption_source_error",
            Error::RateLimited { .. } => "rate_limited",
            Error::GenerativeService(_) => "generative_service_error",
            Error::MalformedInput(_) => "malformed_input",
            Error::Unauthorized => "unauthorized",
            Error::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Fixed human-readable message per kind; never carries internal detail
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::InvalidReference(_) => "The video URL or ID could not be recognized.",
            Error::NoTranscriptAvailable { .. } => "No transcript is available for this video.",
            Error::TranscriptsDisabled { .. } => "Transcripts are disabled for this video.",
            Error::CaptionSource(_) => "The caption source could not be reached. Please try again later.",
            Error::RateLimited { .. } => "Too many requests. Please wait before retrying.",
            Error::GenerativeService(_) => "Summary generation failed. Please try again later.",
            Error::MalformedInput(_) => "The request body is invalid.",
            Error::Unauthorized => "Authentication failed.",
            Error::InvalidConfig(_) => "The service is misconfigured.",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
