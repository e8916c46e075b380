pub mod cache;
pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod llm;
pub mod normalize;
pub mod output;
pub mod ratelimit;
pub mod reference;
pub mod retry;
pub mod sentence;
pub mod server;
pub mod summarize;
pub mod youtube;

use serde::Serialize;

pub use error::{Error, Result};
pub use reference::{VideoId, resolve};

/// A single captioned segment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub text: String,
    pub start: f64,
    pub duration: f64,
}

/// Caption transcript for a video, in the language actually retrieved
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub video_id: VideoId,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub language: String,
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// Segment texts joined into one flowing string
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// End of the last segment, in seconds
    pub fn duration(&self) -> f64 {
        self.segments
            .iter()
            .map(|s| s.start + s.duration)
            .fold(0.0, f64::max)
    }
}
