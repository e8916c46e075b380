use log::{debug, info};

use crate::chunk;
use crate::error::{Error, Result};
use crate::fetcher::CaptionFetcher;
use crate::normalize::Normalizer;
use crate::summarize::{Summarizer, Summary, SummaryRequest};
use crate::{Transcript, VideoId};

/// Accepted size of caller-supplied transcript text, in characters
pub const MIN_TRANSCRIPT_CHARS: usize = 10;
pub const MAX_TRANSCRIPT_CHARS: usize = 2_000_000;

/// Where the text to summarize comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptInput {
    /// Already-extracted transcript text
    Text(String),
    /// A video reference whose captions are fetched in `lang`
    Reference { url: String, lang: String },
}

impl TranscriptInput {
    /// Validate the optional request fields; non-empty text wins over a reference
    pub fn from_parts(url: Option<&str>, transcript: Option<&str>, lang: Option<&str>) -> Result<Self> {
        if let Some(text) = transcript.map(str::trim).filter(|t| !t.is_empty()) {
            let len = text.chars().count();
            if !(MIN_TRANSCRIPT_CHARS..=MAX_TRANSCRIPT_CHARS).contains(&len) {
                return Err(Error::MalformedInput(format!(
                    "transcript must be {MIN_TRANSCRIPT_CHARS}..={MAX_TRANSCRIPT_CHARS} characters, got {len}"
                )));
            }
            return Ok(TranscriptInput::Text(text.to_string()));
        }

        match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Ok(TranscriptInput::Reference {
                url: url.to_string(),
                lang: lang.unwrap_or("auto").to_string(),
            }),
            None => Err(Error::MalformedInput("either url or transcript is required".to_string())),
        }
    }
}

/// Raw and normalized transcript for one video
#[derive(Debug, Clone)]
pub struct Extraction {
    pub transcript: Transcript,
    pub requested_lang: String,
    pub normalized: String,
}

/// A summary plus what is known about its source
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub video_id: Option<VideoId>,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub original_lang: Option<String>,
    /// Characters of normalized text that were summarized
    pub transcript_length: usize,
    pub summary: Summary,
}

/// Runs resolve, fetch, normalize, chunk and summarize for one request
pub struct Engine {
    fetcher: CaptionFetcher,
    normalizer: Normalizer,
    summarizer: Summarizer,
    max_chunk_chars: usize,
}

impl Engine {
    pub fn new(
        fetcher: CaptionFetcher,
        normalizer: Normalizer,
        summarizer: Summarizer,
        max_chunk_chars: usize,
    ) -> Self {
        Self {
            fetcher,
            normalizer,
            summarizer,
            max_chunk_chars,
        }
    }

    pub fn is_generative(&self) -> bool {
        self.summarizer.is_generative()
    }

    pub async fn extract(&self, reference: &str, lang: &str) -> Result<Extraction> {
        let video_id = crate::resolve(reference)?;
        let transcript = self.fetcher.fetch(&video_id, lang).await?;
        let normalized = self.normalizer.normalize(&transcript.plain_text());
        debug!(
            "Normalized {} segments of {video_id} into {} chars",
            transcript.segments.len(),
            normalized.chars().count()
        );
        Ok(Extraction {
            transcript,
            requested_lang: lang.to_string(),
            normalized,
        })
    }

    pub async fn summarize(&self, input: &TranscriptInput, request: &SummaryRequest<'_>) -> Result<SummaryOutcome> {
        let (normalized, video_id, title, channel, original_lang) = match input {
            TranscriptInput::Text(text) => (self.normalizer.normalize(text), None, None, None, None),
            TranscriptInput::Reference { url, lang } => {
                let Extraction {
                    transcript, normalized, ..
                } = self.extract(url, lang).await?;
                (
                    normalized,
                    Some(transcript.video_id),
                    transcript.title,
                    transcript.channel,
                    Some(transcript.language),
                )
            }
        };

        if normalized.trim().is_empty() {
            return Err(Error::MalformedInput("transcript is empty after normalization".to_string()));
        }

        let chunks = chunk::chunk(&normalized, self.max_chunk_chars);
        info!(
            "Summarizing {} chars in {} chunk(s) into {}",
            normalized.chars().count(),
            chunks.len(),
            request.target_lang
        );
        let request = SummaryRequest {
            title: request.title.or(title.as_deref()),
            ..*request
        };
        let summary = self.summarizer.summarize(&chunks, &request).await?;

        Ok(SummaryOutcome {
            video_id,
            title,
            channel,
            original_lang,
            transcript_length: normalized.chars().count(),
            summary,
        })
    }
}
