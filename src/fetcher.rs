use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::youtube::{CaptionError, CaptionSource, CaptionTrack};
use crate::{Transcript, VideoId};

/// Fallback order used when none is configured
pub const DEFAULT_FALLBACK_LANGUAGES: [&str; 2] = ["ja", "en"];

/// Retrieves a caption track, walking a prioritized language list
pub struct CaptionFetcher {
    source: Arc<dyn CaptionSource>,
    fallback_languages: Vec<String>,
}

/// Language requests that mean "no preference"
fn is_auto(lang: &str) -> bool {
    let lang = lang.trim();
    lang.is_empty() || lang.eq_ignore_ascii_case("auto")
}

impl CaptionFetcher {
    pub fn new(source: Arc<dyn CaptionSource>, fallback_languages: Vec<String>) -> Self {
        Self {
            source,
            fallback_languages,
        }
    }

    /// Explicit languages to try, in order, before enumerating every listed track
    pub fn plan(&self, requested: &str) -> Vec<String> {
        let mut plan: Vec<String> = Vec::new();
        let head = (!is_auto(requested)).then(|| requested.trim().to_string());
        for lang in head.into_iter().chain(self.fallback_languages.iter().cloned()) {
            if !lang.is_empty() && !plan.contains(&lang) {
                plan.push(lang);
            }
        }
        plan
    }

    pub async fn fetch(&self, video_id: &VideoId, requested: &str) -> Result<Transcript> {
        let mut attempted = Vec::new();

        for lang in self.plan(requested) {
            debug!("Trying captions for {video_id} in {lang}");
            let outcome = self.source.fetch(video_id, &lang).await;
            attempted.push(lang);
            match outcome {
                Ok(track) => return Ok(self.accept(video_id, requested, track)),
                Err(CaptionError::NotFound { lang }) => debug!("No {lang} captions for {video_id}"),
                Err(e) => return Err(terminal(video_id, e)),
            }
        }

        self.try_any_available(video_id, requested, &attempted).await
    }

    async fn try_any_available(&self, video_id: &VideoId, requested: &str, attempted: &[String]) -> Result<Transcript> {
        let listed = match self.source.available_languages(video_id).await {
            Ok(listed) => listed,
            Err(CaptionError::Disabled) => {
                return Err(Error::TranscriptsDisabled {
                    video_id: video_id.to_string(),
                });
            }
            Err(e) => {
                warn!("Could not list caption tracks for {video_id}: {e}");
                return Err(no_transcript(video_id));
            }
        };

        for lang in listed.iter().filter(|l| !attempted.contains(l)) {
            debug!("Trying listed caption track {lang} for {video_id}");
            match self.source.fetch(video_id, lang).await {
                Ok(track) => return Ok(self.accept(video_id, requested, track)),
                Err(e) => debug!("Skipping caption track {lang} for {video_id}: {e}"),
            }
        }

        Err(no_transcript(video_id))
    }

    fn accept(&self, video_id: &VideoId, requested: &str, track: CaptionTrack) -> Transcript {
        if !is_auto(requested) && track.language != requested.trim() {
            info!(
                "Requested {} captions for {video_id}, using {} instead",
                requested.trim(),
                track.language
            );
        }
        info!(
            "Fetched {} caption segments for {video_id} ({})",
            track.segments.len(),
            track.language
        );
        Transcript {
            video_id: video_id.clone(),
            title: track.title,
            channel: track.channel,
            language: track.language,
            segments: track.segments,
        }
    }
}

fn no_transcript(video_id: &VideoId) -> Error {
    Error::NoTranscriptAvailable {
        video_id: video_id.to_string(),
    }
}

/// Map a non-advancing caption error to the pipeline error that ends the chain
fn terminal(video_id: &VideoId, e: CaptionError) -> Error {
    match e {
        CaptionError::Disabled => Error::TranscriptsDisabled {
            video_id: video_id.to_string(),
        },
        CaptionError::Unplayable { reason } => {
            warn!("Video {video_id} is not playable: {reason}");
            no_transcript(video_id)
        }
        CaptionError::Transport(detail) => Error::CaptionSource(detail),
        CaptionError::NotFound { .. } => no_transcript(video_id),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::Segment;

    #[derive(Default)]
    struct MockSource {
        tracks: HashMap<String, Result<(), CaptionError>>,
        listed: Vec<String>,
        disabled: bool,
        calls: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn with_tracks(langs: &[&str]) -> Self {
            Self {
                tracks: langs.iter().map(|l| (l.to_string(), Ok(()))).collect(),
                listed: langs.iter().map(|l| l.to_string()).collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CaptionSource for MockSource {
        async fn fetch(&self, _video_id: &VideoId, lang: &str) -> Result<CaptionTrack, CaptionError> {
            self.calls.lock().unwrap().push(lang.to_string());
            if self.disabled {
                return Err(CaptionError::Disabled);
            }
            match self.tracks.get(lang) {
                Some(Ok(())) => Ok(CaptionTrack {
                    language: lang.to_string(),
                    title: Some("Test Video".to_string()),
                    channel: Some("Test Channel".to_string()),
                    segments: vec![Segment {
                        text: format!("text in {lang}"),
                        start: 0.0,
                        duration: 1.0,
                    }],
                }),
                Some(Err(e)) => Err(e.clone()),
                None => Err(CaptionError::NotFound { lang: lang.to_string() }),
            }
        }

        async fn available_languages(&self, _video_id: &VideoId) -> Result<Vec<String>, CaptionError> {
            self.calls.lock().unwrap().push("<list>".to_string());
            if self.disabled {
                return Err(CaptionError::Disabled);
            }
            Ok(self.listed.clone())
        }
    }

    fn fetcher(source: &Arc<MockSource>) -> CaptionFetcher {
        CaptionFetcher::new(
            source.clone(),
            DEFAULT_FALLBACK_LANGUAGES.iter().map(|l| l.to_string()).collect(),
        )
    }

    fn video() -> VideoId {
        crate::resolve("https://youtu.be/dQw4w9WgXcQ?t=30").unwrap()
    }

    #[test]
    fn test_plan_skips_auto_and_duplicates() {
        let source = Arc::new(MockSource::default());
        let f = fetcher(&source);
        assert_eq!(f.plan("fr"), vec!["fr", "ja", "en"]);
        assert_eq!(f.plan("auto"), vec!["ja", "en"]);
        assert_eq!(f.plan(""), vec!["ja", "en"]);
        assert_eq!(f.plan("en"), vec!["en", "ja"]);
    }

    #[tokio::test]
    async fn test_falls_through_to_english() {
        let source = Arc::new(MockSource::with_tracks(&["en"]));
        let transcript = fetcher(&source).fetch(&video(), "fr").await.unwrap();
        assert_eq!(video().as_str(), "dQw4w9WgXcQ");
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.video_id, video());
        assert_eq!(transcript.title.as_deref(), Some("Test Video"));
        assert_eq!(source.calls(), vec!["fr", "ja", "en"]);
    }

    #[tokio::test]
    async fn test_requested_language_wins() {
        let source = Arc::new(MockSource::with_tracks(&["ja", "en", "fr"]));
        let transcript = fetcher(&source).fetch(&video(), "fr").await.unwrap();
        assert_eq!(transcript.language, "fr");
        assert_eq!(source.calls(), vec!["fr"]);
    }

    #[tokio::test]
    async fn test_any_available_skips_attempted() {
        let source = Arc::new(MockSource {
            listed: vec!["ja".to_string(), "de".to_string(), "ko".to_string()],
            tracks: [
                ("de".to_string(), Err(CaptionError::Transport("reset".to_string()))),
                ("ko".to_string(), Ok(())),
            ]
            .into_iter()
            .collect(),
            ..MockSource::default()
        });
        let transcript = fetcher(&source).fetch(&video(), "auto").await.unwrap();
        assert_eq!(transcript.language, "ko");
        assert_eq!(source.calls(), vec!["ja", "en", "<list>", "de", "ko"]);
    }

    #[tokio::test]
    async fn test_disabled_short_circuits() {
        let source = Arc::new(MockSource {
            disabled: true,
            ..MockSource::default()
        });
        let err = fetcher(&source).fetch(&video(), "fr").await.unwrap_err();
        assert!(matches!(err, Error::TranscriptsDisabled { .. }));
        assert_eq!(source.calls(), vec!["fr"]);
    }

    #[tokio::test]
    async fn test_exhausted_chain() {
        let source = Arc::new(MockSource::default());
        let err = fetcher(&source).fetch(&video(), "fr").await.unwrap_err();
        assert!(matches!(err, Error::NoTranscriptAvailable { .. }));
        assert_eq!(source.calls(), vec!["fr", "ja", "en", "<list>"]);
    }

    #[tokio::test]
    async fn test_transport_error_outside_any_available_is_fatal() {
        let source = Arc::new(MockSource {
            tracks: [("ja".to_string(), Err(CaptionError::Transport("timeout".to_string())))]
                .into_iter()
                .collect(),
            ..MockSource::default()
        });
        let err = fetcher(&source).fetch(&video(), "auto").await.unwrap_err();
        assert!(matches!(err, Error::CaptionSource(ref d) if d == "timeout"));
        assert_eq!(source.calls(), vec!["ja"]);
    }

    #[tokio::test]
    async fn test_unplayable_ends_chain() {
        let source = Arc::new(MockSource {
            tracks: [(
                "ja".to_string(),
                Err(CaptionError::Unplayable {
                    reason: "private".to_string(),
                }),
            )]
            .into_iter()
            .collect(),
            ..MockSource::default()
        });
        let err = fetcher(&source).fetch(&video(), "auto").await.unwrap_err();
        assert!(matches!(err, Error::NoTranscriptAvailable { .. }));
    }
}
