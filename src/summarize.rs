use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::chunk::{self, Chunk};
use crate::error::{Error, Result};
use crate::llm::{GenerationError, Prompt, TextGenerator};
use crate::retry::RetryPolicy;
use crate::sentence;

const SINGLE_PASS_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes video transcripts. \
Provide a clear, structured summary: start with a short title, then the key points as bullet points, \
then a one-paragraph conclusion. Use only information present in the transcript.";

const PARTIAL_SYSTEM_PROMPT: &str = "You are a helpful assistant that summarizes one part of a longer video transcript. \
Capture the key points, main arguments, and important details of this part as concise bullet points. \
Do not add an introduction or a conclusion.";

const CONSOLIDATION_SYSTEM_PROMPT: &str = "You are a helpful assistant that merges partial summaries of one video \
into a single final summary. Remove duplicated points, keep the chronological flow, and produce a short title, \
the key points as bullet points, and a one-paragraph conclusion.";

/// What the caller wants out of a summary
#[derive(Debug, Clone, Copy)]
pub struct SummaryRequest<'a> {
    pub target_lang: &'a str,
    pub max_words: u32,
    pub title: Option<&'a str>,
}

/// Final summary and how it was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub text: String,
    /// Non-blank chunks the text was built from
    pub chunks: usize,
    /// False when the extractive fallback produced the text
    pub ai_generated: bool,
    pub model: Option<String>,
}

/// Summary of one chunk, tagged with its position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSummary {
    pub index: usize,
    pub total: usize,
    pub text: String,
}

impl fmt::Display for PartialSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Part {}/{}]\n{}", self.index + 1, self.total, self.text.trim())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SummarizerSettings {
    /// Sentences kept by the extractive fallback
    pub extractive_sentences: usize,
    /// Degrade to the extractive fallback instead of failing on generative errors
    pub fallback_on_error: bool,
    /// Policy for per-chunk calls; consolidation is attempted once
    pub chunk_retry: RetryPolicy,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            extractive_sentences: 5,
            fallback_on_error: true,
            chunk_retry: RetryPolicy::new(2, std::time::Duration::from_millis(500)),
        }
    }
}

/// Map-reduce summarizer over transcript chunks
pub struct Summarizer {
    generator: Option<Arc<dyn TextGenerator>>,
    settings: SummarizerSettings,
}

impl Summarizer {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, settings: SummarizerSettings) -> Self {
        Self { generator, settings }
    }

    /// Whether a generative service is configured
    pub fn is_generative(&self) -> bool {
        self.generator.is_some()
    }

    pub async fn summarize(&self, chunks: &[Chunk], request: &SummaryRequest<'_>) -> Result<Summary> {
        // A paragraph break can land in a chunk of its own; it has nothing to summarize
        let parts: Vec<&str> = chunks
            .iter()
            .map(|c| c.text.as_str())
            .filter(|t| !t.trim().is_empty())
            .collect();

        let Some(generator) = &self.generator else {
            info!("No generative service configured; using extractive summary");
            return Ok(self.extractive(chunks, parts.len()));
        };
        if parts.is_empty() {
            return Ok(self.extractive(chunks, 0));
        }

        match self.generate(generator.as_ref(), &parts, request).await {
            Ok(text) => Ok(Summary {
                text,
                chunks: parts.len(),
                ai_generated: true,
                model: Some(generator.model().to_string()),
            }),
            Err(e) if self.settings.fallback_on_error => {
                warn!("Generative summary failed, falling back to extractive summary: {e}");
                Ok(self.extractive(chunks, parts.len()))
            }
            Err(e) => Err(Error::GenerativeService(e)),
        }
    }

    async fn generate(
        &self,
        generator: &dyn TextGenerator,
        parts: &[&str],
        request: &SummaryRequest<'_>,
    ) -> Result<String, GenerationError> {
        if let [only] = parts {
            let prompt = single_pass_prompt(only, request);
            let text = self.settings.chunk_retry.run(|| generator.generate(&prompt)).await?;
            return Ok(text.trim().to_string());
        }

        // Map: strictly sequential so every partial exists before the reduce reads them
        let total = parts.len();
        let mut partials = Vec::with_capacity(total);
        for (index, part) in parts.iter().enumerate() {
            let prompt = partial_prompt(index, total, part, request);
            let text = self.settings.chunk_retry.run(|| generator.generate(&prompt)).await?;
            debug!("Summarized part {}/{total}", index + 1);
            partials.push(PartialSummary { index, total, text });
        }

        // Reduce: a single attempt; failure here ends the generative path
        let prompt = consolidation_prompt(&partials, request);
        let text = generator.generate(&prompt).await?;
        Ok(text.trim().to_string())
    }

    fn extractive(&self, chunks: &[Chunk], parts: usize) -> Summary {
        Summary {
            text: extractive_summary(&chunk::join(chunks), self.settings.extractive_sentences),
            chunks: parts,
            ai_generated: false,
            model: None,
        }
    }
}

/// Human-readable language name for prompts
pub fn language_name(code: &str) -> &str {
    match code.split(['-', '_']).next().unwrap_or(code) {
        "ja" => "Japanese",
        "en" => "English",
        "zh" => "Chinese",
        "ko" => "Korean",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "pt" => "Portuguese",
        "it" => "Italian",
        "ru" => "Russian",
        _ => code,
    }
}

fn length_guideline(target_lang: &str, max_words: u32) -> String {
    match target_lang {
        "ja" | "zh" | "ko" => format!("about {max_words} characters"),
        _ => format!("about {max_words} words"),
    }
}

fn max_tokens(max_words: u32) -> u32 {
    max_words.saturating_mul(4).clamp(256, 4096)
}

fn single_pass_prompt(text: &str, request: &SummaryRequest<'_>) -> Prompt {
    let title = request.title.map(|t| format!(" from the video \"{t}\"")).unwrap_or_default();
    Prompt {
        system: SINGLE_PASS_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Summarize this transcript{title} in {} in {}.\n\
             Structure: title, key points, conclusion.\n\n{text}",
            language_name(request.target_lang),
            length_guideline(request.target_lang, request.max_words),
        ),
        max_tokens: max_tokens(request.max_words),
    }
}

fn partial_prompt(index: usize, total: usize, text: &str, request: &SummaryRequest<'_>) -> Prompt {
    let budget = (request.max_words / 2).max(1);
    Prompt {
        system: PARTIAL_SYSTEM_PROMPT.to_string(),
        user: format!(
            "This is part {} of {total} of a transcript. Summarize it in {} in {}.\n\n{}",
            index + 1,
            language_name(request.target_lang),
            length_guideline(request.target_lang, budget),
            text,
        ),
        max_tokens: max_tokens(budget),
    }
}

fn consolidation_prompt(partials: &[PartialSummary], request: &SummaryRequest<'_>) -> Prompt {
    let joined = partials.iter().map(|p| p.to_string()).collect::<Vec<_>>().join("\n\n");
    let title = request.title.map(|t| format!(" of the video \"{t}\"")).unwrap_or_default();
    Prompt {
        system: CONSOLIDATION_SYSTEM_PROMPT.to_string(),
        user: format!(
            "Below are {} partial summaries{title}. Deduplicate and consolidate them into one final summary \
             in {} in {}.\n\n{joined}",
            partials.len(),
            language_name(request.target_lang),
            length_guideline(request.target_lang, request.max_words),
        ),
        max_tokens: max_tokens(request.max_words),
    }
}

/// Pick the `n` longest distinct sentences and return them in document order, one per line
pub fn extractive_summary(text: &str, n: usize) -> String {
    let mut candidates: Vec<String> = Vec::new();
    for line in text.lines() {
        for s in sentence::sentences(line) {
            if !candidates.contains(&s) {
                candidates.push(s);
            }
        }
    }

    let mut ranked: Vec<usize> = (0..candidates.len()).collect();
    ranked.sort_by_key(|&i| std::cmp::Reverse(candidates[i].chars().count()));
    ranked.truncate(n.max(1));
    ranked.sort_unstable();

    ranked
        .into_iter()
        .map(|i| candidates[i].as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;

    /// Records prompts; fails the first `failures` calls, or every call when `failures` is `usize::MAX`
    struct ScriptedGenerator {
        prompts: Mutex<Vec<Prompt>>,
        failures: usize,
    }

    impl ScriptedGenerator {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                prompts: Mutex::new(Vec::new()),
                failures,
            })
        }

        fn prompts(&self) -> Vec<Prompt> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.clone());
            if prompts.len() <= self.failures {
                return Err(GenerationError::Timeout);
            }
            Ok(format!("summary #{}", prompts.len()))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn settings() -> SummarizerSettings {
        SummarizerSettings {
            chunk_retry: RetryPolicy::new(2, Duration::ZERO),
            ..SummarizerSettings::default()
        }
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(index, t)| Chunk {
                index,
                text: t.to_string(),
                oversized: false,
            })
            .collect()
    }

    fn request() -> SummaryRequest<'static> {
        SummaryRequest {
            target_lang: "en",
            max_words: 300,
            title: Some("Caching 101"),
        }
    }

    #[tokio::test]
    async fn test_single_chunk_makes_one_call() {
        let generator = ScriptedGenerator::new(0);
        let summarizer = Summarizer::new(Some(generator.clone()), settings());
        let summary = summarizer
            .summarize(&chunks(&["Caching is hard. It matters."]), &request())
            .await
            .unwrap();

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].user.contains("Caching is hard."));
        assert!(prompts[0].user.contains("Caching 101"));
        assert!(prompts[0].user.contains("about 300 words"));
        assert_eq!(summary.text, "summary #1");
        assert!(summary.ai_generated);
        assert_eq!(summary.model.as_deref(), Some("scripted"));
    }

    #[tokio::test]
    async fn test_three_chunks_map_then_reduce() {
        let generator = ScriptedGenerator::new(0);
        let summarizer = Summarizer::new(Some(generator.clone()), settings());
        let summary = summarizer
            .summarize(&chunks(&["first part.", "second part.", "third part."]), &request())
            .await
            .unwrap();

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 4);
        for (i, part) in ["first part.", "second part.", "third part."].iter().enumerate() {
            assert!(prompts[i].user.contains(part));
            assert!(prompts[i].user.contains(&format!("part {} of 3", i + 1)));
            assert!(prompts[i].user.contains("about 150 words"));
        }
        let reduce = &prompts[3].user;
        assert!(reduce.contains("[Part 1/3]\nsummary #1"));
        assert!(reduce.contains("[Part 2/3]\nsummary #2"));
        assert!(reduce.contains("[Part 3/3]\nsummary #3"));
        assert!(reduce.contains("about 300 words"));
        assert_eq!(summary.text, "summary #4");
        assert_eq!(summary.chunks, 3);
    }

    #[tokio::test]
    async fn test_blank_chunks_are_not_sent() {
        let generator = ScriptedGenerator::new(0);
        let summarizer = Summarizer::new(Some(generator.clone()), settings());
        let parts = crate::chunk::chunk("aaaaa\n\nbbbbbbbbbbbb", 5);
        assert_eq!(parts.len(), 3);
        let summary = summarizer.summarize(&parts, &request()).await.unwrap();

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].user.contains("part 1 of 2") && prompts[0].user.ends_with("aaaaa"));
        assert!(prompts[1].user.contains("part 2 of 2") && prompts[1].user.ends_with("bbbbbbbbbbbb"));
        assert!(prompts[2].user.contains("[Part 2/2]\nsummary #2"));
        assert!(!prompts[2].user.contains("[Part 3/"));
        assert_eq!(summary.chunks, 2);
    }

    #[tokio::test]
    async fn test_blank_chunks_leave_single_pass() {
        let generator = ScriptedGenerator::new(0);
        let summarizer = Summarizer::new(Some(generator.clone()), settings());
        let summary = summarizer
            .summarize(&chunks(&["", "Only real text here.", "  "]), &request())
            .await
            .unwrap();

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].system, SINGLE_PASS_SYSTEM_PROMPT);
        assert_eq!(summary.chunks, 1);
    }

    #[tokio::test]
    async fn test_chunk_failure_is_retried_once() {
        let generator = ScriptedGenerator::new(1);
        let summarizer = Summarizer::new(Some(generator.clone()), settings());
        let summary = summarizer
            .summarize(&chunks(&["a part.", "b part."]), &request())
            .await
            .unwrap();

        // failed map call, its retry, second map call, reduce
        assert_eq!(generator.prompts().len(), 4);
        assert!(summary.ai_generated);
    }

    #[tokio::test]
    async fn test_always_failing_service_falls_back_to_extractive() {
        let generator = ScriptedGenerator::new(usize::MAX);
        let summarizer = Summarizer::new(Some(generator.clone()), settings());
        let summary = summarizer
            .summarize(
                &chunks(&["Short one. A considerably longer sentence about caching.", "Tiny."]),
                &request(),
            )
            .await
            .unwrap();

        assert!(!summary.ai_generated);
        assert!(summary.model.is_none());
        assert!(!summary.text.is_empty());
        assert!(summary.text.contains("A considerably longer sentence about caching."));
        // first chunk tried twice, then the path is abandoned
        assert_eq!(generator.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_surfaces_when_fallback_disabled() {
        let generator = ScriptedGenerator::new(usize::MAX);
        let summarizer = Summarizer::new(
            Some(generator),
            SummarizerSettings {
                fallback_on_error: false,
                ..settings()
            },
        );
        let err = summarizer
            .summarize(&chunks(&["only chunk."]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerativeService(GenerationError::Timeout)));
    }

    #[tokio::test]
    async fn test_consolidation_failure_is_not_retried() {
        // two map calls succeed, the reduce call fails
        struct FailReduce(Mutex<usize>);

        #[async_trait]
        impl TextGenerator for FailReduce {
            async fn generate(&self, prompt: &Prompt) -> Result<String, GenerationError> {
                *self.0.lock().unwrap() += 1;
                if prompt.system == CONSOLIDATION_SYSTEM_PROMPT {
                    Err(GenerationError::Malformed)
                } else {
                    Ok("partial".to_string())
                }
            }

            fn model(&self) -> &str {
                "fail-reduce"
            }
        }

        let generator = Arc::new(FailReduce(Mutex::new(0)));
        let summarizer = Summarizer::new(
            Some(generator.clone()),
            SummarizerSettings {
                fallback_on_error: false,
                ..settings()
            },
        );
        let err = summarizer
            .summarize(&chunks(&["one.", "two."]), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::GenerativeService(GenerationError::Malformed)));
        assert_eq!(*generator.0.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_no_generator_uses_extractive() {
        let summarizer = Summarizer::new(None, settings());
        assert!(!summarizer.is_generative());
        let summary = summarizer
            .summarize(&chunks(&["Alpha beta gamma. Delta."]), &request())
            .await
            .unwrap();
        assert!(!summary.ai_generated);
        assert_eq!(summary.text, "Alpha beta gamma.\nDelta.");
    }

    #[test]
    fn test_extractive_picks_longest_in_document_order() {
        let text = "Short. This is the longest sentence of them all.\n\nMedium length one here. Tiny. Also medium sized.";
        assert_eq!(
            extractive_summary(text, 3),
            "This is the longest sentence of them all.\nMedium length one here.\nAlso medium sized."
        );
    }

    #[test]
    fn test_extractive_dedupes() {
        assert_eq!(extractive_summary("Same words. Same words. Other.", 2), "Same words.\nOther.");
    }

    #[test]
    fn test_partial_summary_tag() {
        let p = PartialSummary {
            index: 1,
            total: 3,
            text: " body ".to_string(),
        };
        assert_eq!(p.to_string(), "[Part 2/3]\nbody");
    }

    #[test]
    fn test_language_name_and_length() {
        assert_eq!(language_name("ja"), "Japanese");
        assert_eq!(language_name("en-US"), "English");
        assert_eq!(language_name("xx"), "xx");
        assert_eq!(length_guideline("ja", 300), "about 300 characters");
        assert_eq!(max_tokens(10), 256);
        assert_eq!(max_tokens(100_000), 4096);
    }
}
