use serde::{Deserialize, Serialize};

use crate::Transcript;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Srt,
}

pub fn render(format: OutputFormat, transcript: &Transcript) -> String {
    match format {
        OutputFormat::Text => render_text(transcript),
        OutputFormat::Json => render_json(transcript),
        OutputFormat::Srt => render_srt(transcript),
    }
}

/// Render transcript as plain text (one segment per line, no timestamps)
pub fn render_text(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render transcript as pretty-printed JSON
pub fn render_json(transcript: &Transcript) -> String {
    // Transcript has only string, number and list fields, so serialization cannot fail
    serde_json::to_string_pretty(transcript).unwrap_or_default()
}

/// Render transcript as SubRip cues
pub fn render_srt(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                srt_timestamp(s.start),
                srt_timestamp(s.start + s.duration),
                s.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (hours, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (minutes, rem) = (rem / 60_000, rem % 60_000);
    let (secs, ms) = (rem / 1000, rem % 1000);
    format!("{hours:02}:{minutes:02}:{secs:02},{ms:03}")
}
