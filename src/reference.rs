use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};

static BARE_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap());

/// URL matchers, tried in order; the first capture group is the video ID.
/// The ID must be followed by a separator or end of input so longer tokens are rejected.
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // youtube.com/watch?v=ID (v may appear anywhere in the query)
        r"^(?i:https?://)?(?i:(?:www|m|music)\.)?(?i:youtube\.com)/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]{11})(?:[&#]|$)",
        // youtu.be/ID
        r"^(?i:https?://)?(?i:www\.)?(?i:youtu\.be)/([A-Za-z0-9_-]{11})(?:[?&#/]|$)",
        // youtube.com/{embed,v,shorts,live}/ID
        r"^(?i:https?://)?(?i:(?:www|m|music)\.)?(?i:youtube(?:-nocookie)?\.com)/(?:embed|v|shorts|live)/([A-Za-z0-9_-]{11})(?:[?&#/]|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Canonical 11-character video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Accept an already-canonical ID; no URL parsing
    pub fn parse(id: &str) -> Option<Self> {
        BARE_ID.is_match(id).then(|| VideoId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the canonical video ID from a bare ID or any supported YouTube URL shape
pub fn resolve(input: &str) -> Result<VideoId> {
    let input = input.trim();

    if let Some(id) = VideoId::parse(input) {
        return Ok(id);
    }

    URL_PATTERNS
        .iter()
        .find_map(|re| re.captures(input))
        .map(|caps| VideoId(caps[1].to_string()))
        .ok_or_else(|| Error::InvalidReference(input.to_string()))
}
