use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::cache::ResponseCache;
use crate::{Segment, VideoId};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// How long a player response is reused across the language fallback chain
const PLAYER_TTL: Duration = Duration::from_secs(120);
const PLAYER_CACHE_CAPACITY: usize = 256;

/// Outcome of a single caption retrieval call that did not produce a track
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptionError {
    #[error("no caption track for language {lang}")]
    NotFound { lang: String },

    #[error("captions are disabled for this video")]
    Disabled,

    #[error("video is not playable: {reason}")]
    Unplayable { reason: String },

    #[error("caption source transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for CaptionError {
    fn from(e: reqwest::Error) -> Self {
        CaptionError::Transport(e.to_string())
    }
}

/// One caption track as returned by the caption source
#[derive(Debug, Clone)]
pub struct CaptionTrack {
    pub language: String,
    pub title: Option<String>,
    pub channel: Option<String>,
    pub segments: Vec<Segment>,
}

/// External service providing timestamped caption segments
#[async_trait]
pub trait CaptionSource: Send + Sync {
    /// Retrieve the track for exactly one language
    async fn fetch(&self, video_id: &VideoId, lang: &str) -> Result<CaptionTrack, CaptionError>;

    /// Language codes of the listed tracks, manually created tracks first
    async fn available_languages(&self, video_id: &VideoId) -> Result<Vec<String>, CaptionError>;
}

#[derive(Debug, Deserialize)]
struct InnerTubePlayerResponse {
    #[serde(rename = "playabilityStatus")]
    playability_status: Option<PlayabilityStatus>,
    captions: Option<CaptionsData>,
    #[serde(rename = "videoDetails")]
    video_details: Option<VideoDetails>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoDetails {
    title: Option<String>,
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<TrackInfo>>,
}

#[derive(Debug, Clone, Deserialize)]
struct TrackInfo {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    kind: Option<String>,
}

impl TrackInfo {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Player metadata for one video; `tracks` is `None` when captions are disabled
#[derive(Debug)]
struct PlayerInfo {
    title: Option<String>,
    channel: Option<String>,
    tracks: Option<Vec<TrackInfo>>,
}

impl PlayerInfo {
    fn tracks(&self) -> Result<&[TrackInfo], CaptionError> {
        match self.tracks.as_deref() {
            Some(tracks) if !tracks.is_empty() => Ok(tracks),
            _ => Err(CaptionError::Disabled),
        }
    }
}

/// Caption source backed by YouTube's InnerTube player API
pub struct InnerTubeSource {
    client: reqwest::Client,
    players: ResponseCache<Arc<PlayerInfo>>,
}

impl InnerTubeSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            players: ResponseCache::new(PLAYER_TTL, PLAYER_CACHE_CAPACITY),
        }
    }

    async fn player(&self, video_id: &VideoId) -> Result<Arc<PlayerInfo>, CaptionError> {
        if let Some(info) = self.players.get(video_id.as_str()) {
            return Ok(info);
        }
        let info = Arc::new(self.fetch_player(video_id).await?);
        self.players.insert(video_id.to_string(), Arc::clone(&info));
        Ok(info)
    }

    async fn fetch_player(&self, video_id: &VideoId) -> Result<PlayerInfo, CaptionError> {
        // Step 1: Fetch the watch page to get the InnerTube API key
        let watch_url = video_id.watch_url();
        debug!("Fetching watch page: {watch_url}");

        let page_html = self
            .client
            .get(&watch_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let api_key = extract_api_key(&page_html)?;
        debug!("Extracted InnerTube API key: {api_key}");

        // Step 2: Call InnerTube player endpoint
        let player_url = format!("https://www.youtube.com/youtubei/v1/player?key={api_key}&prettyPrint=false");

        let body = serde_json::json!({
            "context": {
                "client": {
                    "hl": "en",
                    "gl": "US",
                    "clientName": "WEB",
                    "clientVersion": "2.20241126.01.00"
                }
            },
            "videoId": video_id.as_str()
        });

        let resp: InnerTubePlayerResponse = self
            .client
            .post(&player_url)
            .header("User-Agent", USER_AGENT)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        player_info(resp)
    }
}

fn player_info(resp: InnerTubePlayerResponse) -> Result<PlayerInfo, CaptionError> {
    let tracks = resp
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .and_then(|r| r.caption_tracks);

    // A non-playable video only matters when it also hides its captions
    if tracks.is_none()
        && let Some(status) = resp.playability_status
        && status.status.as_deref().is_some_and(|s| s != "OK")
    {
        return Err(CaptionError::Unplayable {
            reason: status.reason.unwrap_or_else(|| status.status.unwrap_or_default()),
        });
    }

    let (title, channel) = resp
        .video_details
        .map(|vd| (vd.title, vd.author))
        .unwrap_or_default();

    Ok(PlayerInfo { title, channel, tracks })
}

#[async_trait]
impl CaptionSource for InnerTubeSource {
    async fn fetch(&self, video_id: &VideoId, lang: &str) -> Result<CaptionTrack, CaptionError> {
        let player = self.player(video_id).await?;
        let tracks = player.tracks()?;

        let track = select_track(tracks, lang).ok_or_else(|| CaptionError::NotFound {
            lang: lang.to_string(),
        })?;
        debug!(
            "Using caption track: lang={} generated={}",
            track.language_code,
            track.is_generated()
        );

        // Step 3: Fetch the caption XML
        let caption_xml = self
            .client
            .get(&track.base_url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let segments = parse_caption_xml(&caption_xml)?;
        if segments.is_empty() {
            return Err(CaptionError::NotFound {
                lang: lang.to_string(),
            });
        }

        Ok(CaptionTrack {
            language: track.language_code.clone(),
            title: player.title.clone(),
            channel: player.channel.clone(),
            segments,
        })
    }

    async fn available_languages(&self, video_id: &VideoId) -> Result<Vec<String>, CaptionError> {
        let player = self.player(video_id).await?;
        Ok(listed_languages(player.tracks()?))
    }
}

/// Pick the best track for a language: exact code before primary-subtag match, manual before generated
fn select_track<'a>(tracks: &'a [TrackInfo], lang: &str) -> Option<&'a TrackInfo> {
    let lang = lang.to_ascii_lowercase();
    tracks
        .iter()
        .filter_map(|t| {
            let code = t.language_code.to_ascii_lowercase();
            let primary = code.split(['-', '_']).next().unwrap_or_default();
            let rank = if code == lang {
                0
            } else if primary == lang {
                2
            } else {
                return None;
            };
            Some((rank + u8::from(t.is_generated()), t))
        })
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, t)| t)
}

fn listed_languages(tracks: &[TrackInfo]) -> Vec<String> {
    let mut ordered: Vec<&TrackInfo> = tracks.iter().collect();
    ordered.sort_by_key(|t| t.is_generated());
    let mut langs: Vec<String> = Vec::new();
    for t in ordered {
        if !langs.contains(&t.language_code) {
            langs.push(t.language_code.clone());
        }
    }
    langs
}

fn extract_api_key(html: &str) -> Result<String, CaptionError> {
    let patterns = [
        r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#,
        // Fallback: try the newer pattern
        r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#,
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).map_err(|e| CaptionError::Transport(e.to_string()))?;
        if let Some(caps) = re.captures(html) {
            return Ok(caps[1].to_string());
        }
    }

    Err(CaptionError::Transport(
        "could not extract InnerTube API key from watch page".to_string(),
    ))
}

fn parse_caption_xml(xml: &str) -> Result<Vec<Segment>, CaptionError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    let mut current_start: Option<f64> = None;
    let mut current_dur: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                let mut start = None;
                let mut dur = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"start" => {
                            start = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        b"dur" => {
                            dur = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        _ => {}
                    }
                }
                current_start = start;
                // Some tracks omit dur on the final cue
                current_dur = dur.or(Some(0.0));
            }
            Ok(Event::Empty(_)) => {
                // Self-closing <text .../> has no content
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(start), Some(dur)) = (current_start.take(), current_dur.take()) {
                    let raw_text = e.unescape().unwrap_or_default().to_string();
                    let text = html_escape::decode_html_entities(&raw_text).to_string();
                    if !text.trim().is_empty() {
                        segments.push(Segment {
                            text,
                            start,
                            duration: dur.max(0.0),
                        });
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CaptionError::Transport(format!("error parsing caption XML: {e}"))),
            _ => {}
        }
    }

    Ok(segments)
}
