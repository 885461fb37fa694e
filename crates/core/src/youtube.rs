use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;
use yt_transcript_rs::api::YouTubeTranscriptApi;

use crate::{
    config::Config,
    error::{AdcaseError, Result},
    format::parse_timestamp,
    types::{
        Transcript, TranscriptSegment, TranscriptSource, UNKNOWN_CHANNEL, UNTITLED, VideoMeta,
        VideoRef,
    },
};

pub const UNKNOWN_VIDEO_ID: &str = "unknown";
const MAX_VIDEO_ID_LEN: usize = 64;

static PASTED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[?(\d{1,2}(?::\d{1,2}){1,2}(?:\.\d{1,3})?)\]?\s*(?:[-–—|:]\s*)?(.*)$")
        .expect("pasted transcript pattern is valid")
});

/// Upstream access for video metadata and captions.
///
/// Implementations report failures; callers in this module turn them into
/// placeholders so no fetch error ever reaches the request handler.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn metadata(&self, video: &VideoRef) -> Result<VideoMeta>;
    async fn transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>>;
}

/// oEmbed for metadata, the YouTube transcript API for captions
pub struct YouTubeSource {
    client: reqwest::Client,
    oembed_url: String,
    languages: Vec<String>,
}

impl YouTubeSource {
    pub fn new(config: &Config, client: reqwest::Client) -> Self {
        Self {
            client,
            oembed_url: config.oembed_url.clone(),
            languages: config.transcript_languages.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OEmbed {
    #[serde(default)]
    title: String,
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    thumbnail_url: String,
}

#[async_trait]
impl VideoSource for YouTubeSource {
    async fn metadata(&self, video: &VideoRef) -> Result<VideoMeta> {
        debug!(oembed = %self.oembed_url, video_id = %video.id, "Fetching oEmbed metadata");
        let oembed = self
            .client
            .get(&self.oembed_url)
            .query(&[("url", video.watch_url().as_str()), ("format", "json")])
            .send()
            .await?
            .error_for_status()?
            .json::<OEmbed>()
            .await?;

        Ok(VideoMeta {
            title: oembed.title.trim().to_string(),
            author: oembed.author_name.trim().to_string(),
            thumbnail_url: oembed.thumbnail_url,
        })
    }

    async fn transcript(&self, video_id: &str) -> Result<Vec<TranscriptSegment>> {
        let api = YouTubeTranscriptApi::new(None, None, None).map_err(|e| {
            AdcaseError::Upstream {
                service: "transcript api",
                reason: format!("{e:?}"),
            }
        })?;
        let languages: Vec<&str> = self.languages.iter().map(String::as_str).collect();

        let transcript = api
            .fetch_transcript(video_id, &languages, false)
            .await
            .map_err(|e| AdcaseError::Upstream {
                service: "transcript api",
                reason: e.to_string(),
            })?;

        Ok(transcript
            .snippets
            .into_iter()
            .map(|snippet| TranscriptSegment {
                start: snippet.start,
                text: snippet.text,
            })
            .collect())
    }
}

impl VideoRef {
    /// Resolve the id from user input. Only blank input is rejected; anything
    /// else yields a ref, with the id `unknown` when none can be derived.
    pub fn parse(input: &str) -> Result<Self> {
        let url = input.trim();
        if url.is_empty() {
            return Err(AdcaseError::InvalidUrl {
                input: input.to_string(),
            });
        }

        let id = extract_video_id(url).unwrap_or_else(|| UNKNOWN_VIDEO_ID.to_string());
        Ok(Self {
            url: url.to_string(),
            id,
            title: String::new(),
            channel: String::new(),
        })
    }

    pub fn has_known_id(&self) -> bool {
        self.id != UNKNOWN_VIDEO_ID
    }

    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }

    /// Fill title/channel, falling back to the placeholders
    pub fn with_meta(mut self, meta: &VideoMeta) -> Self {
        self.title = non_empty_or(&meta.title, UNTITLED);
        self.channel = non_empty_or(&meta.author, UNKNOWN_CHANNEL);
        self
    }
}

fn non_empty_or(value: &str, placeholder: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

/// Extract a video id from watch, short, embed, shorts and live URLs, or a bare id
pub fn extract_video_id(input: &str) -> Option<String> {
    let input = input.trim();

    let parsed = Url::parse(input).ok().or_else(|| {
        if input.contains('/') || input.contains('.') {
            Url::parse(&format!("https://{input}")).ok()
        } else {
            None
        }
    });

    let Some(url) = parsed else {
        return sanitize_video_id(input);
    };

    let host = url.host_str()?.to_ascii_lowercase();
    let host = host
        .trim_start_matches("www.")
        .trim_start_matches("m.")
        .trim_start_matches("music.");
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let raw = if host == "youtu.be" {
        segments.next()?.to_string()
    } else if is_host_or_subdomain(host, "youtube.com")
        || is_host_or_subdomain(host, "youtube-nocookie.com")
    {
        if let Some((_, v)) = url.query_pairs().find(|(k, _)| k == "v") {
            v.into_owned()
        } else {
            match segments.next()? {
                "embed" | "shorts" | "live" | "v" => segments.next()?.to_string(),
                _ => return None,
            }
        }
    } else {
        return None;
    };

    sanitize_video_id(&raw)
}

fn is_host_or_subdomain(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Only ASCII alphanumerics plus `-` and `_`, since the id ends up in paths and URLs
pub fn sanitize_video_id(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_VIDEO_ID_LEN {
        return None;
    }
    trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .then(|| trimmed.to_string())
}

/// Parse user-pasted transcript text. Lines may start with a timestamp
/// (`0:05`, `[00:05]`, `1:02:03 -`); untimed lines inherit the previous start.
pub fn parse_pasted_transcript(text: &str) -> Vec<TranscriptSegment> {
    let mut current = 0.0;
    let mut segments = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let body = match PASTED_LINE.captures(line) {
            Some(caps) => match parse_timestamp(&caps[1]) {
                Some(start) => {
                    current = start;
                    caps[2].trim().to_string()
                }
                None => line.to_string(),
            },
            None => line.to_string(),
        };

        if !body.is_empty() {
            segments.push(TranscriptSegment {
                start: current,
                text: body,
            });
        }
    }

    segments
}

/// Resolve the video ref and its metadata. Metadata failures degrade to
/// placeholders; only blank input is an error.
pub async fn resolve_video(source: &dyn VideoSource, input: &str) -> Result<VideoRef> {
    let video = VideoRef::parse(input)?;
    if !video.has_known_id() {
        warn!(input = %video.url, "Could not derive a video id; using placeholders");
        return Ok(video.with_meta(&VideoMeta::default()));
    }

    let meta = match source.metadata(&video).await {
        Ok(meta) => meta,
        Err(e) => {
            warn!(video_id = %video.id, error = %e, "Metadata fetch failed; using placeholders");
            VideoMeta::default()
        }
    };
    let video = video.with_meta(&meta);
    info!(video_id = %video.id, title = %video.title, channel = %video.channel, "Resolved video");
    Ok(video)
}

/// Pasted text wins; otherwise captions are fetched. Never fails.
pub async fn load_transcript(
    source: &dyn VideoSource,
    video: &VideoRef,
    pasted: Option<&str>,
) -> Transcript {
    if let Some(text) = pasted.filter(|t| !t.trim().is_empty()) {
        let segments = parse_pasted_transcript(text);
        info!(segments = segments.len(), "Using pasted transcript");
        return Transcript {
            segments,
            source: TranscriptSource::Pasted,
        };
    }

    if !video.has_known_id() {
        return Transcript::empty();
    }

    match source.transcript(&video.id).await {
        Ok(segments) if !segments.is_empty() => {
            info!(video_id = %video.id, segments = segments.len(), "Fetched captions");
            Transcript {
                segments,
                source: TranscriptSource::Captions,
            }
        }
        Ok(_) => {
            warn!(video_id = %video.id, "Caption track is empty");
            Transcript::empty()
        }
        Err(e) => {
            warn!(
                video_id = %video.id,
                error = %e,
                "Transcript fetch failed; continuing without one"
            );
            Transcript::empty()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::provider::Provider;

    struct FailingSource;

    #[async_trait]
    impl VideoSource for FailingSource {
        async fn metadata(&self, _video: &VideoRef) -> Result<VideoMeta> {
            Err(AdcaseError::Upstream {
                service: "oembed",
                reason: "offline".into(),
            })
        }

        async fn transcript(&self, _video_id: &str) -> Result<Vec<TranscriptSegment>> {
            Err(AdcaseError::Upstream {
                service: "transcript api",
                reason: "offline".into(),
            })
        }
    }

    #[test]
    fn extracts_ids_from_common_url_shapes() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=4", "dQw4w9WgXcQ"),
            ("https://youtu.be/abc123", "abc123"),
            ("youtu.be/abc123?si=xyz", "abc123"),
            ("https://m.youtube.com/shorts/Sh0rt_-1", "Sh0rt_-1"),
            ("https://www.youtube.com/embed/EmBeD12345", "EmBeD12345"),
            ("https://www.youtube-nocookie.com/embed/nocookie1", "nocookie1"),
            ("dQw4w9WgXcQ", "dQw4w9WgXcQ"),
        ];
        for (input, expected) in cases {
            assert_eq!(extract_video_id(input).as_deref(), Some(expected), "{input}");
        }
    }

    #[test]
    fn rejects_foreign_and_unsafe_inputs() {
        assert_eq!(extract_video_id("https://vimeo.com/12345"), None);
        assert_eq!(extract_video_id("https://www.youtube.com/feed/trending"), None);
        assert_eq!(extract_video_id("https://youtu.be/"), None);
        assert_eq!(extract_video_id("not a url at all"), None);
        assert_eq!(sanitize_video_id("../etc/passwd"), None);
    }

    #[test]
    fn lookalike_hosts_are_not_youtube() {
        assert_eq!(extract_video_id("https://notyoutube.com/watch?v=abc123"), None);
        assert_eq!(extract_video_id("https://evil-youtube.com/embed/abc123"), None);
        assert_eq!(extract_video_id("https://fakeyoutube-nocookie.com/embed/abc123"), None);
        assert_eq!(
            extract_video_id("https://www.youtube-nocookie.com/embed/abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_video_id("https://music.youtube.com/watch?v=abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn blank_input_is_the_only_parse_error() {
        assert!(matches!(
            VideoRef::parse("   "),
            Err(AdcaseError::InvalidUrl { .. })
        ));
        let video = VideoRef::parse("definitely not youtube").unwrap();
        assert_eq!(video.id, UNKNOWN_VIDEO_ID);
    }

    #[test]
    fn pasted_transcript_keeps_timestamps() {
        let segments = parse_pasted_transcript(
            "0:00 Open on a kitchen\n[00:05] - Hello world\n\nstill talking\n1:02:03 | Fin",
        );
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].start, 0.0);
        assert_eq!(segments[1].start, 5.0);
        assert_eq!(segments[1].text, "Hello world");
        assert_eq!(segments[2].start, 5.0);
        assert_eq!(segments[2].text, "still talking");
        assert_eq!(segments[3].start, 3723.0);
        assert_eq!(segments[3].text, "Fin");
    }

    #[test]
    fn pasted_transcript_leaves_plain_numbers_alone() {
        let segments = parse_pasted_transcript("12 people said yes");
        assert_eq!(segments[0].text, "12 people said yes");
        assert_eq!(segments[0].start, 0.0);
    }

    #[tokio::test]
    async fn unreachable_metadata_degrades_to_placeholders() {
        let video = resolve_video(&FailingSource, "https://youtu.be/abc123")
            .await
            .unwrap();
        assert_eq!(video.id, "abc123");
        assert_eq!(video.title, UNTITLED);
        assert_eq!(video.channel, UNKNOWN_CHANNEL);

        let transcript = load_transcript(&FailingSource, &video, None).await;
        assert!(transcript.is_empty());
        assert_eq!(transcript.source, TranscriptSource::None);
    }

    #[tokio::test]
    async fn pasted_text_wins_over_captions() {
        let video = VideoRef::parse("https://youtu.be/abc123").unwrap();
        let transcript = load_transcript(&FailingSource, &video, Some("0:05 Hello world")).await;
        assert_eq!(transcript.source, TranscriptSource::Pasted);
        assert_eq!(transcript.plain_text(), "Hello world");
    }

    #[tokio::test]
    async fn oembed_connection_failure_is_reported_not_panicked() {
        let mut config = Config::new(Provider::Openai, "test");
        // Port 9 (discard) is closed on test machines.
        config.oembed_url = "http://127.0.0.1:9/oembed".into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let source = YouTubeSource::new(&config, client);

        let video = VideoRef::parse("https://youtu.be/abc123").unwrap();
        assert!(source.metadata(&video).await.is_err());

        let resolved = resolve_video(&source, "https://youtu.be/abc123").await.unwrap();
        assert_eq!(resolved.title, UNTITLED);
    }
}
