use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::{
    error::{AdcaseError, Result},
    provider::Provider,
    types::OutputFormat,
};

pub const DEFAULT_OEMBED_URL: &str = "https://www.youtube.com/oembed";
pub const DEFAULT_TAVILY_URL: &str = "https://api.tavily.com/search";
pub const DEFAULT_SERPAPI_URL: &str = "https://serpapi.com/search.json";

/// Runtime settings shared by every pipeline stage.
///
/// Built once at startup and handed to components by reference; nothing in the
/// crate reads the environment after this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub fallback_model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,

    pub max_repair_passes: u32,
    pub min_scenes: usize,
    pub min_script_lines: usize,

    pub out_dir: PathBuf,
    pub output_format: OutputFormat,
    pub keep_json_sidecar: bool,
    pub pdf_renderer: String,
    pub render_timeout: Duration,

    pub http_timeout: Duration,
    pub oembed_url: String,
    pub transcript_languages: Vec<String>,

    pub tavily_api_key: Option<String>,
    pub serpapi_api_key: Option<String>,
    pub reader_proxy_url: Option<String>,
    pub tavily_url: String,
    pub serpapi_url: String,
    pub max_thumbnails: usize,
    pub max_snippets: usize,
    pub snippet_chars: usize,

    /// Download the video and sample frames (plus OCR) as extra evidence
    pub frame_sampling: bool,
    pub ytdlp_bin: String,
    pub ffmpeg_bin: String,
    pub tesseract_bin: String,
    pub frame_interval_secs: u32,
    pub max_frames: usize,
    pub frame_timeout: Duration,
}

impl Config {
    /// Defaults for everything except the provider credentials
    pub fn new(provider: Provider, api_key: impl Into<String>) -> Self {
        let provider_config = provider.config();
        Self {
            api_url: provider_config.api_url.to_string(),
            model: provider_config.model.to_string(),
            provider,
            api_key: api_key.into(),
            fallback_model: None,
            temperature: 0.3,
            max_tokens: 4000,
            max_repair_passes: 2,
            min_scenes: 3,
            min_script_lines: 3,
            out_dir: default_out_dir(),
            output_format: OutputFormat::Pdf,
            keep_json_sidecar: true,
            pdf_renderer: "wkhtmltopdf".to_string(),
            render_timeout: Duration::from_secs(60),
            http_timeout: Duration::from_secs(15),
            oembed_url: DEFAULT_OEMBED_URL.to_string(),
            transcript_languages: vec!["en".to_string()],
            tavily_api_key: None,
            serpapi_api_key: None,
            reader_proxy_url: None,
            tavily_url: DEFAULT_TAVILY_URL.to_string(),
            serpapi_url: DEFAULT_SERPAPI_URL.to_string(),
            max_thumbnails: 4,
            max_snippets: 5,
            snippet_chars: 600,
            frame_sampling: false,
            ytdlp_bin: "yt-dlp".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            tesseract_bin: "tesseract".to_string(),
            frame_interval_secs: 3,
            max_frames: 8,
            frame_timeout: Duration::from_secs(180),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("LLM_PROVIDER") {
            Some(name) => name.parse::<Provider>()?,
            None => Provider::default(),
        };
        let env_var = provider.config().env_var;
        let api_key = get(env_var).ok_or_else(|| AdcaseError::MissingApiKey {
            env_var: env_var.to_string(),
        })?;

        let mut config = Self::new(provider, api_key);

        if let Some(url) = get("LLM_API_URL") {
            config.api_url = url;
        }
        if let Some(model) = get("LLM_MODEL") {
            config.model = model;
        }
        config.fallback_model = get("LLM_FALLBACK_MODEL");
        if let Some(v) = get("LLM_TEMPERATURE") {
            config.temperature = parse_value("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("LLM_MAX_TOKENS") {
            config.max_tokens = parse_value("LLM_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("MAX_REPAIR_PASSES") {
            config.max_repair_passes = parse_value("MAX_REPAIR_PASSES", &v)?;
        }
        if let Some(v) = get("MIN_SCENES") {
            config.min_scenes = parse_value("MIN_SCENES", &v)?;
        }
        if let Some(v) = get("MIN_SCRIPT_LINES") {
            config.min_script_lines = parse_value("MIN_SCRIPT_LINES", &v)?;
        }
        if let Some(dir) = get("OUT_DIR") {
            config.out_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("OUTPUT_FORMAT") {
            config.output_format = v.parse()?;
        }
        if let Some(v) = get("KEEP_JSON_SIDECAR") {
            config.keep_json_sidecar = parse_flag("KEEP_JSON_SIDECAR", &v)?;
        }
        if let Some(renderer) = get("PDF_RENDERER") {
            config.pdf_renderer = renderer;
        }
        if let Some(v) = get("RENDER_TIMEOUT_SECS") {
            config.render_timeout = Duration::from_secs(parse_value("RENDER_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_value("HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(url) = get("OEMBED_URL") {
            config.oembed_url = url;
        }
        if let Some(langs) = get("TRANSCRIPT_LANGUAGES") {
            config.transcript_languages = langs
                .split(',')
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty())
                .collect();
        }
        config.tavily_api_key = get("TAVILY_API_KEY");
        config.serpapi_api_key = get("SERPAPI_API_KEY");
        config.reader_proxy_url = get("READER_PROXY_URL");
        if let Some(url) = get("TAVILY_API_URL") {
            config.tavily_url = url;
        }
        if let Some(url) = get("SERPAPI_API_URL") {
            config.serpapi_url = url;
        }

        if let Some(v) = get("FRAME_SAMPLING") {
            config.frame_sampling = parse_flag("FRAME_SAMPLING", &v)?;
        }
        if let Some(bin) = get("YTDLP_BIN") {
            config.ytdlp_bin = bin;
        }
        if let Some(bin) = get("FFMPEG_BIN") {
            config.ffmpeg_bin = bin;
        }
        if let Some(bin) = get("TESSERACT_BIN") {
            config.tesseract_bin = bin;
        }
        if let Some(v) = get("FRAME_INTERVAL_SECS") {
            config.frame_interval_secs = parse_value("FRAME_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = get("MAX_FRAMES") {
            config.max_frames = parse_value("MAX_FRAMES", &v)?;
        }
        if let Some(v) = get("FRAME_TIMEOUT_SECS") {
            config.frame_timeout = Duration::from_secs(parse_value("FRAME_TIMEOUT_SECS", &v)?);
        }

        Ok(config)
    }
}

pub fn default_out_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("adcase")
        .join("out")
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| AdcaseError::Config {
        reason: format!("{key} has an invalid value {value:?}"),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AdcaseError::Config {
            reason: format!("{key} must be a boolean, got {value:?}"),
        }),
    }
}
