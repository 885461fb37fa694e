use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AdcaseError;

pub const SCHEMA_VERSION: u32 = 1;
pub const UNTITLED: &str = "Untitled Spot";
pub const UNKNOWN_CHANNEL: &str = "Unknown Channel";
pub const INFERRED_MARKER: &str = "(inferred)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub url: String,
    pub id: String,
    pub title: String,
    pub channel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Captions,
    Pasted,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub source: TranscriptSource,
}

impl Transcript {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(|s| s.text.trim().is_empty())
    }

    /// All segment text joined with single spaces
    pub fn plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// One still sampled from the video itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSample {
    /// `MM:SS` offset into the video
    pub time: String,
    /// `data:image/jpeg;base64,...`
    pub image_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub thumbnail_urls: Vec<String>,
    pub frames: Vec<FrameSample>,
    pub trade_snippets: Vec<String>,
    /// Source URL of each entry in `trade_snippets`, index for index
    pub trade_citations: Vec<String>,
}

impl EvidenceBundle {
    pub fn is_empty(&self) -> bool {
        self.thumbnail_urls.is_empty() && self.frames.is_empty() && self.trade_snippets.is_empty()
    }

    /// Everything attached to the first draft as images, thumbnails first
    pub fn image_urls(&self) -> Vec<String> {
        self.thumbnail_urls
            .iter()
            .cloned()
            .chain(self.frames.iter().map(|f| f.image_url.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Naming {
    pub agency: String,
    pub product: String,
    pub campaign: String,
    pub commercial: String,
    pub director: String,
}

impl Naming {
    /// Field-by-field merge where non-empty values in `overrides` win
    pub fn overridden_by(&self, overrides: &Naming) -> Naming {
        let pick = |base: &String, over: &String| {
            if over.trim().is_empty() {
                base.clone()
            } else {
                over.trim().to_string()
            }
        };
        Naming {
            agency: pick(&self.agency, &overrides.agency),
            product: pick(&self.product, &overrides.product),
            campaign: pick(&self.campaign, &overrides.campaign),
            commercial: pick(&self.commercial, &overrides.commercial),
            director: pick(&self.director, &overrides.director),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brand {
    pub advertiser: String,
    pub product: String,
    pub tagline: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scene {
    pub time: String,
    pub action: String,
    pub inferred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptLine {
    pub time: String,
    pub speaker: String,
    pub line: String,
    pub annotation: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strategy {
    pub objective: String,
    pub audience: String,
    pub insight: String,
    pub execution: String,
    pub why_it_works: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Citation {
    pub url: String,
    pub note: String,
}

/// Structured ad case study, schema version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseStudy {
    pub schema_version: u32,
    pub title: String,
    pub channel: String,
    pub video_id: String,
    pub url: String,
    pub summary: String,
    pub brand: Brand,
    pub naming: Naming,
    pub scenes: Vec<Scene>,
    pub script: Vec<ScriptLine>,
    pub strategy: Strategy,
    pub citations: Vec<Citation>,
    pub degraded: bool,
}

impl Default for CaseStudy {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            title: String::new(),
            channel: String::new(),
            video_id: String::new(),
            url: String::new(),
            summary: String::new(),
            brand: Brand::default(),
            naming: Naming::default(),
            scenes: Vec::new(),
            script: Vec::new(),
            strategy: Strategy::default(),
            citations: Vec::new(),
            degraded: false,
        }
    }
}

impl CaseStudy {
    /// Overwrite identity fields with what the fetchers resolved; the model
    /// is never the source of truth for them.
    pub fn stamp_video(&mut self, video: &VideoRef) {
        self.schema_version = SCHEMA_VERSION;
        self.title = video.title.clone();
        self.channel = video.channel.clone();
        self.video_id = video.id.clone();
        self.url = video.url.clone();
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pdf,
    Json,
    Text,
    Html,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Json => "json",
            OutputFormat::Text => "txt",
            OutputFormat::Html => "html",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AdcaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "json" => Ok(OutputFormat::Json),
            "text" | "txt" => Ok(OutputFormat::Text),
            "html" => Ok(OutputFormat::Html),
            other => Err(AdcaseError::Config {
                reason: format!("unknown output format {other:?}"),
            }),
        }
    }
}

/// Which shape the model is asked to answer in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Json,
    Html,
}

impl FromStr for GenerationMode {
    type Err = AdcaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" | "structured" => Ok(GenerationMode::Json),
            "html" => Ok(GenerationMode::Html),
            other => Err(AdcaseError::Config {
                reason: format!("unknown generation mode {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CaseStudy {
        CaseStudy {
            title: "Dream Crazy".into(),
            channel: "Nike".into(),
            video_id: "WW2yKSt2C_A".into(),
            url: "https://www.youtube.com/watch?v=WW2yKSt2C_A".into(),
            summary: "An anthem spot.".into(),
            brand: Brand {
                advertiser: "Nike".into(),
                product: "Brand".into(),
                tagline: "Just Do It".into(),
            },
            naming: Naming {
                agency: "Wieden+Kennedy".into(),
                campaign: "Just Do It 30th".into(),
                ..Naming::default()
            },
            scenes: vec![Scene {
                time: "00:03".into(),
                action: "Skateboarder falls down stairs (inferred)".into(),
                inferred: true,
            }],
            script: vec![ScriptLine {
                time: "00:04".into(),
                speaker: "VO".into(),
                line: "If people say your dreams are crazy".into(),
                annotation: "Opens on a challenge".into(),
            }],
            strategy: Strategy {
                objective: "Reassert brand values".into(),
                ..Strategy::default()
            },
            citations: vec![Citation {
                url: "https://www.adweek.com/x".into(),
                note: "launch coverage".into(),
            }],
            ..CaseStudy::default()
        }
    }

    #[test]
    fn case_study_survives_json_round_trip() {
        let study = sample();
        let json = serde_json::to_string_pretty(&study).unwrap();
        let back: CaseStudy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, study);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let study: CaseStudy = serde_json::from_str(r#"{"summary":"x"}"#).unwrap();
        assert_eq!(study.schema_version, SCHEMA_VERSION);
        assert!(study.scenes.is_empty());
        assert_eq!(study.summary, "x");
    }

    #[test]
    fn naming_overrides_win_field_by_field() {
        let model = Naming {
            agency: "Droga5".into(),
            product: "Coffee".into(),
            ..Naming::default()
        };
        let form = Naming {
            product: "  Cold Brew ".into(),
            director: "Spike".into(),
            ..Naming::default()
        };
        let merged = model.overridden_by(&form);
        assert_eq!(merged.agency, "Droga5");
        assert_eq!(merged.product, "Cold Brew");
        assert_eq!(merged.director, "Spike");
        assert!(merged.campaign.is_empty());
    }

    #[test]
    fn transcript_plain_text_skips_blank_segments() {
        let transcript = Transcript {
            segments: vec![
                TranscriptSegment {
                    start: 0.0,
                    text: " Hello ".into(),
                },
                TranscriptSegment {
                    start: 1.0,
                    text: "  ".into(),
                },
                TranscriptSegment {
                    start: 2.0,
                    text: "world".into(),
                },
            ],
            source: TranscriptSource::Pasted,
        };
        assert_eq!(transcript.plain_text(), "Hello world");
        assert!(!transcript.is_empty());
        assert!(Transcript::empty().is_empty());
    }
}
