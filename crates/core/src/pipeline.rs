use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::Result,
    evidence::EvidenceGatherer,
    fallback::minimal_case_study,
    frames::FrameSampler,
    llm::{ChatModel, ChatRequest, HttpChatModel},
    naming::build_filename_stem,
    prompt::{HTML_SYSTEM_PROMPT, build_html_user_payload},
    render::{render_html, render_html_fragment, render_json, render_pdf, render_text},
    repair::{GenerationInput, RepairSettings, generate_case_study},
    types::{
        CaseStudy, EvidenceBundle, GenerationMode, Naming, OutputFormat, Transcript, VideoRef,
    },
    validate::Limits,
    youtube::{VideoSource, YouTubeSource, load_transcript, resolve_video},
};

pub const ERROR_LOG: &str = "errors.log";

/// One generation request, from the web form or the CLI
#[derive(Debug, Clone, Default)]
pub struct JobRequest {
    pub url: String,
    /// Pasted transcript; wins over fetched captions when non-blank
    pub transcript: Option<String>,
    /// Extra verbatim text (on-screen supers, lyrics) script lines may quote
    pub hints: Option<String>,
    pub naming: Naming,
    /// `None` uses the configured default
    pub format: Option<OutputFormat>,
    pub mode: GenerationMode,
}

#[derive(Debug, Clone)]
pub struct JobOutput {
    /// File name (inside `out_dir`) of the requested document
    pub primary: String,
    /// Every file written, primary first
    pub files: Vec<String>,
    pub study: CaseStudy,
    pub repair_passes: u32,
    pub degraded: bool,
}

/// Fetch, generate, validate and render one case study.
///
/// Shared across requests behind an `Arc`; holds no per-request state.
pub struct Pipeline {
    config: Config,
    source: Arc<dyn VideoSource>,
    model: Arc<dyn ChatModel>,
    evidence: Option<EvidenceGatherer>,
    frames: Option<FrameSampler>,
}

impl Pipeline {
    pub fn new(config: Config, source: Arc<dyn VideoSource>, model: Arc<dyn ChatModel>) -> Self {
        Self {
            config,
            source,
            model,
            evidence: None,
            frames: None,
        }
    }

    /// Production wiring: YouTube fetchers, hosted model and evidence
    /// gathering over one shared HTTP client. Frame sampling only when enabled.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("adcase/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let source = Arc::new(YouTubeSource::new(&config, client.clone()));
        let model = Arc::new(HttpChatModel::new(&config, client.clone()));
        let evidence = EvidenceGatherer::new(&config, client);
        let frames = FrameSampler::from_config(&config);
        let mut pipeline = Self::new(config, source, model).with_evidence(evidence);
        if let Some(frames) = frames {
            pipeline = pipeline.with_frames(frames);
        }
        Ok(pipeline)
    }

    pub fn with_evidence(mut self, evidence: EvidenceGatherer) -> Self {
        self.evidence = Some(evidence);
        self
    }

    pub fn with_frames(mut self, frames: FrameSampler) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn out_dir(&self) -> &Path {
        &self.config.out_dir
    }

    pub async fn run(&self, request: &JobRequest) -> Result<JobOutput> {
        fs::create_dir_all(&self.config.out_dir).await?;

        let video = resolve_video(self.source.as_ref(), &request.url).await?;
        let transcript =
            load_transcript(self.source.as_ref(), &video, request.transcript.as_deref()).await;
        let mut evidence = match &self.evidence {
            Some(gatherer) => gatherer.gather(&video).await,
            None => EvidenceBundle::default(),
        };
        let mut on_screen = String::new();
        if let Some(sampler) = &self.frames {
            let sampled = sampler.sample(&video).await;
            evidence.frames = sampled.frames;
            on_screen = sampled.on_screen_text;
        }
        let hints = combine_hints(request.hints.as_deref().unwrap_or_default(), &on_screen);
        let hints = hints.as_str();

        let format = self.effective_format(request);
        let (mut study, fragment, repair_passes) = match request.mode {
            GenerationMode::Json => {
                let generation = generate_case_study(
                    self.model.as_ref(),
                    self.repair_settings(),
                    GenerationInput {
                        video: &video,
                        transcript: &transcript,
                        evidence: &evidence,
                        hints,
                    },
                )
                .await;
                (generation.study, None, generation.repair_passes)
            }
            GenerationMode::Html => {
                match self.generate_fragment(&video, &transcript, &evidence, hints).await {
                    Some(fragment) => {
                        let mut study = CaseStudy::default();
                        study.stamp_video(&video);
                        (study, Some(fragment), 0)
                    }
                    None => (minimal_case_study(&video, &transcript, &Naming::default()), None, 0),
                }
            }
        };
        study.naming = study.naming.overridden_by(&request.naming);
        let degraded = study.degraded;

        let stem = build_filename_stem(&study.naming, &study.title, &study.video_id);
        let primary = format!("{stem}.{}", format.extension());
        let primary_path = self.config.out_dir.join(&primary);

        match format {
            OutputFormat::Pdf => {
                let html = self.page_html(&study, fragment.as_deref())?;
                render_pdf(
                    &html,
                    &primary_path,
                    &self.config.pdf_renderer,
                    self.config.render_timeout,
                )
                .await?;
            }
            OutputFormat::Html => {
                fs::write(&primary_path, self.page_html(&study, fragment.as_deref())?).await?;
            }
            OutputFormat::Json => fs::write(&primary_path, render_json(&study)?).await?,
            OutputFormat::Text => fs::write(&primary_path, render_text(&study)).await?,
        }

        let mut files = vec![primary.clone()];
        if self.config.keep_json_sidecar && format != OutputFormat::Json && fragment.is_none() {
            let sidecar = format!("{stem}.json");
            fs::write(self.config.out_dir.join(&sidecar), render_json(&study)?).await?;
            files.push(sidecar);
        }

        info!(
            file = %primary,
            video_id = %study.video_id,
            repair_passes,
            degraded,
            "Case study written"
        );
        Ok(JobOutput {
            primary,
            files,
            study,
            repair_passes,
            degraded,
        })
    }

    fn repair_settings(&self) -> RepairSettings {
        RepairSettings {
            max_passes: self.config.max_repair_passes,
            limits: Limits {
                min_scenes: self.config.min_scenes,
                min_script_lines: self.config.min_script_lines,
            },
        }
    }

    fn effective_format(&self, request: &JobRequest) -> OutputFormat {
        let format = request.format.unwrap_or(self.config.output_format);
        match (request.mode, format) {
            (GenerationMode::Html, OutputFormat::Json | OutputFormat::Text) => {
                warn!(requested = ?format, "HTML mode has no structured output; writing HTML");
                OutputFormat::Html
            }
            _ => format,
        }
    }

    fn page_html(&self, study: &CaseStudy, fragment: Option<&str>) -> Result<String> {
        match fragment {
            Some(fragment) => render_html_fragment(study, fragment),
            None => render_html(study),
        }
    }

    /// `None` when the model fails or answers with nothing usable
    async fn generate_fragment(
        &self,
        video: &VideoRef,
        transcript: &Transcript,
        evidence: &EvidenceBundle,
        hints: &str,
    ) -> Option<String> {
        let request = ChatRequest {
            system: HTML_SYSTEM_PROMPT.to_string(),
            user: build_html_user_payload(video, transcript, evidence, hints),
            images: evidence.image_urls(),
            json: false,
        };
        match self.model.complete(&request).await {
            Ok(html) if !html.trim().is_empty() => Some(html),
            Ok(_) => {
                warn!(video_id = %video.id, "Model returned an empty HTML fragment");
                None
            }
            Err(e) => {
                warn!(video_id = %video.id, error = %e, "HTML generation failed");
                None
            }
        }
    }
}

/// User hints first, then sampled on-screen text
fn combine_hints(user: &str, on_screen: &str) -> String {
    match (user.trim(), on_screen.trim()) {
        (user, "") => user.to_string(),
        ("", on_screen) => on_screen.to_string(),
        (user, on_screen) => format!("{user}\n{on_screen}"),
    }
}

/// Append one timestamped line to `<out_dir>/errors.log`
pub async fn append_error_log(out_dir: &Path, context: &str, error: &str) -> Result<PathBuf> {
    fs::create_dir_all(out_dir).await?;
    let path = out_dir.join(ERROR_LOG);
    let line = format!(
        "{} {} {}\n",
        Utc::now().to_rfc3339(),
        context,
        error.replace('\n', " ")
    );
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    Ok(path)
}
