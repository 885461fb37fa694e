use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
    process::Output,
    time::Duration,
};

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tokio::{fs, process::Command};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    error::{AdcaseError, Result},
    format::format_timestamp,
    types::{FrameSample, VideoRef},
};

/// OCR output shorter than this many alphanumerics is treated as noise
const MIN_OCR_ALNUM: usize = 3;

/// What the sampler pulled out of the video itself
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameEvidence {
    pub frames: Vec<FrameSample>,
    /// `[MM:SS] text` lines of on-screen text, one per frame that had any
    pub on_screen_text: String,
}

impl FrameEvidence {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() && self.on_screen_text.is_empty()
    }
}

/// Downloads a low-resolution copy of the video, samples stills with ffmpeg
/// and reads on-screen text with tesseract.
pub struct FrameSampler {
    ytdlp: String,
    ffmpeg: String,
    tesseract: String,
    interval_secs: u32,
    max_frames: usize,
    timeout: Duration,
    work_root: PathBuf,
}

impl FrameSampler {
    /// `None` unless frame sampling is switched on
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.frame_sampling || config.max_frames == 0 {
            return None;
        }
        Some(Self {
            ytdlp: config.ytdlp_bin.clone(),
            ffmpeg: config.ffmpeg_bin.clone(),
            tesseract: config.tesseract_bin.clone(),
            interval_secs: config.frame_interval_secs.max(1),
            max_frames: config.max_frames,
            timeout: config.frame_timeout,
            work_root: config.out_dir.clone(),
        })
    }

    /// Best effort; missing binaries or failed steps yield empty evidence
    pub async fn sample(&self, video: &VideoRef) -> FrameEvidence {
        if !video.has_known_id() {
            return FrameEvidence::default();
        }

        let work_dir = self
            .work_root
            .join(format!(".frames-{}-{}", video.id, Uuid::new_v4().simple()));
        let evidence = match self.sample_into(video, &work_dir).await {
            Ok(evidence) => evidence,
            Err(e) => {
                warn!(
                    video_id = %video.id,
                    error = %e,
                    "Frame sampling failed; continuing without frames"
                );
                FrameEvidence::default()
            }
        };
        if let Err(e) = fs::remove_dir_all(&work_dir).await {
            debug!(path = %work_dir.display(), error = %e, "Could not remove frame work dir");
        }
        evidence
    }

    async fn sample_into(&self, video: &VideoRef, work_dir: &Path) -> Result<FrameEvidence> {
        fs::create_dir_all(work_dir).await?;

        let video_file = self.download(video, work_dir).await?;
        let frame_files = self.extract_frames(&video_file, work_dir).await?;

        let mut frames = Vec::new();
        let mut texts = Vec::new();
        for (index, path) in frame_files.iter().enumerate() {
            let time = frame_time(index, self.interval_secs);
            let bytes = fs::read(path).await?;
            frames.push(FrameSample {
                time: format_timestamp(time),
                image_url: format!("data:image/jpeg;base64,{}", BASE64.encode(&bytes)),
            });
            match self.ocr(path).await {
                Ok(raw) => {
                    if let Some(text) = clean_ocr(&raw) {
                        texts.push((time, text));
                    }
                }
                Err(e) => debug!(frame = %path.display(), error = %e, "OCR failed"),
            }
        }

        info!(
            video_id = %video.id,
            frames = frames.len(),
            text_frames = texts.len(),
            "Sampled video frames"
        );
        Ok(FrameEvidence {
            frames,
            on_screen_text: on_screen_lines(&texts),
        })
    }

    /// Download the smallest progressive rendition using yt-dlp
    async fn download(&self, video: &VideoRef, work_dir: &Path) -> Result<PathBuf> {
        let template = work_dir.join("video.%(ext)s");
        let output = self
            .run(
                &self.ytdlp,
                [
                    OsStr::new(&video.watch_url()),
                    OsStr::new("--no-playlist"),
                    OsStr::new("-f"),
                    OsStr::new("worst[ext=mp4]/worst"),
                    OsStr::new("--print"),
                    OsStr::new("after_move:filepath"),
                    OsStr::new("-o"),
                    template.as_os_str(),
                ],
            )
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let path = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| AdcaseError::ToolFailed {
                tool: self.ytdlp.clone(),
                reason: "printed no file path".to_string(),
            })?;
        Ok(path)
    }

    /// One still every `interval_secs`, at most `max_frames`
    async fn extract_frames(&self, video_file: &Path, work_dir: &Path) -> Result<Vec<PathBuf>> {
        let pattern = work_dir.join("frame_%03d.jpg");
        let filter = format!("fps=1/{},scale=640:-2", self.interval_secs);
        let max_frames = self.max_frames.to_string();
        self.run(
            &self.ffmpeg,
            [
                OsStr::new("-hide_banner"),
                OsStr::new("-loglevel"),
                OsStr::new("error"),
                OsStr::new("-y"),
                OsStr::new("-i"),
                video_file.as_os_str(),
                OsStr::new("-vf"),
                OsStr::new(&filter),
                OsStr::new("-frames:v"),
                OsStr::new(&max_frames),
                pattern.as_os_str(),
            ],
        )
        .await?;

        let mut frames = Vec::new();
        let mut entries = fs::read_dir(work_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with("frame_") && name.ends_with(".jpg") {
                frames.push(entry.path());
            }
        }
        frames.sort();
        frames.truncate(self.max_frames);
        Ok(frames)
    }

    async fn ocr(&self, frame: &Path) -> Result<String> {
        let output = self
            .run(
                &self.tesseract,
                [
                    frame.as_os_str(),
                    OsStr::new("stdout"),
                    OsStr::new("--psm"),
                    OsStr::new("6"),
                ],
            )
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run<I, S>(&self, program: &str, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut command = Command::new(program);
        command.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| AdcaseError::ToolFailed {
                tool: program.to_string(),
                reason: format!("timed out after {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| AdcaseError::ToolFailed {
                tool: program.to_string(),
                reason: format!("could not start: {e}"),
            })?;

        if !output.status.success() {
            return Err(AdcaseError::ToolFailed {
                tool: program.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Offset of the `index`-th sampled frame, in seconds
pub fn frame_time(index: usize, interval_secs: u32) -> f64 {
    index as f64 * f64::from(interval_secs)
}

/// Collapse OCR whitespace; `None` when nothing legible is left
pub fn clean_ocr(raw: &str) -> Option<String> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();
    (alnum >= MIN_OCR_ALNUM).then_some(text)
}

/// `[MM:SS] text` per frame, skipping a frame that repeats the previous text
pub fn on_screen_lines(texts: &[(f64, String)]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut previous: Option<&str> = None;
    for (time, text) in texts {
        if previous == Some(text.as_str()) {
            continue;
        }
        lines.push(format!("[{}] {}", format_timestamp(*time), text));
        previous = Some(text);
    }
    lines.join("\n")
}
