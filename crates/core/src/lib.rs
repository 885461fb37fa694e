//! Adcase Core Library
//!
//! Turns a YouTube commercial into a structured advertising case study:
//! metadata and caption fetching, evidence gathering, LLM drafting with a
//! bounded validate/repair loop, and HTML/PDF/JSON/text rendering.
//! Optional frame sampling with OCR adds on-screen text to the evidence.

pub mod config;
pub mod error;
pub mod evidence;
pub mod fallback;
pub mod format;
pub mod frames;
pub mod llm;
pub mod naming;
pub mod parse;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod render;
pub mod repair;
pub mod types;
pub mod validate;
pub mod youtube;

#[cfg(test)]
mod testing;

// Re-export commonly used items at crate root
pub use config::Config;
pub use error::{AdcaseError, Result};
pub use format::{format_case_study_readable, format_timestamp, format_transcript_with_timestamps};
pub use llm::{ChatModel, ChatRequest, HttpChatModel};
pub use naming::{build_filename_stem, slugify};
pub use pipeline::{JobOutput, JobRequest, Pipeline, append_error_log};
pub use provider::{Provider, ProviderConfig};
pub use types::{
    CaseStudy, GenerationMode, Naming, OutputFormat, Transcript, TranscriptSegment, VideoRef,
};
pub use youtube::{VideoSource, YouTubeSource};
