use crate::{
    format::format_timestamp,
    types::{CaseStudy, INFERRED_MARKER, Naming, Scene, ScriptLine, Transcript, VideoRef},
};

const MAX_FALLBACK_SCENES: usize = 12;

/// Transcript-only document used when the model never produced a valid draft.
/// Built without the LLM, so it cannot fail.
pub fn minimal_case_study(video: &VideoRef, transcript: &Transcript, naming: &Naming) -> CaseStudy {
    let segments: Vec<_> = transcript
        .segments
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .collect();

    let script: Vec<ScriptLine> = segments
        .iter()
        .map(|seg| ScriptLine {
            time: format_timestamp(seg.start),
            speaker: "VO".to_string(),
            line: seg.text.trim().to_string(),
            annotation: String::new(),
        })
        .collect();

    let scenes = if segments.is_empty() {
        vec![Scene {
            time: "00:00".to_string(),
            action: format!("No transcript or visual evidence was available {INFERRED_MARKER}"),
            inferred: true,
        }]
    } else {
        let step = segments.len().div_ceil(MAX_FALLBACK_SCENES);
        segments
            .iter()
            .step_by(step)
            .map(|seg| Scene {
                time: format_timestamp(seg.start),
                action: format!("Dialogue: \"{}\"", seg.text.trim()),
                inferred: false,
            })
            .collect()
    };

    let summary = if segments.is_empty() {
        "Automatic fallback: no transcript was available and the analysis could not be \
         validated, so this document only identifies the video."
            .to_string()
    } else {
        "Automatic fallback: the analysis could not be validated, so this document lists the \
         transcript verbatim."
            .to_string()
    };

    let mut study = CaseStudy {
        summary,
        naming: naming.clone(),
        scenes,
        script,
        degraded: true,
        ..CaseStudy::default()
    };
    study.stamp_video(video);
    study
}
