use crate::{
    format::format_transcript_with_timestamps,
    types::{CaseStudy, EvidenceBundle, INFERRED_MARKER, Transcript, VideoRef},
    validate::Violation,
};

/// Schema v1 instructions. Evidence-locked: the model may only state what the
/// transcript, thumbnails or trade snippets support.
pub static SYSTEM_PROMPT: &str = r#"You are an advertising strategist writing a case study of a
single TV/online commercial.

You work ONLY from the evidence supplied in the user message: the transcript, the hints
(on-screen text and viewer notes, if any), the thumbnail and sampled frame images (if attached)
and the trade-press snippets (if any). Do not use outside knowledge about the spot.

OUTPUT: Return ONLY one valid JSON object, no markdown, no commentary, matching:
{
  "schema_version": 1,
  "summary": "2-3 sentences on what the spot is and does",
  "brand": {"advertiser": "", "product": "", "tagline": ""},
  "naming": {"agency": "", "product": "", "campaign": "", "commercial": "", "director": ""},
  "scenes": [
    {"time": "MM:SS", "action": "What is on screen", "inferred": false}
  ],
  "script": [
    {"time": "MM:SS", "speaker": "VO|SUPER|character name", "line": "verbatim dialogue",
     "annotation": "what the line does strategically"}
  ],
  "strategy": {
    "objective": "", "audience": "", "insight": "", "execution": "", "why_it_works": ""
  },
  "citations": [{"url": "trade-press URL you relied on", "note": "what it supports"}]
}

HARD RULES:
- At least {min_scenes} scenes and at least {min_script} script lines.
- Every "time" is MM:SS (or HH:MM:SS for long videos), taken from the transcript timestamps.
- Every script "line" is copied VERBATIM from the transcript (or the supplied hints). Never
  paraphrase, translate or invent dialogue.
- Do not invent visuals. A scene you cannot verify from an image or the transcript must set
  "inferred": true and its "action" must end with "{marker}".
- Naming fields: fill only what the evidence states; otherwise leave "".
- Citations may only use URLs listed in the trade-press section.
"#;

pub static HTML_SYSTEM_PROMPT: &str = r#"You are an advertising strategist writing a case study of a
single TV/online commercial.

Work ONLY from the transcript, hints, images and trade-press snippets supplied. Do not invent
visuals; mark unverifiable visual claims with "(inferred)". Quote dialogue verbatim with MM:SS
timecodes.

Return an HTML fragment (no <html>, <head> or <body> tags, no <script>) with these sections, each
under an <h2>: Overview, Scene Breakdown (a table of time / action), Script Annotation (a table of
time / speaker / line / annotation), Strategic Analysis, Sources.
"#;

pub fn system_prompt(min_scenes: usize, min_script: usize) -> String {
    SYSTEM_PROMPT
        .replace("{min_scenes}", &min_scenes.to_string())
        .replace("{min_script}", &min_script.to_string())
        .replace("{marker}", INFERRED_MARKER)
}

fn push_hints(payload: &mut String, hints: &str) {
    let hints = hints.trim();
    if !hints.is_empty() {
        payload.push_str("\nHINTS (on-screen text and viewer notes; may be quoted verbatim):\n");
        payload.push_str(hints);
        payload.push('\n');
    }
}

fn evidence_sections(
    video: &VideoRef,
    transcript: &Transcript,
    evidence: &EvidenceBundle,
    hints: &str,
) -> String {
    let mut payload = String::new();

    payload.push_str(&format!("TITLE: {}\n", video.title));
    payload.push_str(&format!("CHANNEL: {}\n", video.channel));
    payload.push_str(&format!("URL: {}\n\n", video.url));

    payload.push_str("TRANSCRIPT:\n");
    if transcript.is_empty() {
        payload.push_str("(no transcript available; the script may only use on-screen hints)\n");
    } else {
        payload.push_str(&format_transcript_with_timestamps(transcript));
        payload.push('\n');
    }
    push_hints(&mut payload, hints);

    if !evidence.thumbnail_urls.is_empty() {
        payload.push_str(&format!(
            "\nTHUMBNAILS: {} still(s) attached as images.\n",
            evidence.thumbnail_urls.len()
        ));
    }
    if !evidence.frames.is_empty() {
        let times: Vec<&str> = evidence.frames.iter().map(|f| f.time.as_str()).collect();
        payload.push_str(&format!(
            "FRAMES: {} sampled frame(s) attached after the thumbnails, taken at {}.\n",
            evidence.frames.len(),
            times.join(", ")
        ));
    }

    if !evidence.trade_snippets.is_empty() {
        payload.push_str("\nTRADE PRESS:\n");
        for snippet in &evidence.trade_snippets {
            payload.push_str(&format!("- {}\n", snippet));
        }
        payload.push_str("SOURCES:\n");
        for url in &evidence.trade_citations {
            payload.push_str(&format!("- {}\n", url));
        }
    }

    payload
}

/// First-draft user message for JSON mode
pub fn build_user_payload(
    video: &VideoRef,
    transcript: &Transcript,
    evidence: &EvidenceBundle,
    hints: &str,
) -> String {
    let mut payload = String::from("Write the case study JSON for this commercial.\n\n");
    payload.push_str(&evidence_sections(video, transcript, evidence, hints));
    payload
}

/// User message for the free-form HTML variant
pub fn build_html_user_payload(
    video: &VideoRef,
    transcript: &Transcript,
    evidence: &EvidenceBundle,
    hints: &str,
) -> String {
    let mut payload = String::from("Write the case study HTML fragment for this commercial.\n\n");
    payload.push_str(&evidence_sections(video, transcript, evidence, hints));
    payload
}

/// Correction request listing every violated rule
pub fn build_repair_payload(
    draft: &CaseStudy,
    violations: &[Violation],
    transcript: &Transcript,
    hints: &str,
) -> serde_json::Result<String> {
    let mut payload = String::from(
        "Your previous JSON broke the rules listed below. Return a corrected JSON object with the \
         same schema. Fix every item; keep everything that was already valid.\n\nVIOLATIONS:\n",
    );
    for violation in violations {
        payload.push_str(&format!("- {}\n", violation));
    }

    payload.push_str("\nTRANSCRIPT (the only allowed source of script lines):\n");
    if transcript.is_empty() {
        payload.push_str("(empty)\n");
    } else {
        payload.push_str(&format_transcript_with_timestamps(transcript));
        payload.push('\n');
    }
    push_hints(&mut payload, hints);

    payload.push_str("\nPREVIOUS JSON:\n");
    payload.push_str(&serde_json::to_string_pretty(draft)?);
    Ok(payload)
}
