use std::{fmt, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

use crate::types::{CaseStudy, INFERRED_MARKER};

static TIMECODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d{2}:\d{2}|\d{2}:\d{2}:\d{2}(?:\.\d{1,3})?)$")
        .expect("timecode pattern is valid")
});

/// Stable identifiers of the structural rules, sent back to the model on repair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rule {
    MinScenes,
    MinScript,
    SceneTimecode,
    ScriptTimecode,
    LineNotInTranscript,
    InferredMarker,
    MalformedJson,
}

impl Rule {
    pub fn id(&self) -> &'static str {
        match self {
            Rule::MinScenes => "MIN_SCENES",
            Rule::MinScript => "MIN_SCRIPT",
            Rule::SceneTimecode => "SCENE_TIMECODE",
            Rule::ScriptTimecode => "SCRIPT_TIMECODE",
            Rule::LineNotInTranscript => "LINE_NOT_IN_TRANSCRIPT",
            Rule::InferredMarker => "INFERRED_MARKER",
            Rule::MalformedJson => "MALFORMED_JSON",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: Rule,
    /// Index into `scenes` or `script`, when the rule is per item
    pub index: Option<usize>,
    pub detail: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]: {}", self.rule.id(), i, self.detail),
            None => write!(f, "{}: {}", self.rule.id(), self.detail),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub min_scenes: usize,
    pub min_script_lines: usize,
}

/// Everything a dialogue line may be quoted from
pub struct Evidence<'a> {
    pub transcript: &'a str,
    pub hints: &'a str,
}

pub fn is_timecode(value: &str) -> bool {
    TIMECODE.is_match(value.trim())
}

/// Lowercase, strip punctuation, collapse whitespace
pub fn normalize_loose(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case/punctuation-insensitive containment. An empty needle never matches.
pub fn loosely_contains(haystack: &str, needle: &str) -> bool {
    let needle = normalize_loose(needle);
    if needle.is_empty() {
        return false;
    }
    let haystack = format!(" {} ", normalize_loose(haystack));
    haystack.contains(&format!(" {needle} "))
}

/// Check a draft against the structural rules; an empty result means it passes
pub fn validate(study: &CaseStudy, evidence: &Evidence<'_>, limits: Limits) -> Vec<Violation> {
    let mut violations = Vec::new();

    if study.scenes.len() < limits.min_scenes {
        violations.push(Violation {
            rule: Rule::MinScenes,
            index: None,
            detail: format!(
                "need at least {} scenes, got {}",
                limits.min_scenes,
                study.scenes.len()
            ),
        });
    }
    if study.script.len() < limits.min_script_lines {
        violations.push(Violation {
            rule: Rule::MinScript,
            index: None,
            detail: format!(
                "need at least {} script lines, got {}",
                limits.min_script_lines,
                study.script.len()
            ),
        });
    }

    for (i, scene) in study.scenes.iter().enumerate() {
        if !is_timecode(&scene.time) {
            violations.push(Violation {
                rule: Rule::SceneTimecode,
                index: Some(i),
                detail: format!("time {:?} is not MM:SS", scene.time),
            });
        }
        if scene.inferred && !scene.action.trim_end().ends_with(INFERRED_MARKER) {
            violations.push(Violation {
                rule: Rule::InferredMarker,
                index: Some(i),
                detail: format!("inferred scene must end with {INFERRED_MARKER}"),
            });
        }
    }

    for (i, line) in study.script.iter().enumerate() {
        if !is_timecode(&line.time) {
            violations.push(Violation {
                rule: Rule::ScriptTimecode,
                index: Some(i),
                detail: format!("time {:?} is not MM:SS", line.time),
            });
        }
        if !loosely_contains(evidence.transcript, &line.line)
            && !loosely_contains(evidence.hints, &line.line)
        {
            violations.push(Violation {
                rule: Rule::LineNotInTranscript,
                index: Some(i),
                detail: format!("line {:?} is not verbatim transcript text", line.line),
            });
        }
    }

    violations
}
