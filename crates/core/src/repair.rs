use tracing::{info, warn};

use crate::{
    fallback::minimal_case_study,
    llm::{ChatModel, ChatRequest},
    parse::parse_case_study,
    prompt::{build_repair_payload, build_user_payload, system_prompt},
    types::{CaseStudy, EvidenceBundle, Naming, Transcript, VideoRef},
    validate::{Evidence, Limits, Rule, Violation, validate},
};

#[derive(Debug, Clone, Copy)]
pub struct RepairSettings {
    pub max_passes: u32,
    pub limits: Limits,
}

/// What the generate/validate/repair loop settled on
#[derive(Debug, Clone)]
pub struct Generation {
    pub study: CaseStudy,
    pub repair_passes: u32,
    pub degraded: bool,
    /// Violations of the last rejected draft; empty when a draft was accepted
    pub last_violations: Vec<Violation>,
}

pub struct GenerationInput<'a> {
    pub video: &'a VideoRef,
    pub transcript: &'a Transcript,
    pub evidence: &'a EvidenceBundle,
    pub hints: &'a str,
}

enum Draft {
    Parsed(CaseStudy),
    Malformed(String),
}

/// Draft, validate, and repair up to `max_passes` times. When every draft is
/// rejected (or the model is unreachable) the transcript-only fallback is
/// returned; this function never fails.
pub async fn generate_case_study(
    model: &dyn ChatModel,
    settings: RepairSettings,
    input: GenerationInput<'_>,
) -> Generation {
    let system = system_prompt(settings.limits.min_scenes, settings.limits.min_script_lines);
    let transcript_text = input.transcript.plain_text();
    let evidence = Evidence {
        transcript: &transcript_text,
        hints: input.hints,
    };

    let first = ChatRequest {
        system: system.clone(),
        user: build_user_payload(input.video, input.transcript, input.evidence, input.hints),
        images: input.evidence.image_urls(),
        json: true,
    };
    let mut draft = match request_draft(model, &first).await {
        Some(draft) => draft,
        None => return degrade(&input, 0, Vec::new()),
    };

    let mut passes = 0;
    loop {
        let (previous, violations) = match draft {
            Draft::Parsed(study) => {
                let violations = validate(&study, &evidence, settings.limits);
                if violations.is_empty() {
                    info!(repair_passes = passes, "Case study accepted");
                    let mut study = study;
                    study.stamp_video(input.video);
                    study.degraded = false;
                    return Generation {
                        study,
                        repair_passes: passes,
                        degraded: false,
                        last_violations: Vec::new(),
                    };
                }
                (study, violations)
            }
            Draft::Malformed(reason) => (
                CaseStudy::default(),
                vec![Violation {
                    rule: Rule::MalformedJson,
                    index: None,
                    detail: reason,
                }],
            ),
        };

        if passes >= settings.max_passes {
            warn!(
                repair_passes = passes,
                violations = violations.len(),
                "Repair passes exhausted; degrading to transcript-only document"
            );
            return degrade(&input, passes, violations);
        }

        passes += 1;
        info!(pass = passes, violations = violations.len(), "Requesting repair");
        let repair_user =
            build_repair_payload(&previous, &violations, input.transcript, input.hints);
        let user = match repair_user {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Could not serialize draft for repair");
                return degrade(&input, passes, violations);
            }
        };
        let repair = ChatRequest {
            system: system.clone(),
            user,
            images: Vec::new(),
            json: true,
        };
        draft = match request_draft(model, &repair).await {
            Some(draft) => draft,
            None => return degrade(&input, passes, violations),
        };
    }
}

/// `None` means the model could not be reached at all
async fn request_draft(model: &dyn ChatModel, request: &ChatRequest) -> Option<Draft> {
    let raw = match model.complete(request).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Chat completion failed");
            return None;
        }
    };
    Some(match parse_case_study(&raw) {
        Ok(study) => Draft::Parsed(study),
        Err(e) => {
            warn!(error = %e, "Model returned malformed JSON");
            Draft::Malformed(e.to_string())
        }
    })
}

fn degrade(input: &GenerationInput<'_>, passes: u32, violations: Vec<Violation>) -> Generation {
    Generation {
        study: minimal_case_study(input.video, input.transcript, &Naming::default()),
        repair_passes: passes,
        degraded: true,
        last_violations: violations,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        error::{AdcaseError, Result},
        types::{FrameSample, TranscriptSegment, TranscriptSource, UNKNOWN_CHANNEL, UNTITLED},
    };

    /// Replays canned answers and records every request it saw
    struct ScriptedModel {
        replies: Mutex<Vec<Result<String>>>,
        seen: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String>>) -> Self {
            let mut replies = replies;
            replies.reverse();
            Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<ChatRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: &ChatRequest) -> Result<String> {
            self.seen.lock().unwrap().push(request.clone());
            self.replies.lock().unwrap().pop().unwrap_or_else(|| {
                Err(AdcaseError::Upstream {
                    service: "chat completion",
                    reason: "script exhausted".into(),
                })
            })
        }
    }

    fn draft_with_line(line: &str) -> String {
        serde_json::json!({
            "summary": "A greeting.",
            "naming": {"agency": "Model Agency"},
            "scenes": [{"time": "00:05", "action": "A wave", "inferred": false}],
            "script": [{"time": "00:05", "speaker": "VO", "line": line, "annotation": ""}]
        })
        .to_string()
    }

    fn video() -> VideoRef {
        VideoRef {
            url: "https://youtu.be/abc123".into(),
            id: "abc123".into(),
            title: UNTITLED.into(),
            channel: UNKNOWN_CHANNEL.into(),
        }
    }

    fn transcript() -> Transcript {
        Transcript {
            segments: vec![TranscriptSegment {
                start: 5.0,
                text: "Hello world at 0:05".into(),
            }],
            source: TranscriptSource::Pasted,
        }
    }

    const SETTINGS: RepairSettings = RepairSettings {
        max_passes: 2,
        limits: Limits {
            min_scenes: 1,
            min_script_lines: 1,
        },
    };

    async fn run(model: &ScriptedModel) -> Generation {
        let video = video();
        let transcript = transcript();
        let evidence = EvidenceBundle::default();
        generate_case_study(
            model,
            SETTINGS,
            GenerationInput {
                video: &video,
                transcript: &transcript,
                evidence: &evidence,
                hints: "",
            },
        )
        .await
    }

    #[tokio::test]
    async fn valid_first_draft_needs_no_repair() {
        let model = ScriptedModel::new(vec![Ok(draft_with_line("Hello world"))]);
        let generation = run(&model).await;
        assert_eq!(generation.repair_passes, 0);
        assert!(!generation.degraded);
        assert_eq!(generation.study.title, UNTITLED);
        assert_eq!(generation.study.naming.agency, "Model Agency");
        assert_eq!(model.calls().len(), 1);
        assert!(model.calls()[0].json);
    }

    #[tokio::test]
    async fn invented_line_triggers_a_repair_pass() {
        let model = ScriptedModel::new(vec![
            Ok(draft_with_line("Goodbye")),
            Ok(draft_with_line("Hello world")),
        ]);
        let generation = run(&model).await;
        assert_eq!(generation.repair_passes, 1);
        assert!(!generation.degraded);
        assert_eq!(generation.study.script[0].line, "Hello world");

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].user.contains("LINE_NOT_IN_TRANSCRIPT[0]"));
        assert!(calls[1].user.contains("[00:05] Hello world at 0:05"));
    }

    #[tokio::test]
    async fn persistent_violations_degrade_after_bounded_passes() {
        let model = ScriptedModel::new(vec![
            Ok(draft_with_line("Goodbye")),
            Ok(draft_with_line("Goodbye")),
            Ok(draft_with_line("Goodbye")),
            Ok(draft_with_line("Hello world")),
        ]);
        let generation = run(&model).await;
        assert_eq!(generation.repair_passes, 2);
        assert!(generation.degraded);
        assert!(generation.study.degraded);
        assert_eq!(generation.study.script[0].line, "Hello world at 0:05");
        assert_eq!(generation.last_violations[0].rule, Rule::LineNotInTranscript);
        // Initial draft plus two repairs; the fourth reply is never requested.
        assert_eq!(model.calls().len(), 3);
    }

    #[tokio::test]
    async fn malformed_output_is_repaired_like_any_violation() {
        let model = ScriptedModel::new(vec![
            Ok("Sorry, here is some prose".into()),
            Ok(format!("```json\n{}\n```", draft_with_line("hello, WORLD"))),
        ]);
        let generation = run(&model).await;
        assert_eq!(generation.repair_passes, 1);
        assert!(!generation.degraded);
        assert!(model.calls()[1].user.contains("MALFORMED_JSON"));
    }

    #[tokio::test]
    async fn first_draft_sees_hints_and_frame_images() {
        let model = ScriptedModel::new(vec![Ok(draft_with_line("Just Do It"))]);
        let video = video();
        let transcript = Transcript::empty();
        let evidence = EvidenceBundle {
            thumbnail_urls: vec!["https://i.ytimg.com/vi/abc123/hqdefault.jpg".into()],
            frames: vec![FrameSample {
                time: "00:05".into(),
                image_url: "data:image/jpeg;base64,AAAA".into(),
            }],
            ..EvidenceBundle::default()
        };
        let generation = generate_case_study(
            &model,
            SETTINGS,
            GenerationInput {
                video: &video,
                transcript: &transcript,
                evidence: &evidence,
                hints: "SUPER: Just Do It",
            },
        )
        .await;

        assert!(!generation.degraded);
        assert_eq!(generation.study.script[0].line, "Just Do It");
        let calls = model.calls();
        assert!(calls[0].user.contains("SUPER: Just Do It"));
        assert_eq!(
            calls[0].images,
            vec![
                "https://i.ytimg.com/vi/abc123/hqdefault.jpg".to_string(),
                "data:image/jpeg;base64,AAAA".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn unreachable_model_degrades_immediately() {
        let model = ScriptedModel::new(vec![]);
        let generation = run(&model).await;
        assert!(generation.degraded);
        assert_eq!(generation.repair_passes, 0);
        assert_eq!(generation.study.channel, UNKNOWN_CHANNEL);
    }
}
