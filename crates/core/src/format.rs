use crate::types::{CaseStudy, Transcript};

/// Format seconds as MM:SS timestamp (HH:MM:SS past the hour)
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

/// Parse `SS`, `M:SS`, `MM:SS` or `H:MM:SS[.mmm]` into seconds
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let last = i == parts.len() - 1;
        let value: f64 = if last {
            if !part.chars().all(|c| c.is_ascii_digit() || c == '.') {
                return None;
            }
            part.parse().ok()?
        } else {
            if !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            part.parse::<u32>().ok()? as f64
        };
        total = total * 60.0 + value;
    }
    Some(total)
}

/// Format transcript segments with timestamps
pub fn format_transcript_with_timestamps(transcript: &Transcript) -> String {
    transcript
        .segments
        .iter()
        .filter(|seg| !seg.text.trim().is_empty())
        .map(|seg| format!("[{}] {}", format_timestamp(seg.start), seg.text.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format a case study as human-readable plain text
pub fn format_case_study_readable(study: &CaseStudy) -> String {
    let mut output = String::new();

    output.push_str(&format!("{}\n", study.title));
    output.push_str(&format!("{}\n", "=".repeat(study.title.chars().count().max(3))));
    output.push_str(&format!("Channel: {}\n", study.channel));
    if !study.url.is_empty() {
        output.push_str(&format!("Video: {}\n", study.url));
    }
    if study.degraded {
        output.push_str("Note: generated from the transcript only\n");
    }
    output.push('\n');

    if !study.summary.is_empty() {
        output.push_str("SUMMARY\n\n");
        output.push_str(&study.summary);
        output.push_str("\n\n");
    }

    let brand = &study.brand;
    if !(brand.advertiser.is_empty() && brand.product.is_empty() && brand.tagline.is_empty()) {
        output.push_str("BRAND\n\n");
        push_field(&mut output, "Advertiser", &brand.advertiser);
        push_field(&mut output, "Product", &brand.product);
        push_field(&mut output, "Tagline", &brand.tagline);
        output.push('\n');
    }

    output.push_str("SCENES\n\n");
    for scene in &study.scenes {
        output.push_str(&format!("[{}] {}\n", scene.time, scene.action));
    }
    output.push('\n');

    output.push_str("SCRIPT\n\n");
    for line in &study.script {
        let speaker = if line.speaker.is_empty() { "?" } else { &line.speaker };
        output.push_str(&format!("[{}] {}: {}\n", line.time, speaker, line.line));
        if !line.annotation.is_empty() {
            output.push_str(&format!("        -> {}\n", line.annotation));
        }
    }
    output.push('\n');

    let strategy = &study.strategy;
    output.push_str("STRATEGY\n\n");
    push_field(&mut output, "Objective", &strategy.objective);
    push_field(&mut output, "Audience", &strategy.audience);
    push_field(&mut output, "Insight", &strategy.insight);
    push_field(&mut output, "Execution", &strategy.execution);
    push_field(&mut output, "Why it works", &strategy.why_it_works);

    if !study.citations.is_empty() {
        output.push_str("\nSOURCES\n\n");
        for citation in &study.citations {
            if citation.note.is_empty() {
                output.push_str(&format!("• {}\n", citation.url));
            } else {
                output.push_str(&format!("• {} ({})\n", citation.url, citation.note));
            }
        }
    }

    output
}

fn push_field(output: &mut String, label: &str, value: &str) {
    if !value.is_empty() {
        output.push_str(&format!("{}: {}\n", label, value));
    }
}
