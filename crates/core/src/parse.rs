use crate::{
    error::{AdcaseError, Result},
    types::CaseStudy,
};

/// Upper bound on how much model output the extractor will scan
pub const MAX_SCAN_BYTES: usize = 256 * 1024;

/// Strict decode first; if that fails, decode the first balanced JSON object
/// found in the text (code fences and chatter around it are ignored).
pub fn parse_case_study(raw: &str) -> Result<CaseStudy> {
    let strict_err = match serde_json::from_str::<CaseStudy>(raw.trim()) {
        Ok(study) => return Ok(study),
        Err(e) => e,
    };

    let Some(object) = extract_json_object(raw) else {
        return Err(AdcaseError::MalformedOutput {
            reason: format!("no JSON object in model output ({strict_err})"),
        });
    };

    serde_json::from_str::<CaseStudy>(object).map_err(|e| AdcaseError::MalformedOutput {
        reason: format!("extracted object does not match the schema: {e}"),
    })
}

/// Locate the first balanced `{...}` within the first `MAX_SCAN_BYTES`,
/// respecting string literals and escapes.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let limit = floor_char_boundary(raw, MAX_SCAN_BYTES);
    let text = &raw[..limit];
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
