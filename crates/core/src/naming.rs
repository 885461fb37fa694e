use crate::types::Naming;

const MAX_SLUG_LEN: usize = 48;

/// Lowercase ASCII slug: runs of anything non-alphanumeric become one `-`
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }

    slug.truncate(MAX_SLUG_LEN);
    slug.trim_end_matches('-').to_string()
}

/// Output file stem: naming slugs joined with `_` in agency, product,
/// campaign, commercial, director order; title + id when they are all empty.
pub fn build_filename_stem(naming: &Naming, title: &str, video_id: &str) -> String {
    let parts: Vec<String> = [
        &naming.agency,
        &naming.product,
        &naming.campaign,
        &naming.commercial,
        &naming.director,
    ]
    .iter()
    .map(|field| slugify(field))
    .filter(|slug| !slug.is_empty())
    .collect();

    if !parts.is_empty() {
        return parts.join("_");
    }

    let id = slugify(video_id);
    let id = if id.is_empty() { "unknown".to_string() } else { id };
    match slugify(title) {
        title if title.is_empty() => format!("case-study_{id}"),
        title => format!("{title}_{id}"),
    }
}
