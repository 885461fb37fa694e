use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
    time::Duration,
};

use html_escape::{encode_double_quoted_attribute, encode_text};
use regex::Regex;
use tokio::{fs, process::Command};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{AdcaseError, Result},
    format::format_case_study_readable,
    types::CaseStudy,
};

static SCRIPT_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script\b.*?</script\s*>").expect("script pattern is valid")
});
static DOCUMENT_TAGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:html|head|body)\b[^>]*>|<!doctype[^>]*>")
        .expect("document tag pattern is valid")
});
/// Elements that can run or pull in active content
static ACTIVE_ELEMENTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?is)<(?:iframe|object|embed|style)\b.*?</(?:iframe|object|embed|style)\s*>",
        r"|<(?:iframe|object|embed|base|meta|link)\b[^>]*>",
    ))
    .expect("active element pattern is valid")
});
static EVENT_HANDLERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#)
        .expect("event handler pattern is valid")
});
static SCRIPT_URLS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        concat!(
            r#"(?i)\b(href|src|action|formaction|xlink:href)\s*=\s*(?:"#,
            r#""\s*(?:javascript|vbscript|data):[^"]*""#,
            r#"|'\s*(?:javascript|vbscript|data):[^']*'"#,
            r#"|(?:javascript|vbscript|data):[^\s>]*)"#,
        ),
    )
    .expect("script url pattern is valid")
});

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{title}} | Case Study</title>
<style>
  body {
    font-family: "DejaVu Sans", Helvetica, Arial, sans-serif;
    color: #1b1b1b;
    margin: 32px;
    font-size: 12px;
  }
  h1 { font-size: 24px; margin-bottom: 4px; }
  h2 { font-size: 16px; border-bottom: 2px solid #1b1b1b; padding-bottom: 4px; margin-top: 28px; }
  .meta { color: #666; margin-bottom: 16px; }
  .note { background: #fff4d6; border-left: 4px solid #e0a800; padding: 8px 12px; }
  table { width: 100%; border-collapse: collapse; }
  th, td { text-align: left; vertical-align: top; padding: 4px 6px; border-bottom: 1px solid #ddd; }
  td.time { white-space: nowrap; font-family: "DejaVu Sans Mono", monospace; width: 60px; }
  dt { font-weight: bold; margin-top: 8px; }
  dd { margin-left: 0; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<div class="meta">{{channel}} &middot; <a href="{{url}}">{{url}}</a></div>
{{note}}
{{content}}
</body>
</html>
"#;

/// Replace every `{{key}}` in one pass. Inserted values are never rescanned,
/// and an unknown key is an error so no placeholder survives.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> Result<String> {
    let mut out = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            return Err(AdcaseError::RenderFailed {
                reason: "unterminated template placeholder".to_string(),
            });
        };
        let key = after[..close].trim();
        let value = values
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| AdcaseError::RenderFailed {
                reason: format!("no value for template placeholder {key:?}"),
            })?;
        out.push_str(value);
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn esc(text: &str) -> String {
    encode_text(text).into_owned()
}

/// Attribute-escaped link target, or `None` unless it is plain http(s)
fn safe_href(url: &str) -> Option<String> {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    (lower.starts_with("https://") || lower.starts_with("http://"))
        .then(|| encode_double_quoted_attribute(url).into_owned())
}

fn definition_list(items: &[(&str, &str)]) -> String {
    let mut html = String::from("<dl>\n");
    for (label, value) in items.iter().filter(|(_, v)| !v.trim().is_empty()) {
        html.push_str(&format!("<dt>{}</dt><dd>{}</dd>\n", esc(label), esc(value)));
    }
    html.push_str("</dl>\n");
    html
}

fn structured_content(study: &CaseStudy) -> String {
    let mut html = String::new();

    if !study.summary.is_empty() {
        html.push_str("<h2>Overview</h2>\n");
        html.push_str(&format!("<p>{}</p>\n", esc(&study.summary)));
    }

    let brand = &study.brand;
    if !(brand.advertiser.is_empty() && brand.product.is_empty() && brand.tagline.is_empty()) {
        html.push_str("<h2>Brand</h2>\n");
        html.push_str(&definition_list(&[
            ("Advertiser", brand.advertiser.as_str()),
            ("Product", brand.product.as_str()),
            ("Tagline", brand.tagline.as_str()),
        ]));
    }

    html.push_str("<h2>Scene Breakdown</h2>\n<table>\n<tr><th>Time</th><th>Action</th></tr>\n");
    for scene in &study.scenes {
        html.push_str(&format!(
            "<tr><td class=\"time\">{}</td><td>{}</td></tr>\n",
            esc(&scene.time),
            esc(&scene.action)
        ));
    }
    html.push_str("</table>\n");

    html.push_str(
        "<h2>Script Annotation</h2>\n<table>\n\
         <tr><th>Time</th><th>Speaker</th><th>Line</th><th>Annotation</th></tr>\n",
    );
    for line in &study.script {
        html.push_str(&format!(
            "<tr><td class=\"time\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            esc(&line.time),
            esc(&line.speaker),
            esc(&line.line),
            esc(&line.annotation)
        ));
    }
    html.push_str("</table>\n");

    let strategy = &study.strategy;
    let strategy_items = [
        ("Objective", strategy.objective.as_str()),
        ("Audience", strategy.audience.as_str()),
        ("Insight", strategy.insight.as_str()),
        ("Execution", strategy.execution.as_str()),
        ("Why it works", strategy.why_it_works.as_str()),
    ];
    if strategy_items.iter().any(|(_, v)| !v.trim().is_empty()) {
        html.push_str("<h2>Strategic Analysis</h2>\n");
        html.push_str(&definition_list(&strategy_items));
    }

    let naming = &study.naming;
    let naming_items = [
        ("Agency", naming.agency.as_str()),
        ("Product", naming.product.as_str()),
        ("Campaign", naming.campaign.as_str()),
        ("Commercial", naming.commercial.as_str()),
        ("Director", naming.director.as_str()),
    ];
    if naming_items.iter().any(|(_, v)| !v.trim().is_empty()) {
        html.push_str("<h2>Credits</h2>\n");
        html.push_str(&definition_list(&naming_items));
    }

    if !study.citations.is_empty() {
        html.push_str("<h2>Sources</h2>\n<ul>\n");
        for citation in &study.citations {
            let Some(href) = safe_href(&citation.url) else {
                debug!(url = %citation.url, "Dropping citation with a non-http link");
                continue;
            };
            let text = esc(citation.url.trim());
            if citation.note.is_empty() {
                html.push_str(&format!("<li><a href=\"{href}\">{text}</a></li>\n"));
            } else {
                html.push_str(&format!(
                    "<li><a href=\"{href}\">{text}</a> ({})</li>\n",
                    esc(&citation.note)
                ));
            }
        }
        html.push_str("</ul>\n");
    }

    html
}

const DEGRADED_NOTE: &str = "<p class=\"note\">Generated from the transcript only; \
                             the full analysis could not be validated.</p>";

fn render_page(study: &CaseStudy, content: &str) -> Result<String> {
    let note = if study.degraded { DEGRADED_NOTE } else { "" };
    let title = esc(&study.title);
    let channel = esc(&study.channel);
    let url = safe_href(&study.url).unwrap_or_else(|| "#".to_string());

    fill_template(
        PAGE_TEMPLATE,
        &[
            ("title", title.as_str()),
            ("channel", channel.as_str()),
            ("url", url.as_str()),
            ("note", note),
            ("content", content),
        ],
    )
}

/// Full HTML document for a structured case study
pub fn render_html(study: &CaseStudy) -> Result<String> {
    render_page(study, &structured_content(study))
}

/// Full HTML document around a model-written fragment
pub fn render_html_fragment(study: &CaseStudy, fragment: &str) -> Result<String> {
    render_page(study, &sanitize_fragment(fragment))
}

/// Drop code fences, scripts, active elements, event handlers, script URLs
/// and document-level tags from model HTML
pub fn sanitize_fragment(fragment: &str) -> String {
    let trimmed = fragment.trim();
    let unfenced = trimmed
        .strip_prefix("```html")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);
    let html = SCRIPT_BLOCK.replace_all(unfenced, "");
    let html = ACTIVE_ELEMENTS.replace_all(&html, "");
    let html = EVENT_HANDLERS.replace_all(&html, "");
    let html = SCRIPT_URLS.replace_all(&html, "$1=\"#\"");
    DOCUMENT_TAGS.replace_all(&html, "").trim().to_string()
}

pub fn render_json(study: &CaseStudy) -> Result<String> {
    Ok(serde_json::to_string_pretty(study)?)
}

pub fn render_text(study: &CaseStudy) -> String {
    format_case_study_readable(study)
}

/// Convert HTML to PDF with an external headless renderer.
///
/// `renderer` is a wkhtmltopdf binary unless its name mentions chrome/chromium,
/// in which case headless print-to-pdf flags are used. JavaScript is disabled
/// in both. The intermediate HTML gets a unique hidden name next to the PDF.
pub async fn render_pdf(
    html: &str,
    pdf_path: &Path,
    renderer: &str,
    timeout: Duration,
) -> Result<()> {
    let html_path = intermediate_html_path(pdf_path);
    fs::write(&html_path, html).await?;

    let result = run_renderer(&html_path, pdf_path, renderer, timeout).await;
    if let Err(e) = fs::remove_file(&html_path).await {
        debug!(path = %html_path.display(), error = %e, "Could not remove intermediate HTML");
    }
    result?;

    let size = fs::metadata(pdf_path).await.map(|m| m.len()).unwrap_or(0);
    if size == 0 {
        return Err(AdcaseError::RenderFailed {
            reason: format!("{renderer} produced no output at {}", pdf_path.display()),
        });
    }
    info!(path = %pdf_path.display(), bytes = size, "Rendered PDF");
    Ok(())
}

fn intermediate_html_path(pdf_path: &Path) -> PathBuf {
    let stem = pdf_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    pdf_path.with_file_name(format!(".{stem}.{}.render.html", Uuid::new_v4().simple()))
}

fn renderer_command(renderer: &str, html_path: &Path, pdf_path: &Path) -> Command {
    let mut command = Command::new(renderer);
    let name = Path::new(renderer)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.contains("chrom") {
        let absolute: PathBuf =
            std::path::absolute(html_path).unwrap_or_else(|_| html_path.to_path_buf());
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--no-pdf-header-footer")
            .arg("--blink-settings=scriptEnabled=false")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg(format!("file://{}", absolute.display()));
    } else {
        command
            .arg("--quiet")
            .arg("--disable-javascript")
            .arg("--disable-local-file-access")
            .arg("--allow")
            .arg(html_path.parent().unwrap_or(Path::new(".")))
            .arg("--encoding")
            .arg("utf-8")
            .arg(html_path)
            .arg(pdf_path);
    }
    command.kill_on_drop(true);
    command
}

async fn run_renderer(
    html_path: &Path,
    pdf_path: &Path,
    renderer: &str,
    timeout: Duration,
) -> Result<()> {
    let mut command = renderer_command(renderer, html_path, pdf_path);
    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| AdcaseError::RenderFailed {
            reason: format!("{renderer} timed out after {}s", timeout.as_secs()),
        })?
        .map_err(|e| AdcaseError::RenderFailed {
            reason: format!("could not start {renderer}: {e}"),
        })?;

    if !output.status.success() {
        return Err(AdcaseError::RenderFailed {
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}
