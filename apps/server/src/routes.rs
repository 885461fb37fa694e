use std::sync::Arc;

use adcase_core::{
    AdcaseError, GenerationMode, JobOutput, JobRequest, Naming, OutputFormat, Pipeline,
    append_error_log, pipeline::ERROR_LOG,
};
use axum::{
    Form, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Deserialize;
use tokio::fs;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

/// Pasted transcripts can be long; anything past this is refused
const FORM_LIMIT_BYTES: usize = 2 * 1024 * 1024;

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>adcase</title>
<style>
  body { font-family: Helvetica, Arial, sans-serif; max-width: 720px; margin: 40px auto; }
  label { display: block; margin-top: 12px; font-weight: bold; }
  input, textarea, select { width: 100%; padding: 6px; box-sizing: border-box; }
  textarea { height: 160px; }
  button { margin-top: 20px; padding: 8px 20px; }
</style>
</head>
<body>
<h1>Ad case study generator</h1>
<form method="post" action="/generate">
  <label for="url">YouTube URL</label>
  <input id="url" name="url" required>
  <label for="transcript">Transcript (optional, one line per caption, timestamps like 0:05)</label>
  <textarea id="transcript" name="transcript"></textarea>
  <label for="hints">On-screen text / lyrics (optional)</label>
  <textarea id="hints" name="hints"></textarea>
  <label for="agency">Agency</label><input id="agency" name="agency">
  <label for="product">Product</label><input id="product" name="product">
  <label for="campaign">Campaign</label><input id="campaign" name="campaign">
  <label for="commercial">Commercial</label><input id="commercial" name="commercial">
  <label for="director">Director</label><input id="director" name="director">
  <label for="format">Format</label>
  <select id="format" name="format">
    <option value="">Default</option>
    <option value="pdf">PDF</option>
    <option value="json">JSON</option>
    <option value="text">Text</option>
    <option value="html">HTML</option>
  </select>
  <label for="mode">Generation</label>
  <select id="mode" name="mode">
    <option value="json">Structured</option>
    <option value="html">Free-form HTML</option>
  </select>
  <button type="submit">Generate</button>
</form>
</body>
</html>
"#;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/generate", post(generate))
        .route("/out/{filename}", get(download))
        .route("/health", get(health))
        .with_state(AppState { pipeline })
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(FORM_LIMIT_BYTES))
}

// --- Error Handling ---
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            AppError::BadRequest(s) => (StatusCode::BAD_REQUEST, s),
            AppError::NotFound(s) => (StatusCode::NOT_FOUND, s),
            AppError::Internal(s) => {
                tracing::error!(error = %s, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, msg).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateForm {
    url: String,
    transcript: String,
    hints: String,
    agency: String,
    product: String,
    campaign: String,
    commercial: String,
    director: String,
    format: String,
    mode: String,
}

impl GenerateForm {
    fn into_job(self) -> Result<JobRequest, AdcaseError> {
        let format = match self.format.trim() {
            "" => None,
            f => Some(f.parse::<OutputFormat>()?),
        };
        let mode = match self.mode.trim() {
            "" => GenerationMode::default(),
            m => m.parse::<GenerationMode>()?,
        };
        Ok(JobRequest {
            url: self.url,
            transcript: non_blank(self.transcript),
            hints: non_blank(self.hints),
            naming: Naming {
                agency: self.agency,
                product: self.product,
                campaign: self.campaign,
                commercial: self.commercial,
                director: self.director,
            },
            format,
            mode,
        })
    }
}

fn non_blank(value: String) -> Option<String> {
    (!value.trim().is_empty()).then_some(value)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(
    State(state): State<AppState>,
    Form(form): Form<GenerateForm>,
) -> Result<Html<String>, AppError> {
    let request_id = Uuid::new_v4();
    let url = form.url.clone();
    tracing::info!(%request_id, url = %url, "Generation requested");

    let result = match form.into_job() {
        Ok(job) => state.pipeline.run(&job).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(output) => Ok(Html(result_page(&output))),
        Err(e) => {
            let message = e.to_string();
            tracing::warn!(%request_id, error = %message, "Generation failed");
            let context = format!("{request_id} url={url:?}");
            let logged = append_error_log(state.pipeline.out_dir(), &context, &message).await;
            if let Err(log_err) = logged {
                tracing::error!(error = %log_err, "Could not append to error log");
            }
            Err(AppError::BadRequest(message))
        }
    }
}

fn result_page(output: &JobOutput) -> String {
    let mut links = String::new();
    for file in &output.files {
        links.push_str(&format!(
            "<li><a href=\"/out/{}\">{}</a></li>\n",
            encode_double_quoted_attribute(file),
            encode_text(file)
        ));
    }
    let status = if output.degraded {
        "The analysis could not be validated; this is a transcript-only document."
    } else {
        "Validated case study."
    };
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n\
         <head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body>\n<h1>{title}</h1>\n<p>{channel}</p>\n<p>{status} Repair passes: {passes}.</p>\n\
         <ul>\n{links}</ul>\n<p><a href=\"/\">Generate another</a></p>\n</body>\n</html>\n",
        title = encode_text(&output.study.title),
        channel = encode_text(&output.study.channel),
        passes = output.repair_passes,
    )
}

fn content_type(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "pdf" => "application/pdf",
        Some(ext) if ext == "json" => "application/json",
        Some(ext) if ext == "txt" => "text/plain; charset=utf-8",
        Some(ext) if ext == "html" => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Generated documents only: no paths, no dotfiles (render and frame scratch),
/// and never the error log, which records submitted URLs
fn is_downloadable(filename: &str) -> bool {
    !(filename.is_empty()
        || filename.starts_with('.')
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.eq_ignore_ascii_case(ERROR_LOG))
}

async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if !is_downloadable(&filename) {
        return Err(AppError::NotFound(format!("No such file: {filename}")));
    }

    let path = state.pipeline.out_dir().join(&filename);
    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("No such file: {filename}")));
        }
        Err(e) => return Err(AppError::Internal(e.to_string())),
    };

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        filename.replace('"', "")
    ))
    .map_err(|_| AppError::NotFound(format!("No such file: {filename}")))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type(&filename))),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}
