use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdcaseError {
    #[error("Invalid video URL: {input:?}")]
    InvalidUrl { input: String },

    #[error("{service} unavailable: {reason}")]
    Upstream { service: &'static str, reason: String },

    #[error("Model output is malformed: {reason}")]
    MalformedOutput { reason: String },

    #[error("{tool} failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("Rendering failed: {reason}")]
    RenderFailed { reason: String },

    #[error("Missing API key: {env_var} environment variable is not set")]
    MissingApiKey { env_var: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, AdcaseError>;
