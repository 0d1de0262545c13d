use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("vocabulary document not found: {}", .0.display())]
    MissingVocabulary(PathBuf),

    #[error("output directory {} is unusable: {source}", path.display())]
    OutputDirectory { path: PathBuf, source: io::Error },

    #[error("match results directory not found: {}", .0.display())]
    MissingMatchResults(PathBuf),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("failed to decode {}: not UTF-8 or GBK text", .0.display())]
    Decode(PathBuf),

    #[error("inference request failed: {0}")]
    InferenceTransport(String),

    #[error("inference endpoint returned status {status}: {body}")]
    InferenceStatus { status: u16, body: String },

    #[error("inference response has no completion text")]
    InferenceEmpty,
}

impl From<url::ParseError> for TemplateError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidOption(format!("invalid inference base url: {error}"))
    }
}

impl From<ureq::Error> for TemplateError {
    fn from(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(status, response) => Self::InferenceStatus {
                status,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => Self::InferenceTransport(transport.to_string()),
        }
    }
}
