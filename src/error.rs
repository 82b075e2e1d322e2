use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("malformed GenomicStudy: {0}")]
    #[diagnostic(help("the input must be a FHIR R5 GenomicStudy JSON object"))]
    MalformedInput(String),

    #[error("failed to read study file at {0}")]
    StudyRead(PathBuf),

    #[error("FHIR server returned status {status} for {reference}")]
    Remote { status: u16, reference: String },

    #[error("request for {reference} failed: {message}")]
    Transport { reference: String, message: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("no FHIR base URL configured")]
    #[diagnostic(help("pass --base-url, set KIRA_GS_BASE_URL or add base_url to kira-gs.json"))]
    MissingBaseUrl,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl KiraError {
    pub fn is_remote(&self) -> bool {
        matches!(self, KiraError::Remote { .. } | KiraError::Transport { .. })
    }
}
