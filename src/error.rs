use std::time::Duration;

use thiserror::Error;

/// Why a single extraction over fetched content produced no number.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("no element matches `{selector}`")]
    NoCandidates { selector: String },
    #[error("none of {candidates} candidate(s) has a label containing {keyword:?}")]
    NoLabelMatch { keyword: String, candidates: usize },
    #[error("matched element has no value node matching `{selector}`")]
    MissingValue { selector: String },
    #[error("value text {text:?} is not a decimal number")]
    Unparsable { text: String },
    #[error("extracted value {value} is not a positive price")]
    NotPositive { value: f64 },
}

/// Failure of one acquisition attempt. Absorbed by the refresh cycle.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("fetch timed out after {}ms", after.as_millis())]
    Timeout { after: Duration },
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("http status {status}")]
    Http { status: u16 },
    #[error("browser error: {0}")]
    Browser(String),
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

impl AcquireError {
    /// Classify a reqwest failure the way the cycle logs it.
    pub fn from_reqwest(e: reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            return AcquireError::Timeout { after: timeout };
        }
        match e.status() {
            Some(status) => AcquireError::Http {
                status: status.as_u16(),
            },
            None => AcquireError::Network(e),
        }
    }
}
