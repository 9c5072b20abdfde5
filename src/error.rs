use std::time::Duration;
use thiserror::Error;

/// Errors produced while driving the browser and scraping listings
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    /// The browser session is unusable (closed, crashed, transport lost)
    #[error("Browser session failure: {0}")]
    SessionFailure(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Timed out after {timeout:?} waiting for {condition}")]
    NavigationTimeout { condition: String, timeout: Duration },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The element handle no longer refers to a node in the live document
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// The page's script context went away mid-call, typically during a navigation
    #[error("Execution context lost: {0}")]
    ContextLost(String),

    #[error("Invalid selector '{0}'")]
    InvalidSelector(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Could not resolve {what} for '{input}'")]
    ResolutionFailure { what: String, input: String },

    #[error("Malformed item markup: {0}")]
    ExtractionAnomaly(String),

    #[error("Invalid search request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used to decide how far an error propagates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Model or category not found; recovered by fallback or an empty result
    Resolution,
    /// A bounded wait expired; recovered by continuing best-effort or skipping a category
    NavigationTimeout,
    /// The session is gone; aborts the whole scrape
    Session,
    /// One item could not be parsed; the item is skipped
    Extraction,
    /// Local, recoverable conditions (stale handle, script error, config, I/O)
    Other,
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::LaunchFailed(_) | ScrapeError::ConnectionFailed(_) | ScrapeError::SessionFailure(_) => {
                ErrorKind::Session
            }
            ScrapeError::NavigationFailed(_) | ScrapeError::NavigationTimeout { .. } => ErrorKind::NavigationTimeout,
            ScrapeError::ResolutionFailure { .. } => ErrorKind::Resolution,
            ScrapeError::ExtractionAnomaly(_) => ErrorKind::Extraction,
            ScrapeError::ElementNotFound(_)
            | ScrapeError::StaleElement(_)
            | ScrapeError::ContextLost(_)
            | ScrapeError::InvalidSelector(_)
            | ScrapeError::Script(_)
            | ScrapeError::InvalidRequest(_)
            | ScrapeError::Config(_)
            | ScrapeError::Io(_)
            | ScrapeError::Json(_) => ErrorKind::Other,
        }
    }

    /// Whether this error must abort the current scrape
    pub fn is_session_failure(&self) -> bool {
        self.kind() == ErrorKind::Session
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ScrapeError::NavigationTimeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_abort() {
        assert!(ScrapeError::SessionFailure("tab closed".into()).is_session_failure());
        assert!(ScrapeError::LaunchFailed("no chrome".into()).is_session_failure());
        assert!(!ScrapeError::StaleElement("h3".into()).is_session_failure());
        assert!(!ScrapeError::NavigationFailed("net::ERR_ABORTED".into()).is_session_failure());
        assert!(!ScrapeError::ContextLost("Execution context was destroyed".into()).is_session_failure());
    }

    #[test]
    fn test_timeout_classification() {
        let err = ScrapeError::NavigationTimeout {
            condition: "presence of ul#result-list".into(),
            timeout: Duration::from_secs(2),
        };
        assert!(err.is_timeout());
        assert_eq!(err.kind(), ErrorKind::NavigationTimeout);
        assert_eq!(err.to_string(), "Timed out after 2s waiting for presence of ul#result-list");
    }

    #[test]
    fn test_resolution_message() {
        let err = ScrapeError::ResolutionFailure { what: "model type".into(), input: "27XHVX".into() };
        assert_eq!(err.kind(), ErrorKind::Resolution);
        assert_eq!(err.to_string(), "Could not resolve model type for '27XHVX'");
    }
}
