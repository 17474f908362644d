//! Error taxonomy for the chat client.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures and non-2xx responses are kept as distinct variants for
//! logging, but callers treat them the same way: log, surface a message,
//! abandon the operation. Nothing retries; the poll cadence is the retry.

/// Errors produced by backend calls and client-side validation.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The configured base URL cannot carry path segments.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request never produced a response (DNS, connect, timeout, body read).
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}")]
    Status { status: u16, body: String },

    /// The response body was not the JSON shape we expected.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The backend answered 2xx but reported `success: false`.
    #[error("backend rejected request: {0}")]
    Rejected(String),

    /// Neither a body nor an attachment was provided.
    #[error("message needs text or an attachment")]
    EmptyMessage,

    /// The operation needs an open chat session.
    #[error("no chat session is open")]
    NoActiveSession,

    /// The session exists but its thread has not been resolved yet.
    #[error("chat thread not resolved yet")]
    NoThread,
}

impl ChatError {
    /// Stable code used as a structured log field.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidBaseUrl(_) => "E_INVALID_BASE_URL",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Transport(_) => "E_TRANSPORT",
            Self::Status { .. } => "E_STATUS",
            Self::Decode(_) => "E_DECODE",
            Self::Rejected(_) => "E_REJECTED",
            Self::EmptyMessage => "E_EMPTY_MESSAGE",
            Self::NoActiveSession => "E_NO_SESSION",
            Self::NoThread => "E_NO_THREAD",
        }
    }

    /// Whether the failure happened on the wire rather than in local validation.
    #[must_use]
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Status { .. } | Self::Decode(_) | Self::Rejected(_)
        )
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
