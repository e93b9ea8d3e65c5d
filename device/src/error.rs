use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} permission not granted")]
    PermissionDenied(&'static str),
    #[error("invalid api url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
    #[error("jni call {call} failed: {message}")]
    Jni { call: &'static str, message: String },
    #[error("preferences: {0}")]
    Prefs(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
