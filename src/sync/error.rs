use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Session cookies are missing; the login page has been opened.
    #[error("not logged in: {0}")]
    Unauthenticated(String),

    #[error("panel authentication failed: {0}")]
    RemoteAuth(String),

    #[error("panel rejected the update: {0}")]
    RemoteState(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("cookie store error: {0}")]
    Cookie(String),

    #[error("configuration incomplete: {0}")]
    Misconfigured(String),

    #[error("failed to persist sync state: {0}")]
    Storage(String),

    #[error("sync already in progress")]
    InProgress,
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Transport(format!("request timed out: {err}"))
        } else {
            SyncError::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
