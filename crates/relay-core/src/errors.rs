/// Core error type for the relay.
///
/// Adapter crates should map their specific errors into this type so the relay
/// can turn every failure into an event instead of a webhook error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(format!("sqlite: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
