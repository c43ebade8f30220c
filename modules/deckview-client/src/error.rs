use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeckViewError>;

#[derive(Debug, Error)]
pub enum DeckViewError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Session error: {0}")]
    Session(String),
}

impl From<reqwest::Error> for DeckViewError {
    fn from(err: reqwest::Error) -> Self {
        DeckViewError::Network(err.to_string())
    }
}
