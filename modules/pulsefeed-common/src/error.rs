use thiserror::Error;

#[derive(Error, Debug)]
pub enum PulseError {
    #[error("Content source error: {0}")]
    ContentSource(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
