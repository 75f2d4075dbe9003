use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout")]
    Timeout,
    #[error("http error: {0}")]
    Http(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("org api error: {0}")]
    Org(String),
    #[error("unknown product: {0}")]
    UnknownProduct(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ScanError::Timeout
        } else if err.is_connect() {
            ScanError::Network(err.to_string())
        } else if err.is_status() {
            ScanError::Http(err.to_string())
        } else {
            ScanError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Config(err.to_string())
    }
}
