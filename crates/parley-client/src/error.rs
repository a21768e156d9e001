use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(Box<reqwest::Error>),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        ClientError::Http(Box::new(e))
    }
}
