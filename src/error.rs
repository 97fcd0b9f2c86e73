use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    /// A unique key was already taken in the given collection.
    #[error("Duplicate key '{key}' in {collection}")]
    Duplicate { collection: &'static str, key: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl ScraperError {
    pub fn storage(message: impl Into<String>) -> Self {
        ScraperError::Storage { message: message.into() }
    }

    pub fn api(message: impl Into<String>) -> Self {
        ScraperError::Api { message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
