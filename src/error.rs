use thiserror::Error;
use zip::result::ZipError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] ZipError),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Walkdir error: {0}")]
    Walkdir(#[from] walkdir::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP error {status}: {body_snippet}")]
    Http { status: u16, body_snippet: String },

    #[error("Provisioning error: {0}")]
    Provisioning(String),

    #[error("Sniff error: {0}")]
    Sniff(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Launch error: {0}")]
    Launch(String),

    #[error("Java error: {0}")]
    Java(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Account store error: {0}")]
    Store(String),
}

impl Error {
    /// Builds an `Http` error, keeping only the head of the response body.
    pub fn http(status: u16, body: &str) -> Self {
        Error::Http {
            status,
            body_snippet: body.chars().take(200).collect(),
        }
    }
}
