use thiserror::Error;

pub type Result<T> = std::result::Result<T, WallhavenError>;

#[derive(Debug, Error)]
pub enum WallhavenError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Wallhaven API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("wallpaper not found: {0}")]
    NotFound(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

