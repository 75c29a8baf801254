use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited by {url} (retried once)")]
    RateLimited { url: String },

    #[error("Unexpected HTTP {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Artist already exists: {0}")]
    ArtistExists(String),

    #[error("Release already exists: {0}")]
    ReleaseExists(i64),

    #[error("User already exists: {0}")]
    UserExists(i64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Empty-result signal, as opposed to a query or connection failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Uniqueness collision on insert; callers skip these.
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::ArtistExists(_) | Self::ReleaseExists(_) | Self::UserExists(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
