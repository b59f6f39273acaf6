use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnkiportError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Could not connect to AnkiConnect at {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("AnkiConnect returned an error for '{action}': {message}")]
    AnkiConnect { action: String, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Translation failed: {0}")]
    Translation(String),

    #[error("AnkiportError: {0}")]
    Custom(String),
}

impl AnkiportError {
    /// A run cannot continue without the note-database service.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AnkiportError::Unreachable { .. })
    }
}

impl From<std::io::Error> for AnkiportError {
    fn from(error: std::io::Error) -> Self {
        AnkiportError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for AnkiportError {
    fn from(error: reqwest::Error) -> Self {
        AnkiportError::Reqwest(Box::new(error))
    }
}

pub type Result<T> = std::result::Result<T, AnkiportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unreachable_is_fatal() {
        let unreachable = AnkiportError::Unreachable {
            url: "http://127.0.0.1:8765".to_string(),
            reason: "connection refused".to_string(),
        };
        assert!(unreachable.is_fatal());
        assert!(unreachable.to_string().contains("127.0.0.1:8765"));

        let api = AnkiportError::AnkiConnect {
            action: "retrieveMediaFile".to_string(),
            message: "file not found".to_string(),
        };
        assert!(!api.is_fatal());
        assert!(api.to_string().contains("retrieveMediaFile"));
    }
}
