use thiserror::Error;

/// Failures of the durable key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded ({size} bytes, limit {quota})")]
    QuotaExceeded { size: usize, quota: usize },
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures while pulling the leading bytes of a track.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream responded with status {0}")]
    Status(u16),
    #[error("response body was empty")]
    Empty,
}

/// Rejected user edits to the library.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LibraryError {
    #[error("playlist name cannot be empty")]
    EmptyName,
    #[error("\"{0}\" is a reserved playlist name")]
    ReservedName(String),
    #[error("a playlist named \"{0}\" already exists")]
    DuplicateName(String),
    #[error("no playlist named \"{0}\"")]
    UnknownPlaylist(String),
    #[error("playlist \"{0}\" is read-only")]
    ReadOnly(String),
}
