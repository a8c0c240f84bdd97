use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single extractor call (probe or download).
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("failed to start yt-dlp at {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("yt-dlp exited with {status}: {stderr}")]
    Process { status: String, stderr: String },

    #[error("yt-dlp returned invalid metadata: {0}")]
    InvalidProbe(#[from] serde_json::Error),

    #[error("could not create folder {path}: {source}")]
    Folder {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Reasons a job refuses to start.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Please enter at least one video URL.")]
    NoUrls,
    #[error("Please choose a download folder.")]
    NoFolder,
}
