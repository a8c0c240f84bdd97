use std::path::PathBuf;

use crate::error::InputError;
use crate::format::ContainerFormat;

/// A batch of URLs to fetch into one root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// URLs in the order the user pasted them
    pub urls: Vec<String>,
    /// Root destination folder
    pub root: PathBuf,
    /// Requested output container
    pub format: ContainerFormat,
}

impl Job {
    /// Builds a job from the raw text box contents, one URL per line.
    /// Blank lines are skipped.
    pub fn from_input(text: &str, folder: &str, format: ContainerFormat) -> Result<Self, InputError> {
        let urls: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect();
        if urls.is_empty() {
            return Err(InputError::NoUrls);
        }
        let folder = folder.trim();
        if folder.is_empty() {
            return Err(InputError::NoFolder);
        }
        Ok(Self {
            urls,
            root: PathBuf::from(folder),
            format,
        })
    }
}

/// Represents the current state of one URL in the batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DownloadStatus {
    /// Waiting for earlier URLs to finish
    Queued,
    /// Download is in progress
    Downloading,
    /// Download has completed successfully
    Done,
    /// Download failed; the message is shown to the user
    Failed(String),
}

/// Data structure for tracking a download task in the UI
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// URL as entered by the user
    pub url: String,
    /// Folder the files land in, once resolved
    pub folder: Option<PathBuf>,
    /// Current status of the download
    pub status: DownloadStatus,
    /// Progress fraction (0.0 to 1.0)
    pub progress: f32,
}

impl DownloadTask {
    pub fn queued(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            folder: None,
            status: DownloadStatus::Queued,
            progress: 0.0,
        }
    }
}

/// Messages sent from the background worker to the UI
#[derive(Clone, Debug, PartialEq)]
pub enum DownloadEvent {
    /// MP4 is used for this job instead of the requested container
    FormatFallback {
        requested: ContainerFormat,
        message: String,
    },
    /// Work on the URL at `index` started, files go to `folder`
    Started { index: usize, folder: PathBuf },
    /// Whole-task percentage for the URL at `index`
    Progress { index: usize, percent: u8 },
    /// The URL at `index` finished
    Finished { index: usize },
    /// The URL at `index` was skipped after an error
    Failed { index: usize, error: String },
    /// Every URL has been attempted
    JobFinished(JobSummary),
}

/// Outcome counts for a finished job
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub succeeded: usize,
    pub failed: usize,
}
