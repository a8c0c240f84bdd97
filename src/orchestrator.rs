//! Sequential download loop run on the background worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::{
    runtime::Handle,
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
};

use crate::downloader::{DownloadRequest, Extractor, ProbeInfo};
use crate::error::DownloadError;
use crate::format::{select_format, ContainerFormat, FormatSelection};
use crate::model::{DownloadEvent, Job, JobSummary};
use crate::notify::Notifier;
use crate::progress::{PauseControl, PauseGate, ProgressReporter};

pub const TITLE_DOWNLOAD_ERROR: &str = "Download error";
pub const TITLE_FORMAT_FALLBACK: &str = "Format not available";
pub const TITLE_COMPLETE: &str = "Downloads complete";

/// Makes a playlist title usable as a single path component.
pub fn sanitize_folder_name(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.').trim();
    match cleaned {
        "" | "." | ".." => "playlist".to_owned(),
        name => name.to_owned(),
    }
}

/// `<root>/<playlist title>` for playlists, `<root>` otherwise.
pub fn destination_folder(root: &Path, probe: &ProbeInfo) -> PathBuf {
    match probe.playlist_title() {
        Some(title) => root.join(sanitize_folder_name(title)),
        None => root.to_path_buf(),
    }
}

/// Creates `path` and its parents; succeeds if it already exists.
pub async fn ensure_folder(path: &Path) -> Result<(), DownloadError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| DownloadError::Folder {
            path: path.to_path_buf(),
            source,
        })
}

/// Probes the first URL for available formats. Returns the probe too so the
/// loop does not query the same URL twice.
async fn choose_format(
    job: &Job,
    extractor: &dyn Extractor,
) -> (FormatSelection, Result<ProbeInfo, DownloadError>) {
    let Some(first) = job.urls.first() else {
        return (
            select_format::<&str>(job.format, &[]),
            Err(DownloadError::Other("no URLs".to_owned())),
        );
    };
    if job.urls.len() > 1 {
        tracing::warn!(
            "format availability is checked on the first URL only and applied to all {} URLs",
            job.urls.len()
        );
    }
    match extractor.probe(first).await {
        Ok(info) => (select_format(job.format, &info.format_exts), Ok(info)),
        Err(e) => {
            tracing::warn!(url = %first, "format probe failed: {e}");
            (select_format::<&str>(job.format, &[]), Err(e))
        }
    }
}

/// User-facing text for a fallback to MP4.
fn fallback_message(requested: ContainerFormat, probe: &Result<ProbeInfo, DownloadError>) -> String {
    match probe {
        Ok(_) => format!(
            "{requested} is not offered by the first URL. Downloading with the MP4 format instead."
        ),
        Err(e) => format!(
            "Could not read the available formats ({e}). Downloading with the MP4 format instead."
        ),
    }
}

/// Borrowed state shared by every URL of a running job
struct Worker<'a> {
    job: &'a Job,
    format: FormatSelection,
    extractor: &'a dyn Extractor,
    gate: &'a PauseGate,
    events: &'a UnboundedSender<DownloadEvent>,
}

impl Worker<'_> {
    async fn process_url(
        &self,
        index: usize,
        url: &str,
        probe: Option<ProbeInfo>,
    ) -> Result<(), DownloadError> {
        let probe = match probe {
            Some(p) => p,
            None => self.extractor.probe(url).await?,
        };
        let folder = destination_folder(&self.job.root, &probe);
        ensure_folder(&folder).await?;
        tracing::info!(index, url, folder = %folder.display(), "downloading");
        let _ = self.events.send(DownloadEvent::Started {
            index,
            folder: folder.clone(),
        });

        let request = DownloadRequest {
            url: url.to_owned(),
            folder,
            format: self.format,
        };
        let mut reporter = ProgressReporter::new(index, self.gate.clone(), self.events.clone());
        self.extractor.download(&request, &mut reporter).await
    }
}

/// Downloads every URL of `job` in order. Failures are reported and skipped;
/// the completion notification is sent once all URLs were attempted.
pub async fn run_job(
    job: Job,
    extractor: &dyn Extractor,
    notifier: &dyn Notifier,
    gate: PauseGate,
    events: UnboundedSender<DownloadEvent>,
) -> JobSummary {
    let (format, first_probe) = choose_format(&job, extractor).await;
    if format.fell_back {
        let message = fallback_message(job.format, &first_probe);
        tracing::info!(requested = %job.format, "using MP4 fallback");
        notifier.notify(TITLE_FORMAT_FALLBACK, &message);
        let _ = events.send(DownloadEvent::FormatFallback {
            requested: job.format,
            message,
        });
    }
    // a failed first probe is retried by the loop
    let mut first_probe = first_probe.ok();

    let worker = Worker {
        job: &job,
        format,
        extractor,
        gate: &gate,
        events: &events,
    };
    let mut summary = JobSummary::default();
    for (index, url) in job.urls.iter().enumerate() {
        let probe = if index == 0 { first_probe.take() } else { None };
        match worker.process_url(index, url, probe).await {
            Ok(()) => {
                summary.succeeded += 1;
                let _ = events.send(DownloadEvent::Finished { index });
            }
            Err(e) => {
                summary.failed += 1;
                tracing::error!(index, url = %url, "download failed: {e}");
                notifier.notify(TITLE_DOWNLOAD_ERROR, &format!("{url}\n{e}"));
                let _ = events.send(DownloadEvent::Failed {
                    index,
                    error: e.to_string(),
                });
            }
        }
    }

    let message = if summary.failed == 0 {
        format!("All {} downloads finished.", summary.succeeded)
    } else {
        format!(
            "{} of {} downloads finished, {} failed.",
            summary.succeeded,
            job.urls.len(),
            summary.failed
        )
    };
    notifier.notify(TITLE_COMPLETE, &message);
    tracing::info!(succeeded = summary.succeeded, failed = summary.failed, "job finished");
    let _ = events.send(DownloadEvent::JobFinished(summary));
    summary
}

/// A job running on the background worker
pub struct JobHandle {
    pub events: UnboundedReceiver<DownloadEvent>,
    pub pause: PauseControl,
}

/// Starts `job` on `runtime` and hands back the UI's side of it.
pub fn spawn_job(
    runtime: &Handle,
    job: Job,
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
) -> JobHandle {
    let (tx, rx) = unbounded_channel();
    let pause = PauseControl::new();
    let gate = pause.gate();
    runtime.spawn(async move {
        run_job(job, extractor.as_ref(), notifier.as_ref(), gate, tx).await
    });
    JobHandle { events: rx, pause }
}
