use tokio::sync::{mpsc::UnboundedSender, watch};

use crate::model::DownloadEvent;

/// Prefix yt-dlp writes in front of every progress line we ask it for.
pub const PROGRESS_PREFIX: &str = "[ytbd]";

/// `--progress-template` value matching [`parse_progress_from_line`].
pub const PROGRESS_TEMPLATE: &str = "download:[ytbd] %(progress.status)s %(progress.downloaded_bytes)s %(progress.total_bytes)s %(info.playlist_index)s %(info.n_entries)s";

/// One progress line emitted by yt-dlp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    pub status: String,
    pub downloaded: Option<u64>,
    pub total: Option<u64>,
    /// 1-based playlist position and playlist length
    pub playlist: Option<(u64, u64)>,
}

impl ProgressLine {
    pub fn is_downloading(&self) -> bool {
        self.status == "downloading"
    }
}

/// yt-dlp prints `NA` for missing fields and sometimes floats for byte counts.
fn parse_count(field: Option<&str>) -> Option<u64> {
    let field = field?;
    if let Ok(v) = field.parse::<u64>() {
        return Some(v);
    }
    match field.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Some(v as u64),
        _ => None,
    }
}

pub fn parse_progress_from_line(line: &str) -> Option<ProgressLine> {
    let rest = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let mut fields = rest.split_whitespace();
    let status = fields.next()?.to_owned();
    let downloaded = parse_count(fields.next());
    let total = parse_count(fields.next());
    let index = parse_count(fields.next());
    let count = parse_count(fields.next());
    let playlist = match (index, count) {
        (Some(i), Some(n)) if i >= 1 && n >= i => Some((i, n)),
        _ => None,
    };
    Some(ProgressLine {
        status,
        downloaded,
        total,
        playlist,
    })
}

/// Integer percentage of `downloaded` over `total`, truncated and capped at 100.
pub fn percent(downloaded: u64, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let pct = (downloaded as u128 * 100 / total as u128).min(100);
    Some(pct as u8)
}

/// Folds an item percentage into a whole-playlist percentage.
pub fn playlist_percent(item_percent: u8, index: u64, count: u64) -> u8 {
    if count == 0 || index == 0 || index > count {
        return item_percent;
    }
    let done = (index - 1) * 100 + item_percent as u64;
    (done / count).min(100) as u8
}

/// Pause switch shared between the UI (writer) and the worker (reader).
#[derive(Clone, Debug)]
pub struct PauseControl {
    tx: watch::Sender<bool>,
}

impl Default for PauseControl {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn pause(&self) {
        self.tx.send_replace(true);
    }

    pub fn resume(&self) {
        self.tx.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn gate(&self) -> PauseGate {
        PauseGate {
            rx: self.tx.subscribe(),
        }
    }
}

/// Worker side of [`PauseControl`].
#[derive(Clone, Debug)]
pub struct PauseGate {
    rx: watch::Receiver<bool>,
}

impl PauseGate {
    /// Returns once the job is not paused. A dropped control counts as resumed.
    pub async fn wait_until_resumed(&mut self) {
        if *self.rx.borrow() {
            tracing::info!("download paused");
            let _ = self.rx.wait_for(|paused| !*paused).await;
            tracing::info!("download resumed");
        }
    }
}

/// Turns byte counts from one URL's download into UI progress events.
pub struct ProgressReporter {
    index: usize,
    last: Option<u8>,
    gate: PauseGate,
    events: UnboundedSender<DownloadEvent>,
}

impl ProgressReporter {
    pub fn new(index: usize, gate: PauseGate, events: UnboundedSender<DownloadEvent>) -> Self {
        Self {
            index,
            last: None,
            gate,
            events,
        }
    }

    /// Handles one parsed yt-dlp progress line. Only `downloading` lines with
    /// both byte counts are reported; this waits while the job is paused.
    pub async fn report(&mut self, line: &ProgressLine) {
        if !line.is_downloading() {
            return;
        }
        let (Some(downloaded), Some(total)) = (line.downloaded, line.total) else {
            return;
        };
        let Some(item) = percent(downloaded, total) else {
            return;
        };
        let pct = match line.playlist {
            Some((index, count)) => playlist_percent(item, index, count),
            None => item,
        };

        self.gate.wait_until_resumed().await;

        // video and audio streams each restart at 0
        if self.last.is_some_and(|last| pct <= last) {
            return;
        }
        self.last = Some(pct);
        let _ = self.events.send(DownloadEvent::Progress {
            index: self.index,
            percent: pct,
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn downloading(downloaded: u64, total: u64) -> ProgressLine {
        ProgressLine {
            status: "downloading".to_owned(),
            downloaded: Some(downloaded),
            total: Some(total),
            playlist: None,
        }
    }

    #[test]
    fn parses_template_line() {
        let line = parse_progress_from_line("[ytbd] downloading 512 2048 3 10").unwrap();
        assert!(line.is_downloading());
        assert_eq!(line.downloaded, Some(512));
        assert_eq!(line.total, Some(2048));
        assert_eq!(line.playlist, Some((3, 10)));
    }

    #[test]
    fn missing_fields_are_none() {
        let line = parse_progress_from_line("[ytbd] downloading 1024.0 NA NA NA").unwrap();
        assert_eq!(line.downloaded, Some(1024));
        assert_eq!(line.total, None);
        assert_eq!(line.playlist, None);
    }

    #[test]
    fn ignores_other_output() {
        assert!(parse_progress_from_line("[download] Destination: a.mp4").is_none());
        assert!(parse_progress_from_line("").is_none());
    }

    #[test]
    fn percent_truncates_and_caps() {
        assert_eq!(percent(1, 3), Some(33));
        assert_eq!(percent(2, 3), Some(66));
        assert_eq!(percent(5000, 4000), Some(100));
        assert_eq!(percent(10, 0), None);
    }

    #[test]
    fn playlist_percent_spreads_items() {
        assert_eq!(playlist_percent(50, 1, 2), 25);
        assert_eq!(playlist_percent(0, 2, 2), 50);
        assert_eq!(playlist_percent(100, 2, 2), 100);
        assert_eq!(playlist_percent(40, 0, 0), 40);
    }

    #[tokio::test]
    async fn reporter_is_monotonic_and_bounded() {
        let (tx, mut rx) = unbounded_channel();
        let pause = PauseControl::new();
        let mut reporter = ProgressReporter::new(4, pause.gate(), tx);

        for (d, t) in [(10, 100), (60, 100), (5, 100), (100, 100), (250, 100)] {
            reporter.report(&downloading(d, t)).await;
        }
        reporter
            .report(&ProgressLine {
                status: "finished".to_owned(),
                ..downloading(0, 100)
            })
            .await;
        drop(reporter);

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            match ev {
                DownloadEvent::Progress { index, percent } => {
                    assert_eq!(index, 4);
                    seen.push(percent);
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(seen, vec![10, 60, 100]);
    }

    #[tokio::test]
    async fn reporter_waits_while_paused() {
        let (tx, mut rx) = unbounded_channel();
        let pause = PauseControl::new();
        pause.pause();
        assert!(pause.is_paused());

        let gate = pause.gate();
        let handle = tokio::spawn(async move {
            let mut reporter = ProgressReporter::new(0, gate, tx);
            reporter.report(&downloading(1, 2)).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        pause.resume();
        handle.await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(DownloadEvent::Progress { index: 0, percent: 50 })
        );
    }
}
