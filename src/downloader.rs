use std::{
    collections::VecDeque,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use rust_embed::RustEmbed;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::Command,
};

use crate::error::DownloadError;
use crate::format::FormatSelection;
use crate::progress::{parse_progress_from_line, ProgressReporter, PROGRESS_TEMPLATE};

/// Environment variable that overrides the yt-dlp executable.
pub const YTDLP_ENV: &str = "YTBD_YTDLP";

const STDERR_TAIL_LINES: usize = 20;

#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Result of a flat (non-downloading) metadata query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeInfo {
    pub title: Option<String>,
    pub is_playlist: bool,
    /// Extensions of the formats the URL offers, in yt-dlp's order
    pub format_exts: Vec<String>,
}

impl ProbeInfo {
    /// Title to use as a subfolder, only for playlists
    pub fn playlist_title(&self) -> Option<&str> {
        if !self.is_playlist {
            return None;
        }
        self.title.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Everything the extractor needs to fetch one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub folder: PathBuf,
    pub format: FormatSelection,
}

impl DownloadRequest {
    /// yt-dlp `-o` value: files are named after each video's own title.
    /// A literal `%` in the folder is doubled so yt-dlp does not expand it.
    pub fn output_template(&self) -> String {
        let folder = self.folder.display().to_string().replace('%', "%%");
        Path::new(&folder).join("%(title)s.%(ext)s").display().to_string()
    }
}

/// The external extraction/download tool.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Flat metadata query: title, playlist flag and format extensions.
    async fn probe(&self, url: &str) -> Result<ProbeInfo, DownloadError>;

    /// Downloads `request.url`, feeding progress into `reporter`.
    async fn download(
        &self,
        request: &DownloadRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<(), DownloadError>;
}

#[derive(Deserialize)]
struct RawProbe {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

#[derive(Deserialize)]
struct RawFormat {
    ext: Option<String>,
}

/// Parses the `-J` output of a flat yt-dlp query.
pub fn parse_probe(json: &[u8]) -> Result<ProbeInfo, DownloadError> {
    let raw: RawProbe = serde_json::from_slice(json)?;
    Ok(ProbeInfo {
        title: raw.title,
        is_playlist: raw.kind.as_deref() == Some("playlist"),
        format_exts: raw.formats.into_iter().filter_map(|f| f.ext).collect(),
    })
}

/// Picks the yt-dlp executable: explicit override, then a bundled copy,
/// then whatever `yt-dlp` resolves to on `PATH`.
pub fn resolve_ytdlp(configured: Option<&Path>) -> PathBuf {
    if let Some(path) = std::env::var_os(YTDLP_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    if let Some(path) = configured {
        return path.to_path_buf();
    }
    let bin = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
    match extract_bundled(bin) {
        Ok(Some(path)) => path,
        Ok(None) => PathBuf::from(bin),
        Err(e) => {
            tracing::warn!("could not unpack bundled yt-dlp: {e}");
            PathBuf::from(bin)
        }
    }
}

fn extract_bundled(bin: &str) -> std::io::Result<Option<PathBuf>> {
    let Some(data) = Asset::get(bin) else {
        return Ok(None);
    };
    let tmp = std::env::temp_dir().join(bin);
    if !tmp.exists() {
        let mut f = File::create(&tmp)?;
        f.write_all(&data.data)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
    }
    Ok(Some(tmp))
}

/// [`Extractor`] backed by the yt-dlp command line program
#[derive(Debug, Clone)]
pub struct YtDlp {
    bin: PathBuf,
}

impl YtDlp {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.bin);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> DownloadError {
        DownloadError::Spawn {
            path: self.bin.clone(),
            source,
        }
    }
}

fn download_args(request: &DownloadRequest) -> Vec<String> {
    vec![
        "--newline".to_owned(),
        "--progress-template".to_owned(),
        PROGRESS_TEMPLATE.to_owned(),
        "-f".to_owned(),
        request.format.expression().to_owned(),
        "--merge-output-format".to_owned(),
        request.format.container.extension().to_owned(),
        "-o".to_owned(),
        request.output_template(),
        request.url.clone(),
    ]
}

/// Picks the most useful part of yt-dlp's stderr for a user-facing message.
fn summarize_stderr(lines: &[String]) -> String {
    lines
        .iter()
        .rev()
        .find(|l| l.contains("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim().to_owned())
        .unwrap_or_else(|| "no error output".to_owned())
}

async fn collect_stderr<R: AsyncRead + Unpin>(stderr: R) -> Vec<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "yt-dlp", "{line}");
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

#[async_trait]
impl Extractor for YtDlp {
    async fn probe(&self, url: &str) -> Result<ProbeInfo, DownloadError> {
        tracing::debug!(url, "probing");
        let output = self
            .command()
            .args(["--flat-playlist", "-J", "--no-warnings", url])
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr: Vec<String> = String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_owned)
                .collect();
            return Err(DownloadError::Process {
                status: output.status.to_string(),
                stderr: summarize_stderr(&stderr),
            });
        }
        parse_probe(&output.stdout)
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        reporter: &mut ProgressReporter,
    ) -> Result<(), DownloadError> {
        let mut child = self
            .command()
            .args(download_args(request))
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Other("yt-dlp stdout unavailable".to_owned()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Other("yt-dlp stderr unavailable".to_owned()))?;
        let stderr_task = tokio::spawn(collect_stderr(stderr));

        // While the reporter waits on pause, stdout is not drained and yt-dlp
        // eventually blocks on a full pipe.
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match parse_progress_from_line(&line) {
                Some(progress) => reporter.report(&progress).await,
                None => tracing::debug!(target: "yt-dlp", "{line}"),
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(DownloadError::Process {
                status: status.to_string(),
                stderr: summarize_stderr(&stderr),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{select_format, ContainerFormat};

    #[test]
    fn parses_single_video_probe() {
        let json = br#"{"_type":"video","title":"Clip","formats":[{"ext":"webm"},{"ext":"mp4"},{"format_id":"sb0"}]}"#;
        let info = parse_probe(json).unwrap();
        assert!(!info.is_playlist);
        assert_eq!(info.title.as_deref(), Some("Clip"));
        assert_eq!(info.format_exts, vec!["webm", "mp4"]);
        assert_eq!(info.playlist_title(), None);
    }

    #[test]
    fn parses_playlist_probe_without_formats() {
        let json = br#"{"_type":"playlist","title":"My Mix","entries":[{"url":"x"}]}"#;
        let info = parse_probe(json).unwrap();
        assert!(info.is_playlist);
        assert_eq!(info.playlist_title(), Some("My Mix"));
        assert!(info.format_exts.is_empty());
    }

    #[test]
    fn blank_playlist_title_is_ignored() {
        let info = ProbeInfo {
            title: Some("   ".to_owned()),
            is_playlist: true,
            format_exts: Vec::new(),
        };
        assert_eq!(info.playlist_title(), None);
    }

    #[test]
    fn rejects_invalid_probe_json() {
        assert!(matches!(
            parse_probe(b"not json"),
            Err(DownloadError::InvalidProbe(_))
        ));
    }

    #[test]
    fn download_args_carry_format_and_template() {
        let req = DownloadRequest {
            url: "https://v.example/watch?v=1".to_owned(),
            folder: PathBuf::from("out").join("My Mix"),
            format: select_format(ContainerFormat::Mkv, &["mkv"]),
        };
        let args = download_args(&req);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-f") + 1], ContainerFormat::Mkv.expression());
        assert_eq!(args[pos("--merge-output-format") + 1], "mkv");
        assert_eq!(
            args[pos("-o") + 1],
            PathBuf::from("out").join("My Mix").join("%(title)s.%(ext)s").display().to_string()
        );
        assert_eq!(args.last().unwrap(), "https://v.example/watch?v=1");
    }

    #[test]
    fn percent_in_folder_is_escaped_in_template() {
        let req = DownloadRequest {
            url: "https://v.example/list".to_owned(),
            folder: PathBuf::from("/out").join("100% Hits"),
            format: select_format(ContainerFormat::Mp4, &["mp4"]),
        };
        let template = req.output_template();
        assert!(template.contains("100%% Hits"));
        assert!(template.ends_with("%(title)s.%(ext)s"));
        assert!(!template.contains("100% Hits"));
    }

    #[test]
    fn stderr_summary_prefers_error_lines() {
        let lines = vec![
            "[youtube] abc: Downloading webpage".to_owned(),
            "ERROR: [youtube] abc: Video unavailable".to_owned(),
            "some trailing noise".to_owned(),
        ];
        assert_eq!(summarize_stderr(&lines), "ERROR: [youtube] abc: Video unavailable");
        assert_eq!(summarize_stderr(&[]), "no error output");
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let ytdlp = YtDlp::new("/definitely/not/here/yt-dlp");
        let err = ytdlp.probe("https://v.example/1").await.unwrap_err();
        assert!(matches!(err, DownloadError::Spawn { .. }));
    }
}
