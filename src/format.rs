use std::fmt;

use serde::{Deserialize, Serialize};

const MP4_EXPRESSION: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/mp4";
const MKV_EXPRESSION: &str = "bestvideo[ext=mkv]+bestaudio[ext=m4a]/mkv";

/// Output containers offered in the format selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Mp4,
    Mkv,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 2] = [ContainerFormat::Mp4, ContainerFormat::Mkv];

    /// File extension as yt-dlp reports it
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Mkv => "mkv",
        }
    }

    /// yt-dlp `-f` selector: best video and audio muxed into this container
    pub fn expression(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => MP4_EXPRESSION,
            ContainerFormat::Mkv => MKV_EXPRESSION,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerFormat::Mp4 => f.write_str("MP4"),
            ContainerFormat::Mkv => f.write_str("MKV"),
        }
    }
}

/// The container a job actually downloads into
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatSelection {
    pub container: ContainerFormat,
    /// True when the requested container was unavailable
    pub fell_back: bool,
}

impl FormatSelection {
    pub fn expression(&self) -> &'static str {
        self.container.expression()
    }
}

/// Picks the requested container if `available` lists its extension,
/// otherwise falls back to MP4.
pub fn select_format<S: AsRef<str>>(requested: ContainerFormat, available: &[S]) -> FormatSelection {
    let wanted = requested.extension();
    if available.iter().any(|ext| ext.as_ref().eq_ignore_ascii_case(wanted)) {
        FormatSelection {
            container: requested,
            fell_back: false,
        }
    } else {
        FormatSelection {
            container: ContainerFormat::Mp4,
            fell_back: true,
        }
    }
}
