//! User configuration, read once at startup from `config.json` in the
//! platform config directory. Every field is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::format::ContainerFormat;

/// A labelled button that opens a fixed URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// yt-dlp executable; bundled copy or `PATH` when unset
    pub ytdlp_path: Option<PathBuf>,
    /// Folder preselected in the UI
    pub default_folder: Option<PathBuf>,
    pub default_format: ContainerFormat,
    pub links: Vec<Link>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            default_folder: UserDirs::new().and_then(|u| u.download_dir().map(Path::to_path_buf)),
            default_format: ContainerFormat::Mp4,
            links: vec![
                Link {
                    label: "yt-dlp".to_owned(),
                    url: "https://github.com/yt-dlp/yt-dlp".to_owned(),
                },
                Link {
                    label: "Supported sites".to_owned(),
                    url: "https://github.com/yt-dlp/yt-dlp/blob/master/supportedsites.md".to_owned(),
                },
            ],
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "yt-batch-downloader").map(|d| d.config_dir().join("config.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Loads the user's config, falling back to defaults when it is absent
    /// or broken.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config");
                config
            }
            Err(e) => {
                tracing::warn!("ignoring config: {e:#}");
                Self::default()
            }
        }
    }

    pub fn default_folder_string(&self) -> String {
        self.default_folder
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }
}
