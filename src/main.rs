//! Batch video downloader GUI driving yt-dlp

// yt-dlp process wrapper and the extractor seam
mod downloader;
// Error types
mod error;
// Container choice and yt-dlp format expressions
mod format;
// Opening links and folders
mod links;
// Data models for jobs, tasks and worker events
mod model;
// Desktop notifications
mod notify;
// Sequential download loop
mod orchestrator;
// Progress parsing, percentages and pause handling
mod progress;
// User configuration
mod config;

use std::sync::Arc;

use anyhow::anyhow;
use eframe::{egui, App, Frame};
use egui::Visuals;
use once_cell::sync::OnceCell;
use rfd::FileDialog;
use tokio::{runtime::Runtime, sync::mpsc::error::TryRecvError};
use tracing_subscriber::EnvFilter;

use config::{AppConfig, Link};
use downloader::{resolve_ytdlp, Extractor, YtDlp};
use format::ContainerFormat;
use model::{DownloadEvent, DownloadStatus, DownloadTask, Job};
use notify::{DesktopNotifier, Notifier};
use orchestrator::{spawn_job, JobHandle};

const APP_NAME: &str = "Batch Video Downloader";
const TITLE_MISSING_INPUT: &str = "Missing input";

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Runtime> = OnceCell::new();

/// Program entry point: initializes logging, runtime and launches GUI
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("yt_batch_downloader=info")),
        )
        .init();

    let rt = Runtime::new()?;
    RUNTIME
        .set(rt)
        .map_err(|_| anyhow!("runtime already initialized"))?;

    let config = AppConfig::load();
    let ytdlp = resolve_ytdlp(config.ytdlp_path.as_deref());
    tracing::info!(ytdlp = %ytdlp.display(), "starting");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([900.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native(
        APP_NAME,
        options,
        Box::new(move |cc| {
            // Use dark theme visuals
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(MyApp::new(
                config,
                Arc::new(YtDlp::new(ytdlp)),
                Arc::new(DesktopNotifier::new(APP_NAME)),
            ))
        }),
    )
    .map_err(|e| anyhow!("GUI failed: {e}"))
}

/// Application state for the GUI
struct MyApp {
    /// Pasted URLs, one per line
    url_input: String,
    /// Destination root folder, only set through the folder picker
    download_folder: String,
    selected_format: ContainerFormat,
    /// One entry per URL of the current or last job
    tasks: Vec<DownloadTask>,
    /// Index of the URL being downloaded
    current: Option<usize>,
    /// Worker state while a job runs
    job: Option<JobHandle>,
    /// Job-level message, such as a format fallback
    notice: Option<String>,
    extractor: Arc<dyn Extractor>,
    notifier: Arc<dyn Notifier>,
    links: Vec<Link>,
}

impl MyApp {
    fn new(config: AppConfig, extractor: Arc<dyn Extractor>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            url_input: String::new(),
            download_folder: config.default_folder_string(),
            selected_format: config.default_format,
            tasks: Vec::new(),
            current: None,
            job: None,
            notice: None,
            extractor,
            notifier,
            links: config.links,
        }
    }

    fn is_running(&self) -> bool {
        self.job.is_some()
    }

    fn is_paused(&self) -> bool {
        self.job.as_ref().is_some_and(|j| j.pause.is_paused())
    }

    fn start_download(&mut self) {
        let job = match Job::from_input(&self.url_input, &self.download_folder, self.selected_format) {
            Ok(job) => job,
            Err(e) => {
                self.notifier.notify(TITLE_MISSING_INPUT, &e.to_string());
                return;
            }
        };
        let Some(rt) = RUNTIME.get() else {
            tracing::error!("runtime not initialized");
            return;
        };

        tracing::info!(urls = job.urls.len(), root = %job.root.display(), format = %job.format, "starting job");
        self.tasks = job.urls.iter().map(|u| DownloadTask::queued(u.as_str())).collect();
        self.current = None;
        self.notice = None;
        self.job = Some(spawn_job(
            rt.handle(),
            job,
            Arc::clone(&self.extractor),
            Arc::clone(&self.notifier),
        ));
    }

    /// Drains worker events into the task list.
    fn poll_events(&mut self) {
        let Some(job) = self.job.as_mut() else {
            return;
        };
        let mut finished = false;
        loop {
            let event = match job.events.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            };
            match event {
                DownloadEvent::FormatFallback { requested, message } => {
                    tracing::debug!(%requested, "format fallback");
                    self.notice = Some(message);
                }
                DownloadEvent::Started { index, folder } => {
                    self.current = Some(index);
                    if let Some(task) = self.tasks.get_mut(index) {
                        task.status = DownloadStatus::Downloading;
                        task.folder = Some(folder);
                    }
                }
                DownloadEvent::Progress { index, percent } => {
                    if let Some(task) = self.tasks.get_mut(index) {
                        task.progress = f32::from(percent) / 100.0;
                    }
                }
                DownloadEvent::Finished { index } => {
                    if let Some(task) = self.tasks.get_mut(index) {
                        task.status = DownloadStatus::Done;
                        task.progress = 1.0;
                    }
                }
                DownloadEvent::Failed { index, error } => {
                    self.current = Some(index);
                    if let Some(task) = self.tasks.get_mut(index) {
                        task.status = DownloadStatus::Failed(error);
                    }
                }
                DownloadEvent::JobFinished(summary) => {
                    tracing::debug!(?summary, "worker finished");
                    finished = true;
                }
            }
        }
        if finished {
            self.job = None;
        }
    }

    fn current_progress(&self) -> f32 {
        self.current
            .and_then(|i| self.tasks.get(i))
            .map(|t| t.progress)
            .unwrap_or(0.0)
    }

    fn tasks_panel(&self, ui: &mut egui::Ui) {
        ui.heading("Downloads");
        ui.separator();

        egui::ScrollArea::vertical()
            .auto_shrink([false; 2])
            .show(ui, |ui| {
                for task in &self.tasks {
                    let status_text = match &task.status {
                        DownloadStatus::Queued => "⏳ Queued".to_owned(),
                        DownloadStatus::Downloading => "⬇️ Downloading".to_owned(),
                        DownloadStatus::Done => "✅ Done".to_owned(),
                        DownloadStatus::Failed(e) => format!("❌ Failed: {e}"),
                    };
                    ui.group(|ui| {
                        ui.label(&task.url);
                        ui.label(status_text);
                        ui.add(egui::ProgressBar::new(task.progress).show_percentage());
                        if let (DownloadStatus::Done, Some(folder)) = (&task.status, &task.folder) {
                            if ui.button("Open Folder").clicked() {
                                links::open_external(folder);
                            }
                        }
                    });
                }
            });
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for MyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.poll_events();

        egui::SidePanel::right("downloads_panel")
            .min_width(280.0)
            .show(ctx, |ui| self.tasks_panel(ui));

        let running = self.is_running();
        let paused = self.is_paused();
        let mut start_clicked = false;
        let mut pause_clicked = false;
        let mut resume_clicked = false;

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Video Downloader");

            ui.label("Video URLs (one per line):");
            ui.add(
                egui::TextEdit::multiline(&mut self.url_input)
                    .hint_text("Paste video URLs here...")
                    .desired_rows(8)
                    .desired_width(f32::INFINITY),
            );

            ui.horizontal(|ui| {
                ui.label("Download folder:");
                ui.add(egui::TextEdit::singleline(&mut self.download_folder.as_str()));
                if ui.button("Browse…").clicked() {
                    let mut dialog = FileDialog::new();
                    if !self.download_folder.is_empty() {
                        dialog = dialog.set_directory(&self.download_folder);
                    }
                    if let Some(folder) = dialog.pick_folder() {
                        self.download_folder = folder.display().to_string();
                    }
                }
            });

            ui.horizontal(|ui| {
                ui.label("Video format:");
                egui::ComboBox::from_id_source("format")
                    .selected_text(self.selected_format.to_string())
                    .show_ui(ui, |ui| {
                        for f in ContainerFormat::ALL {
                            ui.selectable_value(&mut self.selected_format, f, f.to_string());
                        }
                    });
            });

            ui.add(egui::ProgressBar::new(self.current_progress()).show_percentage());

            ui.horizontal(|ui| {
                start_clicked = ui
                    .add_enabled(!running, egui::Button::new("Start Download"))
                    .clicked();
                pause_clicked = ui
                    .add_enabled(running && !paused, egui::Button::new("Pause"))
                    .clicked();
                resume_clicked = ui
                    .add_enabled(running && paused, egui::Button::new("Resume"))
                    .clicked();
            });
            if paused {
                ui.label("Paused");
            }
            if let Some(notice) = &self.notice {
                ui.colored_label(egui::Color32::YELLOW, notice);
            }

            ui.separator();
            ui.horizontal(|ui| {
                for link in &self.links {
                    if ui.button(&link.label).clicked() {
                        links::open_external(&link.url);
                    }
                }
            });
        });

        if start_clicked {
            self.start_download();
        }
        if let Some(job) = &self.job {
            if pause_clicked {
                job.pause.pause();
            }
            if resume_clicked {
                job.pause.resume();
            }
        }

        // Request periodic repaint for progress updates
        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
