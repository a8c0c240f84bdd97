use std::ffi::OsStr;

/// Opens a URL or folder with the system's default handler, off the UI thread.
pub fn open_external(target: impl AsRef<OsStr>) {
    let target = target.as_ref().to_os_string();
    std::thread::spawn(move || {
        #[cfg(target_os = "windows")]
        let result = std::process::Command::new("explorer").arg(&target).spawn();
        #[cfg(target_os = "macos")]
        let result = std::process::Command::new("open").arg(&target).spawn();
        #[cfg(all(unix, not(target_os = "macos")))]
        let result = std::process::Command::new("xdg-open").arg(&target).spawn();

        if let Err(e) = result {
            tracing::warn!(path = ?target, "could not open: {e}");
        }
    });
}
