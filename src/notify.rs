use notify_rust::Notification;

/// Fire-and-forget user notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);
}

/// Desktop notifications through the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(title, message, "notification");
        let app_name = self.app_name.clone();
        let title = title.to_owned();
        let message = message.to_owned();
        // Some backends block on a D-Bus round trip.
        std::thread::spawn(move || {
            if let Err(e) = Notification::new()
                .appname(&app_name)
                .summary(&title)
                .body(&message)
                .show()
            {
                tracing::warn!("desktop notification failed: {e}");
            }
        });
    }
}
