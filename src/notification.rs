//! User-facing notification dispatch.
//!
//! Terminal conversion failures surface exactly one human-readable
//! notification; cancellation never notifies.

const APP_NAME: &str = "mediamask";

pub trait Notifier: Send + Sync {
    fn notify(&self, body: &str);
}

/// Desktop notification backend. Delivery failures are logged, never fatal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, body: &str) {
        if let Err(err) = notify_rust::Notification::new()
            .appname(APP_NAME)
            .summary(APP_NAME)
            .body(body)
            .show()
        {
            tracing::warn!("system notification failed: {err}");
        }
    }
}
