use log::info;

/// Fire-and-forget notification sink. Implementations must return quickly
/// and never fail the caller; anything slow belongs on the implementor's own
/// task.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Default sink for headless use: notifications go to the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!("{title}: {body}");
    }
}
