#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Error,
}

impl ToastLevel {
    pub fn class(self) -> &'static str {
        match self {
            ToastLevel::Info => "toast toast-info",
            ToastLevel::Success => "toast toast-success",
            ToastLevel::Error => "toast toast-error",
        }
    }
}

/// Sink for user-visible notifications.
pub trait Notifier {
    fn notify(&self, level: ToastLevel, message: String);
}

#[cfg(test)]
pub use recording::RecordingNotifier;
