//! Notification presentation boundary.
//!
//! The core decides *when* to notify; how a toast, OS notification or tone is
//! rendered belongs to the embedding application.  Every call is best effort:
//! callers log failures and move on.

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("Notification permission denied")]
    PermissionDenied,

    #[error("Audio playback blocked: {0}")]
    Playback(String),

    #[error("Notification backend unavailable: {0}")]
    Unavailable(String),
}

pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError>;

    fn play_tone(&self) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.  Used by the terminal client and as the
/// default when no platform backend is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        info!(title, body, "notification");
        Ok(())
    }

    fn play_tone(&self) -> Result<(), NotifyError> {
        debug!("notification tone");
        Ok(())
    }
}
