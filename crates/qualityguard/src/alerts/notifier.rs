//! Side effects triggered when alerts enter the feed.

use std::io::Write;

use tracing::{debug, warn};

use crate::config::AlertConfig;
use crate::error::{Error, Result};

/// Title used for desktop notifications.
const NOTIFICATION_TITLE: &str = "QualityGuard - Alert";

/// Whether the host allows visual notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    /// Notifications may be shown.
    Granted,
    /// Notifications must not be shown.
    Denied,
}

/// Audible and visual alert side effects.
///
/// Both are best-effort. The feed logs and swallows any error returned here.
pub trait Notifier: Send + Sync + std::fmt::Debug {
    /// Play the audible alert.
    ///
    /// # Errors
    ///
    /// Returns an error if the sound cannot be played.
    fn play_sound(&self) -> Result<()>;

    /// Current permission for visual notifications.
    fn permission(&self) -> NotificationPermission;

    /// Show a system notification with the given body.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be shown.
    fn show(&self, body: &str) -> Result<()>;
}

/// Notifier that does nothing. Used for headless commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn play_sound(&self) -> Result<()> {
        Ok(())
    }

    fn permission(&self) -> NotificationPermission {
        NotificationPermission::Denied
    }

    fn show(&self, _body: &str) -> Result<()> {
        Ok(())
    }
}

/// Terminal bell plus freedesktop/macOS notifications.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    sound_enabled: bool,
    permission: NotificationPermission,
}

impl DesktopNotifier {
    /// Build a notifier from the alert configuration.
    #[must_use]
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            sound_enabled: config.sound_enabled,
            permission: if config.desktop_notifications {
                NotificationPermission::Granted
            } else {
                NotificationPermission::Denied
            },
        }
    }
}

impl Notifier for DesktopNotifier {
    fn play_sound(&self) -> Result<()> {
        if !self.sound_enabled {
            return Ok(());
        }
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }

    fn permission(&self) -> NotificationPermission {
        self.permission
    }

    fn show(&self, body: &str) -> Result<()> {
        debug!("Showing desktop notification");
        let mut notification = notify_rust::Notification::new();
        notification.summary(NOTIFICATION_TITLE).body(body);
        show_off_runtime(move || {
            notification
                .show()
                .map(|_| ())
                .map_err(|e| Error::internal(format!("desktop notification failed: {e}")))
        })
    }
}

/// Run a blocking notification call without stalling the async runtime.
///
/// Inside a runtime the call moves to the blocking pool and its failure is
/// only logged. Outside one it runs inline and its result is returned.
fn show_off_runtime<F>(show: F) -> Result<()>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || {
                if let Err(e) = show() {
                    warn!("Failed to show notification: {}", e);
                }
            });
            Ok(())
        }
        Err(_) => show(),
    }
}
