//! Best-effort user-facing side effects of ingestion.
//!
//! Desktop notifications and sounds are host capabilities, abstracted as
//! [`NotifierSink`] and [`SoundSink`]. [`SideEffects`] bundles one of each and
//! fires them for every ingested notification. Failures are logged at debug
//! level and dropped; they never reach the caller.
//!
//! # Implementations
//!
//! - [`NoopNotifier`] / [`NoopSound`] - headless use and tests
//! - [`terminal::TerminalNotifier`] / [`terminal::TerminalBell`] - the CLI
//!
//! Inside a tokio runtime the sinks run on the blocking pool, detached from
//! the ingestion path. A slow or panicking sink delays or loses only its own
//! effect.

// Rust guideline compliant 2026-02

pub mod terminal;

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::NOTIFICATION_SOUND_VOLUME;
use crate::notification::Notification;

pub use terminal::{TerminalBell, TerminalNotifier};

/// Desktop notification permission, as decided by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// Not yet asked.
    #[default]
    Default,
    /// User allowed notifications.
    Granted,
    /// User refused notifications.
    Denied,
}

impl PermissionState {
    /// Whether the user has made a decision.
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::Default)
    }

    /// Wire/config name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(format!(
                "unknown permission '{other}' (expected default, granted or denied)"
            )),
        }
    }
}

/// Errors from side-effect sinks. Always swallowed by ingestion.
#[derive(Debug)]
pub enum SideEffectError {
    /// The user has not granted permission.
    PermissionDenied,
    /// The capability is not available on this host.
    Unavailable(String),
    /// Writing to the host failed.
    Io(std::io::Error),
}

impl std::fmt::Display for SideEffectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "Permission denied"),
            Self::Unavailable(what) => write!(f, "Unavailable: {what}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for SideEffectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SideEffectError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Desktop notification capability.
pub trait NotifierSink: Send + Sync + std::fmt::Debug {
    /// Current permission, without prompting.
    fn permission(&self) -> PermissionState;

    /// Ask the user for permission and return the outcome.
    fn request_permission(&self) -> PermissionState;

    /// Display a notification.
    fn show(&self, notification: &Notification) -> Result<(), SideEffectError>;
}

/// Notification sound capability.
pub trait SoundSink: Send + Sync + std::fmt::Debug {
    /// Play the notification sound at `volume` (0.0 - 1.0).
    fn play(&self, volume: f32) -> Result<(), SideEffectError>;
}

/// Notifier that never displays anything. Reports `Denied` so no prompt is
/// ever issued.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl NotifierSink for NoopNotifier {
    fn permission(&self) -> PermissionState {
        PermissionState::Denied
    }

    fn request_permission(&self) -> PermissionState {
        PermissionState::Denied
    }

    fn show(&self, _notification: &Notification) -> Result<(), SideEffectError> {
        Ok(())
    }
}

/// Silent sound sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSound;

impl SoundSink for NoopSound {
    fn play(&self, _volume: f32) -> Result<(), SideEffectError> {
        Ok(())
    }
}

/// The pair of sinks fired for each ingested notification.
#[derive(Debug, Clone)]
pub struct SideEffects {
    notifier: Arc<dyn NotifierSink>,
    sound: Arc<dyn SoundSink>,
}

impl Default for SideEffects {
    fn default() -> Self {
        Self::noop()
    }
}

impl SideEffects {
    /// Bundle a notifier and a sound sink.
    pub fn new(notifier: Arc<dyn NotifierSink>, sound: Arc<dyn SoundSink>) -> Self {
        Self { notifier, sound }
    }

    /// Side effects that do nothing.
    pub fn noop() -> Self {
        Self::new(Arc::new(NoopNotifier), Arc::new(NoopSound))
    }

    /// Current desktop notification permission.
    pub fn permission(&self) -> PermissionState {
        self.notifier.permission()
    }

    /// Request permission if the user has not decided yet.
    ///
    /// Once a decision exists it is returned as-is and the user is not asked
    /// again.
    pub fn request_permission_once(&self) -> PermissionState {
        let current = self.notifier.permission();
        if current.is_decided() {
            return current;
        }
        let decided = self.notifier.request_permission();
        log::info!("Desktop notification permission: {}", decided);
        decided
    }

    /// Request permission off the async workers.
    ///
    /// The prompt may block on the terminal, so it runs on the blocking pool.
    pub async fn prompt_permission(&self) -> PermissionState {
        let current = self.notifier.permission();
        if current.is_decided() {
            return current;
        }
        let effects = self.clone();
        match tokio::task::spawn_blocking(move || effects.request_permission_once()).await {
            Ok(decided) => decided,
            Err(e) => {
                log::warn!("Permission prompt failed: {}", e);
                self.notifier.permission()
            }
        }
    }

    /// Fire the desktop notification (if permitted) and the sound.
    ///
    /// Returns immediately. Sink errors and panics are logged and dropped.
    pub fn fire(&self, notification: &Notification) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let effects = self.clone();
                let notification = notification.clone();
                handle.spawn(async move {
                    let id = notification.id.clone();
                    let task = tokio::task::spawn_blocking(move || effects.fire_now(&notification));
                    if let Err(e) = task.await {
                        log::warn!("Side effects for {} aborted: {}", id, e);
                    }
                });
            }
            Err(_) => {
                let outcome =
                    std::panic::catch_unwind(AssertUnwindSafe(|| self.fire_now(notification)));
                if outcome.is_err() {
                    log::warn!("Side effects for {} panicked", notification.id);
                }
            }
        }
    }

    fn fire_now(&self, notification: &Notification) {
        if self.notifier.permission() == PermissionState::Granted {
            if let Err(e) = self.notifier.show(notification) {
                log::debug!("Desktop notification for {} skipped: {}", notification.id, e);
            }
        }
        if let Err(e) = self.sound.play(NOTIFICATION_SOUND_VOLUME) {
            log::debug!("Notification sound for {} skipped: {}", notification.id, e);
        }
    }
}
