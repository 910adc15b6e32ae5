//! Terminal-hosted side effects.
//!
//! Desktop notifications are raised through the OSC 777 escape sequence
//! (`ESC ] 777 ; notify ; title ; body BEL`), which terminal emulators such as
//! rxvt-unicode, foot, WezTerm and kitty forward to the desktop. The sound is
//! the terminal bell.
//!
//! Both write to stderr so stdout stays usable for piping.

use std::io::Write;
use std::sync::Mutex;

use super::{NotifierSink, PermissionState, SideEffectError, SoundSink};
use crate::notification::Notification;

/// Desktop notifier that emits OSC 777 to the controlling terminal.
#[derive(Debug)]
pub struct TerminalNotifier {
    permission: Mutex<PermissionState>,
    interactive: bool,
}

impl TerminalNotifier {
    /// Create a notifier with a previously persisted permission.
    ///
    /// The permission prompt is only shown when stdin and stderr are both
    /// terminals.
    pub fn new(permission: PermissionState) -> Self {
        Self {
            permission: Mutex::new(permission),
            interactive: atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stderr),
        }
    }

    fn set_permission(&self, state: PermissionState) {
        if let Ok(mut guard) = self.permission.lock() {
            *guard = state;
        }
    }
}

impl NotifierSink for TerminalNotifier {
    fn permission(&self) -> PermissionState {
        self.permission
            .lock()
            .map(|guard| *guard)
            .unwrap_or(PermissionState::Denied)
    }

    fn request_permission(&self) -> PermissionState {
        if !self.interactive {
            // Leave undecided so an interactive session can still ask.
            return self.permission();
        }

        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "Show desktop notifications for new activity? [y/N] ");
        let _ = stderr.flush();

        let mut answer = String::new();
        let decided = match std::io::stdin().read_line(&mut answer) {
            Ok(_) if is_yes(&answer) => PermissionState::Granted,
            Ok(_) => PermissionState::Denied,
            Err(e) => {
                log::debug!("Permission prompt failed: {}", e);
                return self.permission();
            }
        };
        self.set_permission(decided);
        decided
    }

    fn show(&self, notification: &Notification) -> Result<(), SideEffectError> {
        if !atty::is(atty::Stream::Stderr) {
            return Err(SideEffectError::Unavailable("stderr is not a terminal".into()));
        }
        let mut stderr = std::io::stderr();
        stderr.write_all(osc777(&notification.title, &notification.message).as_bytes())?;
        stderr.flush()?;
        Ok(())
    }
}

/// Notification "sound" played as a terminal bell.
///
/// Terminals have no volume control for the bell; any positive volume rings
/// it and zero keeps quiet.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl SoundSink for TerminalBell {
    fn play(&self, volume: f32) -> Result<(), SideEffectError> {
        if volume <= 0.0 {
            return Ok(());
        }
        if !atty::is(atty::Stream::Stderr) {
            return Err(SideEffectError::Unavailable("stderr is not a terminal".into()));
        }
        let mut stderr = std::io::stderr();
        stderr.write_all(b"\x07")?;
        stderr.flush()?;
        Ok(())
    }
}

/// Encode an OSC 777 desktop notification.
pub fn osc777(title: &str, body: &str) -> String {
    format!(
        "\x1b]777;notify;{};{}\x07",
        sanitize(title).replace(';', ","),
        sanitize(body)
    )
}

/// Strip control characters so payload text cannot terminate the escape.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
