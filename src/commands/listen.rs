//! Interactive feed: the terminal "UI" of the notification center.
//!
//! Connects as the given identity, prints every new notification and every
//! connection change, and reads commands from stdin:
//!
//! ```text
//! read <id>                       mark one notification read
//! read-all                        mark everything read
//! rm <id>                         delete one notification
//! clear                           delete everything
//! list                            print the feed
//! login <user> <role> [biz...]    switch identity
//! logout                          drop the session
//! test                            inject a local notification
//! quit                            exit
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::center::{FeedSnapshot, NotificationCenter};
use crate::config::Config;
use crate::effects::{
    NoopNotifier, NoopSound, NotifierSink, SideEffects, SoundSink, TerminalBell, TerminalNotifier,
};
use crate::identity::Identity;
use crate::notification::{Notification, Priority};
use crate::store::StoreSnapshot;

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// `read <id>`
    Read(String),
    /// `read-all`
    ReadAll,
    /// `rm <id>`
    Remove(String),
    /// `clear`
    Clear,
    /// `list`
    List,
    /// `login <user> <role> [business...]`
    Login(Identity),
    /// `logout`
    Logout,
    /// `test`
    Test,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Parse a command line. Blank lines yield `Ok(None)`.
pub fn parse_input(line: &str) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(None);
    };

    let input = match command {
        "read" => Input::Read(words.next().ok_or("usage: read <id>")?.to_string()),
        "read-all" => Input::ReadAll,
        "rm" | "remove" => Input::Remove(words.next().ok_or("usage: rm <id>")?.to_string()),
        "clear" => Input::Clear,
        "list" | "ls" => Input::List,
        "login" => {
            let usage = "usage: login <user> <role> [business...]";
            let user = words.next().ok_or(usage)?;
            let role = words.next().ok_or(usage)?;
            Input::Login(Identity::new(user, role).with_business_ids(words))
        }
        "logout" => Input::Logout,
        "test" => Input::Test,
        "help" | "?" => Input::Help,
        "quit" | "exit" | "q" => Input::Quit,
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(input))
}

/// One-line rendering of a notification.
pub fn render_notification(notification: &Notification) -> String {
    let marker = if notification.read { ' ' } else { '*' };
    let priority = match notification.priority {
        Some(Priority::High) => " [high]",
        Some(Priority::Medium) => " [medium]",
        Some(Priority::Low) => " [low]",
        None => "",
    };
    format!(
        "{marker} {} {}{priority} {}: {} ({})",
        notification.timestamp.format("%Y-%m-%d %H:%M"),
        notification.kind,
        notification.title,
        notification.message,
        notification.id,
    )
}

/// Multi-line rendering of the whole feed.
pub fn render_feed(feed: &FeedSnapshot) -> String {
    let mut out = format!(
        "{} notification(s), {} unread, {}\n",
        feed.notifications.len(),
        feed.unread_count,
        feed.connection_state
    );
    for notification in feed.notifications.iter() {
        out.push_str(&render_notification(notification));
        out.push('\n');
    }
    out
}

const HELP: &str = "commands: read <id> | read-all | rm <id> | clear | list | \
                    login <user> <role> [business...] | logout | test | quit";

/// Side effects configured for the terminal.
pub fn terminal_effects(config: &Config) -> SideEffects {
    let notifier: Arc<dyn NotifierSink> = if config.desktop_enabled {
        Arc::new(TerminalNotifier::new(config.notification_permission))
    } else {
        Arc::new(NoopNotifier)
    };
    let sound: Arc<dyn SoundSink> = if config.sound_enabled {
        Arc::new(TerminalBell)
    } else {
        Arc::new(NoopSound)
    };
    SideEffects::new(notifier, sound)
}

/// Tracks which notifications were already printed.
#[derive(Debug, Default)]
struct Printed {
    generation: u64,
    ids: HashSet<String>,
}

impl Printed {
    /// Notifications in `snapshot` not printed yet, oldest first.
    fn fresh<'a>(&mut self, snapshot: &'a StoreSnapshot) -> Vec<&'a Notification> {
        if snapshot.generation() != self.generation {
            self.generation = snapshot.generation();
            self.ids.clear();
        }
        let fresh: Vec<_> = snapshot
            .notifications()
            .iter()
            .rev()
            .filter(|n| !self.ids.contains(&n.id))
            .collect();
        self.ids.extend(fresh.iter().map(|n| n.id.clone()));
        // Forget ids that were removed or evicted.
        self.ids.retain(|id| snapshot.contains(id));
        fresh
    }
}

/// Run the interactive feed until `quit`, Ctrl-C or shutdown.
pub async fn run(config: Config, identity: Identity, shutdown: CancellationToken) -> Result<()> {
    let center = NotificationCenter::from_config(&config, terminal_effects(&config)).await;
    persist_permission(&config, &center);

    let mut feed = center.subscribe();
    let mut connection = center.watch_connection();
    let mut printed = Printed::default();

    println!("Connecting to {} as {}", config.server_url, identity);
    center.set_identity(Some(identity)).await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_line(&center, &line).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        log::debug!("stdin closed, still listening");
                        stdin_open = false;
                    }
                    Err(e) => {
                        log::warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }

            changed = feed.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = feed.borrow_and_update().clone();
                for notification in printed.fresh(&snapshot) {
                    println!("{}", render_notification(notification));
                }
            }

            state = connection.changed() => {
                match state {
                    Some(state) => println!("-- {}", state),
                    None => break,
                }
            }
        }
    }

    println!("Shutting down...");
    center.shutdown().await;
    Ok(())
}

/// Apply one input line. Returns `false` to exit.
async fn handle_line<C: crate::channel::Connector>(
    center: &NotificationCenter<C>,
    line: &str,
) -> bool {
    let input = match parse_input(line) {
        Ok(Some(input)) => input,
        Ok(None) => return true,
        Err(e) => {
            println!("{}", e);
            return true;
        }
    };

    match input {
        Input::Read(id) => center.mark_as_read(&id),
        Input::ReadAll => center.mark_all_as_read(),
        Input::Remove(id) => center.remove_notification(&id),
        Input::Clear => center.clear_all_notifications(),
        Input::List => print!("{}", render_feed(&center.snapshot())),
        Input::Login(identity) => {
            println!("Switching to {}", identity);
            center.set_identity(Some(identity)).await;
        }
        Input::Logout => {
            center.set_identity(None).await;
            println!("Logged out");
        }
        Input::Test => center.push_local(
            Notification::local("system", "Test notification", "Notifications are working")
                .with_priority(Priority::Low),
        ),
        Input::Help => println!("{}", HELP),
        Input::Quit => return false,
    }
    true
}

/// Save the permission decision made at startup, if it changed.
fn persist_permission<C: crate::channel::Connector>(
    config: &Config,
    center: &NotificationCenter<C>,
) {
    let decided = center.permission();
    if !config.desktop_enabled || decided == config.notification_permission {
        return;
    }
    let result = Config::load_file().and_then(|mut on_disk| {
        on_disk.notification_permission = decided;
        on_disk.save()
    });
    if let Err(e) = result {
        log::warn!("Could not save notification permission: {:#}", e);
    }
}
