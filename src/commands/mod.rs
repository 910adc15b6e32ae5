//! CLI subcommand implementations for notifeed.
//!
//! - [`listen`] - interactive feed: connect, print, accept commands on stdin
//! - [`settings`] - inspect the config and set the notification permission
//!
//! # Usage
//!
//! ```ignore
//! use notifeed::commands;
//!
//! commands::settings::show()?;
//! commands::listen::run(config, identity, shutdown).await?;
//! ```

pub mod listen;
pub mod settings;

#[doc(inline)]
pub use settings::{set_permission, show as show_config};
