//! notifeed - real-time notification feed client.
//!
//! This crate delivers server-pushed notifications (new reviews, business
//! responses, followers, system messages) to a client over a persistent
//! channel and keeps a bounded, most-recent-first feed for a UI.
//!
//! # Architecture
//!
//! ```text
//! identity ─▶ LifecycleController ─▶ Transport (WebSocket │ long-polling)
//!                    │                      │
//!                    │   authenticate ◀─────┤ Connected
//!                    ▼                      ▼
//!             connection state        EventIngestor ─▶ NotificationStore
//!                                           │
//!                                           └─▶ SideEffects (desktop, sound)
//! ```
//!
//! - **Transport** - persistent channel with fallback and reconnection
//! - **Controller** - binds the channel to the current identity
//! - **Ingestor** - stores pushed notifications and fires side effects
//! - **Store** - capped feed with atomic snapshot replacement
//! - **Center** - what a UI holds: views, commands, subscriptions
//!
//! # Modules
//!
//! - [`channel`] - transports and wire sessions
//! - [`controller`] - lifecycle and connection state
//! - [`center`] - consumer surface
//! - [`store`] - notification store
//! - [`config`] - configuration loading/saving

pub mod center;
pub mod channel;
pub mod commands;
pub mod config;
pub mod constants;
pub mod controller;
pub mod effects;
pub mod identity;
pub mod ingest;
pub mod notification;
pub mod protocol;
pub mod store;

// Re-export commonly used types
pub use center::{FeedSnapshot, NotificationCenter};
pub use channel::{Connector, Endpoint, Transport, TransportError, TransportKind};
pub use config::Config;
pub use controller::{ConnectionState, LifecycleController, Transition};
pub use effects::{NotifierSink, PermissionState, SideEffects, SoundSink};
pub use identity::Identity;
pub use notification::{IncomingNotification, Notification, Priority};
pub use store::{NotificationStore, StoreSnapshot};
