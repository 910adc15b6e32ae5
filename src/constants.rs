//! Application-wide constants for notifeed.
//!
//! Centralizes retention limits, timeouts and queue sizes so they can be
//! found in one place. Grouped by domain.

use std::time::Duration;

// ============================================================================
// Notification store
// ============================================================================

/// Maximum number of notifications retained in memory.
///
/// Inserting past this limit evicts the oldest record.
pub const MAX_NOTIFICATIONS: usize = 50;

// ============================================================================
// Side effects
// ============================================================================

/// Playback volume for the notification sound (0.0 - 1.0).
pub const NOTIFICATION_SOUND_VOLUME: f32 = 0.3;

// ============================================================================
// Transport
// ============================================================================

/// Initial reconnection delay.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for the reconnection delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Maximum random jitter added to each reconnection delay, in milliseconds.
pub const BACKOFF_JITTER_MS: u64 = 1000;

/// Timeout for establishing a single transport (upgrade or poll handshake).
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between client pings on the WebSocket transport.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(15);

/// A WebSocket with no inbound traffic (including pongs) for this long is
/// considered dead and reconnected.
pub const CONNECTION_STALE_TIMEOUT: Duration = Duration::from_secs(45);

/// Delay between polls when the server returns an empty batch.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Request timeout for long-poll requests. Must exceed the server hold time.
pub const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(35);

/// Capacity of the transport -> controller event queue.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the controller -> transport emit queue.
pub const EMIT_QUEUE_CAPACITY: usize = 32;

/// How long `disconnect` waits for the connection task to close the socket
/// before aborting it.
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);
