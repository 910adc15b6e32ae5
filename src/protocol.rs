//! Channel-level wire messages.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`,
//! carried as a WebSocket text frame or as one element of a polling batch.
//!
//! | Direction       | Event                  | Payload                              |
//! |-----------------|------------------------|--------------------------------------|
//! | client → server | `authenticate`         | `{userId, userRole, businessIds}`    |
//! | server → client | `authenticated`        | `{success}`                          |
//! | server → client | `authentication_error` | `{error}`                            |
//! | server → client | `notification`         | see [`crate::notification`]          |

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::Identity;
use crate::notification::IncomingNotification;

/// Handshake payload binding a channel to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    /// User identifier.
    pub user_id: String,
    /// User role.
    pub user_role: String,
    /// Businesses managed by the user.
    pub business_ids: Vec<String>,
}

impl From<&Identity> for AuthenticatePayload {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            user_role: identity.role.clone(),
            business_ids: identity.business_ids.clone(),
        }
    }
}

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Post-connect handshake.
    Authenticate(AuthenticatePayload),
}

impl ClientEvent {
    /// Build the handshake for `identity`.
    pub fn authenticate(identity: &Identity) -> Self {
        Self::Authenticate(AuthenticatePayload::from(identity))
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Acknowledgment of a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedPayload {
    /// Whether the server accepted the identity.
    pub success: bool,
}

/// Handshake rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationErrorPayload {
    /// Server-provided reason.
    pub error: String,
}

/// Messages pushed by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Handshake acknowledged.
    Authenticated(AuthenticatedPayload),
    /// Handshake rejected.
    AuthenticationError(AuthenticationErrorPayload),
    /// A new notification.
    Notification(IncomingNotification),
}

impl ServerEvent {
    /// Decode a text frame. Malformed or unknown frames yield `None`.
    pub fn decode(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(event) => Some(event),
            Err(e) => {
                log::debug!("Ignoring unrecognized frame ({}): {}", e, truncate(text));
                None
            }
        }
    }

    /// Decode one element of a polling batch.
    pub fn from_value(value: Value) -> Option<Self> {
        match serde_json::from_value(value) {
            Ok(event) => Some(event),
            Err(e) => {
                log::debug!("Ignoring unrecognized frame in batch: {}", e);
                None
            }
        }
    }

    /// Wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Authenticated(_) => "authenticated",
            Self::AuthenticationError(_) => "authentication_error",
            Self::Notification(_) => "notification",
        }
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
