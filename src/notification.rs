//! Notification records.
//!
//! [`IncomingNotification`] is the wire shape pushed by the server.
//! [`Notification`] is the stored record: the same data plus the `read` flag,
//! which only the store commands mutate.
//!
//! # Wire format
//!
//! ```json
//! {
//!   "id": "n-42",
//!   "type": "review",
//!   "title": "New review",
//!   "message": "Alice left a 5-star review",
//!   "timestamp": "2024-05-01T12:00:00Z",
//!   "priority": "high",
//!   "data": { "businessName": "Cafe", "rating": 5 },
//!   "actions": [{ "label": "Reply", "action": "reply", "data": { "reviewId": "r1" } }]
//! }
//! ```
//!
//! `id` may also be a JSON number and is kept as its decimal text.
//! `timestamp` may also be integer epoch milliseconds. `metadata` is read when
//! `data` is absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Optional display hint. Never affects store ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    Medium,
    /// High priority.
    High,
}

impl Priority {
    /// Parse a wire value, `None` for anything unrecognized.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// A UI-invokable follow-up. Carried verbatim, never executed by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Button label.
    pub label: String,
    /// Action tag interpreted by the UI.
    pub action: String,
    /// Opaque payload for the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A notification as pushed by the server (no `read` flag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireNotification")]
pub struct IncomingNotification {
    /// Producer-assigned unique id.
    pub id: String,
    /// Convention-following tag ("review", "response", "system", ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Display title.
    pub title: String,
    /// Display body.
    pub message: String,
    /// When the event was generated (not when it was received).
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Optional display priority.
    #[serde(
        default,
        deserialize_with = "lenient_priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,
    /// Opaque payload for the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Follow-up actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

/// Inbound shape, before `data`/`metadata` are merged.
#[derive(Deserialize)]
struct WireNotification {
    #[serde(deserialize_with = "opaque_id")]
    id: String,
    #[serde(rename = "type")]
    kind: String,
    title: String,
    message: String,
    #[serde(with = "timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default, deserialize_with = "lenient_priority")]
    priority: Option<Priority>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    metadata: Option<Value>,
    #[serde(default)]
    actions: Vec<NotificationAction>,
}

impl From<WireNotification> for IncomingNotification {
    fn from(wire: WireNotification) -> Self {
        Self {
            id: wire.id,
            kind: wire.kind,
            title: wire.title,
            message: wire.message,
            timestamp: wire.timestamp,
            priority: wire.priority,
            data: wire.data.or(wire.metadata),
            actions: wire.actions,
        }
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique id (server-assigned, or a UUID for local notifications).
    pub id: String,
    /// Type tag, opaque to the core.
    #[serde(rename = "type")]
    pub kind: String,
    /// Display title.
    pub title: String,
    /// Display body.
    pub message: String,
    /// Generation time.
    #[serde(with = "timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Read flag. Mutated only through store commands.
    pub read: bool,
    /// Optional display priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Opaque payload for the UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Follow-up actions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Stamp an incoming notification as unread.
    pub fn from_incoming(incoming: IncomingNotification) -> Self {
        Self {
            id: incoming.id,
            kind: incoming.kind,
            title: incoming.title,
            message: incoming.message,
            timestamp: incoming.timestamp,
            read: false,
            priority: incoming.priority,
            data: incoming.data,
            actions: incoming.actions,
        }
    }

    /// Synthesize a client-side notification with a fresh UUID.
    pub fn local(
        kind: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            read: false,
            priority: None,
            data: None,
            actions: Vec::new(),
        }
    }

    /// Set the priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl From<IncomingNotification> for Notification {
    fn from(incoming: IncomingNotification) -> Self {
        Self::from_incoming(incoming)
    }
}

/// Ids are opaque: strings are kept, numbers become their decimal text.
fn opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}

fn lenient_priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(Priority::parse))
}

/// RFC 3339 on the way out; RFC 3339 or epoch millis on the way in.
mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Millis(i64),
    }

    pub(super) fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(D::Error::custom),
            Raw::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| D::Error::custom(format!("timestamp out of range: {ms}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire() -> Value {
        json!({
            "id": "n-1",
            "type": "review",
            "title": "New review",
            "message": "Alice left a review",
            "timestamp": "2024-05-01T12:00:00Z",
        })
    }

    #[test]
    fn test_incoming_minimal_fields() {
        let n: IncomingNotification = serde_json::from_value(wire()).unwrap();
        assert_eq!(n.id, "n-1");
        assert_eq!(n.kind, "review");
        assert!(n.priority.is_none());
        assert!(n.data.is_none());
        assert!(n.actions.is_empty());
    }

    #[test]
    fn test_timestamp_accepts_epoch_millis() {
        let mut value = wire();
        value["timestamp"] = json!(1_714_564_800_000_i64);
        let n: IncomingNotification = serde_json::from_value(value).unwrap();
        assert_eq!(n.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_timestamp_rejects_garbage() {
        let mut value = wire();
        value["timestamp"] = json!("yesterday");
        assert!(serde_json::from_value::<IncomingNotification>(value).is_err());
    }

    #[test]
    fn test_metadata_alias_and_actions() {
        let mut value = wire();
        value["metadata"] = json!({"businessName": "Cafe", "rating": 5});
        value["actions"] = json!([{"label": "Reply", "action": "reply", "data": {"reviewId": "r1"}}]);
        let n: IncomingNotification = serde_json::from_value(value).unwrap();
        assert_eq!(n.data.unwrap()["rating"], 5);
        assert_eq!(n.actions.len(), 1);
        assert_eq!(n.actions[0].action, "reply");
    }

    #[test]
    fn test_numeric_id_is_kept_as_text() {
        let mut value = wire();
        value["id"] = json!(42);
        let n: IncomingNotification = serde_json::from_value(value).unwrap();
        assert_eq!(n.id, "42");
    }

    #[test]
    fn test_data_wins_over_metadata() {
        let mut value = wire();
        value["data"] = json!({"reviewId": "r1"});
        value["metadata"] = json!({"source": "legacy"});
        let n: IncomingNotification = serde_json::from_value(value).unwrap();
        assert_eq!(n.data, Some(json!({"reviewId": "r1"})));
    }

    #[test]
    fn test_id_must_be_text_or_number() {
        let mut value = wire();
        value["id"] = json!({"nested": true});
        assert!(serde_json::from_value::<IncomingNotification>(value).is_err());
    }

    #[test]
    fn test_unknown_priority_is_dropped_not_rejected() {
        let mut value = wire();
        value["priority"] = json!("urgent");
        let n: IncomingNotification = serde_json::from_value(value).unwrap();
        assert!(n.priority.is_none());

        let mut value = wire();
        value["priority"] = json!("HIGH");
        let n: IncomingNotification = serde_json::from_value(value).unwrap();
        assert_eq!(n.priority, Some(Priority::High));
    }

    #[test]
    fn test_from_incoming_is_unread() {
        let n: IncomingNotification = serde_json::from_value(wire()).unwrap();
        let stored = Notification::from(n);
        assert!(!stored.read);
        assert_eq!(stored.title, "New review");
    }

    #[test]
    fn test_local_notifications_get_unique_ids() {
        let a = Notification::local("system", "Test", "one");
        let b = Notification::local("system", "Test", "two");
        assert_ne!(a.id, b.id);
        assert!(!a.read);
    }

    #[test]
    fn test_stored_notification_serializes_type_field() {
        let n = Notification::local("system", "Hello", "World");
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["read"], false);
        assert!(json.get("priority").is_none());
    }
}
