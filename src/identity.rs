//! Authenticated user identity supplied by the host application.

use serde::{Deserialize, Serialize};

/// The identity a notification channel is bound to.
///
/// Supplied by the external auth collaborator. `None` at the controller
/// boundary means "no session".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user identifier.
    pub user_id: String,
    /// User role (e.g. "user", "business", "admin").
    pub role: String,
    /// Businesses this user manages; used by the server for routing.
    #[serde(default)]
    pub business_ids: Vec<String>,
}

impl Identity {
    /// Create an identity with no associated businesses.
    pub fn new(user_id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: role.into(),
            business_ids: Vec::new(),
        }
    }

    /// Attach business identifiers.
    #[must_use]
    pub fn with_business_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.business_ids = ids.into_iter().map(Into::into).collect();
        self
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.user_id, self.role)
    }
}
