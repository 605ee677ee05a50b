//! Authenticated session for the signed-in user.

use serde::{Deserialize, Serialize};

/// Credentials and identity of the signed-in user.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoginSession {
    /// LMS base URL without a trailing slash.
    pub base_url: String,
    /// User identifier.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// Bearer token for API requests.
    #[serde(skip_serializing)]
    pub access_token: String,
}

impl std::fmt::Debug for LoginSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginSession")
            .field("base_url", &self.base_url)
            .field("user_id", &self.user_id)
            .field("user_name", &self.user_name)
            .field("avatar_url", &self.avatar_url)
            .field("access_token", &"<redacted>")
            .finish()
    }
}
