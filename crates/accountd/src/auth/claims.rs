//! JWT claims.

use serde::{Deserialize, Serialize};

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (numeric user ID as a string).
    pub sub: String,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// User's login name.
    #[serde(default)]
    pub preferred_username: Option<String>,
}

impl Claims {
    /// Parse the subject as a user ID.
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    /// Get the display name for the user.
    pub fn display_name(&self) -> &str {
        self.preferred_username.as_deref().unwrap_or(&self.sub)
    }
}
