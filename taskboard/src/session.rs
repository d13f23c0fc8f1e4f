//! Explicit session context handed to the board and the gateways.

use taskboard_proto::UserId;

/// The signed-in user and the credential their requests carry.
///
/// Token issuance and refresh happen outside this crate; a session is
/// created from an already-issued access token and lives until sign-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Authenticated user id.
    pub user_id: UserId,
    /// Bearer token for backend requests.
    pub access_token: String,
    /// Email on record, used for the profile upsert.
    pub email: Option<String>,
}

impl Session {
    /// Creates a session.
    pub fn new(user_id: UserId, access_token: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
            email,
        }
    }
}
