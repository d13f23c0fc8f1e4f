//! Post-registration profile synchronization.

use crate::gateway::Gateway;
use crate::session::Session;

/// Upserts the signed-up user's profile through the privileged endpoint.
///
/// Called once after registration. Returns whether the upsert succeeded;
/// a failure is logged and never blocks the sign-up flow.
pub async fn sync_profile<G: Gateway>(gateway: &G, session: &Session) -> bool {
    match gateway
        .upsert_profile(&session.user_id, session.email.as_deref())
        .await
    {
        Ok(()) => {
            tracing::info!(user_id = %session.user_id, "profile upserted");
            true
        }
        Err(e) => {
            tracing::warn!(user_id = %session.user_id, err = %e, "profile upsert failed");
            false
        }
    }
}
