//! Per-user presence record.

use crate::ids::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Online flag and last lifecycle edge for one user.
///
/// Changes only on explicit sign-in/sign-out edges; there is no inactivity timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Presence {
    /// Whose presence this is.
    pub user_id: UserId,
    /// Whether the user's last lifecycle edge was a sign-in.
    pub online: bool,
    /// Time of the last lifecycle edge, `None` if never seen.
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Presence {
    /// Presence reported for a user that has never signed in.
    pub fn unknown(user_id: UserId) -> Self {
        Self {
            user_id,
            online: false,
            last_seen_at: None,
        }
    }
}
