use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A directory entry for a user. Never carries the password hash; that
/// stays inside the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A direct message between two users. At least one of `body` and
/// `image_url` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// Canonical timestamp encoding used for storage and pagination cursors.
/// Fixed-width microseconds keep lexicographic order chronological.
pub fn rfc3339_micros(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The current instant, truncated to the precision `rfc3339_micros` can
/// represent, so a value survives a storage round trip unchanged.
pub fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
