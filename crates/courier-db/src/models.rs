use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use courier_types::models::{Message, PublicUser};
use uuid::Uuid;

/// Database row types — these map directly to SQLite rows.
/// Distinct from courier-types API models to keep the DB layer independent.
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub password: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    /// Converts into the API model, dropping the password hash.
    pub fn into_public(self) -> Result<PublicUser> {
        Ok(PublicUser {
            id: parse_uuid(&self.id)?,
            email: self.email,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            bio: self.bio,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: Option<String>,
    pub image_url: Option<String>,
    pub seen: bool,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_uuid(&self.id)?,
            sender_id: parse_uuid(&self.sender_id)?,
            receiver_id: parse_uuid(&self.receiver_id)?,
            body: self.body,
            image_url: self.image_url,
            seen: self.seen,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("corrupt uuid in database: {raw}"))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt timestamp in database: {raw}"))?;
    Ok(parsed.with_timezone(&Utc))
}
