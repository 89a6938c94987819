use crate::Database;
use crate::models::{MessageRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Users --

    /// Inserts a new user. Returns `false` when the email is already
    /// registered, leaving the existing account untouched.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        display_name: &str,
        password_hash: &str,
        bio: Option<&str>,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, display_name, password, bio, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![id, email, display_name, password_hash, bio, created_at],
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Patch-style profile update: `None` fields keep their stored value.
    /// Returns the updated row, or `None` if the user does not exist.
    pub fn update_profile(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
        updated_at: &str,
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                     display_name = COALESCE(?2, display_name),
                     bio          = COALESCE(?3, bio),
                     avatar_url   = COALESCE(?4, avatar_url),
                     updated_at   = ?5
                 WHERE id = ?1",
                rusqlite::params![id, display_name, bio, avatar_url, updated_at],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }

    /// Every user except `id`, for the directory listing.
    pub fn list_users_except(&self, id: &str) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, display_name, password, avatar_url, bio, created_at, updated_at
                 FROM users
                 WHERE id != ?1
                 ORDER BY display_name, id",
            )?;

            let rows = stmt
                .query_map([id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        body: Option<&str>,
        image_url: Option<&str>,
        created_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, body, image_url, seen, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
                rusqlite::params![id, sender_id, receiver_id, body, image_url, created_at],
            )?;
            Ok(())
        })
    }

    /// Messages between two users in both directions, ascending by creation
    /// time. `limit` keeps only the newest messages of the window; `before`
    /// restricts to messages strictly older than the cursor. The cursor is
    /// compared as a string and must carry the canonical `rfc3339_micros`
    /// encoding, or the fixed-width ordering guarantee breaks.
    pub fn get_conversation(
        &self,
        user_a: &str,
        user_b: &str,
        limit: Option<u32>,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, user_a, user_b, limit, before))
    }

    /// Flips messages from `other_id` to `reader_id` to seen and reads the
    /// conversation window under one lock, so the returned rows already
    /// carry the updated flag.
    pub fn fetch_conversation_marking_seen(
        &self,
        reader_id: &str,
        other_id: &str,
        limit: Option<u32>,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn_mut(|conn| {
            mark_seen(conn, other_id, reader_id)?;
            query_conversation(conn, reader_id, other_id, limit, before)
        })
    }

    /// Marks messages from `sender_id` to `receiver_id` seen. Returns how
    /// many rows actually flipped; already-seen rows don't count.
    pub fn mark_conversation_seen(&self, sender_id: &str, receiver_id: &str) -> Result<u32> {
        self.with_conn_mut(|conn| mark_seen(conn, sender_id, receiver_id))
    }

    /// Per-sender counts of unseen messages addressed to `receiver_id`.
    /// Senders with nothing unseen are absent from the result.
    pub fn unseen_counts(&self, receiver_id: &str) -> Result<Vec<(String, u32)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, COUNT(*)
                 FROM messages
                 WHERE receiver_id = ?1 AND seen = 0
                 GROUP BY sender_id",
            )?;

            let rows = stmt
                .query_map([receiver_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, password, avatar_url, bio, created_at, updated_at
         FROM users WHERE email = ?1",
    )?;

    let row = stmt.query_row([email], user_from_row).optional()?;

    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, email, display_name, password, avatar_url, bio, created_at, updated_at
         FROM users WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], user_from_row).optional()?;

    Ok(row)
}

fn query_conversation(
    conn: &Connection,
    user_a: &str,
    user_b: &str,
    limit: Option<u32>,
    before: Option<&str>,
) -> Result<Vec<MessageRow>> {
    // Newest-first so LIMIT keeps the most recent window (-1 means no
    // limit in SQLite), then reversed to hand back ascending order.
    let limit = limit.map(i64::from).unwrap_or(-1);

    let mut rows = match before {
        Some(cursor) => {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, body, image_url, seen, created_at
                 FROM messages
                 WHERE ((sender_id = ?1 AND receiver_id = ?2)
                     OR (sender_id = ?2 AND receiver_id = ?1))
                   AND created_at < ?3
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4",
            )?;
            stmt.query_map(rusqlite::params![user_a, user_b, cursor, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, body, image_url, seen, created_at
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
            )?;
            stmt.query_map(rusqlite::params![user_a, user_b, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    rows.reverse();
    Ok(rows)
}

fn mark_seen(conn: &Connection, sender_id: &str, receiver_id: &str) -> Result<u32> {
    let changed = conn.execute(
        "UPDATE messages SET seen = 1
         WHERE sender_id = ?1 AND receiver_id = ?2 AND seen = 0",
        [sender_id, receiver_id],
    )?;
    Ok(changed as u32)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        display_name: row.get(2)?,
        password: row.get(3)?,
        avatar_url: row.get(4)?,
        bio: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        body: row.get(3)?,
        image_url: row.get(4)?,
        seen: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
