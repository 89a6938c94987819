use chrono::{DateTime, Duration, Utc};
use courier_db::Database;
use courier_types::models::{now_micros, rfc3339_micros};
use uuid::Uuid;

fn add_user(db: &Database, email: &str, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    let now = rfc3339_micros(now_micros());
    let created = db
        .create_user(&id, email, name, "argon2-hash", None, &now)
        .unwrap();
    assert!(created, "fixture user should not collide");
    id
}

fn add_message(
    db: &Database,
    sender: &str,
    receiver: &str,
    body: &str,
    at: DateTime<Utc>,
) -> String {
    let id = Uuid::new_v4().to_string();
    db.insert_message(&id, sender, receiver, Some(body), None, &rfc3339_micros(at))
        .unwrap();
    id
}

#[test]
fn create_and_fetch_user() {
    let db = Database::open_in_memory().unwrap();
    let id = add_user(&db, "ada@example.com", "Ada");

    let by_email = db.get_user_by_email("ada@example.com").unwrap().unwrap();
    assert_eq!(by_email.id, id);
    assert_eq!(by_email.display_name, "Ada");
    assert_eq!(by_email.password, "argon2-hash");
    assert!(by_email.bio.is_none());

    let by_id = db.get_user_by_id(&id).unwrap().unwrap();
    assert_eq!(by_id.email, "ada@example.com");

    assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());
}

#[test]
fn duplicate_email_reports_taken() {
    let db = Database::open_in_memory().unwrap();
    add_user(&db, "ada@example.com", "Ada");

    let id = Uuid::new_v4().to_string();
    let now = rfc3339_micros(now_micros());
    let created = db
        .create_user(&id, "ada@example.com", "Imposter", "other-hash", None, &now)
        .unwrap();
    assert!(!created);

    // The original account is untouched.
    let row = db.get_user_by_email("ada@example.com").unwrap().unwrap();
    assert_eq!(row.display_name, "Ada");
}

#[test]
fn profile_update_patches_only_provided_fields() {
    let db = Database::open_in_memory().unwrap();
    let id = add_user(&db, "ada@example.com", "Ada");
    let later = rfc3339_micros(now_micros());

    let row = db
        .update_profile(&id, None, Some("writes compilers"), None, &later)
        .unwrap()
        .unwrap();
    assert_eq!(row.display_name, "Ada");
    assert_eq!(row.bio.as_deref(), Some("writes compilers"));

    let row = db
        .update_profile(&id, Some("Ada L."), None, Some("http://cdn/ada.png"), &later)
        .unwrap()
        .unwrap();
    assert_eq!(row.display_name, "Ada L.");
    assert_eq!(row.bio.as_deref(), Some("writes compilers"));
    assert_eq!(row.avatar_url.as_deref(), Some("http://cdn/ada.png"));
}

#[test]
fn profile_update_for_unknown_user_returns_none() {
    let db = Database::open_in_memory().unwrap();
    let ghost = Uuid::new_v4().to_string();
    let now = rfc3339_micros(now_micros());

    let row = db.update_profile(&ghost, Some("Ghost"), None, None, &now).unwrap();
    assert!(row.is_none());
}

#[test]
fn conversation_is_ascending_across_both_directions() {
    let db = Database::open_in_memory().unwrap();
    let ada = add_user(&db, "ada@example.com", "Ada");
    let bob = add_user(&db, "bob@example.com", "Bob");
    let eve = add_user(&db, "eve@example.com", "Eve");

    let t0 = now_micros();
    add_message(&db, &ada, &bob, "first", t0);
    add_message(&db, &bob, &ada, "second", t0 + Duration::seconds(1));
    add_message(&db, &ada, &bob, "third", t0 + Duration::seconds(2));
    // Noise from a third user must never leak into the pair.
    add_message(&db, &eve, &ada, "psst", t0 + Duration::seconds(1));

    let rows = db.get_conversation(&ada, &bob, None, None).unwrap();
    let bodies: Vec<_> = rows.iter().map(|r| r.body.as_deref().unwrap()).collect();
    assert_eq!(bodies, ["first", "second", "third"]);

    // Same window regardless of which side asks.
    let rows = db.get_conversation(&bob, &ada, None, None).unwrap();
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].body.as_deref(), Some("first"));
}

#[test]
fn conversation_orders_same_second_messages_by_insertion() {
    let db = Database::open_in_memory().unwrap();
    let ada = add_user(&db, "ada@example.com", "Ada");
    let bob = add_user(&db, "bob@example.com", "Bob");

    let t0 = now_micros();
    for i in 0..5 {
        add_message(&db, &ada, &bob, &format!("burst-{i}"), t0 + Duration::microseconds(i));
    }

    let rows = db.get_conversation(&ada, &bob, None, None).unwrap();
    let bodies: Vec<_> = rows.iter().map(|r| r.body.as_deref().unwrap()).collect();
    assert_eq!(bodies, ["burst-0", "burst-1", "burst-2", "burst-3", "burst-4"]);
}

#[test]
fn pagination_selects_newest_window_before_cursor() {
    let db = Database::open_in_memory().unwrap();
    let ada = add_user(&db, "ada@example.com", "Ada");
    let bob = add_user(&db, "bob@example.com", "Bob");

    let t0 = now_micros();
    for i in 0..5 {
        add_message(&db, &ada, &bob, &format!("msg-{i}"), t0 + Duration::seconds(i));
    }

    // Newest two, still ascending.
    let rows = db.get_conversation(&ada, &bob, Some(2), None).unwrap();
    let bodies: Vec<_> = rows.iter().map(|r| r.body.as_deref().unwrap()).collect();
    assert_eq!(bodies, ["msg-3", "msg-4"]);

    // Page older than the previous window's oldest entry.
    let cursor = rows[0].created_at.clone();
    let rows = db.get_conversation(&ada, &bob, Some(2), Some(&cursor)).unwrap();
    let bodies: Vec<_> = rows.iter().map(|r| r.body.as_deref().unwrap()).collect();
    assert_eq!(bodies, ["msg-1", "msg-2"]);
}

#[test]
fn mark_seen_counts_only_flipped_rows() {
    let db = Database::open_in_memory().unwrap();
    let ada = add_user(&db, "ada@example.com", "Ada");
    let bob = add_user(&db, "bob@example.com", "Bob");

    let t0 = now_micros();
    add_message(&db, &ada, &bob, "one", t0);
    add_message(&db, &ada, &bob, "two", t0 + Duration::seconds(1));
    add_message(&db, &bob, &ada, "reply", t0 + Duration::seconds(2));

    assert_eq!(db.mark_conversation_seen(&ada, &bob).unwrap(), 2);
    // Idempotent: nothing left to flip.
    assert_eq!(db.mark_conversation_seen(&ada, &bob).unwrap(), 0);

    // The opposite direction was untouched.
    assert_eq!(db.mark_conversation_seen(&bob, &ada).unwrap(), 1);
}

#[test]
fn fetch_marking_seen_returns_rows_already_flagged() {
    let db = Database::open_in_memory().unwrap();
    let ada = add_user(&db, "ada@example.com", "Ada");
    let bob = add_user(&db, "bob@example.com", "Bob");

    let t0 = now_micros();
    add_message(&db, &bob, &ada, "hi ada", t0);
    add_message(&db, &ada, &bob, "hi bob", t0 + Duration::seconds(1));

    let rows = db.fetch_conversation_marking_seen(&ada, &bob, None, None).unwrap();
    for row in &rows {
        if row.sender_id == bob {
            assert!(row.seen, "incoming rows come back already seen");
        } else {
            assert!(!row.seen, "own outgoing rows stay unseen for the other side");
        }
    }
}

#[test]
fn unseen_counts_group_by_sender() {
    let db = Database::open_in_memory().unwrap();
    let ada = add_user(&db, "ada@example.com", "Ada");
    let bob = add_user(&db, "bob@example.com", "Bob");
    let eve = add_user(&db, "eve@example.com", "Eve");

    let t0 = now_micros();
    add_message(&db, &bob, &ada, "one", t0);
    add_message(&db, &bob, &ada, "two", t0 + Duration::seconds(1));
    add_message(&db, &eve, &ada, "three", t0 + Duration::seconds(2));
    add_message(&db, &ada, &bob, "outgoing", t0 + Duration::seconds(3));

    let mut counts = db.unseen_counts(&ada).unwrap();
    counts.sort();
    let mut expected = vec![(bob.clone(), 2), (eve.clone(), 1)];
    expected.sort();
    assert_eq!(counts, expected);

    db.mark_conversation_seen(&bob, &ada).unwrap();
    let counts = db.unseen_counts(&ada).unwrap();
    assert_eq!(counts, vec![(eve, 1)]);
}
