use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use courier_types::events::GatewayEvent;
use courier_types::models::{Message, PublicUser};

/// What a frontend renders: the user directory, the online set, unseen
/// badges, and the currently open conversation.
///
/// REST responses seed it; gateway events keep it current. The persisted
/// store stays the source of truth, so any part of this cache is safe to
/// overwrite wholesale with a refetch.
#[derive(Debug)]
pub struct ChatState {
    me: Uuid,
    users: Vec<PublicUser>,
    online: HashSet<Uuid>,
    unseen: HashMap<Uuid, u32>,
    open_with: Option<Uuid>,
    messages: Vec<Message>,
}

impl ChatState {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            users: Vec::new(),
            online: HashSet::new(),
            unseen: HashMap::new(),
            open_with: None,
            messages: Vec::new(),
        }
    }

    /// Replaces the directory and unseen badges from `GET /users`.
    pub fn set_users(&mut self, users: Vec<PublicUser>, unseen: HashMap<Uuid, u32>) {
        self.users = users;
        self.unseen = unseen;
    }

    /// Opens the conversation with `other`, replacing the visible history.
    /// The fetch that produced `history` marked those messages seen
    /// server-side, so the badge for `other` is cleared here.
    pub fn open_conversation(&mut self, other: Uuid, history: Vec<Message>) {
        self.open_with = Some(other);
        self.messages = history;
        self.unseen.remove(&other);
    }

    pub fn close_conversation(&mut self) {
        self.open_with = None;
        self.messages.clear();
    }

    /// Appends a message we just sent, when its conversation is the open
    /// one. Sends to anyone else leave the view untouched.
    pub fn record_sent(&mut self, message: Message) {
        if self.open_with == Some(message.receiver_id) {
            self.messages.push(message);
        }
    }

    /// Applies one gateway event.
    ///
    /// A pushed message either lands in the open conversation (flagged
    /// seen locally) or bumps the sender's unseen badge. Returns the
    /// sender id in the first case: the caller should confirm with
    /// [`mark_read`](crate::ApiClient::mark_read), since the push itself
    /// never flips the persisted flag.
    pub fn apply_event(&mut self, event: GatewayEvent) -> Option<Uuid> {
        match event {
            GatewayEvent::Ready { .. } => None,
            GatewayEvent::OnlineUsersSnapshot { user_ids } => {
                self.online = user_ids.into_iter().collect();
                None
            }
            GatewayEvent::PresenceDelta { user_id, online } => {
                if online {
                    self.online.insert(user_id);
                } else {
                    self.online.remove(&user_id);
                }
                None
            }
            GatewayEvent::NewMessage { mut message } => {
                if self.open_with == Some(message.sender_id) {
                    let sender = message.sender_id;
                    message.seen = true;
                    self.messages.push(message);
                    Some(sender)
                } else {
                    *self.unseen.entry(message.sender_id).or_insert(0) += 1;
                    None
                }
            }
        }
    }

    pub fn me(&self) -> Uuid {
        self.me
    }

    pub fn users(&self) -> &[PublicUser] {
        &self.users
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.contains(&user_id)
    }

    pub fn online_users(&self) -> &HashSet<Uuid> {
        &self.online
    }

    pub fn unseen_count(&self, from: Uuid) -> u32 {
        self.unseen.get(&from).copied().unwrap_or(0)
    }

    pub fn open_conversation_with(&self) -> Option<Uuid> {
        self.open_with
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }
}
