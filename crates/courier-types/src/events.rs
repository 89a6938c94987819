use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Message;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid },

    /// Full set of user ids currently holding a live connection
    OnlineUsersSnapshot { user_ids: Vec<Uuid> },

    /// A single user crossed the offline/online boundary
    PresenceDelta { user_id: Uuid, online: bool },

    /// A message addressed to this client was just persisted
    NewMessage { message: Message },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Ask for a fresh online-users snapshot on this connection
    RequestOnlineUsers,
}
