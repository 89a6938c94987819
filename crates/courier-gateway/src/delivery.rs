use tracing::debug;

use courier_types::events::GatewayEvent;
use courier_types::models::Message;

use crate::dispatcher::Dispatcher;

/// Best-effort push of a freshly persisted message to the receiver's live
/// connection, if any. An offline receiver finds the message on its next
/// conversation fetch; durability never depends on this push.
///
/// Only the receiver is pushed to. The sender already holds the message
/// from the send response.
pub async fn push_new_message(dispatcher: &Dispatcher, message: &Message) -> bool {
    let delivered = dispatcher
        .send_to_user(
            message.receiver_id,
            GatewayEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;

    if !delivered {
        debug!(
            "receiver {} has no live connection, message {} waits for fetch",
            message.receiver_id, message.id
        );
    }

    delivered
}
