use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use octorelay_core::OutgoingMessage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChatHostError {
    #[error("room lookup failed: {0}")]
    Lookup(String),
    #[error("message send failed: {0}")]
    Send(String),
}

/// The chat host's message primitives, used through this narrow contract.
/// A stored room id that no longer resolves yields `Ok(None)`, not an
/// error; delivery failures are errors.
#[async_trait]
pub trait ChatHost: Send + Sync {
    async fn room_by_id(&self, room_id: &str) -> Result<Option<Room>, ChatHostError>;
    async fn send(&self, message: OutgoingMessage) -> Result<(), ChatHostError>;
}

/// In-memory host for tests and noop wiring: rooms are registered up front
/// and sent messages are recorded in order.
#[derive(Default)]
pub struct InMemoryChatHost {
    rooms: RwLock<HashMap<String, Room>>,
    sent: RwLock<Vec<OutgoingMessage>>,
    failing_rooms: RwLock<HashSet<String>>,
}

impl InMemoryChatHost {
    pub async fn add_room(&self, room: Room) {
        let mut rooms = self.rooms.write().await;
        rooms.insert(room.id.clone(), room);
    }

    /// Makes every send to the room fail, for exercising delivery errors.
    pub async fn fail_sends_to(&self, room_id: &str) {
        let mut failing = self.failing_rooms.write().await;
        failing.insert(room_id.to_owned());
    }

    pub async fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl ChatHost for InMemoryChatHost {
    async fn room_by_id(&self, room_id: &str) -> Result<Option<Room>, ChatHostError> {
        let rooms = self.rooms.read().await;
        Ok(rooms.get(room_id).cloned())
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), ChatHostError> {
        {
            let failing = self.failing_rooms.read().await;
            if failing.contains(&message.room_id) {
                return Err(ChatHostError::Send(format!(
                    "delivery to room {} refused",
                    message.room_id
                )));
            }
        }

        let mut sent = self.sent.write().await;
        sent.push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use octorelay_core::OutgoingMessage;

    use super::{ChatHost, ChatHostError, InMemoryChatHost, Room};

    #[tokio::test]
    async fn unknown_room_resolves_to_none_not_an_error() {
        let host = InMemoryChatHost::default();
        assert_eq!(host.room_by_id("missing").await.expect("lookup"), None);
    }

    #[tokio::test]
    async fn sent_messages_are_recorded_in_order() {
        let host = InMemoryChatHost::default();
        host.add_room(Room { id: "room-1".into(), display_name: "devops".into() }).await;

        host.send(OutgoingMessage::plain("room-1", "first")).await.expect("send");
        host.send(OutgoingMessage::plain("room-1", "second")).await.expect("send");

        let sent = host.sent().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].text, "first");
        assert_eq!(sent[1].text, "second");
    }

    #[tokio::test]
    async fn poisoned_room_fails_sends() {
        let host = InMemoryChatHost::default();
        host.fail_sends_to("room-1").await;

        let result = host.send(OutgoingMessage::plain("room-1", "text")).await;
        assert!(matches!(result, Err(ChatHostError::Send(_))));
    }
}
