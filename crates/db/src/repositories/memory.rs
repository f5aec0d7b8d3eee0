use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use octorelay_core::RepoRoomAssociation;

use super::{AssociationRepository, RepositoryError, TokenRepository};

/// Insertion-ordered in-memory store for tests and noop wiring.
#[derive(Default)]
pub struct InMemoryAssociationRepository {
    associations: RwLock<Vec<RepoRoomAssociation>>,
}

#[async_trait]
impl AssociationRepository for InMemoryAssociationRepository {
    async fn connect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError> {
        let mut associations = self.associations.write().await;
        let exists = associations
            .iter()
            .any(|record| record.repo_name == repo_name && record.room_id == room_id);
        if !exists {
            associations.push(RepoRoomAssociation {
                repo_name: repo_name.to_owned(),
                room_id: room_id.to_owned(),
                connected_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError> {
        let mut associations = self.associations.write().await;
        associations
            .retain(|record| !(record.repo_name == repo_name && record.room_id == room_id));
        Ok(())
    }

    async fn rooms_for_repo(&self, repo_name: &str) -> Result<Vec<String>, RepositoryError> {
        let associations = self.associations.read().await;
        Ok(associations
            .iter()
            .filter(|record| record.repo_name == repo_name)
            .map(|record| record.room_id.clone())
            .collect())
    }

    async fn repos_for_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<RepoRoomAssociation>, RepositoryError> {
        let associations = self.associations.read().await;
        Ok(associations.iter().filter(|record| record.room_id == room_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryTokenRepository {
    tokens: RwLock<HashMap<String, String>>,
}

#[async_trait]
impl TokenRepository for InMemoryTokenRepository {
    async fn set_access_token(
        &self,
        user_id: &str,
        token: SecretString,
    ) -> Result<(), RepositoryError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(user_id.to_owned(), token.expose_secret().to_owned());
        Ok(())
    }

    async fn access_token(&self, user_id: &str) -> Result<Option<SecretString>, RepositoryError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(user_id).cloned().map(SecretString::from))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use crate::repositories::{
        AssociationRepository, InMemoryAssociationRepository, InMemoryTokenRepository,
        TokenRepository,
    };

    #[tokio::test]
    async fn in_memory_connect_deduplicates_pairs() {
        let repo = InMemoryAssociationRepository::default();

        repo.connect("acme/widgets", "room-1").await.expect("connect");
        repo.connect("acme/widgets", "room-1").await.expect("repeat connect");
        repo.connect("acme/widgets", "room-2").await.expect("second room");

        let rooms = repo.rooms_for_repo("acme/widgets").await.expect("lookup");
        assert_eq!(rooms, vec!["room-1".to_string(), "room-2".to_string()]);
    }

    #[tokio::test]
    async fn in_memory_disconnect_only_removes_the_named_pair() {
        let repo = InMemoryAssociationRepository::default();

        repo.connect("acme/widgets", "room-1").await.expect("connect");
        repo.connect("acme/gadgets", "room-1").await.expect("connect sibling");
        repo.disconnect("acme/widgets", "room-1").await.expect("disconnect");

        let records = repo.repos_for_room("room-1").await.expect("lookup");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].repo_name, "acme/gadgets");
    }

    #[tokio::test]
    async fn in_memory_tokens_overwrite_per_user() {
        let repo = InMemoryTokenRepository::default();

        repo.set_access_token("alice", "one".into()).await.expect("write");
        repo.set_access_token("alice", "two".into()).await.expect("overwrite");

        let token = repo.access_token("alice").await.expect("lookup").expect("present");
        assert_eq!(token.expose_secret(), "two");
    }
}
