use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

use octorelay_core::RepoRoomAssociation;

pub mod association;
pub mod memory;
pub mod token;

pub use association::SqlAssociationRepository;
pub use memory::{InMemoryAssociationRepository, InMemoryTokenRepository};
pub use token::SqlTokenRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persistent repository↔room associations. Every call is a fresh read or
/// write against the store; nothing is cached in-process.
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Idempotent upsert of the paired association. Connecting the same
    /// (repo, room) twice leaves exactly one stored row.
    async fn connect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError>;

    /// Removes the paired association. Not an error when it never existed.
    async fn disconnect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError>;

    /// Room ids connected to the repository, in stored order.
    async fn rooms_for_repo(&self, repo_name: &str) -> Result<Vec<String>, RepositoryError>;

    /// Association records tracked by the room, as stored.
    async fn repos_for_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<RepoRoomAssociation>, RepositoryError>;
}

/// Per-user GitHub access tokens, one active token per user.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn set_access_token(
        &self,
        user_id: &str,
        token: SecretString,
    ) -> Result<(), RepositoryError>;

    async fn access_token(&self, user_id: &str) -> Result<Option<SecretString>, RepositoryError>;
}
