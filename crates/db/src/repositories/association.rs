use async_trait::async_trait;
use chrono::{DateTime, Utc};

use octorelay_core::RepoRoomAssociation;

use super::{AssociationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAssociationRepository {
    pool: DbPool,
}

impl SqlAssociationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssociationRepository for SqlAssociationRepository {
    async fn connect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO repo_room_association (repo_name, room_id, connected_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT (repo_name, room_id) DO NOTHING",
        )
        .bind(repo_name)
        .bind(room_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn disconnect(&self, repo_name: &str, room_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM repo_room_association WHERE repo_name = ?1 AND room_id = ?2")
            .bind(repo_name)
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn rooms_for_repo(&self, repo_name: &str) -> Result<Vec<String>, RepositoryError> {
        let rooms = sqlx::query_scalar::<_, String>(
            "SELECT room_id FROM repo_room_association WHERE repo_name = ?1 ORDER BY rowid",
        )
        .bind(repo_name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rooms)
    }

    async fn repos_for_room(
        &self,
        room_id: &str,
    ) -> Result<Vec<RepoRoomAssociation>, RepositoryError> {
        let rows = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
            "SELECT repo_name, room_id, connected_at \
             FROM repo_room_association WHERE room_id = ?1 ORDER BY rowid",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(repo_name, room_id, connected_at)| RepoRoomAssociation {
                repo_name,
                room_id,
                connected_at,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use octorelay_core::config::DatabaseConfig;

    use crate::connect;
    use crate::migrations::run_pending;
    use crate::repositories::{AssociationRepository, SqlAssociationRepository};

    async fn repository() -> (SqlAssociationRepository, crate::DbPool) {
        let pool = connect(&DatabaseConfig::memory()).await.expect("pool should connect");
        run_pending(&pool).await.expect("migrations should apply");
        (SqlAssociationRepository::new(pool.clone()), pool)
    }

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (repo, pool) = repository().await;

        repo.connect("acme/widgets", "room-1").await.expect("first connect");
        repo.connect("acme/widgets", "room-1").await.expect("second connect");

        let rooms = repo.rooms_for_repo("acme/widgets").await.expect("lookup");
        assert_eq!(rooms, vec!["room-1".to_string()]);

        pool.close().await;
    }

    #[tokio::test]
    async fn rooms_are_returned_in_stored_order() {
        let (repo, pool) = repository().await;

        repo.connect("acme/widgets", "room-b").await.expect("connect b");
        repo.connect("acme/widgets", "room-a").await.expect("connect a");

        let rooms = repo.rooms_for_repo("acme/widgets").await.expect("lookup");
        assert_eq!(rooms, vec!["room-b".to_string(), "room-a".to_string()]);

        pool.close().await;
    }

    #[tokio::test]
    async fn disconnect_removes_the_pair_and_tolerates_absence() {
        let (repo, pool) = repository().await;

        repo.connect("acme/widgets", "room-1").await.expect("connect");
        repo.disconnect("acme/widgets", "room-1").await.expect("disconnect");
        repo.disconnect("acme/widgets", "room-1").await.expect("repeat disconnect is a no-op");

        assert!(repo.rooms_for_repo("acme/widgets").await.expect("lookup").is_empty());
        assert!(repo.repos_for_room("room-1").await.expect("reverse lookup").is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn repos_for_room_returns_records_as_stored() {
        let (repo, pool) = repository().await;

        repo.connect("acme/widgets", "room-1").await.expect("connect widgets");
        repo.connect("acme/gadgets", "room-1").await.expect("connect gadgets");
        repo.connect("acme/widgets", "room-2").await.expect("connect other room");

        let records = repo.repos_for_room("room-1").await.expect("lookup");
        let names: Vec<&str> = records.iter().map(|r| r.repo_name.as_str()).collect();
        assert_eq!(names, vec!["acme/widgets", "acme/gadgets"]);
        assert!(records.iter().all(|r| r.room_id == "room-1"));

        pool.close().await;
    }
}
