use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use octorelay_chat::{ChatHost, InMemoryChatHost};
use octorelay_core::config::{AppConfig, ConfigError, LoadOptions};
use octorelay_db::repositories::{
    AssociationRepository, SqlAssociationRepository, SqlTokenRepository, TokenRepository,
};
use octorelay_db::{connect, migrations, DbPool};
use octorelay_github::HookClient;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub associations: Arc<dyn AssociationRepository>,
    pub tokens: Arc<dyn TokenRepository>,
    pub hooks: Arc<HookClient>,
    pub chat: Arc<dyn ChatHost>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let associations: Arc<dyn AssociationRepository> =
        Arc::new(SqlAssociationRepository::new(db_pool.clone()));
    let tokens: Arc<dyn TokenRepository> = Arc::new(SqlTokenRepository::new(db_pool.clone()));
    let hooks = Arc::new(HookClient::new(&config.github));

    // No chat host adapter is wired yet; notifications land in the in-memory
    // host until a concrete transport is configured.
    let chat: Arc<dyn ChatHost> = Arc::new(InMemoryChatHost::default());
    info!(event_name = "system.bootstrap.chat_host", transport_mode = "noop", "chat host wired");

    Ok(Application { config, db_pool, associations, tokens, hooks, chat })
}

#[cfg(test)]
mod tests {
    use octorelay_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                relay_public_base_url: Some("https://relay.example.com".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_public_base_url() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("relay.public_base_url"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_store() {
        let app = bootstrap(valid_overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with valid overrides");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('repo_room_association', 'user_access_token')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema lookup should succeed");
        assert_eq!(table_count, 2);

        app.associations.connect("acme/widgets", "room-1").await.expect("connect");
        let rooms = app.associations.rooms_for_repo("acme/widgets").await.expect("lookup");
        assert_eq!(rooms, vec!["room-1".to_owned()]);

        app.db_pool.close().await;
    }
}
