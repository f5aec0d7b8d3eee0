pub mod config;
pub mod domain;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::association::RepoRoomAssociation;
pub use domain::message::OutgoingMessage;
pub use domain::repo::RepoName;
