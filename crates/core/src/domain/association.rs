use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored repository↔room link. Many-to-many: a repository may notify
/// several rooms and a room may track several repositories.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoomAssociation {
    pub repo_name: String,
    pub room_id: String,
    pub connected_at: DateTime<Utc>,
}
