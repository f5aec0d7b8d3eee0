use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// The event-kind indicator carried in the `X-GitHub-Event` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Ping,
    Push,
    PullRequest,
    Unknown,
}

impl EventKind {
    pub fn from_header(raw: &str) -> Self {
        match raw {
            "ping" => Self::Ping,
            "push" => Self::Push,
            "pull_request" => Self::PullRequest,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct GithubUser {
    pub login: String,
    pub html_url: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub html_url: String,
    /// Canonical API URL; pings normalize this to the public web host.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HookInfo {
    #[serde(default)]
    pub id: Option<u64>,
    /// Callback URL of the hook itself, e.g.
    /// `https://api.github.com/repos/acme/widgets/hooks/123`.
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PingPayload {
    pub hook: HookInfo,
    #[serde(default)]
    pub repository: Option<Repository>,
    #[serde(default)]
    pub sender: Option<GithubUser>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct HeadCommit {
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub deleted: bool,
    pub compare: String,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
    pub repository: Repository,
    #[serde(default)]
    pub sender: Option<GithubUser>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PullRequestDetails {
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merged_by: Option<GithubUser>,
    #[serde(default)]
    pub commits: u64,
    #[serde(default)]
    pub changed_files: u64,
    pub base: BranchRef,
    pub head: BranchRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PullRequestPayload {
    #[serde(default)]
    pub action: Option<String>,
    pub number: u64,
    pub pull_request: PullRequestDetails,
    pub repository: Repository,
    #[serde(default)]
    pub sender: Option<GithubUser>,
}

/// One decoded webhook delivery. Closed over the kinds this relay renders;
/// unknown kinds are acknowledged upstream and never reach this type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    Ping(PingPayload),
    Push(PushPayload),
    PullRequest(PullRequestPayload),
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("cannot decode unsupported event kind `{0}`")]
    UnsupportedKind(String),
    #[error("malformed {kind} payload: {source}")]
    Payload { kind: &'static str, source: serde_json::Error },
}

impl InboundEvent {
    pub fn decode(kind: EventKind, payload: &Value) -> Result<Self, EventDecodeError> {
        match kind {
            EventKind::Ping => serde_json::from_value(payload.clone())
                .map(Self::Ping)
                .map_err(|source| EventDecodeError::Payload { kind: "ping", source }),
            EventKind::Push => serde_json::from_value(payload.clone())
                .map(Self::Push)
                .map_err(|source| EventDecodeError::Payload { kind: "push", source }),
            EventKind::PullRequest => serde_json::from_value(payload.clone())
                .map(Self::PullRequest)
                .map_err(|source| EventDecodeError::Payload { kind: "pull_request", source }),
            EventKind::Unknown => {
                Err(EventDecodeError::UnsupportedKind(kind.as_str().to_owned()))
            }
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::Ping(_) => EventKind::Ping,
            Self::Push(_) => EventKind::Push,
            Self::PullRequest(_) => EventKind::PullRequest,
        }
    }

    /// `owner/name` of the repository, when the payload carries one. Ping
    /// deliveries may not.
    pub fn repository_full_name(&self) -> Option<&str> {
        match self {
            Self::Ping(payload) => {
                payload.repository.as_ref().map(|repo| repo.full_name.as_str())
            }
            Self::Push(payload) => Some(payload.repository.full_name.as_str()),
            Self::PullRequest(payload) => Some(payload.repository.full_name.as_str()),
        }
    }

    /// The GitHub actor credited in notifications. On a merge the merger is
    /// credited, not the original sender; otherwise the payload sender.
    pub fn credited_sender(&self) -> Option<&GithubUser> {
        if let Self::PullRequest(payload) = self {
            if let Some(merged_by) = payload.pull_request.merged_by.as_ref() {
                return Some(merged_by);
            }
        }

        match self {
            Self::Ping(payload) => payload.sender.as_ref(),
            Self::Push(payload) => payload.sender.as_ref(),
            Self::PullRequest(payload) => payload.sender.as_ref(),
        }
    }
}
