use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use octorelay_core::config::GithubConfig;
use octorelay_core::RepoName;

/// Event kinds every hook created by this relay subscribes to.
pub const HOOK_EVENTS: &[&str] = &["push", "pull_request", "issue_comment", "issues"];

#[derive(Debug, Error)]
pub enum GithubApiError {
    #[error("github request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("github api returned status {status}")]
    Status { status: u16, body: String },
}

impl GithubApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    /// GitHub answers 404 when the credential lacks the hook-management
    /// scope; callers fall back to a manual-configuration message.
    pub fn is_missing_hook_scope(&self) -> bool {
        self.status() == Some(404)
    }
}

/// A hook as listed by the GitHub API. Owned by GitHub; this relay only
/// matches on the configured target URL and never caches these.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteHook {
    pub id: u64,
    pub url: String,
    pub active: bool,
    pub config: RemoteHookConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RemoteHookConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Hook lifecycle client. Credentials are supplied per call; the client
/// itself holds no token.
pub struct HookClient {
    http: Client,
    api_base: String,
    user_agent: String,
}

impl HookClient {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config.api_base_url.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    fn hooks_url(&self, repo: &RepoName) -> String {
        format!("{}{}/hooks", self.api_base, repo)
    }

    /// URLs of active hooks whose configured target equals `target_url`, in
    /// the API's listing order.
    pub async fn list_matching_hooks(
        &self,
        token: &SecretString,
        repo: &RepoName,
        target_url: &str,
    ) -> Result<Vec<String>, GithubApiError> {
        let url = self.hooks_url(repo);
        debug!(event_name = "github.hooks.list", repo = %repo, %url, "listing remote hooks");

        let response = self
            .http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        let response = check_status(response).await?;

        let hooks: Vec<RemoteHook> = response.json().await?;
        Ok(hooks
            .into_iter()
            .filter(|hook| hook.active && hook.config.url.as_deref() == Some(target_url))
            .map(|hook| hook.url)
            .collect())
    }

    /// Registers a hook pointing at `target_url`. Pre-existing hooks with
    /// the same target are deleted first, so exactly one active hook
    /// targets the relay after a successful call.
    pub async fn create_hook(
        &self,
        token: &SecretString,
        repo: &RepoName,
        target_url: &str,
    ) -> Result<(), GithubApiError> {
        self.delete_all_matching(token, repo, target_url).await?;

        let body = json!({
            "active": true,
            "events": HOOK_EVENTS,
            "config": {
                "url": target_url,
                "content_type": "json",
            },
        });

        let response = self
            .http
            .post(self.hooks_url(repo))
            .bearer_auth(token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        info!(event_name = "github.hooks.created", repo = %repo, target_url, "remote hook created");
        Ok(())
    }

    /// Deletes every active hook targeting `target_url`. Logs and no-ops
    /// when none match.
    pub async fn delete_all_matching(
        &self,
        token: &SecretString,
        repo: &RepoName,
        target_url: &str,
    ) -> Result<(), GithubApiError> {
        let matching = self.list_matching_hooks(token, repo, target_url).await?;

        if matching.is_empty() {
            info!(
                event_name = "github.hooks.none_matched",
                repo = %repo,
                target_url,
                "no hooks pointing at the relay were found"
            );
            return Ok(());
        }

        for hook_url in matching {
            info!(event_name = "github.hooks.deleting", repo = %repo, %hook_url, "deleting remote hook");
            let response = self
                .http
                .delete(hook_url.trim())
                .bearer_auth(token.expose_secret())
                .header(CONTENT_TYPE, "application/json")
                .header(USER_AGENT, &self.user_agent)
                .send()
                .await?;
            check_status(response).await?;
        }

        Ok(())
    }

    /// Triggers the API's test delivery for one hook id.
    pub async fn test_hook(
        &self,
        token: &SecretString,
        repo: &RepoName,
        hook_id: u64,
    ) -> Result<(), GithubApiError> {
        let url = format!("{}/{hook_id}/tests", self.hooks_url(repo));

        let response = self
            .http
            .post(&url)
            .bearer_auth(token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await?;
        check_status(response).await?;

        Ok(())
    }
}

/// Trailing numeric id of a hook URL, e.g.
/// `https://api.github.com/repos/acme/widgets/hooks/42` → 42.
pub fn hook_id_from_url(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GithubApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GithubApiError::Status { status: status.as_u16(), body })
}
