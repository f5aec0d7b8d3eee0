use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{error, info, warn};

use octorelay_chat::{
    decode_form_component, ChatHost, CommandContext, CommandRouteError, CommandRouter,
    GithubCommandService, SlashCommandPayload,
};
use octorelay_core::{OutgoingMessage, RepoName};
use octorelay_db::repositories::{AssociationRepository, TokenRepository};
use octorelay_github::{hook_id_from_url, HookClient};

const MISSING_TOKEN_MESSAGE: &str =
    "You haven't configured your access key yet. Please run `/github set-token YOUR_ACCESS_TOKEN`";

#[derive(Clone)]
pub struct CommandState {
    router: Arc<CommandRouter<RelayCommandService>>,
    chat: Arc<dyn ChatHost>,
}

impl CommandState {
    pub fn new(service: RelayCommandService, chat: Arc<dyn ChatHost>) -> Self {
        Self { router: Arc::new(CommandRouter::new(service)), chat }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlashAck {
    pub success: bool,
}

pub fn router(state: CommandState) -> Router {
    Router::new().route("/slash", post(receive_slash)).with_state(state)
}

/// Accepts one form-encoded slash-command invocation and posts every
/// resulting notification back into the invoking room.
async fn receive_slash(
    State(state): State<CommandState>,
    body: Bytes,
) -> (StatusCode, Json<SlashAck>) {
    let Ok(raw) = std::str::from_utf8(&body) else {
        return (StatusCode::BAD_REQUEST, Json(SlashAck { success: false }));
    };
    let Some(payload) = parse_slash_form(raw) else {
        warn!(event_name = "command.ingress.malformed", "discarding malformed slash payload");
        return (StatusCode::BAD_REQUEST, Json(SlashAck { success: false }));
    };

    let room_id = payload.room_id.clone();
    info!(
        event_name = "command.received",
        command = %payload.command,
        room_id = %room_id,
        user_id = %payload.user_id,
        "slash command received"
    );

    let replies = match state.router.route(payload).await {
        Ok(replies) => replies,
        Err(CommandRouteError::Service(detail)) => {
            error!(
                event_name = "command.service.error",
                room_id = %room_id,
                error = %detail,
                "command service failed"
            );
            vec!["Something went wrong. Please check the logs for more info.".to_owned()]
        }
    };

    for text in replies {
        if let Err(send_error) = state.chat.send(OutgoingMessage::plain(room_id.clone(), text)).await {
            error!(
                event_name = "command.notify.failed",
                room_id = %room_id,
                error = %send_error,
                "failed to post command notification"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(SlashAck { success: false }));
        }
    }

    (StatusCode::OK, Json(SlashAck { success: true }))
}

fn parse_slash_form(body: &str) -> Option<SlashCommandPayload> {
    let mut command = None;
    let mut text = None;
    let mut user_id = None;
    let mut room_id = None;

    for pair in body.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=')?;
        let value = decode_form_component(value)?;
        match key {
            "command" => command = Some(value),
            "text" => text = Some(value),
            "user_id" => user_id = Some(value),
            "channel_id" => room_id = Some(value),
            _ => {}
        }
    }

    Some(SlashCommandPayload {
        command: command?,
        text: text.unwrap_or_default(),
        user_id: user_id?,
        room_id: room_id?,
    })
}

/// Command handlers composing the association store, the hook client and
/// the chat host. Per-repository failures become notification texts so one
/// bad repository never blocks its siblings.
pub struct RelayCommandService {
    associations: Arc<dyn AssociationRepository>,
    tokens: Arc<dyn TokenRepository>,
    hooks: Arc<HookClient>,
    chat: Arc<dyn ChatHost>,
    webhook_url: String,
}

impl RelayCommandService {
    pub fn new(
        associations: Arc<dyn AssociationRepository>,
        tokens: Arc<dyn TokenRepository>,
        hooks: Arc<HookClient>,
        chat: Arc<dyn ChatHost>,
        webhook_url: String,
    ) -> Self {
        Self { associations, tokens, hooks, chat, webhook_url }
    }

    async fn stored_token(
        &self,
        user_id: &str,
    ) -> Result<Option<SecretString>, CommandRouteError> {
        self.tokens
            .access_token(user_id)
            .await
            .map_err(|store_error| CommandRouteError::Service(store_error.to_string()))
    }

    async fn room_display_name(&self, room_id: &str) -> String {
        match self.chat.room_by_id(room_id).await {
            Ok(Some(room)) => room.display_name,
            Ok(None) | Err(_) => room_id.to_owned(),
        }
    }

    async fn connect_one(
        &self,
        repo_ref: &str,
        token: &SecretString,
        ctx: &CommandContext,
    ) -> Vec<String> {
        let Some(repo) = RepoName::parse(repo_ref) else {
            return vec![format!("Invalid GitHub repo address: {repo_ref}")];
        };

        let mut replies = Vec::new();
        match self.hooks.create_hook(token, &repo, &self.webhook_url).await {
            Ok(()) => {}
            Err(api_error) if api_error.is_missing_hook_scope() => {
                warn!(
                    event_name = "command.connect.manual_hook",
                    repo_name = %repo,
                    "credential cannot manage hooks, asking for manual configuration"
                );
                let room_name = self.room_display_name(&ctx.room_id).await;
                replies.push(manual_hook_instructions(repo_ref, &self.webhook_url, &room_name));
            }
            Err(api_error) => {
                error!(
                    event_name = "command.connect.failed",
                    repo_name = %repo,
                    error = %api_error,
                    "hook creation failed"
                );
                replies.push(format!(
                    "Failed to connect {repo_ref} to this room!\nPlease check the logs for more info."
                ));
                return replies;
            }
        }

        if let Err(store_error) = self.associations.connect(repo.as_str(), &ctx.room_id).await {
            error!(
                event_name = "command.connect.store_failed",
                repo_name = %repo,
                error = %store_error,
                "association write failed"
            );
            replies.push(format!(
                "Failed to connect {repo_ref} to this room!\nPlease check the logs for more info."
            ));
            return replies;
        }

        info!(
            event_name = "command.connect.succeeded",
            repo_name = %repo,
            room_id = %ctx.room_id,
            "repository connected"
        );
        replies.push(format!("Successfully connected {repo_ref} to this room."));
        replies
    }

    async fn disconnect_one(
        &self,
        repo_ref: &str,
        token: &SecretString,
        ctx: &CommandContext,
    ) -> Vec<String> {
        let Some(repo) = RepoName::parse(repo_ref) else {
            return vec![format!("Invalid GitHub repo address: {repo_ref}")];
        };

        let mut replies = Vec::new();
        match self.hooks.delete_all_matching(token, &repo, &self.webhook_url).await {
            Ok(()) => {}
            Err(api_error) if api_error.is_missing_hook_scope() => {
                warn!(
                    event_name = "command.disconnect.manual_hook",
                    repo_name = %repo,
                    "credential cannot manage hooks, asking for manual deletion"
                );
                let room_name = self.room_display_name(&ctx.room_id).await;
                replies.push(format!(
                    "Unable to delete hook for repository {repo_ref}!\nYou need to delete it yourself!\n\nDisconnecting {repo_ref} from {room_name}..."
                ));
            }
            Err(api_error) => {
                error!(
                    event_name = "command.disconnect.failed",
                    repo_name = %repo,
                    error = %api_error,
                    "hook deletion failed"
                );
                replies.push(format!(
                    "Failed to disconnect {repo_ref} from this room!\nPlease check the logs for more info."
                ));
                return replies;
            }
        }

        if let Err(store_error) = self.associations.disconnect(repo.as_str(), &ctx.room_id).await {
            error!(
                event_name = "command.disconnect.store_failed",
                repo_name = %repo,
                error = %store_error,
                "association removal failed"
            );
            replies.push(format!(
                "Failed to disconnect {repo_ref} from this room!\nPlease check the logs for more info."
            ));
            return replies;
        }

        info!(
            event_name = "command.disconnect.succeeded",
            repo_name = %repo,
            room_id = %ctx.room_id,
            "repository disconnected"
        );
        replies.push(format!("Successfully disconnected from {repo_ref}!"));
        replies
    }

    async fn ping_one(&self, repo_ref: &str, token: &SecretString) -> Vec<String> {
        let Some(repo) = RepoName::parse(repo_ref) else {
            return vec![format!("Invalid GitHub repo address: {repo_ref}")];
        };

        let found = match self.hooks.list_matching_hooks(token, &repo, &self.webhook_url).await {
            Ok(found) => found,
            Err(api_error) => {
                error!(
                    event_name = "command.ping.list_failed",
                    repo_name = %repo,
                    error = %api_error,
                    "hook lookup failed"
                );
                return vec![format!(
                    "Failed to look up hooks for {repo_ref}!\nPlease check the logs for more info."
                )];
            }
        };

        let Some(hook_id) = found.first().and_then(|hook_url| hook_id_from_url(hook_url)) else {
            return vec![format!("No hooks found for {repo_ref}")];
        };

        let mut replies = vec![format!(
            "Testing hook {}/settings/hooks/{hook_id} - a message should pop-up right about now.",
            repo.web_url()
        )];

        match self.hooks.test_hook(token, &repo, hook_id).await {
            Ok(()) => {
                replies.push("If no message was received by now you should check the logs.".to_owned());
            }
            Err(api_error) => {
                error!(
                    event_name = "command.ping.test_failed",
                    repo_name = %repo,
                    hook_id,
                    error = %api_error,
                    "test delivery request failed"
                );
                replies.push(format!("Error testing hook {hook_id} for {repo_ref}"));
            }
        }

        replies
    }
}

#[async_trait]
impl GithubCommandService for RelayCommandService {
    async fn connect(
        &self,
        repo_refs: &[String],
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError> {
        let Some(token) = self.stored_token(&ctx.user_id).await? else {
            return Ok(vec![MISSING_TOKEN_MESSAGE.to_owned()]);
        };

        let mut replies = Vec::new();
        for repo_ref in repo_refs {
            replies.extend(self.connect_one(repo_ref, &token, ctx).await);
        }
        Ok(replies)
    }

    async fn disconnect(
        &self,
        repo_refs: &[String],
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError> {
        let Some(token) = self.stored_token(&ctx.user_id).await? else {
            return Ok(vec![MISSING_TOKEN_MESSAGE.to_owned()]);
        };

        let mut replies = Vec::new();
        for repo_ref in repo_refs {
            replies.extend(self.disconnect_one(repo_ref, &token, ctx).await);
        }
        Ok(replies)
    }

    async fn list(&self, ctx: &CommandContext) -> Result<Vec<String>, CommandRouteError> {
        let records = self
            .associations
            .repos_for_room(&ctx.room_id)
            .await
            .map_err(|store_error| CommandRouteError::Service(store_error.to_string()))?;

        let mut message = "Repositories assigned to this room are:\n\n".to_owned();
        if records.is_empty() {
            message.push_str("None found!");
        } else {
            for record in records {
                message.push_str(&format!("- {}\n", record.repo_name));
            }
        }
        Ok(vec![message])
    }

    async fn set_token(
        &self,
        token: SecretString,
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError> {
        self.tokens
            .set_access_token(&ctx.user_id, token)
            .await
            .map_err(|store_error| CommandRouteError::Service(store_error.to_string()))?;

        info!(
            event_name = "command.set_token.succeeded",
            user_id = %ctx.user_id,
            "access token stored"
        );
        Ok(vec!["Your GitHub access token has been stored.".to_owned()])
    }

    async fn ping(
        &self,
        repo_refs: &[String],
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError> {
        let Some(token) = self.stored_token(&ctx.user_id).await? else {
            return Ok(vec![MISSING_TOKEN_MESSAGE.to_owned()]);
        };

        let mut replies = Vec::new();
        for repo_ref in repo_refs {
            replies.extend(self.ping_one(repo_ref, &token).await);
        }
        Ok(replies)
    }
}

fn manual_hook_instructions(repo_ref: &str, webhook_url: &str, room_name: &str) -> String {
    format!(
        "Unable to create hook for repo {repo_ref}!\n\
         You need to add one yourself:\n\n\
         ```\n\
         Payload: {webhook_url}\n\
         Content type: application/json\n\
         Let me select individual events:\n \
         - Pushes\n \
         - Pull requests\n\
         ```\n\n\
         Connecting {repo_ref} to {room_name}..."
    )
}
