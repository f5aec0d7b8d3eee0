use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;

/// One slash-command invocation as delivered by the chat host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub room_id: String,
    pub user_id: String,
}

/// Invoker identity threaded through every command handler; no global
/// request state exists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandContext {
    pub user_id: String,
    pub room_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GithubCommand {
    Connect { repo_refs: Vec<String> },
    Disconnect { repo_refs: Vec<String> },
    List,
    SetToken { token: Option<String> },
    Ping { repo_refs: Vec<String> },
    Help,
    Unknown { verb: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unsupported slash command: {0}")]
    UnsupportedCommand(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
}

/// Splits the slash text into a verb and its arguments. An empty text is
/// treated as `help`.
pub fn classify_github_command(text: &str) -> GithubCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return GithubCommand::Help;
    }

    let mut parts = trimmed.split_whitespace();
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<String> = parts.map(str::to_owned).collect();

    match verb.as_str() {
        "connect" => GithubCommand::Connect { repo_refs: args },
        "disconnect" => GithubCommand::Disconnect { repo_refs: args },
        "list" => GithubCommand::List,
        "set-token" => GithubCommand::SetToken { token: args.into_iter().next() },
        "ping" => GithubCommand::Ping { repo_refs: args },
        "help" => GithubCommand::Help,
        _ => GithubCommand::Unknown { verb },
    }
}

pub fn normalize_github_command(
    payload: SlashCommandPayload,
) -> Result<(GithubCommand, CommandContext), CommandParseError> {
    if payload.command != "/github" {
        return Err(CommandParseError::UnsupportedCommand(payload.command));
    }

    let context = CommandContext { user_id: payload.user_id, room_id: payload.room_id };
    Ok((classify_github_command(&payload.text), context))
}

/// Command implementations compose the association store and the hook
/// manager. Every outcome, including failures, comes back as user-facing
/// notification texts; a raw error never crosses this boundary.
#[async_trait]
pub trait GithubCommandService: Send + Sync {
    async fn connect(
        &self,
        repo_refs: &[String],
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError>;

    async fn disconnect(
        &self,
        repo_refs: &[String],
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError>;

    async fn list(&self, ctx: &CommandContext) -> Result<Vec<String>, CommandRouteError>;

    async fn set_token(
        &self,
        token: SecretString,
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError>;

    async fn ping(
        &self,
        repo_refs: &[String],
        ctx: &CommandContext,
    ) -> Result<Vec<String>, CommandRouteError>;
}

pub struct CommandRouter<S> {
    service: S,
}

impl<S> CommandRouter<S>
where
    S: GithubCommandService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub async fn route(
        &self,
        payload: SlashCommandPayload,
    ) -> Result<Vec<String>, CommandRouteError> {
        let (command, context) = match normalize_github_command(payload) {
            Ok(parsed) => parsed,
            Err(CommandParseError::UnsupportedCommand(command)) => {
                return Ok(vec![format!("Unsupported slash command `{command}`.")]);
            }
        };

        match command {
            GithubCommand::Connect { repo_refs } if repo_refs.is_empty() => {
                Ok(vec![usage("connect")])
            }
            GithubCommand::Connect { repo_refs } => {
                self.service.connect(&repo_refs, &context).await
            }
            GithubCommand::Disconnect { repo_refs } if repo_refs.is_empty() => {
                Ok(vec![usage("disconnect")])
            }
            GithubCommand::Disconnect { repo_refs } => {
                self.service.disconnect(&repo_refs, &context).await
            }
            GithubCommand::List => self.service.list(&context).await,
            GithubCommand::SetToken { token: None } => {
                Ok(vec!["Usage: `/github set-token YOUR_ACCESS_TOKEN`".to_owned()])
            }
            GithubCommand::SetToken { token: Some(token) } => {
                self.service.set_token(SecretString::from(token), &context).await
            }
            GithubCommand::Ping { repo_refs } if repo_refs.is_empty() => {
                Ok(vec!["To ping a hook you must provide a valid REPO_URL!".to_owned()])
            }
            GithubCommand::Ping { repo_refs } => self.service.ping(&repo_refs, &context).await,
            GithubCommand::Help => Ok(vec![help_text()]),
            GithubCommand::Unknown { verb } => {
                Ok(vec![format!("Unsupported command `/github {verb}`. Try `/github help`.")])
            }
        }
    }
}

fn usage(verb: &str) -> String {
    format!("Usage: `/github {verb} REPO_URL REPO_URL2 REPO_URL3`")
}

pub fn help_text() -> String {
    [
        "Manage GitHub notifications for this room:",
        "`/github connect REPO_URL ...` - relay repository events here",
        "`/github disconnect REPO_URL ...` - stop relaying a repository",
        "`/github list` - repositories connected to this room",
        "`/github set-token YOUR_ACCESS_TOKEN` - store your GitHub token",
        "`/github ping REPO_URL ...` - trigger a test delivery",
    ]
    .join("\n")
}

/// Percent-decodes one form-encoded component (`+` is a space). Returns
/// `None` for truncated or non-UTF-8 escapes.
pub fn decode_form_component(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0usize;

    while index < bytes.len() {
        match bytes[index] {
            b'%' => {
                if index + 2 >= bytes.len() {
                    return None;
                }
                let hex = std::str::from_utf8(&bytes[index + 1..index + 3]).ok()?;
                let byte = u8::from_str_radix(hex, 16).ok()?;
                decoded.push(byte);
                index += 3;
            }
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }

    String::from_utf8(decoded).ok()
}
