//! Chat host boundary and slash-command surface.
//!
//! The chat host's own primitives (room registry, message delivery) live
//! behind the `ChatHost` trait; this relay only composes them. The command
//! side turns `/github ...` text into a classified command and routes it to
//! a `GithubCommandService`.

pub mod commands;
pub mod host;

pub use commands::{
    classify_github_command, decode_form_component, CommandContext, CommandParseError,
    CommandRouteError, CommandRouter, GithubCommand, GithubCommandService, SlashCommandPayload,
};
pub use host::{ChatHost, ChatHostError, InMemoryChatHost, Room};
