//! GitHub Integration - inbound events and hook lifecycle
//!
//! This crate provides the GitHub side of octorelay:
//! - **Events** (`event`) - decoded webhook payloads (ping, push,
//!   pull_request) and the credited-sender rule
//! - **Rendering** (`render`) - one notification text per event kind
//! - **Hooks** (`hooks`) - idempotent remote webhook lifecycle against the
//!   GitHub API (list, create, delete, test)

pub mod event;
pub mod hooks;
pub mod render;

pub use event::{EventDecodeError, EventKind, InboundEvent};
pub use hooks::{hook_id_from_url, GithubApiError, HookClient, RemoteHook};
