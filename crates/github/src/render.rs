use octorelay_core::domain::repo::{API_REPOS_BASE_URL, WEB_BASE_URL};

use crate::event::{InboundEvent, PingPayload, PullRequestPayload, PushPayload};

/// Markdown link for the credited sender, derived once per delivery and
/// shared across the room fan-out.
pub fn sender_link(event: &InboundEvent) -> Option<String> {
    event.credited_sender().map(|sender| format!("[{}]({})", sender.login, sender.html_url))
}

/// Renders one notification text for the event. `sender` is the link from
/// [`sender_link`]; when absent it is rendered as an empty placeholder, not
/// an error (some deliveries carry no sender at all).
pub fn render(event: &InboundEvent, sender: Option<&str>) -> String {
    match event {
        InboundEvent::Ping(payload) => render_ping(payload),
        InboundEvent::Push(payload) => render_push(payload, sender),
        InboundEvent::PullRequest(payload) => render_pull_request(payload, sender),
    }
}

fn render_ping(payload: &PingPayload) -> String {
    let raw_url = payload
        .repository
        .as_ref()
        .and_then(|repo| repo.url.clone())
        .unwrap_or_else(|| payload.hook.url.clone());

    let repo_url = normalize_repo_url(&raw_url);
    let repo_path = repo_path_from_url(&repo_url);

    format!("Received ping from [{repo_path}]({repo_url})")
}

fn render_push(payload: &PushPayload, sender: Option<&str>) -> String {
    let repository = &payload.repository;
    let commit_url = format!("{}/commits/{}", repository.html_url, payload.after);

    let mut lines =
        vec![format!("Repository: [{}/{}]({commit_url})", repository.full_name, payload.git_ref)];

    if payload.deleted {
        lines.push("Branch was deleted".to_owned());
    } else if let Some(commit) = &payload.head_commit {
        // Commit messages can span many lines; only the subject is shown.
        let subject = commit.message.lines().next().unwrap_or_default().trim();
        lines.push(format!("Commit: {subject}"));
        lines.push(format!(
            "Changes: {} new, {} removed and {} modified files",
            commit.added.len(),
            commit.removed.len(),
            commit.modified.len()
        ));
    }

    if let Some(sender) = sender {
        lines.push(format!("Author: {sender}"));
    }

    lines.push(format!("[Click here for diff]({})", payload.compare));
    lines.join("\n")
}

fn render_pull_request(payload: &PullRequestPayload, sender: Option<&str>) -> String {
    let sender = sender.unwrap_or_default();
    let details = &payload.pull_request;
    let repository = &payload.repository;
    let target_branch = &details.base.name;

    let pr_link = format!(
        "[{}#{}]({}/pulls/{})",
        repository.full_name, payload.number, repository.html_url, payload.number
    );

    // The merged flag is only consulted for an explicit `closed` action.
    match payload.action.as_deref().unwrap_or("pushed") {
        "opened" => format!("{sender} has opened {pr_link} targeting branch {target_branch}"),
        "synchronize" => format!("{sender} has rebased {pr_link}"),
        "review_requested" => format!("{sender} requested review for {pr_link}"),
        "closed" if details.merged => format!(
            "{sender} has merged {pr_link} into [{}#{target_branch}]({}/tree/{target_branch})",
            repository.full_name, repository.html_url
        ),
        "closed" => format!("{sender} has closed {pr_link} without merging."),
        _ => format!(
            "{sender} has pushed {} commits changing {} files in {pr_link}.",
            details.commits, details.changed_files
        ),
    }
}

/// Rewrites an API-host repository URL onto the public web host and strips a
/// trailing `/hooks/<id>` suffix left by hook callback URLs.
fn normalize_repo_url(url: &str) -> String {
    let mut normalized = match url.strip_prefix(API_REPOS_BASE_URL) {
        Some(rest) => format!("{WEB_BASE_URL}{rest}"),
        None => url.to_owned(),
    };

    if let Some(index) = normalized.rfind("/hooks/") {
        let suffix = &normalized[index + "/hooks/".len()..];
        if !suffix.is_empty() && suffix.bytes().all(|byte| byte.is_ascii_digit()) {
            normalized.truncate(index);
        }
    }

    normalized
}

/// First two path segments of the URL, i.e. `owner/name`.
fn repo_path_from_url(url: &str) -> String {
    let after_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = after_scheme.split_once('/').map_or("", |(_, path)| path);

    path.split('/').filter(|segment| !segment.is_empty()).take(2).collect::<Vec<_>>().join("/")
}
