use serde::{Deserialize, Serialize};

/// Public web host repository links and references resolve against.
pub const WEB_BASE_URL: &str = "https://github.com/";

/// API host hook management calls go to, already scoped to `/repos/`.
pub const API_REPOS_BASE_URL: &str = "https://api.github.com/repos/";

/// A repository's full `owner/name` path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoName(String);

impl RepoName {
    /// Normalizes a user-supplied repository reference.
    ///
    /// Accepts a full `https://github.com/<owner>/<repo>` URL (any trailing
    /// path segments are dropped) or a bare `owner/repo` token with exactly
    /// one slash. Anything else is rejected.
    pub fn parse(reference: &str) -> Option<Self> {
        let trimmed = reference.trim();

        if let Some(path) = trimmed.strip_prefix(WEB_BASE_URL) {
            let mut segments = path.split('/').filter(|segment| !segment.is_empty());
            let owner = segments.next()?;
            let name = segments.next()?;
            return Some(Self(format!("{owner}/{name}")));
        }

        if trimmed.contains("://") {
            return None;
        }

        let (owner, name) = trimmed.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }

        Some(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The repository's page on the public web host.
    pub fn web_url(&self) -> String {
        format!("{WEB_BASE_URL}{}", self.0)
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
