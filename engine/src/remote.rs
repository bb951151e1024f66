//! Remote repositories
//!
//! The summarizer and the explainer accept a Git URL in place of a local
//! directory. Repositories are shallow-cloned with the system `git`.

use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use url::Url;

/// Remote repository errors
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid repository URL: {0}")]
    InvalidUrl(String),

    #[error("git error: {0}")]
    Git(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Shorthand prefixes and the hosts they clone from
const SHORTHAND_HOSTS: [(&str, &str); 3] = [
    ("github:", "github.com"),
    ("gitlab:", "gitlab.com"),
    ("bitbucket:", "bitbucket.org"),
];

/// A repository to clone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRepo {
    /// URL handed to `git clone`
    pub url: String,
    /// Repository name, without `.git`
    pub name: String,
    /// Branch from a `/tree/<branch>` URL
    pub branch: Option<String>,
}

impl RemoteRepo {
    /// Parse a repository reference. Supports:
    /// - `https://host/owner/repo[.git][/tree/branch]`
    /// - `git@host:owner/repo.git`
    /// - `github:owner/repo`, `gitlab:owner/repo`, `bitbucket:owner/repo`
    /// - `owner/repo` (assumes GitHub)
    pub fn parse(input: &str) -> Result<Self, RemoteError> {
        let input = input.trim();

        for (prefix, host) in SHORTHAND_HOSTS {
            if let Some(rest) = input.strip_prefix(prefix) {
                return Self::parse_shorthand(rest, host);
            }
        }
        if !input.contains("://") && !input.contains('@') && input.contains('/') {
            return Self::parse_shorthand(input, "github.com");
        }

        if let Some(rest) = input.strip_prefix("git@") {
            let (_, path) = rest
                .split_once(':')
                .ok_or_else(|| RemoteError::InvalidUrl(input.to_owned()))?;
            let (name, _) = repo_name(path).ok_or_else(|| RemoteError::InvalidUrl(input.to_owned()))?;
            return Ok(Self { url: input.to_owned(), name, branch: None });
        }

        let url = Url::parse(input).map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", input, e)))?;
        if !matches!(url.scheme(), "http" | "https" | "git" | "ssh") {
            return Err(RemoteError::InvalidUrl(format!("unsupported scheme '{}'", url.scheme())));
        }

        let path = url.path().trim_matches('/');
        let (name, branch) = repo_name(path).ok_or_else(|| RemoteError::InvalidUrl(input.to_owned()))?;

        // Strip `/tree/<branch>/...` so the clone URL points at the repository
        let clone_url = match path.find("/tree/").or_else(|| path.find("/blob/")) {
            Some(idx) => {
                let mut base = url.clone();
                base.set_path(&path[..idx]);
                base.to_string()
            },
            None => input.to_owned(),
        };

        Ok(Self { url: clone_url, name, branch })
    }

    /// `owner/repo[.git][/tree/branch]` on a known host
    fn parse_shorthand(path: &str, host: &str) -> Result<Self, RemoteError> {
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() < 2 || parts[0].is_empty() || parts[1].is_empty() {
            return Err(RemoteError::InvalidUrl(format!("invalid shorthand: {}", path)));
        }

        let (name, branch) = repo_name(path).ok_or_else(|| RemoteError::InvalidUrl(path.to_owned()))?;
        Ok(Self {
            url: format!("https://{}/{}/{}.git", host, parts[0], name),
            name,
            branch,
        })
    }

    /// Whether a CLI argument names a remote repository rather than a path.
    /// A bare `owner/repo` counts; deeper relative paths and paths starting
    /// with `/` or `.` do not.
    pub fn is_remote_url(input: &str) -> bool {
        let input = input.trim();
        input.contains("://")
            || input.starts_with("git@")
            || SHORTHAND_HOSTS.iter().any(|(prefix, _)| input.starts_with(prefix))
            || (input.contains('/')
                && !input.starts_with('/')
                && !input.starts_with('.')
                && input.matches('/').count() == 1)
    }

    /// Shallow-clone into `target`, replacing whatever is there
    pub fn clone_into(&self, target: &Path) -> Result<PathBuf, RemoteError> {
        if target.exists() {
            std::fs::remove_dir_all(target)?;
        }

        let mut cmd = Command::new("git");
        cmd.args(["clone", "--depth", "1"]);
        if let Some(branch) = &self.branch {
            cmd.arg("--branch").arg(branch);
        }
        cmd.arg(&self.url).arg(target);

        log::info!("Cloning {} into {}", self.url, target.display());
        let output = cmd
            .output()
            .map_err(|e| RemoteError::Git(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemoteError::Git(format!("git clone failed: {}", stderr.trim())));
        }

        Ok(target.to_path_buf())
    }

    /// Default clone location under the system temp directory
    pub fn default_target(&self) -> PathBuf {
        std::env::temp_dir().join(format!("condense-{}", self.name))
    }
}

/// `owner/repo[.git][/tree/branch/...]` -> (`repo`, branch)
fn repo_name(path: &str) -> Option<(String, Option<String>)> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() < 2 {
        return None;
    }

    let name = parts[1].trim_end_matches(".git").to_owned();
    let branch = match parts.get(2) {
        Some(&"tree") | Some(&"blob") => parts.get(3).map(|b| (*b).to_owned()),
        _ => None,
    };
    Some((name, branch))
}
