use chrono::{DateTime, Local, TimeZone};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::{Result, UpdateError};
use crate::types::{CheckerConfig, Release, ReleaseResponse};

/// HTTP client for a GitHub-style release registry.
pub(crate) struct RegistryClient {
    http: Client,
    base_url: String,
    owner: String,
    repo: String,
    token: Option<String>,
    user_agent: String,
}

impl RegistryClient {
    pub(crate) fn new(config: &CheckerConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: config.base_url.clone(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            token: config.token.clone(),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Fetches the full release list for the configured repository.
    pub(crate) async fn fetch_releases(&self) -> Result<Vec<Release>> {
        let url = format!(
            "{}/repos/{}/{}/releases",
            self.base_url, self.owner, self.repo
        );
        debug!(%url, "fetching releases");

        let mut request = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", &self.user_agent);

        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::FORBIDDEN {
            let reset = rate_limit_reset(response.headers());
            // The 403 branch is not terminal: the body is still read before
            // the error is returned, so the rate-limit report and the
            // aborted fetch remain two separate failure events.
            let _ = response.text().await;
            return Err(match reset {
                Some(reset) => UpdateError::RateLimited { reset },
                None => UpdateError::Forbidden,
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpdateError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let releases: Vec<ReleaseResponse> = serde_json::from_str(&body)?;

        Ok(releases.into_iter().map(Release::from).collect())
    }
}

/// Reads the `X-RateLimit-Reset` header (unix seconds) as a local time.
fn rate_limit_reset(headers: &HeaderMap) -> Option<DateTime<Local>> {
    let raw = headers.get("x-ratelimit-reset")?.to_str().ok()?;
    let secs: i64 = raw.trim().parse().ok()?;
    Local.timestamp_opt(secs, 0).single()
}

/// Maximum length for an owner/organization name, enforced by GitHub.
const MAX_OWNER_LENGTH: usize = 39;

/// Maximum length for a repository name, enforced by GitHub.
const MAX_REPO_LENGTH: usize = 100;

/// Validates an owner name: alphanumeric or hyphens, cannot start or end
/// with a hyphen, max 39 chars.
pub(crate) fn is_valid_owner(owner: &str) -> bool {
    !owner.is_empty()
        && owner.len() <= MAX_OWNER_LENGTH
        && !owner.starts_with('-')
        && !owner.ends_with('-')
        && owner.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

/// Validates a repository name: alphanumeric, hyphens, underscores, or
/// dots, max 100 chars.
pub(crate) fn is_valid_repo_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_REPO_LENGTH
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_owner_names() {
        for owner in ["owner", "my-org", "Owner123", "a"] {
            assert!(is_valid_owner(owner), "expected '{}' to be valid", owner);
        }
    }

    #[test]
    fn test_invalid_owner_names() {
        let invalid = [
            "",
            "-owner",
            "owner-",
            "own er",
            "owner/extra",
            &"a".repeat(40),
        ];
        for owner in invalid {
            assert!(!is_valid_owner(owner), "expected '{}' to be invalid", owner);
        }
    }

    #[test]
    fn test_valid_repo_names() {
        for name in ["repo", "my-repo", "repo.js", "repo_name", "Repo456"] {
            assert!(is_valid_repo_name(name), "expected '{}' to be valid", name);
        }
    }

    #[test]
    fn test_invalid_repo_names() {
        let invalid = ["", "repo name", "repo/extra", &"a".repeat(101)];
        for name in invalid {
            assert!(
                !is_valid_repo_name(name),
                "expected '{}' to be invalid",
                name
            );
        }
    }

    #[test]
    fn test_rate_limit_reset_header_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", "1700000000".parse().unwrap());
        let reset = rate_limit_reset(&headers).unwrap();
        assert_eq!(reset.timestamp(), 1700000000);

        let mut garbage = HeaderMap::new();
        garbage.insert("x-ratelimit-reset", "soon".parse().unwrap());
        assert!(rate_limit_reset(&garbage).is_none());

        assert!(rate_limit_reset(&HeaderMap::new()).is_none());
    }
}
