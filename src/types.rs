use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::version::Version;

/// Configuration for an [`UpdateChecker`](crate::UpdateChecker).
///
/// Built with the consuming-builder pattern and frozen once handed to the
/// checker: the background task reads a snapshot fixed at construction, so
/// there is no concurrent-mutation hazard.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// The organization or user owning the repository.
    pub owner: String,
    /// The repository name.
    pub repo: String,
    /// The local version to compare remote releases against.
    pub local_version: Option<String>,
    /// Optional API token, sent as `Authorization: Token {token}`.
    pub token: Option<String>,
    /// Value of the `User-Agent` header identifying the requester.
    pub user_agent: String,
    /// Interval between scheduled checks. Default is 1 minute.
    pub refresh_interval: Duration,
    /// Whether prereleases qualify for selection.
    pub include_prereleases: bool,
    /// Suppresses scheduled checks entirely while set.
    pub hide_notifications: bool,
    /// Run a single scheduled check and stop.
    pub run_once: bool,
    /// Base URL for the registry API (for testing). Defaults to
    /// "https://api.github.com".
    pub(crate) base_url: String,
}

impl CheckerConfig {
    /// Creates a new config for the given owner and repository.
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            local_version: None,
            token: None,
            user_agent: concat!("relwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            refresh_interval: Duration::from_secs(60),
            include_prereleases: false,
            hide_notifications: false,
            run_once: false,
            base_url: "https://api.github.com".to_string(),
        }
    }

    /// Sets a custom base URL (for testing).
    #[doc(hidden)]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the local version string.
    pub fn local_version(mut self, version: impl Into<String>) -> Self {
        self.local_version = Some(version.into());
        self
    }

    /// Sets the API token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the `User-Agent` identity for requests.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the interval between scheduled checks, in minutes.
    pub fn refresh_minutes(mut self, minutes: u64) -> Self {
        self.refresh_interval = Duration::from_secs(minutes * 60);
        self
    }

    /// Sets the interval between scheduled checks directly.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Allows prereleases to qualify as the latest release.
    pub fn include_prereleases(mut self, include: bool) -> Self {
        self.include_prereleases = include;
        self
    }

    /// Hides notifications: the scheduler skips its check while set.
    pub fn hide_notifications(mut self, hide: bool) -> Self {
        self.hide_notifications = hide;
        self
    }

    /// Runs a single scheduled check instead of a repeating loop.
    pub fn run_once(mut self, once: bool) -> Self {
        self.run_once = once;
        self
    }
}

/// A downloadable artifact attached to a release.
#[derive(Debug, Clone)]
pub struct Asset {
    /// The API URL of the asset.
    pub url: String,
    /// When the asset was created.
    pub created_at: Option<DateTime<Utc>>,
    /// When the asset was last updated.
    pub updated_at: Option<DateTime<Utc>>,
    /// The browser-facing download URL.
    pub browser_download_url: String,
}

/// A published release in the remote registry.
#[derive(Debug, Clone)]
pub struct Release {
    /// The API URL of the release.
    pub url: String,
    /// The release tag (e.g. "v1.0.0").
    pub tag_name: String,
    /// The release name/title.
    pub name: Option<String>,
    /// Whether this is a draft release.
    pub draft: bool,
    /// Whether this is a prerelease.
    pub prerelease: bool,
    /// When the release was created.
    pub created_at: Option<DateTime<Utc>>,
    /// When the release was published.
    pub published_at: Option<DateTime<Utc>>,
    /// Downloadable artifacts, in registry order.
    pub assets: Vec<Asset>,
}

/// The outcome of one check cycle.
///
/// Constructed fresh per cycle and passed by value to the update handler.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    /// The configured local version.
    pub local_version: Version,
    /// The version of the latest qualifying remote release.
    pub remote_version: Version,
    /// Download URL of the selected release's first asset. Populated only
    /// when the remote release is newer and has at least one asset.
    pub download_url: Option<String>,
}

impl UpdateCheck {
    /// Whether the remote release is newer than the local version.
    pub fn update_available(&self) -> bool {
        self.local_version < self.remote_version
    }
}

/// Wire format of a release asset in the registry response.
#[derive(Debug, Deserialize)]
pub(crate) struct AssetResponse {
    pub url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub browser_download_url: String,
}

/// Wire format of a release in the registry response.
#[derive(Debug, Deserialize)]
pub(crate) struct ReleaseResponse {
    pub url: String,
    pub tag_name: String,
    pub name: Option<String>,
    pub draft: bool,
    pub prerelease: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assets: Vec<AssetResponse>,
}

impl From<ReleaseResponse> for Release {
    fn from(response: ReleaseResponse) -> Self {
        Self {
            url: response.url,
            tag_name: response.tag_name,
            name: response.name,
            draft: response.draft,
            prerelease: response.prerelease,
            created_at: response.created_at,
            published_at: response.published_at,
            assets: response.assets.into_iter().map(Asset::from).collect(),
        }
    }
}

impl From<AssetResponse> for Asset {
    fn from(response: AssetResponse) -> Self {
        Self {
            url: response.url,
            created_at: response.created_at,
            updated_at: response.updated_at,
            browser_download_url: response.browser_download_url,
        }
    }
}
