use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::client::{is_valid_owner, is_valid_repo_name, RegistryClient};
use crate::error::{Result, UpdateError};
use crate::types::{CheckerConfig, Release, UpdateCheck};
use crate::version::Version;

/// Handler invoked with the check outcome when a newer release is found.
pub type UpdateHandler = Arc<dyn Fn(UpdateCheck) + Send + Sync>;

/// Handler invoked when a check reports an error.
pub type ErrorHandler = Arc<dyn Fn(&UpdateError) + Send + Sync>;

/// Scheduler lifecycle, observable through [`UpdateChecker::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerStatus {
    /// No background task has been started.
    Idle,
    /// The background task is running.
    Running,
    /// The background task terminated normally (stop or run-once).
    Stopped,
    /// The background task terminated because a check failed.
    ///
    /// With the local version validated at [`start`](UpdateChecker::start)
    /// and the configuration frozen at construction, no current cycle
    /// error can occur mid-loop; this state records the terminal status
    /// for any cycle work that becomes fallible later.
    Failed(String),
}

struct SchedulerState {
    status: CheckerStatus,
    handle: Option<JoinHandle<()>>,
    // Incremented per spawned loop; a loop only writes its terminal
    // status while its epoch is current, so a superseded loop cannot
    // clobber the state of its replacement.
    epoch: u64,
}

struct Inner {
    config: CheckerConfig,
    client: RegistryClient,
    on_update: Mutex<Option<UpdateHandler>>,
    on_error: Mutex<Option<ErrorHandler>>,
    scheduler: Mutex<SchedulerState>,
    shutdown: watch::Sender<bool>,
}

/// A checker that polls a release registry for versions newer than a known
/// local version.
///
/// The checker is a cheap handle around shared state; clones drive the same
/// scheduler and handlers. The configuration is frozen at construction, so
/// the background task never races caller mutation.
#[derive(Clone)]
pub struct UpdateChecker {
    inner: Arc<Inner>,
}

impl UpdateChecker {
    /// Creates a new checker from the given configuration.
    ///
    /// Validates the owner and repository names against GitHub's naming
    /// rules and the base URL before any request is made.
    pub fn new(config: CheckerConfig) -> Result<Self> {
        if !is_valid_owner(&config.owner) {
            return Err(UpdateError::InvalidOwner(config.owner.clone()));
        }
        if !is_valid_repo_name(&config.repo) {
            return Err(UpdateError::InvalidRepoName(config.repo.clone()));
        }
        if Url::parse(&config.base_url).is_err() {
            return Err(UpdateError::InvalidBaseUrl(config.base_url.clone()));
        }

        let client = RegistryClient::new(&config);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                client,
                on_update: Mutex::new(None),
                on_error: Mutex::new(None),
                scheduler: Mutex::new(SchedulerState {
                    status: CheckerStatus::Idle,
                    handle: None,
                    epoch: 0,
                }),
                shutdown,
            }),
        })
    }

    /// Registers the handler invoked when a newer release is found.
    pub fn on_update<F>(&self, handler: F)
    where
        F: Fn(UpdateCheck) + Send + Sync + 'static,
    {
        *self.inner.on_update.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Registers the handler invoked when a check reports an error.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&UpdateError) + Send + Sync + 'static,
    {
        *self.inner.on_error.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Runs one check cycle, dispatching the update handler if a newer
    /// release exists.
    ///
    /// Transport and registry failures are recovered per cycle and yield
    /// `Ok(None)`; a missing or malformed local version is a configuration
    /// error and fails the call.
    pub async fn run(&self) -> Result<Option<UpdateCheck>> {
        self.check_cycle(true).await
    }

    /// Runs one check cycle with update notifications suppressed, so
    /// repeated manual polls never raise duplicate notifications.
    pub async fn get_latest(&self) -> Result<Option<UpdateCheck>> {
        self.check_cycle(false).await
    }

    /// Starts the background check loop.
    ///
    /// Idempotent: calling `start` while the loop is running is a no-op.
    /// Calling it after [`stop`](Self::stop) restarts the loop, even if
    /// the stopped loop has not yet drained. Fails immediately if the
    /// configured local version is missing or malformed. Must be called
    /// within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.local_version()?;

        let mut scheduler = self.inner.scheduler.lock().unwrap();

        let running = scheduler.status == CheckerStatus::Running
            && !*self.inner.shutdown.borrow()
            && scheduler
                .handle
                .as_ref()
                .is_some_and(|handle| !handle.is_finished());
        if running {
            return Ok(());
        }

        // A previous loop may still be draining after stop(); abort it so
        // the fresh loop is the only one running.
        if let Some(handle) = scheduler.handle.take() {
            handle.abort();
        }

        self.inner.shutdown.send_replace(false);
        scheduler.epoch += 1;
        scheduler.status = CheckerStatus::Running;

        let checker = self.clone();
        let epoch = scheduler.epoch;
        scheduler.handle = Some(tokio::spawn(async move { checker.run_loop(epoch).await }));

        Ok(())
    }

    /// Signals the background loop to stop.
    ///
    /// The loop observes the signal at its next suspension point; the
    /// transition is visible through [`status`](Self::status).
    pub fn stop(&self) {
        self.inner.shutdown.send_replace(true);
    }

    /// Returns the current scheduler status.
    pub fn status(&self) -> CheckerStatus {
        self.inner.scheduler.lock().unwrap().status.clone()
    }

    /// Parses the configured local version, tolerating a leading 'v'.
    fn local_version(&self) -> Result<Version> {
        let raw = self
            .inner
            .config
            .local_version
            .as_deref()
            .ok_or(UpdateError::MissingVersion)?;
        Ok(parse_version_tag(raw)?)
    }

    async fn check_cycle(&self, notify: bool) -> Result<Option<UpdateCheck>> {
        let local = self.local_version()?;

        let releases = match self.inner.client.fetch_releases().await {
            Ok(releases) => releases,
            Err(err) => {
                match err {
                    UpdateError::RateLimited { .. } | UpdateError::Forbidden => {
                        // The 403 report and the aborted fetch are two
                        // separate failure events for the same cycle.
                        self.dispatch_error(&err);
                        warn!(error = %err, "release fetch aborted");
                    }
                    _ => warn!(error = %err, "release fetch failed"),
                }
                return Ok(None);
            }
        };

        let Some(latest) = select_latest(releases, self.inner.config.include_prereleases) else {
            debug!("no qualifying release found");
            return Ok(None);
        };

        let remote = match parse_version_tag(&latest.tag_name) {
            Ok(version) => version,
            Err(err) => {
                warn!(tag = %latest.tag_name, error = %err, "release tag is not a valid version");
                return Ok(None);
            }
        };

        let mut check = UpdateCheck {
            local_version: local,
            remote_version: remote,
            download_url: None,
        };

        if check.update_available() {
            check.download_url = latest
                .assets
                .first()
                .map(|asset| asset.browser_download_url.clone());
            info!(local = %local, remote = %remote, "newer release available");
            if notify {
                self.dispatch_update(check.clone());
            }
        }

        Ok(Some(check))
    }

    async fn run_loop(self, epoch: u64) {
        let mut shutdown = self.inner.shutdown.subscribe();

        let failure = loop {
            if *shutdown.borrow() {
                break None;
            }

            if self.guard_satisfied() {
                if let Err(err) = self.check_cycle(true).await {
                    error!(error = %err, "scheduled check failed");
                    self.dispatch_error(&err);
                    break Some(err.to_string());
                }
            }

            if self.inner.config.run_once {
                break None;
            }

            tokio::select! {
                _ = sleep(self.inner.config.refresh_interval) => {}
                _ = shutdown.wait_for(|stop| *stop) => break None,
            }
        };

        let mut scheduler = self.inner.scheduler.lock().unwrap();
        if scheduler.epoch == epoch {
            scheduler.status = match failure {
                Some(message) => CheckerStatus::Failed(message),
                None => CheckerStatus::Stopped,
            };
            scheduler.handle = None;
        }
    }

    /// A scheduled iteration runs only when notifications are not hidden
    /// and an update handler is registered. Re-checked each iteration; the
    /// handler may be registered while the loop is running.
    fn guard_satisfied(&self) -> bool {
        !self.inner.config.hide_notifications
            && self.inner.config.local_version.is_some()
            && self.inner.on_update.lock().unwrap().is_some()
    }

    fn dispatch_update(&self, check: UpdateCheck) {
        let handler = self.inner.on_update.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(check);
        }
    }

    fn dispatch_error(&self, err: &UpdateError) {
        let handler = self.inner.on_error.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(err);
        }
    }
}

/// Selects the most recently published qualifying release.
///
/// Server order is not trusted: releases are sorted descending by publish
/// time, prereleases are dropped unless allowed, and the first survivor
/// wins. An empty result is a legitimate "nothing to report" outcome.
fn select_latest(mut releases: Vec<Release>, include_prereleases: bool) -> Option<Release> {
    releases.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    releases
        .into_iter()
        .find(|release| include_prereleases || !release.prerelease)
}

/// Parses a version tag, tolerating a leading 'v' (e.g. "v1.2.3").
fn parse_version_tag(tag: &str) -> std::result::Result<Version, crate::version::ParseVersionError> {
    tag.strip_prefix('v').unwrap_or(tag).parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn release(tag: &str, prerelease: bool, published_day: u32) -> Release {
        Release {
            url: format!("https://example.test/releases/{}", tag),
            tag_name: tag.to_string(),
            name: Some(tag.to_string()),
            draft: false,
            prerelease,
            created_at: None,
            published_at: Some(Utc.with_ymd_and_hms(2024, 3, published_day, 10, 0, 0).unwrap()),
            assets: Vec::new(),
        }
    }

    #[test]
    fn test_select_latest_ignores_server_order() {
        let releases = vec![
            release("v1.0.0", false, 1),
            release("v2.0.0", false, 20),
            release("v1.5.0", false, 10),
        ];
        let latest = select_latest(releases, false).unwrap();
        assert_eq!(latest.tag_name, "v2.0.0");
    }

    #[test]
    fn test_select_latest_skips_prereleases_by_default() {
        let releases = vec![
            release("v2.1.0-beta", true, 25),
            release("v2.0.0", false, 20),
        ];
        let latest = select_latest(releases, false).unwrap();
        assert_eq!(latest.tag_name, "v2.0.0");
    }

    #[test]
    fn test_select_latest_includes_prereleases_when_allowed() {
        let releases = vec![
            release("v2.1.0-beta", true, 25),
            release("v2.0.0", false, 20),
        ];
        let latest = select_latest(releases, true).unwrap();
        assert_eq!(latest.tag_name, "v2.1.0-beta");
    }

    #[test]
    fn test_select_latest_only_prereleases_disallowed() {
        let releases = vec![
            release("v2.1.0-beta", true, 25),
            release("v2.2.0-beta", true, 26),
        ];
        assert!(select_latest(releases, false).is_none());
    }

    #[test]
    fn test_select_latest_empty() {
        assert!(select_latest(Vec::new(), true).is_none());
    }

    #[test]
    fn test_parse_version_tag_strips_v_prefix() {
        assert_eq!(
            parse_version_tag("v1.2.3").unwrap(),
            Version::with_build(1, 2, 3)
        );
        assert_eq!(
            parse_version_tag("1.2.3").unwrap(),
            Version::with_build(1, 2, 3)
        );
        assert!(parse_version_tag("nightly").is_err());
    }

    #[test]
    fn test_invalid_owner_rejected() {
        let config = CheckerConfig::new("-bad-owner-", "repo");
        assert!(matches!(
            UpdateChecker::new(config),
            Err(UpdateError::InvalidOwner(_))
        ));
    }

    #[test]
    fn test_invalid_repo_rejected() {
        let config = CheckerConfig::new("owner", "bad repo");
        assert!(matches!(
            UpdateChecker::new(config),
            Err(UpdateError::InvalidRepoName(_))
        ));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = CheckerConfig::new("owner", "repo").base_url("not-a-valid-url");
        assert!(matches!(
            UpdateChecker::new(config),
            Err(UpdateError::InvalidBaseUrl(_))
        ));
    }

    #[test]
    fn test_config_builder() {
        let config = CheckerConfig::new("owner", "repo")
            .local_version("1.0.0")
            .token("test-token")
            .refresh_minutes(5)
            .include_prereleases(true)
            .run_once(true);

        assert_eq!(config.owner, "owner");
        assert_eq!(config.repo, "repo");
        assert_eq!(config.local_version, Some("1.0.0".to_string()));
        assert_eq!(config.token, Some("test-token".to_string()));
        assert_eq!(config.refresh_interval.as_secs(), 300);
        assert!(config.include_prereleases);
        assert!(config.run_once);
    }
}
