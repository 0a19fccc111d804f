//! # relwatch
//!
//! A library for watching a GitHub-style release registry and notifying
//! when a release newer than a known local version is published.
//!
//! ## Example
//!
//! ```no_run
//! use relwatch::{CheckerConfig, UpdateChecker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CheckerConfig::new("owner", "repo")
//!         .local_version("1.0.0")
//!         .refresh_minutes(30);
//!
//!     let checker = UpdateChecker::new(config)?;
//!
//!     checker.on_update(|check| {
//!         println!("update available: {}", check.remote_version);
//!     });
//!     checker.on_error(|err| {
//!         eprintln!("check failed: {}", err);
//!     });
//!
//!     // One-shot check, without triggering the update handler.
//!     if let Some(check) = checker.get_latest().await? {
//!         println!("latest remote release: {}", check.remote_version);
//!     }
//!
//!     // Or poll in the background until stopped.
//!     checker.start()?;
//!     // ...
//!     checker.stop();
//!
//!     Ok(())
//! }
//! ```

mod checker;
mod client;
mod error;
mod types;
mod version;

pub use checker::{CheckerStatus, ErrorHandler, UpdateChecker, UpdateHandler};
pub use error::{Result, UpdateError};
pub use types::{Asset, CheckerConfig, Release, UpdateCheck};
pub use version::{ParseVersionError, Version};
