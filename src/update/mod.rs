mod manifest;
mod patch;
mod version;

pub use manifest::{ManifestUpdateOracle, ReleaseManifest};
pub use patch::{extract_zip_safely, ZipPatchApplier};
pub use version::{compare_versions, is_newer};

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of asking the update source about the installed version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub available: bool,
    pub message: String,
    pub new_version: String,
}

impl UpdateCheck {
    pub fn up_to_date<S: Into<String>>(message: S) -> Self {
        Self {
            available: false,
            message: message.into(),
            new_version: String::new(),
        }
    }
}

/// Reports whether a newer server version exists
#[async_trait]
pub trait UpdateOracle: Send + Sync {
    async fn check_for_newer_version(&self, current_version: &str) -> Result<UpdateCheck>;
}

/// Downloads and installs a server version; the server must be stopped
#[async_trait]
pub trait PatchApplier: Send + Sync {
    async fn apply_update(&self, version: &str, cancel: &CancellationToken) -> Result<()>;
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("serverkeeper/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}
