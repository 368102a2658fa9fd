use super::{http_client, is_newer, UpdateCheck, UpdateOracle};
use crate::error::{KeeperError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const MANIFEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Latest release as published in the update manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReleaseManifest {
    pub version: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ReleaseManifest {
    /// Compare this release against the installed version
    pub fn evaluate(&self, current_version: &str) -> UpdateCheck {
        if is_newer(&self.version, current_version) {
            UpdateCheck {
                available: true,
                message: match &self.notes {
                    Some(notes) => format!(
                        "Version {} is available (installed {}): {}",
                        self.version, current_version, notes
                    ),
                    None => format!(
                        "Version {} is available (installed {})",
                        self.version, current_version
                    ),
                },
                new_version: self.version.clone(),
            }
        } else {
            UpdateCheck::up_to_date(format!(
                "Installed version {} is current (latest {})",
                current_version, self.version
            ))
        }
    }
}

/// Update oracle backed by a JSON manifest served over HTTP
pub struct ManifestUpdateOracle {
    manifest_url: String,
    client: reqwest::Client,
    latest: Mutex<Option<ReleaseManifest>>,
}

impl ManifestUpdateOracle {
    pub fn new<S: Into<String>>(manifest_url: S) -> Result<Self> {
        Ok(Self {
            manifest_url: manifest_url.into(),
            client: http_client(MANIFEST_TIMEOUT)?,
            latest: Mutex::new(None),
        })
    }

    /// Most recently fetched manifest, if any
    pub fn latest_release(&self) -> Option<ReleaseManifest> {
        self.latest.lock().clone()
    }

    async fn fetch_manifest(&self) -> Result<ReleaseManifest> {
        debug!("Fetching update manifest from {}", self.manifest_url);

        let body = self
            .client
            .get(&self.manifest_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let manifest: ReleaseManifest = serde_json::from_str(&body)?;
        if manifest.version.trim().is_empty() {
            return Err(KeeperError::update(format!(
                "Manifest at {} has an empty version",
                self.manifest_url
            )));
        }

        Ok(manifest)
    }
}

#[async_trait]
impl UpdateOracle for ManifestUpdateOracle {
    async fn check_for_newer_version(&self, current_version: &str) -> Result<UpdateCheck> {
        let manifest = self.fetch_manifest().await?;
        let check = manifest.evaluate(current_version);

        if check.available {
            info!("{}", check.message);
        } else {
            debug!("{}", check.message);
        }

        *self.latest.lock() = Some(manifest);
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parsing() {
        let manifest: ReleaseManifest = serde_json::from_str(
            r#"{"version": "1.0.1", "download_url": "https://example.invalid/server-1.0.1.zip"}"#,
        )
        .unwrap();

        assert_eq!(manifest.version, "1.0.1");
        assert_eq!(
            manifest.download_url.as_deref(),
            Some("https://example.invalid/server-1.0.1.zip")
        );
        assert_eq!(manifest.notes, None);
    }

    #[test]
    fn test_evaluate_newer_release() {
        let manifest = ReleaseManifest {
            version: "1.0.1".to_string(),
            download_url: None,
            notes: Some("Fixes chunk loading".to_string()),
        };

        let check = manifest.evaluate("1.0.0");
        assert!(check.available);
        assert_eq!(check.new_version, "1.0.1");
        assert!(check.message.contains("Fixes chunk loading"));
    }

    #[test]
    fn test_evaluate_same_or_older_release() {
        let manifest = ReleaseManifest {
            version: "1.0.0".to_string(),
            download_url: None,
            notes: None,
        };

        assert!(!manifest.evaluate("1.0.0").available);
        assert!(!manifest.evaluate("1.2.0").available);
        assert!(manifest.evaluate("1.2.0").new_version.is_empty());
    }

    #[test]
    fn test_no_release_before_first_check() {
        let oracle = ManifestUpdateOracle::new("http://127.0.0.1:9/manifest.json").unwrap();
        assert_eq!(oracle.latest_release(), None);
    }
    #[tokio::test]
    async fn test_check_over_http_records_release() {
        let base = crate::testing::serve_http(vec![(
            "/manifest.json",
            br#"{"version": "1.2.0", "download_url": "https://example.invalid/server-1.2.0.zip"}"#
                .to_vec(),
        )])
        .await;
        let oracle = ManifestUpdateOracle::new(format!("{}/manifest.json", base)).unwrap();

        let check = oracle.check_for_newer_version("1.0.0").await.unwrap();
        assert!(check.available);
        assert_eq!(check.new_version, "1.2.0");

        let release = oracle.latest_release().unwrap();
        assert_eq!(
            release.download_url.as_deref(),
            Some("https://example.invalid/server-1.2.0.zip")
        );

        assert!(!oracle.check_for_newer_version("1.2.0").await.unwrap().available);
    }

    #[tokio::test]
    async fn test_missing_manifest_is_an_error() {
        let base = crate::testing::serve_http(Vec::new()).await;
        let oracle = ManifestUpdateOracle::new(format!("{}/manifest.json", base)).unwrap();

        let result = oracle.check_for_newer_version("1.0.0").await;
        assert!(matches!(result, Err(KeeperError::Http(_))));
        assert_eq!(oracle.latest_release(), None);
    }
}
