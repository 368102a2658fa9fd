use super::{http_client, ManifestUpdateOracle, PatchApplier};
use crate::config::KeeperConfig;
use crate::error::{KeeperError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Installs a release by downloading its ZIP archive over the working directory
pub struct ZipPatchApplier {
    working_directory: PathBuf,
    version_file: PathBuf,
    download_url_template: Option<String>,
    releases: Option<Arc<ManifestUpdateOracle>>,
    client: reqwest::Client,
}

impl ZipPatchApplier {
    pub fn new(config: &KeeperConfig) -> Result<Self> {
        Ok(Self {
            working_directory: config.server.working_directory.clone(),
            version_file: config.server_path(&config.server.version_file),
            download_url_template: config.update.download_url_template.clone(),
            releases: None,
            client: http_client(DOWNLOAD_TIMEOUT)?,
        })
    }

    /// Fall back to the download URL of the manifest this oracle last fetched
    pub fn with_release_source(mut self, oracle: Arc<ManifestUpdateOracle>) -> Self {
        self.releases = Some(oracle);
        self
    }

    /// Resolve where the archive for `version` lives
    pub fn download_url(&self, version: &str) -> Result<String> {
        if let Some(template) = &self.download_url_template {
            return Ok(template.replace("{version}", version));
        }

        self.releases
            .as_ref()
            .and_then(|oracle| oracle.latest_release())
            .filter(|release| release.version == version)
            .and_then(|release| release.download_url)
            .ok_or_else(|| {
                KeeperError::update(format!("No download URL known for version {}", version))
            })
    }

    async fn download(&self, url: &str, dest: &Path, cancel: &CancellationToken) -> Result<u64> {
        info!("Downloading {} to {}", url, dest.display());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(KeeperError::Cancelled),
            response = self.client.get(url).send() => response?.error_for_status()?,
        };

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut total: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(KeeperError::Cancelled),
                chunk = stream.next() => chunk,
            };

            match chunk {
                Some(chunk) => {
                    let chunk = chunk?;
                    total = total.saturating_add(chunk.len() as u64);
                    file.write_all(&chunk).await?;
                }
                None => break,
            }
        }

        file.flush().await?;
        debug!("Downloaded {} bytes", total);
        Ok(total)
    }
}

#[async_trait]
impl PatchApplier for ZipPatchApplier {
    async fn apply_update(&self, version: &str, cancel: &CancellationToken) -> Result<()> {
        let url = self.download_url(version)?;
        let archive = self
            .working_directory
            .join(format!(".serverkeeper-update-{}.zip", version));

        let downloaded = self.download(&url, &archive, cancel).await;
        if let Err(e) = downloaded {
            let _ = tokio::fs::remove_file(&archive).await;
            return Err(e);
        }

        let out_dir = self.working_directory.clone();
        let archive_path = archive.clone();
        let extracted =
            tokio::task::spawn_blocking(move || extract_zip_safely(&archive_path, &out_dir))
                .await
                .map_err(|e| KeeperError::system(format!("Extraction task failed: {}", e)))?;

        if let Err(e) = tokio::fs::remove_file(&archive).await {
            warn!("Failed to remove update archive {}: {}", archive.display(), e);
        }
        let files = extracted?;

        tokio::fs::write(&self.version_file, version).await?;
        info!("Applied update {} ({} files)", version, files);
        Ok(())
    }
}

fn normalize_rel_path(raw: &str) -> Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::Normal(segment) => out.push(segment),
            Component::ParentDir => {
                return Err(KeeperError::update(format!(
                    "Archive entry {:?} escapes the target directory",
                    raw
                )))
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(KeeperError::update(format!(
                    "Archive entry {:?} is not a relative path",
                    raw
                )))
            }
        }
    }
    Ok(out)
}

/// Extract a ZIP archive into `out_dir`, refusing entries that would land outside it.
///
/// Returns the number of files written.
pub fn extract_zip_safely(zip_path: &Path, out_dir: &Path) -> Result<usize> {
    fs::create_dir_all(out_dir)?;
    let file = fs::File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut written = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        let trimmed = name.trim_end_matches('/');
        if trimmed.is_empty() {
            continue;
        }

        let rel = normalize_rel_path(trimmed)?;
        if rel.as_os_str().is_empty() {
            continue;
        }

        let out_path = out_dir.join(&rel);
        if name.ends_with('/') {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = out_path.with_extension("partial");
        let mut out = fs::File::create(&tmp_path)?;
        std::io::copy(&mut entry, &mut out)?;
        out.sync_all().ok();
        fs::rename(&tmp_path, &out_path)?;
        written += 1;
    }

    Ok(written)
}
