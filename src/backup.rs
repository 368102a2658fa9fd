use crate::clock::Clock;
use crate::config::KeeperConfig;
use crate::error::{KeeperError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;

const BACKUP_PREFIX: &str = "backup-";
const BACKUP_SUFFIX: &str = ".zip";

/// Takes a restorable copy of the server before it is patched
#[async_trait]
pub trait BackupService: Send + Sync {
    /// Create a backup and return where it was written
    async fn create_backup(&self) -> Result<PathBuf>;
}

/// Archives the server's working directory into timestamped ZIP files
pub struct ZipBackupService {
    source: PathBuf,
    destination: PathBuf,
    max_backups: usize,
    clock: Arc<dyn Clock>,
}

impl ZipBackupService {
    pub fn new(config: &KeeperConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            source: config.server.working_directory.clone(),
            destination: config.server_path(&config.backup.directory),
            max_backups: config.backup.max_backups,
            clock,
        }
    }

    /// Existing backup archives, oldest first
    pub fn list_backups(&self) -> Result<Vec<PathBuf>> {
        list_backups(&self.destination)
    }
}

#[async_trait]
impl BackupService for ZipBackupService {
    async fn create_backup(&self) -> Result<PathBuf> {
        let name = format!(
            "{}{}{}",
            BACKUP_PREFIX,
            self.clock.now().format("%Y%m%d-%H%M%S"),
            BACKUP_SUFFIX
        );
        let archive = self.destination.join(name);

        info!(
            "Backing up {} to {}",
            self.source.display(),
            archive.display()
        );

        let source = self.source.clone();
        let destination = self.destination.clone();
        let target = archive.clone();
        let max_backups = self.max_backups;

        let files = tokio::task::spawn_blocking(move || -> Result<usize> {
            fs::create_dir_all(&destination)?;
            let files = write_archive(&source, &destination, &target)?;
            prune_backups(&destination, max_backups)?;
            Ok(files)
        })
        .await
        .map_err(|e| KeeperError::system(format!("Backup task failed: {}", e)))??;

        info!("Backup complete: {} files in {}", files, archive.display());
        Ok(archive)
    }
}

/// Write the archive, removing the partial file if anything fails midway
fn write_archive(source: &Path, skip: &Path, target: &Path) -> Result<usize> {
    let result = archive_tree(source, skip, target);
    if result.is_err() {
        match fs::remove_file(target) {
            Ok(()) => debug!("Removed incomplete backup {}", target.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove incomplete backup {}: {}",
                target.display(),
                e
            ),
        }
    }
    result
}

fn archive_tree(source: &Path, skip: &Path, target: &Path) -> Result<usize> {
    let skip = skip.canonicalize()?;
    let file = fs::File::create(target)?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut written = 0;
    let mut pending = vec![source.to_path_buf()];
    // Symlinked directories are followed once each
    let mut visited = HashSet::new();
    visited.insert(source.canonicalize()?);

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();

            // Follows symlinks; a dangling link has no target to archive
            let metadata = match fs::metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if entry.file_type()?.is_symlink() => {
                    warn!("Skipping broken symlink {}: {}", path.display(), e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if metadata.is_dir() {
                let real = path.canonicalize()?;
                if real == skip {
                    debug!("Skipping backup directory {}", path.display());
                    continue;
                }
                if !visited.insert(real) {
                    warn!("Skipping {}: directory already archived", path.display());
                    continue;
                }
                pending.push(path);
                continue;
            }

            if !metadata.is_file() {
                debug!("Skipping special file {}", path.display());
                continue;
            }

            let Ok(relative) = path.strip_prefix(source) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            writer.start_file(name, options)?;
            let mut input = fs::File::open(&path)?;
            io::copy(&mut input, &mut writer)?;
            written += 1;
        }
    }

    writer.finish()?.flush()?;
    Ok(written)
}

fn list_backups(destination: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(destination) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut backups = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_backup = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_SUFFIX))
            .unwrap_or(false);
        if is_backup {
            backups.push(path);
        }
    }

    // Timestamped names sort chronologically
    backups.sort();
    Ok(backups)
}

fn prune_backups(destination: &Path, max_backups: usize) -> Result<()> {
    let backups = list_backups(destination)?;
    if backups.len() <= max_backups {
        return Ok(());
    }

    let excess = backups.len() - max_backups;
    for old in backups.iter().take(excess) {
        match fs::remove_file(old) {
            Ok(()) => info!("Pruned old backup {}", old.display()),
            Err(e) => warn!("Failed to prune backup {}: {}", old.display(), e),
        }
    }
    Ok(())
}
