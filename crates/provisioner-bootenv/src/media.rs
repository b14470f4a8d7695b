//! Install media preparation
//!
//! Extracts an OS ISO image into the install tree exactly once. Completion
//! is recorded by a canary file, `.<os>.rebar_canary`, at the top of the
//! install tree.

use crate::error::{BootEnvError, Result};
use async_trait::async_trait;
use provisioner_crd::BootEnv;
use provisioner_render::PathResolver;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Canary file name for an OS
pub fn canary_name(os_name: &str) -> String {
    format!(".{}.rebar_canary", os_name)
}

/// External procedure that unpacks an ISO image
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    async fn extract(&self, os_name: &str, iso_path: &Path, target_dir: &Path) -> Result<()>;
}

/// Runs an extraction script as `<script> <os> <iso> <target dir>`
#[derive(Debug, Clone)]
pub struct ScriptExtractor {
    script: PathBuf,
}

impl ScriptExtractor {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl MediaExtractor for ScriptExtractor {
    async fn extract(&self, os_name: &str, iso_path: &Path, target_dir: &Path) -> Result<()> {
        use tokio::process::Command;

        info!(
            script = %self.script.display(),
            os = %os_name,
            iso = %iso_path.display(),
            target = %target_dir.display(),
            "Extracting install media"
        );

        let output = Command::new(&self.script)
            .arg(os_name)
            .arg(iso_path)
            .arg(target_dir)
            .output()
            .await
            .map_err(|e| BootEnvError::MediaExtraction {
                os: os_name.to_string(),
                reason: format!("failed to run {}: {}", self.script.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BootEnvError::MediaExtraction {
                os: os_name.to_string(),
                reason: format!(
                    "{} exited with {}: {}",
                    self.script.display(),
                    output.status,
                    stderr.trim()
                ),
            });
        }

        Ok(())
    }
}

/// What media preparation did for a boot environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaOutcome {
    /// Not an install environment
    SkippedNotInstall,
    /// No ISO configured
    SkippedNoIso,
    /// Already extracted
    SkippedCanaryPresent,
    /// ISO not staged yet
    SkippedIsoMissing,
    Extracted,
}

/// Idempotent ISO extraction
#[derive(Clone)]
pub struct MediaPreparer {
    iso_dir: PathBuf,
    extractor: Arc<dyn MediaExtractor>,
}

impl MediaPreparer {
    pub fn new(iso_dir: impl Into<PathBuf>, extractor: Arc<dyn MediaExtractor>) -> Self {
        Self {
            iso_dir: iso_dir.into(),
            extractor,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn MediaExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Extract the ISO for a boot environment unless a short-circuit applies
    ///
    /// A checksum mismatch is fatal. An ISO that has not been staged yet is
    /// not.
    pub async fn prepare(
        &self,
        bootenv: &BootEnv,
        resolver: &PathResolver,
    ) -> Result<MediaOutcome> {
        if !bootenv.is_install() {
            debug!(bootenv = %bootenv.name, "Skipping media, not an install environment");
            return Ok(MediaOutcome::SkippedNotInstall);
        }

        let Some(iso_file) = bootenv.os.iso_file.as_deref() else {
            debug!(bootenv = %bootenv.name, "Skipping media, no iso image specified");
            return Ok(MediaOutcome::SkippedNoIso);
        };

        let os_name = &bootenv.os.name;
        let canary = resolver.disk_path(&canary_name(os_name));
        if exists(&canary).await {
            info!(
                bootenv = %bootenv.name,
                canary = %canary.display(),
                "Skipping media, canary in place"
            );
            return Ok(MediaOutcome::SkippedCanaryPresent);
        }

        let iso_path = self.iso_dir.join(iso_file);
        if !exists(&iso_path).await {
            info!(
                bootenv = %bootenv.name,
                iso = %iso_path.display(),
                "Skipping media, iso doesn't exist"
            );
            return Ok(MediaOutcome::SkippedIsoMissing);
        }

        if let Some(expected) = bootenv.os.iso_sha256.as_deref() {
            let actual = sha256_file(&iso_path).await?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Err(BootEnvError::ChecksumMismatch {
                    path: iso_path,
                    expected: expected.to_string(),
                    actual,
                });
            }
            debug!(iso = %iso_path.display(), "Checksum verified");
        }

        let target = resolver.install_dir();
        fs::create_dir_all(&target)
            .await
            .map_err(|e| BootEnvError::io(&target, e))?;

        self.extractor.extract(os_name, &iso_path, &target).await?;

        if !exists(&canary).await {
            fs::write(&canary, b"")
                .await
                .map_err(|e| BootEnvError::io(&canary, e))?;
        }

        info!(bootenv = %bootenv.name, target = %target.display(), "Extracted install media");
        Ok(MediaOutcome::Extracted)
    }
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Hex SHA-256 of a file, read in chunks
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .await
        .map_err(|e| BootEnvError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| BootEnvError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
