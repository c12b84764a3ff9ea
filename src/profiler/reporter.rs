//! Executable reporting for symbolization.
//!
//! Reporting is fire-and-forget: the profiler hands over metadata and never waits for
//! the upload.
use super::file_id::FileId;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const DEFAULT_UPLOAD_TOOL: &str = "symbol-upload-tool";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableMetadata {
    pub pid: u32,
    pub file_id: FileId,
    pub file_name: String,
    pub gnu_build_id: Option<String>,
    /// Path of the mapped executable inside the process's mount namespace
    pub mapping_path: Option<PathBuf>,
    pub debuglink_file_name: Option<String>,
}

impl ExecutableMetadata {
    /// Host-visible path of the mapped executable, through `/proc/<pid>/root`.
    #[must_use]
    pub fn host_path(&self) -> Option<PathBuf> {
        let mapping = self.mapping_path.as_deref()?;
        let relative = mapping.strip_prefix("/").unwrap_or(mapping);
        Some(Path::new(&format!("/proc/{}/root", self.pid)).join(relative))
    }
}

/// Receives every newly seen executable. Must return without blocking.
pub trait ExecutableReporter: Send + Sync {
    fn report_executable(&self, metadata: ExecutableMetadata);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolUploadConfig {
    pub tool: PathBuf,
    pub endpoint: String,
    pub token: String,
}

impl SymbolUploadConfig {
    /// Read `SYMBOL_URL` and `token` from the environment. `SYMBOL_UPLOAD_TOOL`
    /// overrides the tool path.
    ///
    /// # Errors
    ///
    /// Returns an error if either required variable is unset or empty
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .ok()
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::InvalidConfig(format!("{name} environment variable not set")))
        };
        Ok(Self {
            tool: std::env::var_os("SYMBOL_UPLOAD_TOOL")
                .map_or_else(|| PathBuf::from(DEFAULT_UPLOAD_TOOL), PathBuf::from),
            endpoint: read("SYMBOL_URL")?,
            token: read("token")?,
        })
    }
}

/// Uploads the symbols of reported executables with the external upload tool.
#[derive(Debug, Clone)]
pub struct SymbolUploadReporter {
    config: Arc<SymbolUploadConfig>,
}

impl SymbolUploadReporter {
    #[must_use]
    pub fn new(config: SymbolUploadConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Start the upload for `metadata` in the background.
    ///
    /// Returns `None` when there is nothing to upload or no runtime to run on.
    pub fn spawn_upload(&self, metadata: &ExecutableMetadata) -> Option<JoinHandle<Result<()>>> {
        let path = metadata.host_path()?;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, skipping symbol upload for {}", path.display());
            return None;
        };
        let config = Arc::clone(&self.config);
        Some(runtime.spawn(async move {
            let result = upload_symbols(&config, &path).await;
            if let Err(e) = &result {
                error!("failed to upload symbols for mapping {}: {}", path.display(), e);
            }
            result
        }))
    }
}

impl ExecutableReporter for SymbolUploadReporter {
    fn report_executable(&self, metadata: ExecutableMetadata) {
        info!(
            build_id = metadata.gnu_build_id.as_deref().unwrap_or(""),
            file_id = %metadata.file_id,
            name = %metadata.file_name,
            mapping = ?metadata.mapping_path,
            debuglink = metadata.debuglink_file_name.as_deref().unwrap_or(""),
            "executable reported"
        );
        let _ = self.spawn_upload(&metadata);
    }
}

/// Run the upload tool for one executable and wait for it.
///
/// # Errors
///
/// Returns an error if the tool cannot be started or exits unsuccessfully
pub async fn upload_symbols(config: &SymbolUploadConfig, path: &Path) -> Result<()> {
    let output = Command::new(&config.tool)
        .arg("upload")
        .arg("--coralogix-endpoint")
        .arg(&config.endpoint)
        .arg("--auth")
        .arg(&config.token)
        .arg(path)
        .output()
        .await?;

    let combined = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    if !output.status.success() {
        return Err(Error::Custom(format!(
            "symbol upload failed for {} ({}): {}",
            path.display(),
            output.status,
            combined.trim()
        )));
    }

    info!("uploaded symbols for {}: {}", path.display(), combined.trim());
    Ok(())
}
