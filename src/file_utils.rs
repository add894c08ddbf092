// Output placement, saving and opening rendered charts

use crate::error::{ChartError, Result};
use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DEFAULT_OUTPUT_DIR: &str = "charts";

/// `{dir}/{chart_type}-{timestamp}.{ext}`, with a filesystem-safe UTC timestamp.
/// `dir` defaults to `./charts` under the current directory.
pub fn default_output_path(dir: Option<&Path>, chart_type: &str, extension: &str) -> Result<PathBuf> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(DEFAULT_OUTPUT_DIR),
    };
    Ok(dir.join(format!("{}-{}.{}", chart_type, timestamp(), extension)))
}

/// e.g. `2024-05-01T12-30-45-123Z`.
fn timestamp() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-")
}

/// Write `bytes` to `path`, creating parent directories as needed.
pub async fn save_chart(bytes: &[u8], path: &Path) -> Result<()> {
    let save_error = |source| ChartError::Save {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(save_error)?;
    }
    tokio::fs::write(path, bytes).await.map_err(save_error)?;

    info!(path = %path.display(), bytes = bytes.len(), "saved chart");
    Ok(())
}

/// Open `path` in the platform's default viewer. Best effort: failures are logged.
pub async fn open_chart(path: &Path) {
    let mut command = viewer_command(path);
    match command.spawn() {
        Ok(mut child) => {
            debug!(path = %path.display(), "launched viewer");
            // Reap the viewer launcher without blocking the caller.
            tokio::spawn(async move {
                if let Err(e) = child.wait().await {
                    warn!(error = %e, "viewer process failed");
                }
            });
        }
        Err(e) => warn!(path = %path.display(), error = %e, "could not open chart"),
    }
}

fn viewer_command(path: &Path) -> tokio::process::Command {
    let mut command = if cfg!(target_os = "macos") {
        tokio::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = tokio::process::Command::new("cmd");
        cmd.args(["/c", "start", ""]);
        cmd
    } else {
        tokio::process::Command::new("xdg-open")
    };
    command
        .arg(path)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    command
}
