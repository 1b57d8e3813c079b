//! OpenOCD flasher.
//!
//! Runs `[sudo] <tool> -f <interface_cfg> -f <image>` in the configured working
//! directory and captures its output.

use super::capabilities::{FlashReport, Flasher};
use crate::config::FlashingConfig;
use crate::error::{FlashFailure, FlashFailureKind};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OpenOcdFlasher {
    tool: String,
    working_dir: PathBuf,
    interface_cfg: String,
    use_sudo: bool,
}

impl OpenOcdFlasher {
    pub fn from_config(config: &FlashingConfig) -> Self {
        Self {
            tool: config.tool.clone(),
            working_dir: config.working_dir.clone(),
            interface_cfg: config.interface_cfg.clone(),
            use_sudo: config.use_sudo,
        }
    }

    fn command(&self, image: &Path) -> Command {
        let mut command = if self.use_sudo {
            let mut sudo = Command::new("sudo");
            sudo.arg(&self.tool);
            sudo
        } else {
            Command::new(&self.tool)
        };
        command
            .arg("-f")
            .arg(&self.interface_cfg)
            .arg("-f")
            .arg(image)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Flasher for OpenOcdFlasher {
    async fn flash(&self, image: &Path) -> Result<FlashReport, FlashFailure> {
        let resolved = self.working_dir.join(image);
        if !resolved.exists() {
            warn!(image = %resolved.display(), "firmware image not found");
            return Err(FlashFailure {
                kind: FlashFailureKind::ToolMissing,
                stdout: String::new(),
                stderr: format!("image {} not found", resolved.display()),
            });
        }

        info!(tool = %self.tool, image = %image.display(), "flashing");
        let output = self.command(image).output().await.map_err(|e| {
            let kind = if e.kind() == ErrorKind::NotFound {
                FlashFailureKind::ToolMissing
            } else {
                FlashFailureKind::Spawn(e.to_string())
            };
            FlashFailure {
                kind,
                stdout: String::new(),
                stderr: format!("{}: {}", self.tool, e),
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(status = ?output.status.code(), "flash tool finished");

        if output.status.success() {
            Ok(FlashReport { stdout, stderr })
        } else {
            Err(FlashFailure {
                kind: FlashFailureKind::ToolFailed {
                    code: output.status.code(),
                },
                stdout,
                stderr,
            })
        }
    }
}
