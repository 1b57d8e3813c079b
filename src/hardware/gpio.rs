//! Linux sysfs GPIO.
//!
//! Pins are exported through `<root>/export` and driven through
//! `<root>/gpioN/{direction,value}`. The root defaults to `/sys/class/gpio`;
//! `base` is added to every BCM number for kernels that number the SoC's
//! controller from a non-zero offset.

use super::capabilities::DigitalIo;
use crate::config::PinConfig;
use crate::error::{FixtureError, FixtureResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const SYSFS_ROOT: &str = "/sys/class/gpio";

/// udev needs a moment to fix permissions on a freshly exported pin.
const EXPORT_SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
    base: u32,
}

impl Default for SysfsGpio {
    fn default() -> Self {
        Self::new()
    }
}

impl SysfsGpio {
    pub fn new() -> Self {
        Self::with_root(SYSFS_ROOT, 0)
    }

    pub fn with_root(root: impl AsRef<Path>, base: u32) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            base,
        }
    }

    fn pin_dir(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{}", self.base + u32::from(pin)))
    }

    async fn export(&self, pin: u8) -> FixtureResult<()> {
        if self.pin_dir(pin).exists() {
            return Ok(());
        }
        let number = (self.base + u32::from(pin)).to_string();
        tokio::fs::write(self.root.join("export"), number)
            .await
            .map_err(|source| FixtureError::Gpio { pin, source })?;
        tokio::time::sleep(EXPORT_SETTLE).await;
        Ok(())
    }

    async fn write_attr(&self, pin: u8, attr: &str, value: &str) -> FixtureResult<()> {
        tokio::fs::write(self.pin_dir(pin).join(attr), value)
            .await
            .map_err(|source| FixtureError::Gpio { pin, source })
    }

    async fn read_level(&self, pin: u8) -> FixtureResult<bool> {
        let raw = tokio::fs::read_to_string(self.pin_dir(pin).join("value"))
            .await
            .map_err(|source| FixtureError::Gpio { pin, source })?;
        Ok(raw.trim() == "1")
    }

    /// Export every configured pin; outputs start low.
    pub async fn setup(&self, pins: &PinConfig) -> FixtureResult<()> {
        let mut outputs = vec![pins.float_switch];
        outputs.extend(pins.harness_outputs());

        for pin in outputs {
            self.export(pin).await?;
            self.write_attr(pin, "direction", "low").await?;
        }
        for pin in pins.harness_inputs() {
            self.export(pin).await?;
            self.write_attr(pin, "direction", "in").await?;
        }
        info!(root = %self.root.display(), "GPIO pins configured");
        Ok(())
    }
}

#[async_trait]
impl DigitalIo for SysfsGpio {
    async fn read_pins(&self, pins: &[u8]) -> FixtureResult<Vec<bool>> {
        let mut levels = Vec::with_capacity(pins.len());
        for &pin in pins {
            levels.push(self.read_level(pin).await?);
        }
        Ok(levels)
    }

    async fn set_pins(&self, pins: &[u8], level: bool) -> FixtureResult<()> {
        let value = if level { "1" } else { "0" };
        for &pin in pins {
            self.write_attr(pin, "value", value).await?;
        }
        debug!(?pins, level, "pins set");
        Ok(())
    }

    async fn toggle_pins(&self, pins: &[u8]) -> FixtureResult<()> {
        for &pin in pins {
            let level = self.read_level(pin).await?;
            self.write_attr(pin, "value", if level { "0" } else { "1" })
                .await?;
        }
        Ok(())
    }
}
