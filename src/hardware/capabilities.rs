//! Fixture Capabilities
//!
//! The test sequence talks to the bench through two narrow capability traits:
//!
//! - [`Flasher`] programs an image into the board under test
//! - [`DigitalIo`] reads, drives and toggles BCM-numbered pins
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Focuses on ONE thing
//!
//! Real implementations live in [`super::openocd`] and [`super::gpio`]; the
//! simulated ones in [`super::mock`] back the tests and dry runs.

use crate::error::{FixtureResult, FlashFailure};
use async_trait::async_trait;
use std::path::Path;

/// Output captured from a successful flashing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlashReport {
    pub stdout: String,
    pub stderr: String,
}

/// Capability: Firmware Programming
///
/// # Contract
/// - `image` is resolved by the implementation (typically against a working directory)
/// - One call is one attempt; retrying is the caller's decision
/// - Failures carry the tool's captured output
#[async_trait]
pub trait Flasher: Send + Sync {
    /// Program `image` into the board under test.
    async fn flash(&self, image: &Path) -> Result<FlashReport, FlashFailure>;
}

/// Capability: Digital I/O
///
/// # Contract
/// - Pins are BCM numbers
/// - `read_pins` returns one level per requested pin, in request order
/// - `toggle_pins` inverts the current output level of each pin
#[async_trait]
pub trait DigitalIo: Send + Sync {
    async fn read_pins(&self, pins: &[u8]) -> FixtureResult<Vec<bool>>;

    async fn set_pins(&self, pins: &[u8], level: bool) -> FixtureResult<()>;

    async fn toggle_pins(&self, pins: &[u8]) -> FixtureResult<()>;
}
