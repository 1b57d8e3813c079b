//! Fixture configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/fixture.toml` by default)
//! 2. environment variables prefixed with `HMI_FIXTURE_`, using `__` between
//!    nesting levels (`HMI_FIXTURE_SERIAL__PORT=/dev/ttyAMA0`)
//!
//! # Example
//! ```no_run
//! use hmi_fixture::config::FixtureConfig;
//!
//! let config = FixtureConfig::load()?;
//! config.validate()?;
//! println!("HMI on {}", config.serial.port);
//! # Ok::<(), hmi_fixture::error::FixtureError>(())
//! ```

use crate::error::{FixtureError, FixtureResult};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level fixture configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial link to the HMI
    pub serial: SerialConfig,
    /// Error text layout on the HMI
    #[serde(default)]
    pub display: DisplayConfig,
    /// Flashing tool
    pub flashing: FlashingConfig,
    /// Test-sequence timing
    #[serde(default)]
    pub sequence: SequenceConfig,
    /// Digital I/O pin assignment (BCM numbering)
    #[serde(default)]
    pub pins: PinConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output: "compact" for the console, "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// What a producer does when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the writer to make room.
    #[default]
    Block,
    /// Evict the oldest queued frame.
    DropOldest,
    /// Discard the frame being pushed and keep what is queued.
    DropNewest,
}

/// Serial channel parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Device path (e.g. "/dev/ttyS0")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// RTS/CTS hardware flow control
    #[serde(default)]
    pub rtscts: bool,
    /// Device-level read timeout in milliseconds
    #[serde(default = "default_read_timeout")]
    pub timeout_ms: u64,
    /// Data bits per character (5-8)
    #[serde(default = "default_byte_size")]
    pub byte_size: u8,
    /// Parity: "N", "E" or "O"
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits (1 or 2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Inbound queue capacity
    #[serde(default = "default_queue_capacity")]
    pub inbound_capacity: usize,
    /// Outbound queue capacity
    #[serde(default = "default_queue_capacity")]
    pub outbound_capacity: usize,
    /// Behaviour when the outbound queue is full
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Bounded wait when joining a task during shutdown
    #[serde(default = "default_join_timeout")]
    pub join_timeout_ms: u64,
}

/// Error text layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Font file used to size error text
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    /// Font size in pixels
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    /// Average glyph advance as a fraction of the font size
    #[serde(default = "default_char_width_ratio")]
    pub char_width_ratio: f32,
    /// Maximum pixel width of one error line
    #[serde(default = "default_line_width")]
    pub line_width_px: u32,
    /// X coordinate of the error text box
    #[serde(default = "default_origin_x")]
    pub error_origin_x: u32,
    /// Y coordinate of the first error line
    #[serde(default = "default_origin_y")]
    pub error_origin_y: u32,
    /// Vertical distance between error lines
    #[serde(default = "default_line_height")]
    pub line_height_px: u32,
    /// HMI font resource used by the draw command
    #[serde(default)]
    pub error_font_id: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            font_size: default_font_size(),
            char_width_ratio: default_char_width_ratio(),
            line_width_px: default_line_width(),
            error_origin_x: default_origin_x(),
            error_origin_y: default_origin_y(),
            line_height_px: default_line_height(),
            error_font_id: 0,
        }
    }
}

/// Flashing tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashingConfig {
    /// Tool executable
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Directory the tool runs in; image paths are relative to it
    pub working_dir: PathBuf,
    /// Interface configuration passed with the first `-f`
    #[serde(default = "default_interface_cfg")]
    pub interface_cfg: String,
    /// Test firmware image
    pub test_program: PathBuf,
    /// Production firmware image
    pub firmware: PathBuf,
    /// Prefix the tool with `sudo`
    #[serde(default)]
    pub use_sudo: bool,
}

/// Test-sequence timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceConfig {
    /// Delay between flashing attempts
    #[serde(default = "default_flash_retry_delay")]
    pub flash_retry_delay_ms: u64,
    /// How long to wait for a button press
    #[serde(default = "default_button_timeout")]
    pub button_timeout_ms: u64,
    /// How long to wait for the float switch event
    #[serde(default = "default_float_switch_timeout")]
    pub float_switch_timeout_ms: u64,
    /// Sleep between inbound polls while waiting
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Sleep between cable continuity reads
    #[serde(default = "default_cable_poll_interval")]
    pub cable_poll_interval_ms: u64,
    /// Clock producer period
    #[serde(default = "default_clock_period")]
    pub clock_period_ms: u64,
    /// Loading animation period
    #[serde(default = "default_animation_period")]
    pub animation_period_ms: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            flash_retry_delay_ms: default_flash_retry_delay(),
            button_timeout_ms: default_button_timeout(),
            float_switch_timeout_ms: default_float_switch_timeout(),
            poll_interval_ms: default_poll_interval(),
            cable_poll_interval_ms: default_cable_poll_interval(),
            clock_period_ms: default_clock_period(),
            animation_period_ms: default_animation_period(),
        }
    }
}

impl SequenceConfig {
    pub fn flash_retry_delay(&self) -> Duration {
        Duration::from_millis(self.flash_retry_delay_ms)
    }

    pub fn button_timeout(&self) -> Duration {
        Duration::from_millis(self.button_timeout_ms)
    }

    pub fn float_switch_timeout(&self) -> Duration {
        Duration::from_millis(self.float_switch_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cable_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cable_poll_interval_ms)
    }

    pub fn clock_period(&self) -> Duration {
        Duration::from_millis(self.clock_period_ms)
    }

    pub fn animation_period(&self) -> Duration {
        Duration::from_millis(self.animation_period_ms)
    }
}

/// One harness wire: the output that drives it and the input that reads it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessPair {
    pub output: u8,
    pub input: u8,
}

/// BCM pin assignment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinConfig {
    /// Output that simulates the float switch
    #[serde(default = "default_float_switch_pin")]
    pub float_switch: u8,
    /// Harness wires in red, green, black, white order
    #[serde(default = "default_harness")]
    pub harness: Vec<HarnessPair>,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            float_switch: default_float_switch_pin(),
            harness: default_harness(),
        }
    }
}

impl PinConfig {
    pub fn harness_outputs(&self) -> Vec<u8> {
        self.harness.iter().map(|pair| pair.output).collect()
    }

    pub fn harness_inputs(&self) -> Vec<u8> {
        self.harness.iter().map(|pair| pair.input).collect()
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

fn default_read_timeout() -> u64 {
    100
}

fn default_byte_size() -> u8 {
    8
}

fn default_parity() -> String {
    "N".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_queue_capacity() -> usize {
    100
}

fn default_join_timeout() -> u64 {
    5000
}

fn default_font_size() -> u32 {
    24
}

fn default_char_width_ratio() -> f32 {
    0.55
}

fn default_line_width() -> u32 {
    440
}

fn default_origin_x() -> u32 {
    20
}

fn default_origin_y() -> u32 {
    90
}

fn default_line_height() -> u32 {
    36
}

fn default_tool() -> String {
    "openocd".to_string()
}

fn default_interface_cfg() -> String {
    "interface/raspberrypi-native.cfg".to_string()
}

fn default_flash_retry_delay() -> u64 {
    1000
}

fn default_button_timeout() -> u64 {
    30_000
}

fn default_float_switch_timeout() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    50
}

fn default_cable_poll_interval() -> u64 {
    200
}

fn default_clock_period() -> u64 {
    1000
}

fn default_animation_period() -> u64 {
    17
}

fn default_float_switch_pin() -> u8 {
    21
}

fn default_harness() -> Vec<HarnessPair> {
    vec![
        HarnessPair { output: 16, input: 5 },
        HarnessPair { output: 19, input: 6 },
        HarnessPair { output: 20, input: 12 },
        HarnessPair { output: 26, input: 13 },
    ]
}

impl FixtureConfig {
    /// Environment variable prefix for overrides
    pub const ENV_PREFIX: &'static str = "HMI_FIXTURE_";

    /// Load configuration from `config/fixture.toml` and environment variables
    pub fn load() -> FixtureResult<Self> {
        Self::load_from("config/fixture.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> FixtureResult<Self> {
        let config = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> FixtureResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(FixtureError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["compact", "pretty", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(FixtureError::Configuration(format!(
                "Invalid application.log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        self.serial.validate()?;

        if self.display.line_width_px == 0 || self.display.font_size == 0 {
            return Err(FixtureError::Configuration(
                "display.line_width_px and display.font_size must be non-zero".into(),
            ));
        }
        let ratio = self.display.char_width_ratio;
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(FixtureError::Configuration(
                "display.char_width_ratio must be positive".into(),
            ));
        }

        if self.flashing.tool.trim().is_empty() {
            return Err(FixtureError::Configuration("flashing.tool is empty".into()));
        }

        if self.sequence.poll_interval_ms == 0
            || self.sequence.clock_period_ms == 0
            || self.sequence.animation_period_ms == 0
        {
            return Err(FixtureError::Configuration(
                "sequence periods and poll intervals must be non-zero".into(),
            ));
        }

        self.pins.validate()
    }

    /// Check that files referenced by the configuration exist.
    ///
    /// Only meaningful on the fixture itself, so it is kept out of `validate`.
    pub fn check_paths(&self) -> FixtureResult<()> {
        if let Some(font) = &self.display.font_path {
            if !font.exists() {
                return Err(FixtureError::Configuration(format!(
                    "font file {} does not exist",
                    font.display()
                )));
            }
        }

        if !self.flashing.working_dir.is_dir() {
            return Err(FixtureError::Configuration(format!(
                "flashing.working_dir {} does not exist",
                self.flashing.working_dir.display()
            )));
        }

        for image in [&self.flashing.test_program, &self.flashing.firmware] {
            let resolved = self.flashing.working_dir.join(image);
            if !resolved.exists() {
                return Err(FixtureError::Configuration(format!(
                    "firmware image {} does not exist",
                    resolved.display()
                )));
            }
        }

        Ok(())
    }
}

impl SerialConfig {
    /// Settings for `port` at `baud_rate` with every other field at its default.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            rtscts: false,
            timeout_ms: default_read_timeout(),
            byte_size: default_byte_size(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            inbound_capacity: default_queue_capacity(),
            outbound_capacity: default_queue_capacity(),
            overflow: OverflowPolicy::default(),
            join_timeout_ms: default_join_timeout(),
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn validate(&self) -> FixtureResult<()> {
        if self.port.trim().is_empty() {
            return Err(FixtureError::Configuration("serial.port is required".into()));
        }
        if self.baud_rate == 0 {
            return Err(FixtureError::Configuration(
                "serial.baud_rate must be non-zero".into(),
            ));
        }
        if !(5..=8).contains(&self.byte_size) {
            return Err(FixtureError::Configuration(format!(
                "Invalid serial.byte_size {}. Must be 5-8",
                self.byte_size
            )));
        }
        if !matches!(self.parity.to_uppercase().as_str(), "N" | "E" | "O") {
            return Err(FixtureError::Configuration(format!(
                "Invalid serial.parity '{}'. Must be one of: N, E, O",
                self.parity
            )));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(FixtureError::Configuration(format!(
                "Invalid serial.stop_bits {}. Must be 1 or 2",
                self.stop_bits
            )));
        }
        if self.timeout_ms == 0 {
            return Err(FixtureError::Configuration(
                "serial.timeout_ms must be non-zero".into(),
            ));
        }
        if self.inbound_capacity == 0 || self.outbound_capacity == 0 {
            return Err(FixtureError::Configuration(
                "serial queue capacities must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl PinConfig {
    pub fn validate(&self) -> FixtureResult<()> {
        let mut outputs = HashSet::new();
        let mut inputs = HashSet::new();

        outputs.insert(self.float_switch);
        for pair in &self.harness {
            if !outputs.insert(pair.output) {
                return Err(FixtureError::Configuration(format!(
                    "Output pin {} assigned twice",
                    pair.output
                )));
            }
            if !inputs.insert(pair.input) {
                return Err(FixtureError::Configuration(format!(
                    "Input pin {} assigned twice",
                    pair.input
                )));
            }
        }

        if let Some(pin) = outputs.intersection(&inputs).next() {
            return Err(FixtureError::Configuration(format!(
                "Pin {} is configured as both input and output",
                pin
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> FixtureConfig {
        FixtureConfig {
            application: ApplicationConfig::default(),
            serial: SerialConfig {
                port: "/dev/ttyS0".into(),
                baud_rate: 9600,
                rtscts: false,
                timeout_ms: 100,
                byte_size: 8,
                parity: "N".into(),
                stop_bits: 1,
                inbound_capacity: 100,
                outbound_capacity: 100,
                overflow: OverflowPolicy::Block,
                join_timeout_ms: 5000,
            },
            display: DisplayConfig::default(),
            flashing: FlashingConfig {
                tool: "openocd".into(),
                working_dir: PathBuf::from("openocd"),
                interface_cfg: default_interface_cfg(),
                test_program: PathBuf::from("test.cfg"),
                firmware: PathBuf::from("firmware.cfg"),
                use_sudo: true,
            },
            sequence: SequenceConfig::default(),
            pins: PinConfig::default(),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = sample_config();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = sample_config();
        config.application.log_format = "xml".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }

    #[test]
    fn test_missing_port_rejected() {
        let mut config = sample_config();
        config.serial.port = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, FixtureError::Configuration(msg) if msg.contains("serial.port")));
    }

    #[test]
    fn test_invalid_parity_and_frame_size() {
        let mut config = sample_config();
        config.serial.parity = "X".into();
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.serial.byte_size = 9;
        assert!(config.validate().is_err());

        let mut config = sample_config();
        config.serial.stop_bits = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pin_used_as_input_and_output() {
        let mut config = sample_config();
        config.pins.harness[0].input = config.pins.float_switch;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_sequence_timing() {
        let sequence = SequenceConfig::default();
        assert_eq!(sequence.flash_retry_delay(), Duration::from_secs(1));
        assert_eq!(sequence.clock_period(), Duration::from_secs(1));
        assert_eq!(sequence.button_timeout(), Duration::from_secs(30));
    }
}
