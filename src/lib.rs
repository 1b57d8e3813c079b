//! # HMI Fixture Library
//!
//! Controller for a manufacturing test fixture driven from a serial touch-panel HMI.
//! The binary (`main.rs`) wires these modules together; integration tests drive them
//! directly over in-memory pipes.
//!
//! ## Crate Structure
//!
//! - **`config`**: Figment-backed configuration (`config/fixture.toml` plus
//!   `HMI_FIXTURE_` environment overrides) and its validation.
//! - **`error`**: The `FixtureError` enum shared by every module.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`link`**: The serial link task engine. One reader, one writer and any number of
//!   named periodic producers share one channel through bounded queues.
//! - **`sequence`**: The page-keyed test sequence: flashing with retries, button and
//!   float-switch waits, harness continuity, diagnostics on the error page.
//! - **`hardware`**: Flashing and digital I/O capabilities with real and mock backends.
//! - **`console`**: Operator commands read from stdin.

pub mod config;
pub mod console;
pub mod error;
pub mod hardware;
pub mod link;
pub mod logging;
pub mod sequence;

pub use config::FixtureConfig;
pub use error::{FixtureError, FixtureResult};
pub use link::{SerialLink, SerialLinkBuilder};
pub use sequence::Sequencer;
