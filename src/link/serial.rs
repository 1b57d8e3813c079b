//! Serial port plumbing for the link engine.
//!
//! The engine works on anything implementing [`SerialPortIO`], so tests can hand it
//! one end of a `tokio::io::duplex` pipe while the fixture uses a real
//! `tokio_serial::SerialStream`.

use crate::config::SerialConfig;
use crate::error::{FixtureError, FixtureResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};

/// Trait alias for async serial port I/O.
///
/// Any type implementing `AsyncRead + AsyncWrite + Unpin + Send` can be used:
/// - `tokio_serial::SerialStream` (real hardware)
/// - `tokio::io::DuplexStream` (testing)
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

fn data_bits(config: &SerialConfig) -> FixtureResult<DataBits> {
    match config.byte_size {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(FixtureError::Configuration(format!(
            "Unsupported byte size {}",
            other
        ))),
    }
}

fn parity(config: &SerialConfig) -> FixtureResult<Parity> {
    match config.parity.to_uppercase().as_str() {
        "N" => Ok(Parity::None),
        "E" => Ok(Parity::Even),
        "O" => Ok(Parity::Odd),
        other => Err(FixtureError::Configuration(format!(
            "Unsupported parity '{}'",
            other
        ))),
    }
}

fn stop_bits(config: &SerialConfig) -> FixtureResult<StopBits> {
    match config.stop_bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        other => Err(FixtureError::Configuration(format!(
            "Unsupported stop bits {}",
            other
        ))),
    }
}

/// Describe why a port could not be opened in terms an operator can act on.
fn classify_open_error(err: &tokio_serial::Error) -> String {
    use std::io::ErrorKind as IoKind;
    use tokio_serial::ErrorKind;

    let cause = match err.kind() {
        ErrorKind::NoDevice => "device not present",
        ErrorKind::Io(IoKind::NotFound) => "device not present",
        ErrorKind::Io(IoKind::PermissionDenied) => "permission denied",
        _ if err.description.to_lowercase().contains("busy") => "device busy",
        _ => "open failed",
    };
    format!("{} ({})", cause, err.description)
}

/// Open a serial port asynchronously using spawn_blocking.
///
/// The configuration is validated first; opening runs on the blocking pool so a
/// slow driver cannot stall the runtime.
pub async fn open_serial_async(config: &SerialConfig) -> FixtureResult<tokio_serial::SerialStream> {
    config.validate()?;

    let builder = tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(data_bits(config)?)
        .parity(parity(config)?)
        .stop_bits(stop_bits(config)?)
        .flow_control(if config.rtscts {
            FlowControl::Hardware
        } else {
            FlowControl::None
        })
        .timeout(config.read_timeout());
    let port = config.port.clone();

    tokio::task::spawn_blocking(move || builder.open_native_async())
        .await
        .map_err(|e| FixtureError::ChannelOpen {
            port: port.clone(),
            reason: format!("spawn_blocking for serial port opening failed: {}", e),
        })?
        .map_err(|e| FixtureError::ChannelOpen {
            reason: classify_open_error(&e),
            port,
        })
}
