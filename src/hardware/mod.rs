//! Fixture hardware: the flashing tool and the digital I/O pins.

pub mod capabilities;
pub mod gpio;
pub mod mock;
pub mod openocd;

pub use capabilities::{DigitalIo, FlashReport, Flasher};
pub use gpio::SysfsGpio;
pub use mock::{LoopbackIo, ScriptedFlasher};
pub use openocd::OpenOcdFlasher;
