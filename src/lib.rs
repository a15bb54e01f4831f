//! STM32 native bootloader protocol (AN3155 dialect over CAN).

pub mod bootloader;
pub mod constants;
pub mod device;
pub mod error;
pub mod flashing;
pub mod format;
pub mod progress;
pub mod protocol;
pub mod transport;

pub use self::bootloader::{Bootloader, BootloaderConfig, Probed};
pub use self::device::{ChipDB, Device, DeviceFamily};
pub use self::error::{Error, Result};
pub use self::flashing::Flashing;
pub use self::protocol::Command;
pub use self::transport::Transport;
