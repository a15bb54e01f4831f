//! Chip flashing logic.

use crate::bootloader::{Bootloader, BootloaderConfig, Probed, format_uid, verify_data};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::progress::ProgressArc;
use crate::transport::{SlcanConfig, SlcanTransport, Transport};

pub struct Flashing<T: Transport> {
    bootloader: Bootloader<T>,
}

impl Flashing<SlcanTransport> {
    pub fn new_from_slcan(
        port: &str,
        slcan: &SlcanConfig,
        config: BootloaderConfig,
        progress: ProgressArc,
    ) -> Result<Self> {
        let transport = SlcanTransport::open(port, slcan)?;
        Ok(Flashing::new(
            Bootloader::new(transport, config).with_progress(progress),
        ))
    }
}

impl<T: Transport> Flashing<T> {
    pub fn new(bootloader: Bootloader<T>) -> Self {
        Flashing { bootloader }
    }

    pub fn bootloader(&mut self) -> &mut Bootloader<T> {
        &mut self.bootloader
    }

    /// GET, then product and bootloader ID.
    pub fn identify(&mut self) -> Result<&'static Device> {
        let version = self.bootloader.get()?;
        log::info!("Bootloader version: 0x{:X}", version);
        let device = self.bootloader.detect_device()?;
        if let Some(bid) = self.bootloader.bootloader_id() {
            log::info!("Bootloader ID: 0x{:02X}", bid);
        }
        log::info!("Chip ID: 0x{:03X}", device.product_id);
        log::info!("Chip model: {}", device);
        Ok(device)
    }

    /// UID and flash size. Read failures are only reported.
    pub fn dump_info(&mut self) -> Result<()> {
        if let Some(device) = self.bootloader.device() {
            log::info!(
                "Chip: {} (family {}, flash: {}KiB, RAM: {}KiB)",
                device,
                device.family,
                device.flash_size() / 1024,
                device.ram_size() / 1024
            );
        }

        match self.bootloader.get_uid() {
            Ok(Probed::Known(uid)) => log::info!("Device UID: {}", format_uid(&uid)),
            Ok(Probed::NotSupported) => log::info!("UID not supported in this part"),
            Ok(Probed::Unknown) => log::info!("UID address unknown"),
            Err(e @ Error::Command(_)) => {
                log::warn!("Something was wrong with reading chip UID: {}", e)
            }
            Err(e) => return Err(e),
        }

        match self.bootloader.get_flash_size() {
            Ok(Probed::Known(kib)) => log::info!("Flash size: {} KiB", kib),
            Ok(_) => log::debug!("Flash size register unknown"),
            Err(e @ Error::Command(_)) => {
                log::warn!("Something was wrong with reading chip flash size: {}", e)
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Remove readout protection. Erases the whole flash.
    pub fn unprotect(&mut self) -> Result<()> {
        self.bootloader.readout_unprotect()?;
        log::info!("Readout protection removed");
        Ok(())
    }

    /// Erase `(start, length)` page by page, or everything.
    pub fn erase(&mut self, range: Option<(u32, u32)>) -> Result<()> {
        let result = match range {
            None => {
                log::info!("Performing full erase...");
                self.bootloader.erase_memory(None)
            }
            Some((start, length)) => {
                let end = start.checked_add(length).ok_or_else(|| {
                    Error::page_index(format!("erase range 0x{:X} + 0x{:X} overflows", start, length))
                })?;
                let pages = self.bootloader.pages_from_range(start, end)?;
                log::info!(
                    "Performing partial erase (0x{:X} - 0x{:X}, {} pages)...",
                    start,
                    end,
                    pages.len()
                );
                self.bootloader.erase_memory(Some(&pages))
            }
        };
        if let Err(Error::Command(_)) = &result {
            log::error!("Erase failed. The device may be readout protected, try --unprotect.");
        }
        result
    }

    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<()> {
        log::info!("Writing {} bytes at 0x{:08X}", data.len(), address);
        self.bootloader.write_memory_data(address, data)
    }

    /// Read back and compare.
    pub fn verify(&mut self, address: u32, data: &[u8]) -> Result<()> {
        let read = self.bootloader.read_memory_data(address, data.len())?;
        verify_data(&read, data)?;
        log::info!("Verification OK");
        Ok(())
    }

    pub fn read(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        log::info!("Reading {} bytes at 0x{:08X}", length, address);
        self.bootloader.read_memory_data(address, length)
    }

    pub fn go(&mut self, address: u32) -> Result<()> {
        self.bootloader.go(address)?;
        log::info!("Jumped to 0x{:08X}", address);
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.bootloader.disconnect()
    }
}
