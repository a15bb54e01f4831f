//! The bootloader protocol engine.
//!
//! Strictly request/response: every operation sends a frame and blocks on the
//! transport for the reply. Bulk reads and writes are sequences of bounded
//! single transfers and are not atomic.
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use scroll::{LE, Pread};

use crate::constants::{
    FLASH_ERASED, GLOBAL_ERASE, MAX_ERASE_PAGES, READOUT_UNPROTECT_SETTLE_MS, UID_LEN, UID_SWAP,
    WAIT_FOR_ACK_RETRIES, WRITE_ALIGNMENT, commands, erase_bank,
};
use crate::device::{ChipDB, Device, DeviceFamily, DeviceFlags, FamilyProfile, Flash};
use crate::error::{Error, Result};
use crate::progress::{ProgressArc, ProgressHandle, no_op_progress};
use crate::protocol::{Command, Reply, encode_page_list};
use crate::transport::Transport;

/// Session settings fixed at construction.
#[derive(Debug, Clone)]
pub struct BootloaderConfig {
    /// Family assumed until the device is detected.
    pub family: DeviceFamily,
    /// How long readout unprotect blocks for the implied mass erase.
    pub readout_unprotect_delay: Duration,
}

impl Default for BootloaderConfig {
    fn default() -> Self {
        BootloaderConfig {
            family: DeviceFamily::F1,
            readout_unprotect_delay: Duration::from_millis(READOUT_UNPROTECT_SETTLE_MS),
        }
    }
}

/// Outcome of reading an optional device register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probed<T> {
    Known(T),
    /// The family has no such register.
    NotSupported,
    /// The register address is not known for this family.
    Unknown,
}

impl<T> Probed<T> {
    pub fn known(self) -> Option<T> {
        match self {
            Probed::Known(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderVersion {
    pub version: u8,
    pub option_bytes: [u8; 2],
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.version >> 4, self.version & 0x0f)
    }
}

pub struct Bootloader<T: Transport> {
    transport: T,
    chip_db: &'static ChipDB,
    progress: ProgressArc,
    readout_unprotect_delay: Duration,

    data_transfer_size: usize,
    flash_page_size: u32,
    device_family: DeviceFamily,
    extended_erase: bool,
    supported_commands: BTreeSet<u8>,
    device: Option<&'static Device>,
    bootloader_id: Option<u8>,
}

impl<T: Transport> Bootloader<T> {
    pub fn new(transport: T, config: BootloaderConfig) -> Self {
        Self::with_chip_db(transport, config, ChipDB::global())
    }

    /// Use a catalog other than the embedded one.
    pub fn with_chip_db(transport: T, config: BootloaderConfig, chip_db: &'static ChipDB) -> Self {
        let profile = config.family.profile();
        Bootloader {
            transport,
            chip_db,
            progress: no_op_progress(),
            readout_unprotect_delay: config.readout_unprotect_delay,
            data_transfer_size: profile.transfer_size,
            flash_page_size: profile.flash_page_size,
            device_family: config.family,
            extended_erase: false,
            supported_commands: BTreeSet::new(),
            device: None,
            bootloader_id: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressArc) -> Self {
        self.progress = progress;
        self
    }

    pub fn data_transfer_size(&self) -> usize {
        self.data_transfer_size
    }

    pub fn flash_page_size(&self) -> u32 {
        self.flash_page_size
    }

    pub fn device_family(&self) -> DeviceFamily {
        self.device_family
    }

    /// EXTENDED_ERASE was listed by GET.
    pub fn extended_erase(&self) -> bool {
        self.extended_erase
    }

    pub fn supported_commands(&self) -> &BTreeSet<u8> {
        &self.supported_commands
    }

    pub fn supports(&self, opcode: u8) -> bool {
        self.supported_commands.contains(&opcode)
    }

    /// The identified device, `None` before `detect_device`.
    pub fn device(&self) -> Option<&'static Device> {
        self.device
    }

    pub fn bootloader_id(&self) -> Option<u8> {
        self.bootloader_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect()
    }

    fn profile(&self) -> FamilyProfile {
        self.device_family.profile()
    }

    fn flags(&self) -> DeviceFlags {
        self.device
            .map(Device::flags)
            .unwrap_or(self.profile().flags)
    }

    /// Send a command frame and require an ACK. Never resent.
    fn command(&mut self, cmd: Command) -> Result<()> {
        log::debug!("*** Command: {}", cmd);
        let raw = cmd.into_raw()?;
        self.transport.send(&raw)?;
        match self.recv_reply()? {
            Some(Ok(Reply::Ack)) => Ok(()),
            Some(Ok(Reply::Nack)) => Err(Error::command(format!("{} failed: NACK", cmd))),
            Some(Err(other)) => Err(Error::command(format!(
                "{} failed: unexpected reply {:#04x}",
                cmd, other
            ))),
            None => Err(Error::command(format!("{} failed: no ack", cmd))),
        }
    }

    /// One status frame, `None` on timeout.
    fn recv_status(&mut self) -> Result<Option<u8>> {
        let (value, raw) = self.transport.recv_int()?;
        match value {
            None => Ok(None),
            Some(byte) if raw.len() == 1 => Ok(Some(byte as u8)),
            Some(_) => Err(Error::transport(format!(
                "expected a status byte, got {}",
                hex::encode(&raw)
            ))),
        }
    }

    /// One status frame as a reply, or the offending byte.
    fn recv_reply(&mut self) -> Result<Option<std::result::Result<Reply, u8>>> {
        Ok(self
            .recv_status()?
            .map(|byte| Reply::from_byte(byte).ok_or(byte)))
    }

    fn is_ack(&mut self) -> Result<bool> {
        Ok(matches!(self.recv_reply()?, Some(Ok(Reply::Ack))))
    }

    fn recv_byte(&mut self, what: &str) -> Result<u8> {
        self.recv_status()?
            .ok_or_else(|| Error::Timeout(format!("reading {}", what)))
    }

    /// `len` payload bytes spread over as many frames as needed.
    fn recv_bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let max = self.transport.max_transfer_size();
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let frame = self
                .transport
                .recv()?
                .ok_or_else(|| Error::Timeout(format!("reading {}", what)))?;
            let take = (len - data.len()).min(frame.len()).min(max);
            data.extend_from_slice(&frame[..take]);
        }
        Ok(data)
    }

    /// Require a trailing ACK.
    fn expect_ack(&mut self, info: &str) -> Result<()> {
        match self.recv_reply()? {
            Some(Ok(Reply::Ack)) => Ok(()),
            Some(Ok(Reply::Nack)) => Err(Error::command(format!("NACK {}", info))),
            Some(Err(other)) => Err(Error::unknown_response(info, other)),
            None => Err(Error::command(format!("{}: no ack", info))),
        }
    }

    /// Bounded wait for the ACK of a slow command. NACKs and timeouts are retried.
    pub fn wait_for_ack(&mut self, info: &str) -> Result<()> {
        let mut nacked = false;
        for attempt in 1..=WAIT_FOR_ACK_RETRIES {
            match self.recv_reply()? {
                Some(Ok(Reply::Ack)) => return Ok(()),
                Some(Ok(Reply::Nack)) => {
                    nacked = true;
                    log::debug!("retry {} ({}/{})", info, attempt, WAIT_FOR_ACK_RETRIES);
                }
                Some(Err(other)) => return Err(Error::unknown_response(info, other)),
                None => log::debug!("no reply for {} ({}/{})", info, attempt, WAIT_FOR_ACK_RETRIES),
            }
        }
        if nacked {
            Err(Error::command(format!("NACK {}", info)))
        } else {
            Err(Error::command("Can't read port or timeout"))
        }
    }

    /// Bootloader version. Remembers the supported commands.
    pub fn get(&mut self) -> Result<u8> {
        self.command(Command::Get)?;
        let count = self.recv_byte("Get: command count")?;
        let version = self.recv_byte("Get: version")?;
        let mut supported = BTreeSet::new();
        for _ in 0..count {
            supported.insert(self.recv_byte("Get: command list")?);
        }
        self.expect_ack("Get command not completed")?;

        self.extended_erase = supported.contains(&commands::EXTENDED_ERASE);
        log::debug!(
            "Available commands: {}",
            supported
                .iter()
                .map(|b| format!("{:#04x}", b))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.supported_commands = supported;
        Ok(version)
    }

    /// Bootloader version and the two option bytes.
    pub fn get_version(&mut self) -> Result<BootloaderVersion> {
        self.command(Command::GetVersion)?;
        let data = self.recv_bytes(3, "Get version reply")?;
        self.wait_for_ack("0x01 end")?;
        let version = BootloaderVersion {
            version: data[0],
            option_bytes: [data[1], data[2]],
        };
        log::debug!(
            "Bootloader version: {:#04x}, option bytes: {:#04x} {:#04x}",
            version.version,
            version.option_bytes[0],
            version.option_bytes[1]
        );
        Ok(version)
    }

    /// Raw product ID.
    pub fn get_id(&mut self) -> Result<u32> {
        self.command(Command::GetId)?;
        let (value, raw) = self.transport.recv_int()?;
        let value = value.ok_or_else(|| Error::command("Get ID failed: no product ID"))?;
        let product_id = u32::try_from(value).map_err(|_| {
            Error::transport(format!("product ID {} too wide", hex::encode(&raw)))
        })?;
        self.expect_ack("Get ID")?;
        Ok(product_id)
    }

    /// Identify the device by product ID, refined by bootloader ID where possible.
    ///
    /// On success the session switches to the detected family's transfer and
    /// page sizes.
    pub fn detect_device(&mut self) -> Result<&'static Device> {
        let mut product_id = self.get_id()?;
        // BlueNRG keeps metal fix and mask set in the upper bytes
        if self.device_family == DeviceFamily::NRG {
            product_id &= 0xff;
        }

        let device = self.chip_db.get(product_id, None).ok_or_else(|| {
            Error::DeviceDetection(format!(
                "Unknown device type: no type known for product id: 0x{:03X}",
                product_id
            ))
        })?;

        // Read-protected chips NACK memory reads; keep the product ID match then.
        let bootloader_id = match device.bootloader_id_address() {
            Some(address) => match self.read_memory(address, 1) {
                Ok(data) => data.first().copied(),
                Err(Error::Command(msg)) => {
                    log::warn!("Bootloader ID unreadable ({}), keeping {}", msg, device);
                    None
                }
                Err(e) => return Err(e),
            },
            None => {
                log::warn!("No bootloader id address for this chip");
                None
            }
        };

        let device = match bootloader_id {
            Some(bid) => self.chip_db.get(product_id, Some(bid)).unwrap_or_else(|| {
                log::debug!(
                    "No variant for bootloader ID 0x{:02X}, keeping {}",
                    bid,
                    device
                );
                device
            }),
            None => device,
        };

        self.device = Some(device);
        self.bootloader_id = bootloader_id;
        self.adopt_family(device.family);
        Ok(device)
    }

    fn adopt_family(&mut self, family: DeviceFamily) {
        if family != self.device_family {
            log::warn!(
                "Configured device family {} but detected {}, using {}",
                self.device_family,
                family,
                family
            );
        }
        let profile = family.profile();
        self.device_family = family;
        self.data_transfer_size = profile.transfer_size;
        self.flash_page_size = profile.flash_page_size;
    }

    /// Bootloader ID byte, `None` when its register is unknown.
    pub fn get_bootloader_id(&mut self) -> Result<Option<u8>> {
        let address = match self.device {
            Some(device) => device.bootloader_id_address(),
            None => self.profile().bootloader_id_address,
        };
        let Some(address) = address else {
            log::warn!("No bootloader id address for this chip");
            return Ok(None);
        };
        let data = self.read_memory(address, 1)?;
        Ok(data.first().copied())
    }

    /// Read at most `data_transfer_size` bytes.
    pub fn read_memory(&mut self, address: u32, length: usize) -> Result<Vec<u8>> {
        if length > self.data_transfer_size {
            return Err(Error::data_length(format!(
                "Can not read more than {} bytes at once.",
                self.data_transfer_size
            )));
        }
        self.command(Command::ReadMemory {
            address,
            len: length,
        })?;
        let data = self.recv_bytes(length, &format!("{} bytes at 0x{:08X}", length, address))?;
        if !self.is_ack()? {
            return Err(Error::command(format!(
                "Read failed: {} bytes address 0x{:X}",
                length, address
            )));
        }
        Ok(data)
    }

    /// Read any amount, in `data_transfer_size` chunks.
    pub fn read_memory_data(&mut self, mut address: u32, length: usize) -> Result<Vec<u8>> {
        let chunk_count = length.div_ceil(self.data_transfer_size);
        log::debug!(
            "Read {} bytes in {} chunks at address 0x{:X}",
            length,
            chunk_count,
            address
        );
        let progress = ProgressHandle::begin(&self.progress, "Reading", chunk_count as u64);
        let mut data = Vec::with_capacity(length);
        let mut remaining = length;
        while remaining > 0 {
            let read_length = remaining.min(self.data_transfer_size);
            data.extend(self.read_memory(address, read_length)?);
            progress.step();
            remaining -= read_length;
            if remaining > 0 {
                address = advance(address, read_length)?;
            }
        }
        progress.finish();
        Ok(data)
    }

    /// Write at most `data_transfer_size` bytes, padded to a multiple of 4 with 0xFF.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() > self.data_transfer_size {
            return Err(Error::data_length(format!(
                "Can not write more than {} bytes at once.",
                self.data_transfer_size
            )));
        }
        // Each frame carries the opcode in front of the data.
        let per_frame = self.transport.max_transfer_size().saturating_sub(1);
        if per_frame == 0 {
            return Err(Error::transport("transport frames can not carry write data"));
        }

        self.command(Command::WriteMemory {
            address,
            len: data.len(),
        })?;

        let mut payload = data.to_vec();
        payload.resize(data.len().next_multiple_of(WRITE_ALIGNMENT), FLASH_ERASED);
        for chunk in payload.chunks(per_frame) {
            let mut frame = Vec::with_capacity(chunk.len() + 1);
            frame.push(commands::WRITE_MEMORY);
            frame.extend_from_slice(chunk);
            self.transport.send(&frame)?;
        }

        if !self.is_ack()? {
            return Err(Error::command(format!(
                "Write failed: {} bytes address 0x{:X}",
                data.len(),
                address
            )));
        }
        Ok(())
    }

    /// Write any amount, in `data_transfer_size` chunks.
    pub fn write_memory_data(&mut self, mut address: u32, data: &[u8]) -> Result<()> {
        let chunk_count = data.len().div_ceil(self.data_transfer_size);
        log::debug!(
            "Write {} bytes in {} chunks at address 0x{:X}",
            data.len(),
            chunk_count,
            address
        );
        let progress = ProgressHandle::begin(&self.progress, "Writing", chunk_count as u64);
        let mut chunks = data.chunks(self.data_transfer_size).peekable();
        while let Some(chunk) = chunks.next() {
            self.write_memory(address, chunk)?;
            progress.step();
            if chunks.peek().is_some() {
                address = advance(address, chunk.len())?;
            }
        }
        progress.finish();
        Ok(())
    }

    /// Erase the given zero-based pages, or everything with `None`.
    ///
    /// Devices that listed EXTENDED_ERASE are erased through it instead.
    pub fn erase_memory(&mut self, pages: Option<&[u32]>) -> Result<()> {
        if self.extended_erase {
            return self.extended_erase_memory(pages);
        }

        let payload = match pages {
            Some(pages) => encode_page_list(pages)?,
            // No mass erase: name every page instead.
            None if !self.profile().mass_erase => {
                let pages = self.all_pages()?;
                encode_page_list(&pages)?
            }
            None => GLOBAL_ERASE.to_vec(),
        };

        self.command(Command::Erase)?;
        self.send_payload(&payload)?;
        self.wait_for_ack("0x43 erase failed")?;
        log::debug!("Erase memory done");
        Ok(())
    }

    fn all_pages(&mut self) -> Result<Vec<u32>> {
        let flash_kib = match self.get_flash_size()? {
            Probed::Known(kib) => kib,
            _ => self
                .device
                .map(|device| device.flash_size() / 1024)
                .filter(|&kib| kib > 0)
                .ok_or_else(|| {
                    Error::page_index(format!(
                        "Flash size unknown, can not erase {} family page by page.",
                        self.device_family
                    ))
                })?,
        };
        // The chip's own layout beats the family default (L1 pages are 256 bytes).
        let page_size = self
            .device
            .and_then(|device| device.flash.as_ref())
            .and_then(Flash::page_size)
            .unwrap_or(self.flash_page_size);
        let page_count = u64::from(flash_kib) * 1024 / u64::from(page_size);
        if page_count > MAX_ERASE_PAGES as u64 {
            return Err(Error::page_index(format!(
                "Can not erase more than {} pages for {} family ({} KiB flash is {} pages).",
                MAX_ERASE_PAGES, self.device_family, flash_kib, page_count
            )));
        }
        Ok((0..page_count as u32).collect())
    }

    /// Erase all banks with two-byte addressing.
    ///
    /// Single pages can't be selected this way and are rejected.
    pub fn extended_erase_memory(&mut self, pages: Option<&[u32]>) -> Result<()> {
        if pages.is_some() {
            return Err(Error::page_index(
                "Extended erase of selected pages is not supported. Set pages to None to erase all banks.",
            ));
        }
        self.command(Command::ExtendedErase {
            bank: erase_bank::ALL,
        })?;

        let info = "erase command";
        for _ in 0..WAIT_FOR_ACK_RETRIES {
            match self.recv_reply()? {
                Some(Ok(Reply::Ack)) => {
                    log::debug!("Extended erase memory done");
                    return Ok(());
                }
                Some(Ok(Reply::Nack)) => return Err(Error::command(format!("NACK {}", info))),
                Some(Err(other)) => return Err(Error::unknown_response(info, other)),
                // mass erase takes a while
                None => continue,
            }
        }
        Err(Error::command("Can't read port or timeout"))
    }

    /// Page lists may be longer than one frame.
    fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let max = self.transport.max_transfer_size().max(1);
        for chunk in payload.chunks(max) {
            self.transport.send(chunk)?;
        }
        Ok(())
    }

    pub fn write_protect(&mut self, pages: &[u32]) -> Result<()> {
        let payload = encode_page_list(pages)?;
        self.command(Command::WriteProtect)?;
        self.send_payload(&payload)?;
        self.expect_ack("0x63 write protect failed")?;
        log::debug!("Write protect done");
        Ok(())
    }

    pub fn write_unprotect(&mut self) -> Result<()> {
        self.command(Command::WriteUnprotect)?;
        log::debug!("Write unprotect done");
        Ok(())
    }

    pub fn readout_protect(&mut self) -> Result<()> {
        self.command(Command::ReadoutProtect)?;
        self.wait_for_ack("0x82 readout protect failed")?;
        log::debug!("Read protect done");
        Ok(())
    }

    /// Disable readout protection. The device mass erases the flash.
    pub fn readout_unprotect(&mut self) -> Result<()> {
        self.command(Command::ReadoutUnprotect)?;
        log::info!("Mass erase, this may take a while");
        std::thread::sleep(self.readout_unprotect_delay);
        log::info!("Unprotect / mass erase done");
        Ok(())
    }

    /// Jump to the application at `address`.
    pub fn go(&mut self, address: u32) -> Result<()> {
        self.command(Command::Go { address })?;
        if !self.is_ack()? {
            return Err(Error::command(format!(
                "Go: address 0x{:08X} not valid",
                address
            )));
        }
        Ok(())
    }

    pub fn get_uid(&mut self) -> Result<Probed<[u8; UID_LEN]>> {
        if self.flags().contains(DeviceFlags::LONG_UID_ACCESS) {
            let (_flash_size, uid) = self.get_flash_size_and_uid()?;
            return Ok(uid);
        }
        let Some(uid_address) = self.profile().uid_address else {
            return Ok(Probed::NotSupported);
        };
        let data = self.read_memory(uid_address, UID_LEN)?;
        Ok(Probed::Known(to_uid(&data)?))
    }

    /// Flash size in KiB.
    pub fn get_flash_size(&mut self) -> Result<Probed<u32>> {
        let Some(flash_size_address) = self.profile().flash_size_address else {
            return Ok(Probed::Unknown);
        };
        if self.flags().contains(DeviceFlags::LONG_UID_ACCESS) {
            let (flash_size, _uid) = self.get_flash_size_and_uid()?;
            return Ok(flash_size);
        }
        let data = self.read_memory(flash_size_address, 2)?;
        let kib: u16 = data.pread_with(0, LE)?;
        Ok(Probed::Known(u32::from(kib)))
    }

    /// Flash size (KiB) and UID from one aligned block read.
    pub fn get_flash_size_and_uid(&mut self) -> Result<(Probed<u32>, Probed<[u8; UID_LEN]>)> {
        let profile = self.profile();
        let Some(uid_address) = profile.uid_address else {
            return Ok((Probed::Unknown, Probed::NotSupported));
        };
        let block_start = uid_address & 0xFFFF_FF00;
        log::debug!(
            "uid_address = 0x{:X}, flash_size_address = {:X?}",
            uid_address,
            profile.flash_size_address
        );
        let data = self.read_memory(block_start, self.data_transfer_size)?;

        let uid_offset = (uid_address - block_start) as usize;
        let uid = data
            .get(uid_offset..uid_offset + UID_LEN)
            .ok_or_else(|| Error::data_length("UID lies outside of the block read"))?;
        let uid = Probed::Known(to_uid(uid)?);

        let flash_size = match profile.flash_size_address {
            Some(address) => {
                let offset = address
                    .checked_sub(block_start)
                    .ok_or_else(|| Error::data_length("flash size lies outside of the block read"))?;
                let kib: u16 = data.pread_with(offset as usize, LE)?;
                Probed::Known(u32::from(kib))
            }
            None => Probed::Unknown,
        };
        Ok((flash_size, uid))
    }

    /// Zero-based page indices covering `[start, end)`.
    pub fn pages_from_range(&self, start: u32, end: u32) -> Result<Vec<u32>> {
        if start % self.flash_page_size != 0 {
            return Err(Error::page_index(format!(
                "Erase start address should be at a flash page boundary: 0x{:08X}.",
                start
            )));
        }
        if end % self.flash_page_size != 0 {
            return Err(Error::page_index(format!(
                "Erase end address should be at a flash page boundary: 0x{:08X}.",
                end
            )));
        }
        Ok((start / self.flash_page_size..end / self.flash_page_size).collect())
    }
}

fn advance(address: u32, len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .and_then(|len| address.checked_add(len))
        .ok_or_else(|| Error::data_length(format!("transfer beyond 0x{:08X} overflows", address)))
}

fn to_uid(bytes: &[u8]) -> Result<[u8; UID_LEN]> {
    bytes.try_into().map_err(|_| {
        Error::data_length(format!("UID must be {} bytes, got {}", UID_LEN, bytes.len()))
    })
}

/// UID as shown by vendor tooling, e.g. `3F00-4B04-31373433-0B473350`.
pub fn format_uid(uid: &[u8; UID_LEN]) -> String {
    UID_SWAP
        .iter()
        .map(|group| group.iter().map(|&i| format!("{:02X}", uid[i])).collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Fails on the first difference between `read` and `reference`.
pub fn verify_data(read: &[u8], reference: &[u8]) -> Result<()> {
    if read.len() != reference.len() {
        return Err(Error::LengthMismatch {
            read: read.len(),
            expected: reference.len(),
        });
    }
    match read.iter().zip(reference).position(|(a, b)| a != b) {
        None => Ok(()),
        Some(offset) => Err(Error::DataMismatch {
            offset,
            read: read[offset],
            expected: reference[offset],
        }),
    }
}
