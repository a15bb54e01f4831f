//! The underlying binary protocol of the STM32 native bootloader (CAN dialect of AN3155)

use std::fmt;

use scroll::{BE, Pwrite};

use crate::constants::{ACK, MAX_ERASE_PAGES, NACK, commands};
use crate::error::{Error, Result};

/// Bootloader command, with the fields carried in its first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Bootloader version and the set of supported commands.
    Get,
    /// Bootloader version and the two option bytes.
    GetVersion,
    /// Product ID of the chip.
    GetId,
    /// Read `len` bytes (1..=256) starting at `address`.
    ReadMemory { address: u32, len: usize },
    /// Jump to the application at `address`.
    Go { address: u32 },
    /// Write `len` bytes (1..=256) starting at `address`. Data follows in separate frames.
    WriteMemory { address: u32, len: usize },
    /// One-byte page addressing erase. The page list follows in a separate frame.
    Erase,
    /// Two-byte addressing erase, here only with a special bank selector.
    ExtendedErase { bank: u16 },
    WriteProtect,
    WriteUnprotect,
    ReadoutProtect,
    ReadoutUnprotect,
}

impl Command {
    pub const fn opcode(&self) -> u8 {
        match self {
            Command::Get => commands::GET,
            Command::GetVersion => commands::GET_VERSION,
            Command::GetId => commands::GET_ID,
            Command::ReadMemory { .. } => commands::READ_MEMORY,
            Command::Go { .. } => commands::GO,
            Command::WriteMemory { .. } => commands::WRITE_MEMORY,
            Command::Erase => commands::ERASE,
            Command::ExtendedErase { .. } => commands::EXTENDED_ERASE,
            Command::WriteProtect => commands::WRITE_PROTECT,
            Command::WriteUnprotect => commands::WRITE_UNPROTECT,
            Command::ReadoutProtect => commands::READOUT_PROTECT,
            Command::ReadoutUnprotect => commands::READOUT_UNPROTECT,
        }
    }

    /// Human readable name, used in error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Command::Get => "Get",
            Command::GetVersion => "Get version",
            Command::GetId => "Get ID",
            Command::ReadMemory { .. } => "Read memory",
            Command::Go { .. } => "Go",
            Command::WriteMemory { .. } => "Write memory",
            Command::Erase => "Erase memory",
            Command::ExtendedErase { .. } => "Extended erase memory",
            Command::WriteProtect => "Write protect",
            Command::WriteUnprotect => "Write unprotect",
            Command::ReadoutProtect => "Readout protect",
            Command::ReadoutUnprotect => "Readout unprotect",
        }
    }

    /// Encode the command frame.
    ///
    /// - READ/WRITE: `[opcode][address: u32 BE][len - 1]`
    /// - GO: `[opcode][address: u32 BE]`
    /// - EXTENDED_ERASE: `[opcode][bank: u16 BE]`
    /// - everything else: `[opcode]`
    pub fn into_raw(self) -> Result<Vec<u8>> {
        match self {
            Command::ReadMemory { address, len } | Command::WriteMemory { address, len } => {
                let len_byte = length_field(len)?;
                let mut buf = vec![0u8; 6];
                buf[0] = self.opcode();
                buf.pwrite_with(address, 1, BE)?;
                buf[5] = len_byte;
                Ok(buf)
            }
            Command::Go { address } => {
                let mut buf = vec![0u8; 5];
                buf[0] = self.opcode();
                buf.pwrite_with(address, 1, BE)?;
                Ok(buf)
            }
            Command::ExtendedErase { bank } => {
                let mut buf = vec![0u8; 3];
                buf[0] = self.opcode();
                buf.pwrite_with(bank, 1, BE)?;
                Ok(buf)
            }
            _ => Ok(vec![self.opcode()]),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.opcode())
    }
}

/// The one-byte `N - 1` length field of READ/WRITE_MEMORY.
fn length_field(len: usize) -> Result<u8> {
    if len == 0 || len > 256 {
        return Err(Error::data_length(format!(
            "length must be between 1 and 256 bytes, got {}",
            len
        )));
    }
    Ok((len - 1) as u8)
}

/// Status byte sent by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    Ack,
    Nack,
}

impl Reply {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ACK => Some(Reply::Ack),
            NACK => Some(Reply::Nack),
            _ => None,
        }
    }

    pub const fn to_byte(self) -> u8 {
        match self {
            Reply::Ack => ACK,
            Reply::Nack => NACK,
        }
    }
}

/// XOR of `seed` with every byte.
pub fn xor_checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, b| acc ^ b)
}

/// Encode a zero-based page index list as `[count - 1][pages...][checksum]`.
///
/// Shared by ERASE and WRITE_PROTECT.
pub fn encode_page_list(pages: &[u32]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(Error::page_index("page list is empty"));
    }
    if pages.len() > MAX_ERASE_PAGES {
        return Err(Error::page_index(format!(
            "Can not erase more than {} pages at once ({} given). \
             Set pages to None to do global erase or supply fewer pages.",
            MAX_ERASE_PAGES,
            pages.len()
        )));
    }
    let page_bytes = pages
        .iter()
        .map(|&page| {
            u8::try_from(page).map_err(|_| {
                Error::page_index(format!(
                    "page index {} can not be addressed with one byte",
                    page
                ))
            })
        })
        .collect::<Result<Vec<u8>>>()?;

    let count = (pages.len() - 1) as u8;
    let mut buf = Vec::with_capacity(page_bytes.len() + 2);
    buf.push(count);
    buf.extend_from_slice(&page_bytes);
    buf.push(xor_checksum(count, &page_bytes));
    Ok(buf)
}
