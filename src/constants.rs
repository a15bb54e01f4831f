/// Positive acknowledgement on a status position.
pub const ACK: u8 = 0x79;
/// Negative acknowledgement on a status position.
pub const NACK: u8 = 0x1f;

/// Bytes per read/write command unless the family says otherwise.
pub const DEFAULT_TRANSFER_SIZE: usize = 256;
/// Flash page size unless the family says otherwise.
pub const DEFAULT_FLASH_PAGE_SIZE: u32 = 1024;

/// Page erase takes a one-byte page count, so this is the most one command can name.
pub const MAX_ERASE_PAGES: usize = 255;
/// Page count sentinel of the standard ERASE command meaning "erase everything".
pub const GLOBAL_ERASE: [u8; 2] = [0xff, 0x00];

/// Receive attempts made while waiting for the ACK of a slow command.
pub const WAIT_FOR_ACK_RETRIES: usize = 5;

/// Readout unprotect triggers a mass erase and gives no completion signal.
pub const READOUT_UNPROTECT_SETTLE_MS: u64 = 20_000;

/// Fill byte used to pad writes; matches erased flash.
pub const FLASH_ERASED: u8 = 0xff;
/// Writes are padded up to a multiple of this many bytes.
pub const WRITE_ALIGNMENT: usize = 4;
/// Largest firmware image, first to last byte. Well above any STM32 flash.
pub const MAX_IMAGE_SPAN: u64 = 16 * 1024 * 1024;

/// Number of bytes in the factory unique ID.
pub const UID_LEN: usize = 12;
/// Byte groups of the UID as displayed by vendor tooling.
pub const UID_SWAP: [&[usize]; 4] = [&[1, 0], &[3, 2], &[7, 6, 5, 4], &[11, 10, 9, 8]];

pub mod commands {
    pub const GET: u8 = 0x00;
    pub const GET_VERSION: u8 = 0x01;
    pub const GET_ID: u8 = 0x02;
    pub const READ_MEMORY: u8 = 0x11;
    pub const GO: u8 = 0x21;
    pub const WRITE_MEMORY: u8 = 0x31;
    pub const ERASE: u8 = 0x43;
    pub const EXTENDED_ERASE: u8 = 0x44;
    pub const WRITE_PROTECT: u8 = 0x63;
    pub const WRITE_UNPROTECT: u8 = 0x73;
    pub const READOUT_PROTECT: u8 = 0x82;
    pub const READOUT_UNPROTECT: u8 = 0x92;
}

/// Special selectors of the EXTENDED_ERASE command.
pub mod erase_bank {
    pub const ALL: u16 = 0xffff;
    pub const BANK1: u16 = 0xfffe;
    pub const BANK2: u16 = 0xfffd;
}
