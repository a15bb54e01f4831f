use thiserror::Error;

/// Convenient result type for `stm32boot`.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The device rejected a command or never acknowledged it.
    #[error("command failed: {0}")]
    Command(String),

    /// A status position carried something other than ACK or NACK.
    #[error("unknown response. {info}: {byte:#04x}")]
    UnknownResponse { info: String, byte: u8 },

    /// A single read or write exceeds the negotiated transfer size.
    #[error("data length error: {0}")]
    DataLength(String),

    /// Misaligned erase boundary, too many pages, or a page count the device can't take.
    #[error("page index error: {0}")]
    PageIndex(String),

    #[error("data length does not match: {read} bytes vs {expected} bytes")]
    LengthMismatch { read: usize, expected: usize },

    #[error(
        "verification data does not match read data. First mismatch at address: {offset:#X} read {read:#X} vs {expected:#X} expected"
    )]
    DataMismatch { offset: usize, read: u8, expected: u8 },

    #[error("device detection failed: {0}")]
    DeviceDetection(String),

    /// An optional collaborator is missing; callers substitute a no-op.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("timeout while {0}")]
    Timeout(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("firmware error: {0}")]
    Firmware(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serial(#[from] serialport::Error),

    #[error("device catalog error: {0}")]
    Catalog(#[from] serde_yaml::Error),

    #[error("Intel HEX parse error: {0}")]
    IntelHex(#[from] ihex::ReaderError),

    #[error(transparent)]
    Scroll(#[from] scroll::Error),
}

impl Error {
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    pub fn data_length(msg: impl Into<String>) -> Self {
        Self::DataLength(msg.into())
    }

    pub fn page_index(msg: impl Into<String>) -> Self {
        Self::PageIndex(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn unknown_response(info: impl Into<String>, byte: u8) -> Self {
        Self::UnknownResponse {
            info: info.into(),
            byte,
        }
    }

    /// Both length and content mismatches are verify failures.
    pub fn is_data_mismatch(&self) -> bool {
        matches!(self, Self::LengthMismatch { .. } | Self::DataMismatch { .. })
    }
}
