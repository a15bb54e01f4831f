//! Serial-line CAN (Lawicel ASCII protocol) transportation.
use std::fmt::Display;
use std::io::{self, Read, Write};
use std::time::Duration;

use clap::{ValueEnum, builder::PossibleValue};
use serialport::SerialPort;

use super::Transport;
use crate::error::{Error, Result};

const SERIAL_BAUDRATE: u32 = 115200;
const DEFAULT_TIMEOUT_MS: u64 = 1000;

const BEL: u8 = 0x07;
const CR: u8 = b'\r';

/// Payload sizes a CAN FD frame can carry, indexed by DLC.
const FD_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];
const CLASSIC_MAX: usize = 8;
const FD_MAX: usize = 64;
const MAX_STANDARD_ID: u32 = 0x7ff;
const MAX_EXTENDED_ID: u32 = 0x1fff_ffff;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum CanBitrate {
    Bitrate10k,
    Bitrate20k,
    Bitrate50k,
    Bitrate100k,
    Bitrate125k,
    Bitrate250k,
    #[default]
    Bitrate500k,
    Bitrate800k,
    Bitrate1m,
}

impl CanBitrate {
    /// Setup command, `S0` to `S8`.
    fn setup_command(&self) -> String {
        let index = match self {
            CanBitrate::Bitrate10k => 0,
            CanBitrate::Bitrate20k => 1,
            CanBitrate::Bitrate50k => 2,
            CanBitrate::Bitrate100k => 3,
            CanBitrate::Bitrate125k => 4,
            CanBitrate::Bitrate250k => 5,
            CanBitrate::Bitrate500k => 6,
            CanBitrate::Bitrate800k => 7,
            CanBitrate::Bitrate1m => 8,
        };
        format!("S{}", index)
    }
}

impl From<CanBitrate> for u32 {
    fn from(value: CanBitrate) -> Self {
        match value {
            CanBitrate::Bitrate10k => 10_000,
            CanBitrate::Bitrate20k => 20_000,
            CanBitrate::Bitrate50k => 50_000,
            CanBitrate::Bitrate100k => 100_000,
            CanBitrate::Bitrate125k => 125_000,
            CanBitrate::Bitrate250k => 250_000,
            CanBitrate::Bitrate500k => 500_000,
            CanBitrate::Bitrate800k => 800_000,
            CanBitrate::Bitrate1m => 1_000_000,
        }
    }
}

impl Display for CanBitrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

impl ValueEnum for CanBitrate {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            CanBitrate::Bitrate10k,
            CanBitrate::Bitrate20k,
            CanBitrate::Bitrate50k,
            CanBitrate::Bitrate100k,
            CanBitrate::Bitrate125k,
            CanBitrate::Bitrate250k,
            CanBitrate::Bitrate500k,
            CanBitrate::Bitrate800k,
            CanBitrate::Bitrate1m,
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        let (name, aliases): (&'static str, [&'static str; 2]) = match self {
            CanBitrate::Bitrate10k => ("10k", ["10000", "10_000"]),
            CanBitrate::Bitrate20k => ("20k", ["20000", "20_000"]),
            CanBitrate::Bitrate50k => ("50k", ["50000", "50_000"]),
            CanBitrate::Bitrate100k => ("100k", ["100000", "100_000"]),
            CanBitrate::Bitrate125k => ("125k", ["125000", "125_000"]),
            CanBitrate::Bitrate250k => ("250k", ["250000", "250_000"]),
            CanBitrate::Bitrate500k => ("500k", ["500000", "500_000"]),
            CanBitrate::Bitrate800k => ("800k", ["800000", "800_000"]),
            CanBitrate::Bitrate1m => ("1m", ["1000000", "1_000_000"]),
        };
        Some(PossibleValue::new(name).aliases(aliases))
    }
}

#[derive(Debug, Clone)]
pub struct SlcanConfig {
    pub bitrate: CanBitrate,
    /// Identifier of transmitted frames. Above 0x7FF an extended frame is sent.
    pub can_id: u32,
    /// Send CAN FD frames with bitrate switch.
    pub fd: bool,
    pub timeout: Duration,
}

impl Default for SlcanConfig {
    fn default() -> Self {
        SlcanConfig {
            bitrate: CanBitrate::default(),
            can_id: 0,
            fd: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// A CAN channel behind a serial-line CAN adapter.
///
/// Generic over the byte port so the codec can run against an in-memory port.
pub struct SlcanTransport<P: Read + Write = Box<dyn SerialPort>> {
    port: P,
    can_id: u32,
    fd: bool,
    line: Vec<u8>,
}

impl SlcanTransport {
    pub fn scan_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    pub fn open(port: &str, config: &SlcanConfig) -> Result<Self> {
        log::info!(
            "Opening SLCAN adapter: \"{}\" @ {} bit/s{}",
            port,
            config.bitrate,
            if config.fd { " (CAN FD)" } else { "" }
        );
        let serial = serialport::new(port, SERIAL_BAUDRATE)
            .timeout(config.timeout)
            .open()?;
        Self::with_port(serial, config)
    }
}

impl<P: Read + Write> SlcanTransport<P> {
    /// Configure the adapter behind `port` and open the CAN channel.
    pub fn with_port(port: P, config: &SlcanConfig) -> Result<Self> {
        let limit = if config.can_id > MAX_STANDARD_ID {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if config.can_id > limit {
            return Err(Error::transport(format!(
                "CAN identifier 0x{:X} out of range",
                config.can_id
            )));
        }

        let mut transport = SlcanTransport {
            port,
            can_id: config.can_id,
            fd: config.fd,
            line: Vec::new(),
        };
        // The channel may still be open from an earlier session.
        transport.command("C")?;
        transport.command(&config.bitrate.setup_command())?;
        transport.command("O")?;
        Ok(transport)
    }

    pub fn into_inner(self) -> P {
        self.port
    }

    /// Send an adapter command and wait for its confirmation.
    fn command(&mut self, cmd: &str) -> Result<()> {
        log::trace!("slcan => {}", cmd);
        self.port.write_all(cmd.as_bytes())?;
        self.port.write_all(&[CR])?;
        self.port.flush()?;
        match self.read_line() {
            Ok(Some(_)) => Ok(()),
            // Some adapters confirm nothing at all
            Ok(None) => {
                log::debug!("No confirmation for adapter command {:?}", cmd);
                Ok(())
            }
            Err(e) => Err(Error::transport(format!(
                "adapter rejected command {:?}: {}",
                cmd, e
            ))),
        }
    }

    /// One CR terminated line, `None` on timeout.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => match byte[0] {
                    CR => return Ok(Some(std::mem::take(&mut self.line))),
                    BEL => {
                        self.line.clear();
                        return Err(Error::transport("adapter reported an error (BEL)"));
                    }
                    b'\n' => {}
                    b => self.line.push(b),
                },
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl<P: Read + Write> Transport for SlcanTransport<P> {
    fn max_transfer_size(&self) -> usize {
        if self.fd { FD_MAX } else { CLASSIC_MAX }
    }

    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        let line = encode_frame(self.can_id, raw, self.fd)?;
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }

    fn recv_raw(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let Some(line) = self.read_line()? else {
                return Ok(None);
            };
            // Transmit confirmations (`z`, `Z`) and empty OKs carry no data.
            if let Some(data) = decode_frame(&line)? {
                return Ok(Some(data));
            }
        }
    }

    fn disconnect(&mut self) -> Result<()> {
        log::debug!("Closing CAN channel");
        self.command("C")
    }
}

/// Encode one data frame, including the trailing CR.
///
/// FD payloads that don't match a DLC length are padded with zeros.
pub fn encode_frame(can_id: u32, data: &[u8], fd: bool) -> Result<String> {
    let extended = can_id > MAX_STANDARD_ID;
    let (dlc, padded_len) = if fd {
        let dlc = FD_LENGTHS
            .iter()
            .position(|&len| len >= data.len())
            .ok_or_else(|| {
                Error::data_length(format!("{} bytes do not fit one CAN FD frame", data.len()))
            })?;
        (dlc, FD_LENGTHS[dlc])
    } else {
        if data.len() > CLASSIC_MAX {
            return Err(Error::data_length(format!(
                "{} bytes do not fit one CAN frame",
                data.len()
            )));
        }
        (data.len(), data.len())
    };

    let mut line = match (fd, extended) {
        (false, false) => format!("t{:03X}", can_id),
        (false, true) => format!("T{:08X}", can_id),
        (true, false) => format!("b{:03X}", can_id),
        (true, true) => format!("B{:08X}", can_id),
    };
    line.push_str(&format!("{:X}", dlc));
    line.push_str(&hex::encode_upper(data));
    for _ in data.len()..padded_len {
        line.push_str("00");
    }
    line.push(CR as char);
    Ok(line)
}

/// Payload of a received data frame line (without CR).
///
/// Returns `None` for lines that are not data frames.
pub fn decode_frame(line: &[u8]) -> Result<Option<Vec<u8>>> {
    let Some((&kind, rest)) = line.split_first() else {
        return Ok(None);
    };
    let (id_len, fd) = match kind {
        b't' => (3, false),
        b'T' => (8, false),
        b'd' | b'b' => (3, true),
        b'D' | b'B' => (8, true),
        _ => return Ok(None),
    };
    let malformed = || Error::transport(format!("malformed frame {:?}", String::from_utf8_lossy(line)));

    if rest.len() < id_len + 1 {
        return Err(malformed());
    }
    let dlc = (rest[id_len] as char).to_digit(16).ok_or_else(malformed)? as usize;
    let len = if fd {
        FD_LENGTHS[dlc]
    } else if dlc <= CLASSIC_MAX {
        dlc
    } else {
        return Err(malformed());
    };
    let start = id_len + 1;
    // Anything after the data is a timestamp.
    let hex_data = rest.get(start..start + 2 * len).ok_or_else(malformed)?;
    let data = hex::decode(hex_data).map_err(|_| malformed())?;
    Ok(Some(data))
}
