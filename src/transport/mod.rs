//! Abstract bootloader transport interface.
use crate::error::{Error, Result};

pub use self::slcan::{CanBitrate, SlcanConfig, SlcanTransport};

mod slcan;

/// Abstraction of the transport layer.
/// A frame oriented byte channel: CAN, CAN FD, or anything else that
/// delivers whole frames.
pub trait Transport {
    /// Largest payload of one frame.
    fn max_transfer_size(&self) -> usize;

    fn send_raw(&mut self, raw: &[u8]) -> Result<()>;

    /// Payload of the next frame, `None` on timeout.
    fn recv_raw(&mut self) -> Result<Option<Vec<u8>>>;

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn send(&mut self, raw: &[u8]) -> Result<()> {
        log::debug!("=> {}", hex::encode(raw));
        self.send_raw(raw)
    }

    fn recv(&mut self) -> Result<Option<Vec<u8>>> {
        let frame = self.recv_raw()?;
        match &frame {
            Some(payload) => log::debug!("<= {}", hex::encode(payload)),
            None => log::debug!("<= (timeout)"),
        }
        Ok(frame)
    }

    /// Next frame with its payload read as a big-endian integer.
    fn recv_int(&mut self) -> Result<(Option<u64>, Vec<u8>)> {
        match self.recv()? {
            None => Ok((None, vec![])),
            Some(payload) if payload.len() > 8 => Err(Error::transport(format!(
                "expected an integer frame, got {} bytes",
                payload.len()
            ))),
            Some(payload) => {
                let value = payload
                    .iter()
                    .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
                Ok((Some(value), payload))
            }
        }
    }
}
