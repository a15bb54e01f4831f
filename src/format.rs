//! Firmware file formats
use std::borrow::Cow;
use std::path::Path;
use std::str;

use crate::constants::{FLASH_ERASED, MAX_IMAGE_SPAN};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    IntelHex,
    Binary,
}

/// A flat firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    /// Load address, when the file format carries one.
    pub address: Option<u32>,
    pub data: Vec<u8>,
}

pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Firmware> {
    let path = path.as_ref();
    let raw = std::fs::read(path)?;

    let format = guess_format(path, &raw);
    log::info!("Loading {} ({:?})", path.display(), format);
    match format {
        FirmwareFormat::IntelHex => {
            let text = str::from_utf8(&raw)
                .map_err(|e| Error::Firmware(format!("{} is not text: {}", path.display(), e)))?;
            read_ihex(text)
        }
        FirmwareFormat::Binary => Ok(Firmware {
            address: None,
            data: raw,
        }),
    }
}

/// By extension first, then by content: Intel HEX is all `:`-led hex text.
pub fn guess_format(path: &Path, raw: &[u8]) -> FirmwareFormat {
    const IHEX_EXTENSIONS: [&str; 6] = ["hex", "ihex", "ihx", "ihe", "h86", "a43"];

    let by_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IHEX_EXTENSIONS.iter().any(|e| ext.eq_ignore_ascii_case(e)));
    let looks_like_ihex = raw.starts_with(b":")
        && raw
            .iter()
            .all(|c| c.is_ascii_hexdigit() || b":\r\n".contains(c));

    if by_extension || looks_like_ihex {
        FirmwareFormat::IntelHex
    } else {
        FirmwareFormat::Binary
    }
}

pub fn read_ihex(data: &str) -> Result<Firmware> {
    use ihex::Record;

    // upper address bits from the last extended address record
    let mut segment_base = 0u32;
    let mut sections: Vec<(u32, Cow<[u8]>)> = vec![];
    for record in ihex::Reader::new(data) {
        match record? {
            Record::Data { offset, value } => {
                sections.push((segment_base + u32::from(offset), Cow::Owned(value)));
            }
            Record::ExtendedSegmentAddress(segment) => segment_base = u32::from(segment) << 4,
            Record::ExtendedLinearAddress(upper) => segment_base = u32::from(upper) << 16,
            Record::StartLinearAddress(entry) => log::debug!("Entry point: 0x{:08X}", entry),
            Record::StartSegmentAddress { .. } | Record::EndOfFile => {}
        }
    }
    if sections.is_empty() {
        return Err(Error::Firmware("Intel HEX file carries no data".into()));
    }
    let (address, data) = merge_sections(sections)?;
    Ok(Firmware {
        address: Some(address),
        data,
    })
}

/// One buffer from the lowest to the highest address, gaps filled as erased flash.
fn merge_sections(mut sections: Vec<(u32, Cow<[u8]>)>) -> Result<(u32, Vec<u8>)> {
    sections.sort_by_key(|(address, _)| *address);

    let start_address = sections.first().map(|s| s.0).unwrap_or(0);
    let end_address = sections
        .iter()
        .map(|(addr, sect)| u64::from(*addr) + sect.len() as u64)
        .max()
        .unwrap_or(u64::from(start_address));

    let span = end_address - u64::from(start_address);
    if span > MAX_IMAGE_SPAN {
        return Err(Error::Firmware(format!(
            "image spans 0x{:08X}..0x{:08X}, more than {} MiB",
            start_address,
            end_address,
            MAX_IMAGE_SPAN / (1024 * 1024)
        )));
    }
    let total_size = span as usize;
    let mut binary = vec![FLASH_ERASED; total_size];
    let mut written_up_to = start_address as usize;
    for (addr, sect) in sections {
        let sect_start = (addr - start_address) as usize;
        if (addr as usize) < written_up_to {
            return Err(Error::Firmware(format!(
                "overlapping data at 0x{:08X}",
                addr
            )));
        }
        binary[sect_start..sect_start + sect.len()].copy_from_slice(&sect);
        written_up_to = addr as usize + sect.len();
    }
    Ok((start_address, binary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const BLINKY: &str = "\
:020000040800F2
:0400000001020304F2
:04000800AABBCCDDE6
:00000001FF
";

    #[test]
    fn ihex_gaps_are_erased_flash() {
        let firmware = read_ihex(BLINKY).unwrap();
        assert_eq!(firmware.address, Some(0x0800_0000));
        assert_eq!(
            firmware.data,
            [1, 2, 3, 4, 0xff, 0xff, 0xff, 0xff, 0xaa, 0xbb, 0xcc, 0xdd]
        );
    }

    #[test]
    fn overlapping_records_are_rejected() {
        let overlapping = "\
:0400000001020304F2
:0400020005060708E0
:00000001FF
";
        assert!(matches!(
            read_ihex(overlapping),
            Err(Error::Firmware(_))
        ));
    }

    #[test]
    fn far_apart_records_are_rejected() {
        // flash plus option bytes in one file
        let far_apart = "\
:020000040800F2
:0400000001020304F2
:020000041FFFDC
:04F80000AABBCCDDF6
:00000001FF
";
        match read_ihex(far_apart) {
            Err(Error::Firmware(msg)) => {
                assert!(msg.contains("0x08000000"), "{}", msg);
                assert!(msg.contains("0x1FFFF804"), "{}", msg);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn format_by_extension_then_content() {
        assert_eq!(
            guess_format(Path::new("fw.HEX"), b""),
            FirmwareFormat::IntelHex
        );
        assert_eq!(
            guess_format(Path::new("fw.txt"), b":00000001FF\n"),
            FirmwareFormat::IntelHex
        );
        assert_eq!(
            guess_format(Path::new("fw.bin"), &[0x00, 0x20, 0x00, 0x20]),
            FirmwareFormat::Binary
        );
        assert_eq!(guess_format(Path::new("empty"), b""), FirmwareFormat::Binary);
    }

    #[test]
    fn files_are_loaded_by_format() {
        let mut bin = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        bin.write_all(&[0xde, 0xad, 0xbe, 0xef]).unwrap();
        let firmware = read_firmware_from_file(bin.path()).unwrap();
        assert_eq!(firmware.address, None);
        assert_eq!(firmware.data, [0xde, 0xad, 0xbe, 0xef]);

        let mut hex = tempfile::Builder::new().suffix(".hex").tempfile().unwrap();
        hex.write_all(BLINKY.as_bytes()).unwrap();
        let firmware = read_firmware_from_file(hex.path()).unwrap();
        assert_eq!(firmware.address, Some(0x0800_0000));
        assert_eq!(firmware.data.len(), 12);
    }
}
