//! MCU family and device definitions, with family-specific quirk flags.
//!
//! Family profiles are plain constants. Concrete devices live in `devices/*.yaml`,
//! one file per family, embedded at compile time and indexed by
//! `(product_id, bootloader_id)`.
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use bitflags::bitflags;
use serde::Deserialize;

use crate::constants::{DEFAULT_FLASH_PAGE_SIZE, DEFAULT_TRANSFER_SIZE};
use crate::error::{Error, Result};

const KB: u32 = 1024;

/// MCU family, see AN2606.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
pub enum DeviceFamily {
    C0,
    F0,
    F1,
    F2,
    F3,
    F4,
    F7,
    G0,
    G4,
    H5,
    H7,
    L0,
    L1,
    L4,
    L5,
    WBA,
    WB,
    WL,
    U5,
    W,
    /// ST BlueNRG, see AN4872 and AN5471.
    NRG,
    /// Wiznet W7500.
    WIZ,
}

impl DeviceFamily {
    pub const ALL: [DeviceFamily; 22] = [
        DeviceFamily::C0,
        DeviceFamily::F0,
        DeviceFamily::F1,
        DeviceFamily::F2,
        DeviceFamily::F3,
        DeviceFamily::F4,
        DeviceFamily::F7,
        DeviceFamily::G0,
        DeviceFamily::G4,
        DeviceFamily::H5,
        DeviceFamily::H7,
        DeviceFamily::L0,
        DeviceFamily::L1,
        DeviceFamily::L4,
        DeviceFamily::L5,
        DeviceFamily::WBA,
        DeviceFamily::WB,
        DeviceFamily::WL,
        DeviceFamily::U5,
        DeviceFamily::W,
        DeviceFamily::NRG,
        DeviceFamily::WIZ,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            DeviceFamily::C0 => "C0",
            DeviceFamily::F0 => "F0",
            DeviceFamily::F1 => "F1",
            DeviceFamily::F2 => "F2",
            DeviceFamily::F3 => "F3",
            DeviceFamily::F4 => "F4",
            DeviceFamily::F7 => "F7",
            DeviceFamily::G0 => "G0",
            DeviceFamily::G4 => "G4",
            DeviceFamily::H5 => "H5",
            DeviceFamily::H7 => "H7",
            DeviceFamily::L0 => "L0",
            DeviceFamily::L1 => "L1",
            DeviceFamily::L4 => "L4",
            DeviceFamily::L5 => "L5",
            DeviceFamily::WBA => "WBA",
            DeviceFamily::WB => "WB",
            DeviceFamily::WL => "WL",
            DeviceFamily::U5 => "U5",
            DeviceFamily::W => "W",
            DeviceFamily::NRG => "NRG",
            DeviceFamily::WIZ => "WIZ",
        }
    }

    /// Register addresses, transfer limits and quirks of this family.
    ///
    /// References: RM0360 (F0), RM0008 (F1), RM0366/RM0365/RM0316/RM0313 (F3),
    /// RM0090 (F4), RM0385 (F7), RM0444 (G0), RM0433 (H7), RM0451 (L0),
    /// RM0394 (L4), RM0453 (WL).
    pub const fn profile(self) -> FamilyProfile {
        let base = FamilyProfile::new(self);
        match self {
            DeviceFamily::C0 => FamilyProfile {
                bootloader_id_address: Some(0x1FFF_17FE),
                ..base
            },
            DeviceFamily::F0 => FamilyProfile {
                flash_size_address: Some(0x1FFF_F7CC),
                option_bytes: Some(MemRange::new(0x1FFF_F800, 0x1FFF_F80F)),
                ..base
            },
            DeviceFamily::F1 => FamilyProfile {
                uid_address: Some(0x1FFF_F7E8),
                flash_size_address: Some(0x1FFF_F7E0),
                option_bytes: Some(MemRange::new(0x1FFF_F800, 0x1FFF_F80F)),
                ..base
            },
            DeviceFamily::F2 => FamilyProfile {
                option_bytes: Some(MemRange::new(0x1FFF_C000, 0x1FFF_C00F)),
                bootloader_id_address: Some(0x1FFF_77DE),
                ..base
            },
            DeviceFamily::F3 => FamilyProfile {
                uid_address: Some(0x1FFF_F7AC),
                flash_size_address: Some(0x1FFF_F7CC),
                flash_page_size: 2 * KB,
                bootloader_id_address: Some(0x1FFF_F796),
                ..base
            },
            // F4 can't read the 12 UID bytes or the 2 flash size bytes on their own,
            // only as part of a whole 256 byte block.
            DeviceFamily::F4 => FamilyProfile {
                uid_address: Some(0x1FFF_7A10),
                flash_size_address: Some(0x1FFF_7A22),
                bootloader_id_address: Some(0x1FFF_76DE),
                flags: DeviceFlags::LONG_UID_ACCESS,
                ..base
            },
            DeviceFamily::F7 => FamilyProfile {
                uid_address: Some(0x1FF0_F420),
                flash_size_address: Some(0x1FF0_F442),
                bootloader_id_address: Some(0x1FF0_EDBE),
                ..base
            },
            DeviceFamily::G0 | DeviceFamily::WL => FamilyProfile {
                uid_address: Some(0x1FFF_7590),
                flash_size_address: Some(0x1FFF_75E0),
                ..base
            },
            DeviceFamily::G4 => FamilyProfile {
                bootloader_id_address: Some(0x1FFF_6FFE),
                ..base
            },
            DeviceFamily::H5 => FamilyProfile {
                flash_page_size: 128 * KB,
                ..base
            },
            DeviceFamily::H7 => FamilyProfile {
                uid_address: Some(0x1FF1_E800),
                flash_size_address: Some(0x1FF1_E880),
                flash_page_size: 128 * KB,
                ..base
            },
            DeviceFamily::L0 => FamilyProfile {
                uid_address: Some(0x1FF8_0050),
                flash_size_address: Some(0x1FF8_007C),
                flash_page_size: 128,
                transfer_size: 128,
                mass_erase: false,
                flags: DeviceFlags::LONG_UID_ACCESS,
                ..base
            },
            DeviceFamily::L1 => FamilyProfile {
                mass_erase: false,
                ..base
            },
            DeviceFamily::L4 => FamilyProfile {
                uid_address: Some(0x1FFF_7590),
                flash_size_address: Some(0x1FFF_75E0),
                bootloader_id_address: Some(0x1FFF_6FFE),
                ..base
            },
            // No access to peripherals or system memory from the BlueNRG bootloader,
            // so neither UID nor flash size can be read.
            DeviceFamily::NRG => FamilyProfile {
                flash_page_size: 2 * KB,
                flags: DeviceFlags::FORCE_PARITY_NONE,
                ..base
            },
            DeviceFamily::L5
            | DeviceFamily::WBA
            | DeviceFamily::WB
            | DeviceFamily::U5
            | DeviceFamily::W
            | DeviceFamily::WIZ => base,
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceFamily::ALL
            .iter()
            .find(|family| family.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| {
                Error::DeviceDetection(format!(
                    "unknown device family {:?}, expected one of: {}",
                    s,
                    DeviceFamily::ALL.map(|f| f.name()).join(", ")
                ))
            })
    }
}

bitflags! {
    /// Per-family and per-device behaviour quirks.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u8 {
        /// Option byte loading restarts the device.
        const OBL_LAUNCH = 1;
        /// PEMPTY must be cleared after programming.
        const CLEAR_PEMPTY = 2;
        /// UID and flash size can only be read as part of a full transfer-size block.
        const LONG_UID_ACCESS = 8;
        /// Serial transports must not use parity.
        const FORCE_PARITY_NONE = 16;
    }
}

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemRange {
    pub start: u32,
    pub end: u32,
}

impl MemRange {
    pub const fn new(start: u32, end: u32) -> Self {
        MemRange { start, end }
    }

    pub const fn size(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }
}

impl fmt::Display for MemRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}..0x{:08X}", self.start, self.end)
    }
}

/// Constants of one device family.
///
/// `None` means the value is unknown or unsupported for this family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyProfile {
    pub family: DeviceFamily,
    pub uid_address: Option<u32>,
    pub flash_size_address: Option<u32>,
    pub flash_page_size: u32,
    pub transfer_size: usize,
    pub mass_erase: bool,
    pub option_bytes: Option<MemRange>,
    pub bootloader_id_address: Option<u32>,
    pub flags: DeviceFlags,
}

impl FamilyProfile {
    const fn new(family: DeviceFamily) -> Self {
        FamilyProfile {
            family,
            uid_address: None,
            flash_size_address: None,
            flash_page_size: DEFAULT_FLASH_PAGE_SIZE,
            transfer_size: DEFAULT_TRANSFER_SIZE,
            mass_erase: true,
            option_bytes: None,
            bootloader_id_address: None,
            flags: DeviceFlags::empty(),
        }
    }
}

/// Profile of the given family.
pub const fn family_profile(family: DeviceFamily) -> FamilyProfile {
    family.profile()
}

/// Erase geometry of the main flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlashLayout {
    /// Pages of one size, optionally grouped into write-protection sectors.
    Uniform {
        page_size: u32,
        pages_per_sector: Option<u32>,
    },
    /// Sizes of the leading sectors. The last size repeats up to the end of flash.
    Sectors(Vec<u32>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub range: MemRange,
    pub layout: FlashLayout,
}

impl Flash {
    pub fn size(&self) -> u32 {
        self.range.size()
    }

    pub fn page_size(&self) -> Option<u32> {
        match self.layout {
            FlashLayout::Uniform { page_size, .. } => Some(page_size),
            FlashLayout::Sectors(_) => None,
        }
    }
}

/// A concrete chip model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub family: DeviceFamily,
    pub name: String,
    pub variant: Option<String>,
    pub line: Option<String>,
    pub product_id: u32,
    /// `None` matches any bootloader ID.
    pub bootloader_id: Option<u8>,
    pub ram: Vec<MemRange>,
    pub flash: Option<Flash>,
    pub system_memory: Vec<MemRange>,
    pub option_bytes: Option<MemRange>,
    bootloader_id_address: Option<u32>,
    flags: DeviceFlags,
}

impl Device {
    pub fn profile(&self) -> FamilyProfile {
        self.family.profile()
    }

    pub fn flash_size(&self) -> u32 {
        self.flash.as_ref().map(Flash::size).unwrap_or(0)
    }

    pub fn ram_size(&self) -> u32 {
        self.ram.iter().map(MemRange::size).sum()
    }

    pub fn system_memory_size(&self) -> u32 {
        self.system_memory.iter().map(MemRange::size).sum()
    }

    /// Device register, falling back to the family default.
    pub fn bootloader_id_address(&self) -> Option<u32> {
        self.bootloader_id_address
            .or(self.profile().bootloader_id_address)
    }

    /// Device quirks merged with the family defaults.
    pub fn flags(&self) -> DeviceFlags {
        self.flags | self.profile().flags
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(variant) = &self.variant {
            write!(f, "-{}", variant)?;
        }
        if let Some(line) = &self.line {
            write!(f, "-{}", line)?;
        }
        Ok(())
    }
}

/// One `devices/*.yaml` file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FamilyFile {
    family: DeviceFamily,
    #[allow(dead_code)]
    description: String,
    variants: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceEntry {
    name: String,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    line: Option<String>,
    #[serde(deserialize_with = "parse_number")]
    pid: u32,
    #[serde(default, deserialize_with = "parse_opt_number")]
    bid: Option<u32>,
    #[serde(default, deserialize_with = "parse_ranges")]
    ram: Vec<MemRange>,
    #[serde(default)]
    flash: Option<FlashEntry>,
    #[serde(default, deserialize_with = "parse_ranges")]
    system: Vec<MemRange>,
    #[serde(default, deserialize_with = "parse_opt_range")]
    option: Option<MemRange>,
    #[serde(default, deserialize_with = "parse_opt_number")]
    bootloader_id_address: Option<u32>,
    #[serde(default)]
    flags: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FlashEntry {
    #[serde(deserialize_with = "parse_number")]
    start: u32,
    #[serde(deserialize_with = "parse_number")]
    end: u32,
    #[serde(default, deserialize_with = "parse_opt_number")]
    page_size: Option<u32>,
    #[serde(default)]
    pages_per_sector: Option<u32>,
    #[serde(default, deserialize_with = "parse_number_list")]
    sectors: Vec<u32>,
}

impl DeviceEntry {
    fn into_device(self, family: DeviceFamily) -> Result<Device> {
        let bootloader_id = self
            .bid
            .map(|bid| {
                u8::try_from(bid).map_err(|_| {
                    Error::DeviceDetection(format!(
                        "{}: bootloader ID 0x{:X} does not fit in one byte",
                        self.name, bid
                    ))
                })
            })
            .transpose()?;

        let flags = self
            .flags
            .iter()
            .try_fold(DeviceFlags::empty(), |acc, name| {
                DeviceFlags::from_name(name)
                    .map(|flag| acc | flag)
                    .ok_or_else(|| {
                        Error::DeviceDetection(format!("{}: unknown flag {}", self.name, name))
                    })
            })?;

        let flash = match self.flash {
            None => None,
            Some(entry) => {
                let layout = match (entry.page_size, entry.sectors.is_empty()) {
                    (Some(page_size), true) => FlashLayout::Uniform {
                        page_size,
                        pages_per_sector: entry.pages_per_sector,
                    },
                    (None, false) => FlashLayout::Sectors(entry.sectors),
                    _ => {
                        return Err(Error::DeviceDetection(format!(
                            "{}: flash needs exactly one of page_size or sectors",
                            self.name
                        )));
                    }
                };
                Some(Flash {
                    range: MemRange::new(entry.start, entry.end),
                    layout,
                })
            }
        };

        Ok(Device {
            family,
            name: self.name,
            variant: self.variant,
            line: self.line,
            product_id: self.pid,
            bootloader_id,
            ram: self.ram,
            flash,
            system_memory: self.system,
            option_bytes: self.option,
            bootloader_id_address: self.bootloader_id_address,
            flags,
        })
    }
}

/// Device catalog, indexed by `(product_id, bootloader_id)`.
pub struct ChipDB {
    devices: Vec<Device>,
    index: HashMap<(u32, Option<u8>), usize>,
}

const EMBEDDED_CATALOG: [&str; 22] = [
    include_str!("../devices/C0.yaml"),
    include_str!("../devices/F0.yaml"),
    include_str!("../devices/F1.yaml"),
    include_str!("../devices/F2.yaml"),
    include_str!("../devices/F3.yaml"),
    include_str!("../devices/F4.yaml"),
    include_str!("../devices/F7.yaml"),
    include_str!("../devices/G0.yaml"),
    include_str!("../devices/G4.yaml"),
    include_str!("../devices/H5.yaml"),
    include_str!("../devices/H7.yaml"),
    include_str!("../devices/L0.yaml"),
    include_str!("../devices/L1.yaml"),
    include_str!("../devices/L4.yaml"),
    include_str!("../devices/L5.yaml"),
    include_str!("../devices/WBA.yaml"),
    include_str!("../devices/WB.yaml"),
    include_str!("../devices/WL.yaml"),
    include_str!("../devices/U5.yaml"),
    include_str!("../devices/W.yaml"),
    include_str!("../devices/NRG.yaml"),
    include_str!("../devices/WIZ.yaml"),
];

impl ChipDB {
    /// Parse the catalog embedded in the binary.
    pub fn load() -> Result<Self> {
        Self::from_yaml(&EMBEDDED_CATALOG)
    }

    /// Parse a catalog from family YAML documents.
    pub fn from_yaml(sources: &[&str]) -> Result<Self> {
        let mut devices = vec![];
        for source in sources {
            let file: FamilyFile = serde_yaml::from_str(source)?;
            for entry in file.variants {
                devices.push(entry.into_device(file.family)?);
            }
        }
        Ok(Self::from_devices(devices))
    }

    fn from_devices(devices: Vec<Device>) -> Self {
        let mut index = HashMap::new();
        for (i, device) in devices.iter().enumerate() {
            index
                .entry((device.product_id, device.bootloader_id))
                .or_insert(i);
        }
        // Before the bootloader ID is known, a product ID alone resolves to
        // the first device carrying it.
        for (i, device) in devices.iter().enumerate() {
            index.entry((device.product_id, None)).or_insert(i);
        }
        log::debug!("Loaded {} devices into the chip catalog", devices.len());
        ChipDB { devices, index }
    }

    /// The embedded catalog, parsed on first use.
    pub fn global() -> &'static ChipDB {
        static DB: OnceLock<ChipDB> = OnceLock::new();
        DB.get_or_init(|| ChipDB::load().expect("embedded device catalog must be valid"))
    }

    /// Exact lookup by `(product_id, bootloader_id)`.
    pub fn get(&self, product_id: u32, bootloader_id: Option<u8>) -> Option<&Device> {
        self.index
            .get(&(product_id, bootloader_id))
            .map(|&i| &self.devices[i])
    }

    /// Lookup falling back to the product-ID-only entry.
    pub fn find_device(&self, product_id: u32, bootloader_id: Option<u8>) -> Option<&Device> {
        self.get(product_id, bootloader_id)
            .or_else(|| self.get(product_id, None))
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }
}

/// Lookup in the embedded catalog.
pub fn lookup_variant(product_id: u32, bootloader_id: Option<u8>) -> Option<&'static Device> {
    ChipDB::global().find_device(product_id, bootloader_id)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Text(String),
}

impl Number {
    fn value(self) -> std::result::Result<u32, String> {
        let value = match self {
            Number::Int(n) => n,
            Number::Text(s) => parse_number_text(&s)?,
        };
        u32::try_from(value).map_err(|_| format!("{:#x} does not fit in 32 bits", value))
    }
}

/// Accepts `0x1FFF_F7E8`, `2K`, `16KiB`, `16KB` and plain decimals.
fn parse_number_text(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim().replace('_', "");
    let err = |_| format!("error while parsing {:?}", s);
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(err)
    } else if let Some(kib) = s
        .strip_suffix("KiB")
        .or_else(|| s.strip_suffix("KB"))
        .or_else(|| s.strip_suffix('K'))
    {
        kib.parse::<u64>().map(|k| k * 1024).map_err(err)
    } else {
        s.parse().map_err(err)
    }
}

fn parse_number<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n: Number = Deserialize::deserialize(deserializer)?;
    n.value().map_err(serde::de::Error::custom)
}

fn parse_opt_number<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let n: Option<Number> = Deserialize::deserialize(deserializer)?;
    n.map(Number::value)
        .transpose()
        .map_err(serde::de::Error::custom)
}

fn parse_number_list<'de, D>(deserializer: D) -> std::result::Result<Vec<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let ns: Vec<Number> = Deserialize::deserialize(deserializer)?;
    ns.into_iter()
        .map(Number::value)
        .collect::<std::result::Result<_, _>>()
        .map_err(serde::de::Error::custom)
}

fn to_range(pair: [Number; 2]) -> std::result::Result<MemRange, String> {
    let [start, end] = pair;
    let (start, end) = (start.value()?, end.value()?);
    if end < start {
        return Err(format!("range end 0x{:X} before start 0x{:X}", end, start));
    }
    Ok(MemRange::new(start, end))
}

/// A list of `[start, end]` pairs.
fn parse_ranges<'de, D>(deserializer: D) -> std::result::Result<Vec<MemRange>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let pairs: Vec<[Number; 2]> = Deserialize::deserialize(deserializer)?;
    pairs
        .into_iter()
        .map(to_range)
        .collect::<std::result::Result<_, _>>()
        .map_err(serde::de::Error::custom)
}

fn parse_opt_range<'de, D>(deserializer: D) -> std::result::Result<Option<MemRange>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let pair: Option<[Number; 2]> = Deserialize::deserialize(deserializer)?;
    pair.map(to_range)
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_catalog_loads() {
        let db = ChipDB::load().unwrap();
        assert!(db.devices().len() > 60);
        for family in DeviceFamily::ALL {
            assert!(
                db.devices().iter().any(|d| d.family == family),
                "no device for family {}",
                family
            );
        }
    }

    #[test]
    fn every_family_has_a_consistent_profile() {
        for family in DeviceFamily::ALL {
            let profile = family_profile(family);
            assert_eq!(profile.family, family);
            assert!(profile.flash_page_size > 0);
            assert!(profile.transfer_size > 0 && profile.transfer_size <= 256);
            assert_eq!(family.name().parse::<DeviceFamily>().unwrap(), family);
        }
        assert_eq!(DeviceFamily::L0.profile().transfer_size, 128);
        assert_eq!(DeviceFamily::L0.profile().flash_page_size, 128);
        assert!(!DeviceFamily::L0.profile().mass_erase);
        assert_eq!(DeviceFamily::F3.profile().flash_page_size, 2048);
        assert_eq!(DeviceFamily::H7.profile().flash_page_size, 128 * 1024);
        assert_eq!(DeviceFamily::F0.profile().uid_address, None);
        assert_eq!(DeviceFamily::NRG.profile().flash_size_address, None);
        assert!(
            DeviceFamily::F4
                .profile()
                .flags
                .contains(DeviceFlags::LONG_UID_ACCESS)
        );
    }

    #[test]
    fn family_parsing_is_case_insensitive() {
        assert_eq!("h5".parse::<DeviceFamily>().unwrap(), DeviceFamily::H5);
        assert_eq!(" wba ".parse::<DeviceFamily>().unwrap(), DeviceFamily::WBA);
        assert!("Z9".parse::<DeviceFamily>().is_err());
    }

    #[test]
    fn product_id_alone_resolves_to_first_variant() {
        let db = ChipDB::global();
        let first = db.get(0x413, None).unwrap();
        assert_eq!(first.bootloader_id, Some(0x31));

        let refined = db.find_device(0x413, Some(0x91)).unwrap();
        assert_eq!(refined.bootloader_id, Some(0x91));
        assert_eq!(refined.ram[0].start, 0x2000_3000);

        // unknown bootloader ID keeps the product-ID-only match
        let fallback = lookup_variant(0x413, Some(0x55)).unwrap();
        assert_eq!(fallback.bootloader_id, Some(0x31));

        assert!(db.get(0x413, Some(0x55)).is_none());
        assert!(db.find_device(0xABC, None).is_none());
    }

    #[test]
    fn every_device_is_reachable_by_product_id() {
        let db = ChipDB::global();
        for device in db.devices() {
            let by_pid = db.get(device.product_id, None).unwrap();
            assert_eq!(by_pid.product_id, device.product_id);
            if device.bootloader_id.is_some() {
                assert_eq!(
                    db.get(device.product_id, device.bootloader_id)
                        .unwrap()
                        .bootloader_id,
                    device.bootloader_id
                );
            }
        }
    }

    #[test]
    fn sizes_are_derived_from_ranges() {
        let db = ChipDB::global();
        let h743 = db.get(0x450, Some(0x91)).unwrap();
        assert_eq!(h743.flash_size(), 2 * 1024 * 1024);
        assert_eq!(
            h743.ram_size(),
            (0x2002_0000 - 0x2000_4100) + (0x2408_0000 - 0x2400_5000)
        );
        assert_eq!(h743.bootloader_id_address(), Some(0x1FF1_E7FE));

        let g0b0 = db.get(0x467, Some(0xD0)).unwrap();
        assert_eq!(g0b0.system_memory_size(), 0x7000 + 0x7000);

        let f103 = db.get(0x410, None).unwrap();
        assert_eq!(f103.flash_size(), 128 * 1024);
        assert_eq!(f103.flash.as_ref().unwrap().page_size(), Some(1024));
        assert_eq!(f103.bootloader_id_address(), None);
        assert_eq!(f103.to_string(), "STM32F10xxx-Medium-density");

        let w7500 = db.get(0x801, None).unwrap();
        assert_eq!(w7500.flash_size(), 0);
        assert_eq!(w7500.ram_size(), 0);
    }

    #[test]
    fn device_flags_merge_with_family() {
        let db = ChipDB::global();
        let f09 = db.get(0x442, Some(0x50)).unwrap();
        assert!(f09.flags().contains(DeviceFlags::OBL_LAUNCH));

        let f401 = db.get(0x433, None).unwrap();
        assert!(f401.flags().contains(DeviceFlags::LONG_UID_ACCESS));
        assert!(matches!(
            f401.flash.as_ref().unwrap().layout,
            FlashLayout::Sectors(_)
        ));
    }

    #[test]
    fn numbers_in_several_notations() {
        assert_eq!(parse_number_text("0x1FFF_F7E8").unwrap(), 0x1FFF_F7E8);
        assert_eq!(parse_number_text("2K").unwrap(), 2048);
        assert_eq!(parse_number_text("16KiB").unwrap(), 16 * 1024);
        assert_eq!(parse_number_text("128").unwrap(), 128);
        assert!(parse_number_text("12Q").is_err());
    }

    #[test]
    fn bad_catalog_entries_are_rejected() {
        let yaml = r#"
family: F1
description: broken
variants:
  - name: Broken
    pid: "0x999"
    flash: { start: "0x08000000", end: "0x08001000" }
"#;
        assert!(ChipDB::from_yaml(&[yaml]).is_err());

        let yaml = r#"
family: F1
description: broken
variants:
  - name: Broken
    pid: "0x999"
    flags: [NOT_A_FLAG]
"#;
        assert!(ChipDB::from_yaml(&[yaml]).is_err());
    }
}
