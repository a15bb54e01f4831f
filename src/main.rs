use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use stm32boot::bootloader::BootloaderConfig;
use stm32boot::device::DeviceFamily;
use stm32boot::progress::{Progress, ProgressArc, ProgressId, no_op_progress};
use stm32boot::transport::{CanBitrate, SlcanConfig, SlcanTransport};
use stm32boot::{Error, Flashing};

const DEFAULT_ADDRESS: u32 = 0x0800_0000;

#[derive(clap::Parser)]
#[command(
    name = "stm32boot",
    about = "Flash firmware to STM32 microcontrollers through the CAN bootloader",
    after_help = "examples:\n  stm32boot --port /dev/ttyACM0 --family H5\n  stm32boot --erase --write --verify firmware.bin"
)]
struct Cli {
    /// File to read from or store to flash
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Erase the full flash memory or a region (with --address and --length)
    #[arg(short, long)]
    erase: bool,

    /// Write file content to flash
    #[arg(short, long)]
    write: bool,

    /// Verify flash content versus local file
    #[arg(short, long)]
    verify: bool,

    /// Read from flash and store in local file
    #[arg(short, long)]
    read: bool,

    /// Length of read or erase
    #[arg(short, long, value_parser = parse_int::<usize>)]
    length: Option<usize>,

    /// Target address for read or write [default: 0x08000000, or the HEX file's address]
    #[arg(short, long, value_parser = parse_int::<u32>)]
    address: Option<u32>,

    /// Start executing from address (0x08000000, usually)
    #[arg(short, long, value_name = "ADDRESS", value_parser = parse_int::<u32>)]
    go_address: Option<u32>,

    /// Device family, e.g. F1 for STM32F1xx
    #[arg(short, long, default_value = "H5")]
    family: DeviceFamily,

    /// Serial port of the SLCAN adapter
    #[arg(short, long)]
    port: Option<String>,

    /// CAN bitrate
    #[arg(long, value_enum, default_value_t = CanBitrate::Bitrate500k)]
    bitrate: CanBitrate,

    /// Use CAN FD frames with bitrate switch
    #[arg(long)]
    fd: bool,

    /// CAN identifier of transmitted frames
    #[arg(long, default_value = "0", value_parser = parse_int::<u32>)]
    can_id: u32,

    /// Remove readout protection first. Erases the whole flash
    #[arg(long)]
    unprotect: bool,

    /// Verbose mode
    #[arg(short = 'V', long, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode
    #[arg(short, long)]
    quiet: bool,

    /// Don't show progress bars
    #[arg(short, long)]
    no_progress: bool,

    /// Print version
    #[arg(long)]
    version: bool,
}

/// Integer with automatic base detection: `0x10`, `0o20`, `0b10000` or `16`.
fn parse_int<T: TryFrom<u64>>(s: &str) -> std::result::Result<T, String> {
    let s = s.trim().replace('_', "");
    let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(oct) = s.strip_prefix("0o") {
        u64::from_str_radix(oct, 8)
    } else if let Some(bin) = s.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        s.parse()
    }
    .map_err(|e| format!("invalid number {:?}: {}", s, e))?;
    T::try_from(value).map_err(|_| format!("{:#x} out of range", value))
}

/// Region for `--erase`, the whole flash without `--length`.
fn erase_range(address: u32, length: Option<usize>) -> Result<Option<(u32, u32)>> {
    length
        .map(|len| {
            u32::try_from(len)
                .map(|len| (address, len))
                .with_context(|| format!("--length {:#x} does not fit in 32 bits", len))
        })
        .transpose()
}

/// Progress bars on the terminal.
#[derive(Default)]
struct BarProgress {
    bars: Mutex<HashMap<u64, ProgressBar>>,
    next_id: AtomicU64,
}

impl Progress for BarProgress {
    fn start(&self, label: &str, total: u64) -> ProgressId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar.set_message(label.to_string());
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(id, bar);
        }
        ProgressId(id)
    }

    fn increment(&self, id: ProgressId, delta: u64) {
        if let Some(bar) = self.bars.lock().ok().and_then(|bars| bars.get(&id.0).cloned()) {
            bar.inc(delta);
        }
    }

    fn finish(&self, id: ProgressId) {
        if let Some(bar) = self.bars.lock().ok().and_then(|mut bars| bars.remove(&id.0)) {
            bar.finish();
        }
    }
}

fn progress_for(cli: &Cli) -> ProgressArc {
    if cli.no_progress || cli.quiet {
        return no_op_progress();
    }
    if !std::io::stderr().is_terminal() {
        let missing = Error::MissingDependency("no terminal to draw progress bars on".into());
        log::warn!("{}", missing);
        return no_op_progress();
    }
    Arc::new(BarProgress::default())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("stm32boot {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else if cli.quiet {
        simplelog::LevelFilter::Warn
    } else {
        simplelog::LevelFilter::Info
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    if (cli.read || cli.write || cli.verify) && cli.file.is_none() {
        anyhow::bail!("FILE is required to read, write or verify");
    }
    if cli.read && cli.length.is_none() {
        anyhow::bail!("--length is required to read");
    }

    let firmware = match (&cli.file, cli.write || cli.verify) {
        (Some(path), true) => {
            let firmware = stm32boot::format::read_firmware_from_file(path)
                .with_context(|| format!("reading {}", path.display()))?;
            log::info!("Firmware size: {}", firmware.data.len());
            Some(firmware)
        }
        _ => None,
    };
    let address = cli
        .address
        .or(firmware.as_ref().and_then(|f| f.address))
        .unwrap_or(DEFAULT_ADDRESS);

    let port = match &cli.port {
        Some(port) => port.clone(),
        None => SlcanTransport::scan_ports()?
            .into_iter()
            .next()
            .context("No serial ports found! Use --port to select the SLCAN adapter")?,
    };
    let slcan = SlcanConfig {
        bitrate: cli.bitrate,
        can_id: cli.can_id,
        fd: cli.fd,
        ..SlcanConfig::default()
    };
    let config = BootloaderConfig {
        family: cli.family,
        ..BootloaderConfig::default()
    };
    let mut flashing = Flashing::new_from_slcan(&port, &slcan, config, progress_for(&cli))
        .with_context(|| {
            format!(
                "opening {}. Is the device connected and powered correctly?",
                port
            )
        })?;

    let result = run(&cli, &mut flashing, address, firmware.as_ref().map(|f| &f.data[..]));
    if let Err(e) = flashing.disconnect() {
        log::warn!("Disconnect failed: {}", e);
    }
    result
}

fn run(
    cli: &Cli,
    flashing: &mut Flashing<SlcanTransport>,
    address: u32,
    firmware: Option<&[u8]>,
) -> Result<()> {
    flashing.identify()?;
    flashing.dump_info()?;

    if cli.unprotect {
        flashing.unprotect()?;
    }
    if cli.erase {
        flashing.erase(erase_range(address, cli.length)?)?;
    }
    if let (true, Some(data)) = (cli.write, firmware) {
        flashing.write(address, data)?;
    }
    if let (true, Some(data)) = (cli.verify, firmware) {
        flashing.verify(address, data).context("Verification FAILED")?;
    }
    if cli.read && !cli.write {
        if let (Some(path), Some(length)) = (&cli.file, cli.length) {
            let data = flashing.read(address, length)?;
            std::fs::write(path, &data).with_context(|| format!("writing {}", path.display()))?;
            log::info!("Saved {} bytes to {}", data.len(), path.display());
        }
    }
    if let Some(go_address) = cli.go_address {
        flashing.go(go_address)?;
    }
    Ok(())
}
