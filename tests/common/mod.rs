#![allow(dead_code)]
//! A simulated CAN bootloader speaking the device side of the protocol.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use stm32boot::constants::{ACK, NACK, commands};
use stm32boot::progress::{Progress, ProgressId};
use stm32boot::{Bootloader, BootloaderConfig, DeviceFamily, Result, Transport};

pub const DEFAULT_COMMANDS: [u8; 11] = [
    commands::GET,
    commands::GET_VERSION,
    commands::GET_ID,
    commands::READ_MEMORY,
    commands::GO,
    commands::WRITE_MEMORY,
    commands::ERASE,
    commands::WRITE_PROTECT,
    commands::WRITE_UNPROTECT,
    commands::READOUT_PROTECT,
    commands::READOUT_UNPROTECT,
];

/// What the device waits for after acknowledging a command.
enum Pending {
    Idle,
    WriteData {
        address: u32,
        expected: usize,
        buf: Vec<u8>,
    },
    PageList {
        opcode: u8,
        buf: Vec<u8>,
    },
}

pub struct FakeDevice {
    pub frame_size: usize,
    pub product_id: Vec<u8>,
    pub version: u8,
    pub option_bytes: [u8; 2],
    pub commands: Vec<u8>,
    /// Canned replies used instead of the simulated ones, per opcode.
    pub overrides: HashMap<u8, Vec<Option<Vec<u8>>>>,
    pub memory: BTreeMap<u32, u8>,

    /// Every frame the host sent.
    pub sent: Vec<Vec<u8>>,
    pub recv_calls: usize,
    /// Validated page list payloads, count byte and checksum stripped.
    pub erased_pages: Vec<Vec<u32>>,
    pub global_erases: usize,
    pub extended_erases: Vec<u16>,
    pub rejected_payloads: usize,
    /// `(address, padded data)` of every completed write.
    pub writes: Vec<(u32, Vec<u8>)>,
    pub protected_pages: Vec<Vec<u32>>,
    pub jumps: Vec<u32>,

    replies: VecDeque<Option<Vec<u8>>>,
    pending: Pending,
}

impl FakeDevice {
    pub fn new(product_id: u32) -> Self {
        let product_id = if product_id > 0xffff {
            product_id.to_be_bytes().to_vec()
        } else {
            (product_id as u16).to_be_bytes().to_vec()
        };
        FakeDevice {
            frame_size: 8,
            product_id,
            version: 0x31,
            option_bytes: [0x00, 0x00],
            commands: DEFAULT_COMMANDS.to_vec(),
            overrides: HashMap::new(),
            memory: BTreeMap::new(),
            sent: vec![],
            recv_calls: 0,
            erased_pages: vec![],
            global_erases: 0,
            extended_erases: vec![],
            rejected_payloads: 0,
            writes: vec![],
            protected_pages: vec![],
            jumps: vec![],
            replies: VecDeque::new(),
            pending: Pending::Idle,
        }
    }

    pub fn fd(mut self) -> Self {
        self.frame_size = 64;
        self
    }

    /// Advertise EXTENDED_ERASE in place of ERASE.
    pub fn with_extended_erase(mut self) -> Self {
        for opcode in self.commands.iter_mut() {
            if *opcode == commands::ERASE {
                *opcode = commands::EXTENDED_ERASE;
            }
        }
        self
    }

    pub fn with_override(mut self, opcode: u8, replies: Vec<Option<Vec<u8>>>) -> Self {
        self.overrides.insert(opcode, replies);
        self
    }

    /// Queue a reply frame outside of any command, `None` for a timeout.
    pub fn queue(&mut self, reply: Option<&[u8]>) {
        self.replies.push_back(reply.map(<[u8]>::to_vec));
    }

    pub fn load(&mut self, address: u32, data: &[u8]) {
        for (offset, &byte) in data.iter().enumerate() {
            self.memory.insert(address + offset as u32, byte);
        }
    }

    pub fn peek(&self, address: u32, len: usize) -> Vec<u8> {
        (0..len as u32)
            .map(|offset| *self.memory.get(&(address + offset)).unwrap_or(&0xff))
            .collect()
    }

    /// First byte of every frame sent, in order.
    pub fn opcodes(&self) -> Vec<u8> {
        self.sent.iter().map(|frame| frame[0]).collect()
    }

    fn reply(&mut self, frame: impl Into<Vec<u8>>) {
        self.replies.push_back(Some(frame.into()));
    }

    fn ack(&mut self) {
        self.reply([ACK]);
    }

    fn nack(&mut self) {
        self.reply([NACK]);
    }

    fn handle_command(&mut self, frame: &[u8]) {
        let opcode = frame[0];
        if let Some(replies) = self.overrides.get(&opcode).cloned() {
            self.replies.extend(replies);
            return;
        }
        if !self.commands.contains(&opcode) {
            self.nack();
            return;
        }
        let address = |frame: &[u8]| u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);

        match opcode {
            commands::GET => {
                self.ack();
                self.reply([self.commands.len() as u8]);
                self.reply([self.version]);
                for opcode in self.commands.clone() {
                    self.reply([opcode]);
                }
                self.ack();
            }
            commands::GET_VERSION => {
                self.ack();
                self.reply([self.version, self.option_bytes[0], self.option_bytes[1]]);
                self.ack();
            }
            commands::GET_ID => {
                self.ack();
                self.reply(self.product_id.clone());
                self.ack();
            }
            commands::READ_MEMORY => {
                let (start, len) = (address(frame), frame[5] as usize + 1);
                self.ack();
                let data = self.peek(start, len);
                for chunk in data.chunks(self.frame_size) {
                    self.reply(chunk);
                }
                self.ack();
            }
            commands::GO => {
                self.jumps.push(address(frame));
                self.ack();
                self.ack();
            }
            commands::WRITE_MEMORY => {
                let len = frame[5] as usize + 1;
                self.ack();
                self.pending = Pending::WriteData {
                    address: address(frame),
                    expected: len.next_multiple_of(4),
                    buf: vec![],
                };
            }
            commands::ERASE | commands::WRITE_PROTECT => {
                self.ack();
                self.pending = Pending::PageList {
                    opcode,
                    buf: vec![],
                };
            }
            commands::EXTENDED_ERASE => {
                self.extended_erases
                    .push(u16::from_be_bytes([frame[1], frame[2]]));
                self.ack();
                self.ack();
            }
            commands::READOUT_PROTECT => {
                self.ack();
                self.ack();
            }
            _ => self.ack(),
        }
    }

    fn handle_write_data(&mut self, frame: &[u8]) {
        let Pending::WriteData {
            address,
            expected,
            buf,
        } = &mut self.pending
        else {
            return;
        };
        if frame.first() != Some(&commands::WRITE_MEMORY) {
            self.pending = Pending::Idle;
            self.nack();
            return;
        }
        buf.extend_from_slice(&frame[1..]);
        if buf.len() < *expected {
            return;
        }
        let (address, expected, data) = (*address, *expected, std::mem::take(buf));
        self.pending = Pending::Idle;
        if data.len() != expected {
            self.nack();
            return;
        }
        self.load(address, &data);
        self.writes.push((address, data));
        self.ack();
    }

    fn handle_page_list(&mut self, frame: &[u8]) {
        let Pending::PageList { opcode, buf } = &mut self.pending else {
            return;
        };
        buf.extend_from_slice(frame);
        let opcode = *opcode;

        if opcode == commands::ERASE && buf[..] == [0xff, 0x00] {
            self.pending = Pending::Idle;
            self.global_erases += 1;
            self.ack();
            return;
        }
        let total = buf[0] as usize + 3;
        if buf.len() < total {
            return;
        }
        let payload = std::mem::take(buf);
        self.pending = Pending::Idle;

        let checksum = payload[..total - 1].iter().fold(0, |acc, b| acc ^ b);
        if payload.len() != total || checksum != payload[total - 1] {
            self.rejected_payloads += 1;
            self.nack();
            return;
        }
        let pages = payload[1..total - 1].iter().map(|&p| u32::from(p)).collect();
        if opcode == commands::ERASE {
            self.erased_pages.push(pages);
        } else {
            self.protected_pages.push(pages);
        }
        self.ack();
    }
}

impl Transport for FakeDevice {
    fn max_transfer_size(&self) -> usize {
        self.frame_size
    }

    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        assert!(!raw.is_empty(), "empty frame");
        assert!(
            raw.len() <= self.frame_size,
            "frame of {} bytes exceeds {}",
            raw.len(),
            self.frame_size
        );
        self.sent.push(raw.to_vec());
        match self.pending {
            Pending::Idle => self.handle_command(raw),
            Pending::WriteData { .. } => self.handle_write_data(raw),
            Pending::PageList { .. } => self.handle_page_list(raw),
        }
        Ok(())
    }

    fn recv_raw(&mut self) -> Result<Option<Vec<u8>>> {
        self.recv_calls += 1;
        Ok(self.replies.pop_front().flatten())
    }
}

pub fn bootloader(device: FakeDevice, family: DeviceFamily) -> Bootloader<FakeDevice> {
    Bootloader::new(
        device,
        BootloaderConfig {
            family,
            ..BootloaderConfig::default()
        },
    )
}

/// Records every progress event.
#[derive(Default)]
pub struct Recorder {
    pub events: Mutex<Vec<(String, u64)>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, u64)> {
        self.events.lock().unwrap().clone()
    }
}

impl Progress for Recorder {
    fn start(&self, label: &str, total: u64) -> ProgressId {
        self.events
            .lock()
            .unwrap()
            .push((format!("start {}", label), total));
        ProgressId(0)
    }

    fn increment(&self, _id: ProgressId, delta: u64) {
        self.events
            .lock()
            .unwrap()
            .push(("step".to_string(), delta));
    }

    fn finish(&self, _id: ProgressId) {
        self.events.lock().unwrap().push(("finish".to_string(), 0));
    }
}
