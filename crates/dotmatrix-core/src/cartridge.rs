use log::{info, warn};

use crate::error::CartridgeError;
use crate::hardware::CLOCK_HZ;

pub const ROM_BANK_SIZE: usize = 0x4000;
pub const RAM_BANK_SIZE: usize = 0x2000;

const HEADER_END: usize = 0x150;
const MBC2_RAM_SIZE: usize = 0x200;

/// Length of the serialized clock block (live + latched registers + timestamp).
pub const RTC_STATE_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    /// MBC3 variant with 8 RAM banks and an 8-bit ROM bank register.
    Mbc30,
    Mbc5,
}

/// Fields decoded from 0x0134..0x0150.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    pub title: String,
    pub cgb_flag: u8,
    pub cart_type: u8,
    pub kind: MbcKind,
    pub rom_size: usize,
    pub ram_size: usize,
    pub header_checksum: u8,
}

impl CartridgeHeader {
    pub fn parse(data: &[u8]) -> Result<Self, CartridgeError> {
        if data.len() < HEADER_END {
            return Err(CartridgeError::Truncated(data.len()));
        }

        let cart_type = data[0x0147];
        let rom_code = data[0x0148];
        let ram_code = data[0x0149];

        let kind = match cart_type {
            0x00 | 0x08 | 0x09 => MbcKind::RomOnly,
            0x01..=0x03 => MbcKind::Mbc1,
            0x05 | 0x06 => MbcKind::Mbc2,
            0x0F..=0x13 if ram_code == 0x05 => MbcKind::Mbc30,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            other => return Err(CartridgeError::UnsupportedType(other)),
        };

        let rom_size = match rom_code {
            0x00..=0x08 => 0x8000usize << rom_code,
            other => return Err(CartridgeError::InvalidRomSize(other)),
        };

        let ram_size = if kind == MbcKind::Mbc2 {
            MBC2_RAM_SIZE
        } else {
            match ram_code {
                0x00 if has_ram_chip(cart_type) => {
                    warn!("cartridge type 0x{cart_type:02X} has RAM but header declares none; assuming 8 KiB");
                    RAM_BANK_SIZE
                }
                0x00 => 0,
                0x01 => 0x800,
                0x02 => 0x2000,
                0x03 => 0x8000,
                0x04 => 0x20000,
                0x05 => 0x10000,
                other => return Err(CartridgeError::InvalidRamSize(other)),
            }
        };

        let mut title_bytes = &data[0x0134..0x0144];
        // CGB carts reuse the last title byte as the colour flag.
        if data[0x0143] & 0x80 != 0 {
            title_bytes = &title_bytes[..15];
        }
        if let Some(end) = title_bytes.iter().position(|&b| b == 0) {
            title_bytes = &title_bytes[..end];
        }

        Ok(Self {
            title: String::from_utf8_lossy(title_bytes).trim().to_string(),
            cgb_flag: data[0x0143],
            cart_type,
            kind,
            rom_size,
            ram_size,
            header_checksum: data[0x014D],
        })
    }

    pub fn supports_cgb(&self) -> bool {
        self.cgb_flag & 0x80 != 0
    }

    pub fn has_battery(&self) -> bool {
        matches!(
            self.cart_type,
            0x03 | 0x06 | 0x09 | 0x0F | 0x10 | 0x13 | 0x1B | 0x1E
        )
    }

    pub fn has_rtc(&self) -> bool {
        matches!(self.cart_type, 0x0F | 0x10)
    }

    pub fn has_rumble(&self) -> bool {
        matches!(self.cart_type, 0x1C..=0x1E)
    }
}

fn has_ram_chip(cart_type: u8) -> bool {
    matches!(
        cart_type,
        0x02 | 0x03 | 0x08 | 0x09 | 0x10 | 0x12 | 0x13 | 0x1A | 0x1B | 0x1D | 0x1E
    )
}

/// Header checksum as the boot ROM computes it over 0x0134..=0x014C.
pub fn header_checksum(data: &[u8]) -> u8 {
    data[0x0134..=0x014C]
        .iter()
        .fold(0u8, |acc, &b| acc.wrapping_sub(b).wrapping_sub(1))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RtcRegisters {
    seconds: u8,
    minutes: u8,
    hours: u8,
    days: u16,
    halt: bool,
    carry: bool,
}

impl RtcRegisters {
    fn control(&self) -> u8 {
        let mut out = ((self.days >> 8) as u8) & 0x01;
        if self.halt {
            out |= 0x40;
        }
        if self.carry {
            out |= 0x80;
        }
        out
    }

    fn set_control(&mut self, val: u8) {
        self.days = (self.days & 0x00FF) | (u16::from(val & 0x01) << 8);
        self.halt = val & 0x40 != 0;
        self.carry = val & 0x80 != 0;
    }

    fn read(&self, reg: u8) -> u8 {
        match reg {
            0x08 => self.seconds & 0x3F,
            0x09 => self.minutes & 0x3F,
            0x0A => self.hours & 0x1F,
            0x0B => self.days as u8,
            0x0C => self.control(),
            _ => 0xFF,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        for reg in 0x08..=0x0C {
            out.extend_from_slice(&u32::from(self.read(reg)).to_le_bytes());
        }
    }

    fn decode(data: &[u8]) -> Self {
        let field = |i: usize| data[i * 4];
        let mut regs = Self {
            seconds: field(0) & 0x3F,
            minutes: field(1) & 0x3F,
            hours: field(2) & 0x1F,
            days: u16::from(field(3)),
            ..Self::default()
        };
        regs.set_control(field(4));
        regs
    }
}

/// MBC3 real-time clock, driven by emulated cycles.
#[derive(Debug, Clone, Default)]
struct Rtc {
    live: RtcRegisters,
    latched: RtcRegisters,
    subsecond_cycles: u32,
}

impl Rtc {
    fn tick(&mut self, cycles: u32) {
        if self.live.halt {
            return;
        }
        self.subsecond_cycles += cycles;
        if self.subsecond_cycles >= CLOCK_HZ {
            let seconds = self.subsecond_cycles / CLOCK_HZ;
            self.subsecond_cycles %= CLOCK_HZ;
            self.advance_seconds(u64::from(seconds));
        }
    }

    fn latch(&mut self) {
        self.latched = self.live;
    }

    fn write(&mut self, reg: u8, val: u8) {
        match reg {
            0x08 => {
                self.live.seconds = val & 0x3F;
                self.subsecond_cycles = 0;
            }
            0x09 => self.live.minutes = val & 0x3F,
            0x0A => self.live.hours = val & 0x1F,
            0x0B => self.live.days = (self.live.days & 0x0100) | u16::from(val),
            0x0C => self.live.set_control(val),
            _ => {}
        }
        self.latched = self.live;
    }

    fn advance_seconds(&mut self, mut seconds: u64) {
        while seconds > 0 {
            // Seconds in 60..=63 count up to 63 and wrap without a minute tick.
            let sec = u64::from(self.live.seconds);
            let until_minute = if sec <= 59 { 60 - sec } else { 64 - sec + 60 };
            if seconds < until_minute {
                self.live.seconds = ((sec + seconds) & 0x3F) as u8;
                return;
            }
            seconds -= until_minute;
            self.live.seconds = 0;
            self.minute_tick();
        }
    }

    fn minute_tick(&mut self) {
        if self.live.minutes == 59 {
            self.live.minutes = 0;
            self.hour_tick();
        } else {
            self.live.minutes = (self.live.minutes + 1) & 0x3F;
        }
    }

    fn hour_tick(&mut self) {
        if self.live.hours == 23 {
            self.live.hours = 0;
            self.day_tick();
        } else {
            self.live.hours = (self.live.hours + 1) & 0x1F;
        }
    }

    fn day_tick(&mut self) {
        if self.live.days >= 0x01FF {
            self.live.days = 0;
            self.live.carry = true;
        } else {
            self.live.days += 1;
        }
    }
}

#[derive(Debug, Clone)]
enum Mapper {
    RomOnly,
    Mbc1 {
        ram_enable: bool,
        bank_lo: u8,
        bank_hi: u8,
        advanced_mode: bool,
    },
    Mbc2 {
        ram_enable: bool,
        rom_bank: u8,
    },
    Mbc3 {
        ram_enable: bool,
        rom_bank: u8,
        select: u8,
        rtc: Option<Rtc>,
        latch_armed: bool,
        wide: bool,
    },
    Mbc5 {
        ram_enable: bool,
        rom_bank: u16,
        ram_bank: u8,
        rumble: bool,
        motor: bool,
    },
}

/// Cartridge ROM/RAM plus the bank controller state.
#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Vec<u8>,
    header: CartridgeHeader,
    mapper: Mapper,
}

impl Cartridge {
    /// Parse and validate a cartridge image.
    pub fn from_bytes(mut data: Vec<u8>) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(&data)?;

        if data.len() < header.rom_size {
            return Err(CartridgeError::RomSizeMismatch {
                declared: header.rom_size,
                actual: data.len(),
            });
        }
        if data.len() > header.rom_size {
            warn!(
                "ROM image is {} bytes but header declares {}; ignoring the excess",
                data.len(),
                header.rom_size
            );
            data.truncate(header.rom_size);
        }

        let computed = header_checksum(&data);
        if computed != header.header_checksum {
            warn!(
                "header checksum mismatch: header 0x{:02X}, computed 0x{computed:02X}",
                header.header_checksum
            );
        }

        let mapper = match header.kind {
            MbcKind::RomOnly => Mapper::RomOnly,
            MbcKind::Mbc1 => Mapper::Mbc1 {
                ram_enable: false,
                bank_lo: 1,
                bank_hi: 0,
                advanced_mode: false,
            },
            MbcKind::Mbc2 => Mapper::Mbc2 {
                ram_enable: false,
                rom_bank: 1,
            },
            MbcKind::Mbc3 | MbcKind::Mbc30 => Mapper::Mbc3 {
                ram_enable: false,
                rom_bank: 1,
                select: 0,
                rtc: header.has_rtc().then(Rtc::default),
                latch_armed: false,
                wide: header.kind == MbcKind::Mbc30,
            },
            MbcKind::Mbc5 => Mapper::Mbc5 {
                ram_enable: false,
                rom_bank: 1,
                ram_bank: 0,
                rumble: header.has_rumble(),
                motor: false,
            },
        };

        info!(
            "loaded \"{}\": {:?}, {} KiB ROM, {} KiB RAM{}{}",
            header.title,
            header.kind,
            header.rom_size / 1024,
            header.ram_size / 1024,
            if header.has_battery() { ", battery" } else { "" },
            if header.has_rtc() { ", clock" } else { "" },
        );

        Ok(Self {
            ram: vec![0; header.ram_size],
            rom: data,
            header,
            mapper,
        })
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn title(&self) -> &str {
        &self.header.title
    }

    pub fn kind(&self) -> MbcKind {
        self.header.kind
    }

    pub fn rom_bank_count(&self) -> usize {
        (self.rom.len() / ROM_BANK_SIZE).max(1)
    }

    /// Bank currently visible at 0x0000..0x4000.
    pub fn low_rom_bank(&self) -> usize {
        let bank = match &self.mapper {
            Mapper::Mbc1 {
                bank_hi,
                advanced_mode: true,
                ..
            } => usize::from(*bank_hi) << 5,
            _ => 0,
        };
        bank % self.rom_bank_count()
    }

    /// Bank currently visible at 0x4000..0x8000.
    pub fn high_rom_bank(&self) -> usize {
        let bank = match &self.mapper {
            Mapper::RomOnly => 1,
            Mapper::Mbc1 {
                bank_lo, bank_hi, ..
            } => (usize::from(*bank_hi) << 5) | usize::from((*bank_lo).max(1)),
            Mapper::Mbc2 { rom_bank, .. } => usize::from(*rom_bank),
            Mapper::Mbc3 { rom_bank, .. } => usize::from(*rom_bank),
            Mapper::Mbc5 { rom_bank, .. } => usize::from(*rom_bank),
        };
        bank % self.rom_bank_count()
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom_byte(self.low_rom_bank(), addr as usize),
            0x4000..=0x7FFF => self.rom_byte(self.high_rom_bank(), addr as usize - 0x4000),
            0xA000..=0xBFFF => self.read_ram(addr),
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.write_control(addr, val),
            0xA000..=0xBFFF => self.write_ram(addr, val),
            _ => {}
        }
    }

    fn rom_byte(&self, bank: usize, offset: usize) -> u8 {
        self.rom
            .get(bank * ROM_BANK_SIZE + offset)
            .copied()
            .unwrap_or(0xFF)
    }

    fn write_control(&mut self, addr: u16, val: u8) {
        match &mut self.mapper {
            Mapper::RomOnly => {}
            Mapper::Mbc1 {
                ram_enable,
                bank_lo,
                bank_hi,
                advanced_mode,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => *bank_lo = val & 0x1F,
                0x4000..=0x5FFF => *bank_hi = val & 0x03,
                _ => *advanced_mode = val & 0x01 != 0,
            },
            Mapper::Mbc2 {
                ram_enable,
                rom_bank,
            } => {
                if addr < 0x4000 {
                    if addr & 0x0100 == 0 {
                        *ram_enable = val & 0x0F == 0x0A;
                    } else {
                        *rom_bank = (val & 0x0F).max(1);
                    }
                }
            }
            Mapper::Mbc3 {
                ram_enable,
                rom_bank,
                select,
                rtc,
                latch_armed,
                wide,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    let mask = if *wide { 0xFF } else { 0x7F };
                    *rom_bank = (val & mask).max(1);
                }
                0x4000..=0x5FFF => *select = val & 0x0F,
                _ => {
                    if val == 0x01 && *latch_armed {
                        if let Some(rtc) = rtc {
                            rtc.latch();
                        }
                    }
                    *latch_armed = val == 0x00;
                }
            },
            Mapper::Mbc5 {
                ram_enable,
                rom_bank,
                ram_bank,
                rumble,
                motor,
            } => match addr {
                0x0000..=0x1FFF => *ram_enable = val & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x100) | u16::from(val),
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0xFF) | (u16::from(val & 0x01) << 8),
                0x4000..=0x5FFF => {
                    if *rumble {
                        *motor = val & 0x08 != 0;
                        *ram_bank = val & 0x07;
                    } else {
                        *ram_bank = val & 0x0F;
                    }
                }
                _ => {}
            },
        }
    }

    /// Offset into `ram` for a cartridge RAM access, or `None` when the
    /// access does not reach RAM (disabled, absent, or clock selected).
    fn ram_offset(&self, addr: u16) -> Option<usize> {
        if self.ram.is_empty() {
            return None;
        }
        let offset = (addr - 0xA000) as usize;
        let bank = match &self.mapper {
            Mapper::RomOnly => 0,
            Mapper::Mbc1 {
                ram_enable: true,
                bank_hi,
                advanced_mode,
                ..
            } => {
                if *advanced_mode {
                    usize::from(*bank_hi)
                } else {
                    0
                }
            }
            Mapper::Mbc2 {
                ram_enable: true, ..
            } => return Some(offset & (MBC2_RAM_SIZE - 1)),
            Mapper::Mbc3 {
                ram_enable: true,
                select,
                wide,
                ..
            } => {
                let max = if *wide { 0x07 } else { 0x03 };
                if *select > max {
                    return None;
                }
                usize::from(*select)
            }
            Mapper::Mbc5 {
                ram_enable: true,
                ram_bank,
                ..
            } => usize::from(*ram_bank),
            _ => return None,
        };
        Some((bank * RAM_BANK_SIZE + offset) % self.ram.len())
    }

    fn selected_rtc_register(&self) -> Option<(&Rtc, u8)> {
        match &self.mapper {
            Mapper::Mbc3 {
                ram_enable: true,
                select: reg @ 0x08..=0x0C,
                rtc: Some(rtc),
                ..
            } => Some((rtc, *reg)),
            _ => None,
        }
    }

    fn read_ram(&self, addr: u16) -> u8 {
        if let Some((rtc, reg)) = self.selected_rtc_register() {
            return rtc.latched.read(reg);
        }
        match self.ram_offset(addr) {
            Some(i) if matches!(self.mapper, Mapper::Mbc2 { .. }) => self.ram[i] | 0xF0,
            Some(i) => self.ram[i],
            None => 0xFF,
        }
    }

    fn write_ram(&mut self, addr: u16, val: u8) {
        if let Mapper::Mbc3 {
            ram_enable: true,
            select: reg @ 0x08..=0x0C,
            rtc: Some(rtc),
            ..
        } = &mut self.mapper
        {
            rtc.write(*reg, val);
            return;
        }
        if let Some(i) = self.ram_offset(addr) {
            self.ram[i] = if matches!(self.mapper, Mapper::Mbc2 { .. }) {
                val & 0x0F
            } else {
                val
            };
        }
    }

    /// Advance the clock by emulated cycles at the undoubled main clock rate.
    pub fn tick_rtc(&mut self, cycles: u32) {
        if let Some(rtc) = self.rtc_mut() {
            rtc.tick(cycles);
        }
    }

    /// Inject elapsed host time into the clock. Ignored while halted.
    pub fn advance_rtc(&mut self, seconds: u64) {
        if let Some(rtc) = self.rtc_mut()
            && !rtc.live.halt
        {
            rtc.advance_seconds(seconds);
        }
    }

    fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match &mut self.mapper {
            Mapper::Mbc3 { rtc, .. } => rtc.as_mut(),
            _ => None,
        }
    }

    fn rtc(&self) -> Option<&Rtc> {
        match &self.mapper {
            Mapper::Mbc3 { rtc, .. } => rtc.as_ref(),
            _ => None,
        }
    }

    pub fn has_battery(&self) -> bool {
        self.header.has_battery()
    }

    pub fn has_rtc(&self) -> bool {
        self.rtc().is_some()
    }

    /// Whether an MBC5 rumble motor is currently driven.
    pub fn rumble_active(&self) -> bool {
        matches!(self.mapper, Mapper::Mbc5 { motor: true, .. })
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Restore battery-backed RAM from a previous session.
    pub fn load_ram(&mut self, data: &[u8]) -> Result<(), CartridgeError> {
        if data.len() != self.ram.len() {
            return Err(CartridgeError::SaveSizeMismatch {
                expected: self.ram.len(),
                actual: data.len(),
            });
        }
        self.ram.copy_from_slice(data);
        Ok(())
    }

    /// Clock registers in the common 48-byte layout: live and latched
    /// registers as little-endian u32 words followed by `unix_time`.
    pub fn rtc_state(&self, unix_time: u64) -> Option<Vec<u8>> {
        let rtc = self.rtc()?;
        let mut out = Vec::with_capacity(RTC_STATE_LEN);
        rtc.live.encode(&mut out);
        rtc.latched.encode(&mut out);
        out.extend_from_slice(&unix_time.to_le_bytes());
        Some(out)
    }

    /// Restore clock registers written by [`Cartridge::rtc_state`] and return
    /// the timestamp stored with them. Callers that want the clock to catch
    /// up with host time pass the difference to [`Cartridge::advance_rtc`].
    pub fn load_rtc_state(&mut self, data: &[u8]) -> Result<u64, CartridgeError> {
        if data.len() < RTC_STATE_LEN {
            return Err(CartridgeError::InvalidRtcState);
        }
        let rtc = self.rtc_mut().ok_or(CartridgeError::InvalidRtcState)?;
        rtc.live = RtcRegisters::decode(&data[0..20]);
        rtc.latched = RtcRegisters::decode(&data[20..40]);
        rtc.subsecond_cycles = 0;
        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&data[40..48]);
        Ok(u64::from_le_bytes(stamp))
    }
}
