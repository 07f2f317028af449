use log::{debug, warn};

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::hardware::{CGB_POST_BOOT_DIV, DmgRevision, Model};
use crate::input::Joypad;
use crate::interrupt::InterruptController;
use crate::ppu::{Mode, Ppu};
use crate::serial::Serial;
use crate::timer::Timer;

const WRAM_BANK_SIZE: usize = 0x1000;
const HRAM_SIZE: usize = 0x7F;

// OAM DMA (gbdev.io/pandocs/OAM_DMA_Transfer.html): 160 bytes, one per
// M-cycle, starting two M-cycles after the FF46 write.
const OAM_DMA_START_DELAY: u32 = 8;
const OAM_DMA_CYCLES: u32 = 640;
const OAM_DMA_BYTE_CYCLES: u32 = 4;

const VRAM_DMA_BLOCK: u16 = 0x10;
/// CPU stall per 16-byte VRAM DMA block at normal speed.
const VRAM_DMA_BLOCK_STALL: u32 = 32;

#[derive(Debug, Default)]
struct OamDma {
    /// Last value written to FF46.
    register: u8,
    /// Source of a requested transfer and the cycles until it starts.
    pending: Option<(u16, u32)>,
    source: u16,
    /// Cycles left in the running transfer; zero when idle.
    remaining: u32,
}

#[derive(Debug, Default)]
struct VramDma {
    source: u16,
    dest: u16,
    /// Blocks still to copy; after a cancel this keeps the count at that point.
    blocks_left: u8,
    hblank_active: bool,
}

/// Address decoder owning work RAM, high RAM, the boot ROM overlay and every
/// memory-mapped peripheral.
pub struct Mmu {
    cart: Cartridge,
    boot_rom: Option<Vec<u8>>,
    boot_mapped: bool,
    wram: Box<[[u8; WRAM_BANK_SIZE]; 8]>,
    wram_bank: usize,
    hram: [u8; HRAM_SIZE],
    pub interrupts: InterruptController,
    pub timer: Timer,
    pub ppu: Ppu,
    pub apu: Apu,
    pub serial: Serial,
    pub joypad: Joypad,
    cgb: bool,
    /// CGB running a monochrome cartridge, selected through KEY0.
    dmg_compat: bool,
    key1: u8,
    oam_dma: OamDma,
    vram_dma: VramDma,
    stall_cycles: u32,
}

impl Mmu {
    /// Bus in its power-on state, before any boot ROM has run.
    pub fn new(cart: Cartridge, model: Model, sample_rate: u32) -> Self {
        let cgb = model.is_cgb();
        Self {
            cart,
            boot_rom: None,
            boot_mapped: false,
            wram: Box::new([[0; WRAM_BANK_SIZE]; 8]),
            wram_bank: 1,
            hram: [0; HRAM_SIZE],
            interrupts: InterruptController::new(),
            timer: Timer::new(),
            ppu: Ppu::new(cgb),
            apu: Apu::new(cgb, sample_rate),
            serial: Serial::new(cgb),
            joypad: Joypad::new(),
            cgb,
            dmg_compat: false,
            key1: 0,
            oam_dma: OamDma::default(),
            vram_dma: VramDma::default(),
            stall_cycles: 0,
        }
    }

    /// I/O state the boot ROM leaves behind when it is skipped.
    pub fn apply_post_boot_state(&mut self, dmg_revision: DmgRevision) {
        let div = if self.cgb {
            CGB_POST_BOOT_DIV
        } else {
            dmg_revision.post_boot_div()
        };
        self.timer = Timer::with_divider(div);
        self.ppu.apply_post_boot_state();
        self.apu.apply_post_boot_state();
        self.interrupts.write_if(0x01);
        self.boot_mapped = false;
        if self.cgb && !self.cart.header().supports_cgb() {
            self.set_dmg_compat(true);
            self.ppu.apply_dmg_compat_palettes();
        }
    }

    /// Overlay a boot ROM on the low addresses until FF50 is written.
    pub fn map_boot_rom(&mut self, rom: Vec<u8>) {
        self.boot_rom = Some(rom);
        self.boot_mapped = true;
    }

    pub fn boot_rom(&self) -> Option<&[u8]> {
        self.boot_rom.as_deref()
    }

    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_mapped
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cart
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cart
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn dmg_compat(&self) -> bool {
        self.dmg_compat
    }

    /// CGB-only registers (KEY1, VRAM DMA, SVBK) respond.
    fn cgb_mode(&self) -> bool {
        self.cgb && !self.dmg_compat
    }

    fn set_dmg_compat(&mut self, on: bool) {
        if self.dmg_compat != on {
            debug!("KEY0: {} mode", if on { "DMG compatibility" } else { "CGB" });
        }
        self.dmg_compat = on;
        self.ppu.set_dmg_compat(on);
        if on {
            self.wram_bank = 1;
        }
    }

    /// KEY0 only accepts writes while the boot ROM is mapped.
    fn write_key0(&mut self, val: u8) {
        if !self.boot_mapped {
            return;
        }
        match (val >> 2) & 0x03 {
            0 => self.set_dmg_compat(false),
            1 => self.set_dmg_compat(true),
            mode => warn!("KEY0 mode {mode} is not supported"),
        }
    }

    pub fn is_double_speed(&self) -> bool {
        self.key1 & 0x80 != 0
    }

    pub fn speed_switch_armed(&self) -> bool {
        self.cgb_mode() && self.key1 & 0x01 != 0
    }

    /// Completes a STOP-triggered speed switch.
    pub fn switch_speed(&mut self) {
        self.key1 = (self.key1 ^ 0x80) & 0x80;
        debug!(
            "speed switch: {}",
            if self.is_double_speed() {
                "double"
            } else {
                "normal"
            }
        );
    }

    pub fn reset_div(&mut self) {
        self.timer.reset_div(&mut self.interrupts);
    }

    /// CPU cycles the processor must idle for a finished VRAM DMA.
    pub fn take_stall_cycles(&mut self) -> u32 {
        std::mem::take(&mut self.stall_cycles)
    }

    pub fn oam_dma_active(&self) -> bool {
        self.oam_dma.remaining > 0
    }

    fn boot_byte(&self, addr: u16) -> Option<u8> {
        if !self.boot_mapped {
            return None;
        }
        let in_overlay = addr < 0x0100 || (self.cgb && (0x0200..0x0900).contains(&addr));
        if !in_overlay {
            return None;
        }
        self.boot_rom
            .as_ref()
            .and_then(|rom| rom.get(addr as usize).copied())
    }

    fn wram_index(&self, addr: u16) -> (usize, usize) {
        // E000-FDFF mirrors C000-DDFF.
        let offset = (addr & 0x1FFF) as usize;
        if offset < WRAM_BANK_SIZE {
            (0, offset)
        } else {
            (self.wram_bank, offset - WRAM_BANK_SIZE)
        }
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF => self
                .boot_byte(addr)
                .unwrap_or_else(|| self.cart.read(addr)),
            0x8000..=0x9FFF => self.ppu.read_vram(addr),
            0xA000..=0xBFFF => self.cart.read(addr),
            0xC000..=0xFDFF => {
                let (bank, offset) = self.wram_index(addr);
                self.wram[bank][offset]
            }
            0xFE00..=0xFE9F => {
                if self.oam_dma_active() {
                    0xFF
                } else {
                    self.ppu.read_oam(addr)
                }
            }
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00..=0xFF7F => self.read_io(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.read_ie(),
        }
    }

    fn read_io(&self, addr: u16) -> u8 {
        match addr {
            0xFF00 => self.joypad.read(),
            0xFF01 | 0xFF02 => self.serial.read(addr),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.interrupts.read_if(),
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.oam_dma.register,
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6C => self.ppu.read_reg(addr),
            0xFF4D if self.cgb_mode() => 0x7E | (self.key1 & 0x81),
            0xFF55 if self.cgb_mode() => {
                let remaining = self.vram_dma.blocks_left.wrapping_sub(1) & 0x7F;
                if self.vram_dma.hblank_active {
                    remaining
                } else {
                    0x80 | remaining
                }
            }
            0xFF70 if self.cgb_mode() => 0xF8 | self.wram_bank as u8,
            0xFF76 | 0xFF77 if self.cgb => self.apu.read_pcm(addr),
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cart.write(addr, val),
            0x8000..=0x9FFF => self.ppu.write_vram(addr, val),
            0xC000..=0xFDFF => {
                let (bank, offset) = self.wram_index(addr);
                self.wram[bank][offset] = val;
            }
            0xFE00..=0xFE9F => {
                if !self.oam_dma_active() {
                    self.ppu.write_oam(addr, val);
                }
            }
            0xFEA0..=0xFEFF => {}
            0xFF00..=0xFF7F => self.write_io(addr, val),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.interrupts.write_ie(val),
        }
    }

    fn write_io(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF00 => self.joypad.write(val, &mut self.interrupts),
            0xFF01 | 0xFF02 => self.serial.write(addr, val),
            0xFF04..=0xFF07 => self.timer.write(addr, val, &mut self.interrupts),
            0xFF0F => self.interrupts.write_if(val),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => self.request_oam_dma(val),
            0xFF40..=0xFF4B | 0xFF4F | 0xFF68..=0xFF6C => self.ppu.write_reg(addr, val),
            0xFF4C if self.cgb => self.write_key0(val),
            0xFF4D if self.cgb_mode() => self.key1 = (self.key1 & 0x80) | (val & 0x01),
            0xFF50 => {
                if self.boot_mapped {
                    debug!("boot ROM unmapped");
                }
                self.boot_mapped = false;
            }
            0xFF51 if self.cgb_mode() => {
                self.vram_dma.source = (u16::from(val) << 8) | (self.vram_dma.source & 0x00FF);
            }
            0xFF52 if self.cgb_mode() => {
                self.vram_dma.source = (self.vram_dma.source & 0xFF00) | u16::from(val & 0xF0);
            }
            0xFF53 if self.cgb_mode() => {
                self.vram_dma.dest =
                    (u16::from(val & 0x1F) << 8) | (self.vram_dma.dest & 0x00F0);
            }
            0xFF54 if self.cgb_mode() => {
                self.vram_dma.dest = (self.vram_dma.dest & 0x1F00) | u16::from(val & 0xF0);
            }
            0xFF55 if self.cgb_mode() => self.write_vram_dma_control(val),
            0xFF70 if self.cgb_mode() => {
                let bank = usize::from(val & 0x07);
                self.wram_bank = bank.max(1);
            }
            _ => {}
        }
    }

    fn request_oam_dma(&mut self, val: u8) {
        self.oam_dma.register = val;
        let source = u16::from(val) << 8;
        self.oam_dma.pending = Some((source, OAM_DMA_START_DELAY));
        #[cfg(feature = "ppu-trace")]
        log::trace!("OAM DMA requested from {:04X}", source);
    }

    /// Byte as seen by the DMA engines: no mode blocking, and E000+ reads
    /// the work RAM mirror.
    fn dma_read(&self, addr: u16) -> u8 {
        let addr = if addr >= 0xE000 {
            addr - 0x2000
        } else {
            addr
        };
        match addr {
            0x8000..=0x9FFF => self.ppu.read_vram_direct(addr),
            _ => self.read_byte(addr),
        }
    }

    /// Advance OAM DMA by `cycles` CPU cycles.
    pub fn dma_step(&mut self, cycles: u32) {
        if self.oam_dma.pending.is_none() && self.oam_dma.remaining == 0 {
            return;
        }
        for _ in 0..cycles {
            if let Some((source, delay)) = self.oam_dma.pending {
                if delay <= 1 {
                    self.oam_dma.pending = None;
                    self.oam_dma.source = source;
                    self.oam_dma.remaining = OAM_DMA_CYCLES;
                    debug!("OAM DMA from {:04X}", source);
                } else {
                    self.oam_dma.pending = Some((source, delay - 1));
                }
            }
            if self.oam_dma.remaining == 0 {
                continue;
            }
            let elapsed = OAM_DMA_CYCLES - self.oam_dma.remaining;
            if elapsed % OAM_DMA_BYTE_CYCLES == 0 {
                let index = elapsed / OAM_DMA_BYTE_CYCLES;
                let byte = self.dma_read(self.oam_dma.source.wrapping_add(index as u16));
                self.ppu.write_oam_direct(index as usize, byte);
            }
            self.oam_dma.remaining -= 1;
        }
    }

    fn write_vram_dma_control(&mut self, val: u8) {
        let blocks = (val & 0x7F) + 1;
        if self.vram_dma.hblank_active && val & 0x80 == 0 {
            self.vram_dma.hblank_active = false;
            debug!("HBlank DMA cancelled with {} blocks left", self.vram_dma.blocks_left);
            return;
        }
        if val & 0x80 == 0 {
            debug!(
                "general DMA {:04X} -> {:04X}, {} blocks",
                self.vram_dma.source,
                0x8000 | self.vram_dma.dest,
                blocks
            );
            for _ in 0..blocks {
                self.copy_vram_dma_block();
            }
            self.vram_dma.blocks_left = 0;
            return;
        }
        debug!(
            "HBlank DMA {:04X} -> {:04X}, {} blocks",
            self.vram_dma.source,
            0x8000 | self.vram_dma.dest,
            blocks
        );
        self.vram_dma.blocks_left = blocks;
        self.vram_dma.hblank_active = true;
        // With the display off one block goes immediately; the rest wait for
        // HBlanks, which only resume once the display is switched back on.
        if !self.ppu.lcd_enabled() || self.ppu.mode() == Mode::HBlank {
            self.hdma_hblank();
        }
    }

    fn copy_vram_dma_block(&mut self) {
        for _ in 0..VRAM_DMA_BLOCK {
            let byte = self.dma_read(self.vram_dma.source);
            self.ppu
                .write_vram_direct(0x8000 | (self.vram_dma.dest & 0x1FFF), byte);
            self.vram_dma.source = self.vram_dma.source.wrapping_add(1);
            self.vram_dma.dest = (self.vram_dma.dest + 1) & 0x1FFF;
        }
        let stall = if self.is_double_speed() {
            VRAM_DMA_BLOCK_STALL * 2
        } else {
            VRAM_DMA_BLOCK_STALL
        };
        self.stall_cycles += stall;
    }

    /// One HBlank DMA block, called on each HBlank entry.
    pub fn hdma_hblank(&mut self) {
        if !self.vram_dma.hblank_active {
            return;
        }
        self.copy_vram_dma_block();
        self.vram_dma.blocks_left -= 1;
        if self.vram_dma.blocks_left == 0 {
            self.vram_dma.hblank_active = false;
        }
    }
}
