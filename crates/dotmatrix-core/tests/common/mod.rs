#![allow(dead_code)]

use dotmatrix_core::cartridge::{Cartridge, header_checksum};
use dotmatrix_core::hardware::{EmulatorConfig, Model};
use dotmatrix_core::GameBoy;

/// Where test programs are placed; the entry point jumps here.
pub const PROGRAM_START: u16 = 0x0150;

/// Hand-assembled cartridge image with a valid header checksum.
pub struct RomBuilder {
    rom: Vec<u8>,
}

impl RomBuilder {
    /// ROM-only 32 KiB image whose entry point is `JP 0150`.
    pub fn new() -> Self {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100..0x0104].copy_from_slice(&[0x00, 0xC3, 0x50, 0x01]);
        Self { rom }
    }

    /// Cartridge type, ROM size and RAM size codes.
    pub fn mapper(mut self, cart_type: u8, rom_code: u8, ram_code: u8) -> Self {
        self.rom.resize(0x8000 << rom_code, 0);
        self.rom[0x0147] = cart_type;
        self.rom[0x0148] = rom_code;
        self.rom[0x0149] = ram_code;
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        let bytes = title.as_bytes();
        let n = bytes.len().min(15);
        self.rom[0x0134..0x0134 + n].copy_from_slice(&bytes[..n]);
        self
    }

    pub fn cgb(mut self) -> Self {
        self.rom[0x0143] = 0x80;
        self
    }

    pub fn program(mut self, code: &[u8]) -> Self {
        let start = PROGRAM_START as usize;
        self.rom[start..start + code.len()].copy_from_slice(code);
        self
    }

    /// Raw bytes at an arbitrary ROM address.
    pub fn at(mut self, addr: u16, code: &[u8]) -> Self {
        let start = addr as usize;
        self.rom[start..start + code.len()].copy_from_slice(code);
        self
    }

    /// Stamp the first byte of every 16 KiB bank with its bank number.
    pub fn tag_banks(mut self) -> Self {
        for (bank, chunk) in self.rom.chunks_mut(0x4000).enumerate().skip(1) {
            chunk[0] = bank as u8;
        }
        self
    }

    pub fn build(mut self) -> Vec<u8> {
        self.rom[0x014D] = header_checksum(&self.rom);
        self.rom
    }

    pub fn cartridge(self) -> Cartridge {
        Cartridge::from_bytes(self.build()).unwrap()
    }
}

pub fn dmg_config() -> EmulatorConfig {
    EmulatorConfig {
        model: Some(Model::Dmg),
        ..EmulatorConfig::default()
    }
}

/// DMG running `code` from [`PROGRAM_START`], with the entry jump already taken.
pub fn dmg_with_program(code: &[u8]) -> GameBoy {
    let mut gb = GameBoy::new(RomBuilder::new().program(code).cartridge(), &dmg_config());
    gb.advance(); // NOP
    gb.advance(); // JP
    assert_eq!(gb.cpu.pc, PROGRAM_START);
    gb
}
