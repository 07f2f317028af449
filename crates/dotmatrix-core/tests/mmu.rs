mod common;

use common::{RomBuilder, dmg_config, dmg_with_program};
use dotmatrix_core::hardware::{EmulatorConfig, Model};
use dotmatrix_core::mmu::Mmu;
use dotmatrix_core::GameBoy;

fn cgb_bus() -> Mmu {
    let mut mmu = Mmu::new(RomBuilder::new().cgb().cartridge(), Model::Cgb, 44_100);
    mmu.apply_post_boot_state(Default::default());
    mmu
}

#[test]
fn unusable_area_reads_ff_and_ignores_writes() {
    let mut gb = dmg_with_program(&[0x00]);
    gb.mmu.write_byte(0xFEA0, 0x12);
    gb.mmu.write_byte(0xFEFF, 0x34);
    assert_eq!(gb.mmu.read_byte(0xFEA0), 0xFF);
    assert_eq!(gb.mmu.read_byte(0xFEFF), 0xFF);
}

#[test]
fn echo_area_mirrors_work_ram_both_ways() {
    let mut gb = dmg_with_program(&[0x00]);
    gb.mmu.write_byte(0xC000, 0xAA);
    assert_eq!(gb.mmu.read_byte(0xE000), 0xAA);
    gb.mmu.write_byte(0xE000, 0xBB);
    assert_eq!(gb.mmu.read_byte(0xC000), 0xBB);
}

#[test]
fn rom_writes_do_not_change_rom() {
    let mut gb = dmg_with_program(&[0x00]);
    let before = gb.mmu.read_byte(0x0150);
    gb.mmu.write_byte(0x0150, 0x99);
    assert_eq!(gb.mmu.read_byte(0x0150), before);
}

#[test]
fn div_write_resets_divider() {
    let mut gb = dmg_with_program(&[0x00]);
    assert_ne!(gb.mmu.read_byte(0xFF04), 0);
    gb.mmu.write_byte(0xFF04, 0x77);
    assert_eq!(gb.mmu.read_byte(0xFF04), 0);
}

#[test]
fn register_masks() {
    let mut gb = dmg_with_program(&[0x00]);
    gb.mmu.write_byte(0xFF07, 0x00);
    assert_eq!(gb.mmu.read_byte(0xFF07), 0xF8);
    gb.mmu.write_byte(0xFF00, 0x30);
    assert_eq!(gb.mmu.read_byte(0xFF00), 0xFF);
    assert_eq!(gb.mmu.read_byte(0xFF41) & 0x80, 0x80);
    assert_eq!(gb.mmu.read_byte(0xFF02), 0x7E);
    // Unmapped I/O.
    assert_eq!(gb.mmu.read_byte(0xFF03), 0xFF);
    assert_eq!(gb.mmu.read_byte(0xFF4C), 0xFF);
    // Sound registers with write-only bits.
    assert_eq!(gb.mmu.read_byte(0xFF13), 0xFF);
    assert_eq!(gb.mmu.read_byte(0xFF15), 0xFF);
}

#[test]
fn hram_and_ie_are_plain_storage() {
    let mut gb = dmg_with_program(&[0x00]);
    gb.mmu.write_byte(0xFF80, 0x01);
    gb.mmu.write_byte(0xFFFE, 0x02);
    gb.mmu.write_byte(0xFFFF, 0x1F);
    assert_eq!(gb.mmu.read_byte(0xFF80), 0x01);
    assert_eq!(gb.mmu.read_byte(0xFFFE), 0x02);
    assert_eq!(gb.mmu.read_byte(0xFFFF), 0x1F);
}

#[test]
fn boot_rom_is_unmapped_by_ff50() {
    let cart = RomBuilder::new().at(0x0000, &[0xAB]).cartridge();
    let mut boot = vec![0u8; 0x100];
    boot[0] = 0x31;
    let mut gb = GameBoy::with_boot_rom(cart, boot, &dmg_config()).unwrap();
    assert_eq!(gb.mmu.read_byte(0x0000), 0x31);
    gb.mmu.write_byte(0xFF50, 0x01);
    assert_eq!(gb.mmu.read_byte(0x0000), 0xAB);
    gb.mmu.write_byte(0xFF50, 0x00);
    assert_eq!(gb.mmu.read_byte(0x0000), 0xAB);
}

#[test]
fn cgb_boot_rom_leaves_header_visible() {
    let cart = RomBuilder::new().cgb().title("COLOUR").cartridge();
    let config = EmulatorConfig::default();
    let gb = GameBoy::with_boot_rom(cart, vec![0x11; 0x900], &config).unwrap();
    assert_eq!(gb.model(), Model::Cgb);
    assert_eq!(gb.mmu.read_byte(0x00FF), 0x11);
    assert_eq!(gb.mmu.read_byte(0x0134), b'C');
    assert_eq!(gb.mmu.read_byte(0x0200), 0x11);
}

#[test]
fn cgb_vram_banks() {
    let mut mmu = cgb_bus();
    mmu.write_byte(0xFF40, 0x00);
    mmu.write_byte(0x8000, 0x11);
    mmu.write_byte(0xFF4F, 0x01);
    assert_eq!(mmu.read_byte(0xFF4F), 0xFF);
    assert_eq!(mmu.read_byte(0x8000), 0x00);
    mmu.write_byte(0x8000, 0x22);
    mmu.write_byte(0xFF4F, 0x00);
    assert_eq!(mmu.read_byte(0xFF4F), 0xFE);
    assert_eq!(mmu.read_byte(0x8000), 0x11);
}

#[test]
fn cgb_wram_banks_switch_upper_half_only() {
    let mut mmu = cgb_bus();
    mmu.write_byte(0xC000, 0x01);
    mmu.write_byte(0xFF70, 0x02);
    mmu.write_byte(0xD000, 0xCC);
    mmu.write_byte(0xFF70, 0x03);
    assert_eq!(mmu.read_byte(0xD000), 0x00);
    assert_eq!(mmu.read_byte(0xC000), 0x01);
    mmu.write_byte(0xFF70, 0x02);
    assert_eq!(mmu.read_byte(0xD000), 0xCC);
    assert_eq!(mmu.read_byte(0xF000), 0xCC);
}

#[test]
fn hdma_idle_reads_ff_after_completion() {
    let mut mmu = cgb_bus();
    for i in 0..0x10u16 {
        mmu.write_byte(0xC000 + i, i as u8);
    }
    mmu.write_byte(0xFF51, 0xC0);
    mmu.write_byte(0xFF52, 0x00);
    mmu.write_byte(0xFF53, 0x80);
    mmu.write_byte(0xFF54, 0x00);
    mmu.write_byte(0xFF55, 0x80);
    assert_ne!(mmu.read_byte(0xFF55), 0xFF);
    mmu.hdma_hblank();
    assert_eq!(mmu.read_byte(0xFF55), 0xFF);
    mmu.write_byte(0xFF40, 0x00);
    assert_eq!(mmu.read_byte(0x800F), 0x0F);
}

#[test]
fn oam_dma_through_instructions() {
    // LD A,C1 ; LDH (FF46),A ; JR -2
    let mut gb = dmg_with_program(&[0x3E, 0xC1, 0xE0, 0x46, 0x18, 0xFE]);
    gb.mmu.write_byte(0xFF40, 0x00);
    for i in 0..0xA0u16 {
        gb.mmu.write_byte(0xC100 + i, 0xFF - i as u8);
    }
    gb.advance();
    gb.advance();
    let mut cycles = 0;
    while cycles < 700 {
        cycles += gb.advance();
    }
    assert_eq!(gb.mmu.read_byte(0xFE00), 0xFF);
    assert_eq!(gb.mmu.read_byte(0xFE9F), 0x60);
}

#[test]
fn hblank_dma_with_display_off_waits_for_display() {
    let cart = RomBuilder::new().cgb().program(&[0x18, 0xFE]).cartridge();
    let mut gb = GameBoy::new(cart, &EmulatorConfig::default());
    gb.mmu.write_byte(0xFF40, 0x00);
    for i in 0..0x30u16 {
        gb.mmu.write_byte(0xC000 + i, 0x40 + i as u8);
    }
    gb.mmu.write_byte(0xFF51, 0xC0);
    gb.mmu.write_byte(0xFF52, 0x00);
    gb.mmu.write_byte(0xFF53, 0x00);
    gb.mmu.write_byte(0xFF54, 0x00);
    gb.mmu.write_byte(0xFF55, 0x82);
    // First block copied at once, two still pending.
    assert_eq!(gb.mmu.read_byte(0xFF55), 0x01);
    assert_eq!(gb.mmu.read_byte(0x8000), 0x40);

    let mut cycles = 0;
    while cycles < 2_000 {
        cycles += gb.advance();
    }
    assert_eq!(gb.mmu.read_byte(0xFF55), 0x01);
    assert_eq!(gb.mmu.read_byte(0x8010), 0x00);

    // One visible line with the display on brings one HBlank.
    gb.mmu.write_byte(0xFF40, 0x91);
    let mut cycles = 0;
    while cycles < 456 {
        cycles += gb.advance();
    }
    assert_eq!(gb.mmu.read_byte(0xFF55), 0x00);
    let mut cycles = 0;
    while cycles < 456 {
        cycles += gb.advance();
    }
    assert_eq!(gb.mmu.read_byte(0xFF55), 0xFF);
    gb.mmu.write_byte(0xFF40, 0x00);
    assert_eq!(gb.mmu.read_byte(0x8010), 0x50);
    assert_eq!(gb.mmu.read_byte(0x802F), 0x6F);
}
