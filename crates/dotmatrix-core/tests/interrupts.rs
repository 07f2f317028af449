mod common;

use common::{PROGRAM_START, RomBuilder, dmg_config, dmg_with_program};
use dotmatrix_core::GameBoy;

#[test]
fn ei_takes_effect_after_next_instruction() {
    // EI ; NOP ; NOP
    let mut gb = dmg_with_program(&[0xFB, 0x00, 0x00]);
    gb.mmu.write_byte(0xFFFF, 0x01);
    gb.mmu.write_byte(0xFF0F, 0x01);
    let sp = gb.cpu.sp;

    gb.advance();
    assert!(!gb.cpu.ime);
    gb.advance();
    assert!(gb.cpu.ime);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 2);

    assert_eq!(gb.advance(), 20);
    assert_eq!(gb.cpu.pc, 0x0040);
    assert!(!gb.cpu.ime);
    assert_eq!(gb.mmu.read_byte(0xFF0F) & 0x01, 0);
    assert_eq!(gb.cpu.sp, sp.wrapping_sub(2));
    assert_eq!(gb.mmu.read_byte(gb.cpu.sp), (PROGRAM_START + 2) as u8);
}

#[test]
fn no_dispatch_without_enable_bit() {
    // EI ; NOP ; NOP ; NOP
    let mut gb = dmg_with_program(&[0xFB, 0x00, 0x00, 0x00]);
    gb.mmu.write_byte(0xFFFF, 0x00);
    gb.mmu.write_byte(0xFF0F, 0x1F);
    for _ in 0..4 {
        gb.advance();
    }
    assert_eq!(gb.cpu.pc, PROGRAM_START + 4);
}

#[test]
fn highest_priority_served_first() {
    // EI ; NOP
    let mut gb = dmg_with_program(&[0xFB, 0x00]);
    gb.mmu.write_byte(0xFFFF, 0x1F);
    gb.mmu.write_byte(0xFF0F, 0x14);
    gb.advance();
    gb.advance();
    gb.advance();
    assert_eq!(gb.cpu.pc, 0x0050);
    assert_eq!(gb.mmu.read_byte(0xFF0F) & 0x1F, 0x10);
}

#[test]
fn if_upper_bits_read_as_one() {
    let mut gb = dmg_with_program(&[0x00]);
    gb.mmu.write_byte(0xFF0F, 0x00);
    assert_eq!(gb.mmu.read_byte(0xFF0F), 0xE0);
    gb.mmu.write_byte(0xFF0F, 0xFF);
    assert_eq!(gb.mmu.read_byte(0xFF0F), 0xFF);
}

#[test]
fn reti_reenables_immediately() {
    let cart = RomBuilder::new()
        .program(&[0xFB, 0x00, 0x00])
        .at(0x0050, &[0xD9])
        .cartridge();
    let mut gb = GameBoy::new(cart, &dmg_config());
    gb.advance();
    gb.advance();
    gb.mmu.write_byte(0xFFFF, 0x04);
    gb.mmu.write_byte(0xFF0F, 0x04);
    gb.advance();
    gb.advance();
    gb.advance();
    assert_eq!(gb.cpu.pc, 0x0050);
    assert_eq!(gb.advance(), 16);
    assert!(gb.cpu.ime);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 2);
}
