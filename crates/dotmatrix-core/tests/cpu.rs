mod common;

use common::{PROGRAM_START, dmg_with_program};
use dotmatrix_core::cpu::RunMode;

#[test]
fn nop_only_moves_pc() {
    let mut gb = dmg_with_program(&[0x00]);
    let before = (gb.cpu.af(), gb.cpu.bc(), gb.cpu.de(), gb.cpu.hl(), gb.cpu.sp);
    assert_eq!(gb.advance(), 4);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 1);
    assert_eq!(
        (gb.cpu.af(), gb.cpu.bc(), gb.cpu.de(), gb.cpu.hl(), gb.cpu.sp),
        before
    );
}

#[test]
fn add_sets_zero_half_and_carry() {
    // LD A,3A ; LD B,C6 ; ADD A,B
    let mut gb = dmg_with_program(&[0x3E, 0x3A, 0x06, 0xC6, 0x80]);
    assert_eq!(gb.advance(), 8);
    assert_eq!(gb.advance(), 8);
    assert_eq!(gb.advance(), 4);
    assert_eq!(gb.cpu.a, 0x00);
    assert_eq!(gb.cpu.f, 0xB0);
}

#[test]
fn call_and_ret_costs() {
    // CALL 0158 ; NOP... ; 0158: RET
    let mut gb = dmg_with_program(&[0xCD, 0x58, 0x01, 0, 0, 0, 0, 0, 0xC9]);
    let sp = gb.cpu.sp;
    assert_eq!(gb.advance(), 24);
    assert_eq!(gb.cpu.pc, 0x0158);
    assert_eq!(gb.cpu.sp, sp.wrapping_sub(2));
    assert_eq!(gb.mmu.read_byte(gb.cpu.sp), 0x53);
    assert_eq!(gb.advance(), 16);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 3);
    assert_eq!(gb.cpu.sp, sp);
}

#[test]
fn conditional_jump_costs_depend_on_flag() {
    // XOR A (Z set) ; JR NZ,+2 ; JR Z,+0
    let mut gb = dmg_with_program(&[0xAF, 0x20, 0x02, 0x28, 0x00]);
    gb.advance();
    assert_eq!(gb.advance(), 8);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 3);
    assert_eq!(gb.advance(), 12);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 5);
}

#[test]
fn push_pop_masks_low_flag_bits() {
    // LD BC,12FF ; PUSH BC ; POP AF
    let mut gb = dmg_with_program(&[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
    gb.advance();
    assert_eq!(gb.advance(), 16);
    assert_eq!(gb.advance(), 12);
    assert_eq!(gb.cpu.a, 0x12);
    assert_eq!(gb.cpu.f, 0xF0);
}

#[test]
fn cb_bit_on_hl_costs_twelve() {
    // LD HL,C000 ; BIT 0,(HL) ; SET 0,(HL)
    let mut gb = dmg_with_program(&[0x21, 0x00, 0xC0, 0xCB, 0x46, 0xCB, 0xC6]);
    gb.mmu.write_byte(0xC000, 0x00);
    gb.advance();
    assert_eq!(gb.advance(), 12);
    assert_ne!(gb.cpu.f & 0x80, 0);
    assert_eq!(gb.advance(), 16);
    assert_eq!(gb.mmu.read_byte(0xC000), 0x01);
}

#[test]
fn halt_bug_repeats_next_byte() {
    // HALT ; INC A
    let mut gb = dmg_with_program(&[0x76, 0x3C, 0x00]);
    gb.mmu.write_byte(0xFFFF, 0x01);
    gb.mmu.write_byte(0xFF0F, 0x01);
    let a = gb.cpu.a;
    gb.advance();
    assert_eq!(gb.cpu.mode, RunMode::HaltBug);
    gb.advance();
    gb.advance();
    assert_eq!(gb.cpu.a, a.wrapping_add(2));
    assert_eq!(gb.cpu.pc, PROGRAM_START + 2);
}

#[test]
fn halt_without_ime_resumes_after_request() {
    // HALT ; NOP
    let mut gb = dmg_with_program(&[0x76, 0x00]);
    gb.mmu.write_byte(0xFF0F, 0x00);
    gb.mmu.write_byte(0xFFFF, 0x04);
    gb.advance();
    assert_eq!(gb.cpu.mode, RunMode::Halted);
    assert_eq!(gb.advance(), 4);
    assert_eq!(gb.cpu.mode, RunMode::Halted);

    gb.mmu.write_byte(0xFF0F, 0x04);
    gb.advance();
    assert_eq!(gb.cpu.mode, RunMode::Running);
    assert_eq!(gb.cpu.pc, PROGRAM_START + 1);
    // Interrupt is left pending because IME is clear.
    assert_eq!(gb.mmu.read_byte(0xFF0F) & 0x04, 0x04);
}

#[test]
fn ld_hl_sp_offset_flags_from_low_byte() {
    // LD SP,00FF ; LD HL,SP+1
    let mut gb = dmg_with_program(&[0x31, 0xFF, 0x00, 0xF8, 0x01]);
    gb.advance();
    assert_eq!(gb.advance(), 12);
    assert_eq!(gb.cpu.hl(), 0x0100);
    assert_eq!(gb.cpu.f, 0x30);
}

#[test]
fn straight_line_opcodes_advance_pc_by_their_length() {
    use dotmatrix_core::opcodes::{BASE, CB, Op};

    for code in 0..=0xFFu8 {
        let entry = &BASE[usize::from(code)];
        if entry.op.transfers_control() || entry.op == Op::Illegal {
            continue;
        }
        let mut gb = dmg_with_program(&[code, 0x00, 0x00]);
        gb.advance();
        let expected = if entry.op == Op::Prefix {
            CB[0].length
        } else {
            entry.length
        };
        assert_eq!(
            gb.cpu.pc - PROGRAM_START,
            u16::from(expected),
            "opcode {code:02X}"
        );
    }
}
