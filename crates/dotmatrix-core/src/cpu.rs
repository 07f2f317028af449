use crate::hardware::{DmgRevision, Model};
use crate::mmu::Mmu;
use crate::opcodes::{AluOp, BASE, CB, Cond, Op, Opcode, Operand8, Reg8, Reg16, RotOp};

// CPU flag bits as documented in gbdev.io/pandocs/The_CPU_Flags.html
const FLAG_Z: u8 = 0x80; // Zero
const FLAG_N: u8 = 0x40; // Subtract
const FLAG_H: u8 = 0x20; // Half Carry
const FLAG_C: u8 = 0x10; // Carry

// Post-boot CPU state from gbdev.io/pandocs/Power_Up_State.html
const BOOT_PC: u16 = 0x0100;
const BOOT_SP: u16 = 0xFFFE;

// (AF, BC, DE, HL)
const DMG0_BOOT_REGS: (u16, u16, u16, u16) = (0x0100, 0xFF13, 0x00C1, 0x8403);
const DMG_ABC_BOOT_REGS: (u16, u16, u16, u16) = (0x01B0, 0x0013, 0x00D8, 0x014D);
const CGB_BOOT_REGS: (u16, u16, u16, u16) = (0x1180, 0x0000, 0xFF56, 0x000D);

const M_CYCLE: u32 = 4;
const INTERRUPT_DISPATCH_CYCLES: u32 = 20;
const SPEED_SWITCH_CYCLES: u32 = 8200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunMode {
    Running,
    Halted,
    Stopped,
    /// HALT with IME clear and an interrupt already pending: the next opcode
    /// byte is read twice.
    HaltBug,
    /// An undefined opcode hung the processor.
    Locked,
}

pub struct Cpu {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: u16,
    pub sp: u16,
    pub ime: bool,
    pub mode: RunMode,
    ime_enable_delay: u8,
}

impl Cpu {
    /// Zeroed registers at address 0, for running a boot ROM.
    pub fn power_on() -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            pc: 0x0000,
            sp: 0x0000,
            ime: false,
            mode: RunMode::Running,
            ime_enable_delay: 0,
        }
    }

    /// Registers as the boot ROM leaves them for the given model.
    pub fn post_boot(model: Model, dmg_revision: DmgRevision) -> Self {
        let (af, bc, de, hl) = match (model, dmg_revision) {
            (Model::Cgb, _) => CGB_BOOT_REGS,
            (Model::Dmg, DmgRevision::Rev0) => DMG0_BOOT_REGS,
            (Model::Dmg, _) => DMG_ABC_BOOT_REGS,
        };
        let mut cpu = Self::power_on();
        cpu.set_reg16(Reg16::AF, af);
        cpu.set_reg16(Reg16::BC, bc);
        cpu.set_reg16(Reg16::DE, de);
        cpu.set_reg16(Reg16::HL, hl);
        cpu.pc = BOOT_PC;
        cpu.sp = BOOT_SP;
        cpu
    }

    pub fn af(&self) -> u16 {
        self.reg16(Reg16::AF)
    }

    pub fn bc(&self) -> u16 {
        self.reg16(Reg16::BC)
    }

    pub fn de(&self) -> u16 {
        self.reg16(Reg16::DE)
    }

    pub fn hl(&self) -> u16 {
        self.reg16(Reg16::HL)
    }

    /// Formatted CPU state string for debugging.
    pub fn debug_state(&self) -> String {
        format!(
            "AF:{:04X} BC:{:04X} DE:{:04X} HL:{:04X} PC:{:04X} SP:{:04X} IME:{} {:?}",
            self.af(),
            self.bc(),
            self.de(),
            self.hl(),
            self.pc,
            self.sp,
            u8::from(self.ime),
            self.mode
        )
    }

    fn reg(&self, r: Reg8) -> u8 {
        match r {
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
            Reg8::A => self.a,
        }
    }

    fn set_reg(&mut self, r: Reg8, val: u8) {
        match r {
            Reg8::B => self.b = val,
            Reg8::C => self.c = val,
            Reg8::D => self.d = val,
            Reg8::E => self.e = val,
            Reg8::H => self.h = val,
            Reg8::L => self.l = val,
            Reg8::A => self.a = val,
        }
    }

    fn reg16(&self, r: Reg16) -> u16 {
        let pair = |hi: u8, lo: u8| (u16::from(hi) << 8) | u16::from(lo);
        match r {
            Reg16::BC => pair(self.b, self.c),
            Reg16::DE => pair(self.d, self.e),
            Reg16::HL => pair(self.h, self.l),
            Reg16::SP => self.sp,
            Reg16::AF => pair(self.a, self.f),
        }
    }

    fn set_reg16(&mut self, r: Reg16, val: u16) {
        let hi = (val >> 8) as u8;
        let lo = val as u8;
        match r {
            Reg16::BC => (self.b, self.c) = (hi, lo),
            Reg16::DE => (self.d, self.e) = (hi, lo),
            Reg16::HL => (self.h, self.l) = (hi, lo),
            Reg16::SP => self.sp = val,
            // The low nibble of F does not exist.
            Reg16::AF => (self.a, self.f) = (hi, lo & 0xF0),
        }
    }

    fn flag(&self, mask: u8) -> bool {
        self.f & mask != 0
    }

    fn set_flags(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.f = if z { FLAG_Z } else { 0 }
            | if n { FLAG_N } else { 0 }
            | if h { FLAG_H } else { 0 }
            | if c { FLAG_C } else { 0 };
    }

    fn condition(&self, cond: Cond) -> bool {
        match cond {
            Cond::Always => true,
            Cond::Nz => !self.flag(FLAG_Z),
            Cond::Z => self.flag(FLAG_Z),
            Cond::Nc => !self.flag(FLAG_C),
            Cond::C => self.flag(FLAG_C),
        }
    }

    fn fetch8(&mut self, mmu: &mut Mmu) -> u8 {
        let val = mmu.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        val
    }

    fn fetch16(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = u16::from(self.fetch8(mmu));
        let hi = u16::from(self.fetch8(mmu));
        (hi << 8) | lo
    }

    fn push_stack(&mut self, mmu: &mut Mmu, val: u16) {
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, (val >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, val as u8);
    }

    fn pop_stack(&mut self, mmu: &mut Mmu) -> u16 {
        let lo = u16::from(mmu.read_byte(self.sp));
        self.sp = self.sp.wrapping_add(1);
        let hi = u16::from(mmu.read_byte(self.sp));
        self.sp = self.sp.wrapping_add(1);
        (hi << 8) | lo
    }

    fn read_operand(&mut self, mmu: &mut Mmu, operand: Operand8) -> u8 {
        match operand {
            Operand8::Reg(r) => self.reg(r),
            Operand8::Imm => self.fetch8(mmu),
            Operand8::IndHl => mmu.read_byte(self.hl()),
            Operand8::IndBc => mmu.read_byte(self.bc()),
            Operand8::IndDe => mmu.read_byte(self.de()),
            Operand8::IndHli | Operand8::IndHld => {
                let addr = self.step_hl(operand);
                mmu.read_byte(addr)
            }
            Operand8::IndImm16 => {
                let addr = self.fetch16(mmu);
                mmu.read_byte(addr)
            }
            Operand8::HighImm => {
                let offset = self.fetch8(mmu);
                mmu.read_byte(0xFF00 | u16::from(offset))
            }
            Operand8::HighC => mmu.read_byte(0xFF00 | u16::from(self.c)),
        }
    }

    fn write_operand(&mut self, mmu: &mut Mmu, operand: Operand8, val: u8) {
        match operand {
            Operand8::Reg(r) => self.set_reg(r, val),
            Operand8::IndHl => mmu.write_byte(self.hl(), val),
            Operand8::IndBc => mmu.write_byte(self.bc(), val),
            Operand8::IndDe => mmu.write_byte(self.de(), val),
            Operand8::IndHli | Operand8::IndHld => {
                let addr = self.step_hl(operand);
                mmu.write_byte(addr, val);
            }
            Operand8::IndImm16 => {
                let addr = self.fetch16(mmu);
                mmu.write_byte(addr, val);
            }
            Operand8::HighImm => {
                let offset = self.fetch8(mmu);
                mmu.write_byte(0xFF00 | u16::from(offset), val);
            }
            Operand8::HighC => mmu.write_byte(0xFF00 | u16::from(self.c), val),
            Operand8::Imm => unreachable!("immediate operand used as destination"),
        }
    }

    /// Returns HL and applies the post-increment/decrement of (HL+)/(HL-).
    fn step_hl(&mut self, operand: Operand8) -> u16 {
        let hl = self.hl();
        let next = if operand == Operand8::IndHli {
            hl.wrapping_add(1)
        } else {
            hl.wrapping_sub(1)
        };
        self.set_reg16(Reg16::HL, next);
        hl
    }

    /// Executes one instruction, interrupt dispatch or idle M-cycle and
    /// returns the main-clock cycles it took.
    pub fn step(&mut self, mmu: &mut Mmu) -> u32 {
        let stall = mmu.take_stall_cycles();
        if stall > 0 {
            return stall;
        }

        match self.mode {
            RunMode::Locked => return M_CYCLE,
            RunMode::Stopped => {
                if mmu.joypad.any_pressed() {
                    self.mode = RunMode::Running;
                }
                return M_CYCLE;
            }
            RunMode::Halted => {
                if !mmu.interrupts.has_pending() {
                    return M_CYCLE;
                }
                self.mode = RunMode::Running;
                if !self.ime {
                    return M_CYCLE;
                }
                return self.dispatch_interrupt(mmu) + M_CYCLE;
            }
            RunMode::Running | RunMode::HaltBug => {}
        }

        if self.ime && mmu.interrupts.has_pending() {
            return self.dispatch_interrupt(mmu);
        }

        let enable_after = self.ime_enable_delay == 1;

        let start_pc = self.pc;
        let halt_bug = self.mode == RunMode::HaltBug;

        let opcode = if halt_bug {
            self.mode = RunMode::Running;
            mmu.read_byte(self.pc)
        } else {
            self.fetch8(mmu)
        };

        let mut entry = &BASE[opcode as usize];
        if entry.op == Op::Prefix {
            let cb = self.fetch8(mmu);
            entry = &CB[cb as usize];
        }

        #[cfg(feature = "cpu-trace")]
        log::trace!(
            "{:04X}: {:02X} {:?} {}",
            start_pc,
            opcode,
            entry.op,
            self.debug_state()
        );

        let cycles = self.execute(entry, opcode, mmu);

        // Every operand byte goes through a fetch, so straight-line code
        // moves PC by exactly the encoded length.
        if !entry.op.transfers_control() {
            debug_assert_eq!(
                self.pc.wrapping_sub(start_pc),
                u16::from(entry.length) - u16::from(halt_bug),
                "{:?} at {:04X}",
                entry.op,
                start_pc
            );
        }

        if enable_after && self.ime_enable_delay > 0 {
            self.ime = true;
        }
        if self.ime_enable_delay > 0 {
            self.ime_enable_delay -= 1;
        }
        cycles
    }

    fn dispatch_interrupt(&mut self, mmu: &mut Mmu) -> u32 {
        self.ime = false;
        self.ime_enable_delay = 0;
        let return_pc = self.pc;

        // The upper-byte push may land on IE and change which interrupt, if
        // any, gets serviced.
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, (return_pc >> 8) as u8);
        let target = mmu.interrupts.next_pending();
        self.sp = self.sp.wrapping_sub(1);
        mmu.write_byte(self.sp, return_pc as u8);

        match target {
            Some(interrupt) => {
                mmu.interrupts.acknowledge(interrupt);
                self.pc = interrupt.vector();
            }
            None => self.pc = 0x0000,
        }
        INTERRUPT_DISPATCH_CYCLES
    }

    fn execute(&mut self, entry: &Opcode, opcode: u8, mmu: &mut Mmu) -> u32 {
        let taken = u32::from(entry.branch_cycles);
        let not_taken = u32::from(entry.cycles);
        match entry.op {
            Op::Nop => {}
            Op::Ld8(dst, src) => {
                let val = self.read_operand(mmu, src);
                self.write_operand(mmu, dst, val);
            }
            Op::Ld16Imm(r) => {
                let val = self.fetch16(mmu);
                self.set_reg16(r, val);
            }
            Op::LdImm16Sp => {
                let addr = self.fetch16(mmu);
                mmu.write_byte(addr, self.sp as u8);
                mmu.write_byte(addr.wrapping_add(1), (self.sp >> 8) as u8);
            }
            Op::LdSpHl => self.sp = self.hl(),
            Op::LdHlSpOffset => {
                let val = self.add_sp_offset(mmu);
                self.set_reg16(Reg16::HL, val);
            }
            Op::AddSpOffset => self.sp = self.add_sp_offset(mmu),
            Op::Push(r) => {
                let val = self.reg16(r);
                self.push_stack(mmu, val);
            }
            Op::Pop(r) => {
                let val = self.pop_stack(mmu);
                self.set_reg16(r, val);
            }
            Op::Alu(op, operand) => {
                let val = self.read_operand(mmu, operand);
                self.alu(op, val);
            }
            Op::Inc8(operand) => {
                let val = self.read_operand(mmu, operand);
                let res = val.wrapping_add(1);
                self.set_flags(res == 0, false, val & 0x0F == 0x0F, self.flag(FLAG_C));
                self.write_operand(mmu, operand, res);
            }
            Op::Dec8(operand) => {
                let val = self.read_operand(mmu, operand);
                let res = val.wrapping_sub(1);
                self.set_flags(res == 0, true, val & 0x0F == 0, self.flag(FLAG_C));
                self.write_operand(mmu, operand, res);
            }
            Op::Inc16(r) => {
                let val = self.reg16(r).wrapping_add(1);
                self.set_reg16(r, val);
            }
            Op::Dec16(r) => {
                let val = self.reg16(r).wrapping_sub(1);
                self.set_reg16(r, val);
            }
            Op::AddHl(r) => {
                let hl = self.hl();
                let val = self.reg16(r);
                let (res, carry) = hl.overflowing_add(val);
                let half = (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF;
                self.set_flags(self.flag(FLAG_Z), false, half, carry);
                self.set_reg16(Reg16::HL, res);
            }
            Op::Rlca => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.set_flags(false, false, false, carry);
            }
            Op::Rrca => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.set_flags(false, false, false, carry);
            }
            Op::Rla => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | u8::from(self.flag(FLAG_C));
                self.set_flags(false, false, false, carry);
            }
            Op::Rra => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | (u8::from(self.flag(FLAG_C)) << 7);
                self.set_flags(false, false, false, carry);
            }
            Op::Daa => self.daa(),
            Op::Cpl => {
                self.a = !self.a;
                self.f |= FLAG_N | FLAG_H;
            }
            Op::Scf => self.set_flags(self.flag(FLAG_Z), false, false, true),
            Op::Ccf => self.set_flags(self.flag(FLAG_Z), false, false, !self.flag(FLAG_C)),
            Op::Jp(cond) => {
                let addr = self.fetch16(mmu);
                if self.condition(cond) {
                    self.pc = addr;
                    return taken;
                }
            }
            Op::JpHl => self.pc = self.hl(),
            Op::Jr(cond) => {
                let offset = self.fetch8(mmu) as i8;
                if self.condition(cond) {
                    self.pc = self.pc.wrapping_add_signed(i16::from(offset));
                    return taken;
                }
            }
            Op::Call(cond) => {
                let addr = self.fetch16(mmu);
                if self.condition(cond) {
                    self.push_stack(mmu, self.pc);
                    self.pc = addr;
                    return taken;
                }
            }
            Op::Ret(cond) => {
                if self.condition(cond) {
                    self.pc = self.pop_stack(mmu);
                    return taken;
                }
            }
            Op::Reti => {
                self.pc = self.pop_stack(mmu);
                self.ime = true;
            }
            Op::Rst(vector) => {
                self.push_stack(mmu, self.pc);
                self.pc = u16::from(vector);
            }
            Op::Halt => self.halt(mmu),
            Op::Stop => return self.stop(mmu).unwrap_or(not_taken),
            Op::Di => {
                self.ime = false;
                self.ime_enable_delay = 0;
            }
            Op::Ei => {
                if !self.ime {
                    self.ime_enable_delay = 2;
                }
            }
            Op::Illegal => {
                log::warn!(
                    "illegal opcode {:02X} at {:04X}, locking up",
                    opcode,
                    self.pc.wrapping_sub(1)
                );
                self.mode = RunMode::Locked;
            }
            Op::Prefix => unreachable!("CB prefix resolved before execute"),
            Op::Rot(op, operand) => {
                let val = self.read_operand(mmu, operand);
                let res = self.rotate(op, val);
                self.write_operand(mmu, operand, res);
            }
            Op::Bit(bit, operand) => {
                let val = self.read_operand(mmu, operand);
                self.set_flags(val & (1 << bit) == 0, false, true, self.flag(FLAG_C));
            }
            Op::Res(bit, operand) => {
                let val = self.read_operand(mmu, operand);
                self.write_operand(mmu, operand, val & !(1 << bit));
            }
            Op::Set(bit, operand) => {
                let val = self.read_operand(mmu, operand);
                self.write_operand(mmu, operand, val | (1 << bit));
            }
        }
        not_taken
    }

    fn alu(&mut self, op: AluOp, val: u8) {
        let a = self.a;
        let carry_in = u8::from(self.flag(FLAG_C));
        match op {
            AluOp::Add | AluOp::Adc => {
                let c = if op == AluOp::Adc { carry_in } else { 0 };
                let sum = u16::from(a) + u16::from(val) + u16::from(c);
                let half = (a & 0x0F) + (val & 0x0F) + c > 0x0F;
                self.a = sum as u8;
                self.set_flags(self.a == 0, false, half, sum > 0xFF);
            }
            AluOp::Sub | AluOp::Sbc | AluOp::Cp => {
                let c = if op == AluOp::Sbc { carry_in } else { 0 };
                let res = a.wrapping_sub(val).wrapping_sub(c);
                let half = (a & 0x0F) < (val & 0x0F) + c;
                let borrow = u16::from(a) < u16::from(val) + u16::from(c);
                self.set_flags(res == 0, true, half, borrow);
                if op != AluOp::Cp {
                    self.a = res;
                }
            }
            AluOp::And => {
                self.a &= val;
                self.set_flags(self.a == 0, false, true, false);
            }
            AluOp::Xor => {
                self.a ^= val;
                self.set_flags(self.a == 0, false, false, false);
            }
            AluOp::Or => {
                self.a |= val;
                self.set_flags(self.a == 0, false, false, false);
            }
        }
    }

    fn rotate(&mut self, op: RotOp, val: u8) -> u8 {
        let carry_in = u8::from(self.flag(FLAG_C));
        let (res, carry) = match op {
            RotOp::Rlc => (val.rotate_left(1), val & 0x80 != 0),
            RotOp::Rrc => (val.rotate_right(1), val & 0x01 != 0),
            RotOp::Rl => ((val << 1) | carry_in, val & 0x80 != 0),
            RotOp::Rr => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            RotOp::Sla => (val << 1, val & 0x80 != 0),
            RotOp::Sra => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            RotOp::Swap => (val.rotate_left(4), false),
            RotOp::Srl => (val >> 1, val & 0x01 != 0),
        };
        self.set_flags(res == 0, false, false, carry);
        res
    }

    /// Shared by `ADD SP,e8` and `LD HL,SP+e8`: H and C come from the low byte.
    fn add_sp_offset(&mut self, mmu: &mut Mmu) -> u16 {
        let offset = self.fetch8(mmu) as i8 as i16 as u16;
        let sp = self.sp;
        let half = (sp & 0x0F) + (offset & 0x0F) > 0x0F;
        let carry = (sp & 0xFF) + (offset & 0xFF) > 0xFF;
        self.set_flags(false, false, half, carry);
        sp.wrapping_add(offset)
    }

    fn daa(&mut self) {
        let subtract = self.flag(FLAG_N);
        let mut correction = 0u8;
        let mut carry = false;
        if self.flag(FLAG_H) || (!subtract && (self.a & 0x0F) > 9) {
            correction |= 0x06;
        }
        if self.flag(FLAG_C) || (!subtract && self.a > 0x99) {
            correction |= 0x60;
            carry = true;
        }
        self.a = if subtract {
            self.a.wrapping_sub(correction)
        } else {
            self.a.wrapping_add(correction)
        };
        self.set_flags(self.a == 0, subtract, false, carry);
    }

    fn halt(&mut self, mmu: &mut Mmu) {
        let pending = mmu.interrupts.has_pending();
        if self.ime_enable_delay > 0 && pending {
            // EI; HALT with an interrupt waiting: the interrupt is serviced
            // first and returns to the HALT.
            self.pc = self.pc.wrapping_sub(1);
        } else if !self.ime && pending {
            self.mode = RunMode::HaltBug;
        } else {
            self.mode = RunMode::Halted;
        }
    }

    /// Returns the cycle cost when STOP performed a speed switch.
    fn stop(&mut self, mmu: &mut Mmu) -> Option<u32> {
        self.pc = self.pc.wrapping_add(1);
        mmu.reset_div();
        if mmu.speed_switch_armed() {
            mmu.switch_speed();
            return Some(SPEED_SWITCH_CYCLES);
        }
        self.mode = RunMode::Stopped;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu() -> Cpu {
        Cpu::post_boot(Model::Dmg, DmgRevision::default())
    }

    #[test]
    fn post_boot_registers_per_model() {
        let dmg = cpu();
        assert_eq!((dmg.af(), dmg.bc(), dmg.de(), dmg.hl()), (0x01B0, 0x0013, 0x00D8, 0x014D));
        let rev0 = Cpu::post_boot(Model::Dmg, DmgRevision::Rev0);
        assert_eq!((rev0.af(), rev0.bc(), rev0.de(), rev0.hl()), (0x0100, 0xFF13, 0x00C1, 0x8403));
        let cgb = Cpu::post_boot(Model::Cgb, DmgRevision::default());
        assert_eq!((cgb.af(), cgb.bc(), cgb.de(), cgb.hl()), (0x1180, 0x0000, 0xFF56, 0x000D));
        assert_eq!((cgb.pc, cgb.sp), (0x0100, 0xFFFE));
    }

    #[test]
    fn pop_af_masks_low_nibble() {
        let mut c = cpu();
        c.set_reg16(Reg16::AF, 0x12FF);
        assert_eq!(c.af(), 0x12F0);
    }

    #[test]
    fn add_sets_half_and_full_carry() {
        let mut c = cpu();
        c.a = 0x8F;
        c.alu(AluOp::Add, 0x81);
        assert_eq!(c.a, 0x10);
        assert_eq!(c.f, FLAG_H | FLAG_C);
    }

    #[test]
    fn adc_and_sbc_use_carry() {
        let mut c = cpu();
        c.a = 0x0F;
        c.f = FLAG_C;
        c.alu(AluOp::Adc, 0x00);
        assert_eq!(c.a, 0x10);
        assert_eq!(c.f, FLAG_H);

        c.a = 0x10;
        c.f = FLAG_C;
        c.alu(AluOp::Sbc, 0x0F);
        assert_eq!(c.a, 0x00);
        assert_eq!(c.f, FLAG_Z | FLAG_N | FLAG_H);
    }

    #[test]
    fn cp_leaves_a_untouched() {
        let mut c = cpu();
        c.a = 0x3C;
        c.alu(AluOp::Cp, 0x40);
        assert_eq!(c.a, 0x3C);
        assert_eq!(c.f, FLAG_N | FLAG_C);
    }

    #[test]
    fn daa_after_bcd_add() {
        let mut c = cpu();
        c.a = 0x45;
        c.alu(AluOp::Add, 0x38);
        c.daa();
        assert_eq!(c.a, 0x83);
        assert!(!c.flag(FLAG_C));

        c.a = 0x99;
        c.alu(AluOp::Add, 0x01);
        c.daa();
        assert_eq!(c.a, 0x00);
        assert_eq!(c.f, FLAG_Z | FLAG_C);
    }

    #[test]
    fn daa_after_bcd_sub() {
        let mut c = cpu();
        c.a = 0x42;
        c.alu(AluOp::Sub, 0x15);
        c.daa();
        assert_eq!(c.a, 0x27);
        assert!(c.flag(FLAG_N));
    }

    #[test]
    fn rotates_through_carry() {
        let mut c = cpu();
        c.f = 0;
        assert_eq!(c.rotate(RotOp::Rl, 0x80), 0x00);
        assert_eq!(c.f, FLAG_Z | FLAG_C);
        assert_eq!(c.rotate(RotOp::Rr, 0x00), 0x80);
        assert_eq!(c.f, 0);
        assert_eq!(c.rotate(RotOp::Sra, 0x81), 0xC0);
        assert_eq!(c.f, FLAG_C);
        assert_eq!(c.rotate(RotOp::Swap, 0xF1), 0x1F);
        assert_eq!(c.f, 0);
    }
}
