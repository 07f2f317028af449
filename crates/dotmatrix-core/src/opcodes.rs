//! Static decode tables for the SM83 instruction set.
//!
//! Both tables are built at compile time from the regular bit layout of the
//! opcode byte (`xx yyy zzz`). Each entry records what the instruction does,
//! how many bytes it occupies and how many main-clock cycles it takes.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
}

/// Source or destination of an 8-bit transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand8 {
    Reg(Reg8),
    /// (HL)
    IndHl,
    /// d8
    Imm,
    /// (BC)
    IndBc,
    /// (DE)
    IndDe,
    /// (HL+)
    IndHli,
    /// (HL-)
    IndHld,
    /// (a16)
    IndImm16,
    /// (0xFF00 + a8)
    HighImm,
    /// (0xFF00 + C)
    HighC,
}

impl Operand8 {
    /// True when the operand goes through the memory bus.
    pub const fn is_memory(self) -> bool {
        !matches!(self, Operand8::Reg(_) | Operand8::Imm)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
    AF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cond {
    Always,
    Nz,
    Z,
    Nc,
    C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

/// CB-prefixed rotates and shifts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Nop,
    Ld8(Operand8, Operand8),
    Ld16Imm(Reg16),
    LdImm16Sp,
    LdSpHl,
    LdHlSpOffset,
    Push(Reg16),
    Pop(Reg16),
    Alu(AluOp, Operand8),
    Inc8(Operand8),
    Dec8(Operand8),
    Inc16(Reg16),
    Dec16(Reg16),
    AddHl(Reg16),
    AddSpOffset,
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    Jp(Cond),
    JpHl,
    Jr(Cond),
    Call(Cond),
    Ret(Cond),
    Reti,
    Rst(u8),
    Halt,
    Stop,
    Di,
    Ei,
    /// 0xCB: the real instruction comes from [`CB`].
    Prefix,
    Illegal,
    Rot(RotOp, Operand8),
    Bit(u8, Operand8),
    Res(u8, Operand8),
    Set(u8, Operand8),
}

impl Op {
    /// True for instructions that can load PC with something other than the
    /// address of the next instruction.
    pub const fn transfers_control(self) -> bool {
        matches!(
            self,
            Op::Jp(_) | Op::JpHl | Op::Jr(_) | Op::Call(_) | Op::Ret(_) | Op::Reti | Op::Rst(_)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Opcode {
    pub op: Op,
    /// Encoded length in bytes, prefix included for CB entries.
    pub length: u8,
    /// Cycles when a conditional branch is not taken, or the only count.
    pub cycles: u8,
    /// Cycles when a conditional branch is taken.
    pub branch_cycles: u8,
}

impl Opcode {
    const fn new(op: Op, length: u8, cycles: u8) -> Self {
        Self {
            op,
            length,
            cycles,
            branch_cycles: cycles,
        }
    }

    const fn branch(op: Op, length: u8, cycles: u8, taken: u8) -> Self {
        Self {
            op,
            length,
            cycles,
            branch_cycles: taken,
        }
    }
}

pub static BASE: [Opcode; 256] = build_base();
pub static CB: [Opcode; 256] = build_cb();

const fn r8(index: u8) -> Operand8 {
    match index & 7 {
        0 => Operand8::Reg(Reg8::B),
        1 => Operand8::Reg(Reg8::C),
        2 => Operand8::Reg(Reg8::D),
        3 => Operand8::Reg(Reg8::E),
        4 => Operand8::Reg(Reg8::H),
        5 => Operand8::Reg(Reg8::L),
        6 => Operand8::IndHl,
        _ => Operand8::Reg(Reg8::A),
    }
}

const fn rp(index: u8) -> Reg16 {
    match index & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::SP,
    }
}

const fn rp2(index: u8) -> Reg16 {
    match index & 3 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::AF,
    }
}

const fn cond(index: u8) -> Cond {
    match index & 3 {
        0 => Cond::Nz,
        1 => Cond::Z,
        2 => Cond::Nc,
        _ => Cond::C,
    }
}

const fn alu(index: u8) -> AluOp {
    match index & 7 {
        0 => AluOp::Add,
        1 => AluOp::Adc,
        2 => AluOp::Sub,
        3 => AluOp::Sbc,
        4 => AluOp::And,
        5 => AluOp::Xor,
        6 => AluOp::Or,
        _ => AluOp::Cp,
    }
}

const fn rot(index: u8) -> RotOp {
    match index & 7 {
        0 => RotOp::Rlc,
        1 => RotOp::Rrc,
        2 => RotOp::Rl,
        3 => RotOp::Rr,
        4 => RotOp::Sla,
        5 => RotOp::Sra,
        6 => RotOp::Swap,
        _ => RotOp::Srl,
    }
}

/// 4 cycles for a register operand, `mem` when it is (HL).
const fn reg_or_mem(operand: Operand8, reg: u8, mem: u8) -> u8 {
    if operand.is_memory() { mem } else { reg }
}

const fn decode_base(code: u8) -> Opcode {
    let x = code >> 6;
    let y = (code >> 3) & 7;
    let z = code & 7;
    let p = y >> 1;
    let q = y & 1;

    match x {
        0 => match z {
            0 => match y {
                0 => Opcode::new(Op::Nop, 1, 4),
                1 => Opcode::new(Op::LdImm16Sp, 3, 20),
                2 => Opcode::new(Op::Stop, 2, 4),
                3 => Opcode::new(Op::Jr(Cond::Always), 2, 12),
                _ => Opcode::branch(Op::Jr(cond(y - 4)), 2, 8, 12),
            },
            1 => {
                if q == 0 {
                    Opcode::new(Op::Ld16Imm(rp(p)), 3, 12)
                } else {
                    Opcode::new(Op::AddHl(rp(p)), 1, 8)
                }
            }
            2 => {
                let mem = match p {
                    0 => Operand8::IndBc,
                    1 => Operand8::IndDe,
                    2 => Operand8::IndHli,
                    _ => Operand8::IndHld,
                };
                let a = Operand8::Reg(Reg8::A);
                if q == 0 {
                    Opcode::new(Op::Ld8(mem, a), 1, 8)
                } else {
                    Opcode::new(Op::Ld8(a, mem), 1, 8)
                }
            }
            3 => {
                if q == 0 {
                    Opcode::new(Op::Inc16(rp(p)), 1, 8)
                } else {
                    Opcode::new(Op::Dec16(rp(p)), 1, 8)
                }
            }
            4 => Opcode::new(Op::Inc8(r8(y)), 1, reg_or_mem(r8(y), 4, 12)),
            5 => Opcode::new(Op::Dec8(r8(y)), 1, reg_or_mem(r8(y), 4, 12)),
            6 => Opcode::new(
                Op::Ld8(r8(y), Operand8::Imm),
                2,
                reg_or_mem(r8(y), 8, 12),
            ),
            _ => {
                let op = match y {
                    0 => Op::Rlca,
                    1 => Op::Rrca,
                    2 => Op::Rla,
                    3 => Op::Rra,
                    4 => Op::Daa,
                    5 => Op::Cpl,
                    6 => Op::Scf,
                    _ => Op::Ccf,
                };
                Opcode::new(op, 1, 4)
            }
        },
        1 => {
            if y == 6 && z == 6 {
                Opcode::new(Op::Halt, 1, 4)
            } else {
                let mem = r8(y).is_memory() || r8(z).is_memory();
                Opcode::new(Op::Ld8(r8(y), r8(z)), 1, if mem { 8 } else { 4 })
            }
        }
        2 => Opcode::new(Op::Alu(alu(y), r8(z)), 1, reg_or_mem(r8(z), 4, 8)),
        _ => match z {
            0 => match y {
                0..=3 => Opcode::branch(Op::Ret(cond(y)), 1, 8, 20),
                4 => Opcode::new(Op::Ld8(Operand8::HighImm, Operand8::Reg(Reg8::A)), 2, 12),
                5 => Opcode::new(Op::AddSpOffset, 2, 16),
                6 => Opcode::new(Op::Ld8(Operand8::Reg(Reg8::A), Operand8::HighImm), 2, 12),
                _ => Opcode::new(Op::LdHlSpOffset, 2, 12),
            },
            1 => {
                if q == 0 {
                    Opcode::new(Op::Pop(rp2(p)), 1, 12)
                } else {
                    match p {
                        0 => Opcode::new(Op::Ret(Cond::Always), 1, 16),
                        1 => Opcode::new(Op::Reti, 1, 16),
                        2 => Opcode::new(Op::JpHl, 1, 4),
                        _ => Opcode::new(Op::LdSpHl, 1, 8),
                    }
                }
            }
            2 => match y {
                0..=3 => Opcode::branch(Op::Jp(cond(y)), 3, 12, 16),
                4 => Opcode::new(Op::Ld8(Operand8::HighC, Operand8::Reg(Reg8::A)), 1, 8),
                5 => Opcode::new(Op::Ld8(Operand8::IndImm16, Operand8::Reg(Reg8::A)), 3, 16),
                6 => Opcode::new(Op::Ld8(Operand8::Reg(Reg8::A), Operand8::HighC), 1, 8),
                _ => Opcode::new(Op::Ld8(Operand8::Reg(Reg8::A), Operand8::IndImm16), 3, 16),
            },
            3 => match y {
                0 => Opcode::new(Op::Jp(Cond::Always), 3, 16),
                1 => Opcode::new(Op::Prefix, 1, 4),
                6 => Opcode::new(Op::Di, 1, 4),
                7 => Opcode::new(Op::Ei, 1, 4),
                _ => Opcode::new(Op::Illegal, 1, 4),
            },
            4 => match y {
                0..=3 => Opcode::branch(Op::Call(cond(y)), 3, 12, 24),
                _ => Opcode::new(Op::Illegal, 1, 4),
            },
            5 => {
                if q == 0 {
                    Opcode::new(Op::Push(rp2(p)), 1, 16)
                } else if p == 0 {
                    Opcode::new(Op::Call(Cond::Always), 3, 24)
                } else {
                    Opcode::new(Op::Illegal, 1, 4)
                }
            }
            6 => Opcode::new(Op::Alu(alu(y), Operand8::Imm), 2, 8),
            _ => Opcode::new(Op::Rst(y * 8), 1, 16),
        },
    }
}

const fn decode_cb(code: u8) -> Opcode {
    let y = (code >> 3) & 7;
    let operand = r8(code);
    match code >> 6 {
        0 => Opcode::new(Op::Rot(rot(y), operand), 2, reg_or_mem(operand, 8, 16)),
        1 => Opcode::new(Op::Bit(y, operand), 2, reg_or_mem(operand, 8, 12)),
        2 => Opcode::new(Op::Res(y, operand), 2, reg_or_mem(operand, 8, 16)),
        _ => Opcode::new(Op::Set(y, operand), 2, reg_or_mem(operand, 8, 16)),
    }
}

const fn build_base() -> [Opcode; 256] {
    let mut table = [Opcode::new(Op::Nop, 1, 4); 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode_base(i as u8);
        i += 1;
    }
    table
}

const fn build_cb() -> [Opcode; 256] {
    let mut table = [Opcode::new(Op::Nop, 2, 8); 256];
    let mut i = 0;
    while i < 256 {
        table[i] = decode_cb(i as u8);
        i += 1;
    }
    table
}
