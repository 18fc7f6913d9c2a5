//! Opcode decode tables for the base and 0xCB-prefixed sets. The regular
//! 0x40-0xBF block decodes arithmetically; everything else is spelled out.

use crate::hardware::cpu::registers::Reg8;
use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;

/// Memory-flavored operands an instruction can name.
#[derive(Debug, Copy, Clone)]
pub enum InstructionAddress {
    /// (BC)
    BcIndirect,
    /// (DE)
    DeIndirect,
    /// (HL)
    HlIndirect,
    /// (HL+), post-increment
    HlIndirectInc,
    /// (HL-), post-decrement
    HlIndirectDec,
    /// Immediate operand byte/word
    Immediate,
    /// Memory at an immediate 16-bit address
    ImmediateIndirect,
    /// 0xFF00 + immediate byte
    HighImmediate,
    /// 0xFF00 + C
    HighC,
}

/// Either a plain register or a memory operand; what the regular decode
/// grid produces.
#[derive(Debug, Copy, Clone)]
pub enum Operand {
    Register(Reg8),
    Address(InstructionAddress),
}

#[derive(Debug, Copy, Clone)]
pub enum JumpCondition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
    Always,
}

/// Operand column for the regular grid: B C D E H L (HL) A.
pub fn decode_column(opcode: u8) -> Operand {
    match opcode & 0x07 {
        0x0 => Operand::Register(Reg8::B),
        0x1 => Operand::Register(Reg8::C),
        0x2 => Operand::Register(Reg8::D),
        0x3 => Operand::Register(Reg8::E),
        0x4 => Operand::Register(Reg8::H),
        0x5 => Operand::Register(Reg8::L),
        0x6 => Operand::Address(InstructionAddress::HlIndirect),
        _ => Operand::Register(Reg8::A),
    }
}

/// Destination row for the 0x40-0x7F load block.
pub fn decode_row(opcode: u8) -> Operand {
    match (opcode - 0x40) >> 3 {
        0x0 => Operand::Register(Reg8::B),
        0x1 => Operand::Register(Reg8::C),
        0x2 => Operand::Register(Reg8::D),
        0x3 => Operand::Register(Reg8::E),
        0x4 => Operand::Register(Reg8::H),
        0x5 => Operand::Register(Reg8::L),
        0x6 => Operand::Address(InstructionAddress::HlIndirect),
        _ => Operand::Register(Reg8::A),
    }
}

/// Bit number encoded in a prefixed BIT/RES/SET opcode.
pub fn decode_bit(opcode: u8) -> u8 {
    (opcode >> 3) & 0x07
}

impl<M: MemoryMapper> Cpu<M> {
    pub fn execute(&mut self, opcode: u8) {
        use crate::hardware::cpu::registers::Reg16::*;
        use crate::hardware::cpu::registers::Reg8::*;
        use InstructionAddress::*;
        use JumpCondition::*;

        match opcode {
            0x00 => self.nop(),
            0x01 => self.load_16bit(BC, Immediate),
            0x02 => self.load_8bit(BcIndirect, A),
            0x03 => self.increment16(BC),
            0x04 => self.increment(B),
            0x05 => self.decrement(B),
            0x06 => self.load_8bit(B, Immediate),
            0x07 => self.rlca(),
            0x08 => self.load_16bit(ImmediateIndirect, SP),
            0x09 => self.add16(BC),
            0x0A => self.load_8bit(A, BcIndirect),
            0x0B => self.decrement16(BC),
            0x0C => self.increment(C),
            0x0D => self.decrement(C),
            0x0E => self.load_8bit(C, Immediate),
            0x0F => self.rrca(),
            0x10 => self.stop(),
            0x11 => self.load_16bit(DE, Immediate),
            0x12 => self.load_8bit(DeIndirect, A),
            0x13 => self.increment16(DE),
            0x14 => self.increment(D),
            0x15 => self.decrement(D),
            0x16 => self.load_8bit(D, Immediate),
            0x17 => self.rla(),
            0x18 => self.relative_jump(Always),
            0x19 => self.add16(DE),
            0x1A => self.load_8bit(A, DeIndirect),
            0x1B => self.decrement16(DE),
            0x1C => self.increment(E),
            0x1D => self.decrement(E),
            0x1E => self.load_8bit(E, Immediate),
            0x1F => self.rra(),
            0x20 => self.relative_jump(NotZero),
            0x21 => self.load_16bit(HL, Immediate),
            0x22 => self.load_8bit(HlIndirectInc, A),
            0x23 => self.increment16(HL),
            0x24 => self.increment(H),
            0x25 => self.decrement(H),
            0x26 => self.load_8bit(H, Immediate),
            0x27 => self.daa(),
            0x28 => self.relative_jump(Zero),
            0x29 => self.add16(HL),
            0x2A => self.load_8bit(A, HlIndirectInc),
            0x2B => self.decrement16(HL),
            0x2C => self.increment(L),
            0x2D => self.decrement(L),
            0x2E => self.load_8bit(L, Immediate),
            0x2F => self.cpl(),
            0x30 => self.relative_jump(NotCarry),
            0x31 => self.load_16bit(SP, Immediate),
            0x32 => self.load_8bit(HlIndirectDec, A),
            0x33 => self.increment16(SP),
            0x34 => self.increment(HlIndirect),
            0x35 => self.decrement(HlIndirect),
            0x36 => self.load_8bit(HlIndirect, Immediate),
            0x37 => self.scf(),
            0x38 => self.relative_jump(Carry),
            0x39 => self.add16(SP),
            0x3A => self.load_8bit(A, HlIndirectDec),
            0x3B => self.decrement16(SP),
            0x3C => self.increment(A),
            0x3D => self.decrement(A),
            0x3E => self.load_8bit(A, Immediate),
            0x3F => self.ccf(),
            0x76 => self.halt(),
            0x40..=0x7F => self.load_8bit(decode_row(opcode), decode_column(opcode)),
            0x80..=0x87 => self.add(decode_column(opcode)),
            0x88..=0x8F => self.adc(decode_column(opcode)),
            0x90..=0x97 => self.sub(decode_column(opcode)),
            0x98..=0x9F => self.sbc(decode_column(opcode)),
            0xA0..=0xA7 => self.and(decode_column(opcode)),
            0xA8..=0xAF => self.xor(decode_column(opcode)),
            0xB0..=0xB7 => self.or(decode_column(opcode)),
            0xB8..=0xBF => self.compare(decode_column(opcode)),
            0xC0 => self.ret_conditional(NotZero),
            0xC1 => self.pop(BC),
            0xC2 => self.jump(NotZero),
            0xC3 => self.jump(Always),
            0xC4 => self.call(NotZero),
            0xC5 => self.push(BC),
            0xC6 => self.add(Immediate),
            0xC7 => self.rst(0x00),
            0xC8 => self.ret_conditional(Zero),
            0xC9 => self.ret(),
            0xCA => self.jump(Zero),
            0xCB => self.prefixed_call(),
            0xCC => self.call(Zero),
            0xCD => self.call(Always),
            0xCE => self.adc(Immediate),
            0xCF => self.rst(0x08),
            0xD0 => self.ret_conditional(NotCarry),
            0xD1 => self.pop(DE),
            0xD2 => self.jump(NotCarry),
            0xD3 => self.unknown(),
            0xD4 => self.call(NotCarry),
            0xD5 => self.push(DE),
            0xD6 => self.sub(Immediate),
            0xD7 => self.rst(0x10),
            0xD8 => self.ret_conditional(Carry),
            0xD9 => self.reti(),
            0xDA => self.jump(Carry),
            0xDB => self.unknown(),
            0xDC => self.call(Carry),
            0xDD => self.unknown(),
            0xDE => self.sbc(Immediate),
            0xDF => self.rst(0x18),
            0xE0 => self.load_8bit(HighImmediate, A),
            0xE1 => self.pop(HL),
            0xE2 => self.load_8bit(HighC, A),
            0xE3 | 0xE4 => self.unknown(),
            0xE5 => self.push(HL),
            0xE6 => self.and(Immediate),
            0xE7 => self.rst(0x20),
            0xE8 => self.add_sp(),
            0xE9 => self.jump_hl(),
            0xEA => self.load_8bit(ImmediateIndirect, A),
            0xEB..=0xED => self.unknown(),
            0xEE => self.xor(Immediate),
            0xEF => self.rst(0x28),
            0xF0 => self.load_8bit(A, HighImmediate),
            0xF1 => self.pop(AF),
            0xF2 => self.load_8bit(A, HighC),
            0xF3 => self.di(),
            0xF4 => self.unknown(),
            0xF5 => self.push(AF),
            0xF6 => self.or(Immediate),
            0xF7 => self.rst(0x30),
            0xF8 => self.load_hl_sp_offset(),
            0xF9 => self.load_sp_hl(),
            0xFA => self.load_8bit(A, ImmediateIndirect),
            0xFB => self.ei(),
            0xFC | 0xFD => self.unknown(),
            0xFE => self.compare(Immediate),
            0xFF => self.rst(0x38),
        }
    }

    /// Fetch and run the 0xCB-prefixed opcode.
    fn prefixed_call(&mut self) {
        self.opcode = self.get_instr_u8();
        self.execute_prefixed(self.opcode);
    }

    pub(super) fn execute_prefixed(&mut self, opcode: u8) {
        match opcode {
            0x00..=0x07 => self.rlc(decode_column(opcode)),
            0x08..=0x0F => self.rrc(decode_column(opcode)),
            0x10..=0x17 => self.rl(decode_column(opcode)),
            0x18..=0x1F => self.rr(decode_column(opcode)),
            0x20..=0x27 => self.sla(decode_column(opcode)),
            0x28..=0x2F => self.sra(decode_column(opcode)),
            0x30..=0x37 => self.swap(decode_column(opcode)),
            0x38..=0x3F => self.srl(decode_column(opcode)),
            0x40..=0x7F => self.bit(decode_bit(opcode), decode_column(opcode)),
            0x80..=0xBF => self.res(decode_bit(opcode), decode_column(opcode)),
            0xC0..=0xFF => self.set(decode_bit(opcode), decode_column(opcode)),
        }
    }
}
