//! The instruction interpreter. Every memory access pays its four cycles
//! through [`Cpu::add_cycles`], which fans the tick out to the rest of the
//! machine before the access resolves, so component state is always
//! current when the CPU looks at it.

use log::*;

use crate::hardware::cpu::execute::JumpCondition;
use crate::hardware::cpu::registers::{Reg16, Reg8, Registers};
use crate::hardware::cpu::traits::{SetU16, SetU8, ToU16, ToU8};
use crate::hardware::mmu::MemoryMapper;

mod alu;
mod execute;
mod fetch;
pub mod registers;
mod traits;

#[cfg(test)]
mod tests;

pub struct Cpu<M: MemoryMapper> {
    pub registers: Registers,
    pub mmu: M,
    pub cycles_performed: u64,
    opcode: u8,
    /// Interrupt master enable.
    ime: bool,
    halted: bool,
    stopped: bool,
    /// The classic-variant HALT bug: the next opcode byte gets fetched
    /// twice.
    halt_bug: bool,
    /// EI enables IME one instruction late; DI is immediate.
    ei_countdown: u8,
}

impl<M: MemoryMapper> Cpu<M> {
    pub fn new(mmu: M) -> Self {
        let boot_rom_finished = mmu.boot_rom_finished();
        let color = mmu.mode().is_color();

        let mut cpu = Cpu {
            registers: Registers::new(),
            mmu,
            cycles_performed: 0,
            opcode: 0,
            ime: false,
            halted: false,
            stopped: false,
            halt_bug: false,
            ei_countdown: 0,
        };

        if boot_rom_finished {
            // Register state at 0x0100, as the boot ROM leaves it.
            cpu.registers.pc = 0x100;
            cpu.registers.sp = 0xFFFE;
            cpu.registers.set_af(if color { 0x11B0 } else { 0x01B0 });
            cpu.registers.set_bc(0x0013);
            cpu.registers.set_de(0x00D8);
            cpu.registers.set_hl(0x014D);
        }

        cpu
    }

    /// Execute one instruction (or idle for one m-cycle while halted),
    /// then service any pending interrupt.
    pub fn step(&mut self) {
        if self.stopped {
            self.add_cycles();
            if self.mmu.any_key_held() {
                self.stopped = false;
            } else {
                return;
            }
        }

        if self.halted {
            self.add_cycles();
            if self.mmu.interrupts().pending().is_empty() {
                return;
            }
            // Any pending interrupt ends HALT, serviced or not; with IME
            // set the service routine starts right away.
            self.halted = false;
            self.handle_interrupts();
            return;
        }

        self.opcode = self.get_instr_u8();
        if self.halt_bug {
            self.registers.pc = self.registers.pc.wrapping_sub(1);
            self.halt_bug = false;
        }

        #[cfg(feature = "cpu-logging")]
        trace!("Executing 0x{:02X} - {}", self.opcode, self.registers);

        self.execute(self.opcode);

        if self.ei_countdown > 0 {
            self.ei_countdown -= 1;
            if self.ei_countdown == 0 {
                self.ime = true;
            }
        }

        self.handle_interrupts();
    }

    /*
        Instruction implementations. Cycle notes refer to m-cycles beyond
        the opcode fetch and any operand memory traffic.
    */

    fn nop(&mut self) {}

    /// `LD rr,nn` / `LD (nn),SP` / `LD SP,HL` depending on the operands.
    fn load_16bit<T: Copy, U: Copy>(&mut self, destination: T, source: U)
    where
        Self: SetU16<T> + ToU16<U>,
    {
        let value = self.read_u16_value(source);
        self.set_u16_value(destination, value);
    }

    /// `LD` in all its 8-bit forms. Never touches flags.
    fn load_8bit<T: Copy, U: Copy>(&mut self, destination: T, source: U)
    where
        Self: SetU8<T> + ToU8<U>,
    {
        let value = self.read_u8_value(source);
        self.set_u8_value(destination, value);
    }

    /// Flags: `Z0H-`
    fn increment<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value.wrapping_add(1);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(value & 0xF == 0xF);

        self.set_u8_value(target, new_value);
    }

    /// Flags: `Z1H-`
    fn decrement<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value.wrapping_sub(1);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(true);
        self.registers.set_hf(value & 0xF == 0);

        self.set_u8_value(target, new_value);
    }

    /// 16-bit increments run through the ALU: one extra internal cycle.
    fn increment16(&mut self, target: Reg16) {
        let value = self.read_u16_value(target).wrapping_add(1);
        self.set_u16_value(target, value);
        self.add_cycles();
    }

    fn decrement16(&mut self, target: Reg16) {
        let value = self.read_u16_value(target).wrapping_sub(1);
        self.set_u16_value(target, value);
        self.add_cycles();
    }

    /// `ADD HL,rr`. Flags: `-0HC`, plus one internal cycle.
    fn add16(&mut self, target: Reg16) {
        let value = self.read_u16_value(target);
        let hl = self.registers.hl();
        let (result, overflowed) = hl.overflowing_add(value);

        self.registers.set_nf(false);
        self.registers.set_hf((hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF);
        self.registers.set_cf(overflowed);

        self.registers.set_hl(result);
        self.add_cycles();
    }

    /// `ADD A,x`. Flags: `Z0HC`
    fn add<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let (new_value, overflowed) = self.registers.a.overflowing_add(value);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(false);
        self.registers.set_hf((self.registers.a & 0xF) + (value & 0xF) > 0xF);
        self.registers.set_cf(overflowed);

        self.registers.a = new_value;
    }

    /// `ADC A,x`. Flags: `Z0HC`
    fn adc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let carry = self.registers.cf() as u8;
        let new_value = self.registers.a.wrapping_add(value).wrapping_add(carry);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(false);
        self.registers
            .set_hf((self.registers.a & 0xF) + (value & 0xF) + carry > 0xF);
        self.registers
            .set_cf(self.registers.a as u16 + value as u16 + carry as u16 > 0xFF);

        self.registers.a = new_value;
    }

    /// `SUB A,x`. Flags: `Z1HC`
    fn sub<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = self.registers.a.wrapping_sub(value);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(true);
        self.registers
            .set_hf((self.registers.a & 0xF) < (value & 0xF));
        self.registers.set_cf(self.registers.a < value);

        self.registers.a = new_value;
    }

    /// `SBC A,x`. Flags: `Z1HC`
    fn sbc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let carry = self.registers.cf() as u8;
        let new_value = self.registers.a.wrapping_sub(value).wrapping_sub(carry);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(true);
        self.registers
            .set_hf((self.registers.a & 0xF) < (value & 0xF) + carry);
        self.registers
            .set_cf((self.registers.a as u16) < value as u16 + carry as u16);

        self.registers.a = new_value;
    }

    /// Flags: `Z010`
    fn and<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        self.registers.a &= self.read_u8_value(target);
        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(true);
        self.registers.set_cf(false);
    }

    /// Flags: `Z000`
    fn xor<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        self.registers.a ^= self.read_u8_value(target);
        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(false);
        self.registers.set_cf(false);
    }

    /// Flags: `Z000`
    fn or<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        self.registers.a |= self.read_u8_value(target);
        self.registers.set_zf(self.registers.a == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(false);
        self.registers.set_cf(false);
    }

    /// `CP A,x`: subtraction flags without the store. Flags: `Z1HC`
    fn compare<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        let result = self.registers.a.wrapping_sub(value);

        self.registers.set_zf(result == 0);
        self.registers.set_nf(true);
        self.registers
            .set_hf((self.registers.a & 0xF) < (value & 0xF));
        self.registers.set_cf(self.registers.a < value);
    }

    /// Flags: `000C`; RLCA always clears Z, unlike RLC A.
    fn rlca(&mut self) {
        self.rotate_left(Reg8::A);
        self.registers.set_zf(false);
    }

    fn rrca(&mut self) {
        self.rotate_right(Reg8::A);
        self.registers.set_zf(false);
    }

    fn rla(&mut self) {
        self.rotate_left_through_carry(Reg8::A);
        self.registers.set_zf(false);
    }

    fn rra(&mut self) {
        self.rotate_right_through_carry(Reg8::A);
        self.registers.set_zf(false);
    }

    /// Decimal-adjust A after a BCD addition or subtraction. Works on a
    /// widened value so the second adjustment sees the first, with carry
    /// accumulating stickily. Flags: `Z-0C`
    fn daa(&mut self) {
        let mut value = self.registers.a as i32;

        if !self.registers.nf() {
            if self.registers.hf() || value & 0xF > 0x9 {
                value += 0x06;
            }
            if self.registers.cf() || value > 0x9F {
                value += 0x60;
            }
        } else {
            if self.registers.hf() {
                value = (value - 0x06) & 0xFF;
            }
            if self.registers.cf() {
                value -= 0x60;
            }
        }

        if value & 0x100 == 0x100 {
            self.registers.set_cf(true);
        }

        value &= 0xFF;
        self.registers.set_zf(value == 0);
        self.registers.set_hf(false);
        self.registers.a = value as u8;
    }

    /// Flags: `-11-`
    fn cpl(&mut self) {
        self.registers.a = !self.registers.a;
        self.registers.set_nf(true);
        self.registers.set_hf(true);
    }

    /// Flags: `-001`
    fn scf(&mut self) {
        self.registers.set_nf(false);
        self.registers.set_hf(false);
        self.registers.set_cf(true);
    }

    /// Flags: `-00C` with C inverted.
    fn ccf(&mut self) {
        self.registers.set_nf(false);
        self.registers.set_hf(false);
        let carry = self.registers.cf();
        self.registers.set_cf(!carry);
    }

    /// `JR cc,e8`: one extra cycle when taken.
    fn relative_jump(&mut self, condition: JumpCondition) {
        let offset = self.get_instr_u8() as i8;
        if self.condition_met(condition) {
            self.registers.pc = self.registers.pc.wrapping_add(offset as u16);
            self.add_cycles();
        }
    }

    /// `JP cc,nn`: one extra cycle when taken.
    fn jump(&mut self, condition: JumpCondition) {
        let address = self.get_instr_u16();
        if self.condition_met(condition) {
            self.registers.pc = address;
            self.add_cycles();
        }
    }

    /// `JP HL` takes no extra cycles at all.
    fn jump_hl(&mut self) {
        self.registers.pc = self.registers.hl();
    }

    /// `CALL cc,nn`
    fn call(&mut self, condition: JumpCondition) {
        let address = self.get_instr_u16();
        if self.condition_met(condition) {
            self.push_helper(self.registers.pc);
            self.registers.pc = address;
        }
    }

    /// `RET`: pop plus one internal cycle.
    fn ret(&mut self) {
        self.registers.pc = self.read_short_cycle(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(2);
        self.add_cycles();
    }

    /// `RET cc`: the condition check costs a cycle of its own.
    fn ret_conditional(&mut self, condition: JumpCondition) {
        self.add_cycles();
        if self.condition_met(condition) {
            self.ret();
        }
    }

    /// `RETI`: RET that also sets IME, with no EI-style delay.
    fn reti(&mut self) {
        self.ime = true;
        self.ret();
    }

    /// `RST vec`
    fn rst(&mut self, vector: u8) {
        self.push_helper(self.registers.pc);
        self.registers.pc = vector as u16;
    }

    fn push(&mut self, target: Reg16) {
        let value = self.read_u16_value(target);
        self.push_helper(value);
    }

    fn pop(&mut self, target: Reg16) {
        let value = self.read_short_cycle(self.registers.sp);
        self.registers.sp = self.registers.sp.wrapping_add(2);
        self.set_u16_value(target, value);
    }

    /// Two writes plus an internal cycle.
    fn push_helper(&mut self, value: u16) {
        self.add_cycles();
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.write_byte_cycle(self.registers.sp, (value >> 8) as u8);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        self.write_byte_cycle(self.registers.sp, value as u8);
    }

    /// `ADD SP,e8`. Flags: `00HC`, two internal cycles.
    fn add_sp(&mut self) {
        let offset = self.get_instr_u8() as i8 as u16;
        let sp = self.registers.sp;

        self.registers.set_zf(false);
        self.registers.set_nf(false);
        self.registers.set_hf((sp & 0xF) + (offset & 0xF) > 0xF);
        self.registers.set_cf((sp & 0xFF) + (offset & 0xFF) > 0xFF);

        self.registers.sp = sp.wrapping_add(offset);
        self.add_cycles();
        self.add_cycles();
    }

    /// `LD HL,SP+e8`. Flags: `00HC`, one internal cycle.
    fn load_hl_sp_offset(&mut self) {
        let offset = self.get_instr_u8() as i8 as u16;
        let sp = self.registers.sp;

        self.registers.set_zf(false);
        self.registers.set_nf(false);
        self.registers.set_hf((sp & 0xF) + (offset & 0xF) > 0xF);
        self.registers.set_cf((sp & 0xFF) + (offset & 0xFF) > 0xFF);

        self.registers.set_hl(sp.wrapping_add(offset));
        self.add_cycles();
    }

    /// `LD SP,HL`: one internal cycle.
    fn load_sp_hl(&mut self) {
        self.registers.sp = self.registers.hl();
        self.add_cycles();
    }

    /// `HALT`. With IME clear and an interrupt already pending the halt
    /// falls through: classic hardware re-fetches the following byte, the
    /// color variant just burns a cycle.
    fn halt(&mut self) {
        if !self.ime && !self.mmu.interrupts().pending().is_empty() {
            if self.mmu.mode().is_color() {
                self.add_cycles();
            } else {
                self.halt_bug = true;
            }
        } else {
            self.halted = true;
        }
    }

    /// `STOP`: speed switch on an armed color machine, otherwise freeze
    /// until any key goes down.
    fn stop(&mut self) {
        if self.mmu.speed_switch_armed() {
            self.mmu.toggle_speed();
        } else {
            info!("STOP: waiting for joypad input");
            self.stopped = true;
        }
    }

    /// `DI` takes effect immediately and cancels a pending EI.
    fn di(&mut self) {
        self.ime = false;
        self.ei_countdown = 0;
    }

    /// `EI` takes effect after the next instruction.
    fn ei(&mut self) {
        if !self.ime && self.ei_countdown == 0 {
            self.ei_countdown = 2;
        }
    }

    fn condition_met(&self, condition: JumpCondition) -> bool {
        match condition {
            JumpCondition::NotZero => !self.registers.zf(),
            JumpCondition::Zero => self.registers.zf(),
            JumpCondition::NotCarry => !self.registers.cf(),
            JumpCondition::Carry => self.registers.cf(),
            JumpCondition::Always => true,
        }
    }

    /// Undefined opcodes lock up real hardware; we log and carry on.
    fn unknown(&mut self) {
        warn!("Unknown opcode executed as NOP: 0x{:02X}", self.opcode);
    }

    /*
        0xCB-prefixed instructions.
    */

    fn rlc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.rotate_left(target);
    }

    fn rrc<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.rotate_right(target);
    }

    fn rl<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.rotate_left_through_carry(target);
    }

    fn rr<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.rotate_right_through_carry(target);
    }

    fn sla<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.shift_left_arithmetic(target);
    }

    fn sra<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.shift_right_arithmetic(target);
    }

    /// Flags: `Z000`
    fn swap<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value.rotate_left(4);

        self.registers.set_zf(new_value == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(false);
        self.registers.set_cf(false);

        self.set_u8_value(target, new_value);
    }

    fn srl<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        self.shift_right_logical(target);
    }

    /// `BIT b,x`. Flags: `Z01-`
    fn bit<T: Copy>(&mut self, bit: u8, target: T)
    where
        Self: ToU8<T>,
    {
        let value = self.read_u8_value(target);
        self.registers.set_zf(value & (1 << bit) == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(true);
    }

    /// `SET b,x`. Flags: `----`
    fn set<T: Copy>(&mut self, bit: u8, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        self.set_u8_value(target, value | (1 << bit));
    }

    /// `RES b,x`. Flags: `----`
    fn res<T: Copy>(&mut self, bit: u8, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        self.set_u8_value(target, value & !(1 << bit));
    }
}
