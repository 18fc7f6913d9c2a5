//! Rotate and shift primitives shared by the base and 0xCB instruction
//! tables. All of them set Z00C; the bare A-register forms (RLCA etc.)
//! clear Z afterwards at the call site.

use crate::hardware::cpu::traits::{SetU8, ToU8};
use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;

impl<M: MemoryMapper> Cpu<M> {
    /// C <- [7 <- 0] <- [7]
    pub(super) fn rotate_left<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value.rotate_left(1);

        self.set_rotation_flags(new_value, value & 0x80 != 0);
        self.set_u8_value(target, new_value);
    }

    /// C <- [7 <- 0] <- C
    pub(super) fn rotate_left_through_carry<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = (value << 1) | self.registers.cf() as u8;

        self.set_rotation_flags(new_value, value & 0x80 != 0);
        self.set_u8_value(target, new_value);
    }

    /// [0] -> [7 -> 0] -> C
    pub(super) fn rotate_right<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value.rotate_right(1);

        self.set_rotation_flags(new_value, value & 0x01 != 0);
        self.set_u8_value(target, new_value);
    }

    /// C -> [7 -> 0] -> C
    pub(super) fn rotate_right_through_carry<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = (value >> 1) | ((self.registers.cf() as u8) << 7);

        self.set_rotation_flags(new_value, value & 0x01 != 0);
        self.set_u8_value(target, new_value);
    }

    /// C <- [7 <- 0] <- 0
    pub(super) fn shift_left_arithmetic<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value << 1;

        self.set_rotation_flags(new_value, value & 0x80 != 0);
        self.set_u8_value(target, new_value);
    }

    /// [7] -> [7 -> 0] -> C
    pub(super) fn shift_right_arithmetic<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = (value & 0x80) | (value >> 1);

        self.set_rotation_flags(new_value, value & 0x01 != 0);
        self.set_u8_value(target, new_value);
    }

    /// 0 -> [7 -> 0] -> C
    pub(super) fn shift_right_logical<T: Copy>(&mut self, target: T)
    where
        Self: ToU8<T> + SetU8<T>,
    {
        let value = self.read_u8_value(target);
        let new_value = value >> 1;

        self.set_rotation_flags(new_value, value & 0x01 != 0);
        self.set_u8_value(target, new_value);
    }

    fn set_rotation_flags(&mut self, result: u8, carry: bool) {
        self.registers.set_zf(result == 0);
        self.registers.set_nf(false);
        self.registers.set_hf(false);
        self.registers.set_cf(carry);
    }
}
