//! Memory access helpers and the interrupt dispatch point. Everything the
//! CPU reads or writes goes through here so the cycle fan-out stays exact.

use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;
use crate::io::interrupts::INTERRUPT_VECTORS;

impl<M: MemoryMapper> Cpu<M> {
    /// One m-cycle: advance the rest of the machine before the CPU touches
    /// the bus again.
    pub fn add_cycles(&mut self) {
        self.cycles_performed += 4;
        self.mmu.do_m_cycle();
    }

    /// Fetch the byte at PC and advance it.
    pub fn get_instr_u8(&mut self) -> u8 {
        let value = self.read_byte_cycle(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        value
    }

    /// Fetch a little-endian word at PC and advance it twice.
    pub fn get_instr_u16(&mut self) -> u16 {
        let low = self.get_instr_u8() as u16;
        let high = self.get_instr_u8() as u16;
        (high << 8) | low
    }

    pub fn read_byte_cycle(&mut self, address: u16) -> u8 {
        self.add_cycles();
        self.mmu.read_byte(address)
    }

    pub fn write_byte_cycle(&mut self, address: u16, value: u8) {
        self.add_cycles();
        self.mmu.write_byte(address, value);
    }

    /// Little-endian 16-bit read, two m-cycles.
    pub fn read_short_cycle(&mut self, address: u16) -> u16 {
        let low = self.read_byte_cycle(address) as u16;
        let high = self.read_byte_cycle(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// Little-endian 16-bit write, two m-cycles.
    pub fn write_short_cycle(&mut self, address: u16, value: u16) {
        self.write_byte_cycle(address, value as u8);
        self.write_byte_cycle(address.wrapping_add(1), (value >> 8) as u8);
    }

    /// Service the highest-priority pending interrupt, if IME allows.
    /// Dispatch costs 20 cycles: two internal, two pushes, one jump.
    pub(super) fn handle_interrupts(&mut self) {
        let pending = self.mmu.interrupts().pending();
        if pending.is_empty() {
            return;
        }

        // A pending interrupt ends HALT even when it cannot be serviced.
        self.halted = false;

        if !self.ime {
            return;
        }

        for index in 0..INTERRUPT_VECTORS.len() {
            if pending.bits() & (1 << index) != 0 {
                #[cfg(feature = "cpu-logging")]
                log::debug!("Servicing interrupt {}", index);

                self.ime = false;
                let mut flags = self.mmu.interrupts().interrupt_flag;
                flags.remove(
                    crate::io::interrupts::InterruptFlags::from_bits_truncate(1 << index),
                );
                self.mmu.interrupts_mut().interrupt_flag = flags;

                self.add_cycles();
                self.add_cycles();
                self.push_helper(self.registers.pc);
                self.registers.pc = INTERRUPT_VECTORS[index];
                return;
            }
        }
    }
}
