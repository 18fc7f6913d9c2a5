use bitflags::*;

/// Interrupt service routine addresses, indexed by interrupt priority.
pub const INTERRUPT_VECTORS: [u16; 5] = [0x0040, 0x0048, 0x0050, 0x0058, 0x0060];

bitflags! {
    #[derive(Default)]
    pub struct InterruptFlags: u8 {
        /// V-Blank
        const VBLANK = 0b0000_0001;
        /// LCD Stat
        const LCD    = 0b0000_0010;
        /// Timer
        const TIMER  = 0b0000_0100;
        /// Serial
        const SERIAL = 0b0000_1000;
        /// Joypad
        const JOYPAD = 0b0001_0000;
    }
}

/// The interrupt controller, owning both the `IE` (0xFFFF) and `IF` (0xFF0F)
/// registers. Side components insert requests into `IF`; the CPU consumes
/// them at its post-instruction dispatch point.
#[derive(Default, Debug, Clone)]
pub struct Interrupts {
    pub interrupt_enable: InterruptFlags,
    pub interrupt_flag: InterruptFlags,
}

impl Interrupts {
    pub fn request(&mut self, interrupt: InterruptFlags) {
        self.interrupt_flag.insert(interrupt);
    }

    /// The set of interrupts that are both requested and enabled.
    pub fn pending(&self) -> InterruptFlags {
        self.interrupt_flag & self.interrupt_enable
    }

    pub fn read_interrupt_enable(&self) -> u8 {
        self.interrupt_enable.bits()
    }

    /// The upper three bits of IF are unused and read as 1.
    pub fn read_interrupt_flag(&self) -> u8 {
        0xE0 | self.interrupt_flag.bits()
    }

    pub fn overwrite_interrupt_enable(&mut self, value: u8) {
        self.interrupt_enable = InterruptFlags::from_bits_truncate(value);
    }

    pub fn overwrite_interrupt_flag(&mut self, value: u8) {
        self.interrupt_flag = InterruptFlags::from_bits_truncate(value);
    }
}
