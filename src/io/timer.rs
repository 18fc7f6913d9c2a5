use crate::io::interrupts::{InterruptFlags, Interrupts};

/// The upper 8 bits of the internal 16-bit system clock.
/// Writing any value to this register resets the whole clock to zero.
pub const DIVIDER_REGISTER: u16 = 0xFF04;
/// Incremented at the rate selected by TAC. On overflow it reloads from TMA
/// (one tick late) and requests the timer interrupt.
pub const TIMER_COUNTER: u16 = 0xFF05;
/// The value loaded into TIMA whenever it overflows.
pub const TIMER_MODULO: u16 = 0xFF06;
/// Bit 2 enables the timer, bits 0-1 select the increment frequency.
pub const TIMER_CONTROL: u16 = 0xFF07;

/// TIMA increments whenever the multiplexed bit of the system clock falls.
/// This reproduces the documented oddities around DIV writes and TAC
/// rewrites without special cases for each.
#[derive(Debug, Copy, Clone, PartialEq)]
enum InputClock {
    C1024 = 0x0,
    C16 = 0x1,
    C64 = 0x2,
    C256 = 0x3,
}

impl InputClock {
    fn multiplexer_bit(self) -> u16 {
        match self {
            InputClock::C16 => 0x0008,
            InputClock::C64 => 0x0020,
            InputClock::C256 => 0x0080,
            InputClock::C1024 => 0x0200,
        }
    }
}

impl From<u8> for InputClock {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0x0 => InputClock::C1024,
            0x1 => InputClock::C16,
            0x2 => InputClock::C64,
            _ => InputClock::C256,
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct TimerControl {
    enabled: bool,
    input_select: InputClock,
}

impl TimerControl {
    fn to_bits(self) -> u8 {
        0xF8 | ((self.enabled as u8) << 2) | self.input_select as u8
    }
}

impl Default for TimerControl {
    fn default() -> Self {
        TimerControl {
            enabled: false,
            input_select: InputClock::C1024,
        }
    }
}

impl From<u8> for TimerControl {
    fn from(value: u8) -> Self {
        TimerControl {
            enabled: value & 0b100 != 0,
            input_select: InputClock::from(value),
        }
    }
}

#[derive(Debug, Default)]
pub struct Timers {
    system_clock: u16,
    timer_counter: u8,
    timer_modulo: u8,
    timer_control: TimerControl,
    /// TIMA has overflowed but the TMA reload has not happened yet.
    overflow_pending: bool,
    /// TIMA was reloaded from TMA on this very tick.
    just_reloaded: bool,
}

impl Timers {
    pub fn divider(&self) -> u8 {
        (self.system_clock >> 8) as u8
    }

    pub fn read_register(&self, address: u16) -> u8 {
        match address {
            DIVIDER_REGISTER => self.divider(),
            TIMER_COUNTER => self.timer_counter,
            TIMER_MODULO => self.timer_modulo,
            TIMER_CONTROL => self.timer_control.to_bits(),
            _ => {
                log::warn!("Timer read from unmapped address: 0x{:04X}", address);
                0xFF
            }
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8) {
        match address {
            DIVIDER_REGISTER => self.set_divider(),
            TIMER_COUNTER => self.set_timer_counter(value),
            TIMER_MODULO => self.set_timer_modulo(value),
            TIMER_CONTROL => self.set_timer_control(value),
            _ => log::warn!("Timer write to unmapped address: 0x{:04X}", address),
        }
    }

    /// Advance the timer block by one m-cycle (4 clocks).
    ///
    /// The TMA reload and interrupt request are delayed by one tick after the
    /// overflow itself, during which a TIMA write can still cancel both.
    pub fn tick(&mut self, interrupts: &mut Interrupts) {
        self.just_reloaded = false;

        if self.overflow_pending {
            self.timer_counter = self.timer_modulo;
            self.overflow_pending = false;
            self.just_reloaded = true;
            interrupts.request(InterruptFlags::TIMER);
        }

        let old_clock = self.system_clock;
        self.system_clock = self.system_clock.wrapping_add(4);

        if self.timer_control.enabled && self.multiplexer_bit_fell(old_clock, self.system_clock) {
            self.increment_tima();
        }
    }

    fn multiplexer_bit_fell(&self, old_clock: u16, new_clock: u16) -> bool {
        let bit = self.timer_control.input_select.multiplexer_bit();
        (old_clock & bit) != 0 && (new_clock & bit) == 0
    }

    fn increment_tima(&mut self) {
        let (new_value, overflowed) = self.timer_counter.overflowing_add(1);
        self.timer_counter = new_value;
        self.overflow_pending = overflowed;
    }

    /// Any write to DIV zeroes the system clock. If the multiplexed bit was
    /// high this counts as a falling edge and increments TIMA.
    fn set_divider(&mut self) {
        let old_clock = self.system_clock;
        self.system_clock = 0;

        if self.timer_control.enabled && self.multiplexer_bit_fell(old_clock, 0) {
            self.increment_tima();
        }
    }

    fn set_timer_counter(&mut self, value: u8) {
        // Writing TIMA during the overflow window cancels the pending reload
        // and interrupt. Writing during the reload tick itself is discarded
        // in favour of TMA.
        if self.overflow_pending {
            self.overflow_pending = false;
        }

        if self.just_reloaded {
            self.timer_counter = self.timer_modulo;
        } else {
            self.timer_counter = value;
        }
    }

    fn set_timer_modulo(&mut self, value: u8) {
        // A TMA write on the reload tick is forwarded straight into TIMA.
        if self.just_reloaded {
            self.timer_counter = value;
        }
        self.timer_modulo = value;
    }

    fn set_timer_control(&mut self, value: u8) {
        let old_control = self.timer_control;
        self.timer_control = TimerControl::from(value);

        let old_bit = old_control.input_select.multiplexer_bit();
        let new_bit = self.timer_control.input_select.multiplexer_bit();

        // Disabling the timer while the selected bit is high produces a
        // falling edge on the multiplexer output.
        if old_control.enabled && !self.timer_control.enabled && (self.system_clock & old_bit) != 0 {
            self.increment_tima();
        }

        // Likewise for switching from a currently-high bit to a low one.
        if old_control.enabled
            && self.timer_control.enabled
            && (self.system_clock & old_bit) != 0
            && (self.system_clock & new_bit) == 0
        {
            self.increment_tima();
        }
    }

    /// Seed DIV with the value it holds after the boot ROM has run.
    pub fn skip_boot_rom(&mut self) {
        self.system_clock = 0xAB00;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::interrupts::{InterruptFlags, Interrupts};

    fn run_cycles(timers: &mut Timers, interrupts: &mut Interrupts, cycles: u32) {
        for _ in 0..cycles / 4 {
            timers.tick(interrupts);
        }
    }

    #[test]
    fn divider_write_resets_to_zero() {
        let mut timers = Timers::default();
        let mut interrupts = Interrupts::default();

        run_cycles(&mut timers, &mut interrupts, 1024);
        assert_eq!(timers.read_register(DIVIDER_REGISTER), 0x04);

        timers.write_register(DIVIDER_REGISTER, 0x5A);
        assert_eq!(timers.read_register(DIVIDER_REGISTER), 0x00);
    }

    #[test]
    fn tima_overflow_reloads_tma_and_requests_interrupt() {
        let mut timers = Timers::default();
        let mut interrupts = Interrupts::default();

        // Enabled, period 16 cycles.
        timers.write_register(TIMER_MODULO, 0xF0);
        timers.write_register(TIMER_COUNTER, 0xFE);
        timers.write_register(TIMER_CONTROL, 0x05);

        run_cycles(&mut timers, &mut interrupts, 48);

        assert_eq!(timers.read_register(TIMER_COUNTER), 0xF1);
        assert!(interrupts.interrupt_flag.contains(InterruptFlags::TIMER));
    }

    #[test]
    fn tima_write_in_overflow_window_cancels_interrupt() {
        let mut timers = Timers::default();
        let mut interrupts = Interrupts::default();

        timers.write_register(TIMER_MODULO, 0xF0);
        timers.write_register(TIMER_COUNTER, 0xFF);
        timers.write_register(TIMER_CONTROL, 0x05);

        // 16 cycles: TIMA overflows, reload still pending.
        run_cycles(&mut timers, &mut interrupts, 16);
        timers.write_register(TIMER_COUNTER, 0x42);
        run_cycles(&mut timers, &mut interrupts, 4);

        assert_eq!(timers.read_register(TIMER_COUNTER), 0x42);
        assert!(!interrupts.interrupt_flag.contains(InterruptFlags::TIMER));
    }

    #[test]
    fn interrupt_cadence_matches_selected_period() {
        let mut timers = Timers::default();
        let mut interrupts = Interrupts::default();

        // Period 16 cycles, TMA 0 => one interrupt every 16 * 256 cycles.
        timers.write_register(TIMER_CONTROL, 0x05);

        // The reload (and request) trails each overflow by one tick, so allow
        // a few cycles of slack after the last period boundary.
        let mut requests = 0;
        for _ in 0..(16 * 256 * 3) / 4 + 4 {
            timers.tick(&mut interrupts);
            if interrupts.interrupt_flag.contains(InterruptFlags::TIMER) {
                requests += 1;
                interrupts.interrupt_flag.remove(InterruptFlags::TIMER);
            }
        }

        assert_eq!(requests, 3);
    }

    #[test]
    fn tac_control_reads_back_with_upper_bits_set() {
        let mut timers = Timers::default();
        timers.write_register(TIMER_CONTROL, 0x05);
        assert_eq!(timers.read_register(TIMER_CONTROL), 0xFD);
    }
}
