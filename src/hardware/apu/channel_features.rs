//! The three sub-units shared between channels: volume envelope, length
//! counter and frequency sweep. Each is clocked by specific frame
//! sequencer steps and carries a couple of documented edge-case behaviors
//! around NRxx writes that several test ROMs depend on.

/// 64 Hz volume envelope (frame sequencer step 7).
#[derive(Debug, Default)]
pub struct Envelope {
    pub volume: u8,
    pub add_mode: bool,
    period: u8,
    initial_volume: u8,
    clock: u8,
}

impl Envelope {
    pub fn step(&mut self) {
        if self.clock > 0 {
            self.clock -= 1;
        }
        if self.clock == 0 {
            if self.period > 0 {
                if self.add_mode && self.volume < 15 {
                    self.volume += 1;
                } else if !self.add_mode && self.volume > 0 {
                    self.volume -= 1;
                }
                self.clock = self.period;
            } else {
                // A zero period behaves as 8.
                self.clock = 8;
            }
        }
    }

    pub fn read_register(&self) -> u8 {
        (self.initial_volume << 4) | ((self.add_mode as u8) << 3) | self.period
    }

    pub fn write_register(&mut self, value: u8) {
        // "Zombie" volume edits while the envelope is idle.
        if self.period == 0 && self.clock > 0 {
            self.volume = self.volume.wrapping_add(1);
        } else if !self.add_mode {
            self.volume = self.volume.wrapping_add(2);
        }
        if (self.read_register() ^ value) & 0x08 != 0 {
            self.volume = 0x10u8.wrapping_sub(self.volume);
        }
        self.volume &= 0x0F;

        self.initial_volume = value >> 4;
        self.add_mode = value & 0x08 != 0;
        self.period = value & 0x07;
    }

    pub fn trigger(&mut self, next_step_is_envelope: bool) {
        self.volume = self.initial_volume;
        self.clock = if self.period == 0 { 8 } else { self.period };
        // Triggering right before an envelope step delays the first clock.
        if next_step_is_envelope {
            self.clock += 1;
        }
    }

    /// The DAC is powered iff volume or direction is non-zero; an
    /// unpowered DAC silences the channel entirely.
    pub fn dac_enabled(&self) -> bool {
        self.initial_volume != 0 || self.add_mode
    }
}

/// 256 Hz length counter (even frame sequencer steps).
#[derive(Debug, Default, Clone, Copy)]
pub struct LengthCounter {
    /// 0x3F for the 6-bit counters, 0xFF for the wave channel.
    mask: u8,
    pub enabled: bool,
    counter: u16,
}

impl LengthCounter {
    pub fn new(mask: u8) -> Self {
        LengthCounter {
            mask,
            enabled: false,
            counter: 0,
        }
    }

    pub fn step(&mut self, channel_enabled: &mut bool) {
        if self.enabled && self.counter > 0 {
            self.counter -= 1;
            if self.counter == 0 {
                *channel_enabled = false;
            }
        }
    }

    pub fn write_length(&mut self, value: u8) {
        self.counter = (self.mask as u16 + 1) - (value & self.mask) as u16;
    }

    /// Apply an NRx4 write. `first_half` is true when the current frame
    /// sequencer step is one that clocks length counters, in which case
    /// enabling the counter costs an immediate extra clock.
    pub fn write_control(
        &mut self,
        trigger: bool,
        enable: bool,
        first_half: bool,
        channel_enabled: &mut bool,
    ) {
        let was_enabled = self.enabled;
        self.enabled = enable;

        if !was_enabled && enable && first_half && self.counter > 0 {
            let before = *channel_enabled;
            self.step(channel_enabled);
            // Only an un-triggered enable can kill the channel here.
            if trigger {
                *channel_enabled = before;
            }
        }

        if trigger && self.counter == 0 {
            self.counter = self.mask as u16 + 1;
            if enable && first_half {
                self.step(channel_enabled);
            }
        }
    }

    #[cfg(test)]
    pub fn remaining(&self) -> u16 {
        self.counter
    }
}

/// 128 Hz frequency sweep (frame sequencer steps 2 and 6), channel 1 only.
#[derive(Debug, Default)]
pub struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    shadow_frequency: u16,
    timer: u8,
    enabled: bool,
    /// Set once a calculation ran in negate mode; clearing negate after
    /// that point disables the channel.
    negate_used: bool,
}

impl Sweep {
    pub fn read_register(&self) -> u8 {
        0x80 | (self.period << 4) | ((self.negate as u8) << 3) | self.shift
    }

    pub fn write_register(&mut self, value: u8, channel_enabled: &mut bool) {
        self.period = (value >> 4) & 0x07;
        let negate = value & 0x08 != 0;
        self.shift = value & 0x07;

        if !negate && self.negate && self.negate_used {
            *channel_enabled = false;
        }
        self.negate = negate;
    }

    pub fn trigger(&mut self, frequency: u16, channel_enabled: &mut bool) {
        self.shadow_frequency = frequency;
        self.timer = if self.period == 0 { 8 } else { self.period };
        self.negate_used = false;
        self.enabled = self.period > 0 || self.shift > 0;

        if self.shift > 0 {
            self.calculate(channel_enabled);
        }
    }

    pub fn step(&mut self, frequency: &mut u16, channel_enabled: &mut bool) {
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer > 0 {
            return;
        }
        self.timer = if self.period == 0 { 8 } else { self.period };

        if !self.enabled || self.period == 0 {
            return;
        }

        let new_frequency = self.calculate(channel_enabled);
        if new_frequency <= 2047 && self.shift > 0 {
            self.shadow_frequency = new_frequency;
            *frequency = new_frequency;
            // A second overflow check that discards its result.
            self.calculate(channel_enabled);
        }
    }

    fn calculate(&mut self, channel_enabled: &mut bool) -> u16 {
        let delta = self.shadow_frequency >> self.shift;
        let new_frequency = if self.negate {
            self.negate_used = true;
            self.shadow_frequency.wrapping_sub(delta)
        } else {
            self.shadow_frequency + delta
        };

        if new_frequency > 2047 {
            *channel_enabled = false;
        }
        new_frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ramps_down_and_stops_at_zero() {
        let mut envelope = Envelope::default();
        envelope.write_register(0x23); // volume 2, subtract, period 3
        envelope.trigger(false);
        assert_eq!(envelope.volume, 2);

        for _ in 0..3 {
            envelope.step();
        }
        assert_eq!(envelope.volume, 1);
        for _ in 0..3 {
            envelope.step();
        }
        assert_eq!(envelope.volume, 0);
        for _ in 0..6 {
            envelope.step();
        }
        assert_eq!(envelope.volume, 0);
    }

    #[test]
    fn envelope_dac_bit_rules() {
        let mut envelope = Envelope::default();
        envelope.write_register(0x00);
        assert!(!envelope.dac_enabled());
        envelope.write_register(0x08);
        assert!(envelope.dac_enabled());
        envelope.write_register(0x10);
        assert!(envelope.dac_enabled());
    }

    #[test]
    fn length_counter_expiry_disables_channel() {
        let mut length = LengthCounter::new(0x3F);
        let mut enabled = true;

        length.write_length(0x3E); // 2 clocks remaining
        length.write_control(false, true, false, &mut enabled);

        length.step(&mut enabled);
        assert!(enabled);
        length.step(&mut enabled);
        assert!(!enabled);
    }

    #[test]
    fn trigger_with_zero_counter_reloads_maximum() {
        let mut length = LengthCounter::new(0x3F);
        let mut enabled = true;

        length.write_control(true, false, false, &mut enabled);
        assert_eq!(length.remaining(), 64);
    }

    #[test]
    fn enabling_mid_first_half_costs_an_extra_clock() {
        let mut length = LengthCounter::new(0x3F);
        let mut enabled = true;

        length.write_length(0x3F); // one clock remaining
        length.write_control(false, true, true, &mut enabled);
        // The extra clock expired the counter without a trigger to save it.
        assert!(!enabled);
    }

    #[test]
    fn sweep_overflow_disables_channel() {
        let mut sweep = Sweep::default();
        let mut enabled = true;

        sweep.write_register(0x11, &mut enabled); // period 1, add, shift 1
        sweep.trigger(0x700, &mut enabled);
        // 0x700 + 0x380 > 2047 on the trigger calculation already.
        assert!(!enabled);
    }

    #[test]
    fn clearing_negate_after_a_negate_calculation_disables_channel() {
        let mut sweep = Sweep::default();
        let mut enabled = true;

        sweep.write_register(0x19, &mut enabled); // period 1, negate, shift 1
        sweep.trigger(0x400, &mut enabled);
        assert!(enabled);

        sweep.write_register(0x11, &mut enabled); // negate cleared
        assert!(!enabled);
    }

    #[test]
    fn sweep_steps_move_the_frequency() {
        let mut sweep = Sweep::default();
        let mut enabled = true;
        let mut frequency = 0x100;

        sweep.write_register(0x11, &mut enabled);
        sweep.trigger(frequency, &mut enabled);
        sweep.step(&mut frequency, &mut enabled);

        assert_eq!(frequency, 0x180);
        assert!(enabled);
    }
}
