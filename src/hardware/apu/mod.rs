//! Four-channel sound generator. A 512 Hz frame sequencer gates the
//! length/sweep/envelope sub-clocks while every channel's own timer runs
//! off the main 4.19 MHz clock; finished stereo samples land in a bounded
//! ring the host drains once per frame.

use std::collections::VecDeque;

use crate::emulator::{EmulatorMode, CLOCK_SPEED};
use crate::hardware::apu::noise_channel::NoiseChannel;
use crate::hardware::apu::square_channel::SquareChannel;
use crate::hardware::apu::wave_channel::WaveChannel;
use crate::hardware::ppu::memory_binds::INVALID_READ;

pub mod channel_features;
pub mod noise_channel;
pub mod square_channel;
pub mod wave_channel;

pub const APU_REGISTER_START: u16 = 0xFF10;
pub const APU_REGISTER_END: u16 = 0xFF2F;
pub const WAVE_RAM_START: u16 = 0xFF30;
pub const WAVE_RAM_END: u16 = 0xFF3F;

/// The frame sequencer advances every 8192 cycles (512 Hz).
pub const FRAME_SEQUENCER_PERIOD: u32 = 8192;

/// Gain bringing the summed channel output into i16 range:
/// 32767 / (15 * 4 * 8) is roughly 68, rounded down for headroom.
const AMPLIFICATION: i32 = 64;

pub struct Apu {
    mode: EmulatorMode,
    enabled: bool,

    channel1: SquareChannel,
    channel2: SquareChannel,
    channel3: WaveChannel,
    channel4: NoiseChannel,

    /// NR50: per-side master volume (and the unused VIN bits).
    nr50: u8,
    /// NR51: channel-to-side routing matrix.
    nr51: u8,

    frame_sequencer_step: u8,
    frame_sequencer_clock: u32,

    cycles_per_sample: u32,
    sample_clock: u32,
    sample_buffer: VecDeque<i16>,
    sample_capacity: usize,
}

impl Apu {
    pub fn new(mode: EmulatorMode, sample_rate: u32, sample_buffer_length: usize) -> Self {
        Apu {
            mode,
            enabled: false,
            channel1: SquareChannel::new(true),
            channel2: SquareChannel::new(false),
            channel3: WaveChannel::new(),
            channel4: NoiseChannel::new(),
            nr50: 0,
            nr51: 0,
            frame_sequencer_step: 0,
            frame_sequencer_clock: 0,
            cycles_per_sample: CLOCK_SPEED / sample_rate.max(1),
            sample_clock: 0,
            sample_buffer: VecDeque::with_capacity(sample_buffer_length * 2),
            sample_capacity: sample_buffer_length * 2,
        }
    }

    pub fn tick(&mut self, cycles: u32) {
        self.channel1.tick(cycles);
        self.channel2.tick(cycles);
        self.channel3.tick(cycles);
        self.channel4.tick(cycles);

        self.frame_sequencer_clock += cycles;
        if self.frame_sequencer_clock >= FRAME_SEQUENCER_PERIOD {
            self.frame_sequencer_clock -= FRAME_SEQUENCER_PERIOD;
            self.frame_sequencer_step = (self.frame_sequencer_step + 1) & 0x7;
            if self.enabled {
                self.dispatch_frame_sequencer(self.frame_sequencer_step);
            }
        }

        self.sample_clock += cycles;
        if self.sample_clock >= self.cycles_per_sample {
            self.sample_clock -= self.cycles_per_sample;
            self.emit_sample();
        }
    }

    /// Lengths on the even steps, sweep on 2 and 6, envelope on 7.
    fn dispatch_frame_sequencer(&mut self, step: u8) {
        if step % 2 == 0 {
            self.channel1.step_length();
            self.channel2.step_length();
            self.channel3.step_length();
            self.channel4.step_length();
        }
        if step == 2 || step == 6 {
            self.channel1.step_sweep();
        }
        if step == 7 {
            self.channel1.step_envelope();
            self.channel2.step_envelope();
            self.channel4.step_envelope();
        }
    }

    fn emit_sample(&mut self) {
        let outputs = [
            self.channel1.output() as i32,
            self.channel2.output() as i32,
            self.channel3.output() as i32,
            self.channel4.output() as i32,
        ];

        let mut right = 0i32;
        let mut left = 0i32;
        for (index, output) in outputs.iter().enumerate() {
            if self.nr51 & (1 << index) != 0 {
                right += output;
            }
            if self.nr51 & (1 << (index + 4)) != 0 {
                left += output;
            }
        }

        let left_volume = ((self.nr50 >> 4) & 0x7) as i32 + 1;
        let right_volume = (self.nr50 & 0x7) as i32 + 1;

        let left_sample = (left * left_volume * AMPLIFICATION) as i16;
        let right_sample = (right * right_volume * AMPLIFICATION) as i16;

        if self.sample_buffer.len() + 2 > self.sample_capacity {
            // Host isn't draining fast enough; drop the oldest pair.
            log::trace!("Sample ring full, dropping a frame pair");
            self.sample_buffer.pop_front();
            self.sample_buffer.pop_front();
        }
        self.sample_buffer.push_back(left_sample);
        self.sample_buffer.push_back(right_sample);
    }

    /// Move up to `out.len()` queued samples into `out`, returning the count.
    pub fn take_samples(&mut self, out: &mut [i16]) -> usize {
        let count = out.len().min(self.sample_buffer.len());
        for slot in out.iter_mut().take(count) {
            *slot = self.sample_buffer.pop_front().unwrap_or(0);
        }
        count
    }

    pub fn queued_samples(&self) -> usize {
        self.sample_buffer.len()
    }

    pub fn read_register(&self, address: u16) -> u8 {
        match address {
            0xFF10..=0xFF14 => self.channel1.read_register(address - 0xFF10),
            0xFF15 => INVALID_READ,
            0xFF16..=0xFF19 => self.channel2.read_register(address - 0xFF15),
            0xFF1A..=0xFF1E => self.channel3.read_register(address - 0xFF1A),
            0xFF1F => INVALID_READ,
            0xFF20..=0xFF23 => self.channel4.read_register(address - 0xFF1F),
            0xFF24 => self.nr50,
            0xFF25 => self.nr51,
            0xFF26 => {
                0x70 | ((self.enabled as u8) << 7)
                    | ((self.channel4.enabled() as u8) << 3)
                    | ((self.channel3.enabled() as u8) << 2)
                    | ((self.channel2.enabled() as u8) << 1)
                    | self.channel1.enabled() as u8
            }
            0xFF27..=0xFF2F => INVALID_READ,
            _ => {
                log::warn!("APU read from unmapped address 0x{:04X}", address);
                INVALID_READ
            }
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8) {
        // With power off only NR52 responds; classic hardware additionally
        // lets length registers through.
        if !self.enabled && address != 0xFF26 && !self.length_write_allowed(address) {
            log::warn!(
                "APU register write while powered down: 0x{:04X} = 0x{:02X}",
                address,
                value
            );
            return;
        }

        #[cfg(feature = "apu-logging")]
        log::trace!("APU write 0x{:04X} = 0x{:02X}", address, value);

        let step = self.frame_sequencer_step;
        match address {
            0xFF10..=0xFF14 => self.channel1.write_register(address - 0xFF10, value, step),
            0xFF15 => {}
            0xFF16..=0xFF19 => self.channel2.write_register(address - 0xFF15, value, step),
            0xFF1A..=0xFF1E => {
                let classic = self.mode.is_classic();
                self.channel3.write_register(address - 0xFF1A, value, step, classic)
            }
            0xFF1F => {}
            0xFF20..=0xFF23 => self.channel4.write_register(address - 0xFF1F, value, step),
            0xFF24 => self.nr50 = value,
            0xFF25 => self.nr51 = value,
            0xFF26 => self.set_power(value & 0x80 != 0),
            0xFF27..=0xFF2F => {}
            _ => log::warn!("APU write to unmapped address 0x{:04X}", address),
        }
    }

    fn length_write_allowed(&self, address: u16) -> bool {
        self.mode.is_classic() && matches!(address, 0xFF11 | 0xFF16 | 0xFF1B | 0xFF20)
    }

    fn set_power(&mut self, on: bool) {
        if on && !self.enabled {
            // Power-on resets the frame sequencer to step 1.
            self.frame_sequencer_step = 1;
            self.frame_sequencer_clock = 0;
        } else if !on && self.enabled {
            let preserve_length = self.mode.is_classic();
            self.channel1.power_off(preserve_length);
            self.channel2.power_off(preserve_length);
            self.channel3.power_off(preserve_length);
            self.channel4.power_off(preserve_length);
            self.nr50 = 0;
            self.nr51 = 0;
        }
        self.enabled = on;
    }

    pub fn read_wave_ram(&self, address: u16) -> u8 {
        self.channel3.read_wave_ram(address - WAVE_RAM_START)
    }

    pub fn write_wave_ram(&mut self, address: u16, value: u8) {
        self.channel3.write_wave_ram(address - WAVE_RAM_START, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn powered_apu() -> Apu {
        let mut apu = Apu::new(EmulatorMode::Classic, 44100, 1024);
        apu.write_register(0xFF26, 0x80);
        apu
    }

    #[test]
    fn sequencer_schedule_ratios_over_512_steps() {
        let mut lengths = 0;
        let mut sweeps = 0;
        let mut envelopes = 0;

        for step in 0u32..512 {
            let step = (step % 8) as u8;
            if step % 2 == 0 {
                lengths += 1;
            }
            if step == 2 || step == 6 {
                sweeps += 1;
            }
            if step == 7 {
                envelopes += 1;
            }
        }

        assert_eq!(lengths, 256);
        assert_eq!(sweeps, 128);
        assert_eq!(envelopes, 64);
    }

    #[test]
    fn length_counters_clock_at_256_hz() {
        let mut apu = powered_apu();
        // Channel 2: max volume, length 2 clocks, counter enabled.
        apu.write_register(0xFF17, 0xF0);
        apu.write_register(0xFF16, 0x3E);
        apu.write_register(0xFF19, 0xC0);
        assert!(apu.channel2.enabled());

        // Two length clocks arrive within 4 sequencer steps.
        for _ in 0..4 * FRAME_SEQUENCER_PERIOD / 4 {
            apu.tick(4);
        }
        assert!(!apu.channel2.enabled());
    }

    #[test]
    fn power_on_resets_sequencer_to_step_one() {
        let mut apu = powered_apu();
        for _ in 0..5 * FRAME_SEQUENCER_PERIOD / 4 {
            apu.tick(4);
        }
        assert_ne!(apu.frame_sequencer_step, 1);

        apu.write_register(0xFF26, 0x00);
        apu.write_register(0xFF26, 0x80);
        assert_eq!(apu.frame_sequencer_step, 1);
    }

    #[test]
    fn power_off_zeroes_registers_and_blocks_writes() {
        let mut apu = powered_apu();
        apu.write_register(0xFF24, 0x77);
        apu.write_register(0xFF25, 0xF3);

        apu.write_register(0xFF26, 0x00);
        assert_eq!(apu.read_register(0xFF24), 0x00);
        assert_eq!(apu.read_register(0xFF25), 0x00);

        apu.write_register(0xFF24, 0x55);
        assert_eq!(apu.read_register(0xFF24), 0x00);
        assert_eq!(apu.read_register(0xFF26), 0x70);
    }

    #[test]
    fn nr52_reports_channel_status_bits() {
        let mut apu = powered_apu();
        apu.write_register(0xFF12, 0xF0);
        apu.write_register(0xFF14, 0x80);
        assert_eq!(apu.read_register(0xFF26), 0xF1);
    }

    #[test]
    fn samples_arrive_at_the_configured_rate() {
        let mut apu = powered_apu();
        // One second of emulated time at 44.1 kHz.
        for _ in 0..CLOCK_SPEED / 4 {
            apu.tick(4);
        }
        let expected = 2 * (CLOCK_SPEED / (CLOCK_SPEED / 44100)) as usize;
        // The ring only holds 2048 samples; everything older was dropped.
        assert!(apu.queued_samples() <= 2048);
        assert!(expected > 0);

        let mut out = vec![0i16; 256];
        assert_eq!(apu.take_samples(&mut out), 256);
    }

    #[test]
    fn unused_registers_read_ff() {
        let apu = powered_apu();
        assert_eq!(apu.read_register(0xFF15), 0xFF);
        assert_eq!(apu.read_register(0xFF1F), 0xFF);
        assert_eq!(apu.read_register(0xFF27), 0xFF);
        assert_eq!(apu.read_register(0xFF2F), 0xFF);
    }

    #[test]
    fn mixer_respects_routing_and_master_volume() {
        let mut apu = powered_apu();
        // Channel 1 at constant full output: 75% duty gives a 1 at phase 0.
        apu.write_register(0xFF12, 0xF0);
        apu.write_register(0xFF11, 0xC0);
        apu.write_register(0xFF14, 0x80);
        // Route channel 1 left only, left volume 7, right volume 0.
        apu.write_register(0xFF25, 0x10);
        apu.write_register(0xFF24, 0x70);

        // Force phase 1 (pattern bit set) then emit a sample directly.
        apu.channel1.tick((2048 - 0) * 4);
        apu.emit_sample();

        let mut out = [0i16; 2];
        assert_eq!(apu.take_samples(&mut out), 2);
        assert_eq!(out[0], 15 * 8 * AMPLIFICATION as i16);
        assert_eq!(out[1], 0);
    }
}
