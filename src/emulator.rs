//! Top-level glue: owns the CPU (which owns the bus and everything behind
//! it), runs whole video frames, and exposes the host-facing surface for
//! input, video, audio and battery saves.

use log::*;

use crate::hardware::cartridge::Cartridge;
use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::Memory;
use crate::hardware::ppu::{CYCLES_PER_FRAME, FRAMEBUFFER_SIZE};
use crate::io::joypad::Button;
use crate::{EmulatorConfig, LoadError, SaveData, System};

/// CPU clock at single speed, in Hz.
pub const CLOCK_SPEED: u32 = 4_194_304;

/// Which hardware generation is being emulated.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EmulatorMode {
    Classic,
    Color,
}

impl EmulatorMode {
    pub fn is_classic(self) -> bool {
        self == EmulatorMode::Classic
    }

    pub fn is_color(self) -> bool {
        self == EmulatorMode::Color
    }
}

pub struct Emulator {
    config: EmulatorConfig,
    cpu: Option<Cpu<Memory>>,
    /// Shown while no cartridge is loaded.
    blank_frame: Vec<u8>,
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        Emulator {
            config,
            cpu: None,
            blank_frame: vec![0xFF; FRAMEBUFFER_SIZE],
        }
    }

    /// Load a ROM image, replacing any running cartridge. `save` restores
    /// battery RAM (and the RTC sidecar for mapper-3 carts).
    pub fn load_cartridge(&mut self, rom: Vec<u8>, save: Option<SaveData>) -> Result<(), LoadError> {
        let (saved_ram, saved_rtc) = match &save {
            Some(save) => (Some(save.ram.as_slice()), save.rtc.as_deref()),
            None => (None, None),
        };

        let cartridge = Cartridge::new(rom, saved_ram, saved_rtc)?;

        let mode = match self.config.system {
            System::Classic => EmulatorMode::Classic,
            System::Color => EmulatorMode::Color,
            System::Automatic => {
                if cartridge.header().cgb_flag {
                    EmulatorMode::Color
                } else {
                    EmulatorMode::Classic
                }
            }
        };
        info!("Starting \"{}\" in {:?} mode", cartridge.header().title, mode);

        let memory = Memory::new(cartridge, mode, &self.config);
        self.cpu = Some(Cpu::new(memory));
        Ok(())
    }

    /// Run one video frame: 70224 cycles at single speed, twice that in
    /// double speed. A no-op without a cartridge.
    pub fn update(&mut self) {
        let cpu = match &mut self.cpu {
            Some(cpu) => cpu,
            None => return,
        };

        let frame_cycles = (CYCLES_PER_FRAME as u64) << cpu.mmu.double_speed() as u64;
        let target = cpu.cycles_performed + frame_cycles;
        while cpu.cycles_performed < target {
            cpu.step();
        }
    }

    /// Restart the loaded cartridge from power-on, keeping battery RAM.
    pub fn reset(&mut self) {
        let cpu = match self.cpu.take() {
            Some(cpu) => cpu,
            None => return,
        };

        let mut memory = cpu.mmu;
        let save = if memory.cartridge().has_battery() {
            Some(SaveData {
                rtc: memory.cartridge().rtc_snapshot(),
                ram: memory.cartridge_mut().take_save_data(),
            })
        } else {
            None
        };
        let rom = memory.cartridge_mut().take_rom();

        if let Err(error) = self.load_cartridge(rom, save) {
            warn!("Reset failed to reload the cartridge: {}", error);
        }
    }

    /// The front buffer: 160x144 RGBA, valid until the next `update`.
    pub fn framebuffer(&self) -> &[u8] {
        match &self.cpu {
            Some(cpu) => cpu.mmu.ppu.frame_buffer(),
            None => &self.blank_frame,
        }
    }

    /// Drain queued stereo samples into `out`; returns how many were moved.
    pub fn take_audio_samples(&mut self, out: &mut [i16]) -> usize {
        match &mut self.cpu {
            Some(cpu) => cpu.mmu.apu.take_samples(out),
            None => 0,
        }
    }

    pub fn press(&mut self, button: Button) {
        if let Some(cpu) = &mut self.cpu {
            cpu.mmu.press_key(button);
        }
    }

    pub fn release(&mut self, button: Button) {
        if let Some(cpu) = &mut self.cpu {
            cpu.mmu.release_key(button);
        }
    }

    /// The battery save image, if the cartridge has one and it changed
    /// since the last call.
    pub fn save_ram(&mut self) -> Option<Vec<u8>> {
        let cpu = self.cpu.as_mut()?;
        let cartridge = cpu.mmu.cartridge_mut();
        if cartridge.has_battery() && cartridge.is_dirty() {
            Some(cartridge.take_save_data())
        } else {
            None
        }
    }

    /// The RTC sidecar blob for mapper-3 carts with a clock.
    pub fn rtc_snapshot(&self) -> Option<Vec<u8>> {
        self.cpu.as_ref()?.mmu.cartridge().rtc_snapshot()
    }
}
