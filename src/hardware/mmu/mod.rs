//! The bus: address-decoded dispatch to every component, the interrupt
//! request sink, and the per-m-cycle fan-out that keeps PPU, timers and
//! APU in lockstep with the CPU.

use log::*;

use crate::emulator::EmulatorMode;
use crate::hardware::apu::{Apu, APU_REGISTER_END, APU_REGISTER_START, WAVE_RAM_END, WAVE_RAM_START};
use crate::hardware::cartridge::Cartridge;
use crate::hardware::mmu::color_features::{HdmaController, HdmaRequest, SpeedSwitch};
use crate::hardware::mmu::hram::Hram;
use crate::hardware::mmu::wram::Wram;
use itertools::Itertools;

use crate::hardware::ppu::memory_binds::{
    LCD_CONTROL_REGISTER, OAM_DMA_REGISTER, OAM_END, OAM_START, VRAM_END, VRAM_START, WX_REGISTER,
};
use crate::hardware::ppu::Ppu;
use crate::io::bootrom::BootRom;
use crate::io::interrupts::Interrupts;
use crate::io::joypad::{Button, JoyPad, JOYPAD_REGISTER};
use crate::io::timer::{Timers, DIVIDER_REGISTER, TIMER_CONTROL};
use crate::EmulatorConfig;

pub mod color_features;
pub mod hram;
pub mod wram;

pub const ROM_LOW_START: u16 = 0x0000;
pub const ROM_LOW_END: u16 = 0x3FFF;
pub const ROM_HIGH_START: u16 = 0x4000;
pub const ROM_HIGH_END: u16 = 0x7FFF;
pub const EXTERNAL_RAM_START: u16 = 0xA000;
pub const EXTERNAL_RAM_END: u16 = 0xBFFF;
pub const WRAM_START: u16 = 0xC000;
pub const WRAM_BANK_0_END: u16 = 0xCFFF;
pub const WRAM_BANK_N_START: u16 = 0xD000;
pub const WRAM_END: u16 = 0xDFFF;
pub const ECHO_RAM_START: u16 = 0xE000;
pub const ECHO_RAM_END: u16 = 0xFDFF;
/// Subtract to map an echo address onto work RAM.
pub const ECHO_RAM_OFFSET: u16 = 0x2000;
pub const RESTRICTED_START: u16 = 0xFEA0;
pub const RESTRICTED_END: u16 = 0xFEFF;
pub const SERIAL_DATA: u16 = 0xFF01;
pub const SERIAL_CONTROL: u16 = 0xFF02;
pub const INTERRUPT_FLAG: u16 = 0xFF0F;
pub const SPEED_SWITCH_REGISTER: u16 = 0xFF4D;
pub const BOOT_ROM_LOCKOUT: u16 = 0xFF50;
pub const HDMA_SOURCE_HIGH: u16 = 0xFF51;
pub const HDMA_SOURCE_LOW: u16 = 0xFF52;
pub const HDMA_DESTINATION_HIGH: u16 = 0xFF53;
pub const HDMA_DESTINATION_LOW: u16 = 0xFF54;
pub const HDMA_CONTROL: u16 = 0xFF55;
pub const WRAM_BANK_SELECT: u16 = 0xFF70;
pub const HRAM_START: u16 = 0xFF80;
pub const HRAM_END: u16 = 0xFFFE;
pub const INTERRUPT_ENABLE: u16 = 0xFFFF;
/// What a disconnected or gated bus returns.
pub const INVALID_READ: u8 = 0xFF;

/// The CPU's window onto the rest of the machine. Keeping it a trait lets
/// instruction tests run against a flat 64 KiB array.
pub trait MemoryMapper {
    fn read_byte(&self, address: u16) -> u8;
    fn write_byte(&mut self, address: u16, value: u8);
    fn interrupts(&self) -> &Interrupts;
    fn interrupts_mut(&mut self) -> &mut Interrupts;
    fn mode(&self) -> EmulatorMode;
    /// Advance every clocked component by one m-cycle.
    fn do_m_cycle(&mut self);

    fn boot_rom_finished(&self) -> bool {
        true
    }
    fn speed_switch_armed(&self) -> bool {
        false
    }
    fn toggle_speed(&mut self) {}
    /// STOP wake-up condition.
    fn any_key_held(&self) -> bool {
        false
    }
}

pub struct Memory {
    boot_rom: BootRom,
    cartridge: Cartridge,
    mode: EmulatorMode,

    pub ppu: Ppu,
    pub apu: Apu,
    pub timers: Timers,
    pub joypad: JoyPad,
    pub interrupts: Interrupts,
    hram: Hram,
    wram: Wram,
    speed: SpeedSwitch,
    hdma: HdmaController,

    /// Serial scratch plus any I/O slot nothing claims.
    io_fallback: [u8; 0x80],
    oam_dma_register: u8,
}

impl Memory {
    pub fn new(cartridge: Cartridge, mode: EmulatorMode, config: &EmulatorConfig) -> Self {
        let boot_rom = if mode.is_classic() && !config.skip_boot_rom {
            BootRom::new(config.effective_boot_rom())
        } else {
            BootRom::new(None)
        };

        let mut memory = Memory {
            boot_rom,
            cartridge,
            mode,
            ppu: Ppu::new(mode, config),
            apu: Apu::new(mode, config.sample_rate, config.sample_buffer_length),
            timers: Timers::default(),
            joypad: JoyPad::new(),
            interrupts: Interrupts::default(),
            hram: Hram::new(),
            wram: Wram::new(),
            speed: SpeedSwitch::new(),
            hdma: HdmaController::new(),
            io_fallback: [0xFF; 0x80],
            oam_dma_register: 0xFF,
        };

        if memory.boot_rom.is_finished {
            memory.apply_post_boot_state();
        }

        memory
    }

    /// I/O register values after the boot ROM has run, applied through the
    /// bus so component side effects fire. NR52 must come first or the APU
    /// discards the rest of its registers.
    fn apply_post_boot_state(&mut self) {
        const POST_BOOT_IO: [(u16, u8); 20] = [
            (0xFF26, 0xF1), // NR52 power, then the channel registers
            (0xFF10, 0x80),
            (0xFF11, 0x80),
            (0xFF12, 0xF3),
            (0xFF14, 0x80), // retrigger channel 1 the way the boot tune leaves it
            (0xFF16, 0x00),
            (0xFF17, 0x00),
            (0xFF19, 0x00),
            (0xFF1A, 0x00),
            (0xFF1B, 0xFF),
            (0xFF1C, 0x9F),
            (0xFF1E, 0x00),
            (0xFF20, 0xFF),
            (0xFF23, 0x00),
            (0xFF24, 0x77),
            (0xFF25, 0xF3),
            (0xFF40, 0x91), // LCDC
            (0xFF47, 0xFC), // BGP
            (0xFF48, 0xFF),
            (0xFF49, 0xFF),
        ];

        for (address, value) in POST_BOOT_IO.iter() {
            self.write_byte(*address, *value);
        }
        self.timers.skip_boot_rom();
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x00FF if !self.boot_rom.is_finished => self.boot_rom.read_byte(address),
            ROM_LOW_START..=ROM_LOW_END => self.cartridge.read_rom_low(address),
            ROM_HIGH_START..=ROM_HIGH_END => self.cartridge.read_rom_high(address),
            VRAM_START..=VRAM_END => self.ppu.read_vram(address),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.read_external_ram(address),
            WRAM_START..=WRAM_BANK_0_END => self.wram.read_bank_0(address),
            WRAM_BANK_N_START..=WRAM_END => self.wram.read_bank_n(address),
            ECHO_RAM_START..=ECHO_RAM_END => self.read_byte(address - ECHO_RAM_OFFSET),
            OAM_START..=OAM_END => self.ppu.read_oam(address),
            RESTRICTED_START..=RESTRICTED_END => {
                warn!("Read from restricted memory: 0x{:04X}", address);
                0x00
            }
            0xFF00..=0xFF7F => self.read_io_byte(address),
            HRAM_START..=HRAM_END => self.hram.read_byte(address),
            INTERRUPT_ENABLE => self.interrupts.read_interrupt_enable(),
        }
    }

    fn read_io_byte(&self, address: u16) -> u8 {
        match address {
            JOYPAD_REGISTER => self.joypad.read_register(),
            SERIAL_DATA | SERIAL_CONTROL => self.io_fallback[(address & 0x7F) as usize],
            DIVIDER_REGISTER..=TIMER_CONTROL => self.timers.read_register(address),
            INTERRUPT_FLAG => self.interrupts.read_interrupt_flag(),
            APU_REGISTER_START..=APU_REGISTER_END => self.apu.read_register(address),
            WAVE_RAM_START..=WAVE_RAM_END => self.apu.read_wave_ram(address),
            OAM_DMA_REGISTER => self.oam_dma_register,
            LCD_CONTROL_REGISTER..=WX_REGISTER => self.ppu.read_register(address),
            SPEED_SWITCH_REGISTER if self.mode.is_color() => self.speed.read_register(),
            BOOT_ROM_LOCKOUT => INVALID_READ,
            HDMA_SOURCE_HIGH..=HDMA_DESTINATION_LOW => INVALID_READ,
            HDMA_CONTROL if self.mode.is_color() => self.hdma.read_control(),
            0xFF4F | 0xFF68..=0xFF6B => self.ppu.read_register(address),
            WRAM_BANK_SELECT if self.mode.is_color() => self.wram.read_bank_select(),
            _ => self.io_fallback[(address & 0x7F) as usize],
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            ROM_LOW_START..=ROM_HIGH_END => self.cartridge.write_byte(address, value),
            VRAM_START..=VRAM_END => self.ppu.write_vram(address, value),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.write_byte(address, value),
            WRAM_START..=WRAM_BANK_0_END => self.wram.write_bank_0(address, value),
            WRAM_BANK_N_START..=WRAM_END => self.wram.write_bank_n(address, value),
            ECHO_RAM_START..=ECHO_RAM_END => self.write_byte(address - ECHO_RAM_OFFSET, value),
            OAM_START..=OAM_END => self.ppu.write_oam(address, value),
            RESTRICTED_START..=RESTRICTED_END => {
                trace!("Write to restricted memory: 0x{:04X}", address)
            }
            0xFF00..=0xFF7F => self.write_io_byte(address, value),
            HRAM_START..=HRAM_END => self.hram.write_byte(address, value),
            INTERRUPT_ENABLE => self.interrupts.overwrite_interrupt_enable(value),
        }
    }

    fn write_io_byte(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD_REGISTER => self.joypad.write_register(value),
            SERIAL_DATA | SERIAL_CONTROL => self.io_fallback[(address & 0x7F) as usize] = value,
            DIVIDER_REGISTER..=TIMER_CONTROL => self.timers.write_register(address, value),
            INTERRUPT_FLAG => self.interrupts.overwrite_interrupt_flag(value),
            APU_REGISTER_START..=APU_REGISTER_END => self.apu.write_register(address, value),
            WAVE_RAM_START..=WAVE_RAM_END => self.apu.write_wave_ram(address, value),
            OAM_DMA_REGISTER => {
                self.oam_dma_register = value;
                self.ppu.oam_dma.start(value);
            }
            LCD_CONTROL_REGISTER..=WX_REGISTER => {
                self.ppu.write_register(address, value, &mut self.interrupts)
            }
            SPEED_SWITCH_REGISTER if self.mode.is_color() => self.speed.write_register(value),
            BOOT_ROM_LOCKOUT => {
                if value & 0x01 != 0 && !self.boot_rom.is_finished {
                    self.boot_rom.is_finished = true;
                    info!("Boot ROM finished, overlay disabled");
                }
            }
            HDMA_SOURCE_HIGH if self.mode.is_color() => self.hdma.write_source_high(value),
            HDMA_SOURCE_LOW if self.mode.is_color() => self.hdma.write_source_low(value),
            HDMA_DESTINATION_HIGH if self.mode.is_color() => {
                self.hdma.write_destination_high(value)
            }
            HDMA_DESTINATION_LOW if self.mode.is_color() => self.hdma.write_destination_low(value),
            HDMA_CONTROL if self.mode.is_color() => match self.hdma.write_control(value) {
                HdmaRequest::General { blocks } => self.general_dma_transfer(blocks),
                HdmaRequest::HBlank => debug!("HBlank DMA armed"),
                HdmaRequest::None => {}
            },
            0xFF4F | 0xFF68..=0xFF6B => {
                self.ppu.write_register(address, value, &mut self.interrupts)
            }
            WRAM_BANK_SELECT if self.mode.is_color() => self.wram.write_bank_select(value),
            _ => self.io_fallback[(address & 0x7F) as usize] = value,
        }
    }

    /// Copy one 16-byte HDMA block into VRAM at the current bank. The
    /// gather happens before the stores since the source can alias VRAM.
    fn hdma_block_copy(&mut self) {
        let source = self.hdma.source();
        let destination = self.hdma.destination();

        let block = (source..source.wrapping_add(0x10))
            .map(|address| self.read_byte(address))
            .collect_vec();
        for (offset, value) in block.into_iter().enumerate() {
            self.ppu
                .write_vram_direct(VRAM_START + ((destination + offset as u16) & 0x1FFF), value);
        }
        self.hdma.advance_block();
    }

    /// General-mode HDMA: all blocks at once, stalling the CPU for eight
    /// m-cycles per block (twice that in double speed).
    fn general_dma_transfer(&mut self, blocks: u16) {
        debug!(
            "General DMA: {} blocks 0x{:04X} -> 0x{:04X}",
            blocks,
            self.hdma.source(),
            self.hdma.destination()
        );
        for _ in 0..blocks {
            self.hdma_block_copy();
            for _ in 0..8 {
                self.do_m_cycle();
            }
        }
        self.hdma.complete_general();
    }

    fn step_oam_dma(&mut self, cycles: u32) {
        let transfer = self
            .ppu
            .oam_dma
            .advance(cycles, self.speed.double_speed);
        if let Some((start, count)) = transfer {
            let source = self.ppu.oam_dma.source;
            let bytes = (start..start + count)
                .map(|index| self.read_byte(source | index))
                .collect_vec();
            for (offset, value) in bytes.into_iter().enumerate() {
                self.ppu.write_oam_direct(start + offset as u16, value);
            }
        }
    }

    pub fn press_key(&mut self, button: Button) {
        self.joypad.press(button, &mut self.interrupts);
    }

    pub fn release_key(&mut self, button: Button) {
        self.joypad.release(button);
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cartridge
    }

    pub fn double_speed(&self) -> bool {
        self.speed.double_speed
    }
}

impl MemoryMapper for Memory {
    fn read_byte(&self, address: u16) -> u8 {
        Memory::read_byte(self, address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        Memory::write_byte(self, address, value)
    }

    fn interrupts(&self) -> &Interrupts {
        &self.interrupts
    }

    fn interrupts_mut(&mut self) -> &mut Interrupts {
        &mut self.interrupts
    }

    fn mode(&self) -> EmulatorMode {
        self.mode
    }

    fn boot_rom_finished(&self) -> bool {
        self.boot_rom.is_finished
    }

    /// One m-cycle: the PPU, timers and APU advance in that order, then
    /// the DMA engines. In double speed the panel and sound see half the
    /// cycles while the timers keep pace with the CPU.
    fn do_m_cycle(&mut self) {
        let cycles = if self.speed.double_speed { 2 } else { 4 };

        self.ppu.tick(cycles, &mut self.interrupts);
        self.timers.tick(&mut self.interrupts);
        self.apu.tick(cycles);

        self.step_oam_dma(cycles);

        if self.ppu.entered_hblank {
            self.ppu.entered_hblank = false;
            if self.hdma.hblank_active() {
                self.hdma_block_copy();
            }
        }
    }

    fn speed_switch_armed(&self) -> bool {
        self.mode.is_color() && self.speed.armed()
    }

    fn toggle_speed(&mut self) {
        self.speed.toggle();
    }

    fn any_key_held(&self) -> bool {
        self.joypad.any_key_held()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Memory {{ mode: {:?}, cartridge: {:?} }}",
            self.mode,
            self.cartridge.header().title
        )
    }
}
