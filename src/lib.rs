//! Cycle-accurate emulation core for the classic 8-bit handheld and its
//! color successor. The host brings its own windowing, audio output and
//! file I/O; this crate turns a ROM image plus input events into RGBA
//! frames and stereo PCM.

pub mod emulator;
pub mod hardware;
mod io;

pub use crate::emulator::{Emulator, EmulatorMode};
pub use crate::hardware::ppu::{FRAMEBUFFER_SIZE, RESOLUTION_HEIGHT, RESOLUTION_WIDTH};
pub use crate::io::joypad::Button;

use crate::io::bootrom::{BootRomData, CLASSIC_BOOT_ROM};
use std::fmt;

/// Which hardware to emulate; `Automatic` follows the cartridge header.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum System {
    Automatic,
    Classic,
    Color,
}

/// Shades for classic-mode rendering: plain grayscale or the green tint of
/// the original panel.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ClassicPalette {
    Grayscale,
    Tinted,
}

/// Battery save payload: raw RAM banks plus the optional RTC sidecar.
#[derive(Debug, Clone)]
pub struct SaveData {
    pub ram: Vec<u8>,
    pub rtc: Option<Vec<u8>>,
}

#[derive(Debug, PartialEq)]
pub enum LoadError {
    /// The image is too small to even contain a header.
    RomTooSmall,
    /// Unknown or unimplemented mapper type code.
    UnsupportedMapper(u8),
    /// The supplied battery save doesn't match the cartridge RAM size.
    SaveSizeMismatch { expected: usize, got: usize },
    /// The RTC sidecar blob failed to deserialize.
    BadRtcBlob,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::RomTooSmall => write!(f, "ROM image too small to contain a header"),
            LoadError::UnsupportedMapper(code) => {
                write!(f, "unsupported mapper type code 0x{:02X}", code)
            }
            LoadError::SaveSizeMismatch { expected, got } => write!(
                f,
                "battery save is {} bytes, expected at least {}",
                got, expected
            ),
            LoadError::BadRtcBlob => write!(f, "malformed RTC sidecar data"),
        }
    }
}

impl std::error::Error for LoadError {}

/// Everything configurable about the core. Build one with
/// [`EmulatorConfigBuilder`] or start from `Default`.
#[derive(Debug, Clone)]
pub struct EmulatorConfig {
    pub system: System,
    pub sample_rate: u32,
    pub sample_buffer_length: usize,
    pub skip_boot_rom: bool,
    pub classic_palette: ClassicPalette,
    /// Gamma correction for color-mode output, 1.0 = unchanged.
    pub color_gamma: f64,
    /// Saturation for color-mode output in [0, 1].
    pub color_saturation: f64,
    /// Host-supplied classic boot ROM; the built-in image is used when
    /// absent.
    pub boot_rom: Option<[u8; 256]>,
}

impl EmulatorConfig {
    pub(crate) fn effective_boot_rom(&self) -> Option<BootRomData> {
        self.boot_rom.or(Some(CLASSIC_BOOT_ROM))
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            system: System::Automatic,
            sample_rate: 44100,
            sample_buffer_length: 1024,
            skip_boot_rom: false,
            classic_palette: ClassicPalette::Grayscale,
            color_gamma: 1.0,
            color_saturation: 1.0,
            boot_rom: None,
        }
    }
}

#[derive(Debug)]
pub struct EmulatorConfigBuilder {
    config: EmulatorConfig,
}

impl EmulatorConfigBuilder {
    pub fn new() -> Self {
        EmulatorConfigBuilder {
            config: EmulatorConfig::default(),
        }
    }

    pub fn system(mut self, system: System) -> Self {
        self.config.system = system;
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn sample_buffer_length(mut self, length: usize) -> Self {
        self.config.sample_buffer_length = length;
        self
    }

    pub fn skip_boot_rom(mut self, skip: bool) -> Self {
        self.config.skip_boot_rom = skip;
        self
    }

    pub fn classic_palette(mut self, palette: ClassicPalette) -> Self {
        self.config.classic_palette = palette;
        self
    }

    pub fn color_gamma(mut self, gamma: f64) -> Self {
        self.config.color_gamma = gamma;
        self
    }

    pub fn color_saturation(mut self, saturation: f64) -> Self {
        self.config.color_saturation = saturation;
        self
    }

    pub fn boot_rom(mut self, boot_rom: Option<[u8; 256]>) -> Self {
        self.config.boot_rom = boot_rom;
        self
    }

    pub fn build(self) -> EmulatorConfig {
        self.config
    }
}

impl Default for EmulatorConfigBuilder {
    fn default() -> Self {
        EmulatorConfigBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = EmulatorConfigBuilder::new()
            .system(System::Color)
            .sample_rate(48000)
            .classic_palette(ClassicPalette::Tinted)
            .skip_boot_rom(true)
            .build();

        assert_eq!(config.system, System::Color);
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.classic_palette, ClassicPalette::Tinted);
        assert!(config.skip_boot_rom);
        assert_eq!(config.sample_buffer_length, 1024);
    }

    #[test]
    fn load_errors_format_usefully() {
        assert!(LoadError::UnsupportedMapper(0xFC).to_string().contains("0xFC"));
        let error = LoadError::SaveSizeMismatch {
            expected: 0x8000,
            got: 0x2000,
        };
        assert!(error.to_string().contains("8192"));
    }
}
