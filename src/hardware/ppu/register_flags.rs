use bitflags::*;

bitflags! {
    /// FF40 - LCDC. Every bit is live and may be rewritten mid-frame;
    /// unlike VRAM the PPU never locks this register.
    #[derive(Default)]
    pub struct LcdControl: u8 {
        /// On classic hardware this blanks background and window entirely.
        /// In color mode it instead drops background/window priority so
        /// sprites always win.
        const BG_WINDOW_PRIORITY  = 0b0000_0001;
        const SPRITE_ENABLE       = 0b0000_0010;
        /// 0 = 8x8 sprites, 1 = 8x16.
        const SPRITE_SIZE         = 0b0000_0100;
        /// 0 = background tilemap at 0x9800, 1 = 0x9C00.
        const BG_TILEMAP_SELECT   = 0b0000_1000;
        /// 0 = 0x8800 signed addressing, 1 = 0x8000 unsigned. Sprites
        /// always use 0x8000 addressing regardless.
        const TILE_DATA_SELECT    = 0b0001_0000;
        const WINDOW_ENABLE       = 0b0010_0000;
        /// 0 = window tilemap at 0x9800, 1 = 0x9C00.
        const WINDOW_TILEMAP_SELECT = 0b0100_0000;
        /// LCD power. Turning it off grants free VRAM/OAM access and parks
        /// the mode machine.
        const LCD_ENABLE          = 0b1000_0000;
    }
}

bitflags! {
    /// FF41 - STAT. The low three bits are read-only status; bits 3-6
    /// select which events pull the shared STAT interrupt line.
    #[derive(Default)]
    pub struct LcdStatus: u8 {
        const MODE_BIT_0            = 0b0000_0001;
        const MODE_BIT_1            = 0b0000_0010;
        const COINCIDENCE_FLAG      = 0b0000_0100;
        const HBLANK_INTERRUPT      = 0b0000_1000;
        const VBLANK_INTERRUPT      = 0b0001_0000;
        const OAM_INTERRUPT         = 0b0010_0000;
        const COINCIDENCE_INTERRUPT = 0b0100_0000;
    }
}

bitflags! {
    /// The fourth OAM byte of every sprite.
    #[derive(Default)]
    pub struct SpriteFlags: u8 {
        /// Color mode only: palette OBP0-7.
        const CGB_PALETTE_NUMBER = 0b0000_0111;
        /// Color mode only: tile data bank.
        const VRAM_BANK          = 0b0000_1000;
        /// Classic mode only: OBP0 or OBP1.
        const PALETTE_NUMBER     = 0b0001_0000;
        const X_FLIP             = 0b0010_0000;
        const Y_FLIP             = 0b0100_0000;
        /// Sprite hides behind background colors 1-3.
        const BEHIND_BACKGROUND  = 0b1000_0000;
    }
}

impl SpriteFlags {
    pub fn cgb_palette(self) -> usize {
        (self.bits() & 0x07) as usize
    }
}

/// The mode field reported in STAT bits 0-1.
#[derive(Debug, PartialOrd, PartialEq, Copy, Clone)]
pub enum Mode {
    HBlank,
    VBlank,
    OamSearch,
    PixelTransfer,
}

impl LcdStatus {
    pub fn mode(self) -> Mode {
        match self.bits() & 0x3 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamSearch,
            _ => Mode::PixelTransfer,
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        let bits = (self.bits() & 0xFC)
            | match mode {
                Mode::HBlank => 0,
                Mode::VBlank => 1,
                Mode::OamSearch => 2,
                Mode::PixelTransfer => 3,
            };
        *self = LcdStatus::from_bits_truncate(bits);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_bits_round_trip() {
        let mut status = LcdStatus::default();
        for mode in [Mode::HBlank, Mode::VBlank, Mode::OamSearch, Mode::PixelTransfer] {
            status.set_mode(mode);
            assert_eq!(status.mode(), mode);
        }
    }

    #[test]
    fn set_mode_preserves_interrupt_selects() {
        let mut status = LcdStatus::COINCIDENCE_INTERRUPT | LcdStatus::HBLANK_INTERRUPT;
        status.set_mode(Mode::PixelTransfer);
        assert!(status.contains(LcdStatus::COINCIDENCE_INTERRUPT));
        assert!(status.contains(LcdStatus::HBLANK_INTERRUPT));
        assert_eq!(status.mode(), Mode::PixelTransfer);
    }
}
