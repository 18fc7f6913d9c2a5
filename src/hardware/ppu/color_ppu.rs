//! Color-variant scanline composition. Background and window gain a second
//! attribute plane in VRAM bank 1 (palette select, tile bank, flips and a
//! per-tile priority bit); sprites pick one of eight palettes and can be
//! forced under the background unless the LCDC master-priority bit drops
//! all background priority.

use crate::hardware::ppu::palette::Rgb;
use crate::hardware::ppu::register_flags::{LcdControl, SpriteFlags};
use crate::hardware::ppu::{Ppu, RESOLUTION_WIDTH};

/// Tile attribute bits, bank 1 of the tilemap region.
const ATTR_PALETTE: u8 = 0x07;
const ATTR_BANK: u8 = 0x08;
const ATTR_X_FLIP: u8 = 0x20;
const ATTR_Y_FLIP: u8 = 0x40;
const ATTR_PRIORITY: u8 = 0x80;

impl Ppu {
    pub(crate) fn render_color_scanline(&mut self) {
        self.render_color_background();
        if self.lcd_control.contains(LcdControl::WINDOW_ENABLE) {
            self.render_color_window();
        }
        if self.lcd_control.contains(LcdControl::SPRITE_ENABLE) {
            self.render_color_sprites();
        }
    }

    fn render_color_background(&mut self) {
        let tilemap = self.background_tilemap_base();
        let line = self.current_line.wrapping_add(self.scroll_y);

        let mut tile_x = (self.scroll_x >> 3) as usize & 0x1F;
        let tile_y = (line >> 3) as usize & 0x1F;
        let mut fine_x = self.scroll_x & 0x7;
        let fine_y = line & 0x7;

        for x in 0..RESOLUTION_WIDTH {
            let map_slot = tilemap + tile_y * 32 + tile_x;
            let tile_index = self.vram[map_slot];
            let attributes = self.vram[super::VRAM_BANK_SIZE + map_slot];

            let mut column = fine_x;
            let mut row = fine_y;
            if attributes & ATTR_X_FLIP != 0 {
                column = 7 - column;
            }
            if attributes & ATTR_Y_FLIP != 0 {
                row = 7 - row;
            }

            let bank = ((attributes & ATTR_BANK) >> 3) as usize;
            let tile_address = self.background_tile_address(tile_index);
            let color_index = self.tile_pixel(bank, tile_address, column, row);

            let color = self
                .bg_color_ram
                .color((attributes & ATTR_PALETTE) as usize, color_index as usize);

            self.native_buffer[self.current_line as usize * RESOLUTION_WIDTH + x] =
                (attributes & ATTR_PRIORITY) | color_index;
            let rgb = self.resolve_color(color);
            self.put_pixel(x, rgb);

            tile_x = (tile_x + ((fine_x as usize + 1) >> 3)) & 0x1F;
            fine_x = (fine_x + 1) & 0x7;
        }
    }

    fn render_color_window(&mut self) {
        if !self.window_visible() {
            return;
        }

        let tilemap = self.window_tilemap_base();
        let window_x = self.window_x as i16 - 7;

        let mut tile_x = 0usize;
        let tile_y = (self.window_line >> 3) as usize & 0x1F;
        let mut fine_x = 0u8;
        let fine_y = self.window_line & 0x7;

        let first_x = if window_x < 0 {
            let skipped = (-window_x) as usize;
            tile_x = (skipped >> 3) & 0x1F;
            fine_x = (skipped & 0x7) as u8;
            0
        } else {
            window_x as usize
        };

        for x in first_x..RESOLUTION_WIDTH {
            let map_slot = tilemap + tile_y * 32 + tile_x;
            let tile_index = self.vram[map_slot];
            let attributes = self.vram[super::VRAM_BANK_SIZE + map_slot];

            let mut column = fine_x;
            let mut row = fine_y;
            if attributes & ATTR_X_FLIP != 0 {
                column = 7 - column;
            }
            if attributes & ATTR_Y_FLIP != 0 {
                row = 7 - row;
            }

            let bank = ((attributes & ATTR_BANK) >> 3) as usize;
            let tile_address = self.background_tile_address(tile_index);
            let color_index = self.tile_pixel(bank, tile_address, column, row);

            let color = self
                .bg_color_ram
                .color((attributes & ATTR_PALETTE) as usize, color_index as usize);

            self.native_buffer[self.current_line as usize * RESOLUTION_WIDTH + x] =
                (attributes & ATTR_PRIORITY) | color_index;
            let rgb = self.resolve_color(color);
            self.put_pixel(x, rgb);

            tile_x = (tile_x + ((fine_x as usize + 1) >> 3)) & 0x1F;
            fine_x = (fine_x + 1) & 0x7;
        }

        self.window_line += 1;
    }

    fn render_color_sprites(&mut self) {
        let tall = self.lcd_control.contains(LcdControl::SPRITE_SIZE);
        let (height, tile_mask) = if tall { (16i16, 0xFEu8) } else { (8, 0xFF) };
        // With the master bit clear all background priority is void.
        let background_may_win = self.lcd_control.contains(LcdControl::BG_WINDOW_PRIORITY);

        for key in self.sprite_queue.clone().iter().rev() {
            let sprite = (key & 0xFF) as usize;
            let sprite_y = self.oam[sprite * 4] as i16 - 16;
            let raw_x = self.oam[sprite * 4 + 1];
            let tile = self.oam[sprite * 4 + 2] & tile_mask;
            let flags = SpriteFlags::from_bits_truncate(self.oam[sprite * 4 + 3]);

            if raw_x == 0 || raw_x >= 168 {
                continue;
            }

            let bank = flags.contains(SpriteFlags::VRAM_BANK) as usize;
            let palette = flags.cgb_palette();

            let mut row = self.current_line as i16 - sprite_y;
            if flags.contains(SpriteFlags::Y_FLIP) {
                row = height - 1 - row;
            }

            let mut sprite_x = raw_x as i16 - 8;
            let mut column = 0i16;
            if sprite_x < 0 {
                column = -sprite_x;
                sprite_x = 0;
            }
            if flags.contains(SpriteFlags::X_FLIP) {
                column = 7 - column;
            }
            let dx = if flags.contains(SpriteFlags::X_FLIP) { -1 } else { 1 };

            let behind_background = flags.contains(SpriteFlags::BEHIND_BACKGROUND);
            let line_start = self.current_line as usize * RESOLUTION_WIDTH;

            let mut x = sprite_x;
            while x < sprite_x + 8 && x < RESOLUTION_WIDTH as i16 {
                let color_index =
                    self.tile_pixel(bank, tile as usize * 16, column as u8, row as u8);

                let native = self.native_buffer[line_start + x as usize];
                let hidden = background_may_win
                    && (behind_background || native & ATTR_PRIORITY != 0)
                    && native & 0x7 > 0;

                if color_index != 0 && !hidden {
                    let color = self.obj_color_ram.color(palette, color_index as usize);
                    self.native_buffer[line_start + x as usize] = color_index;
                    let rgb = self.resolve_color(color);
                    self.put_pixel(x as usize, rgb);
                }

                x += 1;
                column += dx;
            }
        }
    }

    fn resolve_color(&self, color: u16) -> Rgb {
        match &self.color_correction {
            Some(table) => table.lookup(color),
            None => Rgb(0, 0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::EmulatorMode;
    use crate::hardware::ppu::memory_binds::*;
    use crate::io::interrupts::Interrupts;
    use crate::{EmulatorConfig, System};

    fn color_ppu() -> Ppu {
        let mut config = EmulatorConfig::default();
        config.system = System::Color;
        let mut ppu = Ppu::new(EmulatorMode::Color, &config);
        let mut interrupts = Interrupts::default();
        ppu.write_register(LCD_CONTROL_REGISTER, 0x91, &mut interrupts);
        ppu
    }

    fn write_bg_palette(ppu: &mut Ppu, palette: usize, color: usize, value: u16) {
        let mut interrupts = Interrupts::default();
        let base = (palette * 8 + color * 2) as u8;
        ppu.write_register(BG_PALETTE_INDEX, base, &mut interrupts);
        ppu.write_register(BG_PALETTE_DATA, (value & 0xFF) as u8, &mut interrupts);
        ppu.write_register(BG_PALETTE_INDEX, base + 1, &mut interrupts);
        ppu.write_register(BG_PALETTE_DATA, (value >> 8) as u8, &mut interrupts);
    }

    #[test]
    fn background_uses_attribute_selected_palette() {
        let mut ppu = color_ppu();
        let mut interrupts = Interrupts::default();

        // Tile 0 solid color 3; tilemap zeroed points at it. Attribute
        // plane selects palette 2.
        for i in 0..16 {
            ppu.vram[i] = 0xFF;
        }
        for slot in 0x1800..0x1C00 {
            ppu.vram[super::super::VRAM_BANK_SIZE + slot] = 0x02;
        }
        // Palette 2 color 3: pure red in the low five bits.
        write_bg_palette(&mut ppu, 2, 3, 0x001F);

        for _ in 0..super::super::CYCLES_PER_FRAME / 4 {
            ppu.tick(4, &mut interrupts);
        }

        let pixel = &ppu.frame_buffer()[0..4];
        assert!(pixel[0] > 0xE0, "expected red-dominant pixel: {:?}", pixel);
        assert!(pixel[1] < 0x10 && pixel[2] < 0x10);
    }

    #[test]
    fn sprite_queue_keeps_oam_order_in_color_mode() {
        let mut ppu = color_ppu();

        for i in 0..4usize {
            ppu.oam[i * 4] = 16;
            // Descending X: classic would reorder these.
            ppu.oam[i * 4 + 1] = (40 - i) as u8;
        }
        ppu.current_line = 0;
        ppu.build_sprite_queue();

        let indices: Vec<u16> = ppu.sprite_queue.iter().map(|key| key & 0xFF).collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn tile_priority_bit_keeps_background_on_top() {
        let mut ppu = color_ppu();

        // Background: tile 0 solid color 1, priority bit set in attributes.
        for i in 0..16 {
            ppu.vram[i] = 0xFF;
        }
        for slot in 0x1800..0x1C00 {
            ppu.vram[super::super::VRAM_BANK_SIZE + slot] = ATTR_PRIORITY;
        }

        // One sprite at the origin using tile 1, solid color 3.
        for i in 16..32 {
            ppu.vram[i] = 0xFF;
        }
        ppu.oam[0] = 16;
        ppu.oam[1] = 8;
        ppu.oam[2] = 1;
        ppu.oam[3] = 0;

        ppu.current_line = 0;
        ppu.build_sprite_queue();
        ppu.render_color_scanline();

        // The native buffer keeps the background pixel: the sprite lost.
        assert_eq!(ppu.native_buffer[0] & 0x7, 0x3 & 0x7);
        assert_eq!(ppu.native_buffer[0] & ATTR_PRIORITY, ATTR_PRIORITY);
    }

    #[test]
    fn master_priority_clear_lets_sprites_win() {
        let mut ppu = color_ppu();
        let mut interrupts = Interrupts::default();
        // Clear LCDC bit 0.
        ppu.write_register(LCD_CONTROL_REGISTER, 0x90 | 0x02, &mut interrupts);

        for i in 0..16 {
            ppu.vram[i] = 0xFF;
        }
        for slot in 0x1800..0x1C00 {
            ppu.vram[super::super::VRAM_BANK_SIZE + slot] = ATTR_PRIORITY;
        }
        for i in 16..32 {
            ppu.vram[i] = 0xFF;
        }
        ppu.oam[0] = 16;
        ppu.oam[1] = 8;
        ppu.oam[2] = 1;
        ppu.oam[3] = 0;

        ppu.current_line = 0;
        ppu.build_sprite_queue();
        ppu.render_color_scanline();

        // Sprite pixels replace the native value and clear priority.
        assert_eq!(ppu.native_buffer[0], 0x3);
    }
}
