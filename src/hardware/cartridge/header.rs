use std::str::from_utf8;

pub const HEADER_START: u16 = 0x0100;
pub const HEADER_END: u16 = 0x014F;

/// Cartridge type codes that include a battery-backed component.
const BATTERY_TYPES: [u8; 8] = [0x03, 0x06, 0x0D, 0x0F, 0x10, 0x13, 0x1B, 0x1E];

/// Which banking controller the cartridge carries, derived from the type
/// code at 0x0147.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MapperKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3 { has_rtc: bool },
    Mbc5,
}

#[derive(Debug)]
pub struct CartridgeHeader {
    /// Upper case ASCII, up to 16 characters on classic carts. Color carts
    /// reuse the final bytes for the compatibility flag.
    pub title: String,
    /// 0x80 (dual) or 0xC0 (color only) at 0x0143.
    pub cgb_flag: bool,
    pub cartridge_type: u8,
    pub mapper: MapperKind,
    pub has_battery: bool,
    /// Number of 16 KiB ROM banks.
    pub rom_banks: usize,
    /// Number of 8 KiB external RAM banks. A 2 KiB cart reports one bank.
    pub ram_banks: usize,
}

impl CartridgeHeader {
    pub fn parse(rom: &[u8]) -> Option<Self> {
        if rom.len() <= HEADER_END as usize {
            return None;
        }

        let cgb_flag = matches!(rom[0x143], 0x80 | 0xC0);
        let cartridge_type = rom[0x147];

        Some(CartridgeHeader {
            title: read_title(rom, cgb_flag),
            cgb_flag,
            cartridge_type,
            mapper: mapper_kind(cartridge_type)?,
            has_battery: BATTERY_TYPES.contains(&cartridge_type),
            rom_banks: rom_bank_count(rom[0x148]),
            ram_banks: ram_bank_count(rom[0x149]),
        })
    }
}

fn read_title(rom: &[u8], cgb: bool) -> String {
    let slice = if cgb { &rom[0x134..=0x13E] } else { &rom[0x134..=0x143] };

    from_utf8(slice)
        .unwrap_or("")
        .trim_matches(char::from(0))
        .to_owned()
}

fn mapper_kind(cartridge_type: u8) -> Option<MapperKind> {
    match cartridge_type {
        0x00 | 0x08 | 0x09 => Some(MapperKind::None),
        0x01..=0x03 => Some(MapperKind::Mbc1),
        0x05 | 0x06 => Some(MapperKind::Mbc2),
        0x0F | 0x10 => Some(MapperKind::Mbc3 { has_rtc: true }),
        0x11..=0x13 => Some(MapperKind::Mbc3 { has_rtc: false }),
        0x19..=0x1E => Some(MapperKind::Mbc5),
        _ => None,
    }
}

fn rom_bank_count(code: u8) -> usize {
    match code {
        0x00..=0x06 => 2 << code,
        0x52 => 72,
        0x53 => 80,
        0x54 => 96,
        _ => {
            log::warn!("Unknown ROM size code: 0x{:02X}, assuming 2 banks", code);
            2
        }
    }
}

fn ram_bank_count(code: u8) -> usize {
    match code {
        0x00 => 0,
        // Code 1 denotes a 2 KiB chip; it still occupies one 8 KiB bank slot.
        0x01 | 0x02 => 1,
        0x03 => 4,
        0x04 => 16,
        _ => {
            log::warn!("Unknown RAM size code: 0x{:02X}, assuming none", code);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_header() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        for (i, b) in b"POCKETTEST".iter().enumerate() {
            rom[0x134 + i] = *b;
        }
        rom[0x147] = 0x13; // MBC3 + RAM + battery
        rom[0x148] = 0x02; // 8 banks
        rom[0x149] = 0x03; // 4 RAM banks
        rom
    }

    #[test]
    fn parses_title_and_sizes() {
        let header = CartridgeHeader::parse(&rom_with_header()).unwrap();
        assert_eq!(header.title, "POCKETTEST");
        assert_eq!(header.rom_banks, 8);
        assert_eq!(header.ram_banks, 4);
        assert!(header.has_battery);
        assert_eq!(header.mapper, MapperKind::Mbc3 { has_rtc: false });
        assert!(!header.cgb_flag);
    }

    #[test]
    fn oversize_rom_codes_map_to_documented_bank_counts() {
        let mut rom = rom_with_header();
        rom[0x148] = 0x52;
        assert_eq!(CartridgeHeader::parse(&rom).unwrap().rom_banks, 72);
        rom[0x148] = 0x54;
        assert_eq!(CartridgeHeader::parse(&rom).unwrap().rom_banks, 96);
    }

    #[test]
    fn color_flag_detected() {
        let mut rom = rom_with_header();
        rom[0x143] = 0xC0;
        assert!(CartridgeHeader::parse(&rom).unwrap().cgb_flag);
    }

    #[test]
    fn unsupported_mapper_rejected() {
        let mut rom = rom_with_header();
        rom[0x147] = 0xFC; // camera
        assert!(CartridgeHeader::parse(&rom).is_none());
    }

    #[test]
    fn truncated_image_rejected() {
        assert!(CartridgeHeader::parse(&[0u8; 0x100]).is_none());
    }
}
