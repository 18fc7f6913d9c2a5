use crate::hardware::cartridge::header::{CartridgeHeader, MapperKind};
use crate::hardware::cartridge::mbc::{Mbc, MBC2_RAM_SIZE, RAM_BANK_SIZE, ROM_BANK_SIZE};
use crate::hardware::cartridge::rtc::{Rtc, RtcSnapshot};
use crate::hardware::mmu::{EXTERNAL_RAM_START, INVALID_READ};
use crate::LoadError;

use nanoserde::{DeBin, SerBin};

pub mod header;
pub mod mbc;
pub mod rtc;

/// A loaded ROM image plus its banking controller and external RAM.
#[derive(Debug)]
pub struct Cartridge {
    header: CartridgeHeader,
    mbc: Mbc,
    rom: Vec<u8>,
    ram: Vec<u8>,
    /// Set on the first RAM write after load/save; the host polls it to
    /// know when the battery save is stale.
    ram_dirty: bool,
}

impl Cartridge {
    pub fn new(rom: Vec<u8>, saved_ram: Option<&[u8]>, saved_rtc: Option<&[u8]>) -> Result<Self, LoadError> {
        let header = CartridgeHeader::parse(&rom).ok_or_else(|| match rom.get(0x147) {
            Some(&code) if rom.len() > 0x14F => LoadError::UnsupportedMapper(code),
            _ => LoadError::RomTooSmall,
        })?;

        log::info!(
            "Loaded \"{}\": mapper {:?}, {} ROM banks, {} RAM banks, battery: {}",
            header.title,
            header.mapper,
            header.rom_banks,
            header.ram_banks,
            header.has_battery
        );

        let ram_size = match header.mapper {
            MapperKind::Mbc2 => MBC2_RAM_SIZE,
            _ => header.ram_banks * RAM_BANK_SIZE,
        };
        let mut ram = vec![0u8; ram_size];

        if let Some(save) = saved_ram {
            if save.len() < ram_size {
                return Err(LoadError::SaveSizeMismatch {
                    expected: ram_size,
                    got: save.len(),
                });
            }
            // Oversized files are tolerated; only the needed prefix is used.
            ram.copy_from_slice(&save[..ram_size]);
        }

        let rtc = match header.mapper {
            MapperKind::Mbc3 { has_rtc: true } => Some(match saved_rtc {
                Some(blob) => {
                    let snapshot: RtcSnapshot =
                        DeBin::deserialize_bin(blob).map_err(|_| LoadError::BadRtcBlob)?;
                    Rtc::from_snapshot(snapshot).ok_or(LoadError::BadRtcBlob)?
                }
                None => Rtc::new(),
            }),
            _ => None,
        };

        let mbc = match header.mapper {
            MapperKind::None => Mbc::None,
            MapperKind::Mbc1 => Mbc::Mbc1 {
                ram_enabled: false,
                rom_bank_low: 1,
                upper_bits: 0,
                ram_mode: false,
                rom_banks: header.rom_banks,
            },
            MapperKind::Mbc2 => Mbc::Mbc2 {
                ram_enabled: false,
                rom_bank: 1,
            },
            MapperKind::Mbc3 { .. } => Mbc::Mbc3 {
                ram_enabled: false,
                rom_bank: 1,
                ram_bank: 0,
                rtc,
            },
            MapperKind::Mbc5 => Mbc::Mbc5 {
                ram_enabled: false,
                rom_bank: 1,
                ram_bank: 0,
            },
        };

        Ok(Cartridge {
            header,
            mbc,
            rom,
            ram,
            ram_dirty: false,
        })
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    /// 0x0000-0x3FFF: always bank 0.
    pub fn read_rom_low(&self, address: u16) -> u8 {
        self.rom.get(address as usize).copied().unwrap_or(INVALID_READ)
    }

    /// 0x4000-0x7FFF: the switchable bank.
    pub fn read_rom_high(&self, address: u16) -> u8 {
        let bank = self.mbc.rom_bank();
        if bank >= self.header.rom_banks {
            log::warn!(
                "ROM bank {} selected but only {} banks exist",
                bank,
                self.header.rom_banks
            );
            return INVALID_READ;
        }

        let index = (address as usize & (ROM_BANK_SIZE - 1)) | (bank * ROM_BANK_SIZE);
        self.rom.get(index).copied().unwrap_or(INVALID_READ)
    }

    /// 0xA000-0xBFFF: banked external RAM, MBC2 nibble RAM, or the latched
    /// RTC register.
    pub fn read_external_ram(&self, address: u16) -> u8 {
        if !self.mbc.ram_enabled() {
            return 0x00;
        }

        if let Some(rtc) = self.mbc.rtc() {
            if rtc.register_selected() {
                return rtc.read_selected();
            }
        }

        if let Mbc::Mbc2 { .. } = self.mbc {
            let nibble = self.ram[address as usize & (MBC2_RAM_SIZE - 1)];
            return 0xF0 | nibble;
        }

        match self.ram_index(address) {
            Some(index) => self.ram[index],
            None => 0x00,
        }
    }

    /// Control writes (0x0000-0x7FFF) and RAM writes (0xA000-0xBFFF).
    pub fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x7FFF => self.mbc.control_write(address, value),
            0xA000..=0xBFFF => self.write_external_ram(address, value),
            _ => log::warn!("Cartridge write outside its ranges: 0x{:04X}", address),
        }
    }

    fn write_external_ram(&mut self, address: u16, value: u8) {
        if !self.mbc.ram_enabled() {
            return;
        }

        if self.header.has_battery {
            self.ram_dirty = true;
        }

        if let Some(rtc) = self.mbc.rtc_mut() {
            if rtc.register_selected() {
                rtc.write_selected(value);
                return;
            }
        }

        if let Mbc::Mbc2 { .. } = self.mbc {
            self.ram[address as usize & (MBC2_RAM_SIZE - 1)] = value & 0x0F;
            return;
        }

        if let Some(index) = self.ram_index(address) {
            self.ram[index] = value;
        }
    }

    fn ram_index(&self, address: u16) -> Option<usize> {
        let bank = self.mbc.ram_bank();
        if bank >= self.header.ram_banks {
            log::warn!(
                "RAM bank {} selected but only {} banks exist",
                bank,
                self.header.ram_banks
            );
            return None;
        }
        Some((address - EXTERNAL_RAM_START) as usize + bank * RAM_BANK_SIZE)
    }

    pub fn has_battery(&self) -> bool {
        self.header.has_battery
    }

    pub fn is_dirty(&self) -> bool {
        self.ram_dirty
    }

    /// The battery save image: raw RAM banks, concatenated. Clears the
    /// dirty flag.
    pub fn take_save_data(&mut self) -> Vec<u8> {
        self.ram_dirty = false;
        self.ram.clone()
    }

    /// The RTC sidecar blob for mapper-3 carts with a clock.
    pub fn rtc_snapshot(&self) -> Option<Vec<u8>> {
        self.mbc.rtc().map(|rtc| SerBin::serialize_bin(&rtc.snapshot()))
    }

    /// Surrender the ROM image, e.g. to rebuild the cartridge on reset.
    pub fn take_rom(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.rom)
    }
}

/// Build a minimal ROM image with a valid header, every bank tagged with its
/// own number so bank selection is observable.
#[cfg(test)]
pub(crate) fn test_rom(mapper_code: u8, rom_size_code: u8, ram_size_code: u8) -> Vec<u8> {
    let banks = match rom_size_code {
        0x00..=0x06 => 2usize << rom_size_code,
        _ => 2,
    };
    let mut rom = vec![0u8; banks * ROM_BANK_SIZE];
    rom[0x147] = mapper_code;
    rom[0x148] = rom_size_code;
    rom[0x149] = ram_size_code;
    for bank in 0..banks {
        rom[bank * ROM_BANK_SIZE] = bank as u8;
    }
    rom
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rom_bank_zero_reads_are_identity() {
        let rom = test_rom(0x01, 0x02, 0x00);
        let cartridge = Cartridge::new(rom.clone(), None, None).unwrap();

        for address in [0x0000u16, 0x0147, 0x2000, 0x3FFF] {
            assert_eq!(cartridge.read_rom_low(address), rom[address as usize]);
        }
    }

    #[test]
    fn mbc1_bank_select_with_bump() {
        // 128 KiB: 8 banks.
        let rom = test_rom(0x01, 0x02, 0x00);
        let mut cartridge = Cartridge::new(rom.clone(), None, None).unwrap();

        cartridge.write_byte(0x2100, 0x01);
        assert_eq!(cartridge.read_rom_high(0x4000), rom[ROM_BANK_SIZE]);

        // Selecting bank 0 lands on bank 1, not on the fixed bank.
        cartridge.write_byte(0x2100, 0x00);
        assert_eq!(cartridge.read_rom_high(0x4000), rom[ROM_BANK_SIZE]);

        cartridge.write_byte(0x2100, 0x05);
        assert_eq!(cartridge.read_rom_high(0x4000), 5);
    }

    #[test]
    fn disabled_ram_reads_zero_and_swallows_writes() {
        let rom = test_rom(0x03, 0x01, 0x03);
        let mut cartridge = Cartridge::new(rom, None, None).unwrap();

        cartridge.write_byte(0xA000, 0x55);
        assert_eq!(cartridge.read_external_ram(0xA000), 0x00);

        cartridge.write_byte(0x0000, 0x0A);
        cartridge.write_byte(0xA000, 0x55);
        assert_eq!(cartridge.read_external_ram(0xA000), 0x55);
    }

    #[test]
    fn ram_banks_are_distinct() {
        let rom = test_rom(0x03, 0x01, 0x03);
        let mut cartridge = Cartridge::new(rom, None, None).unwrap();

        cartridge.write_byte(0x0000, 0x0A);
        cartridge.write_byte(0x4000, 0x00);
        cartridge.write_byte(0xA000, 0x11);
        cartridge.write_byte(0x4000, 0x02);
        cartridge.write_byte(0xA000, 0x22);

        cartridge.write_byte(0x4000, 0x00);
        assert_eq!(cartridge.read_external_ram(0xA000), 0x11);
        cartridge.write_byte(0x4000, 0x02);
        assert_eq!(cartridge.read_external_ram(0xA000), 0x22);
    }

    #[test]
    fn mbc2_ram_is_nibble_sized_and_mirrored() {
        let rom = test_rom(0x06, 0x01, 0x00);
        let mut cartridge = Cartridge::new(rom, None, None).unwrap();

        cartridge.write_byte(0x0000, 0x0A);
        cartridge.write_byte(0xA000, 0xFF);
        assert_eq!(cartridge.read_external_ram(0xA000), 0xFF);
        // Only the low nibble is stored; the mirror at +0x200 sees it too.
        cartridge.write_byte(0xA010, 0xA5);
        assert_eq!(cartridge.read_external_ram(0xA010), 0xF5);
        assert_eq!(cartridge.read_external_ram(0xA210), 0xF5);
    }

    #[test]
    fn battery_write_sets_dirty_until_taken() {
        let rom = test_rom(0x03, 0x01, 0x03);
        let mut cartridge = Cartridge::new(rom, None, None).unwrap();
        assert!(!cartridge.is_dirty());

        cartridge.write_byte(0x0000, 0x0A);
        cartridge.write_byte(0xA000, 0x01);
        assert!(cartridge.is_dirty());

        let save = cartridge.take_save_data();
        assert_eq!(save.len(), 4 * RAM_BANK_SIZE);
        assert_eq!(save[0], 0x01);
        assert!(!cartridge.is_dirty());
    }

    #[test]
    fn save_round_trip_is_byte_identical() {
        let rom = test_rom(0x03, 0x01, 0x03);
        let mut cartridge = Cartridge::new(rom.clone(), None, None).unwrap();

        cartridge.write_byte(0x0000, 0x0A);
        for i in 0..64u16 {
            cartridge.write_byte(0xA000 + i, i as u8);
        }
        let save = cartridge.take_save_data();

        let mut restored = Cartridge::new(rom, Some(&save), None).unwrap();
        restored.write_byte(0x0000, 0x0A);
        for i in 0..64u16 {
            assert_eq!(restored.read_external_ram(0xA000 + i), i as u8);
        }
        assert_eq!(restored.take_save_data(), save);
    }

    #[test]
    fn undersized_save_is_rejected() {
        let rom = test_rom(0x03, 0x01, 0x03);
        let save = vec![0u8; RAM_BANK_SIZE];
        match Cartridge::new(rom, Some(&save), None) {
            Err(LoadError::SaveSizeMismatch { expected, got }) => {
                assert_eq!(expected, 4 * RAM_BANK_SIZE);
                assert_eq!(got, RAM_BANK_SIZE);
            }
            other => panic!("expected size mismatch, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn rtc_register_window_shadows_ram() {
        let rom = test_rom(0x10, 0x01, 0x03);
        let mut cartridge = Cartridge::new(rom, None, None).unwrap();

        cartridge.write_byte(0x0000, 0x0A);
        cartridge.write_byte(0xA000, 0x77);

        // Select the seconds register and write through the RAM window.
        cartridge.write_byte(0x4000, 0x08);
        cartridge.write_byte(0xA000, 30);
        cartridge.write_byte(0x6000, 0x00);
        cartridge.write_byte(0x6000, 0x01);
        let seconds = cartridge.read_external_ram(0xA000);
        assert!((30..=31).contains(&seconds));

        // Back to RAM banking: the earlier byte is still there.
        cartridge.write_byte(0x4000, 0x00);
        assert_eq!(cartridge.read_external_ram(0xA000), 0x77);
    }
}
