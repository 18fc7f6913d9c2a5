//! Banking controllers as a closed set of tagged variants. All control
//! writes to the ROM window funnel through [`Mbc::control_write`]; the
//! cartridge asks the controller which banks are in effect afterwards.

use crate::hardware::cartridge::rtc::Rtc;

/// 16 KiB per ROM bank.
pub const ROM_BANK_SIZE: usize = 0x4000;
/// 8 KiB per external RAM bank.
pub const RAM_BANK_SIZE: usize = 0x2000;
/// Mapper kind 2 carries 512 nibbles of internal RAM instead of banks.
pub const MBC2_RAM_SIZE: usize = 0x200;

#[derive(Debug)]
pub enum Mbc {
    None,
    Mbc1 {
        ram_enabled: bool,
        /// Lower five bank bits, as last written.
        rom_bank_low: u8,
        /// Two-bit secondary register: upper ROM bits or RAM bank.
        upper_bits: u8,
        /// False = ROM banking mode, true = RAM banking mode.
        ram_mode: bool,
        rom_banks: usize,
    },
    Mbc2 {
        ram_enabled: bool,
        rom_bank: u8,
    },
    Mbc3 {
        ram_enabled: bool,
        rom_bank: u8,
        ram_bank: u8,
        rtc: Option<Rtc>,
    },
    Mbc5 {
        ram_enabled: bool,
        rom_bank: u16,
        ram_bank: u8,
    },
}

impl Mbc {
    /// Handle a write anywhere in 0x0000-0x7FFF.
    pub fn control_write(&mut self, address: u16, value: u8) {
        match self {
            Mbc::None => {}
            Mbc::Mbc1 {
                ram_enabled,
                rom_bank_low,
                upper_bits,
                ram_mode,
                rom_banks,
            } => match address {
                0x0000..=0x1FFF => *ram_enabled = value & 0x0F == 0x0A,
                0x2000..=0x3FFF => *rom_bank_low = value & 0x1F,
                0x4000..=0x5FFF => {
                    // In ROM mode these bits only stick on carts large
                    // enough to need them.
                    if *ram_mode || *rom_banks > 32 {
                        *upper_bits = value & 0x03;
                    }
                }
                0x6000..=0x7FFF => *ram_mode = value & 0x01 == 0x01,
                _ => {}
            },
            Mbc::Mbc2 { ram_enabled, rom_bank } => {
                if let 0x0000..=0x3FFF = address {
                    // Address bit 8 steers the write: set selects the ROM
                    // bank register, clear the RAM enable latch.
                    if address & 0x0100 != 0 {
                        *rom_bank = value & 0x0F;
                        if *rom_bank == 0 {
                            *rom_bank = 1;
                        }
                    } else {
                        *ram_enabled = value & 0x0F == 0x0A;
                    }
                }
            }
            Mbc::Mbc3 {
                ram_enabled,
                rom_bank,
                ram_bank,
                rtc,
            } => match address {
                0x0000..=0x1FFF => *ram_enabled = value & 0x0F == 0x0A,
                0x2000..=0x3FFF => {
                    *rom_bank = value & 0x7F;
                    if *rom_bank == 0 {
                        *rom_bank = 1;
                    }
                }
                0x4000..=0x5FFF => {
                    let value = value & 0x0F;
                    if value <= 0x03 {
                        *ram_bank = value;
                        if let Some(rtc) = rtc {
                            rtc.deselect();
                        }
                    } else if (0x08..=0x0C).contains(&value) {
                        if let Some(rtc) = rtc {
                            rtc.select(value);
                        }
                    }
                }
                0x6000..=0x7FFF => {
                    if let Some(rtc) = rtc {
                        rtc.write_latch(value);
                    }
                }
                _ => {}
            },
            Mbc::Mbc5 {
                ram_enabled,
                rom_bank,
                ram_bank,
            } => match address {
                0x0000..=0x1FFF => *ram_enabled = value & 0x0F == 0x0A,
                0x2000..=0x2FFF => *rom_bank = (*rom_bank & 0x0100) | value as u16,
                0x3000..=0x3FFF => *rom_bank = (*rom_bank & 0x00FF) | ((value as u16 & 0x1) << 8),
                0x4000..=0x5FFF => *ram_bank = value & 0x0F,
                _ => {}
            },
        }
    }

    /// The bank currently mapped at 0x4000-0x7FFF.
    pub fn rom_bank(&self) -> usize {
        match self {
            Mbc::None => 1,
            Mbc::Mbc1 {
                rom_bank_low,
                upper_bits,
                ram_mode,
                ..
            } => {
                let upper = if *ram_mode { 0 } else { *upper_bits };
                let mut bank = ((upper as usize) << 5) | *rom_bank_low as usize;
                // Banks 0x00/0x20/0x40/0x60 are never selectable; the chip
                // steps to the next one.
                if bank & 0x1F == 0 {
                    bank += 1;
                }
                bank
            }
            Mbc::Mbc2 { rom_bank, .. } => *rom_bank as usize,
            Mbc::Mbc3 { rom_bank, .. } => *rom_bank as usize,
            Mbc::Mbc5 { rom_bank, .. } => *rom_bank as usize,
        }
    }

    pub fn ram_bank(&self) -> usize {
        match self {
            Mbc::None | Mbc::Mbc2 { .. } => 0,
            Mbc::Mbc1 { upper_bits, ram_mode, .. } => {
                if *ram_mode {
                    *upper_bits as usize
                } else {
                    0
                }
            }
            Mbc::Mbc3 { ram_bank, .. } => *ram_bank as usize,
            Mbc::Mbc5 { ram_bank, .. } => *ram_bank as usize,
        }
    }

    pub fn ram_enabled(&self) -> bool {
        match self {
            Mbc::None => true,
            Mbc::Mbc1 { ram_enabled, .. }
            | Mbc::Mbc2 { ram_enabled, .. }
            | Mbc::Mbc3 { ram_enabled, .. }
            | Mbc::Mbc5 { ram_enabled, .. } => *ram_enabled,
        }
    }

    pub fn rtc(&self) -> Option<&Rtc> {
        match self {
            Mbc::Mbc3 { rtc, .. } => rtc.as_ref(),
            _ => None,
        }
    }

    pub fn rtc_mut(&mut self) -> Option<&mut Rtc> {
        match self {
            Mbc::Mbc3 { rtc, .. } => rtc.as_mut(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mbc1(rom_banks: usize) -> Mbc {
        Mbc::Mbc1 {
            ram_enabled: false,
            rom_bank_low: 1,
            upper_bits: 0,
            ram_mode: false,
            rom_banks,
        }
    }

    #[test]
    fn mbc1_bank_zero_bumps_to_one() {
        let mut mbc = mbc1(8);
        mbc.control_write(0x2100, 0x01);
        assert_eq!(mbc.rom_bank(), 1);

        mbc.control_write(0x2100, 0x00);
        assert_eq!(mbc.rom_bank(), 1);
    }

    #[test]
    fn mbc1_upper_bits_extend_the_bank_on_large_carts() {
        let mut mbc = mbc1(64);
        mbc.control_write(0x2000, 0x12);
        mbc.control_write(0x4000, 0x01);
        assert_eq!(mbc.rom_bank(), 0x32);

        // 0x20 is one of the dead banks: selecting it lands on 0x21.
        mbc.control_write(0x2000, 0x00);
        assert_eq!(mbc.rom_bank(), 0x21);
    }

    #[test]
    fn mbc1_ram_mode_redirects_upper_bits() {
        let mut mbc = mbc1(8);
        mbc.control_write(0x6000, 0x01);
        mbc.control_write(0x4000, 0x02);
        assert_eq!(mbc.ram_bank(), 2);
        assert_eq!(mbc.rom_bank(), 1);
    }

    #[test]
    fn mbc2_write_gating_by_address_bit_8() {
        let mut mbc = Mbc::Mbc2 {
            ram_enabled: false,
            rom_bank: 1,
        };
        // Bit 8 clear: RAM enable latch.
        mbc.control_write(0x0000, 0x0A);
        assert!(mbc.ram_enabled());
        assert_eq!(mbc.rom_bank(), 1);

        // Bit 8 set: ROM bank register.
        mbc.control_write(0x2100, 0x07);
        assert_eq!(mbc.rom_bank(), 7);

        mbc.control_write(0x2100, 0x00);
        assert_eq!(mbc.rom_bank(), 1);
    }

    #[test]
    fn mbc3_ram_bank_and_rtc_select_share_a_register() {
        let mut mbc = Mbc::Mbc3 {
            ram_enabled: true,
            rom_bank: 1,
            ram_bank: 0,
            rtc: Some(Rtc::new()),
        };

        mbc.control_write(0x4000, 0x02);
        assert_eq!(mbc.ram_bank(), 2);
        assert!(!mbc.rtc().unwrap().register_selected());

        mbc.control_write(0x4000, 0x08);
        assert!(mbc.rtc().unwrap().register_selected());

        mbc.control_write(0x4000, 0x01);
        assert!(!mbc.rtc().unwrap().register_selected());
    }

    #[test]
    fn mbc5_nine_bit_rom_bank() {
        let mut mbc = Mbc::Mbc5 {
            ram_enabled: false,
            rom_bank: 1,
            ram_bank: 0,
        };
        mbc.control_write(0x2000, 0x34);
        mbc.control_write(0x3000, 0x01);
        assert_eq!(mbc.rom_bank(), 0x134);

        // Unlike the other controllers, bank 0 is a legal selection.
        mbc.control_write(0x2000, 0x00);
        mbc.control_write(0x3000, 0x00);
        assert_eq!(mbc.rom_bank(), 0);
    }
}
