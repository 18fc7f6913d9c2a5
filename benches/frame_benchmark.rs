use criterion::{criterion_group, criterion_main, Criterion};

use pocketboy_core::{Emulator, EmulatorConfigBuilder};

/// A minimal but valid ROM: header plus an infinite loop at the entry
/// point, enough to keep the interpreter, PPU and APU all busy.
fn synthetic_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x147] = 0x00; // no mapper
    rom[0x148] = 0x00; // 2 banks
    rom[0x149] = 0x00;
    // JP 0x0150
    rom[0x100] = 0xC3;
    rom[0x101] = 0x50;
    rom[0x102] = 0x01;
    // 0x0150: JR -2
    rom[0x150] = 0x18;
    rom[0x151] = 0xFE;
    rom
}

fn frame_benchmark(c: &mut Criterion) {
    let config = EmulatorConfigBuilder::new().skip_boot_rom(true).build();
    let mut emulator = Emulator::new(config);
    emulator
        .load_cartridge(synthetic_rom(), None)
        .expect("synthetic ROM should load");

    c.bench_function("emulate one frame", |b| b.iter(|| emulator.update()));
}

criterion_group!(benches, frame_benchmark);
criterion_main!(benches);
