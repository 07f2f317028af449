//! Cycle-accurate Game Boy / Game Boy Color emulation core.
//!
//! Everything the emulated machine owns lives inside a single [`gameboy::GameBoy`]
//! value. Hosts create one from a [`cartridge::Cartridge`], call
//! [`gameboy::GameBoy::advance`] or [`gameboy::GameBoy::run_frame`] in a loop,
//! and pull finished frames and audio samples out through the hand-off types in
//! [`frame`] and [`audio_queue`].

/// Sound unit: four channel generators, frame sequencer and mixer.
pub mod apu;

/// Lock-free single-producer/single-consumer stereo sample ring.
pub mod audio_queue;

/// Cartridge header parsing, memory bank controllers and the MBC3 clock.
pub mod cartridge;

/// Instruction execution unit.
pub mod cpu;

/// Construction-time error types.
pub mod error;

/// Finished-frame buffers and the cross-thread frame hand-off.
pub mod frame;

/// Scheduler tying the processor and peripherals together.
pub mod gameboy;

/// Hardware models, revisions and emulator configuration.
pub mod hardware;

/// Joypad input latch.
pub mod input;

/// Interrupt enable/request registers.
pub mod interrupt;

/// Memory map and I/O routing.
pub mod mmu;

/// Opcode descriptor tables.
pub mod opcodes;

/// Pixel processing unit.
pub mod ppu;

/// Serial port.
pub mod serial;

/// Divider and programmable timer.
pub mod timer;

pub use cartridge::Cartridge;
pub use error::{BootRomError, CartridgeError};
pub use gameboy::GameBoy;
pub use hardware::{EmulatorConfig, Model};
