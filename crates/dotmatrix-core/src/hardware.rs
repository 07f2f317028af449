use crate::cartridge::Cartridge;

/// Main clock frequency in Hz.
pub const CLOCK_HZ: u32 = 4_194_304;

/// Default host sample rate for the sound unit.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Console family being emulated.
pub enum Model {
    Dmg,
    Cgb,
}

impl Model {
    /// Model a cartridge asks for: CGB when the header advertises colour
    /// support, DMG otherwise.
    pub fn for_cartridge(cart: &Cartridge) -> Self {
        if cart.header().supports_cgb() {
            Model::Cgb
        } else {
            Model::Dmg
        }
    }

    pub const fn is_cgb(self) -> bool {
        matches!(self, Model::Cgb)
    }

    /// Expected boot ROM size.
    pub const fn boot_rom_len(self) -> usize {
        match self {
            Model::Dmg => 0x100,
            Model::Cgb => 0x900,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
/// DMG hardware revision.
///
/// Only the register state left behind by the boot ROM differs between
/// revisions here.
pub enum DmgRevision {
    Rev0,
    RevA,
    RevB,
    #[default]
    RevC,
}

impl DmgRevision {
    /// Divider value at the moment the boot ROM hands over to the cartridge.
    pub const fn post_boot_div(self) -> u16 {
        match self {
            DmgRevision::Rev0 => 0x1830,
            _ => 0xABCC,
        }
    }
}

/// Divider value left behind by the CGB boot ROM.
pub const CGB_POST_BOOT_DIV: u16 = 0x267C;

/// Host-facing knobs for a [`GameBoy`](crate::gameboy::GameBoy).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// `None` picks the model from the cartridge header.
    pub model: Option<Model>,
    pub dmg_revision: DmgRevision,
    pub sample_rate: u32,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            model: None,
            dmg_revision: DmgRevision::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

impl EmulatorConfig {
    pub fn resolve_model(&self, cart: &Cartridge) -> Model {
        self.model.unwrap_or_else(|| Model::for_cartridge(cart))
    }
}
