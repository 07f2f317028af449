/// One of the five interrupt sources, in priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interrupt {
    VBlank,
    LcdStat,
    Timer,
    Serial,
    Joypad,
}

impl Interrupt {
    pub const ALL: [Interrupt; 5] = [
        Interrupt::VBlank,
        Interrupt::LcdStat,
        Interrupt::Timer,
        Interrupt::Serial,
        Interrupt::Joypad,
    ];

    /// Bit in IE/IF.
    pub const fn mask(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::LcdStat => 0x02,
            Interrupt::Timer => 0x04,
            Interrupt::Serial => 0x08,
            Interrupt::Joypad => 0x10,
        }
    }

    /// Address the processor jumps to when servicing this interrupt.
    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::VBlank => 0x40,
            Interrupt::LcdStat => 0x48,
            Interrupt::Timer => 0x50,
            Interrupt::Serial => 0x58,
            Interrupt::Joypad => 0x60,
        }
    }

    /// Highest-priority source among the set bits of `bits`.
    pub fn highest(bits: u8) -> Option<Interrupt> {
        Self::ALL.into_iter().find(|i| bits & i.mask() != 0)
    }
}

const IF_MASK: u8 = 0x1F;

/// IE (0xFFFF) and IF (0xFF0F).
///
/// IF only holds five bits; the upper three read back as 1. IE is a plain
/// 8-bit register on hardware, so all of its bits are kept, but only the low
/// five take part in dispatch.
#[derive(Clone, Debug, Default)]
pub struct InterruptController {
    enable: u8,
    request: u8,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, interrupt: Interrupt) {
        self.request |= interrupt.mask();
    }

    pub fn acknowledge(&mut self, interrupt: Interrupt) {
        self.request &= !interrupt.mask();
    }

    pub fn is_requested(&self, interrupt: Interrupt) -> bool {
        self.request & interrupt.mask() != 0
    }

    /// Enabled and requested sources.
    pub fn pending(&self) -> u8 {
        self.enable & self.request & IF_MASK
    }

    pub fn has_pending(&self) -> bool {
        self.pending() != 0
    }

    pub fn next_pending(&self) -> Option<Interrupt> {
        Interrupt::highest(self.pending())
    }

    pub fn read_if(&self) -> u8 {
        self.request | !IF_MASK
    }

    pub fn write_if(&mut self, val: u8) {
        self.request = val & IF_MASK;
    }

    pub fn read_ie(&self) -> u8 {
        self.enable
    }

    pub fn write_ie(&mut self, val: u8) {
        self.enable = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vblank_wins_over_everything() {
        let mut ic = InterruptController::new();
        ic.write_ie(0x1F);
        ic.request(Interrupt::Joypad);
        ic.request(Interrupt::Timer);
        ic.request(Interrupt::VBlank);
        assert_eq!(ic.next_pending(), Some(Interrupt::VBlank));
        ic.acknowledge(Interrupt::VBlank);
        assert_eq!(ic.next_pending(), Some(Interrupt::Timer));
    }

    #[test]
    fn disabled_requests_are_not_pending() {
        let mut ic = InterruptController::new();
        ic.request(Interrupt::Serial);
        assert!(!ic.has_pending());
        assert!(ic.is_requested(Interrupt::Serial));
        ic.write_ie(Interrupt::Serial.mask());
        assert_eq!(ic.next_pending(), Some(Interrupt::Serial));
    }

    #[test]
    fn if_upper_bits_read_as_one() {
        let mut ic = InterruptController::new();
        ic.write_if(0xFF);
        assert_eq!(ic.read_if(), 0xFF);
        ic.write_if(0x00);
        assert_eq!(ic.read_if(), 0xE0);
        ic.write_if(0x05);
        assert_eq!(ic.read_if(), 0xE5);
    }

    #[test]
    fn ie_keeps_all_bits_but_dispatch_uses_five() {
        let mut ic = InterruptController::new();
        ic.write_ie(0xE0);
        assert_eq!(ic.read_ie(), 0xE0);
        ic.write_if(0x1F);
        assert_eq!(ic.pending(), 0);
    }
}
