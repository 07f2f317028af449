use crate::interrupt::{Interrupt, InterruptController};

/// Cycles between a TIMA overflow and the TMA reload.
const RELOAD_DELAY: u8 = 3;

/// Divider bit watched by TIMA for each TAC clock select.
const TAC_BITS: [u16; 4] = [9, 3, 5, 7];

/// DIV/TIMA/TMA/TAC.
///
/// TIMA is clocked by the falling edge of `TAC.enable && div[bit]`, so any
/// write that makes that signal drop (DIV reset, TAC change) can increment it.
#[derive(Clone, Debug, Default)]
pub struct Timer {
    /// Internal 16-bit divider; DIV is the upper byte.
    pub div: u16,
    pub tima: u8,
    pub tma: u8,
    pub tac: u8,
    last_signal: bool,
    /// TMA value before a write this cycle, used if a reload lands on it.
    tma_latch: Option<u8>,
    pending_reload: Option<u8>,
    reload_delay: u8,
    /// Set during the cycle in which TIMA was reloaded.
    reloading: bool,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timer with the divider already running, as left by the boot ROM.
    pub fn with_divider(div: u16) -> Self {
        Self {
            div,
            ..Self::default()
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF04 => (self.div >> 8) as u8,
            0xFF05 => self.tima,
            0xFF06 => self.tma,
            0xFF07 => self.tac | 0xF8,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8, ints: &mut InterruptController) {
        match addr {
            0xFF04 => self.reset_div(ints),
            0xFF05 => {
                // Ignored on the reload cycle itself.
                if self.reloading || (self.pending_reload.is_some() && self.reload_delay == 0) {
                    return;
                }
                self.tima = val;
                // Cancels a reload that has not happened yet.
                self.pending_reload = None;
                self.reload_delay = 0;
            }
            0xFF06 => {
                self.tma_latch = Some(self.tma);
                self.tma = val;
                if self.pending_reload.is_some() {
                    self.pending_reload = Some(val);
                }
                if self.reloading {
                    self.tima = val;
                }
            }
            0xFF07 => {
                let prev = signal(self.div, self.tac);
                self.tac = val & 0x07;
                self.clock_edge(prev);
            }
            _ => {}
        }
    }

    /// Advance by `cycles` main-clock cycles.
    pub fn tick(&mut self, cycles: u32, ints: &mut InterruptController) {
        for _ in 0..cycles {
            self.run_reload(ints);
            let prev = self.last_signal;
            self.div = self.div.wrapping_add(1);
            self.clock_edge(prev);
        }
    }

    /// Zero the divider (any write to DIV, or STOP).
    pub fn reset_div(&mut self, ints: &mut InterruptController) {
        self.run_reload(ints);
        let prev = signal(self.div, self.tac);
        self.div = 0;
        self.clock_edge(prev);
    }

    /// True while TIMA holds 0 after an overflow, waiting for the reload.
    pub fn reload_pending(&self) -> bool {
        self.pending_reload.is_some()
    }

    fn run_reload(&mut self, ints: &mut InterruptController) {
        self.reloading = false;
        let Some(val) = self.pending_reload else {
            return;
        };
        if self.reload_delay == 0 {
            self.tima = val;
            self.pending_reload = None;
            self.reloading = true;
            ints.request(Interrupt::Timer);
        } else {
            self.reload_delay -= 1;
        }
    }

    fn clock_edge(&mut self, prev: bool) {
        let now = signal(self.div, self.tac);
        let tma_old = self.tma_latch.take();
        if prev && !now {
            self.increment(tma_old);
        }
        self.last_signal = now;
    }

    fn increment(&mut self, tma_old: Option<u8>) {
        let (next, overflow) = self.tima.overflowing_add(1);
        self.tima = next;
        if overflow {
            self.pending_reload = Some(tma_old.unwrap_or(self.tma));
            self.reload_delay = RELOAD_DELAY;
        }
    }
}

fn signal(div: u16, tac: u8) -> bool {
    tac & 0x04 != 0 && (div >> TAC_BITS[(tac & 0x03) as usize]) & 1 != 0
}
