use crate::interrupt::{Interrupt, InterruptController};

/// Cycles per shifted bit with the internal clock (8192 Hz).
const SLOW_BIT_CYCLES: u32 = 512;
/// CGB high-speed internal clock (262144 Hz).
const FAST_BIT_CYCLES: u32 = 16;

/// Whatever sits on the other end of the link cable.
pub trait LinkPort: Send {
    /// Exchange one byte; returns the byte shifted in from the partner.
    fn exchange(&mut self, outgoing: u8) -> u8;
}

/// No cable attached: the input line floats high.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disconnected;

impl LinkPort for Disconnected {
    fn exchange(&mut self, _outgoing: u8) -> u8 {
        0xFF
    }
}

#[derive(Debug, Clone, Copy)]
struct Transfer {
    outgoing: u8,
    incoming: u8,
    bits_left: u8,
    countdown: u32,
    bit_cycles: u32,
}

/// SB (0xFF01) and SC (0xFF02).
pub struct Serial {
    sb: u8,
    sc: u8,
    cgb: bool,
    transfer: Option<Transfer>,
    port: Box<dyn LinkPort>,
    sent: Vec<u8>,
}

impl Serial {
    pub fn new(cgb: bool) -> Self {
        Self {
            sb: 0,
            sc: if cgb { 0x7F } else { 0x7E },
            cgb,
            transfer: None,
            port: Box::new(Disconnected),
            sent: Vec::new(),
        }
    }

    pub fn connect(&mut self, port: Box<dyn LinkPort>) {
        self.port = port;
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0xFF01 => self.sb,
            0xFF02 if self.cgb => self.sc | 0x7C,
            0xFF02 => self.sc | 0x7E,
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF01 => self.sb = val,
            0xFF02 => {
                self.sc = val;
                self.transfer = None;
                // External-clock transfers wait for a partner that never
                // clocks, so only internal-clock ones are scheduled.
                if val & 0x81 == 0x81 {
                    let fast = self.cgb && val & 0x02 != 0;
                    let bit_cycles = if fast { FAST_BIT_CYCLES } else { SLOW_BIT_CYCLES };
                    self.transfer = Some(Transfer {
                        outgoing: self.sb,
                        incoming: self.port.exchange(self.sb),
                        bits_left: 8,
                        countdown: bit_cycles,
                        bit_cycles,
                    });
                }
            }
            _ => {}
        }
    }

    pub fn tick(&mut self, cycles: u32, ints: &mut InterruptController) {
        let Some(t) = self.transfer.as_mut() else {
            return;
        };
        let mut budget = cycles;
        while budget >= t.countdown {
            budget -= t.countdown;
            t.countdown = t.bit_cycles;
            self.sb = (self.sb << 1) | (t.incoming >> 7);
            t.incoming <<= 1;
            t.bits_left -= 1;
            if t.bits_left == 0 {
                self.sent.push(t.outgoing);
                self.sc &= 0x7F;
                self.transfer = None;
                ints.request(Interrupt::Serial);
                return;
            }
        }
        t.countdown -= budget;
    }

    pub fn transfer_active(&self) -> bool {
        self.sc & 0x80 != 0
    }

    /// Bytes sent by completed transfers since the last call.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.sent)
    }

    pub fn peek_output(&self) -> &[u8] {
        &self.sent
    }
}
