use std::collections::VecDeque;

use crate::audio_queue::{AudioConsumer, AudioProducer, audio_queue};
use crate::hardware::{CLOCK_HZ, DEFAULT_SAMPLE_RATE};

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}

// 512 Hz, driven by the undoubled clock.
const FRAME_SEQUENCER_PERIOD: u32 = 8192;
const VOLUME_FACTOR: i16 = 64;
/// Keep at most this much audio when no host queue is attached.
const BUFFER_LATENCY_MS: usize = 40;
const WAVE_TRIGGER_DELAY: u32 = 6;

// Duty table for the pulse channels, indexed by NRx1 bits 6-7:
// 12.5%, 25%, 50%, 75%.
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 0, 0, 1],
    [1, 0, 0, 0, 0, 1, 1, 1],
    [0, 1, 1, 1, 1, 1, 1, 0],
];

fn read_mask(addr: u16) -> u8 {
    match addr {
        0xFF10 => 0x80,
        0xFF11 => 0x3F,
        0xFF12 => 0x00,
        0xFF13 => 0xFF,
        0xFF14 => 0xBF,
        0xFF16 => 0x3F,
        0xFF17 => 0x00,
        0xFF18 => 0xFF,
        0xFF19 => 0xBF,
        0xFF1A => 0x7F,
        0xFF1B => 0xFF,
        0xFF1C => 0x9F,
        0xFF1D => 0xFF,
        0xFF1E => 0xBF,
        0xFF20 => 0xFF,
        0xFF21 => 0x00,
        0xFF22 => 0x00,
        0xFF23 => 0xBF,
        0xFF24 => 0x00,
        0xFF25 => 0x00,
        0xFF26 => 0x70,
        0xFF30..=0xFF3F => 0x00,
        _ => 0xFF,
    }
}

/// Length counter shared by all four channels.
#[derive(Clone, Copy, Debug)]
struct LengthCounter {
    remaining: u16,
    max: u16,
    enabled: bool,
}

impl LengthCounter {
    fn new(max: u16) -> Self {
        Self {
            remaining: 0,
            max,
            enabled: false,
        }
    }

    fn load(&mut self, raw: u16) {
        self.remaining = self.max - (raw & (self.max - 1));
    }

    /// Returns true when the counter just expired.
    fn clock(&mut self) -> bool {
        if self.enabled && self.remaining > 0 {
            self.remaining -= 1;
            return self.remaining == 0;
        }
        false
    }

    /// Handles the NRx4 length-enable bit and trigger reload. `next_step_odd`
    /// is true when the upcoming frame sequencer step does not clock length.
    /// Returns true when the extra clock silenced the channel.
    fn write_control(&mut self, enable: bool, trigger: bool, next_step_odd: bool) -> bool {
        let was_enabled = self.enabled;
        self.enabled = enable;
        let mut expired = false;
        if !was_enabled && enable && next_step_odd && self.remaining > 0 {
            self.remaining -= 1;
            expired = self.remaining == 0 && !trigger;
        }
        if trigger && self.remaining == 0 {
            self.remaining = self.max;
            if enable && next_step_odd {
                self.remaining -= 1;
            }
        }
        expired
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct Envelope {
    initial: u8,
    period: u8,
    add: bool,
    volume: u8,
    timer: u8,
}

impl Envelope {
    fn write(&mut self, val: u8) {
        self.initial = val >> 4;
        self.period = val & 0x07;
        self.add = val & 0x08 != 0;
    }

    fn trigger(&mut self, next_step_is_envelope: bool) {
        self.volume = self.initial;
        self.timer = if self.period == 0 { 8 } else { self.period };
        if next_step_is_envelope {
            self.timer = self.timer.wrapping_add(1);
        }
    }

    fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer == 0 {
            self.timer = self.period;
            if self.add && self.volume < 15 {
                self.volume += 1;
            } else if !self.add && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }

    /// NRx2 write while the channel is playing ("zombie mode").
    fn zombie_update(&mut self, old_val: u8, new_val: u8) {
        let old_period = old_val & 0x07;
        let old_add = old_val & 0x08 != 0;
        let new_add = new_val & 0x08 != 0;
        let mut vol = self.volume;
        if old_period == 0 {
            let automatic = if old_add { vol < 15 } else { vol > 0 };
            if automatic {
                vol = vol.wrapping_add(1);
            } else if !old_add {
                vol = vol.wrapping_add(2);
            }
        }
        if old_add != new_add {
            vol = 16u8.wrapping_sub(vol);
        }
        self.volume = vol & 0x0F;
        self.write(new_val);
    }
}

#[derive(Default, Clone, Copy, Debug)]
struct Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
    /// Set once a subtraction has been computed since the last trigger.
    neg_used: bool,
}

impl Sweep {
    fn calculate(&mut self) -> u16 {
        let delta = self.shadow >> self.shift;
        if self.negate {
            self.neg_used = true;
            self.shadow.wrapping_sub(delta)
        } else {
            self.shadow.wrapping_add(delta)
        }
    }

    /// Returns true when clearing the negate bit after a subtraction
    /// disables the channel.
    fn write(&mut self, val: u8) -> bool {
        let old_negate = self.negate;
        self.period = (val >> 4) & 0x07;
        self.negate = val & 0x08 != 0;
        self.shift = val & 0x07;
        old_negate && !self.negate && self.neg_used
    }

    /// Returns false when the overflow check on trigger disables the channel.
    fn trigger(&mut self, frequency: u16) -> bool {
        self.shadow = frequency;
        self.timer = if self.period == 0 { 8 } else { self.period };
        self.enabled = self.period != 0 || self.shift != 0;
        self.neg_used = false;
        !(self.shift != 0 && self.calculate() > 2047)
    }
}

#[derive(Clone, Debug)]
struct SquareChannel {
    enabled: bool,
    dac_enabled: bool,
    length: LengthCounter,
    duty: u8,
    duty_pos: u8,
    frequency: u16,
    timer: u32,
    envelope: Envelope,
    sweep: Option<Sweep>,
}

impl SquareChannel {
    fn new(with_sweep: bool) -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length: LengthCounter::new(64),
            duty: 0,
            duty_pos: 0,
            frequency: 0,
            timer: 0,
            envelope: Envelope::default(),
            sweep: with_sweep.then(Sweep::default),
        }
    }

    fn period(&self) -> u32 {
        (2048 - u32::from(self.frequency & 0x07FF)) * 4
    }

    fn step(&mut self, cycles: u32) {
        if !self.enabled {
            return;
        }
        let mut cycles = cycles;
        while self.timer <= cycles {
            cycles -= self.timer;
            self.timer = self.period();
            self.duty_pos = (self.duty_pos + 1) & 7;
        }
        self.timer -= cycles;
    }

    fn output(&self) -> u8 {
        if !self.enabled || !self.dac_enabled {
            return 0;
        }
        DUTY_TABLE[self.duty as usize][self.duty_pos as usize] * self.envelope.volume
    }

    fn clock_length(&mut self) {
        if self.length.clock() {
            self.enabled = false;
        }
    }

    fn clock_sweep(&mut self) {
        let Some(sweep) = self.sweep.as_mut() else {
            return;
        };
        if sweep.timer > 0 {
            sweep.timer -= 1;
        }
        if sweep.timer != 0 {
            return;
        }
        sweep.timer = if sweep.period == 0 { 8 } else { sweep.period };
        if !sweep.enabled || sweep.period == 0 {
            return;
        }
        let next = sweep.calculate();
        if next > 2047 {
            self.enabled = false;
        } else if sweep.shift != 0 {
            sweep.shadow = next;
            self.frequency = next;
            if sweep.calculate() > 2047 {
                self.enabled = false;
            }
        }
    }
}

#[derive(Clone, Debug)]
struct WaveChannel {
    enabled: bool,
    dac_enabled: bool,
    length: LengthCounter,
    volume_code: u8,
    position: u8,
    sample: u8,
    frequency: u16,
    timer: u32,
}

impl WaveChannel {
    fn new() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length: LengthCounter::new(256),
            volume_code: 0,
            position: 0,
            sample: 0,
            frequency: 0,
            timer: 0,
        }
    }

    fn period(&self) -> u32 {
        (2048 - u32::from(self.frequency & 0x07FF)) * 2
    }

    fn step(&mut self, cycles: u32, wave_ram: &[u8; 0x10]) {
        if !self.enabled {
            return;
        }
        let mut cycles = cycles;
        while self.timer <= cycles {
            cycles -= self.timer;
            self.timer = self.period();
            self.position = (self.position + 1) & 0x1F;
            let byte = wave_ram[(self.position / 2) as usize];
            self.sample = if self.position & 1 == 0 {
                byte >> 4
            } else {
                byte & 0x0F
            };
        }
        self.timer -= cycles;
    }

    fn output(&self) -> u8 {
        if !self.enabled || !self.dac_enabled {
            return 0;
        }
        match self.volume_code {
            1 => self.sample,
            2 => self.sample >> 1,
            3 => self.sample >> 2,
            _ => 0,
        }
    }

    fn clock_length(&mut self) {
        if self.length.clock() {
            self.enabled = false;
        }
    }
}

#[derive(Clone, Debug)]
struct NoiseChannel {
    enabled: bool,
    dac_enabled: bool,
    length: LengthCounter,
    envelope: Envelope,
    clock_shift: u8,
    divisor: u8,
    width7: bool,
    lfsr: u16,
    timer: u32,
}

impl NoiseChannel {
    fn new() -> Self {
        Self {
            enabled: false,
            dac_enabled: false,
            length: LengthCounter::new(64),
            envelope: Envelope::default(),
            clock_shift: 0,
            divisor: 0,
            width7: false,
            lfsr: 0,
            timer: 0,
        }
    }

    fn period(&self) -> u32 {
        let r = match self.divisor {
            0 => 8,
            d => u32::from(d) * 16,
        };
        r << self.clock_shift
    }

    fn step(&mut self, cycles: u32) {
        // Shifts 14 and 15 never clock the LFSR.
        if !self.enabled || self.clock_shift >= 14 {
            return;
        }
        let mut cycles = cycles;
        while self.timer <= cycles {
            cycles -= self.timer;
            self.timer = self.period();
            // Feedback is the XNOR of bits 0 and 1, starting from an all-zero register.
            let bit = !(self.lfsr ^ (self.lfsr >> 1)) & 1;
            self.lfsr >>= 1;
            self.lfsr |= bit << 14;
            if self.width7 {
                self.lfsr = (self.lfsr & !0x40) | (bit << 6);
            }
        }
        self.timer -= cycles;
    }

    fn output(&self) -> u8 {
        if !self.enabled || !self.dac_enabled || self.lfsr & 1 != 0 {
            return 0;
        }
        self.envelope.volume
    }

    fn clock_length(&mut self) {
        if self.length.clock() {
            self.enabled = false;
        }
    }
}

/// First-order high-pass filter removing the DC offset of the DACs.
#[derive(Clone, Copy, Debug, Default)]
struct DcBlocker {
    prev_in: f32,
    prev_out: f32,
}

impl DcBlocker {
    fn filter(&mut self, input: f32, coef: f32) -> f32 {
        let out = input - self.prev_in + coef * self.prev_out;
        self.prev_in = input;
        self.prev_out = out;
        out
    }
}

pub struct Apu {
    ch1: SquareChannel,
    ch2: SquareChannel,
    ch3: WaveChannel,
    ch4: NoiseChannel,
    wave_ram: [u8; 0x10],
    /// Last written values of FF10-FF25.
    regs: [u8; 0x16],
    nr50: u8,
    nr51: u8,
    powered: bool,
    cgb: bool,
    frame_step: u8,
    sequencer_countdown: u32,
    sample_rate: u32,
    sample_acc: u64,
    hp_coef: f32,
    hp_left: DcBlocker,
    hp_right: DcBlocker,
    samples: VecDeque<i16>,
    max_buffered: usize,
    output: Option<AudioProducer>,
    /// Frames the host queue had no room for.
    dropped_frames: u64,
}

impl Apu {
    pub fn new(cgb: bool, sample_rate: u32) -> Self {
        let mut apu = Self {
            ch1: SquareChannel::new(true),
            ch2: SquareChannel::new(false),
            ch3: WaveChannel::new(),
            ch4: NoiseChannel::new(),
            wave_ram: [0; 0x10],
            regs: [0; 0x16],
            nr50: 0,
            nr51: 0,
            powered: false,
            cgb,
            frame_step: 0,
            sequencer_countdown: FRAME_SEQUENCER_PERIOD,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_acc: 0,
            hp_coef: 0.0,
            hp_left: DcBlocker::default(),
            hp_right: DcBlocker::default(),
            samples: VecDeque::new(),
            max_buffered: 2,
            output: None,
            dropped_frames: 0,
        };
        apu.set_sample_rate(sample_rate);
        apu
    }

    fn calc_hp_coef(rate: u32) -> f32 {
        0.999_958_f32.powf(CLOCK_HZ as f32 / rate as f32)
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate.clamp(1, CLOCK_HZ);
        self.hp_coef = Self::calc_hp_coef(self.sample_rate);
        self.max_buffered = ((self.sample_rate as usize * BUFFER_LATENCY_MS) / 1000).max(1) * 2;
        while self.samples.len() > self.max_buffered {
            self.samples.pop_front();
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Registers as left by the boot ROM.
    pub fn apply_post_boot_state(&mut self) {
        self.write_reg(0xFF26, 0x80);
        self.write_reg(0xFF10, 0x80);
        self.write_reg(0xFF11, 0xBF);
        self.write_reg(0xFF12, 0xF3);
        self.write_reg(0xFF24, 0x77);
        self.write_reg(0xFF25, 0xF3);
        // The boot chime has decayed to silence but channel 1 is still on.
        self.ch1.enabled = true;
        self.ch1.envelope.volume = 0;
        self.ch1.timer = self.ch1.period();
    }

    /// Routes future samples to a lock-free queue instead of the internal buffer.
    pub fn enable_output(&mut self, capacity_frames: usize) -> AudioConsumer {
        let (producer, consumer) = audio_queue(capacity_frames);
        self.output = Some(producer);
        self.samples.clear();
        consumer
    }

    /// Drains the internal buffer as interleaved left/right pairs.
    pub fn take_samples(&mut self) -> Vec<i16> {
        self.samples.drain(..).collect()
    }

    pub fn queued_samples(&self) -> usize {
        self.samples.len()
    }

    /// Stereo frames lost because the host queue was full.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn powered(&self) -> bool {
        self.powered
    }

    /// Status bit for channel 1-4 as reported in NR52.
    pub fn channel_enabled(&self, channel: usize) -> bool {
        match channel {
            1 => self.ch1.enabled,
            2 => self.ch2.enabled,
            3 => self.ch3.enabled,
            4 => self.ch4.enabled,
            _ => false,
        }
    }

    pub fn frame_sequencer_step(&self) -> u8 {
        self.frame_step
    }

    pub fn ch1_frequency(&self) -> u16 {
        self.ch1.frequency
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF26 => {
                let mut val = if self.powered { 0x80 } else { 0 };
                for (bit, on) in [
                    self.ch1.enabled,
                    self.ch2.enabled,
                    self.ch3.enabled,
                    self.ch4.enabled,
                ]
                .into_iter()
                .enumerate()
                {
                    if on {
                        val |= 1 << bit;
                    }
                }
                val | read_mask(addr)
            }
            0xFF30..=0xFF3F => self.read_wave(addr),
            0xFF10..=0xFF25 => self.regs[(addr - 0xFF10) as usize] | read_mask(addr),
            _ => 0xFF,
        }
    }

    fn read_wave(&self, addr: u16) -> u8 {
        if self.ch3.enabled {
            // While playing, only the byte being played is visible, and only on CGB.
            if self.cgb {
                return self.wave_ram[(self.ch3.position / 2) as usize];
            }
            return 0xFF;
        }
        self.wave_ram[(addr - 0xFF30) as usize]
    }

    /// FF76/FF77: current digital output of channels 1+2 and 3+4.
    pub fn read_pcm(&self, addr: u16) -> u8 {
        match addr {
            0xFF76 => (self.ch2.output() << 4) | self.ch1.output(),
            0xFF77 => (self.ch4.output() << 4) | self.ch3.output(),
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF30..=0xFF3F => {
                self.write_wave(addr, val);
                return;
            }
            0xFF26 => {
                self.write_nr52(val);
                return;
            }
            0xFF10..=0xFF25 => {}
            _ => return,
        }

        if !self.powered {
            // Length counters stay writable on DMG while powered off.
            if !self.cgb {
                match addr {
                    0xFF11 => self.ch1.length.load(u16::from(val & 0x3F)),
                    0xFF16 => self.ch2.length.load(u16::from(val & 0x3F)),
                    0xFF1B => self.ch3.length.load(u16::from(val)),
                    0xFF20 => self.ch4.length.load(u16::from(val & 0x3F)),
                    _ => {}
                }
            }
            return;
        }

        let idx = (addr - 0xFF10) as usize;
        let old_val = self.regs[idx];
        self.regs[idx] = val;
        let next_step_odd = self.frame_step & 1 == 1;
        let next_step_is_envelope = self.frame_step == 7;

        match addr {
            0xFF10 => {
                if let Some(sweep) = self.ch1.sweep.as_mut() {
                    if sweep.write(val) {
                        self.ch1.enabled = false;
                    }
                }
            }
            0xFF11 => {
                self.ch1.duty = val >> 6;
                self.ch1.length.load(u16::from(val & 0x3F));
            }
            0xFF12 => {
                write_envelope(&mut self.ch1.envelope, self.ch1.enabled, old_val, val);
                self.ch1.dac_enabled = val & 0xF8 != 0;
                if !self.ch1.dac_enabled {
                    self.ch1.enabled = false;
                }
            }
            0xFF13 => self.ch1.frequency = (self.ch1.frequency & 0x700) | u16::from(val),
            0xFF14 => {
                let trigger = val & 0x80 != 0;
                self.ch1.frequency = (self.ch1.frequency & 0xFF) | (u16::from(val & 0x07) << 8);
                if self
                    .ch1
                    .length
                    .write_control(val & 0x40 != 0, trigger, next_step_odd)
                {
                    self.ch1.enabled = false;
                }
                if trigger {
                    self.trigger_square1(next_step_is_envelope);
                }
            }
            0xFF16 => {
                self.ch2.duty = val >> 6;
                self.ch2.length.load(u16::from(val & 0x3F));
            }
            0xFF17 => {
                write_envelope(&mut self.ch2.envelope, self.ch2.enabled, old_val, val);
                self.ch2.dac_enabled = val & 0xF8 != 0;
                if !self.ch2.dac_enabled {
                    self.ch2.enabled = false;
                }
            }
            0xFF18 => self.ch2.frequency = (self.ch2.frequency & 0x700) | u16::from(val),
            0xFF19 => {
                let trigger = val & 0x80 != 0;
                self.ch2.frequency = (self.ch2.frequency & 0xFF) | (u16::from(val & 0x07) << 8);
                if self
                    .ch2
                    .length
                    .write_control(val & 0x40 != 0, trigger, next_step_odd)
                {
                    self.ch2.enabled = false;
                }
                if trigger {
                    self.ch2.enabled = self.ch2.dac_enabled;
                    self.ch2.timer = self.ch2.period();
                    self.ch2.envelope.trigger(next_step_is_envelope);
                    apu_trace!("ch2 trigger freq={:#05x}", self.ch2.frequency);
                }
            }
            0xFF1A => {
                self.ch3.dac_enabled = val & 0x80 != 0;
                if !self.ch3.dac_enabled {
                    self.ch3.enabled = false;
                }
            }
            0xFF1B => self.ch3.length.load(u16::from(val)),
            0xFF1C => self.ch3.volume_code = (val >> 5) & 0x03,
            0xFF1D => self.ch3.frequency = (self.ch3.frequency & 0x700) | u16::from(val),
            0xFF1E => {
                let trigger = val & 0x80 != 0;
                self.ch3.frequency = (self.ch3.frequency & 0xFF) | (u16::from(val & 0x07) << 8);
                if self
                    .ch3
                    .length
                    .write_control(val & 0x40 != 0, trigger, next_step_odd)
                {
                    self.ch3.enabled = false;
                }
                if trigger {
                    self.trigger_wave();
                }
            }
            0xFF20 => self.ch4.length.load(u16::from(val & 0x3F)),
            0xFF21 => {
                write_envelope(&mut self.ch4.envelope, self.ch4.enabled, old_val, val);
                self.ch4.dac_enabled = val & 0xF8 != 0;
                if !self.ch4.dac_enabled {
                    self.ch4.enabled = false;
                }
            }
            0xFF22 => {
                self.ch4.clock_shift = val >> 4;
                self.ch4.width7 = val & 0x08 != 0;
                self.ch4.divisor = val & 0x07;
            }
            0xFF23 => {
                let trigger = val & 0x80 != 0;
                if self
                    .ch4
                    .length
                    .write_control(val & 0x40 != 0, trigger, next_step_odd)
                {
                    self.ch4.enabled = false;
                }
                if trigger {
                    self.ch4.enabled = self.ch4.dac_enabled;
                    self.ch4.lfsr = 0;
                    self.ch4.timer = self.ch4.period();
                    self.ch4.envelope.trigger(next_step_is_envelope);
                    apu_trace!("ch4 trigger nr43={:#04x}", self.regs[0x12]);
                }
            }
            0xFF24 => self.nr50 = val,
            0xFF25 => self.nr51 = val,
            _ => {}
        }
    }

    fn write_wave(&mut self, addr: u16, val: u8) {
        if self.ch3.enabled {
            if self.cgb {
                self.wave_ram[(self.ch3.position / 2) as usize] = val;
            }
            return;
        }
        self.wave_ram[(addr - 0xFF30) as usize] = val;
    }

    fn write_nr52(&mut self, val: u8) {
        let on = val & 0x80 != 0;
        if on == self.powered {
            return;
        }
        if on {
            self.powered = true;
            self.frame_step = 0;
            self.sequencer_countdown = FRAME_SEQUENCER_PERIOD;
            self.ch1.duty_pos = 0;
            self.ch2.duty_pos = 0;
            self.ch3.sample = 0;
            apu_trace!("apu power on");
        } else {
            self.power_off();
            apu_trace!("apu power off");
        }
    }

    fn power_off(&mut self) {
        let lengths = [
            self.ch1.length,
            self.ch2.length,
            self.ch3.length,
            self.ch4.length,
        ];
        self.ch1 = SquareChannel::new(true);
        self.ch2 = SquareChannel::new(false);
        self.ch3 = WaveChannel::new();
        self.ch4 = NoiseChannel::new();
        if !self.cgb {
            // DMG keeps its length counters across power cycles.
            self.ch1.length.remaining = lengths[0].remaining;
            self.ch2.length.remaining = lengths[1].remaining;
            self.ch3.length.remaining = lengths[2].remaining;
            self.ch4.length.remaining = lengths[3].remaining;
        }
        self.regs.fill(0);
        self.nr50 = 0;
        self.nr51 = 0;
        self.powered = false;
        self.hp_left = DcBlocker::default();
        self.hp_right = DcBlocker::default();
    }

    fn trigger_square1(&mut self, next_step_is_envelope: bool) {
        self.ch1.enabled = self.ch1.dac_enabled;
        self.ch1.timer = self.ch1.period();
        self.ch1.envelope.trigger(next_step_is_envelope);
        let frequency = self.ch1.frequency;
        if let Some(sweep) = self.ch1.sweep.as_mut() {
            if !sweep.trigger(frequency) {
                self.ch1.enabled = false;
            }
        }
        apu_trace!(
            "ch1 trigger freq={:#05x} enabled={}",
            self.ch1.frequency,
            self.ch1.enabled
        );
    }

    fn trigger_wave(&mut self) {
        // DMG corrupts the first bytes of wave RAM when retriggered just as
        // the channel reads a sample.
        if !self.cgb && self.ch3.enabled && self.ch3.timer <= 2 {
            let byte_index = (((self.ch3.position + 1) & 0x1F) / 2) as usize;
            if byte_index < 4 {
                self.wave_ram[0] = self.wave_ram[byte_index];
            } else {
                let base = byte_index & !0x03;
                self.wave_ram.copy_within(base..base + 4, 0);
            }
        }
        self.ch3.enabled = self.ch3.dac_enabled;
        self.ch3.position = 0;
        self.ch3.timer = self.ch3.period() + WAVE_TRIGGER_DELAY;
        apu_trace!("ch3 trigger freq={:#05x}", self.ch3.frequency);
    }

    fn clock_frame_sequencer(&mut self) {
        let step = self.frame_step;
        self.frame_step = (step + 1) & 7;
        if step & 1 == 0 {
            self.ch1.clock_length();
            self.ch2.clock_length();
            self.ch3.clock_length();
            self.ch4.clock_length();
        }
        if step == 2 || step == 6 {
            self.ch1.clock_sweep();
            self.regs[0x03] = (self.ch1.frequency & 0xFF) as u8;
        }
        if step == 7 {
            if self.ch1.enabled {
                self.ch1.envelope.clock();
            }
            if self.ch2.enabled {
                self.ch2.envelope.clock();
            }
            if self.ch4.enabled {
                self.ch4.envelope.clock();
            }
        }
    }

    fn cycles_until_sample(&self) -> u32 {
        let rate = u64::from(self.sample_rate);
        let needed = u64::from(CLOCK_HZ).saturating_sub(self.sample_acc);
        needed.div_ceil(rate).max(1) as u32
    }

    /// Advances the sound unit by `cycles` main-clock cycles.
    pub fn tick(&mut self, cycles: u32) {
        let mut remaining = cycles;
        while remaining > 0 {
            let mut chunk = remaining.min(self.cycles_until_sample());
            if self.powered {
                chunk = chunk.min(self.sequencer_countdown);
                self.ch1.step(chunk);
                self.ch2.step(chunk);
                self.ch3.step(chunk, &self.wave_ram);
                self.ch4.step(chunk);
                self.sequencer_countdown -= chunk;
                if self.sequencer_countdown == 0 {
                    self.sequencer_countdown = FRAME_SEQUENCER_PERIOD;
                    self.clock_frame_sequencer();
                }
            }
            remaining -= chunk;

            self.sample_acc += u64::from(chunk) * u64::from(self.sample_rate);
            if self.sample_acc >= u64::from(CLOCK_HZ) {
                self.sample_acc -= u64::from(CLOCK_HZ);
                let (left, right) = self.mix_output();
                self.emit(left, right);
            }
        }
    }

    fn emit(&mut self, left: i16, right: i16) {
        if let Some(producer) = &self.output {
            // A full host queue drops the newest frame.
            if !producer.push_stereo(left, right) {
                self.dropped_frames += 1;
                #[cfg(feature = "apu-trace")]
                log::trace!("audio queue full, {} frames dropped", self.dropped_frames);
            }
            return;
        }
        while self.samples.len() + 2 > self.max_buffered {
            self.samples.pop_front();
        }
        self.samples.push_back(left);
        self.samples.push_back(right);
    }

    fn mix_output(&mut self) -> (i16, i16) {
        let dacs = [
            self.ch1.dac_enabled,
            self.ch2.dac_enabled,
            self.ch3.dac_enabled,
            self.ch4.dac_enabled,
        ];
        if !self.powered || !dacs.iter().any(|&on| on) {
            self.hp_left = DcBlocker::default();
            self.hp_right = DcBlocker::default();
            return (0, 0);
        }

        let outputs = [
            self.ch1.output(),
            self.ch2.output(),
            self.ch3.output(),
            self.ch4.output(),
        ];

        let mut left = 0i16;
        let mut right = 0i16;
        for (i, (&digital, &dac)) in outputs.iter().zip(dacs.iter()).enumerate() {
            if !dac {
                continue;
            }
            let analog = 8 - i16::from(digital);
            if self.nr51 & (0x10 << i) != 0 {
                left += analog;
            }
            if self.nr51 & (0x01 << i) != 0 {
                right += analog;
            }
        }

        let left_vol = i16::from((self.nr50 >> 4) & 0x07) + 1;
        let right_vol = i16::from(self.nr50 & 0x07) + 1;
        self.dc_block(
            left * left_vol * VOLUME_FACTOR,
            right * right_vol * VOLUME_FACTOR,
        )
    }

    fn dc_block(&mut self, left: i16, right: i16) -> (i16, i16) {
        let coef = self.hp_coef;
        let l = self.hp_left.filter(f32::from(left), coef);
        let r = self.hp_right.filter(f32::from(right), coef);
        (l.round() as i16, r.round() as i16)
    }
}

fn write_envelope(envelope: &mut Envelope, playing: bool, old_val: u8, val: u8) {
    if playing {
        envelope.zombie_update(old_val, val);
    } else {
        envelope.write(val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered(cgb: bool) -> Apu {
        let mut apu = Apu::new(cgb, DEFAULT_SAMPLE_RATE);
        apu.write_reg(0xFF26, 0x80);
        apu
    }

    #[test]
    fn unused_bits_read_as_one() {
        let mut apu = powered(false);
        apu.write_reg(0xFF10, 0x00);
        assert_eq!(apu.read_reg(0xFF10), 0x80);
        apu.write_reg(0xFF11, 0x00);
        assert_eq!(apu.read_reg(0xFF11), 0x3F);
        assert_eq!(apu.read_reg(0xFF13), 0xFF);
        assert_eq!(apu.read_reg(0xFF15), 0xFF);
        assert_eq!(apu.read_reg(0xFF26), 0xF0);
    }

    #[test]
    fn power_off_clears_registers_and_ignores_writes() {
        let mut apu = powered(true);
        apu.write_reg(0xFF24, 0x77);
        apu.write_reg(0xFF30, 0x12);
        apu.write_reg(0xFF26, 0x00);
        assert_eq!(apu.read_reg(0xFF24), 0x00);
        assert_eq!(apu.read_reg(0xFF26), 0x70);
        apu.write_reg(0xFF24, 0x55);
        assert_eq!(apu.read_reg(0xFF24), 0x00);
        assert_eq!(apu.read_reg(0xFF30), 0x12);
        apu.write_reg(0xFF31, 0x34);
        assert_eq!(apu.read_reg(0xFF31), 0x34);
    }

    #[test]
    fn trigger_sets_status_and_dac_off_clears_it() {
        let mut apu = powered(false);
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF14, 0x80);
        assert_eq!(apu.read_reg(0xFF26) & 0x0F, 0x01);
        apu.write_reg(0xFF12, 0x00);
        assert!(!apu.channel_enabled(1));
    }

    #[test]
    fn trigger_with_dac_off_stays_silent() {
        let mut apu = powered(false);
        apu.write_reg(0xFF17, 0x00);
        apu.write_reg(0xFF19, 0x80);
        assert!(!apu.channel_enabled(2));
    }

    #[test]
    fn length_counter_expires_on_first_length_step() {
        let mut apu = powered(false);
        apu.write_reg(0xFF17, 0xF0);
        apu.write_reg(0xFF16, 0x3F);
        apu.write_reg(0xFF19, 0xC0);
        apu.tick(FRAME_SEQUENCER_PERIOD - 1);
        assert!(apu.channel_enabled(2));
        apu.tick(1);
        assert!(!apu.channel_enabled(2));
    }

    #[test]
    fn enabling_length_before_odd_step_clocks_once() {
        let mut apu = powered(false);
        apu.write_reg(0xFF17, 0xF0);
        apu.write_reg(0xFF16, 0x3E);
        apu.write_reg(0xFF19, 0x80);
        // Step 0 runs, so the next step is 1.
        apu.tick(FRAME_SEQUENCER_PERIOD);
        assert_eq!(apu.frame_sequencer_step(), 1);
        apu.write_reg(0xFF19, 0x40);
        assert_eq!(apu.ch2.length.remaining, 1);
        assert!(apu.channel_enabled(2));
        apu.write_reg(0xFF19, 0x00);
        apu.write_reg(0xFF19, 0x40);
        assert!(!apu.channel_enabled(2));
    }

    #[test]
    fn sweep_overflow_on_trigger_disables_channel() {
        let mut apu = powered(false);
        apu.write_reg(0xFF10, 0x01);
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF13, 0xFF);
        apu.write_reg(0xFF14, 0x87);
        assert!(!apu.channel_enabled(1));
    }

    #[test]
    fn sweep_updates_frequency() {
        let mut apu = powered(false);
        apu.write_reg(0xFF10, 0x11);
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF13, 0x00);
        apu.write_reg(0xFF14, 0x81);
        // Sweep clocks on step 2.
        apu.tick(FRAME_SEQUENCER_PERIOD * 3);
        assert_eq!(apu.ch1_frequency(), 0x180);
        assert!(apu.channel_enabled(1));
    }

    #[test]
    fn clearing_negate_after_subtraction_disables_channel() {
        let mut apu = powered(false);
        apu.write_reg(0xFF10, 0x19);
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF13, 0x00);
        apu.write_reg(0xFF14, 0x84);
        assert!(apu.channel_enabled(1));
        apu.write_reg(0xFF10, 0x11);
        assert!(!apu.channel_enabled(1));
    }

    #[test]
    fn envelope_steps_volume_down() {
        let mut apu = powered(false);
        apu.write_reg(0xFF17, 0xF1);
        apu.write_reg(0xFF19, 0x80);
        apu.tick(FRAME_SEQUENCER_PERIOD * 8);
        assert_eq!(apu.ch2.envelope.volume, 14);
    }

    #[test]
    fn wave_ram_hidden_on_dmg_while_playing() {
        let mut apu = powered(false);
        apu.write_reg(0xFF30, 0xAB);
        apu.write_reg(0xFF1A, 0x80);
        apu.write_reg(0xFF1E, 0x80);
        assert_eq!(apu.read_reg(0xFF30), 0xFF);
        apu.write_reg(0xFF1A, 0x00);
        assert_eq!(apu.read_reg(0xFF30), 0xAB);
    }

    #[test]
    fn wave_ram_shows_current_byte_on_cgb_while_playing() {
        let mut apu = powered(true);
        apu.write_reg(0xFF30, 0xAB);
        apu.write_reg(0xFF35, 0xCD);
        apu.write_reg(0xFF1A, 0x80);
        apu.write_reg(0xFF1E, 0x80);
        assert_eq!(apu.read_reg(0xFF35), 0xAB);
    }

    #[test]
    fn samples_follow_sample_rate() {
        let mut apu = powered(false);
        apu.tick(CLOCK_HZ / 100);
        let frames = apu.take_samples().len() / 2;
        assert!((440..=441).contains(&frames), "{frames}");
    }

    #[test]
    fn internal_buffer_is_bounded() {
        let mut apu = powered(false);
        apu.tick(CLOCK_HZ);
        assert_eq!(apu.queued_samples(), 1764 * 2);
    }

    #[test]
    fn enable_output_routes_to_queue() {
        let mut apu = powered(false);
        let consumer = apu.enable_output(4096);
        apu.tick(CLOCK_HZ / 100);
        assert_eq!(apu.queued_samples(), 0);
        assert!(consumer.len() >= 440);
        assert_eq!(apu.dropped_frames(), 0);
    }

    #[test]
    fn full_queue_counts_dropped_frames() {
        let mut apu = powered(false);
        let consumer = apu.enable_output(64);
        apu.tick(CLOCK_HZ / 100);
        assert_eq!(consumer.len(), 64);
        let produced = apu.dropped_frames() + 64;
        assert!((440..=441).contains(&produced), "{produced}");

        // Draining makes room again without resetting the count.
        let before = apu.dropped_frames();
        let mut sink = [0i16; 128];
        consumer.pop_interleaved(&mut sink);
        apu.tick(CLOCK_HZ / 1000);
        assert_eq!(apu.dropped_frames(), before);
    }

    #[test]
    fn pcm_registers_report_channel_output() {
        let mut apu = powered(true);
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF11, 0xC0);
        apu.write_reg(0xFF14, 0x80);
        // 75% duty: position 1 is high.
        apu.tick(apu.ch1.period());
        assert_eq!(apu.read_pcm(0xFF76), 0x0F);
        assert_eq!(apu.read_pcm(0xFF77), 0x00);
    }

    #[test]
    fn dc_filter_reduces_constant_input() {
        let mut apu = Apu::new(false, DEFAULT_SAMPLE_RATE);
        let first = apu.dc_block(1000, 1000);
        let second = apu.dc_block(1000, 1000);
        assert!(second.0 < first.0);
        assert!(second.1 < first.1);
    }

    #[test]
    fn dc_filter_converges_to_zero() {
        let mut apu = Apu::new(false, DEFAULT_SAMPLE_RATE);
        let mut out = (0i16, 0i16);
        for _ in 0..8192 {
            out = apu.dc_block(1000, 1000);
        }
        assert!(out.0.abs() < 10);
        assert!(out.1.abs() < 10);
    }

    #[test]
    fn silent_when_all_dacs_off() {
        let mut apu = powered(false);
        apu.write_reg(0xFF25, 0xFF);
        apu.write_reg(0xFF12, 0xF0);
        apu.write_reg(0xFF14, 0x80);
        assert_ne!(apu.mix_output(), (0, 0));
        apu.write_reg(0xFF12, 0x00);
        assert_eq!(apu.mix_output(), (0, 0));
    }
}
