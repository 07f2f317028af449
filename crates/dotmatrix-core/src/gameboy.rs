use log::info;

use crate::{
    audio_queue::AudioConsumer,
    cartridge::Cartridge,
    cpu::Cpu,
    error::BootRomError,
    frame::{Frame, FramePublisher},
    hardware::{EmulatorConfig, Model},
    input::Button,
    mmu::Mmu,
    ppu::CYCLES_PER_FRAME,
    serial::LinkPort,
};

pub struct GameBoy {
    pub cpu: Cpu,
    pub mmu: Mmu,
    model: Model,
    config: EmulatorConfig,
}

impl GameBoy {
    /// Machine in the state the boot ROM leaves behind, ready to execute the
    /// cartridge at 0x0100.
    pub fn new(cart: Cartridge, config: &EmulatorConfig) -> Self {
        let model = config.resolve_model(&cart);
        let mut mmu = Mmu::new(cart, model, config.sample_rate);
        mmu.apply_post_boot_state(config.dmg_revision);
        info!("starting {:?} without boot ROM", model);
        Self {
            cpu: Cpu::post_boot(model, config.dmg_revision),
            mmu,
            model,
            config: *config,
        }
    }

    /// Machine at power-on with `boot_rom` overlaid at 0x0000.
    pub fn with_boot_rom(
        cart: Cartridge,
        boot_rom: Vec<u8>,
        config: &EmulatorConfig,
    ) -> Result<Self, BootRomError> {
        let model = config.resolve_model(&cart);
        let expected = model.boot_rom_len();
        if boot_rom.len() != expected {
            return Err(BootRomError::InvalidLength {
                expected,
                actual: boot_rom.len(),
            });
        }
        let mut mmu = Mmu::new(cart, model, config.sample_rate);
        mmu.map_boot_rom(boot_rom);
        info!("starting {:?} from boot ROM", model);
        Ok(Self {
            cpu: Cpu::power_on(),
            mmu,
            model,
            config: *config,
        })
    }

    pub fn model(&self) -> Model {
        self.model
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Rebuild the machine, keeping the cartridge (RAM and clock included)
    /// and any boot ROM.
    pub fn reset(&mut self) {
        let cart = self.mmu.cartridge().clone();
        let boot = self.mmu.boot_rom().map(<[u8]>::to_vec);
        let mut mmu = Mmu::new(cart, self.model, self.config.sample_rate);
        match boot {
            Some(rom) => {
                mmu.map_boot_rom(rom);
                self.cpu = Cpu::power_on();
            }
            None => {
                mmu.apply_post_boot_state(self.config.dmg_revision);
                self.cpu = Cpu::post_boot(self.model, self.config.dmg_revision);
            }
        }
        self.mmu = mmu;
    }

    /// Execute one instruction (or one idle slice while halted) and bring
    /// every peripheral up to the same point in time. Returns CPU cycles.
    pub fn advance(&mut self) -> u32 {
        let cycles = self.cpu.step(&mut self.mmu);
        let dots = self.dots(cycles);
        let mmu = &mut self.mmu;

        mmu.timer.tick(cycles, &mut mmu.interrupts);
        let hblank = mmu.ppu.tick(dots, &mut mmu.interrupts);
        mmu.apu.tick(dots);
        if hblank {
            mmu.hdma_hblank();
        }
        mmu.dma_step(cycles);
        mmu.serial.tick(cycles, &mut mmu.interrupts);
        mmu.cartridge_mut().tick_rtc(dots);

        cycles
    }

    /// Main-clock cycles seen by the display, sound and clock for `cycles`
    /// CPU cycles.
    fn dots(&self, cycles: u32) -> u32 {
        if self.mmu.is_double_speed() {
            cycles / 2
        } else {
            cycles
        }
    }

    /// Run until the next frame is complete, or for one frame's worth of
    /// time when the display is off. Returns CPU cycles executed.
    pub fn run_frame(&mut self) -> u32 {
        self.mmu.ppu.clear_frame_flag();
        let mut cycles = 0;
        let mut dots = 0;
        while !self.mmu.ppu.frame_ready() && dots < CYCLES_PER_FRAME {
            let step = self.advance();
            cycles += step;
            dots += self.dots(step);
        }
        cycles
    }

    pub fn frame_ready(&self) -> bool {
        self.mmu.ppu.frame_ready()
    }

    pub fn frame(&self) -> &Frame {
        self.mmu.ppu.frame()
    }

    pub fn clear_frame_flag(&mut self) {
        self.mmu.ppu.clear_frame_flag();
    }

    pub fn attach_frame_publisher(&mut self, publisher: FramePublisher) {
        self.mmu.ppu.attach_publisher(publisher);
    }

    /// Route samples into a lock-free queue instead of the internal buffer.
    pub fn enable_audio_output(&mut self, capacity_frames: usize) -> AudioConsumer {
        self.mmu.apu.enable_output(capacity_frames)
    }

    /// Stereo frames discarded because the queue from
    /// [`enable_audio_output`](Self::enable_audio_output) was full.
    pub fn dropped_audio_frames(&self) -> u64 {
        self.mmu.apu.dropped_frames()
    }

    /// Drain interleaved stereo samples from the internal buffer.
    pub fn take_audio_samples(&mut self) -> Vec<i16> {
        self.mmu.apu.take_samples()
    }

    pub fn press(&mut self, button: Button) {
        self.mmu.joypad.press(button, &mut self.mmu.interrupts);
    }

    pub fn release(&mut self, button: Button) {
        self.mmu.joypad.release(button);
    }

    pub fn connect_link(&mut self, port: Box<dyn LinkPort>) {
        self.mmu.serial.connect(port);
    }

    /// Bytes shifted out of the serial port since the last call.
    pub fn take_serial_output(&mut self) -> Vec<u8> {
        self.mmu.serial.take_output()
    }

    pub fn cartridge(&self) -> &Cartridge {
        self.mmu.cartridge()
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        self.mmu.cartridge_mut()
    }
}
