use crate::frame::{Frame, FramePublisher, SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::interrupt::{Interrupt, InterruptController};

pub const DOTS_PER_LINE: u16 = 456;
pub const LINES_PER_FRAME: u8 = 154;
pub const VISIBLE_LINES: u8 = SCREEN_HEIGHT as u8;
/// Main-clock cycles in one full frame.
pub const CYCLES_PER_FRAME: u32 = DOTS_PER_LINE as u32 * LINES_PER_FRAME as u32;

const OAM_SCAN_DOTS: u16 = 80;
const TRANSFER_MIN_DOTS: u16 = 172;
const TRANSFER_MAX_DOTS: u16 = 289;
const WINDOW_PENALTY: u16 = 6;
const OBJECT_PENALTY: u16 = 6;
const OBJECT_X0_PENALTY: u16 = 11;

const MAX_OBJECTS_PER_LINE: usize = 10;
const OBJECT_COUNT: usize = 40;
const VRAM_BANK_SIZE: usize = 0x2000;
const OAM_SIZE: usize = 0xA0;
const WINDOW_X_MAX: u8 = 166;

const BG_MAP_LOW: usize = 0x1800;
const BG_MAP_HIGH: usize = 0x1C00;

const LCDC_ENABLE: u8 = 0x80;
const LCDC_WINDOW_MAP: u8 = 0x40;
const LCDC_WINDOW: u8 = 0x20;
const LCDC_TILE_DATA: u8 = 0x10;
const LCDC_BG_MAP: u8 = 0x08;
const LCDC_TALL_OBJECTS: u8 = 0x04;
const LCDC_OBJECTS: u8 = 0x02;
const LCDC_BG: u8 = 0x01;

const STAT_LYC_SOURCE: u8 = 0x40;
const STAT_MODE2_SOURCE: u8 = 0x20;
const STAT_MODE1_SOURCE: u8 = 0x10;
const STAT_MODE0_SOURCE: u8 = 0x08;

const CGB_WHITE: u16 = 0x7FFF;

// Colours the CGB boot ROM loads for a cartridge without colour support.
const COMPAT_BG_COLORS: [u16; 4] = [0x7FFF, 0x1BEF, 0x6180, 0x0000];
const COMPAT_OBJ_COLORS: [u16; 4] = [0x7FFF, 0x421F, 0x1CF2, 0x0000];

/// STAT mode bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamScan = 2,
    Transfer = 3,
}

/// CGB palette memory behind an auto-incrementing index register
/// (BCPS/BCPD or OCPS/OCPD).
#[derive(Clone, Debug)]
struct PaletteRam {
    index: u8,
    data: [u8; 64],
}

impl PaletteRam {
    fn new(fill: u16) -> Self {
        let mut data = [0; 64];
        for pair in data.chunks_exact_mut(2) {
            pair.copy_from_slice(&fill.to_le_bytes());
        }
        Self { index: 0, data }
    }

    fn read_index(&self) -> u8 {
        self.index | 0x40
    }

    fn write_index(&mut self, val: u8) {
        self.index = val & 0xBF;
    }

    fn read_data(&self) -> u8 {
        self.data[(self.index & 0x3F) as usize]
    }

    fn write_data(&mut self, val: u8) {
        self.data[(self.index & 0x3F) as usize] = val;
        if self.index & 0x80 != 0 {
            self.index = 0x80 | (self.index.wrapping_add(1) & 0x3F);
        }
    }

    fn set_palette(&mut self, palette: u8, colors: [u16; 4]) {
        let base = usize::from(palette & 0x07) * 8;
        for (i, color) in colors.iter().enumerate() {
            self.data[base + i * 2..base + i * 2 + 2].copy_from_slice(&color.to_le_bytes());
        }
    }

    fn color(&self, palette: u8, color_id: u8) -> u16 {
        let off = usize::from(palette & 0x07) * 8 + usize::from(color_id) * 2;
        u16::from_le_bytes([self.data[off], self.data[off + 1]]) & 0x7FFF
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct Object {
    x: i16,
    y: i16,
    oam_x: u8,
    tile: u8,
    flags: u8,
    oam_index: usize,
}

/// Scanline state machine, VRAM/OAM owner and frame renderer.
///
/// Each visible line runs OAM scan for 80 dots, pixel transfer for a length
/// that depends on scroll, window and objects, then HBlank to dot 456. The
/// whole line is composited into the back buffer when pixel transfer starts;
/// the back and front buffers swap on entry to line 144.
pub struct Ppu {
    vram: [[u8; VRAM_BANK_SIZE]; 2],
    vram_bank: usize,
    oam: [u8; OAM_SIZE],
    cgb: bool,
    /// CGB hardware running a monochrome cartridge: no attributes, no VRAM
    /// bank 1, and BGP/OBP shades looked up in colour palettes 0 and 1.
    dmg_compat: bool,

    lcdc: u8,
    stat: u8,
    scy: u8,
    scx: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,
    bg_palettes: PaletteRam,
    obj_palettes: PaletteRam,
    opri: u8,

    ly: u8,
    dot: u16,
    mode: Mode,
    transfer_dots: u16,
    lyc_match: bool,
    stat_line: bool,
    window_y_hit: bool,
    window_line: u8,

    objects: [Object; MAX_OBJECTS_PER_LINE],
    object_count: usize,

    back: Frame,
    front: Frame,
    frame_ready: bool,
    frames: u64,
    publisher: Option<FramePublisher>,
}

impl Ppu {
    pub fn new(cgb: bool) -> Self {
        Self {
            vram: [[0; VRAM_BANK_SIZE]; 2],
            vram_bank: 0,
            oam: [0; OAM_SIZE],
            cgb,
            dmg_compat: false,
            lcdc: 0,
            stat: 0,
            scy: 0,
            scx: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            bg_palettes: PaletteRam::new(CGB_WHITE),
            obj_palettes: PaletteRam::new(0),
            opri: 0,
            ly: 0,
            dot: 0,
            mode: Mode::HBlank,
            transfer_dots: TRANSFER_MIN_DOTS,
            lyc_match: false,
            stat_line: false,
            window_y_hit: false,
            window_line: 0,
            objects: [Object::default(); MAX_OBJECTS_PER_LINE],
            object_count: 0,
            back: Frame::new(),
            front: Frame::new(),
            frame_ready: false,
            frames: 0,
            publisher: None,
        }
    }

    /// Registers as the boot ROM leaves them: display on, BG map at 0x9800,
    /// unsigned tile data, BGP = 0xFC.
    pub fn apply_post_boot_state(&mut self) {
        self.lcdc = 0x91;
        self.bgp = 0xFC;
        self.start_display();
    }

    pub fn is_cgb(&self) -> bool {
        self.cgb
    }

    pub fn dmg_compat(&self) -> bool {
        self.dmg_compat
    }

    pub fn set_dmg_compat(&mut self, on: bool) {
        self.dmg_compat = self.cgb && on;
        if self.dmg_compat {
            self.vram_bank = 0;
        }
    }

    /// Palettes the CGB boot ROM sets up before handing a monochrome
    /// cartridge over in compatibility mode.
    pub fn apply_dmg_compat_palettes(&mut self) {
        self.bg_palettes.set_palette(0, COMPAT_BG_COLORS);
        self.obj_palettes.set_palette(0, COMPAT_OBJ_COLORS);
        self.obj_palettes.set_palette(1, COMPAT_OBJ_COLORS);
        self.bgp = 0xE4;
        self.obp0 = 0xD0;
        self.obp1 = 0xE0;
    }

    /// Colour features (attributes, VRAM bank 1, palette RAM) are live.
    fn cgb_mode(&self) -> bool {
        self.cgb && !self.dmg_compat
    }

    pub fn lcd_enabled(&self) -> bool {
        self.lcdc & LCDC_ENABLE != 0
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Internal line counter (0..=153). The LY register can differ from this
    /// on line 153.
    pub fn line(&self) -> u8 {
        self.ly
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    /// Length of pixel transfer on the current (or most recent) line.
    pub fn transfer_dots(&self) -> u16 {
        self.transfer_dots
    }

    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// The most recently completed frame.
    pub fn frame(&self) -> &Frame {
        &self.front
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Copy every completed frame into `publisher` as well.
    pub fn attach_publisher(&mut self, publisher: FramePublisher) {
        self.publisher = Some(publisher);
    }

    fn blank_value(&self) -> u16 {
        if self.cgb { CGB_WHITE } else { 0 }
    }

    fn start_display(&mut self) {
        self.ly = 0;
        self.dot = 0;
        self.mode = Mode::OamScan;
        self.window_line = 0;
        self.window_y_hit = false;
        self.stat_line = false;
        self.refresh_lyc();
    }

    fn stop_display(&mut self) {
        self.ly = 0;
        self.dot = 0;
        self.mode = Mode::HBlank;
        self.stat_line = false;
        let blank = self.blank_value();
        self.back.fill(blank);
        self.front.fill(blank);
        if let Some(publisher) = &self.publisher {
            publisher.publish(&self.front);
        }
    }

    /// Value software sees in LY. Line 153 reports 0 after its first
    /// M-cycle.
    fn ly_register(&self) -> u8 {
        if !self.lcd_enabled() {
            0
        } else if self.ly == LINES_PER_FRAME - 1 && self.dot >= 4 {
            0
        } else {
            self.ly
        }
    }

    /// With the display off LY reads 0, and LYC writes compare against that.
    fn refresh_lyc(&mut self) {
        self.lyc_match = self.ly_register() == self.lyc;
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF40 => self.lcdc,
            0xFF41 => {
                let mode = if self.lcd_enabled() { self.mode as u8 } else { 0 };
                let lyc = if self.lyc_match { 0x04 } else { 0 };
                0x80 | (self.stat & 0x78) | lyc | mode
            }
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly_register(),
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            0xFF4F if self.cgb_mode() => 0xFE | self.vram_bank as u8,
            0xFF68 if self.cgb_mode() => self.bg_palettes.read_index(),
            0xFF69 if self.cgb_mode() => self.bg_palettes.read_data(),
            0xFF6A if self.cgb_mode() => self.obj_palettes.read_index(),
            0xFF6B if self.cgb_mode() => self.obj_palettes.read_data(),
            0xFF6C if self.cgb_mode() => 0xFE | self.opri,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        match addr {
            0xFF40 => {
                let was_on = self.lcd_enabled();
                self.lcdc = val;
                match (was_on, self.lcd_enabled()) {
                    (true, false) => {
                        #[cfg(feature = "ppu-trace")]
                        log::trace!("LCD off at line {} dot {}", self.ly, self.dot);
                        self.stop_display();
                    }
                    (false, true) => {
                        #[cfg(feature = "ppu-trace")]
                        log::trace!("LCD on");
                        self.start_display();
                    }
                    _ => {}
                }
            }
            0xFF41 => self.stat = val & 0x78,
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF45 => {
                self.lyc = val;
                self.refresh_lyc();
            }
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            0xFF4F if self.cgb_mode() => self.vram_bank = usize::from(val & 0x01),
            0xFF68 if self.cgb_mode() => self.bg_palettes.write_index(val),
            0xFF69 if self.cgb_mode() => self.bg_palettes.write_data(val),
            0xFF6A if self.cgb_mode() => self.obj_palettes.write_index(val),
            0xFF6B if self.cgb_mode() => self.obj_palettes.write_data(val),
            0xFF6C if self.cgb_mode() => self.opri = val & 0x01,
            _ => {}
        }
    }

    fn vram_blocked(&self) -> bool {
        self.lcd_enabled() && self.mode == Mode::Transfer
    }

    fn oam_blocked(&self) -> bool {
        self.lcd_enabled() && matches!(self.mode, Mode::OamScan | Mode::Transfer)
    }

    /// CPU read of 0x8000..0xA000.
    pub fn read_vram(&self, addr: u16) -> u8 {
        if self.vram_blocked() {
            return 0xFF;
        }
        self.vram[self.vram_bank][(addr as usize) & (VRAM_BANK_SIZE - 1)]
    }

    /// CPU write to 0x8000..0xA000.
    pub fn write_vram(&mut self, addr: u16, val: u8) {
        if !self.vram_blocked() {
            self.write_vram_direct(addr, val);
        }
    }

    /// VRAM read as a DMA source, bypassing the mode check.
    pub(crate) fn read_vram_direct(&self, addr: u16) -> u8 {
        self.vram[self.vram_bank][(addr as usize) & (VRAM_BANK_SIZE - 1)]
    }

    /// VRAM write from DMA, bypassing the mode check.
    pub(crate) fn write_vram_direct(&mut self, addr: u16, val: u8) {
        self.vram[self.vram_bank][(addr as usize) & (VRAM_BANK_SIZE - 1)] = val;
    }

    /// CPU read of 0xFE00..0xFEA0.
    pub fn read_oam(&self, addr: u16) -> u8 {
        if self.oam_blocked() {
            return 0xFF;
        }
        self.oam[(addr - 0xFE00) as usize]
    }

    pub fn write_oam(&mut self, addr: u16, val: u8) {
        if !self.oam_blocked() {
            self.oam[(addr - 0xFE00) as usize] = val;
        }
    }

    /// OAM write from OAM DMA.
    pub(crate) fn write_oam_direct(&mut self, index: usize, val: u8) {
        self.oam[index] = val;
    }

    /// Advance by `cycles` dots. Returns true if HBlank was entered on a
    /// visible line during this call.
    pub fn tick(&mut self, cycles: u32, ints: &mut InterruptController) -> bool {
        if !self.lcd_enabled() {
            return false;
        }
        let mut hblank = false;
        for _ in 0..cycles {
            hblank |= self.step_dot(ints);
        }
        hblank
    }

    fn step_dot(&mut self, ints: &mut InterruptController) -> bool {
        self.dot += 1;
        if self.dot == DOTS_PER_LINE {
            self.dot = 0;
            self.ly += 1;
            if self.ly == LINES_PER_FRAME {
                self.ly = 0;
                self.window_line = 0;
                self.window_y_hit = false;
            }
        }

        let mut hblank = false;
        if self.ly < VISIBLE_LINES {
            if self.dot == 0 {
                self.mode = Mode::OamScan;
            } else if self.dot == OAM_SCAN_DOTS {
                self.start_transfer();
            } else if self.dot == OAM_SCAN_DOTS + self.transfer_dots {
                self.mode = Mode::HBlank;
                hblank = true;
            }
        } else if self.ly == VISIBLE_LINES && self.dot == 0 {
            self.enter_vblank(ints);
        }

        self.refresh_lyc();
        self.update_stat_line(ints);
        hblank
    }

    fn start_transfer(&mut self) {
        if self.ly == self.wy {
            self.window_y_hit = true;
        }
        self.select_objects();
        let window = self.window_on_line();
        self.transfer_dots = self.transfer_length(window);
        self.mode = Mode::Transfer;
        self.render_line(window);
    }

    fn enter_vblank(&mut self, ints: &mut InterruptController) {
        self.mode = Mode::VBlank;
        ints.request(Interrupt::VBlank);
        self.back.set_number(self.frames);
        std::mem::swap(&mut self.front, &mut self.back);
        self.frames += 1;
        self.frame_ready = true;
        if let Some(publisher) = &self.publisher {
            publisher.publish(&self.front);
        }
        #[cfg(feature = "ppu-trace")]
        log::trace!("frame {} complete", self.frames);
    }

    /// Requests LCD STAT only when the ORed source line rises.
    fn update_stat_line(&mut self, ints: &mut InterruptController) {
        let mode2 = self.mode == Mode::OamScan
            || (!self.cgb && self.ly == VISIBLE_LINES && self.dot == 0);
        let line = (self.lyc_match && self.stat & STAT_LYC_SOURCE != 0)
            || (mode2 && self.stat & STAT_MODE2_SOURCE != 0)
            || (self.mode == Mode::VBlank && self.stat & STAT_MODE1_SOURCE != 0)
            || (self.mode == Mode::HBlank && self.stat & STAT_MODE0_SOURCE != 0);
        if line && !self.stat_line {
            ints.request(Interrupt::LcdStat);
        }
        self.stat_line = line;
    }

    fn object_height(&self) -> i16 {
        if self.lcdc & LCDC_TALL_OBJECTS != 0 { 16 } else { 8 }
    }

    /// First ten OAM entries overlapping the current line, ordered by drawing
    /// priority.
    fn select_objects(&mut self) {
        let height = self.object_height();
        let line = i16::from(self.ly);
        self.object_count = 0;
        for (i, entry) in self.oam.chunks_exact(4).enumerate().take(OBJECT_COUNT) {
            if self.object_count == MAX_OBJECTS_PER_LINE {
                break;
            }
            let y = i16::from(entry[0]) - 16;
            if line >= y && line < y + height {
                self.objects[self.object_count] = Object {
                    x: i16::from(entry[1]) - 8,
                    y,
                    oam_x: entry[1],
                    tile: entry[2],
                    flags: entry[3],
                    oam_index: i,
                };
                self.object_count += 1;
            }
        }
        let oam_order = self.cgb_mode() && self.opri & 0x01 == 0;
        let objects = &mut self.objects[..self.object_count];
        if oam_order {
            objects.sort_by_key(|o| o.oam_index);
        } else {
            objects.sort_by_key(|o| (o.oam_x, o.oam_index));
        }
    }

    fn window_on_line(&self) -> bool {
        let bg_on = self.cgb_mode() || self.lcdc & LCDC_BG != 0;
        bg_on && self.lcdc & LCDC_WINDOW != 0 && self.window_y_hit && self.wx <= WINDOW_X_MAX
    }

    /// Pixel-transfer length for the current line.
    ///
    /// 172 dots, plus SCX mod 8 discarded pixels, plus 6 when the window
    /// starts, plus per-object fetch penalties: 6 dots each, and for the first
    /// object in each background tile up to 5 more while the fetcher waits
    /// for that tile. Objects at OAM X = 0 cost a flat 11.
    fn transfer_length(&self, window: bool) -> u16 {
        let fine_scroll = u16::from(self.scx & 0x07);
        let mut dots = TRANSFER_MIN_DOTS + fine_scroll;
        if window {
            dots += WINDOW_PENALTY;
        }
        if self.lcdc & LCDC_OBJECTS != 0 {
            let mut tiles_seen = [false; 32];
            for obj in &self.objects[..self.object_count] {
                if obj.oam_x >= 168 {
                    continue;
                }
                if obj.oam_x == 0 {
                    dots += OBJECT_X0_PENALTY;
                    continue;
                }
                dots += OBJECT_PENALTY;
                let pos = u16::from(obj.oam_x) + fine_scroll;
                let tile = usize::from(pos / 8);
                if !tiles_seen[tile] {
                    tiles_seen[tile] = true;
                    dots += 5u16.saturating_sub(pos % 8);
                }
            }
        }
        dots.min(TRANSFER_MAX_DOTS)
    }

    fn tile_data_addr(&self, tile: u8) -> usize {
        if self.lcdc & LCDC_TILE_DATA != 0 {
            usize::from(tile) * 16
        } else {
            (0x1000 + i32::from(tile as i8) * 16) as usize
        }
    }

    /// Colour id and CGB attributes of one background/window map pixel.
    fn map_pixel(&self, map_base: usize, x: usize, y: usize) -> (u8, u8) {
        let map_index = map_base + (y / 8 % 32) * 32 + (x / 8 % 32);
        let tile = self.vram[0][map_index];
        let attr = if self.cgb_mode() { self.vram[1][map_index] } else { 0 };
        let mut row = y % 8;
        let mut col = x % 8;
        if attr & 0x40 != 0 {
            row = 7 - row;
        }
        if attr & 0x20 != 0 {
            col = 7 - col;
        }
        let bank = usize::from((attr >> 3) & 0x01);
        let addr = self.tile_data_addr(tile) + row * 2;
        let bit = 7 - col;
        let lo = self.vram[bank][addr];
        let hi = self.vram[bank][addr + 1];
        ((((hi >> bit) & 1) << 1) | ((lo >> bit) & 1), attr)
    }

    fn render_line(&mut self, window: bool) {
        let y = usize::from(self.ly);
        let mut ids = [0u8; SCREEN_WIDTH];
        let mut attrs = [0u8; SCREEN_WIDTH];
        let bg_on = self.cgb_mode() || self.lcdc & LCDC_BG != 0;

        if bg_on {
            let map = if self.lcdc & LCDC_BG_MAP != 0 { BG_MAP_HIGH } else { BG_MAP_LOW };
            let sy = (y + usize::from(self.scy)) & 0xFF;
            for x in 0..SCREEN_WIDTH {
                let sx = (x + usize::from(self.scx)) & 0xFF;
                (ids[x], attrs[x]) = self.map_pixel(map, sx, sy);
            }
        }

        if window {
            let map = if self.lcdc & LCDC_WINDOW_MAP != 0 { BG_MAP_HIGH } else { BG_MAP_LOW };
            let left = i16::from(self.wx) - 7;
            let wy = usize::from(self.window_line);
            let start = left.max(0) as usize;
            for x in start..SCREEN_WIDTH {
                let wx = (x as i16 - left) as usize;
                (ids[x], attrs[x]) = self.map_pixel(map, wx, wy);
            }
            self.window_line = self.window_line.wrapping_add(1);
        }

        let mut row = [0u16; SCREEN_WIDTH];
        for x in 0..SCREEN_WIDTH {
            row[x] = self.bg_color(attrs[x], ids[x]);
        }

        if self.lcdc & LCDC_OBJECTS != 0 {
            self.draw_objects(y, bg_on, &ids, &attrs, &mut row);
        }

        self.back.row_mut(y).copy_from_slice(&row);
    }

    fn bg_color(&self, attr: u8, id: u8) -> u16 {
        if self.cgb_mode() {
            self.bg_palettes.color(attr & 0x07, id)
        } else if self.cgb {
            self.bg_palettes.color(0, shade(self.bgp, id))
        } else {
            u16::from(shade(self.bgp, id))
        }
    }

    fn obj_color(&self, flags: u8, id: u8) -> u16 {
        if self.cgb_mode() {
            return self.obj_palettes.color(flags & 0x07, id);
        }
        let (index, palette) = if flags & 0x10 != 0 {
            (1, self.obp1)
        } else {
            (0, self.obp0)
        };
        if self.cgb {
            self.obj_palettes.color(index, shade(palette, id))
        } else {
            u16::from(shade(palette, id))
        }
    }

    fn draw_objects(
        &self,
        y: usize,
        bg_on: bool,
        ids: &[u8; SCREEN_WIDTH],
        attrs: &[u8; SCREEN_WIDTH],
        row: &mut [u16; SCREEN_WIDTH],
    ) {
        let height = self.object_height();
        // On CGB, LCDC bit 0 clear gives objects priority everywhere.
        let bg_can_win = !self.cgb_mode() || self.lcdc & LCDC_BG != 0;
        let mut claimed = [false; SCREEN_WIDTH];

        for obj in &self.objects[..self.object_count] {
            let mut line = y as i16 - obj.y;
            if obj.flags & 0x40 != 0 {
                line = height - 1 - line;
            }
            let tile = if height == 16 { obj.tile & 0xFE } else { obj.tile };
            let addr = usize::from(tile) * 16 + (line as usize) * 2;
            let bank = if self.cgb_mode() { usize::from((obj.flags >> 3) & 0x01) } else { 0 };
            let lo = self.vram[bank][addr];
            let hi = self.vram[bank][addr + 1];

            for px in 0..8i16 {
                let sx = obj.x + px;
                if !(0..SCREEN_WIDTH as i16).contains(&sx) {
                    continue;
                }
                let sx = sx as usize;
                if claimed[sx] {
                    continue;
                }
                let bit = if obj.flags & 0x20 != 0 { px } else { 7 - px };
                let id = (((hi >> bit) & 1) << 1) | ((lo >> bit) & 1);
                if id == 0 {
                    continue;
                }
                claimed[sx] = true;

                let bg_opaque = bg_on && ids[sx] != 0;
                let bg_priority = obj.flags & 0x80 != 0 || attrs[sx] & 0x80 != 0;
                if bg_can_win && bg_opaque && bg_priority {
                    continue;
                }

                row[sx] = self.obj_color(obj.flags, id);
            }
        }
    }
}

fn shade(palette: u8, id: u8) -> u8 {
    (palette >> (id * 2)) & 0x03
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcd_on() -> Ppu {
        let mut ppu = Ppu::new(false);
        ppu.write_reg(0xFF40, 0x93);
        ppu
    }

    fn place_object(ppu: &mut Ppu, slot: usize, oam_y: u8, oam_x: u8) {
        let base = slot * 4;
        ppu.oam[base] = oam_y;
        ppu.oam[base + 1] = oam_x;
    }

    #[test]
    fn plain_line_takes_minimum_transfer() {
        let mut ppu = lcd_on();
        ppu.select_objects();
        assert_eq!(ppu.transfer_length(false), 172);
        ppu.scx = 3;
        assert_eq!(ppu.transfer_length(false), 175);
        assert_eq!(ppu.transfer_length(true), 181);
    }

    #[test]
    fn object_penalties_depend_on_tile_alignment() {
        let mut ppu = lcd_on();
        // Both on line 0; X = 8 starts a tile (5 extra), X = 10 shares it.
        place_object(&mut ppu, 0, 16, 8);
        place_object(&mut ppu, 1, 16, 10);
        ppu.select_objects();
        assert_eq!(ppu.transfer_length(false), 172 + 6 + 5 + 6);

        place_object(&mut ppu, 0, 16, 0);
        place_object(&mut ppu, 1, 16, 200);
        ppu.select_objects();
        assert_eq!(ppu.transfer_length(false), 172 + 11);
    }

    #[test]
    fn transfer_length_is_capped() {
        let mut ppu = lcd_on();
        ppu.scx = 7;
        for slot in 0..10 {
            place_object(&mut ppu, slot, 16, 0);
        }
        ppu.select_objects();
        assert_eq!(ppu.object_count, 10);
        assert_eq!(ppu.transfer_length(true), TRANSFER_MAX_DOTS);
    }

    #[test]
    fn only_ten_objects_per_line() {
        let mut ppu = lcd_on();
        for slot in 0..12 {
            place_object(&mut ppu, slot, 16, 20 + slot as u8);
        }
        ppu.select_objects();
        assert_eq!(ppu.object_count, 10);
        assert_eq!(ppu.objects[9].oam_index, 9);
    }

    #[test]
    fn stat_fires_on_rising_edge_only() {
        let mut ints = InterruptController::new();
        let mut ppu = lcd_on();
        ppu.write_reg(0xFF41, STAT_MODE0_SOURCE | STAT_MODE1_SOURCE);
        // HBlank of line 143 runs straight into VBlank: the line stays high.
        ppu.tick(u32::from(DOTS_PER_LINE) * 143 + 300, &mut ints);
        ints.acknowledge(Interrupt::LcdStat);
        ppu.tick(u32::from(DOTS_PER_LINE), &mut ints);
        assert_eq!(ppu.mode(), Mode::VBlank);
        assert!(!ints.is_requested(Interrupt::LcdStat));
    }

    #[test]
    fn ly_reads_zero_late_in_line_153() {
        let mut ints = InterruptController::new();
        let mut ppu = lcd_on();
        ppu.tick(u32::from(DOTS_PER_LINE) * 153, &mut ints);
        assert_eq!(ppu.read_reg(0xFF44), 153);
        ppu.tick(4, &mut ints);
        assert_eq!(ppu.read_reg(0xFF44), 0);
        assert_eq!(ppu.line(), 153);
    }

    #[test]
    fn palette_index_auto_increments() {
        let mut ppu = Ppu::new(true);
        ppu.write_reg(0xFF68, 0x80 | 0x3F);
        ppu.write_reg(0xFF69, 0x12);
        assert_eq!(ppu.read_reg(0xFF68), 0x80 | 0x40);
        ppu.write_reg(0xFF68, 0x3F);
        assert_eq!(ppu.read_reg(0xFF69), 0x12);
        ppu.write_reg(0xFF69, 0x34);
        assert_eq!(ppu.read_reg(0xFF68), 0x7F);
    }
}
