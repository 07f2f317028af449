use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use dotmatrix_core::Model;
use dotmatrix_core::frame::{Frame, SCREEN_HEIGHT, SCREEN_WIDTH};

/// Grey levels for DMG shades 0-3.
const DMG_GREYS: [u8; 4] = [0xFF, 0xAA, 0x55, 0x00];

fn expand5(c: u16) -> u8 {
    let c = (c & 0x1F) as u8;
    (c << 3) | (c >> 2)
}

/// Frame as packed 8-bit RGB.
pub fn to_rgb(frame: &Frame, model: Model) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 3);
    for &c in frame.pixels() {
        match model {
            Model::Dmg => {
                let grey = DMG_GREYS[usize::from(c & 0x03)];
                pixels.extend_from_slice(&[grey, grey, grey]);
            }
            Model::Cgb => {
                pixels.extend_from_slice(&[expand5(c), expand5(c >> 5), expand5(c >> 10)]);
            }
        }
    }
    pixels
}

pub fn write_png(path: &Path, frame: &Frame, model: Model) -> Result<(), png::EncodingError> {
    let file = BufWriter::new(File::create(path)?);
    let mut encoder = png::Encoder::new(file, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&to_rgb(frame, model))?;
    writer.finish()
}
