use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use dotmatrix_core::Cartridge;
use log::{info, warn};

pub fn save_path(rom: &Path) -> PathBuf {
    rom.with_extension("sav")
}

pub fn rtc_path(rom: &Path) -> PathBuf {
    rom.with_extension("rtc")
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Restore battery RAM and clock state stored next to `rom`, advancing the
/// clock by the host time elapsed since it was written.
pub fn load(cart: &mut Cartridge, rom: &Path, now: u64) -> Result<(), Box<dyn Error>> {
    if !cart.has_battery() {
        return Ok(());
    }

    let sav = save_path(rom);
    if !cart.ram().is_empty() && sav.exists() {
        cart.load_ram(&std::fs::read(&sav)?)?;
        info!("loaded {}", sav.display());
    }

    let rtc = rtc_path(rom);
    if cart.has_rtc() && rtc.exists() {
        let stamp = cart.load_rtc_state(&std::fs::read(&rtc)?)?;
        if now > stamp {
            cart.advance_rtc(now - stamp);
        } else if now < stamp {
            warn!("clock file {} is from the future; not advancing", rtc.display());
        }
        info!("loaded {}", rtc.display());
    }
    Ok(())
}

pub fn store(cart: &Cartridge, rom: &Path, now: u64) -> std::io::Result<()> {
    if !cart.has_battery() {
        return Ok(());
    }
    if !cart.ram().is_empty() {
        std::fs::write(save_path(rom), cart.ram())?;
    }
    if let Some(state) = cart.rtc_state(now) {
        std::fs::write(rtc_path(rom), state)?;
    }
    Ok(())
}
