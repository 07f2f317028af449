use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use dotmatrix_cli::{config, format_serial, persist, screenshot};
use dotmatrix_core::{Cartridge, GameBoy, Model};
use log::info;

#[derive(Parser)]
#[command(version, about = "Run a Game Boy ROM headless")]
struct Args {
    /// Path to ROM file
    rom: PathBuf,

    /// Force DMG mode
    #[arg(long, conflicts_with = "cgb")]
    dmg: bool,

    /// Force CGB mode
    #[arg(long, conflicts_with = "dmg")]
    cgb: bool,

    /// Boot ROM to run before the cartridge
    #[arg(long)]
    bootrom: Option<PathBuf>,

    /// Config file (defaults to the per-user location)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of frames to run
    #[arg(long)]
    frames: Option<u32>,

    /// Write the last frame to this PNG file
    #[arg(long)]
    screenshot: Option<PathBuf>,

    /// Print serial port output
    #[arg(long)]
    serial: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_from_file(&config_path);
    if args.dmg {
        cfg.emulation_mode = config::EmulationMode::ForceDmg;
    } else if args.cgb {
        cfg.emulation_mode = config::EmulationMode::ForceCgb;
    }
    let frames = args.frames.unwrap_or(cfg.frames);

    let mut cart = Cartridge::from_bytes(std::fs::read(&args.rom)?)?;
    persist::load(&mut cart, &args.rom, persist::unix_now())?;

    let core_config = cfg.emulator_config();
    let model = core_config.resolve_model(&cart);
    let bootrom = args
        .bootrom
        .clone()
        .or_else(|| cfg.bootrom_path(model).map(PathBuf::from));
    let mut gb = match bootrom {
        Some(path) => GameBoy::with_boot_rom(cart, std::fs::read(&path)?, &core_config)?,
        None => GameBoy::new(cart, &core_config),
    };
    info!(
        "running \"{}\" in {} mode for {frames} frames",
        gb.cartridge().title(),
        match model {
            Model::Dmg => "DMG",
            Model::Cgb => "CGB",
        }
    );

    let mut serial = Vec::new();
    for _ in 0..frames {
        gb.run_frame();
        // Nothing drains audio in headless mode.
        gb.take_audio_samples();
        serial.extend(gb.take_serial_output());
    }

    if args.serial && !serial.is_empty() {
        println!("[SERIAL] {}", format_serial(&serial));
    }

    if let Some(path) = &args.screenshot {
        screenshot::write_png(path, gb.frame(), model)?;
        info!("wrote {}", path.display());
    }

    persist::store(gb.cartridge(), &args.rom, persist::unix_now())?;
    Ok(())
}
