use std::path::{Path, PathBuf};

use dotmatrix_core::hardware::{DEFAULT_SAMPLE_RATE, DmgRevision, EmulatorConfig, Model};
use log::warn;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EmulationMode {
    #[default]
    Auto,
    ForceDmg,
    ForceCgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Revision {
    #[serde(rename = "0")]
    Rev0,
    #[serde(rename = "a")]
    RevA,
    #[serde(rename = "b")]
    RevB,
    #[serde(rename = "c")]
    #[default]
    RevC,
}

impl From<Revision> for DmgRevision {
    fn from(rev: Revision) -> Self {
        match rev {
            Revision::Rev0 => DmgRevision::Rev0,
            Revision::RevA => DmgRevision::RevA,
            Revision::RevB => DmgRevision::RevB,
            Revision::RevC => DmgRevision::RevC,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub emulation_mode: EmulationMode,
    pub dmg_revision: Revision,
    pub sample_rate: u32,
    pub frames: u32,
    pub dmg_bootrom_path: Option<PathBuf>,
    pub cgb_bootrom_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            emulation_mode: EmulationMode::Auto,
            dmg_revision: Revision::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            frames: 60,
            dmg_bootrom_path: None,
            cgb_bootrom_path: None,
        }
    }
}

impl RunnerConfig {
    pub fn emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            model: match self.emulation_mode {
                EmulationMode::Auto => None,
                EmulationMode::ForceDmg => Some(Model::Dmg),
                EmulationMode::ForceCgb => Some(Model::Cgb),
            },
            dmg_revision: self.dmg_revision.into(),
            sample_rate: self.sample_rate,
        }
    }

    pub fn bootrom_path(&self, model: Model) -> Option<&Path> {
        match model {
            Model::Dmg => self.dmg_bootrom_path.as_deref(),
            Model::Cgb => self.cgb_bootrom_path.as_deref(),
        }
    }
}

pub fn default_config_path() -> PathBuf {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("dotmatrix").join("config.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("dotmatrix")
            .join("config.toml");
    }

    PathBuf::from("dotmatrix.toml")
}

/// Missing files give the defaults silently; malformed ones log a warning.
pub fn load_from_file(path: &Path) -> RunnerConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return RunnerConfig::default(),
    };

    match toml::from_str::<RunnerConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse config {}: {e}; using defaults",
                path.display()
            );
            RunnerConfig::default()
        }
    }
}

pub fn save_to_file(path: &Path, cfg: &RunnerConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).map_err(std::io::Error::other)?;
    std::fs::write(path, text)
}
