use thiserror::Error;

/// Reasons a cartridge image or its save data can be rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("cartridge image is {0} bytes, too small to contain a header")]
    Truncated(usize),

    #[error("unsupported cartridge type 0x{0:02X}")]
    UnsupportedType(u8),

    #[error("unknown ROM size code 0x{0:02X}")]
    InvalidRomSize(u8),

    #[error("unknown RAM size code 0x{0:02X}")]
    InvalidRamSize(u8),

    #[error("header declares {declared} bytes of ROM but the image holds {actual}")]
    RomSizeMismatch { declared: usize, actual: usize },

    #[error("save data is {actual} bytes, cartridge RAM is {expected}")]
    SaveSizeMismatch { expected: usize, actual: usize },

    #[error("clock state is malformed")]
    InvalidRtcState,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BootRomError {
    #[error("boot ROM must be {expected} bytes for this model, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
