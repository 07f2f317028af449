//! Host-side helpers for the `dotmatrix` runner: configuration, save files
//! and screenshots.

pub mod config;
pub mod persist;
pub mod screenshot;

/// Serial bytes as printable text, escaping anything outside ASCII graphics.
pub fn format_serial(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' || b == b'\n' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    out
}
