//! # Render Module
//!
//! Monochrome image composition for the e-paper display.
//!
//! This module handles:
//! - Decoding and thresholding source images to 1 bit
//! - Drawing the status footer (WiFi, battery, date)
//! - The "No image available" placeholder
//! - 1-bpp BMP serialization with the fixed black/white colour table

pub mod bitmap;
pub mod bmp;
pub mod footer;
pub mod glyphs;
pub mod placeholder;

use embedded_graphics::mono_font::ascii::{
    FONT_10X20, FONT_6X10, FONT_6X13, FONT_6X13_BOLD, FONT_7X13, FONT_7X13_BOLD, FONT_8X13,
    FONT_8X13_BOLD, FONT_9X15, FONT_9X15_BOLD, FONT_9X18, FONT_9X18_BOLD,
};
use embedded_graphics::mono_font::MonoFont;

pub use footer::{compose, FooterStyle, FOOTER_HEIGHT};
pub use placeholder::placeholder;

/// Font used when the configured name is unknown
pub const FALLBACK_FONT: &MonoFont<'static> = &FONT_6X10;

/// Built-in font names accepted in `display.footer_font`
pub const FONT_NAMES: &[&str] = &[
    "6x10", "6x13", "6x13_bold", "7x13", "7x13_bold", "8x13", "8x13_bold", "9x15", "9x15_bold",
    "9x18", "9x18_bold", "10x20",
];

/// Look up a built-in font by name (case-insensitive)
pub fn font_by_name(name: &str) -> Option<&'static MonoFont<'static>> {
    let font = match name.to_ascii_lowercase().as_str() {
        "6x10" => &FONT_6X10,
        "6x13" => &FONT_6X13,
        "6x13_bold" => &FONT_6X13_BOLD,
        "7x13" => &FONT_7X13,
        "7x13_bold" => &FONT_7X13_BOLD,
        "8x13" => &FONT_8X13,
        "8x13_bold" => &FONT_8X13_BOLD,
        "9x15" => &FONT_9X15,
        "9x15_bold" => &FONT_9X15_BOLD,
        "9x18" => &FONT_9X18,
        "9x18_bold" => &FONT_9X18_BOLD,
        "10x20" => &FONT_10X20,
        _ => return None,
    };
    Some(font)
}
