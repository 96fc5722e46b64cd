use serde::{Deserialize, Serialize};

/// 8-bit RGBA color shared by channel metadata and draw commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const GRID: Color = Color::rgb(238, 238, 238);
    pub const GRID_MAJOR: Color = Color::rgb(204, 204, 204);
    pub const LABEL: Color = Color::rgb(102, 102, 102);
    pub const HIGHLIGHT: Color = Color::rgb(255, 0, 0);
    pub const MARKER: Color = Color::rgb(255, 107, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parses `#RRGGBB` or `RRGGBB`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        Some(Color::rgb(
            ((value >> 16) & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
            (value & 0xFF) as u8,
        ))
    }

    pub fn with_opacity(self, opacity: f32) -> Self {
        Self {
            a: (opacity.clamp(0.0, 1.0) * 255.0).round() as u8,
            ..self
        }
    }

    pub fn opacity(&self) -> f32 {
        self.a as f32 / 255.0
    }
}

const PALETTE_HEX: [&str; 19] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#F7DC6F",
    "#BB8FCE", "#85C1E9", "#F1948A", "#82E0AA", "#F8C471", "#85C1E9", "#D7BDE2", "#F9E79F",
    "#A9DFBF", "#F5B7B1", "#AED6F1",
];

/// Fallback color for channels that are not part of a canonical set.
pub fn palette_color(index: usize) -> Color {
    Color::from_hex(PALETTE_HEX[index % PALETTE_HEX.len()]).unwrap_or(Color::LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_and_without_hash() {
        assert_eq!(Color::from_hex("#E63946"), Some(Color::rgb(0xE6, 0x39, 0x46)));
        assert_eq!(Color::from_hex("06D6A0"), Some(Color::rgb(0x06, 0xD6, 0xA0)));
        assert_eq!(Color::from_hex("#FFF"), None);
        assert_eq!(Color::from_hex("zzzzzz"), None);
    }

    #[test]
    fn palette_wraps() {
        assert_eq!(palette_color(0), palette_color(19));
        assert_eq!(Color::WHITE.with_opacity(0.3).a, 77);
    }
}
