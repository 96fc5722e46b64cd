use serde::{Deserialize, Serialize};

use crate::signal::Color;

/// Palette used to color heatmap density.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colormap {
    Gray,
    Hot,
    Jet,
    #[default]
    Viridis,
}

impl Colormap {
    pub const ALL: [Colormap; 4] = [Colormap::Viridis, Colormap::Hot, Colormap::Jet, Colormap::Gray];

    pub fn label(self) -> &'static str {
        match self {
            Colormap::Gray => "Gray",
            Colormap::Hot => "Hot",
            Colormap::Jet => "Jet",
            Colormap::Viridis => "Viridis",
        }
    }

    /// Maps `v` in `[0, 1]` (clamped) to a color.
    pub fn map(self, v: f32) -> Color {
        let v = if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let unit = |x: f32| (255.0 * x.clamp(0.0, 1.0)).round() as u8;
        match self {
            Colormap::Gray => {
                let g = unit(v);
                Color::rgb(g, g, g)
            }
            Colormap::Hot => Color::rgb(
                unit(3.0 * v),
                unit(3.0 * (v - 1.0 / 3.0)),
                unit(3.0 * (v - 2.0 / 3.0)),
            ),
            Colormap::Jet => Color::rgb(
                unit(1.5 - (1.0 - 4.0 * v).abs()),
                unit(1.5 - (0.5 - 4.0 * v).abs()),
                unit(1.5 - (-0.5 - 4.0 * v).abs()),
            ),
            // Linear approximation of viridis endpoints.
            Colormap::Viridis => Color::rgb(
                (68.0 + 187.0 * v).round() as u8,
                (1.0 + 188.0 * v).round() as u8,
                (84.0 + 155.0 * (1.0 - v)).round() as u8,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(Colormap::Gray.map(0.0), Color::BLACK);
        assert_eq!(Colormap::Gray.map(1.0), Color::WHITE);
        assert_eq!(Colormap::Hot.map(0.0), Color::BLACK);
        assert_eq!(Colormap::Hot.map(1.0), Color::WHITE);
        assert_eq!(Colormap::Viridis.map(0.0), Color::rgb(68, 1, 239));
        assert_eq!(Colormap::Viridis.map(1.0), Color::rgb(255, 189, 84));
    }

    #[test]
    fn out_of_range_is_clamped() {
        assert_eq!(Colormap::Jet.map(-3.0), Colormap::Jet.map(0.0));
        assert_eq!(Colormap::Jet.map(7.0), Colormap::Jet.map(1.0));
        assert_eq!(Colormap::Hot.map(f32::NAN), Color::BLACK);
    }
}
