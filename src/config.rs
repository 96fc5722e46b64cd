//! Viewer configuration.
//!
//! Stored as JSON. Every field has a default, so a partial file (or none at
//! all) is valid.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::signal::ViewerError;
use crate::viewer::render::{Colormap, PolarMode, RecurrenceMode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Rate assumed when the input carries no timing information.
    pub default_sample_rate: f32,
    /// Channels kept from array inputs.
    pub max_channels: usize,
    pub viewport: ViewportConfig,
    pub render: RenderConfig,
    pub decimation: DecimationConfig,
    pub service: ServiceConfig,
    /// Minimum spacing of scheduled renders.
    pub render_throttle_ms: u64,
    pub surface: SurfaceConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_sample_rate: 250.0,
            max_channels: 19,
            viewport: ViewportConfig::default(),
            render: RenderConfig::default(),
            decimation: DecimationConfig::default(),
            service: ServiceConfig::default(),
            render_throttle_ms: 16,
            surface: SurfaceConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub duration_seconds: f32,
    pub zoom: f32,
    pub speed: f32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 10.0,
            zoom: 1.0,
            speed: 1.0,
        }
    }
}

/// Settings shared by the projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Recurrence window length.
    pub chunk_seconds: f32,
    pub polar_mode: PolarMode,
    pub polar_time_window_seconds: f32,
    pub polar_radius_scale: f32,
    pub recurrence_mode: RecurrenceMode,
    pub colormap: Colormap,
    pub heatmap_bins: usize,
    /// Normalized difference below which XOR treats samples as identical.
    pub xor_threshold: f32,
    /// Normalized difference that earns an XOR marker.
    pub xor_marker_threshold: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 5.0,
            polar_mode: PolarMode::Cumulative,
            polar_time_window_seconds: 5.0,
            polar_radius_scale: 0.8,
            recurrence_mode: RecurrenceMode::Scatter,
            colormap: Colormap::Viridis,
            heatmap_bins: 128,
            xor_threshold: 0.02,
            xor_marker_threshold: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecimationConfig {
    pub risk_threshold_hz: f32,
}

impl Default for DecimationConfig {
    fn default() -> Self {
        Self {
            risk_threshold_hz: crate::signal::decimate::DEFAULT_RISK_THRESHOLD_HZ,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub endpoint: String,
    pub timeout_seconds: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: String::from("http://127.0.0.1:5000/api/classify_eeg"),
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 900.0,
            height: 500.0,
        }
    }
}

fn positive(name: &str, value: f32) -> Result<(), ViewerError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ViewerError::Config(format!("{name} must be positive, got {value}")))
    }
}

impl ViewerConfig {
    pub fn from_json(text: &str) -> Result<Self, ViewerError> {
        let config: ViewerConfig =
            serde_json::from_str(text).map_err(|e| ViewerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ViewerError> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        positive("default_sample_rate", self.default_sample_rate)?;
        positive("viewport.duration_seconds", self.viewport.duration_seconds)?;
        positive("viewport.zoom", self.viewport.zoom)?;
        positive("viewport.speed", self.viewport.speed)?;
        positive("render.chunk_seconds", self.render.chunk_seconds)?;
        positive("render.polar_time_window_seconds", self.render.polar_time_window_seconds)?;
        positive("render.polar_radius_scale", self.render.polar_radius_scale)?;
        positive("surface.width", self.surface.width)?;
        positive("surface.height", self.surface.height)?;
        if self.max_channels == 0 {
            return Err(ViewerError::Config("max_channels must be at least 1".into()));
        }
        if self.render.heatmap_bins < 2 {
            return Err(ViewerError::Config("render.heatmap_bins must be at least 2".into()));
        }
        if self.service.timeout_seconds == 0 {
            return Err(ViewerError::Config("service.timeout_seconds must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ViewerConfig::from_json(
            r#"{ "render": { "polar_mode": "latest", "heatmap_bins": 64 }, "max_channels": 12 }"#,
        )
        .unwrap();
        assert_eq!(config.render.polar_mode, PolarMode::Latest);
        assert_eq!(config.render.heatmap_bins, 64);
        assert_eq!(config.render.colormap, Colormap::Viridis);
        assert_eq!(config.max_channels, 12);
        assert_eq!(config.viewport.duration_seconds, 10.0);
        assert_eq!(config.service.timeout_seconds, 30);
    }

    #[test]
    fn bad_values_are_config_errors() {
        for text in [
            r#"{ "viewport": { "zoom": 0 } }"#,
            r#"{ "render": { "heatmap_bins": 1 } }"#,
            r#"{ "default_sample_rate": -5 }"#,
            r#"{ "render": { "colormap": "rainbow" } }"#,
        ] {
            assert!(matches!(ViewerConfig::from_json(text), Err(ViewerError::Config(_))), "{text}");
        }
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("viewer.json");
        let mut config = ViewerConfig::default();
        config.render.recurrence_mode = RecurrenceMode::Heatmap;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(ViewerConfig::load(&path).unwrap(), config);
    }
}
