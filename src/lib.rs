//! Scrolling multi-channel signal viewer.
//!
//! [`signal`] holds the data side (sample matrix, ingest, decimation,
//! export), [`viewer`] the interaction side (viewport, channel selection,
//! renderers, state), and [`gui`] paints the renderer output with egui.

pub mod config;
pub mod engine;
pub mod gui;
pub mod signal;
pub mod types;
pub mod viewer;

pub use config::ViewerConfig;
pub use signal::{SampleMatrix, ViewerError};
pub use viewer::ViewerState;
