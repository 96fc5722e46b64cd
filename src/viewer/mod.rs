// src/viewer/mod.rs
// Interaction side: what is visible, which channels, and how it is drawn.
pub mod analysis;
pub mod render;
pub mod selection;
pub mod snapshot;
pub mod state;
pub mod viewport;

pub use analysis::{AnalysisResult, AnalysisResultAdapter, Classifier, HttpClassifier};
pub use render::{DrawCommand, Surface};
pub use selection::{ChannelSelectionModel, ViewMode};
pub use state::ViewerState;
pub use viewport::{FrameToken, PlaybackState, RenderThrottle, ViewportController};
