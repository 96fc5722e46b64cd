// src/signal/mod.rs
// Data side of the viewer: the sample matrix, how it is produced, decimated and exported.
pub mod color;
pub mod decimate;
pub mod error;
pub mod export;
pub mod fft;
pub mod ingest;
pub mod leads;
pub mod matrix;

pub use color::{palette_color, Color};
pub use decimate::{AliasingReport, DecimationState, Decimator, DEFAULT_RISK_THRESHOLD_HZ};
pub use error::ViewerError;
pub use fft::{FrequencySpectrum, SpectrumBuilder};
pub use ingest::{load_path, CsvSource, MatrixSource, NpySource, SyntheticSource};
pub use matrix::{Channel, SampleMatrix};
