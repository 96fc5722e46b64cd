// src/types.rs
use std::path::PathBuf;

use crate::signal::SampleMatrix;
use crate::viewer::AnalysisResult;

// GUI -> worker
#[derive(Clone, Debug)]
pub enum EngineCommand {
    LoadFile(PathBuf),
    // built-in 10-20 demo montage
    LoadSynthetic,
    Classify(PathBuf),
    Shutdown,
}

// worker -> GUI
#[derive(Clone, Debug)]
pub enum EngineMessage {
    Log(String),
    Loaded { source: String, matrix: SampleMatrix },
    LoadFailed(String),
    Classified(AnalysisResult),
    ServiceFailed(String),
}
