// src/engine.rs
// Background worker: file parsing and classification calls run here so the
// GUI thread never blocks on disk or network.
use std::path::Path;
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{error, info};

use crate::config::ViewerConfig;
use crate::signal::ingest::{load_path, MatrixSource, SyntheticSource};
use crate::signal::ViewerError;
use crate::types::*;
use crate::viewer::analysis::{Classifier, HttpClassifier};

pub fn spawn_thread(
    tx: Sender<EngineMessage>,
    rx_cmd: Receiver<EngineCommand>,
    config: ViewerConfig,
) -> Result<JoinHandle<()>, ViewerError> {
    let classifier = HttpClassifier::new(&config.service)?;
    Ok(spawn_with_classifier(tx, rx_cmd, config, Box::new(classifier)))
}

pub fn spawn_with_classifier(
    tx: Sender<EngineMessage>,
    rx_cmd: Receiver<EngineCommand>,
    config: ViewerConfig,
    classifier: Box<dyn Classifier>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tx.send(EngineMessage::Log("worker ready".to_owned())).ok();
        // blocks until the GUI sends something or hangs up
        for cmd in rx_cmd.iter() {
            match cmd {
                EngineCommand::LoadFile(path) => load_file(&tx, &path, &config),
                EngineCommand::LoadSynthetic => {
                    let mut source = SyntheticSource::default();
                    match source.read_matrix() {
                        Ok(matrix) => {
                            tx.send(EngineMessage::Loaded {
                                source: "synthetic 10-20 montage".to_owned(),
                                matrix,
                            })
                            .ok();
                        }
                        Err(e) => {
                            tx.send(EngineMessage::LoadFailed(e.to_string())).ok();
                        }
                    }
                }
                EngineCommand::Classify(path) => match classifier.classify_path(&path) {
                    Ok(result) => {
                        info!("classified {}: {}", path.display(), result.headline());
                        tx.send(EngineMessage::Classified(result)).ok();
                    }
                    Err(e) => {
                        error!("classification of {} failed: {e}", path.display());
                        tx.send(EngineMessage::ServiceFailed(e.to_string())).ok();
                    }
                },
                EngineCommand::Shutdown => break,
            }
        }
        info!("worker stopped");
    })
}

fn load_file(tx: &Sender<EngineMessage>, path: &Path, config: &ViewerConfig) {
    tx.send(EngineMessage::Log(format!("reading {}", path.display())))
        .ok();
    match load_path(path, config.default_sample_rate, config.max_channels) {
        Ok(matrix) => {
            tx.send(EngineMessage::Loaded {
                source: path.display().to_string(),
                matrix,
            })
            .ok();
        }
        Err(e) => {
            error!("failed to load {}: {e}", path.display());
            tx.send(EngineMessage::LoadFailed(e.to_string())).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::analysis::{AnalysisResult, AnalysisResultAdapter};
    use std::sync::mpsc;
    use std::time::Duration;

    struct CannedClassifier(&'static str);

    impl Classifier for CannedClassifier {
        fn classify(&self, _name: &str, _bytes: &[u8]) -> Result<AnalysisResult, ViewerError> {
            AnalysisResultAdapter::from_json(self.0)
        }
    }

    fn next_non_log(rx: &Receiver<EngineMessage>) -> EngineMessage {
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                EngineMessage::Log(_) => continue,
                other => return other,
            }
        }
    }

    fn start(canned: &'static str) -> (Sender<EngineCommand>, Receiver<EngineMessage>, JoinHandle<()>) {
        let (tx_cmd, rx_cmd) = mpsc::channel();
        let (tx, rx) = mpsc::channel();
        let handle = spawn_with_classifier(tx, rx_cmd, ViewerConfig::default(), Box::new(CannedClassifier(canned)));
        (tx_cmd, rx, handle)
    }

    #[test]
    fn loads_csv_and_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("rec.csv");
        std::fs::write(&good, "I,II\n1,2\n3,4\n5,6\n").unwrap();
        let bad = dir.path().join("rec.bin");
        std::fs::write(&bad, [0u8; 4]).unwrap();

        let (tx_cmd, rx, handle) = start("{}");
        tx_cmd.send(EngineCommand::LoadFile(good)).unwrap();
        match next_non_log(&rx) {
            EngineMessage::Loaded { matrix, .. } => assert_eq!(matrix.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
        tx_cmd.send(EngineCommand::LoadFile(bad)).unwrap();
        assert!(matches!(next_non_log(&rx), EngineMessage::LoadFailed(_)));
        tx_cmd.send(EngineCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn classification_outcomes_are_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("rec.csv");
        std::fs::write(&file, "1\n").unwrap();

        let (tx_cmd, rx, handle) = start(r#"{"prediction": "Normal", "confidence": 0.8}"#);
        tx_cmd.send(EngineCommand::Classify(file.clone())).unwrap();
        match next_non_log(&rx) {
            EngineMessage::Classified(r) => assert_eq!(r.display_name, "Normal ECG"),
            other => panic!("unexpected {other:?}"),
        }
        // missing file never reaches the service
        tx_cmd.send(EngineCommand::Classify(dir.path().join("gone.csv"))).unwrap();
        assert!(matches!(next_non_log(&rx), EngineMessage::ServiceFailed(_)));
        drop(tx_cmd);
        handle.join().unwrap();
    }
}
