//! Translation of classification-service responses into display fields.
//!
//! The service is an external collaborator. It receives the uploaded file as a
//! multipart `file` field and answers with one of two JSON shapes (EEG or ECG),
//! or an error object. Nothing here interprets the classification itself.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{info, warn};
use once_cell::sync::Lazy;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};

use crate::config::ServiceConfig;
use crate::signal::ViewerError;

static CONDITION_NAMES: Lazy<BTreeMap<&'static str, &'static str>> = Lazy::new(|| {
    BTreeMap::from([
        ("1dAVB", "1° Atrioventricular Block (1dAVB)"),
        ("LBBB", "Left Bundle Branch Block (LBBB)"),
        ("SB", "Sinus Bradycardia (SB)"),
        ("ST", "Sinus Tachycardia (ST)"),
        ("AF", "Atrial Flutter (AF)"),
        ("RBBB", "Right Bundle Branch Block (RBBB)"),
        ("Normal", "Normal ECG"),
    ])
});

/// Long display name for a known class abbreviation, or the label itself.
pub fn display_name(label: &str) -> String {
    CONDITION_NAMES
        .get(label)
        .map(|s| (*s).to_owned())
        .unwrap_or_else(|| label.to_owned())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Normal,
    Abnormal,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub label: String,
    pub display_name: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    /// Per-class probabilities, most likely first.
    pub probabilities: Vec<(String, f32)>,
    /// Present only for services that report a normal/abnormal split.
    pub verdict: Option<Verdict>,
}

impl AnalysisResult {
    pub fn confidence_percent(&self) -> f32 {
        self.confidence * 100.0
    }

    pub fn headline(&self) -> String {
        let body = format!("{} ({:.1}% confidence)", self.display_name, self.confidence_percent());
        match self.verdict {
            Some(Verdict::Normal) => format!("Normal: {body}"),
            Some(Verdict::Abnormal) => format!("Abnormal: {body}"),
            None => body,
        }
    }
}

/// Union of every field either backend may send.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawResponse {
    status: Option<String>,
    error: Option<String>,
    prediction: Option<String>,
    confidence: Option<f32>,
    probabilities: Option<BTreeMap<String, f32>>,
    normal_abnormal: Option<String>,
    best_class: Option<String>,
    best_prob: Option<f32>,
    all_probabilities: Option<BTreeMap<String, f32>>,
}

pub struct AnalysisResultAdapter;

impl AnalysisResultAdapter {
    pub fn from_json(body: &str) -> Result<AnalysisResult, ViewerError> {
        let raw: RawResponse = serde_json::from_str(body)
            .map_err(|e| ViewerError::Service(format!("malformed response: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawResponse) -> Result<AnalysisResult, ViewerError> {
        if raw.status.as_deref() == Some("error") || raw.error.is_some() {
            return Err(ViewerError::Service(
                raw.error.unwrap_or_else(|| "unknown error from backend".into()),
            ));
        }

        let (label, confidence, probabilities) = match (raw.best_class, raw.prediction) {
            (Some(label), _) => (label, raw.best_prob, raw.all_probabilities),
            (None, Some(label)) => (label, raw.confidence, raw.probabilities),
            (None, None) => {
                return Err(ViewerError::Service("response carries no class label".into()));
            }
        };
        let probabilities = probabilities.unwrap_or_default();
        let confidence = confidence
            .or_else(|| probabilities.get(&label).copied())
            .ok_or_else(|| ViewerError::Service(format!("no confidence reported for {label}")))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ViewerError::Service(format!(
                "confidence {confidence} outside [0, 1]"
            )));
        }

        let mut probabilities: Vec<(String, f32)> = probabilities.into_iter().collect();
        probabilities.sort_by(|a, b| b.1.total_cmp(&a.1));

        let verdict = raw.normal_abnormal.map(|v| {
            if v.eq_ignore_ascii_case("normal") {
                Verdict::Normal
            } else {
                Verdict::Abnormal
            }
        });

        Ok(AnalysisResult {
            display_name: display_name(&label),
            label,
            confidence,
            probabilities,
            verdict,
        })
    }
}

/// Anything that can classify an uploaded file.
pub trait Classifier: Send {
    fn classify(&self, file_name: &str, bytes: &[u8]) -> Result<AnalysisResult, ViewerError>;

    fn classify_path(&self, path: &Path) -> Result<AnalysisResult, ViewerError> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        self.classify(&name, &bytes)
    }
}

/// Blocking HTTP client for the classification service. Failures are
/// reported once; there is no retry.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(config: &ServiceConfig) -> Result<Self, ViewerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ViewerError::Service(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// File name as it goes into the multipart header. Quotes, backslashes and
/// control characters become `_`.
pub fn upload_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_control() || c == '"' || c == '\\' { '_' } else { c })
        .collect();
    if cleaned.trim().is_empty() {
        "upload".to_owned()
    } else {
        cleaned
    }
}

impl Classifier for HttpClassifier {
    fn classify(&self, file_name: &str, bytes: &[u8]) -> Result<AnalysisResult, ViewerError> {
        info!("sending {file_name} ({} bytes) to {}", bytes.len(), self.endpoint);
        let part = Part::bytes(bytes.to_vec())
            .file_name(upload_name(file_name))
            .mime_str("application/octet-stream")
            .map_err(|e| ViewerError::Service(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .multipart(form)
            .send()
            .map_err(|e| {
                warn!("classification service unreachable: {e}");
                ViewerError::Service(format!(
                    "cannot reach the analysis server at {}: {e}",
                    self.endpoint
                ))
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| ViewerError::Service(format!("failed to read response: {e}")))?;
        if !status.is_success() {
            warn!("classification service returned {status}");
            return Err(ViewerError::Service(format!(
                "server error: {} - {body}",
                status.as_u16()
            )));
        }
        AnalysisResultAdapter::from_json(&body)
    }
}
