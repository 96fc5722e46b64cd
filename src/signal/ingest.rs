//! Producers of [`SampleMatrix`] values: CSV text, `.npy` arrays and a
//! synthetic EEG montage for demos.

use std::f32::consts::PI;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use ndarray::{ArrayD, Axis, Ix3};
use ndarray_npy::{ReadNpyError, ReadNpyExt, ReadableElement};
use rand::Rng;

use crate::signal::color::palette_color;
use crate::signal::leads::EEG_10_20;
use crate::signal::matrix::{Channel, SampleMatrix};
use crate::signal::ViewerError;

/// Anything that can materialize a matrix on demand.
pub trait MatrixSource {
    fn read_matrix(&mut self) -> Result<SampleMatrix, ViewerError>;
}

/// Picks a source from the file extension and reads it.
pub fn load_path(
    path: &Path,
    default_sample_rate: f32,
    max_channels: usize,
) -> Result<SampleMatrix, ViewerError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    info!("loading {} as {ext}", path.display());
    match ext.as_str() {
        "npy" => NpySource::new(fs::read(path)?, default_sample_rate, max_channels).read_matrix(),
        "csv" | "txt" | "tsv" => {
            CsvSource::new(fs::read_to_string(path)?, default_sample_rate).read_matrix()
        }
        other => Err(ViewerError::Parse(format!("unsupported file type '{other}'"))),
    }
}

/// Delimited text with an optional header row.
pub struct CsvSource {
    text: String,
    default_sample_rate: f32,
}

impl CsvSource {
    pub fn new(text: impl Into<String>, default_sample_rate: f32) -> Self {
        Self {
            text: text.into(),
            default_sample_rate,
        }
    }

    fn sniff_delimiter(first_line: &str) -> u8 {
        if first_line.contains(';') {
            b';'
        } else if first_line.contains('\t') {
            b'\t'
        } else {
            b','
        }
    }
}

impl MatrixSource for CsvSource {
    fn read_matrix(&mut self) -> Result<SampleMatrix, ViewerError> {
        let first_line = self
            .text
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| ViewerError::parse("file is empty"))?;
        let delimiter = Self::sniff_delimiter(first_line);
        let has_header = first_line
            .split(delimiter as char)
            .map(str::trim)
            .any(|cell| !cell.is_empty() && cell.parse::<f64>().is_err());

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_header)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(self.text.as_bytes());

        let mut headers: Vec<String> = if has_header {
            reader.headers()?.iter().map(str::to_owned).collect()
        } else {
            Vec::new()
        };

        let mut rows: Vec<Vec<f32>> = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().all(str::is_empty) {
                continue;
            }
            let row = record
                .iter()
                .enumerate()
                .map(|(col_idx, cell)| {
                    if cell.is_empty() {
                        return Ok(0.0);
                    }
                    cell.parse::<f32>().map_err(|_| {
                        ViewerError::Parse(format!(
                            "non-numeric value '{cell}' at row {}, column {}",
                            row_idx + 1,
                            col_idx + 1
                        ))
                    })
                })
                .collect::<Result<Vec<f32>, ViewerError>>()?;
            rows.push(row);
        }
        if rows.is_empty() {
            return Err(ViewerError::parse("file contains no numeric rows"));
        }

        let mut sample_rate = self.default_sample_rate;
        let time_col = headers
            .iter()
            .position(|h| h.to_ascii_uppercase().contains("TIME"));
        if let Some(col) = time_col {
            let times: Vec<f32> = rows.iter().map(|r| r.get(col).copied().unwrap_or(0.0)).collect();
            if let Some(rate) = estimate_rate_from_times(&times) {
                debug!("estimated {rate} Hz from column {}", headers[col]);
                sample_rate = rate;
            }
            headers.remove(col);
            for row in rows.iter_mut() {
                if col < row.len() {
                    row.remove(col);
                }
            }
        }
        SampleMatrix::load(&rows, &headers, sample_rate)
    }
}

/// Median-interval rate estimate; needs more than two timestamps.
///
/// Intervals longer than two seconds (millisecond clocks, for instance) round
/// to no usable rate and yield `None`.
pub fn estimate_rate_from_times(times: &[f32]) -> Option<f32> {
    if times.len() <= 2 {
        return None;
    }
    let mut diffs: Vec<f32> = times.windows(2).map(|w| w[1] - w[0]).collect();
    diffs.sort_by(|a, b| a.total_cmp(b));
    let median = diffs[diffs.len() / 2];
    if !(median > 0.0) {
        return None;
    }
    let rate = (1.0 / median).round();
    (rate >= 1.0).then_some(rate)
}

/// NumPy `.npy` array, 1-D to 3-D. Element types `f4`, `f8`, `i4` and `i2`
/// are accepted and widened or narrowed to `f32`.
pub struct NpySource {
    bytes: Vec<u8>,
    sample_rate: f32,
    max_channels: usize,
}

impl NpySource {
    pub fn new(bytes: Vec<u8>, sample_rate: f32, max_channels: usize) -> Self {
        Self {
            bytes,
            sample_rate,
            max_channels,
        }
    }

    fn read_array(&self) -> Result<ArrayD<f32>, ViewerError> {
        let bytes = self.bytes.as_slice();
        if let Some(array) = read_as::<f32>(bytes, |v| v)? {
            return Ok(array);
        }
        if let Some(array) = read_as::<f64>(bytes, |v| v as f32)? {
            return Ok(array);
        }
        if let Some(array) = read_as::<i32>(bytes, |v| v as f32)? {
            return Ok(array);
        }
        if let Some(array) = read_as::<i16>(bytes, |v| v as f32)? {
            return Ok(array);
        }
        Err(ViewerError::parse(
            "unsupported .npy dtype, expected float32, float64, int32 or int16",
        ))
    }
}

/// `None` when the file holds a different element type.
fn read_as<T: ReadableElement + Copy>(
    bytes: &[u8],
    cast: fn(T) -> f32,
) -> Result<Option<ArrayD<f32>>, ViewerError> {
    match ArrayD::<T>::read_npy(bytes) {
        Ok(array) => Ok(Some(array.mapv(cast))),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(e) => Err(ViewerError::Parse(format!("invalid .npy file: {e}"))),
    }
}

impl MatrixSource for NpySource {
    fn read_matrix(&mut self) -> Result<SampleMatrix, ViewerError> {
        let array = self.read_array()?;
        let shape = array.shape().to_vec();
        let array = match array.ndim() {
            1 => array.insert_axis(Axis(0)).insert_axis(Axis(0)),
            2 => array.insert_axis(Axis(0)),
            3 => array,
            _ => {
                return Err(ViewerError::Parse(format!(
                    "expected a 1-D to 3-D array, got shape {shape:?}"
                )))
            }
        };
        let array = array
            .into_dimensionality::<Ix3>()
            .map_err(|e| ViewerError::Parse(e.to_string()))?;
        let (trials, channels, samples) = array.dim();
        if array.is_empty() {
            return Err(ViewerError::parse(".npy array is empty"));
        }

        let kept = channels.min(self.max_channels);
        if kept < channels {
            warn!("keeping {kept} of {channels} channels");
        }
        // Trials are concatenated per channel.
        let mut data = vec![Vec::with_capacity(trials * samples); kept];
        for trial in array.outer_iter() {
            for (column, series) in data.iter_mut().zip(trial.outer_iter()) {
                column.extend(series.iter().copied());
            }
        }

        let descriptors = (0..kept)
            .map(|idx| match EEG_10_20.channels.get(idx) {
                Some(c) => Channel {
                    id: c.id.to_owned(),
                    name: c.display.to_owned(),
                    color: c.color,
                    active: idx < 2,
                },
                None => {
                    let mut ch = Channel::new(&format!("CH{}", idx + 1), palette_color(idx));
                    ch.active = idx < 2;
                    ch
                }
            })
            .collect();
        let matrix = SampleMatrix::from_channels(descriptors, data, self.sample_rate)?;
        info!(
            "npy {shape:?} -> {} channels x {} samples",
            matrix.channel_count(),
            matrix.len()
        );
        Ok(if trials > 1 {
            matrix.with_trial_length(samples)
        } else {
            matrix
        })
    }
}

/// Demo montage: `0.5 sin(2πft) + 0.3 sin(4πft) + 0.1 noise` per electrode.
pub struct SyntheticSource {
    pub duration_seconds: f32,
    pub sample_rate: f32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self {
            duration_seconds: 60.0,
            sample_rate: 250.0,
        }
    }
}

fn base_frequency(id: &str) -> f32 {
    match id {
        "FP1" => 8.0,
        "FP2" => 12.0,
        "F3" => 4.0,
        "F4" => 2.0,
        _ => 10.0,
    }
}

impl MatrixSource for SyntheticSource {
    fn read_matrix(&mut self) -> Result<SampleMatrix, ViewerError> {
        if !(self.sample_rate > 0.0) {
            return Err(ViewerError::InvalidSampleRate);
        }
        let len = (self.duration_seconds * self.sample_rate).round() as usize;
        let mut rng = rand::thread_rng();
        let mut channels = Vec::with_capacity(EEG_10_20.channels.len());
        let mut data = Vec::with_capacity(EEG_10_20.channels.len());
        for (idx, canonical) in EEG_10_20.channels.iter().enumerate() {
            let f = base_frequency(canonical.id);
            let column = (0..len)
                .map(|i| {
                    let t = i as f32 / self.sample_rate;
                    0.5 * (2.0 * PI * f * t).sin()
                        + 0.3 * (4.0 * PI * f * t).sin()
                        + 0.1 * rng.gen_range(-1.0f32..1.0)
                })
                .collect();
            channels.push(Channel {
                id: canonical.id.to_owned(),
                name: canonical.display.to_owned(),
                color: canonical.color,
                active: idx < 2,
            });
            data.push(column);
        }
        SampleMatrix::from_channels(channels, data, self.sample_rate)
    }
}
