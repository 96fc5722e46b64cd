use std::io::{Cursor, Seek, Write};
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;
use serde::Serialize;

use crate::signal::decimate::DecimationState;
use crate::signal::matrix::SampleMatrix;
use crate::signal::ViewerError;

#[derive(Debug, Serialize)]
pub struct ChannelExport<'a> {
    pub name: &'a str,
    pub data: Vec<f32>,
}

/// JSON document describing a decimated matrix.
#[derive(Debug, Serialize)]
pub struct DecimationExport<'a> {
    pub original_sample_rate: f32,
    pub downsampled_sample_rate: f32,
    pub downsample_factor: usize,
    pub nyquist_frequency: f32,
    pub aliasing_risk: bool,
    pub channels: Vec<ChannelExport<'a>>,
}

/// One channel as a bare JSON array of numbers.
pub fn channel_json(matrix: &SampleMatrix, channel_id: &str) -> Result<String, ViewerError> {
    let window = matrix.get_window(channel_id, 0, matrix.len())?;
    Ok(serde_json::to_string(&window.to_vec())?)
}

fn channel_exports(matrix: &SampleMatrix) -> Vec<ChannelExport<'_>> {
    matrix
        .channels()
        .iter()
        .enumerate()
        .map(|(idx, channel)| ChannelExport {
            name: &channel.name,
            data: matrix.samples(idx).map(|s| s.to_vec()).unwrap_or_default(),
        })
        .collect()
}

pub fn matrix_json(matrix: &SampleMatrix) -> Result<String, ViewerError> {
    Ok(serde_json::to_string(&channel_exports(matrix))?)
}

pub fn decimation_json(matrix: &SampleMatrix, state: &DecimationState) -> Result<String, ViewerError> {
    let doc = DecimationExport {
        original_sample_rate: state.original_rate_hz,
        downsampled_sample_rate: state.target_rate_hz,
        downsample_factor: state.factor,
        nyquist_frequency: state.nyquist_hz,
        aliasing_risk: state.risky,
        channels: channel_exports(matrix),
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

fn write_wav<W: Write + Seek>(
    writer: W,
    matrix: &SampleMatrix,
    channel_ids: &[&str],
) -> Result<(), ViewerError> {
    if channel_ids.is_empty() {
        return Err(ViewerError::Export("no channels selected for export".into()));
    }
    let indices = channel_ids
        .iter()
        .map(|id| {
            matrix
                .channel_index(id)
                .ok_or_else(|| ViewerError::Export(format!("unknown channel {id}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let spec = WavSpec {
        channels: indices.len() as u16,
        sample_rate: matrix.sample_rate_hz().round() as u32,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut wav = WavWriter::new(writer, spec)?;
    let scales: Vec<f32> = indices.iter().map(|&i| matrix.max_amplitude_at(i)).collect();
    for n in 0..matrix.len() {
        for (&idx, scale) in indices.iter().zip(&scales) {
            wav.write_sample(to_pcm16(matrix.data()[[idx, n]] / scale))?;
        }
    }
    wav.finalize()?;
    Ok(())
}

/// 16-bit PCM WAV with the given channels interleaved, each normalized by
/// its max amplitude.
///
/// One or two channels give the canonical 44-byte header. Three or more are
/// written as WAVE_FORMAT_EXTENSIBLE, whose header is longer.
pub fn wav_bytes(matrix: &SampleMatrix, channel_ids: &[&str]) -> Result<Vec<u8>, ViewerError> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, matrix, channel_ids)?;
    Ok(cursor.into_inner())
}

pub fn save_wav(path: &Path, matrix: &SampleMatrix, channel_ids: &[&str]) -> Result<(), ViewerError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    write_wav(file, matrix, channel_ids)?;
    info!("wrote {} channel(s) to {}", channel_ids.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::decimate::Decimator;

    fn matrix() -> SampleMatrix {
        let rows = vec![vec![0.0, 2.0], vec![4.0, -2.0], vec![-4.0, 0.0]];
        SampleMatrix::load(&rows, &["a".into(), "b".into()], 8000.0).unwrap()
    }

    #[test]
    fn channel_json_is_a_number_array() {
        let json = channel_json(&matrix(), "a").unwrap();
        let parsed: Vec<f32> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![0.0, 4.0, -4.0]);
        assert!(channel_json(&matrix(), "zz").is_err());
    }

    #[test]
    fn decimation_json_carries_rates() {
        let d = Decimator::default();
        let state = d.plan(8000.0, 2).unwrap();
        let reduced = d.decimate(&matrix(), 2).unwrap();
        let json = decimation_json(&reduced, &state).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["downsampled_sample_rate"], 4000.0);
        assert_eq!(value["nyquist_frequency"], 2000.0);
        assert_eq!(value["channels"][1]["data"], serde_json::json!([2.0, 0.0]));
    }

    #[test]
    fn wav_has_canonical_header() {
        let bytes = wav_bytes(&matrix(), &["a", "b"]).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(&bytes[36..40], b"data");
        assert_eq!(bytes.len(), 44 + 3 * 2 * 2);
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 2);
        assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 8000);
        // a[1] = 4 / 4 -> full scale positive
        assert_eq!(i16::from_le_bytes([bytes[48], bytes[49]]), i16::MAX);
        // a[2] = -1 -> full scale negative
        assert_eq!(i16::from_le_bytes([bytes[52], bytes[53]]), i16::MIN);
    }

    #[test]
    fn wav_with_three_channels_uses_extensible_header() {
        let rows = vec![vec![1.0, 2.0, 3.0], vec![-1.0, -2.0, -3.0]];
        let m = SampleMatrix::load(&rows, &["x".into(), "y".into(), "z".into()], 1000.0).unwrap();
        let bytes = wav_bytes(&m, &["X", "Y", "Z"]).unwrap();
        let data_len = 2 * 3 * 2;
        assert!(bytes.len() > 44 + data_len);
        let reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.spec().channels, 3);
        assert_eq!(reader.len() as usize, 2 * 3);
    }

    #[test]
    fn wav_file_round_trips_through_hound() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        save_wav(&path, &matrix(), &["b"]).unwrap();
        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.len(), 3);
        assert!(wav_bytes(&matrix(), &[]).is_err());
    }
}
