use log::{debug, info};
use ndarray::{s, Array2, ArrayView1};

use crate::signal::color::{palette_color, Color};
use crate::signal::leads::{self, CanonicalSet};
use crate::signal::ViewerError;

/// Number of channels switched on right after a load.
const INITIALLY_ACTIVE: usize = 2;

/// Descriptor for one named scalar series.
#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    /// Case-normalized identifier, unique within a matrix.
    pub id: String,
    pub name: String,
    pub color: Color,
    pub active: bool,
}

impl Channel {
    pub fn new(name: &str, color: Color) -> Self {
        Self {
            id: leads::normalize_name(name),
            name: name.trim().to_owned(),
            color,
            active: false,
        }
    }
}

/// Multi-channel time series sharing one sample rate (channels x samples).
///
/// Immutable after load apart from the per-channel `active` flag. Decimation
/// produces a new matrix instead of editing this one.
#[derive(Clone, Debug)]
pub struct SampleMatrix {
    channels: Vec<Channel>,
    samples: Array2<f32>,
    sample_rate_hz: f32,
    max_abs: Vec<f32>,
    trial_length: Option<usize>,
}

impl SampleMatrix {
    /// Builds a matrix from row-major sample tuples (one row per instant).
    ///
    /// Column names are case-normalized; if they overlap a canonical lead or
    /// electrode set the columns are reordered into that set and missing
    /// channels are zero-filled. Short rows are zero-padded.
    pub fn load(
        rows: &[Vec<f32>],
        column_names: &[String],
        sample_rate_hz: f32,
    ) -> Result<Self, ViewerError> {
        if rows.is_empty() {
            return Err(ViewerError::parse("matrix has no rows"));
        }
        let width = if column_names.is_empty() {
            rows[0].len()
        } else {
            column_names.len()
        };
        if width == 0 {
            return Err(ViewerError::parse("matrix has no columns"));
        }
        let mut columns = vec![Vec::with_capacity(rows.len()); width];
        for (row_idx, row) in rows.iter().enumerate() {
            if row.len() > width {
                return Err(ViewerError::Parse(format!(
                    "row {row_idx} has {} values, expected at most {width}",
                    row.len()
                )));
            }
            for (col_idx, column) in columns.iter_mut().enumerate() {
                let value = row.get(col_idx).copied().unwrap_or(0.0);
                if !value.is_finite() {
                    return Err(ViewerError::Parse(format!(
                        "non-numeric value at row {row_idx}, column {col_idx}"
                    )));
                }
                column.push(value);
            }
        }
        let names: Vec<String> = (0..width)
            .map(|idx| match column_names.get(idx) {
                Some(name) if !name.trim().is_empty() => name.trim().to_owned(),
                _ => format!("CH{}", idx + 1),
            })
            .collect();
        let normalized: Vec<String> = names.iter().map(|n| leads::normalize_name(n)).collect();

        let (channels, data) = match leads::best_match(&normalized) {
            Some(set) => {
                debug!("columns match canonical set {}", set.name);
                reorder_canonical(set, &normalized, columns)
            }
            None => {
                let channels = names
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| Channel::new(name, palette_color(idx)))
                    .collect();
                (channels, columns)
            }
        };
        let mut matrix = Self::from_channels(channels, data, sample_rate_hz)?;
        matrix.activate_defaults();
        info!(
            "loaded {} channels x {} samples @ {} Hz",
            matrix.channel_count(),
            matrix.len(),
            matrix.sample_rate_hz
        );
        Ok(matrix)
    }

    /// Builds a matrix from per-channel sequences. Shorter channels are
    /// zero-padded to the longest one.
    pub fn from_channels(
        channels: Vec<Channel>,
        data: Vec<Vec<f32>>,
        sample_rate_hz: f32,
    ) -> Result<Self, ViewerError> {
        if !(sample_rate_hz > 0.0) || !sample_rate_hz.is_finite() {
            return Err(ViewerError::InvalidSampleRate);
        }
        if channels.is_empty() {
            return Err(ViewerError::parse("matrix has no columns"));
        }
        if channels.len() != data.len() {
            return Err(ViewerError::Parse(format!(
                "{} channel descriptors for {} data columns",
                channels.len(),
                data.len()
            )));
        }
        let len = data.iter().map(Vec::len).max().unwrap_or(0);
        if len == 0 {
            return Err(ViewerError::parse("matrix has no rows"));
        }
        let mut flat = Vec::with_capacity(len * data.len());
        for column in &data {
            if column.iter().any(|v| !v.is_finite()) {
                return Err(ViewerError::parse("matrix contains non-numeric values"));
            }
            flat.extend_from_slice(column);
            flat.resize(flat.len() + (len - column.len()), 0.0);
        }
        let samples = Array2::from_shape_vec((data.len(), len), flat)
            .map_err(|e| ViewerError::Parse(e.to_string()))?;
        Ok(Self::from_array(channels, samples, sample_rate_hz))
    }

    /// Wraps an already-shaped array; the amplitude cache is recomputed here.
    pub(crate) fn from_array(channels: Vec<Channel>, samples: Array2<f32>, sample_rate_hz: f32) -> Self {
        let max_abs = samples
            .rows()
            .into_iter()
            .map(|row| row.iter().fold(0.0f32, |acc, v| acc.max(v.abs())))
            .collect();
        Self {
            channels,
            samples,
            sample_rate_hz,
            max_abs,
            trial_length: None,
        }
    }

    pub fn with_trial_length(mut self, trial_length: usize) -> Self {
        if trial_length > 0 && trial_length < self.len() {
            self.trial_length = Some(trial_length);
        }
        self
    }

    fn activate_defaults(&mut self) {
        for (idx, channel) in self.channels.iter_mut().enumerate() {
            channel.active = idx < INITIALLY_ACTIVE;
        }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Looks a channel up by id; the lookup is case and whitespace insensitive.
    pub fn channel_index(&self, channel_id: &str) -> Option<usize> {
        let wanted = leads::normalize_name(channel_id);
        self.channels.iter().position(|c| c.id == wanted)
    }

    /// Samples per channel (identical for every channel).
    pub fn len(&self) -> usize {
        self.samples.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    pub fn duration_seconds(&self) -> f32 {
        self.len() as f32 / self.sample_rate_hz
    }

    pub fn trial_length(&self) -> Option<usize> {
        self.trial_length
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.samples
    }

    pub fn samples(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.channel_count()).then(|| self.samples.row(index))
    }

    /// Samples `[start, end)` of a channel, clamped into `[0, len]`.
    pub fn get_window(
        &self,
        channel_id: &str,
        start_sample: usize,
        end_sample: usize,
    ) -> Result<ArrayView1<'_, f32>, ViewerError> {
        let index = self
            .channel_index(channel_id)
            .ok_or_else(|| ViewerError::Range(format!("unknown channel {channel_id}")))?;
        Ok(self.window_at(index, start_sample, end_sample))
    }

    pub(crate) fn window_at(&self, index: usize, start_sample: usize, end_sample: usize) -> ArrayView1<'_, f32> {
        let len = self.len();
        let end = end_sample.min(len);
        let start = start_sample.min(end);
        self.samples.slice(s![index, start..end])
    }

    /// Cached absolute maximum, never below 1 so normalization cannot divide by zero.
    pub fn max_amplitude(&self, channel_id: &str) -> Result<f32, ViewerError> {
        self.channel_index(channel_id)
            .map(|idx| self.max_amplitude_at(idx))
            .ok_or_else(|| ViewerError::Range(format!("unknown channel {channel_id}")))
    }

    pub fn max_amplitude_at(&self, index: usize) -> f32 {
        self.max_abs.get(index).copied().unwrap_or(0.0).max(1.0)
    }

    pub(crate) fn set_active(&mut self, index: usize, active: bool) {
        if let Some(channel) = self.channels.get_mut(index) {
            channel.active = active;
        }
    }
}

fn reorder_canonical(
    set: &CanonicalSet,
    normalized: &[String],
    mut columns: Vec<Vec<f32>>,
) -> (Vec<Channel>, Vec<Vec<f32>>) {
    let len = columns.first().map(Vec::len).unwrap_or(0);
    let mut channels = Vec::with_capacity(set.channels.len());
    let mut data = Vec::with_capacity(set.channels.len());
    for canonical in &set.channels {
        let column = normalized
            .iter()
            .position(|n| n == canonical.id)
            .map(|idx| std::mem::take(&mut columns[idx]))
            .unwrap_or_else(|| vec![0.0; len]);
        channels.push(Channel {
            id: canonical.id.to_owned(),
            name: canonical.display.to_owned(),
            color: canonical.color,
            active: false,
        });
        data.push(column);
    }
    (channels, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn two_channel(len: usize, rate: f32) -> SampleMatrix {
        let rows: Vec<Vec<f32>> = (0..len).map(|i| vec![i as f32, -(i as f32)]).collect();
        SampleMatrix::load(&rows, &names(&["ch1", "ch2"]), rate).unwrap()
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(
            SampleMatrix::load(&[], &names(&["a"]), 250.0),
            Err(ViewerError::Parse(_))
        ));
        assert!(matches!(
            SampleMatrix::load(&[vec![]], &[], 250.0),
            Err(ViewerError::Parse(_))
        ));
        assert!(matches!(
            SampleMatrix::load(&[vec![f32::NAN]], &names(&["a"]), 250.0),
            Err(ViewerError::Parse(_))
        ));
    }

    #[test]
    fn channels_share_length_and_duration() {
        let m = two_channel(1000, 250.0);
        assert_eq!(m.channel_count(), 2);
        for idx in 0..m.channel_count() {
            assert_eq!(m.samples(idx).unwrap().len(), 1000);
        }
        assert!((m.duration_seconds() - 4.0).abs() < 1e-6);
    }

    #[test]
    fn window_is_clamped_not_an_error() {
        let m = two_channel(1000, 250.0);
        let w = m.get_window("ch1", 900, 1100).unwrap();
        assert_eq!(w.len(), 100);
        assert_eq!(w[0], 900.0);
        assert_eq!(w[99], 999.0);
        assert_eq!(m.get_window("CH1", 2000, 3000).unwrap().len(), 0);
        assert!(matches!(m.get_window("nope", 0, 10), Err(ViewerError::Range(_))));
    }

    #[test]
    fn max_amplitude_has_floor_of_one() {
        let rows = vec![vec![0.0, 4.0], vec![0.0, -7.5]];
        let m = SampleMatrix::load(&rows, &names(&["flat", "wave"]), 100.0).unwrap();
        assert_eq!(m.max_amplitude("flat").unwrap(), 1.0);
        assert_eq!(m.max_amplitude("wave").unwrap(), 7.5);
    }

    #[test]
    fn canonical_leads_are_reordered_and_zero_filled() {
        let rows = vec![vec![1.0, 2.0, 9.0], vec![3.0, 4.0, 9.0]];
        let m = SampleMatrix::load(&rows, &names(&["v1", " ii ", "junk"]), 500.0).unwrap();
        assert_eq!(m.channel_count(), 12);
        assert_eq!(m.channels()[1].id, "II");
        assert_eq!(m.channels()[3].name, "aVR");
        assert_eq!(m.get_window("II", 0, 2).unwrap().to_vec(), vec![2.0, 4.0]);
        assert_eq!(m.get_window("V1", 0, 2).unwrap().to_vec(), vec![1.0, 3.0]);
        assert_eq!(m.get_window("I", 0, 2).unwrap().to_vec(), vec![0.0, 0.0]);
        assert!(m.channel_index("JUNK").is_none());
    }

    #[test]
    fn short_rows_are_padded_and_long_rows_rejected() {
        let rows = vec![vec![1.0, 2.0], vec![3.0]];
        let m = SampleMatrix::load(&rows, &names(&["a", "b"]), 10.0).unwrap();
        assert_eq!(m.get_window("b", 0, 2).unwrap().to_vec(), vec![2.0, 0.0]);
        let bad = vec![vec![1.0, 2.0, 3.0]];
        assert!(SampleMatrix::load(&bad, &names(&["a", "b"]), 10.0).is_err());
    }

    #[test]
    fn first_two_channels_start_active() {
        let rows = vec![vec![0.0; 4]];
        let m = SampleMatrix::load(&rows, &[], 10.0).unwrap();
        let active: Vec<bool> = m.channels().iter().map(|c| c.active).collect();
        assert_eq!(active, vec![true, true, false, false]);
        assert_eq!(m.channels()[2].id, "CH3");
    }
}
