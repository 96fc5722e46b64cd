use ndarray::ArrayView1;
use rustfft::{num_complex::Complex32, FftPlanner};

use crate::signal::matrix::SampleMatrix;

/// Magnitude spectrum for one channel.
#[derive(Clone, Debug)]
pub struct FrequencySpectrum {
    pub sample_rate_hz: f32,
    pub frequencies_hz: Vec<f32>,
    pub magnitudes: Vec<f32>,
    pub channel_label: String,
}

impl FrequencySpectrum {
    /// Frequency of the strongest non-DC bin.
    pub fn peak_frequency(&self) -> Option<f32> {
        self.magnitudes
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .filter(|(_, mag)| **mag > f32::EPSILON)
            .map(|(idx, _)| self.frequencies_hz[idx])
    }
}

/// Helper that computes FFTs for a given window size.
pub struct SpectrumBuilder {
    fft_size: usize,
}

impl SpectrumBuilder {
    pub fn with_size(fft_size: usize) -> Self {
        Self {
            fft_size: fft_size.max(2),
        }
    }

    /// Largest power of two not exceeding `len`, capped at `cap`.
    pub fn fitting(len: usize, cap: usize) -> Self {
        let mut size = 2;
        while size * 2 <= len.min(cap) {
            size *= 2;
        }
        Self::with_size(size)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn compute(&self, samples: ArrayView1<'_, f32>, sample_rate_hz: f32, label: &str) -> FrequencySpectrum {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(self.fft_size);
        let frequencies = (0..self.fft_size / 2)
            .map(|k| k as f32 * (sample_rate_hz / self.fft_size as f32))
            .collect();

        // Mean removed so DC does not dominate short windows.
        let mean = if samples.is_empty() {
            0.0
        } else {
            samples.sum() / samples.len() as f32
        };
        let mut buffer: Vec<Complex32> = samples
            .iter()
            .take(self.fft_size)
            .map(|v| Complex32::new(v - mean, 0.0))
            .collect();
        buffer.resize(self.fft_size, Complex32::ZERO);
        fft.process(&mut buffer);
        let magnitudes = buffer
            .iter()
            .take(self.fft_size / 2)
            .map(|c| c.norm() / self.fft_size as f32)
            .collect();

        FrequencySpectrum {
            sample_rate_hz,
            frequencies_hz: frequencies,
            magnitudes,
            channel_label: label.to_owned(),
        }
    }

    pub fn compute_channel(&self, matrix: &SampleMatrix, index: usize) -> Option<FrequencySpectrum> {
        let channel = matrix.channel(index)?;
        let samples = matrix.samples(index)?;
        Some(self.compute(samples, matrix.sample_rate_hz(), &channel.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn finds_sine_peak() {
        let rate = 256.0;
        let signal: Array1<f32> = (0..256)
            .map(|i| (2.0 * std::f32::consts::PI * 32.0 * i as f32 / rate).sin())
            .collect();
        let spectrum = SpectrumBuilder::with_size(256).compute(signal.view(), rate, "x");
        assert_eq!(spectrum.frequencies_hz.len(), 128);
        assert!((spectrum.peak_frequency().unwrap() - 32.0).abs() < 1e-3);
    }

    #[test]
    fn flat_signal_has_no_peak() {
        let signal = Array1::<f32>::from_elem(64, 3.0);
        let spectrum = SpectrumBuilder::with_size(64).compute(signal.view(), 100.0, "flat");
        assert!(spectrum.peak_frequency().is_none());
    }

    #[test]
    fn fitting_size_is_power_of_two() {
        assert_eq!(SpectrumBuilder::fitting(1000, 4096).fft_size(), 512);
        assert_eq!(SpectrumBuilder::fitting(10_000, 4096).fft_size(), 4096);
        assert_eq!(SpectrumBuilder::fitting(1, 4096).fft_size(), 2);
    }
}
