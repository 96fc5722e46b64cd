//! Nearest-neighbour decimation. No anti-alias filter is applied: the point is
//! to make aliasing visible, not to prevent it.

use log::{debug, info};
use ndarray::{s, Array2};
use serde::Serialize;

use crate::signal::fft::SpectrumBuilder;
use crate::signal::matrix::SampleMatrix;
use crate::signal::ViewerError;

/// Rate below which a decimated signal is flagged as likely to alias.
pub const DEFAULT_RISK_THRESHOLD_HZ: f32 = 64.0;

const SPECTRUM_CAP: usize = 4096;

pub fn nyquist(sample_rate_hz: f32) -> f32 {
    sample_rate_hz / 2.0
}

/// Resulting rate for a factor, `floor(rate / factor)`.
pub fn effective_rate(sample_rate_hz: f32, factor: usize) -> f32 {
    (sample_rate_hz / factor.max(1) as f32).floor()
}

/// Parameters of one decimation request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DecimationState {
    pub factor: usize,
    pub original_rate_hz: f32,
    pub target_rate_hz: f32,
    pub nyquist_hz: f32,
    pub risky: bool,
}

/// Heuristic frequency content of a channel compared with a new Nyquist limit.
///
/// Both frequencies are estimates; neither is a precision guarantee.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AliasingReport {
    pub channel: String,
    pub peak_frequency_hz: Option<f32>,
    pub zero_crossing_frequency_hz: f32,
    pub nyquist_hz: f32,
    pub exceeds_nyquist: bool,
}

#[derive(Clone, Debug)]
pub struct Decimator {
    risk_threshold_hz: f32,
}

impl Default for Decimator {
    fn default() -> Self {
        Self::new(DEFAULT_RISK_THRESHOLD_HZ)
    }
}

impl Decimator {
    pub fn new(risk_threshold_hz: f32) -> Self {
        Self { risk_threshold_hz }
    }

    /// Fixed-cutoff aliasing warning, not a spectral estimate.
    pub fn is_risky(&self, effective_rate_hz: f32) -> bool {
        effective_rate_hz < self.risk_threshold_hz
    }

    pub fn plan(&self, sample_rate_hz: f32, factor: usize) -> Result<DecimationState, ViewerError> {
        if factor == 0 {
            return Err(ViewerError::validation("decimation factor must be at least 1"));
        }
        let target = effective_rate(sample_rate_hz, factor);
        if target <= 0.0 {
            return Err(ViewerError::Validation(format!(
                "factor {factor} leaves no samples per second at {sample_rate_hz} Hz"
            )));
        }
        Ok(DecimationState {
            factor,
            original_rate_hz: sample_rate_hz,
            target_rate_hz: target,
            nyquist_hz: nyquist(target),
            risky: self.is_risky(target),
        })
    }

    /// Keeps every `factor`-th sample of every channel. The input is untouched.
    pub fn decimate(&self, matrix: &SampleMatrix, factor: usize) -> Result<SampleMatrix, ViewerError> {
        let state = self.plan(matrix.sample_rate_hz(), factor)?;
        if factor == 1 {
            return Ok(matrix.clone());
        }
        let reduced: Array2<f32> = matrix.data().slice(s![.., ..;factor]).to_owned();
        debug!(
            "decimated {} -> {} samples per channel",
            matrix.len(),
            reduced.ncols()
        );
        info!(
            "decimation x{factor}: {} Hz -> {} Hz (nyquist {} Hz{})",
            state.original_rate_hz,
            state.target_rate_hz,
            state.nyquist_hz,
            if state.risky { ", aliasing risk" } else { "" }
        );
        let mut out = SampleMatrix::from_array(matrix.channels().to_vec(), reduced, state.target_rate_hz);
        if let Some(trial) = matrix.trial_length() {
            out = out.with_trial_length(trial.div_ceil(factor));
        }
        Ok(out)
    }

    /// Smallest factor whose effective rate does not exceed `target_rate_hz`.
    pub fn factor_for_rate(&self, sample_rate_hz: f32, target_rate_hz: f32) -> Result<usize, ViewerError> {
        if !(target_rate_hz > 0.0) {
            return Err(ViewerError::InvalidSampleRate);
        }
        if target_rate_hz >= sample_rate_hz {
            return Ok(1);
        }
        Ok((sample_rate_hz / target_rate_hz).ceil() as usize)
    }

    pub fn decimate_to_rate(&self, matrix: &SampleMatrix, target_rate_hz: f32) -> Result<SampleMatrix, ViewerError> {
        let factor = self.factor_for_rate(matrix.sample_rate_hz(), target_rate_hz)?;
        self.decimate(matrix, factor)
    }

    /// Estimates the source content of each channel against the Nyquist limit
    /// the decimation would produce.
    pub fn aliasing_report(&self, matrix: &SampleMatrix, factor: usize) -> Result<Vec<AliasingReport>, ViewerError> {
        let state = self.plan(matrix.sample_rate_hz(), factor)?;
        let builder = SpectrumBuilder::fitting(matrix.len(), SPECTRUM_CAP);
        let reports = (0..matrix.channel_count())
            .filter_map(|idx| {
                let samples = matrix.samples(idx)?;
                let spectrum = builder.compute_channel(matrix, idx)?;
                let peak = spectrum.peak_frequency();
                let crossings = zero_crossing_frequency(samples.as_slice()?, matrix.sample_rate_hz());
                let highest = peak.unwrap_or(0.0).max(crossings);
                Some(AliasingReport {
                    channel: spectrum.channel_label,
                    peak_frequency_hz: peak,
                    zero_crossing_frequency_hz: crossings,
                    nyquist_hz: state.nyquist_hz,
                    exceeds_nyquist: highest > state.nyquist_hz,
                })
            })
            .collect();
        Ok(reports)
    }
}

/// Fundamental estimate from sign changes: `crossings / (2 * duration)`.
pub fn zero_crossing_frequency(samples: &[f32], sample_rate_hz: f32) -> f32 {
    if samples.len() < 2 || sample_rate_hz <= 0.0 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] <= 0.0 && w[1] > 0.0) || (w[0] >= 0.0 && w[1] < 0.0))
        .count();
    let duration = samples.len() as f32 / sample_rate_hz;
    crossings as f32 / (2.0 * duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize, rate: f32) -> SampleMatrix {
        let rows: Vec<Vec<f32>> = (0..len).map(|i| vec![i as f32, (i * 2) as f32]).collect();
        SampleMatrix::load(&rows, &["a".into(), "b".into()], rate).unwrap()
    }

    #[test]
    fn length_and_rate_follow_factor() {
        let m = ramp(1001, 250.0);
        let d = Decimator::default();
        for f in 1..=7 {
            let out = d.decimate(&m, f).unwrap();
            assert_eq!(out.len(), 1001usize.div_ceil(f));
            assert_eq!(out.sample_rate_hz(), (250.0f32 / f as f32).floor());
            assert_eq!(out.channel_count(), 2);
        }
    }

    #[test]
    fn keeps_every_nth_sample() {
        let m = ramp(10, 100.0);
        let out = Decimator::default().decimate(&m, 3).unwrap();
        assert_eq!(out.get_window("a", 0, 10).unwrap().to_vec(), vec![0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn factor_one_is_identity_and_original_survives() {
        let m = ramp(50, 250.0);
        let d = Decimator::default();
        let same = d.decimate(&m, 1).unwrap();
        assert_eq!(same.data(), m.data());
        assert_eq!(same.sample_rate_hz(), 250.0);

        let reduced = d.decimate(&m, 5).unwrap();
        assert_eq!(reduced.len(), 10);
        assert_eq!(m.len(), 50);
        assert_eq!(m.sample_rate_hz(), 250.0);
    }

    #[test]
    fn fifty_hertz_is_risky() {
        let d = Decimator::default();
        let state = d.plan(250.0, 5).unwrap();
        assert_eq!(state.target_rate_hz, 50.0);
        assert_eq!(state.nyquist_hz, 25.0);
        assert!(state.risky);
        assert!(!d.is_risky(125.0));
        assert_eq!(nyquist(250.0), 125.0);
    }

    #[test]
    fn invalid_factors_are_rejected() {
        let m = ramp(10, 4.0);
        let d = Decimator::default();
        assert!(matches!(d.decimate(&m, 0), Err(ViewerError::Validation(_))));
        assert!(matches!(d.decimate(&m, 5), Err(ViewerError::Validation(_))));
    }

    #[test]
    fn target_rate_maps_to_factor() {
        let d = Decimator::default();
        assert_eq!(d.factor_for_rate(250.0, 50.0).unwrap(), 5);
        assert_eq!(d.factor_for_rate(250.0, 60.0).unwrap(), 5);
        assert_eq!(d.factor_for_rate(250.0, 500.0).unwrap(), 1);
        assert!(d.factor_for_rate(250.0, 0.0).is_err());
    }

    #[test]
    fn zero_crossings_estimate_sine() {
        let rate = 250.0;
        let sine: Vec<f32> = (0..2500)
            .map(|i| (2.0 * std::f32::consts::PI * 10.0 * i as f32 / rate + 0.3).sin())
            .collect();
        let f = zero_crossing_frequency(&sine, rate);
        assert!((f - 10.0).abs() < 0.5, "{f}");
    }

    #[test]
    fn report_flags_content_above_new_nyquist() {
        let rate = 256.0;
        let rows: Vec<Vec<f32>> = (0..1024)
            .map(|i| vec![(2.0 * std::f32::consts::PI * 40.0 * i as f32 / rate).sin()])
            .collect();
        let m = SampleMatrix::load(&rows, &["tone".into()], rate).unwrap();
        let d = Decimator::default();
        let risky = d.aliasing_report(&m, 4).unwrap();
        assert_eq!(risky.len(), 1);
        assert!(risky[0].exceeds_nyquist);
        assert!((risky[0].peak_frequency_hz.unwrap() - 40.0).abs() < 0.5);
        let safe = d.aliasing_report(&m, 2).unwrap();
        assert!(!safe[0].exceeds_nyquist);
    }
}
