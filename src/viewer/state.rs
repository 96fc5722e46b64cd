//! The single owner of viewer state.
//!
//! Everything the interaction handlers touch lives here and is handed to the
//! renderers by reference. The host calls into it from one thread only.

use std::path::Path;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::ViewerConfig;
use crate::signal::decimate::{AliasingReport, DecimationState, Decimator};
use crate::signal::export;
use crate::signal::fft::{FrequencySpectrum, SpectrumBuilder};
use crate::signal::matrix::SampleMatrix;
use crate::signal::ViewerError;
use crate::viewer::render::{
    placeholder, Colormap, DrawCommand, PolarMode, RecurrenceMode, RenderContext, Renderer,
    RendererSet, Surface,
};
use crate::viewer::selection::{ChannelSelectionModel, ViewMode};
use crate::viewer::snapshot;
use crate::viewer::viewport::{FrameToken, RenderThrottle, ViewportController};

const SPECTRUM_CAP: usize = 4096;

/// A loaded matrix and everything derived from it.
struct Session {
    matrix: SampleMatrix,
    /// Kept while a decimated copy is on screen.
    original: Option<SampleMatrix>,
    decimation: Option<DecimationState>,
    selection: ChannelSelectionModel,
}

pub struct ViewerState {
    config: ViewerConfig,
    decimator: Decimator,
    viewport: ViewportController,
    renderers: RendererSet,
    throttle: RenderThrottle,
    surface: Surface,
    session: Option<Session>,
}

impl ViewerState {
    pub fn new(config: ViewerConfig) -> Result<Self, ViewerError> {
        config.validate()?;
        let viewport = ViewportController::new(
            config.viewport.duration_seconds,
            config.viewport.zoom,
            config.viewport.speed,
        )?;
        Ok(Self {
            decimator: Decimator::new(config.decimation.risk_threshold_hz),
            throttle: RenderThrottle::new(Duration::from_millis(config.render_throttle_ms)),
            surface: Surface::new(config.surface.width, config.surface.height),
            viewport,
            renderers: RendererSet::default(),
            session: None,
            config,
        })
    }

    /// Replaces whatever was loaded. Playback is reset and any decimation
    /// is discarded.
    pub fn load(&mut self, matrix: SampleMatrix) -> Result<(), ViewerError> {
        if matrix.is_empty() || matrix.channel_count() == 0 {
            return Err(ViewerError::parse("matrix has no samples"));
        }
        self.viewport.reset();
        self.viewport.set_data(matrix.len(), matrix.sample_rate_hz())?;
        let mode = self.session.as_ref().map(|s| s.selection.mode());
        let mut selection = ChannelSelectionModel::from_matrix(&matrix);
        if let Some(mode) = mode {
            if selection.set_mode(mode).is_err() {
                warn!("{mode} view needs more channels, staying in standard view");
            }
        }
        let mut matrix = matrix;
        selection.apply_to(&mut matrix);
        info!(
            "loaded {} channels x {} samples at {} Hz ({:.1}s)",
            matrix.channel_count(),
            matrix.len(),
            matrix.sample_rate_hz(),
            matrix.duration_seconds()
        );
        self.renderers.reset();
        self.session = Some(Session {
            matrix,
            original: None,
            decimation: None,
            selection,
        });
        Ok(())
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn matrix(&self) -> Option<&SampleMatrix> {
        self.session.as_ref().map(|s| &s.matrix)
    }

    /// The undecimated matrix, whether or not a decimated copy is active.
    pub fn original(&self) -> Option<&SampleMatrix> {
        self.session
            .as_ref()
            .map(|s| s.original.as_ref().unwrap_or(&s.matrix))
    }

    pub fn decimation(&self) -> Option<&DecimationState> {
        self.session.as_ref().and_then(|s| s.decimation.as_ref())
    }

    pub fn decimator(&self) -> &Decimator {
        &self.decimator
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut ViewportController {
        &mut self.viewport
    }

    pub fn selection(&self) -> Option<&ChannelSelectionModel> {
        self.session.as_ref().map(|s| &s.selection)
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn set_surface(&mut self, surface: Surface) {
        self.surface = surface;
    }

    fn session_mut(&mut self) -> Result<&mut Session, ViewerError> {
        self.session
            .as_mut()
            .ok_or_else(|| ViewerError::validation("no data loaded"))
    }

    pub fn set_mode(&mut self, mode: ViewMode) -> Result<(), ViewerError> {
        let session = self.session_mut()?;
        let before = session.selection.mode();
        session.selection.set_mode(mode)?;
        session.selection.apply_to(&mut session.matrix);
        if before != mode {
            self.renderers.recurrence.reset();
        }
        Ok(())
    }

    pub fn toggle_channel(&mut self, channel_id: &str, active: bool) -> Result<(), ViewerError> {
        let session = self.session_mut()?;
        session.selection.toggle(channel_id, active)?;
        session.selection.apply_to(&mut session.matrix);
        Ok(())
    }

    pub fn set_focus(&mut self, channel_id: &str) -> Result<(), ViewerError> {
        let session = self.session_mut()?;
        session.selection.set_focus(channel_id)?;
        session.selection.apply_to(&mut session.matrix);
        Ok(())
    }

    pub fn set_pair(&mut self, first: &str, second: &str) -> Result<(), ViewerError> {
        let session = self.session_mut()?;
        session.selection.set_pair(first, second)?;
        session.selection.apply_to(&mut session.matrix);
        Ok(())
    }

    pub fn set_recurrence_mode(&mut self, mode: RecurrenceMode) {
        if self.config.render.recurrence_mode != mode {
            self.config.render.recurrence_mode = mode;
            self.renderers.recurrence.reset();
        }
    }

    pub fn set_polar_mode(&mut self, mode: PolarMode) {
        self.config.render.polar_mode = mode;
    }

    pub fn set_colormap(&mut self, colormap: Colormap) {
        self.config.render.colormap = colormap;
    }

    pub fn set_heatmap_bins(&mut self, bins: usize) -> Result<(), ViewerError> {
        if bins < 2 {
            return Err(ViewerError::validation("heatmap needs at least 2 bins"));
        }
        self.config.render.heatmap_bins = bins;
        Ok(())
    }

    pub fn set_chunk_seconds(&mut self, seconds: f32) -> Result<(), ViewerError> {
        if !(seconds > 0.0) || !seconds.is_finite() {
            return Err(ViewerError::Validation(format!(
                "chunk length must be positive, got {seconds}"
            )));
        }
        self.config.render.chunk_seconds = seconds;
        Ok(())
    }

    pub fn set_polar_window(&mut self, seconds: f32) -> Result<(), ViewerError> {
        if !(seconds > 0.0) || !seconds.is_finite() {
            return Err(ViewerError::Validation(format!(
                "polar window must be positive, got {seconds}"
            )));
        }
        self.config.render.polar_time_window_seconds = seconds;
        Ok(())
    }

    /// Swaps in a decimated copy of the original. Repeated calls always start
    /// from the original, never from a previous decimation.
    pub fn decimate(&mut self, factor: usize) -> Result<DecimationState, ViewerError> {
        let decimator = self.decimator.clone();
        let session = self.session_mut()?;
        let source = session.original.as_ref().unwrap_or(&session.matrix);
        let state = decimator.plan(source.sample_rate_hz(), factor)?;
        let mut reduced = decimator.decimate(source, factor)?;
        session.selection.apply_to(&mut reduced);
        if session.original.is_none() {
            session.original = Some(std::mem::replace(&mut session.matrix, reduced));
        } else {
            session.matrix = reduced;
        }
        session.decimation = Some(state);
        let (len, rate) = (session.matrix.len(), session.matrix.sample_rate_hz());
        self.viewport.set_data(len, rate)?;
        self.renderers.reset();
        Ok(state)
    }

    pub fn decimate_to_rate(&mut self, target_rate_hz: f32) -> Result<DecimationState, ViewerError> {
        let rate = self
            .original()
            .map(SampleMatrix::sample_rate_hz)
            .ok_or_else(|| ViewerError::validation("no data loaded"))?;
        let factor = self.decimator.factor_for_rate(rate, target_rate_hz)?;
        self.decimate(factor)
    }

    /// Restores the retained original. A no-op when nothing is decimated.
    pub fn reset_decimation(&mut self) -> Result<(), ViewerError> {
        let session = self.session_mut()?;
        let Some(mut original) = session.original.take() else {
            return Ok(());
        };
        session.selection.apply_to(&mut original);
        session.matrix = original;
        session.decimation = None;
        let (len, rate) = (session.matrix.len(), session.matrix.sample_rate_hz());
        info!("restored original signal at {rate} Hz");
        self.viewport.set_data(len, rate)?;
        self.renderers.reset();
        Ok(())
    }

    pub fn aliasing_report(&self, factor: usize) -> Result<Vec<AliasingReport>, ViewerError> {
        let original = self
            .original()
            .ok_or_else(|| ViewerError::validation("no data loaded"))?;
        self.decimator.aliasing_report(original, factor)
    }

    /// Magnitude spectrum of the focus channel of the active matrix.
    pub fn focus_spectrum(&self) -> Option<FrequencySpectrum> {
        let session = self.session.as_ref()?;
        let index = session.selection.focus()?;
        SpectrumBuilder::fitting(session.matrix.len(), SPECTRUM_CAP).compute_channel(&session.matrix, index)
    }

    pub fn play(&mut self) -> Option<FrameToken> {
        self.session.as_ref()?;
        Some(self.viewport.play())
    }

    pub fn pause(&mut self) {
        self.viewport.pause();
    }

    pub fn reset_playback(&mut self) {
        self.viewport.reset();
    }

    pub fn on_animation_frame(&mut self, token: FrameToken) -> Option<FrameToken> {
        self.viewport.on_animation_frame(token)
    }

    /// One render pass. Projections that cannot be drawn come back as a
    /// placeholder message instead of an error.
    pub fn render(&mut self) -> Vec<DrawCommand> {
        let surface = self.surface;
        let Some(session) = self.session.as_ref() else {
            return placeholder(surface, "Load a file to begin");
        };
        let ctx = RenderContext {
            matrix: &session.matrix,
            viewport: &self.viewport,
            selection: &session.selection,
            config: &self.config.render,
            surface,
        };
        match self.renderers.render(&ctx) {
            Ok(commands) => commands,
            Err(ViewerError::InsufficientData(msg)) => {
                debug!("{} view: {msg}", session.selection.mode());
                placeholder(surface, &msg)
            }
            Err(e) if !e.is_user_facing() => {
                debug!("recovered render error: {e}");
                Vec::new()
            }
            Err(e) => {
                warn!("render failed: {e}");
                placeholder(surface, &e.to_string())
            }
        }
    }

    /// Scheduled renders pass through the throttle; `forced` ones (user
    /// interaction) always run.
    pub fn frame(&mut self, now: Instant, forced: bool) -> Option<Vec<DrawCommand>> {
        if !self.throttle.should_render(now, forced) {
            return None;
        }
        Some(self.render())
    }

    pub fn export_channel_json(&self, channel_id: &str) -> Result<String, ViewerError> {
        let matrix = self
            .matrix()
            .ok_or_else(|| ViewerError::Export("no data loaded".into()))?;
        export::channel_json(matrix, channel_id)
    }

    pub fn export_decimation_json(&self) -> Result<String, ViewerError> {
        let (Some(matrix), Some(state)) = (self.matrix(), self.decimation()) else {
            return Err(ViewerError::Export("no decimated signal to export".into()));
        };
        export::decimation_json(matrix, state)
    }

    /// Writes the active channels of the current matrix as WAV.
    pub fn save_wav(&self, path: &Path) -> Result<(), ViewerError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ViewerError::Export("no data loaded".into()))?;
        let ids: Vec<&str> = session
            .matrix
            .channels()
            .iter()
            .filter(|c| c.active)
            .map(|c| c.id.as_str())
            .collect();
        export::save_wav(path, &session.matrix, &ids)
    }

    pub fn save_snapshot(&mut self, path: &Path) -> Result<(), ViewerError> {
        let commands = self.render();
        snapshot::save_png(path, &commands, self.surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ingest::{MatrixSource, SyntheticSource};
    use crate::signal::matrix::Channel;
    use crate::signal::Color;
    use crate::viewer::render::TextStyle;

    fn two_channel(len: usize, rate: f32) -> SampleMatrix {
        let channels = vec![Channel::new("ch1", Color::BLACK), Channel::new("ch2", Color::BLACK)];
        let data = vec![
            (0..len).map(|i| (i as f32 * 0.1).sin()).collect(),
            (0..len).map(|i| (i as f32 * 0.07).cos()).collect(),
        ];
        SampleMatrix::from_channels(channels, data, rate).unwrap()
    }

    fn state_with(matrix: SampleMatrix) -> ViewerState {
        let mut state = ViewerState::new(ViewerConfig::default()).unwrap();
        state.load(matrix).unwrap();
        state
    }

    fn first_text(commands: &[DrawCommand]) -> Option<&str> {
        commands.iter().find_map(|c| match c {
            DrawCommand::Text { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    #[test]
    fn nothing_loaded_shows_placeholder() {
        let mut state = ViewerState::new(ViewerConfig::default()).unwrap();
        let out = state.render();
        assert_eq!(out.len(), 1);
        assert_eq!(first_text(&out), Some("Load a file to begin"));
        assert!(state.play().is_none());
    }

    #[test]
    fn decimate_then_reset_restores_original_bits() {
        let m = two_channel(1001, 250.0);
        let before = m.data().clone();
        let mut state = state_with(m);

        let plan = state.decimate(5).unwrap();
        assert_eq!(plan.target_rate_hz, 50.0);
        assert_eq!(plan.nyquist_hz, 25.0);
        assert!(plan.risky);
        let reduced = state.matrix().unwrap();
        assert_eq!(reduced.len(), 201);
        assert_eq!(reduced.sample_rate_hz(), 50.0);
        assert_eq!(state.viewport().total_samples(), 201);
        assert_eq!(state.original().unwrap().len(), 1001);

        // second decimation starts from the original again
        state.decimate(2).unwrap();
        assert_eq!(state.matrix().unwrap().sample_rate_hz(), 125.0);

        state.reset_decimation().unwrap();
        let restored = state.matrix().unwrap();
        assert_eq!(restored.sample_rate_hz(), 250.0);
        assert_eq!(restored.data(), &before);
        assert!(state.decimation().is_none());
        assert_eq!(state.viewport().sample_rate_hz(), 250.0);
    }

    #[test]
    fn decimation_json_needs_a_decimation() {
        let mut state = state_with(two_channel(100, 100.0));
        assert!(matches!(state.export_decimation_json(), Err(ViewerError::Export(_))));
        state.decimate_to_rate(20.0).unwrap();
        let json: serde_json::Value = serde_json::from_str(&state.export_decimation_json().unwrap()).unwrap();
        assert_eq!(json["downsample_factor"], 5);
    }

    #[test]
    fn insufficient_xor_data_becomes_placeholder() {
        let mut state = state_with(two_channel(1500, 250.0));
        state.set_mode(ViewMode::Xor).unwrap();
        let out = state.render();
        assert_eq!(out.len(), 1);
        let DrawCommand::Text { text, style, .. } = &out[0] else {
            panic!("expected placeholder text");
        };
        assert!(text.contains("2 time chunks"));
        assert_eq!(style, &TextStyle::new(16.0, Color::LABEL).centered());
    }

    #[test]
    fn last_active_channel_stays_on() {
        let mut state = state_with(two_channel(500, 100.0));
        state.toggle_channel("ch2", false).unwrap();
        let err = state.toggle_channel("ch1", false).unwrap_err();
        assert!(matches!(err, ViewerError::Validation(_)));
        assert!(state.matrix().unwrap().channel(0).unwrap().active);
        assert!(!state.matrix().unwrap().channel(1).unwrap().active);
    }

    #[test]
    fn mode_switch_clears_heatmap() {
        let mut state = state_with(two_channel(3000, 100.0));
        state.set_recurrence_mode(RecurrenceMode::Heatmap);
        state.set_mode(ViewMode::Recurrence).unwrap();
        state.render();
        state.render();
        let twice: u32 = state.renderers.recurrence.counts().iter().sum();
        assert_eq!(twice, 1000);
        state.set_mode(ViewMode::Standard).unwrap();
        state.set_mode(ViewMode::Recurrence).unwrap();
        state.render();
        assert_eq!(state.renderers.recurrence.counts().iter().sum::<u32>(), 500);
    }

    #[test]
    fn scheduled_frames_are_throttled() {
        let mut state = state_with(two_channel(500, 100.0));
        let t0 = Instant::now();
        assert!(state.frame(t0, false).is_some());
        assert!(state.frame(t0 + Duration::from_millis(5), false).is_none());
        assert!(state.frame(t0 + Duration::from_millis(6), true).is_some());
        assert!(state.frame(t0 + Duration::from_millis(30), false).is_some());
    }

    #[test]
    fn playback_ticks_until_paused() {
        let mut state = state_with(SyntheticSource { duration_seconds: 20.0, sample_rate: 100.0 }.read_matrix().unwrap());
        let token = state.play().unwrap();
        let next = state.on_animation_frame(token).unwrap();
        assert!(state.viewport().pan() > 0.0);
        state.pause();
        assert!(state.on_animation_frame(next).is_none());
        state.pause();
        assert!(!state.viewport().is_playing());
    }

    #[test]
    fn new_load_keeps_mode_and_drops_decimation() {
        let mut state = state_with(two_channel(2000, 250.0));
        state.set_mode(ViewMode::Polar).unwrap();
        state.decimate(2).unwrap();
        state.load(two_channel(800, 100.0)).unwrap();
        assert_eq!(state.selection().unwrap().mode(), ViewMode::Polar);
        assert!(state.decimation().is_none());
        assert_eq!(state.original().unwrap().len(), 800);
    }

    #[test]
    fn wav_and_snapshot_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = state_with(two_channel(400, 100.0));
        state.toggle_channel("ch2", true).unwrap();
        state.set_surface(Surface::new(120.0, 80.0));
        let wav = dir.path().join("out.wav");
        state.save_wav(&wav).unwrap();
        let reader = hound::WavReader::open(&wav).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 100);
        let png = dir.path().join("frame.png");
        state.save_snapshot(&png).unwrap();
        assert!(std::fs::metadata(&png).unwrap().len() > 0);
    }
}
