//! Playback, pan, zoom and speed state, and the mapping from those to a
//! visible sample window.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::signal::ViewerError;

/// Pan advance per animation tick at speed 1, in percent of the scroll range.
pub const PAN_STEP_PER_TICK: f32 = 0.1;

const SPP_TOLERANCE: f32 = 1e-3;

/// Handle for one scheduled animation frame. Only the most recently issued
/// token is honoured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loaded,
    Playing,
    Paused,
}

#[derive(Clone, Debug)]
pub struct ViewportController {
    state: PlaybackState,
    duration_seconds: f32,
    zoom: f32,
    pan: f32,
    speed: f32,
    current_time: f32,
    total_samples: usize,
    sample_rate_hz: f32,
    next_frame: u64,
    pending_frame: Option<FrameToken>,
}

impl ViewportController {
    pub fn new(duration_seconds: f32, zoom: f32, speed: f32) -> Result<Self, ViewerError> {
        let mut vp = Self {
            state: PlaybackState::Idle,
            duration_seconds: 10.0,
            zoom: 1.0,
            pan: 0.0,
            speed: 1.0,
            current_time: 0.0,
            total_samples: 0,
            sample_rate_hz: 1.0,
            next_frame: 0,
            pending_frame: None,
        };
        vp.set_duration(duration_seconds)?;
        vp.set_zoom(zoom)?;
        vp.set_speed(speed)?;
        Ok(vp)
    }

    /// Points the viewport at new data. Position is kept but clamped.
    pub fn set_data(&mut self, total_samples: usize, sample_rate_hz: f32) -> Result<(), ViewerError> {
        if !(sample_rate_hz > 0.0) {
            return Err(ViewerError::InvalidSampleRate);
        }
        self.total_samples = total_samples;
        self.sample_rate_hz = sample_rate_hz;
        if self.state == PlaybackState::Idle {
            self.state = PlaybackState::Loaded;
        }
        self.current_time = self.current_time.min(self.total_seconds());
        Ok(())
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn duration_seconds(&self) -> f32 {
        self.duration_seconds
    }

    pub fn current_time(&self) -> f32 {
        self.current_time
    }

    pub fn sample_rate_hz(&self) -> f32 {
        self.sample_rate_hz
    }

    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn total_seconds(&self) -> f32 {
        self.total_samples as f32 / self.sample_rate_hz
    }

    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.pending_frame
    }

    pub fn visible_duration(&self) -> f32 {
        self.duration_seconds / self.zoom
    }

    pub fn visible_start(&self) -> f32 {
        self.pan / 100.0 * (self.total_seconds() - self.visible_duration()).max(0.0)
    }

    pub fn visible_end(&self) -> f32 {
        self.visible_start() + self.visible_duration()
    }

    /// Visible window in samples. The end may overshoot the data; consumers clamp.
    pub fn visible_samples(&self) -> (usize, usize) {
        let start = (self.visible_start() * self.sample_rate_hz).floor() as usize;
        let width = (self.visible_duration() * self.sample_rate_hz).round() as usize;
        (start, start + width)
    }

    /// Largest pan before playback wraps; 0 when all data fits on screen.
    pub fn max_pan(&self) -> f32 {
        let total = self.total_seconds();
        let visible = self.visible_duration();
        if total <= visible || total <= 0.0 {
            0.0
        } else {
            100.0 * (1.0 - visible / total)
        }
    }

    fn scroll_range_samples(&self) -> f32 {
        (self.total_samples as f32 - self.visible_duration() * self.sample_rate_hz).max(0.0)
    }

    fn sync_current_time(&mut self) {
        let scroll = (self.total_seconds() - self.visible_duration()).max(0.0);
        self.current_time = self.pan / 100.0 * scroll + self.visible_duration() / 2.0;
    }

    fn issue_frame(&mut self) -> FrameToken {
        self.next_frame += 1;
        let token = FrameToken(self.next_frame);
        self.pending_frame = Some(token);
        token
    }

    /// Starts playback and returns the frame to wait for. A no-op when already
    /// playing; the existing frame is returned.
    pub fn play(&mut self) -> FrameToken {
        if let (PlaybackState::Playing, Some(token)) = (self.state, self.pending_frame) {
            return token;
        }
        debug!("playback started at pan {:.2}", self.pan);
        self.state = PlaybackState::Playing;
        self.issue_frame()
    }

    /// Stops playback and drops the pending frame. Idempotent.
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            debug!("playback paused at pan {:.2}", self.pan);
            self.state = PlaybackState::Paused;
        }
        self.pending_frame = None;
    }

    pub fn reset(&mut self) {
        self.pause();
        self.pan = 0.0;
        self.current_time = 0.0;
        if self.state != PlaybackState::Idle {
            self.state = PlaybackState::Loaded;
        }
    }

    /// Runs one playback tick if `token` is the pending frame. Returns the
    /// token for the following tick, or `None` when the frame was stale.
    pub fn on_animation_frame(&mut self, token: FrameToken) -> Option<FrameToken> {
        if !self.is_playing() || self.pending_frame != Some(token) {
            trace!("ignoring stale frame {token:?}");
            return None;
        }
        self.advance_pan(PAN_STEP_PER_TICK * self.speed);
        Some(self.issue_frame())
    }

    fn advance_pan(&mut self, delta: f32) {
        let next = self.pan + delta;
        if next >= self.max_pan() {
            trace!("wrapping playback to start");
            self.pan = 0.0;
            self.current_time = 0.0;
        } else {
            self.pan = next.max(0.0);
            self.sync_current_time();
        }
    }

    /// Moves `n` samples without starting playback; wraps like playback does.
    pub fn step(&mut self, n: isize) {
        let range = self.scroll_range_samples();
        if range <= 0.0 {
            return;
        }
        self.advance_pan(n as f32 / range * 100.0);
    }

    pub fn set_zoom(&mut self, zoom: f32) -> Result<(), ViewerError> {
        if !(zoom > 0.0) || !zoom.is_finite() {
            return Err(ViewerError::Validation(format!("zoom must be positive, got {zoom}")));
        }
        self.zoom = zoom;
        Ok(())
    }

    pub fn set_pan(&mut self, pan: f32) -> Result<(), ViewerError> {
        if pan.is_nan() {
            return Err(ViewerError::validation("pan must be a number"));
        }
        self.pan = pan.clamp(0.0, 100.0);
        self.sync_current_time();
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f32) -> Result<(), ViewerError> {
        if !(speed > 0.0) || !speed.is_finite() {
            return Err(ViewerError::Validation(format!("speed must be positive, got {speed}")));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn set_duration(&mut self, seconds: f32) -> Result<(), ViewerError> {
        if !(seconds > 0.0) || !seconds.is_finite() {
            return Err(ViewerError::Validation(format!(
                "viewport duration must be positive, got {seconds}"
            )));
        }
        self.duration_seconds = seconds;
        Ok(())
    }

    /// Moves the playhead used by time-anchored projections.
    pub fn set_current_time(&mut self, seconds: f32) {
        self.current_time = seconds.clamp(0.0, self.total_seconds().max(0.0));
    }

    pub fn samples_per_pixel(&self, width_px: f32) -> usize {
        let visible = self.visible_duration() * self.sample_rate_hz;
        if width_px < 1.0 {
            return visible.max(1.0) as usize;
        }
        // absorbs the rounding left by `wheel`, which sets zoom to an exact stride
        ((visible / width_px + SPP_TOLERANCE).floor() as usize).max(1)
    }

    /// Wheel notch: positive zooms out by one sample per pixel, negative zooms in.
    pub fn wheel(&mut self, notches: i32, width_px: f32) {
        if width_px < 1.0 || notches == 0 {
            return;
        }
        let spp = self.samples_per_pixel(width_px) as i64;
        let next = (spp + notches as i64).max(1) as f32;
        let zoom = self.duration_seconds * self.sample_rate_hz / (next * width_px);
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
            trace!("wheel: {spp} -> {next} samples/px, zoom {zoom:.3}");
        }
    }

    /// Pointer drag by `dx` pixels. Dragging right reveals earlier samples.
    pub fn drag(&mut self, dx_px: f32, width_px: f32) {
        let range = self.scroll_range_samples();
        if range <= 0.0 {
            return;
        }
        let samples = -dx_px * self.samples_per_pixel(width_px) as f32;
        self.pan = (self.pan + samples / range * 100.0).clamp(0.0, 100.0);
        self.sync_current_time();
    }
}

/// Drops scheduled renders that arrive faster than the minimum interval.
#[derive(Clone, Debug)]
pub struct RenderThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RenderThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// `forced` renders (user interaction) always pass and restart the interval.
    pub fn should_render(&mut self, now: Instant, forced: bool) -> bool {
        let due = match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.min_interval,
            None => true,
        };
        if due || forced {
            self.last = Some(now);
            true
        } else {
            trace!("render throttled");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(total_seconds: f32) -> ViewportController {
        let mut vp = ViewportController::new(10.0, 1.0, 1.0).unwrap();
        vp.set_data((total_seconds * 250.0) as usize, 250.0).unwrap();
        vp
    }

    #[test]
    fn visible_window_follows_pan_and_zoom() {
        let mut vp = loaded(60.0);
        assert_eq!(vp.visible_samples(), (0, 2500));
        vp.set_pan(50.0).unwrap();
        assert!((vp.visible_start() - 25.0).abs() < 1e-4);
        vp.set_zoom(2.0).unwrap();
        assert!((vp.visible_duration() - 5.0).abs() < 1e-6);
        assert!((vp.visible_start() - 27.5).abs() < 1e-4);
        assert!((vp.current_time() - 30.0).abs() < 1e-4);
    }

    #[test]
    fn play_is_idempotent_and_pause_cancels_frame() {
        let mut vp = loaded(60.0);
        let first = vp.play();
        assert_eq!(vp.play(), first);
        vp.pause();
        vp.pause();
        assert_eq!(vp.state(), PlaybackState::Paused);
        assert!(vp.pending_frame().is_none());
        assert!(vp.on_animation_frame(first).is_none());
        assert_eq!(vp.pan(), 0.0);
    }

    #[test]
    fn ticks_advance_by_speed() {
        let mut vp = loaded(60.0);
        vp.set_speed(2.0).unwrap();
        let mut token = vp.play();
        for _ in 0..5 {
            token = vp.on_animation_frame(token).unwrap();
        }
        assert!((vp.pan() - 1.0).abs() < 1e-5);
        // old tokens are stale once a new one is issued
        let mut stale = vp.clone();
        assert!(stale.on_animation_frame(FrameToken(1)).is_none());
    }

    #[test]
    fn playback_wraps_at_end() {
        let mut vp = loaded(20.0);
        // max pan = 100 * (1 - 10/20) = 50
        assert!((vp.max_pan() - 50.0).abs() < 1e-5);
        vp.set_pan(49.95).unwrap();
        let token = vp.play();
        vp.on_animation_frame(token).unwrap();
        assert_eq!(vp.pan(), 0.0);
        assert_eq!(vp.current_time(), 0.0);
    }

    #[test]
    fn short_data_never_scrolls() {
        let mut vp = loaded(4.0);
        assert_eq!(vp.max_pan(), 0.0);
        let token = vp.play();
        vp.on_animation_frame(token).unwrap();
        assert_eq!(vp.pan(), 0.0);
        vp.step(100);
        assert_eq!(vp.pan(), 0.0);
    }

    #[test]
    fn reset_stops_and_rewinds() {
        let mut vp = loaded(60.0);
        vp.set_pan(30.0).unwrap();
        let token = vp.play();
        vp.reset();
        assert_eq!(vp.state(), PlaybackState::Loaded);
        assert_eq!(vp.pan(), 0.0);
        assert_eq!(vp.current_time(), 0.0);
        assert!(vp.on_animation_frame(token).is_none());
    }

    #[test]
    fn step_moves_by_samples() {
        let mut vp = loaded(60.0);
        // scroll range = 15000 - 2500 = 12500 samples
        vp.step(1250);
        assert!((vp.pan() - 10.0).abs() < 1e-4);
        assert!(!vp.is_playing());
        assert!((vp.visible_start() - 5.0).abs() < 1e-3);
    }

    #[test]
    fn setters_validate() {
        let mut vp = loaded(60.0);
        assert!(vp.set_zoom(0.0).is_err());
        assert!(vp.set_speed(-1.0).is_err());
        assert!(vp.set_pan(f32::NAN).is_err());
        vp.set_pan(250.0).unwrap();
        assert_eq!(vp.pan(), 100.0);
        vp.set_pan(-3.0).unwrap();
        assert_eq!(vp.pan(), 0.0);
        assert_eq!(vp.zoom(), 1.0);
    }

    #[test]
    fn wheel_and_drag_share_zoom() {
        let mut vp = loaded(60.0);
        // 2500 visible samples over 500 px -> 5 spp
        assert_eq!(vp.samples_per_pixel(500.0), 5);
        vp.wheel(1, 500.0);
        assert_eq!(vp.samples_per_pixel(500.0), 6);
        assert!((vp.visible_duration() - 12.0).abs() < 1e-4);
        vp.wheel(-10, 500.0);
        assert_eq!(vp.samples_per_pixel(500.0), 1);

        let mut vp = loaded(60.0);
        vp.set_pan(50.0).unwrap();
        // 100 px left at 5 spp = 500 samples forward out of 12500
        vp.drag(-100.0, 500.0);
        assert!((vp.pan() - 54.0).abs() < 1e-3);
        vp.drag(1e6, 500.0);
        assert_eq!(vp.pan(), 0.0);
    }

    #[test]
    fn wheel_notches_move_one_stride_at_odd_widths() {
        let mut vp = loaded(600.0);
        for width in [333.0, 417.0, 1021.0] {
            vp.set_zoom(1.0).unwrap();
            let mut spp = vp.samples_per_pixel(width);
            for _ in 0..60 {
                vp.wheel(1, width);
                let next = vp.samples_per_pixel(width);
                assert_eq!(next, spp + 1, "width {width}: {spp} -> {next}");
                spp = next;
            }
            for _ in 0..20 {
                vp.wheel(-1, width);
                let next = vp.samples_per_pixel(width);
                assert_eq!(next, spp - 1, "width {width}: {spp} -> {next}");
                spp = next;
            }
        }
    }

    #[test]
    fn throttle_skips_fast_scheduled_renders() {
        let mut throttle = RenderThrottle::new(Duration::from_millis(16));
        let t0 = Instant::now();
        assert!(throttle.should_render(t0, false));
        assert!(!throttle.should_render(t0 + Duration::from_millis(5), false));
        assert!(throttle.should_render(t0 + Duration::from_millis(6), true));
        assert!(throttle.should_render(t0 + Duration::from_millis(30), false));
    }
}
