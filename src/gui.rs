// src/gui.rs
use std::f32::consts::FRAC_PI_2;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

use eframe::egui;
use egui::{Align2, Color32, FontId, Pos2, Rect, Stroke, Vec2};
use egui_plot::{Line, Plot, PlotPoints, VLine};
use log::{info, warn};

use crate::config::ViewerConfig;
use crate::engine;
use crate::signal::decimate::AliasingReport;
use crate::signal::fft::FrequencySpectrum;
use crate::signal::{Color, ViewerError};
use crate::types::*;
use crate::viewer::analysis::AnalysisResult;
use crate::viewer::render::{Colormap, DrawCommand, PolarMode, RecurrenceMode, Surface, TextAlign};
use crate::viewer::selection::ViewMode;
use crate::viewer::state::ViewerState;
use crate::viewer::viewport::FrameToken;

const LOG_LINES: usize = 8;

pub struct SigviewApp {
    state: ViewerState,
    // animation loop
    pending_frame: Option<FrameToken>,
    commands: Vec<DrawCommand>,
    dirty: bool,

    // inputs
    path_input: String,
    export_dir: String,
    decimation_factor: usize,
    loaded_path: Option<PathBuf>,

    // derived displays
    spectrum: Option<FrequencySpectrum>,
    aliasing: Vec<AliasingReport>,
    analysis: Option<AnalysisResult>,
    classifying: bool,
    notice: Option<String>,
    log_messages: Vec<String>,

    // worker pipes
    rx: Receiver<EngineMessage>,
    tx_cmd: Sender<EngineCommand>,
}

impl SigviewApp {
    pub fn new(config: ViewerConfig, initial: Option<PathBuf>) -> Result<Self, ViewerError> {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        engine::spawn_thread(tx, rx_cmd, config.clone())?;

        match &initial {
            Some(path) => tx_cmd.send(EngineCommand::LoadFile(path.clone())).ok(),
            None => tx_cmd.send(EngineCommand::LoadSynthetic).ok(),
        };

        Ok(Self {
            state: ViewerState::new(config)?,
            pending_frame: None,
            commands: Vec::new(),
            dirty: true,
            path_input: initial
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            export_dir: ".".to_owned(),
            decimation_factor: 1,
            loaded_path: None,
            spectrum: None,
            aliasing: Vec::new(),
            analysis: None,
            classifying: false,
            notice: None,
            log_messages: vec!["sigview ready".to_owned()],
            rx,
            tx_cmd,
        })
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {msg}"));
        if self.log_messages.len() > LOG_LINES {
            self.log_messages.remove(0);
        }
    }

    /// Surfaces an error unless it is one the viewer recovers from silently.
    fn report(&mut self, err: ViewerError) {
        if err.is_user_facing() {
            warn!("{err}");
            self.log(&err.to_string());
            self.notice = Some(err.to_string());
        }
    }

    fn data_changed(&mut self) {
        self.pending_frame = self.state.viewport().pending_frame();
        self.spectrum = self.state.focus_spectrum();
        self.aliasing = self
            .state
            .aliasing_report(self.decimation_factor.max(1))
            .unwrap_or_default();
        self.dirty = true;
    }

    fn poll_worker(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                EngineMessage::Log(s) => self.log(&s),
                EngineMessage::Loaded { source, matrix } => match self.state.load(matrix) {
                    Ok(()) => {
                        self.log(&format!("loaded {source}"));
                        self.loaded_path = Some(PathBuf::from(&source)).filter(|p| p.exists());
                        self.analysis = None;
                        self.decimation_factor = 1;
                        self.notice = None;
                        self.data_changed();
                    }
                    Err(e) => self.report(e),
                },
                // previous matrix stays on screen
                EngineMessage::LoadFailed(e) => {
                    self.log(&format!("load failed: {e}"));
                    self.notice = Some(e);
                }
                EngineMessage::Classified(result) => {
                    self.classifying = false;
                    self.log(&result.headline());
                    self.analysis = Some(result);
                }
                EngineMessage::ServiceFailed(e) => {
                    self.classifying = false;
                    self.log(&format!("analysis failed: {e}"));
                    self.notice = Some(e);
                }
            }
        }
    }

    fn tick(&mut self) {
        if let Some(token) = self.pending_frame {
            self.pending_frame = self.state.on_animation_frame(token);
        }
    }

    fn export_path(&self, name: &str) -> PathBuf {
        PathBuf::from(&self.export_dir).join(name)
    }

    fn file_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("DATA");
        ui.horizontal(|ui| {
            ui.text_edit_singleline(&mut self.path_input);
            if ui.button("Load").clicked() && !self.path_input.trim().is_empty() {
                let path = PathBuf::from(self.path_input.trim());
                self.tx_cmd.send(EngineCommand::LoadFile(path)).ok();
            }
        });
        if ui.button("Demo signal").clicked() {
            self.tx_cmd.send(EngineCommand::LoadSynthetic).ok();
        }
        let can_classify = self.loaded_path.is_some() && !self.classifying;
        if ui.add_enabled(can_classify, egui::Button::new("Analyze")).clicked() {
            if let Some(path) = self.loaded_path.clone() {
                self.classifying = true;
                self.tx_cmd.send(EngineCommand::Classify(path)).ok();
            }
        }
        if self.classifying {
            ui.label(egui::RichText::new("Analyzing...").small());
        }
        if let Some(result) = &self.analysis {
            ui.label(egui::RichText::new(result.headline()).strong());
            for (label, p) in result.probabilities.iter().take(5) {
                ui.monospace(format!("{label:>8} {:5.1}%", p * 100.0));
            }
        }
    }

    fn playback_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("PLAYBACK");
        ui.horizontal(|ui| {
            let playing = self.state.viewport().is_playing();
            if ui.button(if playing { "Pause" } else { "Play" }).clicked() {
                if playing {
                    self.state.pause();
                    self.pending_frame = None;
                } else {
                    self.pending_frame = self.state.play();
                }
            }
            if ui.button("Step").clicked() {
                let vp = self.state.viewport();
                let quarter = (vp.visible_duration() * vp.sample_rate_hz() / 4.0).round().max(1.0);
                self.state.viewport_mut().step(quarter as isize);
                self.dirty = true;
            }
            if ui.button("Reset").clicked() {
                self.state.reset_playback();
                self.pending_frame = None;
                self.dirty = true;
            }
        });

        let vp = self.state.viewport();
        let (mut duration, mut zoom, mut pan, mut speed) = (vp.duration_seconds(), vp.zoom(), vp.pan(), vp.speed());
        let mut result = Ok(());
        let mut changed = false;
        if ui.add(egui::Slider::new(&mut duration, 1.0..=60.0).text("window s")).changed() {
            result = self.state.viewport_mut().set_duration(duration);
            changed = true;
        }
        if ui.add(egui::Slider::new(&mut zoom, 0.1..=20.0).logarithmic(true).text("zoom")).changed() {
            result = result.and(self.state.viewport_mut().set_zoom(zoom));
            changed = true;
        }
        if ui.add(egui::Slider::new(&mut pan, 0.0..=100.0).text("pan %")).changed() {
            result = result.and(self.state.viewport_mut().set_pan(pan));
            changed = true;
        }
        if ui.add(egui::Slider::new(&mut speed, 0.1..=10.0).text("speed")).changed() {
            result = result.and(self.state.viewport_mut().set_speed(speed));
            changed = true;
        }
        if let Err(e) = result {
            self.report(e);
        }
        self.dirty |= changed;
        let vp = self.state.viewport();
        ui.small(format!(
            "t = {:.1}s / {:.1}s",
            vp.current_time(),
            vp.total_seconds()
        ));
    }

    fn view_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("VIEW");
        let Some(selection) = self.state.selection() else {
            return;
        };
        let current = selection.mode();
        let mut mode = current;
        ui.horizontal(|ui| {
            for m in ViewMode::ALL {
                ui.selectable_value(&mut mode, m, m.to_string());
            }
        });
        if mode != current {
            if let Err(e) = self.state.set_mode(mode) {
                self.report(e);
            }
            self.dirty = true;
        }

        let render = self.state.config().render.clone();
        match mode {
            ViewMode::Polar => {
                let mut polar = render.polar_mode;
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut polar, PolarMode::Latest, "latest");
                    ui.selectable_value(&mut polar, PolarMode::Cumulative, "cumulative");
                });
                if polar != render.polar_mode {
                    self.state.set_polar_mode(polar);
                }
                let mut window = render.polar_time_window_seconds;
                if ui.add(egui::Slider::new(&mut window, 1.0..=30.0).text("polar window s")).changed() {
                    if let Err(e) = self.state.set_polar_window(window) {
                        self.report(e);
                    }
                }
            }
            ViewMode::Recurrence => {
                let mut rec = render.recurrence_mode;
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut rec, RecurrenceMode::Scatter, "scatter");
                    ui.selectable_value(&mut rec, RecurrenceMode::Heatmap, "heatmap");
                });
                if rec != render.recurrence_mode {
                    self.state.set_recurrence_mode(rec);
                }
                let mut colormap = render.colormap;
                egui::ComboBox::from_label("colormap")
                    .selected_text(colormap.label())
                    .show_ui(ui, |ui| {
                        for c in Colormap::ALL {
                            ui.selectable_value(&mut colormap, c, c.label());
                        }
                    });
                if colormap != render.colormap {
                    self.state.set_colormap(colormap);
                }
                let mut chunk = render.chunk_seconds;
                if ui.add(egui::Slider::new(&mut chunk, 0.5..=30.0).text("chunk s")).changed() {
                    if let Err(e) = self.state.set_chunk_seconds(chunk) {
                        self.report(e);
                    }
                }
            }
            _ => {}
        }
        if self.state.config().render != render {
            self.dirty = true;
        }
    }

    fn channel_controls(&mut self, ui: &mut egui::Ui) {
        let (Some(matrix), Some(selection)) = (self.state.matrix(), self.state.selection()) else {
            return;
        };
        ui.label("CHANNELS");
        let rows: Vec<(String, String, Color, bool)> = matrix
            .channels()
            .iter()
            .map(|c| (c.id.clone(), c.name.clone(), c.color, c.active))
            .collect();
        let mode = selection.mode();
        let focus = selection.focus().and_then(|i| rows.get(i)).map(|r| r.0.clone());
        let pair = selection
            .pair()
            .and_then(|(a, b)| Some((rows.get(a)?.0.clone(), rows.get(b)?.0.clone())));

        let mut outcome: Option<Result<(), ViewerError>> = None;
        egui::ScrollArea::vertical()
            .id_source("channels")
            .max_height(180.0)
            .show(ui, |ui| {
                for (id, name, color, active) in &rows {
                    ui.horizontal(|ui| {
                        let mut on = *active;
                        let text = egui::RichText::new(name).color(color32(*color));
                        if ui.checkbox(&mut on, text).changed() {
                            outcome = Some(self.state.toggle_channel(id, on));
                        }
                        match mode {
                            ViewMode::Xor | ViewMode::Polar => {
                                let is_focus = focus.as_deref() == Some(id.as_str());
                                if ui.radio(is_focus, "").clicked() && !is_focus {
                                    outcome = Some(self.state.set_focus(id));
                                }
                            }
                            ViewMode::Recurrence => {
                                if let Some((a, b)) = &pair {
                                    if ui.small_button("A").clicked() && a != id {
                                        outcome = Some(self.state.set_pair(id, b));
                                    }
                                    if ui.small_button("B").clicked() && b != id {
                                        outcome = Some(self.state.set_pair(a, id));
                                    }
                                }
                            }
                            ViewMode::Standard => {}
                        }
                    });
                }
            });
        if let Some(result) = outcome {
            match result {
                Ok(()) => {
                    self.spectrum = self.state.focus_spectrum();
                    self.dirty = true;
                }
                Err(e) => self.report(e),
            }
        }
    }

    fn nyquist_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("NYQUIST");
        let Some(original) = self.state.original() else {
            return;
        };
        let rate = original.sample_rate_hz();
        let mut factor = self.decimation_factor;
        if ui
            .add(egui::Slider::new(&mut factor, 1..=50).text("factor"))
            .changed()
        {
            self.decimation_factor = factor;
            self.aliasing = self.state.aliasing_report(factor).unwrap_or_default();
        }
        match self.state.decimator().plan(rate, self.decimation_factor) {
            Ok(plan) => {
                ui.small(format!(
                    "{rate} Hz -> {} Hz, nyquist {} Hz",
                    plan.target_rate_hz, plan.nyquist_hz
                ));
                if plan.risky {
                    ui.colored_label(Color32::from_rgb(255, 107, 0), "aliasing likely at this rate");
                }
            }
            Err(e) => {
                ui.small(e.to_string());
            }
        }
        for report in self.aliasing.iter().filter(|r| r.exceeds_nyquist).take(3) {
            ui.small(format!(
                "{}: ~{:.1} Hz content above {:.1} Hz",
                report.channel,
                report.peak_frequency_hz.unwrap_or(report.zero_crossing_frequency_hz),
                report.nyquist_hz
            ));
        }
        ui.horizontal(|ui| {
            if ui.button("Apply").clicked() {
                match self.state.decimate(self.decimation_factor) {
                    Ok(_) => self.data_changed(),
                    Err(e) => self.report(e),
                }
            }
            if ui
                .add_enabled(self.state.decimation().is_some(), egui::Button::new("Reset to original"))
                .clicked()
            {
                match self.state.reset_decimation() {
                    Ok(()) => self.data_changed(),
                    Err(e) => self.report(e),
                }
            }
        });
    }

    fn export_controls(&mut self, ui: &mut egui::Ui) {
        ui.label("EXPORT");
        ui.horizontal(|ui| {
            ui.label("to");
            ui.text_edit_singleline(&mut self.export_dir);
        });
        ui.horizontal(|ui| {
            if ui.button("WAV").clicked() {
                let path = self.export_path("signal.wav");
                let result = self.state.save_wav(&path);
                self.finish_export(result, &path);
            }
            if ui.button("JSON").clicked() {
                let path = self.export_path("decimated.json");
                let result = self
                    .state
                    .export_decimation_json()
                    .and_then(|json| std::fs::write(&path, json).map_err(ViewerError::from));
                self.finish_export(result, &path);
            }
            if ui.button("PNG").clicked() {
                let path = self.export_path("frame.png");
                let result = self.state.save_snapshot(&path);
                self.finish_export(result, &path);
            }
        });
    }

    fn finish_export(&mut self, result: Result<(), ViewerError>, path: &std::path::Path) {
        match result {
            Ok(()) => {
                info!("exported {}", path.display());
                self.log(&format!("saved {}", path.display()));
            }
            Err(e) => self.report(e),
        }
    }

    fn spectrum_plot(&self, ui: &mut egui::Ui) {
        let Some(spectrum) = &self.spectrum else {
            return;
        };
        let points: PlotPoints = spectrum
            .frequencies_hz
            .iter()
            .zip(&spectrum.magnitudes)
            .map(|(f, m)| [*f as f64, *m as f64])
            .collect();
        let nyquist = self
            .state
            .decimation()
            .map(|d| d.nyquist_hz)
            .unwrap_or(spectrum.sample_rate_hz / 2.0);
        Plot::new("spectrum")
            .height(140.0)
            .include_y(0.0)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(points).name(&spectrum.channel_label));
                plot_ui.vline(
                    VLine::new(nyquist as f64)
                        .name("Nyquist")
                        .color(Color32::from_rgb(255, 0, 0)),
                );
            });
    }

    fn signal_canvas(&mut self, ui: &mut egui::Ui) {
        let size = Vec2::new(ui.available_width(), (ui.available_height() - 160.0).max(200.0));
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click_and_drag());
        let rect = response.rect;
        let surface = Surface::new(rect.width(), rect.height());
        if surface != self.state.surface() {
            self.state.set_surface(surface);
            self.dirty = true;
        }

        if response.dragged() {
            let dx = response.drag_delta().x;
            if dx != 0.0 {
                self.state.viewport_mut().drag(dx, rect.width());
                self.dirty = true;
            }
        }
        if response.hovered() {
            let scroll = ui.input(|i| i.scroll_delta.y);
            let notches = if scroll > 0.0 {
                -1
            } else if scroll < 0.0 {
                1
            } else {
                0
            };
            if notches != 0 {
                self.state.viewport_mut().wheel(notches, rect.width());
                self.dirty = true;
            }
        }

        if let Some(commands) = self.state.frame(Instant::now(), self.dirty) {
            self.commands = commands;
            self.dirty = false;
        }
        painter.rect_filled(rect, 0.0, Color32::WHITE);
        paint(&painter, rect.min, &self.commands);
    }
}

impl Drop for SigviewApp {
    fn drop(&mut self) {
        self.tx_cmd.send(EngineCommand::Shutdown).ok();
    }
}

fn color32(c: Color) -> Color32 {
    Color32::from_rgba_unmultiplied(c.r, c.g, c.b, c.a)
}

/// Translates renderer output into egui shapes, offset to the canvas origin.
fn paint(painter: &egui::Painter, origin: Pos2, commands: &[DrawCommand]) {
    for command in commands {
        match command {
            DrawCommand::Polyline {
                points,
                color,
                width,
                dash,
            } => {
                let pts: Vec<Pos2> = points.iter().map(|p| origin + Vec2::new(p.x, p.y)).collect();
                let stroke = Stroke::new(*width, color32(*color));
                match dash {
                    Some(d) => painter.extend(egui::Shape::dashed_line(&pts, stroke, d.on, d.off)),
                    None => {
                        painter.add(egui::Shape::line(pts, stroke));
                    }
                }
            }
            DrawCommand::Rect { x, y, w, h, color } => {
                let r = Rect::from_min_size(origin + Vec2::new(*x, *y), Vec2::new(*w, *h));
                painter.rect_filled(r, 0.0, color32(*color));
            }
            DrawCommand::Circle { cx, cy, r, color } => {
                painter.circle_filled(origin + Vec2::new(*cx, *cy), *r, color32(*color));
            }
            DrawCommand::Text { x, y, text, style } => {
                let pos = origin + Vec2::new(*x, *y);
                let font = FontId::proportional(style.size);
                let color = color32(style.color);
                if style.vertical {
                    let galley = painter.layout_no_wrap(text.clone(), font, color);
                    let size = galley.size();
                    let anchor = pos + Vec2::new(-size.y / 2.0, size.x / 2.0);
                    let mut shape = egui::epaint::TextShape::new(anchor, galley);
                    shape.angle = -FRAC_PI_2;
                    painter.add(shape);
                } else {
                    let align = match style.align {
                        TextAlign::Left => Align2::LEFT_BOTTOM,
                        TextAlign::Center => Align2::CENTER_CENTER,
                        TextAlign::Right => Align2::RIGHT_BOTTOM,
                    };
                    painter.text(pos, align, text, font, color);
                }
            }
        }
    }
}

impl eframe::App for SigviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. worker messages
        self.poll_worker();

        // 2. one playback tick per repaint
        self.tick();
        if self.state.viewport().is_playing() {
            ctx.request_repaint();
        }

        // 3. UI
        egui::SidePanel::left("controls").min_width(280.0).show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("sigview");
                ui.separator();
                self.file_controls(ui);
                ui.separator();
                self.playback_controls(ui);
                ui.separator();
                self.view_controls(ui);
                ui.separator();
                self.channel_controls(ui);
                ui.separator();
                self.nyquist_controls(ui);
                ui.separator();
                self.export_controls(ui);
                ui.separator();
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(notice) = self.notice.clone() {
                ui.horizontal(|ui| {
                    ui.colored_label(Color32::from_rgb(255, 107, 0), notice);
                    if ui.small_button("x").clicked() {
                        self.notice = None;
                    }
                });
            }
            self.signal_canvas(ui);
            self.spectrum_plot(ui);
        });
    }
}
