use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::signal::{Color, ViewerError};
use crate::viewer::render::{Dash, DrawCommand, Point, RenderContext, Renderer, TextStyle};

const RINGS: usize = 5;
const RADIALS: usize = 12;
const TIME_MARKERS: usize = 8;
/// Upper bound on plotted points per pass.
const MAX_POINTS: usize = 500;
const RING_SEGMENTS: usize = 96;
const RING_COLOR: Color = Color::rgb(224, 224, 224);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarMode {
    /// Sliding window ending at the playhead; newest sample at 0°.
    Latest,
    /// Everything from the start to the playhead, angle proportional to
    /// absolute position.
    #[default]
    Cumulative,
}

/// Inclusive sample range `[start, end]` for the projection, or `None` when
/// there is nothing to draw yet.
pub fn polar_window(
    mode: PolarMode,
    total_samples: usize,
    sample_rate_hz: f32,
    current_time: f32,
    window_seconds: f32,
) -> Option<(usize, usize)> {
    if total_samples == 0 {
        return None;
    }
    let end = ((current_time.max(0.0) * sample_rate_hz).floor() as usize).min(total_samples - 1);
    let start = match mode {
        PolarMode::Latest => end.saturating_sub((window_seconds * sample_rate_hz).floor() as usize),
        PolarMode::Cumulative => 0,
    };
    (start < end).then_some((start, end))
}

fn ring(cx: f32, cy: f32, r: f32) -> Vec<Point> {
    (0..=RING_SEGMENTS)
        .map(|i| {
            let a = TAU * i as f32 / RING_SEGMENTS as f32;
            Point::new(cx + r * a.cos(), cy + r * a.sin())
        })
        .collect()
}

/// Radius is absolute amplitude, angle is time. Draws only the focus channel.
#[derive(Debug, Default)]
pub struct PolarRenderer;

impl PolarRenderer {
    fn grid(cx: f32, cy: f32, max_radius: f32, out: &mut Vec<DrawCommand>) {
        for i in 1..=RINGS {
            let r = max_radius * i as f32 / RINGS as f32;
            let points = ring(cx, cy, r);
            out.push(if i == RINGS {
                DrawCommand::line(points, RING_COLOR, 1.0)
            } else {
                DrawCommand::dashed(points, RING_COLOR, 1.0, Dash::new(2.0, 2.0))
            });
            out.push(DrawCommand::text(
                cx + r + 5.0,
                cy,
                format!("{:.1}", i as f32 / RINGS as f32),
                TextStyle::new(10.0, Color::LABEL),
            ));
        }
        for i in 0..RADIALS {
            let a = TAU * i as f32 / RADIALS as f32;
            out.push(DrawCommand::segment(
                Point::new(cx, cy),
                Point::new(cx + max_radius * a.cos(), cy + max_radius * a.sin()),
                RING_COLOR,
                1.0,
            ));
        }
    }
}

impl Renderer for PolarRenderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<DrawCommand>, ViewerError> {
        let index = ctx
            .selection
            .selected()
            .first()
            .copied()
            .ok_or_else(|| ViewerError::InsufficientData("select a channel for the polar view".into()))?;
        let channel = ctx
            .matrix
            .channel(index)
            .ok_or_else(|| ViewerError::Range(format!("channel {index}")))?;
        let series = ctx
            .matrix
            .samples(index)
            .ok_or_else(|| ViewerError::Range(format!("channel {index}")))?;

        let config = ctx.config;
        let cx = ctx.surface.width / 2.0;
        let cy = ctx.surface.height / 2.0;
        let max_radius = cx.min(cy) * 0.8 * config.polar_radius_scale;
        let total = ctx.matrix.len();
        let total_seconds = ctx.matrix.duration_seconds();
        let current_time = ctx.viewport.current_time();
        let window = config.polar_time_window_seconds;

        let (start, end) = polar_window(
            config.polar_mode,
            total,
            ctx.matrix.sample_rate_hz(),
            current_time,
            window,
        )
        .ok_or_else(|| ViewerError::InsufficientData("Play the signal to see polar visualization".into()))?;

        let mut out = Vec::new();
        Self::grid(cx, cy, max_radius, &mut out);

        let max_amp = ctx.matrix.max_amplitude_at(index);
        let radius_of = |v: f32| v.abs() / max_amp * max_radius;
        let span = (end - start) as f32;
        let step = ((end - start + 1) / MAX_POINTS).max(1);
        let mut points: Vec<Point> = (start..=end)
            .step_by(step)
            .map(|i| {
                let angle = match config.polar_mode {
                    PolarMode::Latest => TAU * (1.0 - (i - start) as f32 / span),
                    PolarMode::Cumulative => TAU * i as f32 / total as f32,
                };
                let r = radius_of(series[i]);
                Point::new(cx + r * angle.cos(), cy + r * angle.sin())
            })
            .collect();
        if config.polar_mode == PolarMode::Cumulative {
            points.push(Point::new(cx + radius_of(series[start]), cy));
        }
        out.push(DrawCommand::line(points, channel.color.with_opacity(0.8), 2.0));

        if config.polar_mode == PolarMode::Latest {
            let r = radius_of(series[end]);
            out.push(DrawCommand::Circle {
                cx: cx + r,
                cy,
                r: 5.0,
                color: Color::BLACK,
            });
            out.push(DrawCommand::Circle {
                cx: cx + r,
                cy,
                r: 4.0,
                color: channel.color,
            });
        }

        let label_radius = max_radius * 1.15;
        out.push(DrawCommand::Rect {
            x: cx + label_radius - 4.0,
            y: cy - 24.0,
            w: 8.0 * channel.name.chars().count() as f32 + 12.0,
            h: 16.0,
            color: channel.color,
        });
        out.push(DrawCommand::text(
            cx + label_radius + 2.0,
            cy - 12.0,
            channel.name.clone(),
            TextStyle::new(11.0, Color::BLACK),
        ));

        for i in 0..TIME_MARKERS {
            let a = TAU * i as f32 / TIME_MARKERS as f32;
            let t = match config.polar_mode {
                PolarMode::Latest => window * i as f32 / TIME_MARKERS as f32,
                PolarMode::Cumulative => total_seconds * i as f32 / TIME_MARKERS as f32,
            };
            out.push(DrawCommand::text(
                cx + label_radius * a.cos(),
                cy + label_radius * a.sin(),
                format!("{t:.1}s"),
                TextStyle::new(9.0, Color::LABEL).centered(),
            ));
        }

        let caption = match config.polar_mode {
            PolarMode::Latest => vec![
                format!("Latest {window}s"),
                format!("Time: {current_time:.1}s"),
            ],
            PolarMode::Cumulative => vec![
                "Cumulative".to_owned(),
                format!("Current: {current_time:.1}s"),
                format!("Total: {total_seconds:.1}s"),
            ],
        };
        let top = cy - 6.0 * caption.len() as f32;
        for (row, line) in caption.into_iter().enumerate() {
            out.push(DrawCommand::text(
                cx,
                top + row as f32 * 13.0,
                line,
                TextStyle::new(if row == 0 { 12.0 } else { 10.0 }, Color::rgb(51, 51, 51)).centered(),
            ));
        }
        Ok(out)
    }
}
