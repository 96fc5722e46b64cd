use ndarray::ArrayView1;

use crate::signal::{Color, ViewerError};
use crate::viewer::render::standard::grid;
use crate::viewer::render::{Dash, DrawCommand, Point, RenderContext, Renderer, TextStyle};

const PREV_DASH: Dash = Dash::new(3.0, 2.0);
/// Pixel spacing of difference markers.
const MARKER_SPACING: usize = 5;

/// Absolute differences between each pair of adjacent chunks.
///
/// Entry `k` compares chunk `k + 1` with chunk `k`. Trailing samples that do
/// not fill a chunk are ignored.
pub fn chunk_differences(
    series: ArrayView1<'_, f32>,
    samples_per_chunk: usize,
) -> Result<Vec<Vec<f32>>, ViewerError> {
    let chunks = if samples_per_chunk == 0 {
        0
    } else {
        series.len() / samples_per_chunk
    };
    if chunks < 2 {
        return Err(ViewerError::InsufficientData(
            "need at least 2 time chunks of data for XOR comparison".into(),
        ));
    }
    Ok((1..chunks)
        .map(|k| {
            let prev = (k - 1) * samples_per_chunk;
            let cur = k * samples_per_chunk;
            (0..samples_per_chunk)
                .map(|i| (series[cur + i] - series[prev + i]).abs())
                .collect()
        })
        .collect())
}

/// Chunk-against-previous-chunk comparison of the focus channel.
///
/// Chunks are one visible duration long. Near-equal samples cancel out; only
/// differences above the threshold are highlighted.
#[derive(Debug, Default)]
pub struct XorRenderer;

impl Renderer for XorRenderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<DrawCommand>, ViewerError> {
        let index = ctx
            .selection
            .selected()
            .first()
            .copied()
            .ok_or_else(|| ViewerError::InsufficientData("select a channel for XOR comparison".into()))?;
        let channel = ctx
            .matrix
            .channel(index)
            .ok_or_else(|| ViewerError::Range(format!("channel {index}")))?;
        let series = ctx
            .matrix
            .samples(index)
            .ok_or_else(|| ViewerError::Range(format!("channel {index}")))?;

        let rate = ctx.matrix.sample_rate_hz();
        let visible = ctx.viewport.visible_duration();
        let samples_per_chunk = (visible * rate).floor() as usize;
        let diffs = chunk_differences(series, samples_per_chunk)?;

        let surface = ctx.surface;
        let width = surface.width;
        let center = surface.height / 2.0;
        let scale = surface.height * 0.4;
        let max_amp = ctx.matrix.max_amplitude_at(index);
        let y_of = |v: f32| center - v / max_amp * scale;
        let view_start = ctx.viewport.visible_start();
        let chunk_seconds = samples_per_chunk as f32 / rate;
        let px_samples = visible * rate / width;
        let threshold = ctx.config.xor_threshold;
        let marker_threshold = ctx.config.xor_marker_threshold;

        let mut out = grid(surface);
        let mut shown = 0usize;
        for (k, diff) in diffs.iter().enumerate() {
            let prev_start = k * samples_per_chunk;
            let cur_start = (k + 1) * samples_per_chunk;
            let chunk_t0 = cur_start as f32 / rate;
            let chunk_t1 = chunk_t0 + chunk_seconds;
            if chunk_t1 < view_start || chunk_t0 > view_start + visible {
                continue;
            }
            let start_x = (chunk_t0 - view_start).max(0.0) / visible * width;
            let end_x = (chunk_t1 - view_start).min(visible) / visible * width;
            let chunk_width = end_x - start_x;
            if chunk_width <= 0.0 {
                continue;
            }
            shown += 1;
            let first_offset = ((view_start - chunk_t0).max(0.0) * rate) as usize;

            let mut prev_pts = Vec::new();
            let mut cur_pts = Vec::new();
            let mut runs: Vec<Vec<Point>> = Vec::new();
            let mut run: Vec<Point> = Vec::new();
            let mut markers = Vec::new();
            for px in 0..chunk_width.ceil() as usize {
                let offset = first_offset + (px as f32 * px_samples) as usize;
                if offset >= samples_per_chunk {
                    break;
                }
                let x = start_x + px as f32;
                let prev_y = y_of(series[prev_start + offset]);
                let cur_y = y_of(series[cur_start + offset]);
                prev_pts.push(Point::new(x, prev_y));
                cur_pts.push(Point::new(x, cur_y));

                let normalized = diff[offset] / max_amp;
                if normalized > threshold {
                    run.push(Point::new(x, cur_y));
                } else if !run.is_empty() {
                    runs.push(std::mem::take(&mut run));
                }
                if px % MARKER_SPACING == 0 && normalized > marker_threshold {
                    markers.push((x, prev_y, cur_y));
                }
            }
            if !run.is_empty() {
                runs.push(run);
            }

            out.push(DrawCommand::dashed(prev_pts, channel.color.with_opacity(0.3), 1.5, PREV_DASH));
            out.push(DrawCommand::line(cur_pts, channel.color.with_opacity(0.7), 2.0));
            for run in runs {
                if run.len() == 1 {
                    out.push(DrawCommand::Circle {
                        cx: run[0].x,
                        cy: run[0].y,
                        r: 1.5,
                        color: Color::HIGHLIGHT.with_opacity(0.8),
                    });
                } else {
                    out.push(DrawCommand::line(run, Color::HIGHLIGHT.with_opacity(0.8), 3.0));
                }
            }
            for (x, prev_y, cur_y) in markers {
                out.push(DrawCommand::segment(
                    Point::new(x, prev_y),
                    Point::new(x, cur_y),
                    Color::MARKER.with_opacity(0.7),
                    2.0,
                ));
                out.push(DrawCommand::Circle {
                    cx: x,
                    cy: cur_y,
                    r: 3.0,
                    color: Color::HIGHLIGHT.with_opacity(0.9),
                });
            }

            // only the first three chunks on screen are captioned
            if shown <= 3 && chunk_width > 50.0 {
                out.push(DrawCommand::Rect {
                    x: start_x + 10.0,
                    y: center - 47.0,
                    w: 92.0,
                    h: 16.0,
                    color: Color::BLACK.with_opacity(0.8),
                });
                out.push(DrawCommand::text(
                    start_x + 14.0,
                    center - 35.0,
                    format!("Chunk {} vs {}", k + 2, k + 1),
                    TextStyle::new(9.0, Color::WHITE),
                ));
            }
        }

        let legend = [
            format!("XOR: {}", channel.name),
            "Dashed: previous chunk".to_owned(),
            "Solid: current chunk".to_owned(),
            "Red: significant differences".to_owned(),
        ];
        for (row, line) in legend.into_iter().enumerate() {
            out.push(DrawCommand::text(
                10.0,
                16.0 + row as f32 * 13.0,
                line,
                TextStyle::new(if row == 0 { 12.0 } else { 10.0 }, Color::LABEL),
            ));
        }
        Ok(out)
    }
}
