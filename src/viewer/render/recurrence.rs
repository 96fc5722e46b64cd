use log::debug;
use serde::{Deserialize, Serialize};

use crate::signal::{Color, ViewerError};
use crate::viewer::render::{Colormap, DrawCommand, RenderContext, Renderer, TextStyle};

const MARGIN: f32 = 60.0;
const MIN_CHUNK: usize = 10;
const SCATTER_COLOR: Color = Color { r: 95, g: 40, b: 150, a: 153 };
const TITLE_COLOR: Color = Color::rgb(51, 51, 51);
const COLORBAR_STEPS: usize = 50;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceMode {
    #[default]
    Scatter,
    Heatmap,
}

/// Key identifying what the heatmap has been accumulating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AccumulatorKey {
    pair: (usize, usize),
    bins: usize,
    matrix_len: usize,
    matrix_rate_bits: u32,
}

/// Channel A against channel B over one chunk of samples.
///
/// In heatmap mode bin counts keep accumulating across passes until the pair,
/// bin count, mode or matrix changes.
#[derive(Debug, Default)]
pub struct RecurrenceRenderer {
    counts: Vec<u32>,
    key: Option<AccumulatorKey>,
}

fn bin_of(v: f32, min: f32, range: f32, bins: usize) -> Option<usize> {
    let b = ((v - min) / range * (bins - 1) as f32).floor();
    (b >= 0.0 && b < bins as f32).then_some(b as usize)
}

impl RecurrenceRenderer {
    /// Row-major `bins x bins` counts, row = channel B bin.
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    fn accumulate(&mut self, key: AccumulatorKey, xs: &[f32], ys: &[f32], x_range: (f32, f32), y_range: (f32, f32)) {
        if self.key != Some(key) {
            debug!("heatmap accumulator reset for pair {:?}", key.pair);
            self.counts = vec![0; key.bins * key.bins];
            self.key = Some(key);
        }
        let bins = key.bins;
        for (x, y) in xs.iter().zip(ys) {
            if let (Some(xi), Some(yi)) = (
                bin_of(*x, x_range.0, x_range.1, bins),
                bin_of(*y, y_range.0, y_range.1, bins),
            ) {
                self.counts[yi * bins + xi] += 1;
            }
        }
    }
}

fn min_and_range(values: &[f32]) -> (f32, f32) {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let range = max - min;
    (min, if range > 0.0 { range } else { 1.0 })
}

impl Renderer for RecurrenceRenderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<DrawCommand>, ViewerError> {
        let selected = ctx.selection.selected();
        let (a, b) = match selected.as_slice() {
            [a, b] => (*a, *b),
            _ => {
                return Err(ViewerError::InsufficientData(
                    "select two channels for the recurrence plot".into(),
                ))
            }
        };
        let name_a = ctx.matrix.channel(a).map(|c| c.name.clone()).unwrap_or_default();
        let name_b = ctx.matrix.channel(b).map(|c| c.name.clone()).unwrap_or_default();

        let rate = ctx.matrix.sample_rate_hz();
        let chunk = ((ctx.config.chunk_seconds * rate).round() as usize).max(MIN_CHUNK);
        let (left, _) = ctx.viewport.visible_samples();
        let xs = ctx.matrix.window_at(a, left, left + chunk).to_vec();
        let ys = ctx.matrix.window_at(b, left, left + chunk).to_vec();
        if xs.is_empty() {
            return Err(ViewerError::InsufficientData("no samples in the recurrence window".into()));
        }
        let (x_min, x_range) = min_and_range(&xs);
        let (y_min, y_range) = min_and_range(&ys);

        let plot_w = ctx.surface.width - 2.0 * MARGIN;
        let plot_h = ctx.surface.height - 2.0 * MARGIN;
        let mut out = Vec::new();
        let title = match ctx.config.recurrence_mode {
            RecurrenceMode::Scatter => format!("{name_a} vs {name_b} Recurrence Plot"),
            RecurrenceMode::Heatmap => format!("{name_a} vs {name_b} Recurrence Heatmap"),
        };
        out.push(DrawCommand::text(
            MARGIN + plot_w / 2.0,
            30.0,
            title,
            TextStyle::new(14.0, TITLE_COLOR).centered(),
        ));
        out.push(DrawCommand::text(
            MARGIN + plot_w / 2.0,
            MARGIN + plot_h + 40.0,
            format!("{name_a} Amplitude"),
            TextStyle::new(13.0, TITLE_COLOR).centered(),
        ));
        out.push(DrawCommand::text(
            20.0,
            MARGIN + plot_h / 2.0,
            format!("{name_b} Amplitude"),
            TextStyle::new(13.0, TITLE_COLOR).centered().vertical(),
        ));

        match ctx.config.recurrence_mode {
            RecurrenceMode::Scatter => {
                if self.key.take().is_some() {
                    self.counts.clear();
                }
                for (x, y) in xs.iter().zip(&ys) {
                    let px = MARGIN + (x - x_min) / x_range * plot_w;
                    let py = MARGIN + plot_h - (y - y_min) / y_range * plot_h;
                    out.push(DrawCommand::Rect {
                        x: px.round(),
                        y: py.round(),
                        w: 2.0,
                        h: 2.0,
                        color: SCATTER_COLOR,
                    });
                }
            }
            RecurrenceMode::Heatmap => {
                let bins = ctx.config.heatmap_bins.max(2);
                let key = AccumulatorKey {
                    pair: (a, b),
                    bins,
                    matrix_len: ctx.matrix.len(),
                    matrix_rate_bits: rate.to_bits(),
                };
                self.accumulate(key, &xs, &ys, (x_min, x_range), (y_min, y_range));
                let max = self.counts.iter().copied().max().unwrap_or(0).max(1) as f32;
                let cell_w = plot_w / bins as f32;
                let cell_h = plot_h / bins as f32;
                let colormap = ctx.config.colormap;
                for row in 0..bins {
                    for col in 0..bins {
                        let v = self.counts[row * bins + col] as f32 / max;
                        out.push(DrawCommand::Rect {
                            x: MARGIN + col as f32 * cell_w,
                            y: MARGIN + (bins - row - 1) as f32 * cell_h,
                            w: cell_w + 0.5,
                            h: cell_h + 0.5,
                            color: colormap.map(v),
                        });
                    }
                }
                colorbar(&mut out, colormap, MARGIN + plot_w + 10.0, MARGIN + (plot_h - 150.0) / 2.0);
            }
        }
        Ok(out)
    }

    fn reset(&mut self) {
        self.counts.clear();
        self.key = None;
    }
}

fn colorbar(out: &mut Vec<DrawCommand>, colormap: Colormap, x: f32, y: f32) {
    let (w, h) = (20.0, 150.0);
    let step = h / COLORBAR_STEPS as f32;
    for i in 0..COLORBAR_STEPS {
        out.push(DrawCommand::Rect {
            x,
            y: y + i as f32 * step,
            w,
            h: step + 0.5,
            color: colormap.map(1.0 - i as f32 / COLORBAR_STEPS as f32),
        });
    }
    out.push(DrawCommand::frame(x, y, w, h, TITLE_COLOR, 1.0));
    let style = TextStyle::new(11.0, TITLE_COLOR);
    out.push(DrawCommand::text(x + w + 5.0, y + 10.0, "High", style));
    out.push(DrawCommand::text(x + w + 5.0, y + h - 5.0, "Low", style));
    out.push(DrawCommand::text(x - 10.0, y - 10.0, "Density", style));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::viewer::render::test_support::{matrix, texts, viewport};
    use crate::viewer::render::Surface;
    use crate::viewer::selection::{ChannelSelectionModel, ViewMode};

    fn setup(mode: RecurrenceMode) -> (crate::signal::SampleMatrix, ChannelSelectionModel, RenderConfig) {
        let m = matrix(
            100.0,
            2000,
            &[|i| (i as f32 * 0.05).sin(), |i| (i as f32 * 0.05).cos(), |i| i as f32],
        );
        let mut sel = ChannelSelectionModel::from_matrix(&m);
        sel.set_mode(ViewMode::Recurrence).unwrap();
        let config = RenderConfig {
            recurrence_mode: mode,
            heatmap_bins: 16,
            ..RenderConfig::default()
        };
        (m, sel, config)
    }

    #[test]
    fn heatmap_counts_accumulate_linearly() {
        let (m, sel, config) = setup(RecurrenceMode::Heatmap);
        let vp = viewport(&m, 10.0);
        let ctx = RenderContext {
            matrix: &m,
            viewport: &vp,
            selection: &sel,
            config: &config,
            surface: Surface::new(400.0, 300.0),
        };
        let mut renderer = RecurrenceRenderer::default();
        renderer.render(&ctx).unwrap();
        let once = renderer.counts().to_vec();
        assert_eq!(once.iter().sum::<u32>(), 500);
        renderer.render(&ctx).unwrap();
        renderer.render(&ctx).unwrap();
        let thrice: Vec<u32> = once.iter().map(|c| c * 3).collect();
        assert_eq!(renderer.counts(), thrice.as_slice());
    }

    #[test]
    fn heatmap_restarts_on_pair_change() {
        let (m, mut sel, config) = setup(RecurrenceMode::Heatmap);
        let vp = viewport(&m, 10.0);
        let mut renderer = RecurrenceRenderer::default();
        {
            let ctx = RenderContext {
                matrix: &m,
                viewport: &vp,
                selection: &sel,
                config: &config,
                surface: Surface::new(400.0, 300.0),
            };
            renderer.render(&ctx).unwrap();
            renderer.render(&ctx).unwrap();
        }
        sel.set_pair("ch1", "ch3").unwrap();
        let ctx = RenderContext {
            matrix: &m,
            viewport: &vp,
            selection: &sel,
            config: &config,
            surface: Surface::new(400.0, 300.0),
        };
        let out = renderer.render(&ctx).unwrap();
        assert_eq!(renderer.counts().iter().sum::<u32>(), 500);
        assert!(texts(&out).contains(&"High"));
    }

    #[test]
    fn scatter_draws_one_square_per_sample() {
        let (m, sel, config) = setup(RecurrenceMode::Scatter);
        let vp = viewport(&m, 10.0);
        let ctx = RenderContext {
            matrix: &m,
            viewport: &vp,
            selection: &sel,
            config: &config,
            surface: Surface::new(400.0, 300.0),
        };
        let out = RecurrenceRenderer::default().render(&ctx).unwrap();
        let squares = out
            .iter()
            .filter(|c| matches!(c, DrawCommand::Rect { w, .. } if *w == 2.0))
            .count();
        assert_eq!(squares, 500);
        assert!(texts(&out).contains(&"ch1 vs ch2 Recurrence Plot"));
    }

    #[test]
    fn constant_channels_do_not_divide_by_zero() {
        assert_eq!(min_and_range(&[3.0, 3.0]), (3.0, 1.0));
        assert_eq!(bin_of(3.0, 3.0, 1.0, 8), Some(0));
        assert_eq!(bin_of(4.0, 3.0, 1.0, 8), Some(7));
        assert_eq!(bin_of(2.0, 3.0, 1.0, 8), None);
    }
}
