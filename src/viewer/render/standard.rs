use crate::signal::{Color, ViewerError};
use crate::viewer::render::{
    Dash, DrawCommand, Point, RenderContext, Renderer, Surface, TextStyle,
};

const TRIAL_COLOR: Color = Color::rgb(255, 107, 107);

/// Stacked traces, one horizontal band per active channel.
#[derive(Debug, Default)]
pub struct StandardRenderer;

/// Background grid: 8 horizontal and 10 vertical divisions, center lines darker.
pub fn grid(surface: Surface) -> Vec<DrawCommand> {
    let mut out = Vec::with_capacity(20);
    for i in 0..=8 {
        let y = i as f32 * surface.height / 8.0;
        let color = if i == 4 { Color::GRID_MAJOR } else { Color::GRID };
        out.push(DrawCommand::segment(
            Point::new(0.0, y),
            Point::new(surface.width, y),
            color,
            1.0,
        ));
    }
    for i in 0..=10 {
        let x = i as f32 * surface.width / 10.0;
        let color = if i == 5 { Color::GRID_MAJOR } else { Color::GRID };
        out.push(DrawCommand::segment(
            Point::new(x, 0.0),
            Point::new(x, surface.height),
            color,
            1.0,
        ));
    }
    out
}

impl Renderer for StandardRenderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<DrawCommand>, ViewerError> {
        let selected = ctx.selection.selected();
        if selected.is_empty() {
            return Err(ViewerError::InsufficientData("no active channels".into()));
        }
        let surface = ctx.surface;
        let band = surface.height / selected.len() as f32;
        let (start, end) = ctx.viewport.visible_samples();
        let visible = (end - start).max(1) as f32;
        let stride = ctx.viewport.samples_per_pixel(surface.width);

        let mut out = grid(surface);
        let step = ctx.viewport.visible_duration() / 10.0;
        for i in 0..10 {
            let t = ctx.viewport.visible_start() + i as f32 * step;
            out.push(DrawCommand::text(
                i as f32 * surface.width / 10.0 + 2.0,
                surface.height - 4.0,
                format!("{t:.1}s"),
                TextStyle::new(10.0, Color::LABEL),
            ));
        }

        for (slot, &index) in selected.iter().enumerate() {
            let Some(channel) = ctx.matrix.channel(index) else {
                continue;
            };
            let center = slot as f32 * band + band / 2.0;
            let max_amp = ctx.matrix.max_amplitude_at(index);
            let window = ctx.matrix.window_at(index, start, end);
            let points: Vec<Point> = window
                .iter()
                .enumerate()
                .step_by(stride)
                .map(|(offset, value)| {
                    let x = offset as f32 / visible * surface.width;
                    let y = center - value / max_amp * band * 0.4;
                    Point::new(x, y)
                })
                .collect();
            if points.len() >= 2 {
                out.push(DrawCommand::line(points, channel.color, 1.5));
            }

            out.push(DrawCommand::Rect {
                x: 6.0,
                y: center - 17.0,
                w: 8.0 * channel.name.chars().count() as f32 + 12.0,
                h: 16.0,
                color: channel.color,
            });
            out.push(DrawCommand::text(
                12.0,
                center - 5.0,
                channel.name.clone(),
                TextStyle::new(11.0, Color::BLACK),
            ));

            if let Some(trial) = ctx.matrix.trial_length() {
                let top = center - band / 2.0;
                let mut boundary = trial;
                while boundary < ctx.matrix.len() {
                    if boundary >= start && boundary <= end {
                        let x = (boundary - start) as f32 / visible * surface.width;
                        out.push(DrawCommand::dashed(
                            vec![Point::new(x, top), Point::new(x, top + band)],
                            TRIAL_COLOR.with_opacity(0.7),
                            1.0,
                            Dash::new(5.0, 5.0),
                        ));
                        out.push(DrawCommand::text(
                            x + 5.0,
                            top + 10.0,
                            format!("T{}", boundary / trial + 1),
                            TextStyle::new(10.0, TRIAL_COLOR),
                        ));
                    }
                    boundary += trial;
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::viewer::render::test_support::{matrix, polylines, texts, viewport};
    use crate::viewer::selection::ChannelSelectionModel;

    fn trace_points(cmd: &DrawCommand) -> &[Point] {
        match cmd {
            DrawCommand::Polyline { points, .. } => points,
            _ => &[],
        }
    }

    #[test]
    fn one_band_per_active_channel() {
        let m = matrix(100.0, 2000, &[|i| (i as f32 * 0.1).sin(), |_| 2.0, |_| -4.0]);
        let vp = viewport(&m, 10.0);
        let sel = ChannelSelectionModel::from_matrix(&m);
        let config = RenderConfig::default();
        let ctx = RenderContext {
            matrix: &m,
            viewport: &vp,
            selection: &sel,
            config: &config,
            surface: Surface::new(500.0, 300.0),
        };
        let out = StandardRenderer.render(&ctx).unwrap();
        // 20 grid lines + 3 traces
        let lines = polylines(&out);
        assert_eq!(lines.len(), 23);

        // 1000 visible samples at 2 samples per pixel -> 500 points
        let second = trace_points(lines[21]);
        assert_eq!(second.len(), 500);
        // constant 2.0 normalized by max 2.0 sits 0.4 band above center (150)
        assert!((second[0].y - (150.0 - 40.0)).abs() < 1e-4);
        let third = trace_points(lines[22]);
        assert!((third[0].y - (250.0 + 40.0)).abs() < 1e-4);
        assert!(second.windows(2).all(|w| w[1].x > w[0].x));

        let labels = texts(&out);
        assert!(labels.contains(&"ch1"));
        assert!(labels.contains(&"0.0s"));
    }

    #[test]
    fn trace_stops_where_data_ends() {
        let m = matrix(100.0, 500, &[|_| 1.0]);
        let vp = viewport(&m, 10.0);
        let sel = ChannelSelectionModel::from_matrix(&m);
        let config = RenderConfig::default();
        let ctx = RenderContext {
            matrix: &m,
            viewport: &vp,
            selection: &sel,
            config: &config,
            surface: Surface::new(1000.0, 200.0),
        };
        let out = StandardRenderer.render(&ctx).unwrap();
        let trace = trace_points(polylines(&out)[20]);
        assert_eq!(trace.len(), 500);
        assert!(trace.last().unwrap().x < 500.0);
    }

    #[test]
    fn trial_boundaries_are_marked() {
        let m = matrix(100.0, 1000, &[|_| 0.5]).with_trial_length(250);
        let vp = viewport(&m, 10.0);
        let sel = ChannelSelectionModel::from_matrix(&m);
        let config = RenderConfig::default();
        let ctx = RenderContext {
            matrix: &m,
            viewport: &vp,
            selection: &sel,
            config: &config,
            surface: Surface::new(1000.0, 200.0),
        };
        let out = StandardRenderer.render(&ctx).unwrap();
        let labels = texts(&out);
        assert!(labels.contains(&"T2"));
        assert!(labels.contains(&"T4"));
        assert!(!labels.contains(&"T5"));
    }
}
