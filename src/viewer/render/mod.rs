//! Projections of the visible data into surface-independent draw commands.
//!
//! A renderer never touches a display. It reads the matrix, the viewport and
//! the channel selection and returns a list of [`DrawCommand`]s in a stable
//! order; the GUI and the PNG snapshot translate them to pixels.

mod colormap;
mod polar;
mod recurrence;
mod standard;
mod xor;

pub use colormap::Colormap;
pub use polar::{polar_window, PolarMode, PolarRenderer};
pub use recurrence::{RecurrenceMode, RecurrenceRenderer};
pub use standard::StandardRenderer;
pub use xor::{chunk_differences, XorRenderer};

use serde::Serialize;

use crate::config::RenderConfig;
use crate::signal::matrix::SampleMatrix;
use crate::signal::{Color, ViewerError};
use crate::viewer::selection::{ChannelSelectionModel, ViewMode};
use crate::viewer::viewport::ViewportController;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Dash pattern in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Dash {
    pub on: f32,
    pub off: f32,
}

impl Dash {
    pub const fn new(on: f32, off: f32) -> Self {
        Self { on, off }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TextStyle {
    pub size: f32,
    pub color: Color,
    pub align: TextAlign,
    /// Text drawn rotated a quarter turn counter-clockwise.
    pub vertical: bool,
}

impl TextStyle {
    pub fn new(size: f32, color: Color) -> Self {
        Self {
            size,
            color,
            align: TextAlign::Left,
            vertical: false,
        }
    }

    pub fn centered(mut self) -> Self {
        self.align = TextAlign::Center;
        self
    }

    pub fn right(mut self) -> Self {
        self.align = TextAlign::Right;
        self
    }

    pub fn vertical(mut self) -> Self {
        self.vertical = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DrawCommand {
    Polyline {
        points: Vec<Point>,
        color: Color,
        width: f32,
        dash: Option<Dash>,
    },
    Rect {
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        color: Color,
    },
    Circle {
        cx: f32,
        cy: f32,
        r: f32,
        color: Color,
    },
    Text {
        x: f32,
        y: f32,
        text: String,
        style: TextStyle,
    },
}

impl DrawCommand {
    pub fn line(points: Vec<Point>, color: Color, width: f32) -> Self {
        DrawCommand::Polyline {
            points,
            color,
            width,
            dash: None,
        }
    }

    pub fn dashed(points: Vec<Point>, color: Color, width: f32, dash: Dash) -> Self {
        DrawCommand::Polyline {
            points,
            color,
            width,
            dash: Some(dash),
        }
    }

    pub fn segment(a: Point, b: Point, color: Color, width: f32) -> Self {
        Self::line(vec![a, b], color, width)
    }

    pub fn text(x: f32, y: f32, text: impl Into<String>, style: TextStyle) -> Self {
        DrawCommand::Text {
            x,
            y,
            text: text.into(),
            style,
        }
    }

    /// Outline of an axis-aligned rectangle as a closed polyline.
    pub fn frame(x: f32, y: f32, w: f32, h: f32, color: Color, width: f32) -> Self {
        Self::line(
            vec![
                Point::new(x, y),
                Point::new(x + w, y),
                Point::new(x + w, y + h),
                Point::new(x, y + h),
                Point::new(x, y),
            ],
            color,
            width,
        )
    }
}

/// Pixel size of the target area.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Surface {
    pub width: f32,
    pub height: f32,
}

impl Surface {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Everything a renderer may read for one pass.
pub struct RenderContext<'a> {
    pub matrix: &'a SampleMatrix,
    pub viewport: &'a ViewportController,
    pub selection: &'a ChannelSelectionModel,
    pub config: &'a RenderConfig,
    pub surface: Surface,
}

pub trait Renderer {
    fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<DrawCommand>, ViewerError>;

    /// Drops any state carried between passes.
    fn reset(&mut self) {}
}

/// Centered message shown instead of a projection that cannot be drawn.
pub fn placeholder(surface: Surface, message: &str) -> Vec<DrawCommand> {
    vec![DrawCommand::text(
        surface.width / 2.0,
        surface.height / 2.0,
        message,
        TextStyle::new(16.0, Color::LABEL).centered(),
    )]
}

/// One renderer per mode; the recurrence renderer keeps its heatmap between
/// passes so the set lives as long as the viewer.
#[derive(Default)]
pub struct RendererSet {
    pub standard: StandardRenderer,
    pub xor: XorRenderer,
    pub polar: PolarRenderer,
    pub recurrence: RecurrenceRenderer,
}

impl RendererSet {
    pub fn render(&mut self, ctx: &RenderContext<'_>) -> Result<Vec<DrawCommand>, ViewerError> {
        match ctx.selection.mode() {
            ViewMode::Standard => self.standard.render(ctx),
            ViewMode::Xor => self.xor.render(ctx),
            ViewMode::Polar => self.polar.render(ctx),
            ViewMode::Recurrence => self.recurrence.render(ctx),
        }
    }

    pub fn reset(&mut self) {
        self.standard.reset();
        self.xor.reset();
        self.polar.reset();
        self.recurrence.reset();
    }
}
