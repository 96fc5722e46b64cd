use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use log::{info, warn};
use plotters::element::DashedPathElement;
use plotters::prelude::{
    BitMapBackend, Circle, IntoDrawingArea, IntoFont, PathElement, RGBAColor, Rectangle, Text,
    WHITE,
};
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::{Color as _, FontTransform};

use crate::signal::{Color, ViewerError};
use crate::viewer::render::{DrawCommand, Point, Surface, TextAlign};

fn rgba(c: Color) -> RGBAColor {
    RGBAColor(c.r, c.g, c.b, c.opacity() as f64)
}

fn pixel(p: Point) -> (i32, i32) {
    (p.x.round() as i32, p.y.round() as i32)
}

/// Rasterises a command list onto a white RGB canvas and encodes it as PNG.
pub fn render_png(commands: &[DrawCommand], surface: Surface) -> Result<Vec<u8>, ViewerError> {
    let width = surface.width.round().max(1.0) as u32;
    let height = surface.height.round().max(1.0) as u32;
    let mut buffer = vec![0u8; (width * height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE)?;
        for command in commands {
            match command {
                DrawCommand::Polyline {
                    points,
                    color,
                    width,
                    dash,
                } => {
                    let style = rgba(*color).stroke_width(width.round().max(1.0) as u32);
                    let path: Vec<(i32, i32)> = points.iter().copied().map(pixel).collect();
                    match dash {
                        Some(d) if d.on >= 1.0 => {
                            root.draw(&DashedPathElement::new(path, d.on, d.off.max(0.0), style))?;
                        }
                        _ => root.draw(&PathElement::new(path, style))?,
                    }
                }
                DrawCommand::Rect { x, y, w, h, color } => {
                    let top_left = pixel(Point::new(*x, *y));
                    let bottom_right = pixel(Point::new(x + w, y + h));
                    root.draw(&Rectangle::new([top_left, bottom_right], rgba(*color).filled()))?;
                }
                DrawCommand::Circle { cx, cy, r, color } => {
                    root.draw(&Circle::new(
                        pixel(Point::new(*cx, *cy)),
                        r.round().max(1.0) as u32,
                        rgba(*color).filled(),
                    ))?;
                }
                DrawCommand::Text { x, y, text, style } => {
                    let pos = match style.align {
                        TextAlign::Left => Pos::new(HPos::Left, VPos::Bottom),
                        TextAlign::Center => Pos::new(HPos::Center, VPos::Center),
                        TextAlign::Right => Pos::new(HPos::Right, VPos::Bottom),
                    };
                    let mut font = ("sans-serif", style.size as f64)
                        .into_font()
                        .color(&rgba(style.color))
                        .pos(pos);
                    if style.vertical {
                        font = font.transform(FontTransform::Rotate270);
                    }
                    // headless hosts may have no system font; the picture is still useful
                    if let Err(e) = root.draw(&Text::new(text.clone(), pixel(Point::new(*x, *y)), font)) {
                        warn!("skipping label {text:?}: {e:?}");
                    }
                }
            }
        }
        root.present()?;
    }
    encode_png(&buffer, width, height)
}

pub fn save_png(path: &Path, commands: &[DrawCommand], surface: Surface) -> Result<(), ViewerError> {
    let png = render_png(commands, surface)?;
    std::fs::write(path, png)?;
    info!("saved snapshot to {}", path.display());
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ViewerError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| ViewerError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
