//! Geometric filters: resize and trim.

use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{ImageRef, Value};
use crate::filters::registry::ProcessorRegistry;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use rayon::prelude::*;
use std::sync::Arc;

/// Register transform filters.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(Resize));
    registry.register(|| Box::new(Trim));
}

// ============================================================================
// Resize
// ============================================================================

/// Resizes images to an explicit size or by a scale factor.
///
/// Width and height together give an exact size. Either alone, or `scale`,
/// resizes proportionally. With none of them the stage reports failure and
/// leaves the buffer untouched.
#[derive(Debug, Clone)]
pub struct Resize;

fn positive(ctx: &PipelineContext, key: &str) -> Option<f64> {
    ctx.get(key).and_then(Value::as_float).filter(|v| *v > 0.0)
}

impl Processor for Resize {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("resize", "Resize")
            .description("Resize images to a target size or by a scale factor (Lanczos3)")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("width", Value::Null).with_description("Target width"))
            .parameter(ParameterDefinition::new("height", Value::Null).with_description("Target height"))
            .parameter(
                ParameterDefinition::new("scale", Value::Null)
                    .with_description("Scale factor, used when neither width nor height is set"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let width = positive(ctx, "width");
        let height = positive(ctx, "height");
        let scale = positive(ctx, "scale");

        let images = ctx.buffer()?.to_vec();
        let mut resized = Vec::with_capacity(images.len());
        for img in &images {
            let (w, h) = (img.width() as f64, img.height() as f64);
            let target = match (width, height, scale) {
                (Some(tw), Some(th), _) => (tw, th),
                (Some(tw), None, _) => (tw, h * tw / w),
                (None, Some(th), _) => (w * th / h, th),
                (None, None, Some(s)) => (w * s, h * s),
                (None, None, None) => {
                    log::warn!("{}: no width, height or scale given", ctx.stage_name());
                    ctx.mark_done(false);
                    return Ok(());
                }
            };
            let (tw, th) = ((target.0 as u32).max(1), (target.1 as u32).max(1));
            resized.push(Arc::new(img.resize_exact(tw, th, FilterType::Lanczos3)));
        }

        ctx.commit(resized)
    }
}

// ============================================================================
// Trim
// ============================================================================

/// Sides of the crop box that may shrink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimSides {
    /// Shrink from the left.
    pub left: bool,
    /// Shrink from the right.
    pub right: bool,
    /// Shrink from the top.
    pub top: bool,
    /// Shrink from the bottom.
    pub bottom: bool,
}

impl TrimSides {
    /// All four sides.
    pub const ALL: TrimSides = TrimSides {
        left: true,
        right: true,
        top: true,
        bottom: true,
    };
}

/// A crop box as `(left, top, right, bottom)`, right and bottom exclusive.
pub type BoundingBox = (u32, u32, u32, u32);

/// Crops uniform background off the edges of each image.
///
/// The background is the mean of the four corner pixels. A row or column
/// belongs to the foreground when any of its pixels lies further than
/// `threshold` from the background (Euclidean distance over the image's
/// own channels). Images with no area are dropped from the buffer.
#[derive(Debug, Clone)]
pub struct Trim;

impl Processor for Trim {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("trim", "Trim")
            .description("Crop background-colored borders")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("trim_left", true))
            .parameter(ParameterDefinition::new("trim_right", true))
            .parameter(ParameterDefinition::new("trim_top", true))
            .parameter(ParameterDefinition::new("trim_bottom", true))
            .parameter(
                ParameterDefinition::new("threshold", 10.0)
                    .with_description("Color distance above which a pixel is foreground"),
            )
            .parameter(
                ParameterDefinition::new("padding", 0)
                    .with_description("Pixels kept around the foreground on trimmed sides"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let sides = TrimSides {
            left: ctx.get_bool("trim_left", true),
            right: ctx.get_bool("trim_right", true),
            top: ctx.get_bool("trim_top", true),
            bottom: ctx.get_bool("trim_bottom", true),
        };
        let threshold = ctx.get_float("threshold", 10.0) as f32;
        let padding = ctx.get_int("padding", 0).max(0) as u32;

        let images: Vec<ImageRef> = ctx
            .buffer()?
            .iter()
            .filter(|img| img.width() > 0 && img.height() > 0)
            .map(|img| {
                let (left, top, right, bottom) = foreground_bbox(img, threshold, padding, sides);
                if (left, top, right, bottom) == (0, 0, img.width(), img.height()) {
                    Arc::clone(img)
                } else {
                    Arc::new(img.crop_imm(left, top, right - left, bottom - top))
                }
            })
            .collect();

        ctx.commit(images)
    }
}

/// Foreground bounding box of `image`.
///
/// Returns the full image when nothing differs from the background.
/// Disabled sides keep the image edge; padding widens enabled sides and is
/// clamped to the image.
pub fn foreground_bbox(image: &DynamicImage, threshold: f32, padding: u32, sides: TrimSides) -> BoundingBox {
    let (width, height) = image.dimensions();
    let full = (0, 0, width, height);
    if width == 0 || height == 0 {
        return full;
    }

    let rgba = image.to_rgba8();
    let mut channels: Vec<usize> = if image.color().has_color() {
        vec![0, 1, 2]
    } else {
        vec![0]
    };
    if image.color().has_alpha() {
        channels.push(3);
    }

    let corners = [
        rgba.get_pixel(0, 0),
        rgba.get_pixel(width - 1, 0),
        rgba.get_pixel(0, height - 1),
        rgba.get_pixel(width - 1, height - 1),
    ];
    let background: Vec<f32> = channels
        .iter()
        .map(|&c| corners.iter().map(|p| p[c] as f32).sum::<f32>() / 4.0)
        .collect();

    let exceeds = |pixel: &[u8]| -> bool {
        let distance: f32 = channels
            .iter()
            .zip(&background)
            .map(|(&c, &bg)| (pixel[c] as f32 - bg).powi(2))
            .sum::<f32>()
            .sqrt();
        distance > threshold
    };

    let stride = width as usize * 4;
    let raw = rgba.as_raw();
    let (rows, columns) = (0..height as usize)
        .into_par_iter()
        .fold(
            || (Vec::new(), vec![false; width as usize]),
            |(mut rows, mut columns), y| {
                let row = &raw[y * stride..(y + 1) * stride];
                let mut hit = false;
                for (x, pixel) in row.chunks_exact(4).enumerate() {
                    if exceeds(pixel) {
                        columns[x] = true;
                        hit = true;
                    }
                }
                if hit {
                    rows.push(y as u32);
                }
                (rows, columns)
            },
        )
        .reduce(
            || (Vec::new(), vec![false; width as usize]),
            |(mut rows, mut columns), (other_rows, other_columns)| {
                rows.extend(other_rows);
                for (a, b) in columns.iter_mut().zip(other_columns) {
                    *a |= b;
                }
                (rows, columns)
            },
        );

    let (Some(&top), Some(&bottom)) = (rows.iter().min(), rows.iter().max()) else {
        return full;
    };
    let left = columns.iter().position(|&c| c).unwrap_or(0) as u32;
    let right = columns.iter().rposition(|&c| c).map(|x| x as u32 + 1).unwrap_or(width);
    let bottom = bottom + 1;

    (
        if sides.left { left.saturating_sub(padding) } else { 0 },
        if sides.top { top.saturating_sub(padding) } else { 0 },
        if sides.right { (right + padding).min(width) } else { width },
        if sides.bottom { (bottom + padding).min(height) } else { height },
    )
}
