//! Mergers: linear concatenation and free-form alignment.
//!
//! Both take the whole accumulated buffer as input and produce exactly one
//! RGBA image.

use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{Alignment, Color, Direction, ImageRef, ParamEnum, Params, Value};
use crate::filters::registry::ProcessorRegistry;
use image::{imageops, DynamicImage, RgbaImage};
use std::sync::Arc;

/// Register mergers. Concat comes first.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(Concat));
    registry.register(|| Box::new(AlignmentMerger));
}

fn non_empty(ctx: &mut PipelineContext) -> Result<Vec<ImageRef>, ExecutionError> {
    let images = ctx.buffer()?.to_vec();
    if images.is_empty() {
        return Err(ExecutionError::EmptyBuffer {
            stage: ctx.stage_name().to_string(),
        });
    }
    Ok(images)
}

// ============================================================================
// Concat
// ============================================================================

/// Lays images out in a row or column.
///
/// `alignment` positions each image on the cross axis; `TOP`/`MIDDLE`/
/// `BOTTOM` and `LEFT`/`CENTER`/`RIGHT` are aliases of start/center/end.
#[derive(Debug, Clone)]
pub struct Concat;

impl Processor for Concat {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("concat", "Concat")
            .description("Concatenate all buffered images along an axis")
            .category(Category::Merger)
            .parameter(ParameterDefinition::new("direction", "horizontal"))
            .parameter(ParameterDefinition::new("alignment", "end").with_description("Cross-axis alignment"))
            .parameter(ParameterDefinition::new("spacing", 10).with_description("Gap between images"))
            .parameter(ParameterDefinition::new("background", Color::new(255, 255, 255, 0)))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let direction = ctx.get_enum("direction", Direction::Horizontal);
        let alignment = ctx.get_enum("alignment", Alignment::End);
        let spacing = ctx.get_int("spacing", 10);
        let background = ctx.get_color("background", Color::new(255, 255, 255, 0))?;
        let images = non_empty(ctx)?;

        let canvas = concat(&images, direction == Direction::Vertical, alignment, spacing, background);
        ctx.commit(vec![Arc::new(DynamicImage::ImageRgba8(canvas))])
    }
}

/// Concatenate `images` horizontally, or vertically when `vertical` is set.
pub fn concat(images: &[ImageRef], vertical: bool, alignment: Alignment, spacing: i64, background: Color) -> RgbaImage {
    let main = |img: &ImageRef| if vertical { img.height() } else { img.width() };
    let cross = |img: &ImageRef| if vertical { img.width() } else { img.height() };

    let gaps = spacing * (images.len() as i64 - 1);
    let length = (images.iter().map(|i| i64::from(main(i))).sum::<i64>() + gaps).max(1) as u32;
    let thickness = images.iter().map(|i| cross(i)).max().unwrap_or(0).max(1);
    let (width, height) = if vertical {
        (thickness, length)
    } else {
        (length, thickness)
    };

    let mut canvas = RgbaImage::from_pixel(width, height, background.to_rgba());
    let mut position = 0i64;
    for img in images {
        let offset = alignment.offset(cross(img), thickness);
        let (x, y) = if vertical {
            (offset, position)
        } else {
            (position, offset)
        };
        imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
        position += i64::from(main(img)) + spacing;
    }
    canvas
}

// ============================================================================
// Alignment
// ============================================================================

/// Stacks images on a canvas the size of the largest one.
///
/// Each image is placed by `horizontal_alignment`, `vertical_alignment`,
/// `offset_x` and `offset_y`. Entry `i` of `layers`, a list of maps, can
/// override any of these for image `i`. Later images are drawn on top.
#[derive(Debug, Clone)]
pub struct AlignmentMerger;

/// Placement of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Horizontal alignment on the canvas.
    pub horizontal: Alignment,
    /// Vertical alignment on the canvas.
    pub vertical: Alignment,
    /// Extra horizontal shift in pixels.
    pub offset_x: i64,
    /// Extra vertical shift in pixels.
    pub offset_y: i64,
}

impl Placement {
    fn overridden_by(self, layer: &Params) -> Self {
        let alignment = |key: &str, default| layer.get(key).and_then(Alignment::resolve).unwrap_or(default);
        let offset = |key: &str, default| layer.get(key).and_then(Value::as_integer).unwrap_or(default);
        Self {
            horizontal: alignment("horizontal_alignment", self.horizontal),
            vertical: alignment("vertical_alignment", self.vertical),
            offset_x: offset("offset_x", self.offset_x),
            offset_y: offset("offset_y", self.offset_y),
        }
    }
}

impl Processor for AlignmentMerger {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("alignment", "Alignment")
            .description("Overlay all buffered images with per-image alignment and offsets")
            .category(Category::Merger)
            .parameter(ParameterDefinition::new("horizontal_alignment", "center"))
            .parameter(ParameterDefinition::new("vertical_alignment", "center"))
            .parameter(ParameterDefinition::new("offset_x", 0))
            .parameter(ParameterDefinition::new("offset_y", 0))
            .parameter(
                ParameterDefinition::new("layers", Value::List(Vec::new()))
                    .with_description("Per-image overrides of the four placement keys"),
            )
            .parameter(ParameterDefinition::new("background", Color::TRANSPARENT))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let defaults = Placement {
            horizontal: ctx.get_enum("horizontal_alignment", Alignment::Center),
            vertical: ctx.get_enum("vertical_alignment", Alignment::Center),
            offset_x: ctx.get_int("offset_x", 0),
            offset_y: ctx.get_int("offset_y", 0),
        };
        let background = ctx.get_color("background", Color::TRANSPARENT)?;
        let placements: Vec<Placement> = ctx
            .get_list("layers")
            .iter()
            .map(|layer| layer.as_map().map_or(defaults, |l| defaults.overridden_by(l)))
            .collect();
        let images = non_empty(ctx)?;

        let width = images.iter().map(|i| i.width()).max().unwrap_or(1).max(1);
        let height = images.iter().map(|i| i.height()).max().unwrap_or(1).max(1);
        let mut canvas = RgbaImage::from_pixel(width, height, background.to_rgba());
        for (i, img) in images.iter().enumerate() {
            let place = placements.get(i).copied().unwrap_or(defaults);
            let x = place.horizontal.offset(img.width(), width) + place.offset_x;
            let y = place.vertical.offset(img.height(), height) + place.offset_y;
            imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
        }

        ctx.commit(vec![Arc::new(DynamicImage::ImageRgba8(canvas))])
    }
}
