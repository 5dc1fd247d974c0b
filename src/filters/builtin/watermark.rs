//! Watermark filters: the framed footer band and the timestamp overlay.

use crate::core::context::{open_image, PipelineContext};
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{Color, ImageRef, StageSpec, Value};
use crate::filters::registry::ProcessorRegistry;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;

/// Register watermark filters.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(Watermark));
    registry.register(|| Box::new(WatermarkWithTimestamp));
}

/// Text block keys, in layout order.
const BLOCKS: [&str; 4] = ["left_top", "left_bottom", "right_top", "right_bottom"];

/// Footer band height as a fraction of the photo height.
const BAND_RATIO: f64 = 0.12;

/// Gap between stacked blocks as a fraction of the band.
const MIDDLE_SPACING_RATIO: f64 = 0.05;

/// Default block height as a fraction of the band.
const BLOCK_HEIGHT_RATIO: f64 = 0.3;

/// Horizontal spacing as a fraction of the canvas width.
const COMMON_SPACING_RATIO: f64 = 0.02;

// ============================================================================
// Watermark
// ============================================================================

/// Frames the photo and lays out a footer band.
///
/// The band holds up to four text blocks, each a nested stage
/// specification rendered on its own: `left_top` over `left_bottom`, and
/// `right_top` over `right_bottom` right-aligned against the right margin.
/// Left and right rows share their baselines. Optional logos:
/// `left_logo` fills the band height at the left, `center_logo` sits in the
/// middle of the band and `right_logo` is placed left of the right column
/// behind a vertical `delimiter_color` divider.
#[derive(Debug, Clone)]
pub struct Watermark;

/// Measured footer geometry, all in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterLayout {
    /// Canvas width.
    pub canvas_width: i64,
    /// Canvas height.
    pub canvas_height: i64,
    /// First row of the band.
    pub footer_y: i64,
    /// Horizontal gap unit.
    pub common_spacing: i64,
    /// Height of the taller stacked column, gap included.
    pub elem_height: i64,
    /// Space above and below the stacked columns inside the band.
    pub elem_margin: i64,
}

/// Sizes of the four blocks; missing blocks are `(0, 0)`.
type BlockSizes = [(i64, i64); 4];

impl FooterLayout {
    fn new(image: (u32, u32), margins: [i64; 4], middle_spacing: i64, blocks: &BlockSizes) -> Self {
        let [left, right, top, bottom] = margins;
        let canvas_width = i64::from(image.0) + left + right;
        let canvas_height = i64::from(image.1) + top + bottom;
        let [lt, lb, rt, rb] = blocks;
        let elem_height = (lt.1 + lb.1).max(rt.1 + rb.1) + middle_spacing;
        Self {
            canvas_width,
            canvas_height,
            footer_y: top + i64::from(image.1),
            common_spacing: (COMMON_SPACING_RATIO * canvas_width as f64) as i64,
            elem_height,
            elem_margin: (bottom - elem_height) / 2,
        }
    }

    /// Top-left corners of the four blocks.
    fn block_positions(&self, left_x: i64, right_margin: i64, middle_spacing: i64, blocks: &BlockSizes) -> [(i64, i64); 4] {
        let [lt, lb, rt, rb] = blocks;
        let right_end = self.canvas_width - right_margin;
        let lt_y = self.canvas_height - (self.elem_margin + lb.1 + middle_spacing + lt.1);
        let lb_y = self.canvas_height - (self.elem_margin + lb.1);
        [
            (left_x, lt_y),
            (left_x, lb_y),
            (right_end - rt.0 - self.common_spacing, lt_y + lt.1 - rt.1),
            (right_end - rb.0 - self.common_spacing, lb_y + lb.1 - rb.1),
        ]
    }
}

fn scale_to_height(image: &DynamicImage, height: i64) -> RgbaImage {
    let height = height.max(1) as u32;
    let width = ((image.width() as f64 * height as f64 / image.height().max(1) as f64) as u32).max(1);
    image.resize_exact(width, height, FilterType::Lanczos3).to_rgba8()
}

fn load_logo(ctx: &PipelineContext, key: &str) -> Result<Option<ImageRef>, ExecutionError> {
    match ctx.get(key).and_then(Value::as_str).filter(|p| !p.is_empty()) {
        Some(path) => Ok(Some(open_image(Path::new(path))?)),
        None => Ok(None),
    }
}

impl Watermark {
    fn render_block(ctx: &PipelineContext, key: &str, default_height: i64) -> Result<Option<ImageRef>, ExecutionError> {
        let Some(value) = ctx.get(key) else {
            return Ok(None);
        };
        let mut spec = StageSpec::from_value(value)?;
        if !spec.params.contains_key("height") {
            spec.params.insert("height".to_string(), Value::from(default_height));
        }
        Ok(ctx.subpipeline(vec![spec], Vec::new())?.into_iter().next())
    }

    fn decorate(&self, ctx: &PipelineContext, image: &DynamicImage) -> Result<DynamicImage, ExecutionError> {
        let color = ctx.get_color("color", Color::WHITE)?;
        let delimiter_color = ctx.get_color("delimiter_color", Color::BLACK)?;
        let left_margin = ctx.get_int("left_margin", 0);
        let right_margin = ctx.get_int("right_margin", 0);
        let top_margin = ctx.get_int("top_margin", 0);
        let bottom_margin = ctx.get_int("bottom_margin", (f64::from(image.height()) * BAND_RATIO) as i64);
        let middle_spacing = ctx.get_int("middle_spacing", (bottom_margin as f64 * MIDDLE_SPACING_RATIO) as i64);

        let block_height = (bottom_margin as f64 * BLOCK_HEIGHT_RATIO) as i64;
        let mut blocks: [Option<ImageRef>; 4] = Default::default();
        for (slot, key) in blocks.iter_mut().zip(BLOCKS) {
            *slot = Self::render_block(ctx, key, block_height)?;
        }
        let sizes: BlockSizes = blocks
            .each_ref()
            .map(|b| b.as_ref().map_or((0, 0), |i| (i64::from(i.width()), i64::from(i.height()))));

        let layout = FooterLayout::new(
            image.dimensions(),
            [left_margin, right_margin, top_margin, bottom_margin],
            middle_spacing,
            &sizes,
        );
        if layout.canvas_width <= 0 || layout.canvas_height <= 0 {
            return Err(ctx.invalid_parameter("bottom_margin", "margins leave no canvas"));
        }
        let mut canvas = RgbaImage::from_pixel(
            layout.canvas_width as u32,
            layout.canvas_height as u32,
            color.to_rgba(),
        );
        imageops::replace(&mut canvas, &image.to_rgba8(), left_margin, top_margin);

        let mut left_logo_width = 0;
        if let Some(logo) = load_logo(ctx, "left_logo")? {
            let logo = scale_to_height(&logo, bottom_margin);
            left_logo_width = i64::from(logo.width());
            imageops::overlay(&mut canvas, &logo, left_margin, layout.footer_y);
        }

        if let Some(logo) = load_logo(ctx, "center_logo")? {
            let height = match ctx.get_int("center_logo_height", 0) {
                h if h > 0 => h,
                _ => bottom_margin,
            };
            let logo = scale_to_height(&logo, height);
            let x = (layout.canvas_width - i64::from(logo.width())).div_euclid(2);
            let y = layout.footer_y + (bottom_margin - i64::from(logo.height())).div_euclid(2);
            imageops::overlay(&mut canvas, &logo, x, y);
        }

        let left_x = left_margin + left_logo_width + layout.common_spacing;
        let positions = layout.block_positions(left_x, right_margin, middle_spacing, &sizes);
        for (block, (x, y)) in blocks.iter().zip(positions) {
            if let Some(block) = block {
                imageops::overlay(&mut canvas, &block.to_rgba8(), x, y);
            }
        }

        if let Some(logo) = load_logo(ctx, "right_logo")? {
            let size = layout.elem_height;
            let delimiter_width = (layout.canvas_width as f64 * 0.005) as i64;
            let delimiter_height = (size as f64 * 1.1) as i64;
            let right_column = sizes[2].0.max(sizes[3].0);
            let delimiter_x =
                layout.canvas_width - right_margin - right_column - 2 * layout.common_spacing - delimiter_width;
            let delimiter_y = (layout.footer_y as f64 + layout.elem_margin as f64 - size as f64 * 0.05) as i64;
            if delimiter_width > 0 && delimiter_height > 0 {
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(delimiter_x as i32, delimiter_y as i32)
                        .of_size(delimiter_width as u32, delimiter_height as u32),
                    delimiter_color.to_rgba(),
                );
            }

            let logo = scale_to_height(&logo, size);
            let x = delimiter_x - layout.common_spacing - i64::from(logo.width());
            imageops::overlay(&mut canvas, &logo, x, layout.footer_y + layout.elem_margin);
        }

        Ok(DynamicImage::ImageRgba8(canvas))
    }
}

impl Processor for Watermark {
    fn metadata(&self) -> ProcessorMetadata {
        let mut builder = ProcessorMetadata::builder("watermark", "Watermark")
            .description("Frame the photo with a footer band of text blocks and logos")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("color", "white").with_description("Frame color"))
            .parameter(ParameterDefinition::new("delimiter_color", "black"))
            .parameter(ParameterDefinition::new("left_margin", 0))
            .parameter(ParameterDefinition::new("right_margin", 0))
            .parameter(ParameterDefinition::new("top_margin", 0))
            .parameter(
                ParameterDefinition::new("bottom_margin", Value::Null)
                    .with_description("Footer band height; 12% of the photo height when unset"),
            )
            .parameter(
                ParameterDefinition::new("middle_spacing", Value::Null)
                    .with_description("Gap between stacked blocks; 5% of the band when unset"),
            );
        for key in BLOCKS {
            builder = builder.parameter(
                ParameterDefinition::new(key, Value::Null).with_description("Nested stage specification"),
            );
        }
        builder
            .parameter(ParameterDefinition::new("left_logo", Value::Null))
            .parameter(ParameterDefinition::new("right_logo", Value::Null))
            .parameter(ParameterDefinition::new("center_logo", Value::Null))
            .parameter(ParameterDefinition::new("center_logo_height", Value::Null))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let images = ctx.buffer()?.to_vec();
        let shared: &PipelineContext = ctx;
        let decorated = images
            .iter()
            .map(|img| self.decorate(shared, img).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        ctx.commit(decorated)
    }
}

// ============================================================================
// Watermark With Timestamp
// ============================================================================

/// Stamps a `multi_rich_text` row near the bottom-right corner.
///
/// The stage's own parameters are the row's parameters; `height` defaults
/// to 2% of the photo height. The row ends at 93% of the width and starts
/// at 95% of the height.
#[derive(Debug, Clone)]
pub struct WatermarkWithTimestamp;

impl Processor for WatermarkWithTimestamp {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("watermark_with_timestamp", "Watermark With Timestamp")
            .description("Overlay a text row in the bottom-right corner")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("text_segments", Value::List(Vec::new())))
            .parameter(
                ParameterDefinition::new("height", Value::Null)
                    .with_description("Text height; 2% of the photo height when unset"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let images = ctx.buffer()?.to_vec();
        let mut stamped = Vec::with_capacity(images.len());
        for img in &images {
            let mut spec = StageSpec::new("multi_rich_text");
            spec.params = ctx.params().clone();
            spec.params.shift_remove("save_buffer");
            spec.params.shift_remove("output");
            if !ctx.contains("height") {
                spec.params.insert("height".to_string(), Value::from((f64::from(img.height()) * 0.02) as i64));
            }
            let Some(text) = ctx.subpipeline(vec![spec], Vec::new())?.into_iter().next() else {
                stamped.push(Arc::clone(img));
                continue;
            };

            let x = (f64::from(img.width()) * 0.93) as i64 - i64::from(text.width());
            let y = (f64::from(img.height()) * 0.95) as i64;
            let mut canvas = img.to_rgba8();
            imageops::overlay(&mut canvas, &text.to_rgba8(), x, y);
            let out = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(canvas)
            } else {
                DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas).to_rgb8())
            };
            stamped.push(Arc::new(out));
        }
        ctx.commit(stamped)
    }
}
