//! Margin filters: fixed padding and padding to an aspect ratio.

use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{Color, ImageRef, Value};
use crate::filters::registry::ProcessorRegistry;
use image::{imageops, DynamicImage, RgbImage, RgbaImage};
use std::sync::Arc;

/// Register margin filters.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(Margin));
    registry.register(|| Box::new(MarginWithRatio));
}

/// Current and target ratios closer than this are considered equal.
pub const RATIO_TOLERANCE: f64 = 0.01;

/// Pixel amounts added on each side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Insets {
    /// Left edge.
    pub left: u32,
    /// Right edge.
    pub right: u32,
    /// Top edge.
    pub top: u32,
    /// Bottom edge.
    pub bottom: u32,
}

/// Expand `image` by `insets`, filling the new area with `color`.
///
/// Images with an alpha channel come back as RGBA, all others as RGB.
pub fn pad(image: &DynamicImage, insets: Insets, color: Color) -> DynamicImage {
    let width = image.width() + insets.left + insets.right;
    let height = image.height() + insets.top + insets.bottom;
    let (x, y) = (i64::from(insets.left), i64::from(insets.top));

    if image.color().has_alpha() {
        let mut canvas = RgbaImage::from_pixel(width, height, color.to_rgba());
        imageops::replace(&mut canvas, &image.to_rgba8(), x, y);
        DynamicImage::ImageRgba8(canvas)
    } else {
        let mut canvas = RgbImage::from_pixel(width, height, color.to_rgb());
        imageops::replace(&mut canvas, &image.to_rgb8(), x, y);
        DynamicImage::ImageRgb8(canvas)
    }
}

// ============================================================================
// Margin
// ============================================================================

/// Pads every image by explicit per-side amounts.
#[derive(Debug, Clone)]
pub struct Margin;

impl Processor for Margin {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("margin", "Margin")
            .description("Add a colored border of explicit width on each side")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("left_margin", 0))
            .parameter(ParameterDefinition::new("right_margin", 0))
            .parameter(ParameterDefinition::new("top_margin", 0))
            .parameter(ParameterDefinition::new("bottom_margin", 0))
            .parameter(ParameterDefinition::new("margin_color", "white").with_description("Fill color"))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        // negative margins count as zero
        let side = |key: &str| {
            let value = ctx.get_int(key, 0).max(0);
            u32::try_from(value).map_err(|_| ctx.invalid_parameter(key, format!("margin {} is too large", value)))
        };
        let insets = Insets {
            left: side("left_margin")?,
            right: side("right_margin")?,
            top: side("top_margin")?,
            bottom: side("bottom_margin")?,
        };
        let color = ctx.get_color("margin_color", Color::WHITE)?;

        let images: Vec<ImageRef> = ctx
            .buffer()?
            .iter()
            .map(|img| Arc::new(pad(img, insets, color)))
            .collect();

        ctx.commit(images)
    }
}

// ============================================================================
// Margin With Ratio
// ============================================================================

/// Pads images so their aspect ratio matches a target.
///
/// The target is the `ratio` parameter (`"w:h"`), else the photo's native
/// ratio from metadata, else the first image's own ratio. Wide images gain
/// height, narrow ones width, split evenly over the two opposing sides.
/// The padding is then applied by [`Margin`] with the stage's other
/// parameters, so `margin_color` and the untouched axis still apply.
#[derive(Debug, Clone)]
pub struct MarginWithRatio;

/// Parse a `"w:h"` ratio.
pub fn parse_ratio(value: &str) -> Option<f64> {
    let (w, h) = value.split_once(':')?;
    let w: f64 = w.trim().parse().ok()?;
    let h: f64 = h.trim().parse().ok()?;
    (w > 0.0 && h > 0.0).then(|| w / h)
}

fn metadata_ratio(ctx: &PipelineContext) -> Option<f64> {
    let dimension = |key: &str| {
        ctx.metadata()
            .get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| *v > 0.0)
    };
    Some(dimension("ImageWidth")? / dimension("ImageHeight")?)
}

impl Processor for MarginWithRatio {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("margin_with_ratio", "Margin With Ratio")
            .description("Pad images to a target aspect ratio")
            .category(Category::Filter)
            .parameter(
                ParameterDefinition::new("ratio", Value::Null)
                    .with_description("Target ratio as \"w:h\"; defaults to the photo's native ratio"),
            )
            .parameter(ParameterDefinition::new("margin_color", "white"))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let Some(first) = ctx.buffer()?.first().cloned() else {
            ctx.mark_done(true);
            return Ok(());
        };
        let (width, height) = (first.width() as f64, first.height() as f64);
        if width == 0.0 || height == 0.0 {
            return Err(ExecutionError::EmptyBuffer {
                stage: ctx.stage_name().to_string(),
            });
        }

        let explicit = match ctx.get("ratio").and_then(Value::as_str) {
            Some(text) => Some(parse_ratio(text).ok_or_else(|| ctx.invalid_parameter("ratio", text))?),
            None => None,
        };
        let native = metadata_ratio(ctx);
        let target = explicit.or(native).unwrap_or(width / height);
        let current = width / height;

        if current - target > RATIO_TOLERANCE {
            let padding = (width / target) as i64 - height as i64;
            ctx.set("top_margin", padding / 2);
            ctx.set("bottom_margin", padding - padding / 2);
        } else if target - current > RATIO_TOLERANCE {
            let padding = (height * target) as i64 - width as i64;
            ctx.set("left_margin", padding / 2);
            ctx.set("right_margin", padding - padding / 2);
        } else {
            log::debug!("{}: ratio {:.3} already matches", ctx.stage_name(), current);
            ctx.mark_done(true);
            return Ok(());
        }

        Margin.process(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::Metadata;
    use crate::core::types::StageSpec;
    use image::{GenericImageView, Rgb, Rgba};

    fn run(processor: &dyn Processor, mut ctx: PipelineContext, image: DynamicImage) -> DynamicImage {
        ctx.replace_buffer(vec![Arc::new(image)]);
        processor.process(&mut ctx).unwrap();
        (*ctx.take_buffer().unwrap()[0]).clone()
    }

    #[test]
    fn test_margin_places_original() {
        let spec = StageSpec::new("margin")
            .with("left_margin", 10)
            .with("right_margin", 10)
            .with("top_margin", 5)
            .with("bottom_margin", 5)
            .with("margin_color", "white");
        let src = DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([10, 20, 30])));
        let out = run(&Margin, PipelineContext::new(spec), src);

        assert_eq!(out.dimensions(), (120, 110));
        assert_eq!(out.color(), image::ColorType::Rgb8);
        let rgb = out.to_rgb8();
        assert_eq!(rgb.get_pixel(9, 4), &Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(10, 5), &Rgb([10, 20, 30]));
        assert_eq!(rgb.get_pixel(109, 104), &Rgb([10, 20, 30]));
        assert_eq!(rgb.get_pixel(110, 105), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_margin_keeps_alpha() {
        let spec = StageSpec::new("margin").with("left_margin", 2).with("margin_color", "transparent");
        let src = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([1, 2, 3, 255])));
        let out = run(&Margin, PipelineContext::new(spec), src);
        assert_eq!(out.color(), image::ColorType::Rgba8);
        assert_eq!(out.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(out.get_pixel(2, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_oversized_margin_is_rejected() {
        let mut ctx = PipelineContext::new(StageSpec::new("margin").with("top_margin", i64::from(u32::MAX) + 1));
        ctx.replace_buffer(vec![Arc::new(DynamicImage::new_rgb8(2, 2))]);
        let err = Margin.process(&mut ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameter { ref parameter, .. } if parameter == "top_margin"));
    }

    #[test]
    fn test_parse_ratio() {
        assert_eq!(parse_ratio("3:2"), Some(1.5));
        assert_eq!(parse_ratio(" 1 : 1 "), Some(1.0));
        assert_eq!(parse_ratio("16x9"), None);
        assert_eq!(parse_ratio("0:1"), None);
    }

    #[test]
    fn test_ratio_pads_height_of_wide_image() {
        let spec = StageSpec::new("margin_with_ratio").with("ratio", "1:1");
        let src = DynamicImage::ImageRgb8(RgbImage::new(100, 75));
        let out = run(&MarginWithRatio, PipelineContext::new(spec), src);
        assert_eq!(out.dimensions(), (100, 100));
        // odd padding splits 12 / 13
        assert_eq!(out.to_rgb8().get_pixel(50, 11), &Rgb([255, 255, 255]));
        assert_eq!(out.to_rgb8().get_pixel(50, 12), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_ratio_from_metadata_pads_width() {
        let metadata: Metadata = [
            ("ImageWidth".to_string(), "6000".to_string()),
            ("ImageHeight".to_string(), "4000".to_string()),
        ]
        .into_iter()
        .collect();
        let ctx = PipelineContext::new(StageSpec::new("margin_with_ratio")).with_metadata(Arc::new(metadata));
        let out = run(&MarginWithRatio, ctx, DynamicImage::ImageRgb8(RgbImage::new(100, 100)));
        assert_eq!(out.dimensions(), (150, 100));
    }

    #[test]
    fn test_ratio_within_tolerance_is_noop() {
        let spec = StageSpec::new("margin_with_ratio").with("ratio", "3:2");
        let src = DynamicImage::ImageRgb8(RgbImage::new(301, 200));
        let out = run(&MarginWithRatio, PipelineContext::new(spec), src);
        assert_eq!(out.dimensions(), (301, 200));
    }

    #[test]
    fn test_malformed_ratio_is_rejected() {
        let mut ctx = PipelineContext::new(StageSpec::new("margin_with_ratio").with("ratio", "wide"));
        ctx.replace_buffer(vec![Arc::new(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))]);
        let err = MarginWithRatio.process(&mut ctx).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameter { .. }));
    }
}
