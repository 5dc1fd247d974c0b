//! Generators: solid fills, gradients and image loading.
//!
//! Generators ignore their incoming buffer and replace it with freshly
//! produced images.

use crate::core::context::{open_image, PipelineContext};
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{Color, Direction, Easing, ImageRef, Value};
use crate::filters::registry::ProcessorRegistry;
use image::{DynamicImage, RgbaImage};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

/// Register generators.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(SolidColor));
    registry.register(|| Box::new(GradientColor));
    registry.register(|| Box::new(ImageLoader));
}

/// Read a required, positive dimension.
fn dimension(ctx: &PipelineContext, key: &str) -> Result<u32, ExecutionError> {
    match ctx.get(key).and_then(Value::as_integer) {
        Some(v) if v > 0 && v <= i64::from(u32::MAX) => Ok(v as u32),
        Some(v) => Err(ctx.invalid_parameter(key, format!("must be a positive size, got {}", v))),
        None => Err(ctx.invalid_parameter(key, "missing")),
    }
}

// ============================================================================
// Solid Color
// ============================================================================

/// A uniformly filled RGBA image.
#[derive(Debug, Clone)]
pub struct SolidColor;

impl Processor for SolidColor {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("solid_color", "Solid Color")
            .description("Generate an image filled with one color")
            .category(Category::Generator)
            .parameter(ParameterDefinition::new("width", Value::Null))
            .parameter(ParameterDefinition::new("height", Value::Null))
            .parameter(ParameterDefinition::new("color", Color::TRANSPARENT))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let width = dimension(ctx, "width")?;
        let height = dimension(ctx, "height")?;
        let color = ctx.get_color("color", Color::TRANSPARENT)?;

        let image = RgbaImage::from_pixel(width, height, color.to_rgba());
        ctx.commit(vec![Arc::new(DynamicImage::ImageRgba8(image))])
    }
}

// ============================================================================
// Gradient Color
// ============================================================================

/// A two-color gradient along a direction, shaped by an easing curve.
#[derive(Debug, Clone)]
pub struct GradientColor;

impl Processor for GradientColor {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("gradient_color", "Gradient Color")
            .description("Generate a linear, diagonal or radial two-color gradient")
            .category(Category::Generator)
            .parameter(ParameterDefinition::new("width", Value::Null))
            .parameter(ParameterDefinition::new("height", Value::Null))
            .parameter(ParameterDefinition::new("start_color", Color::BLACK))
            .parameter(ParameterDefinition::new("end_color", Color::WHITE))
            .parameter(
                ParameterDefinition::new("direction", "horizontal")
                    .with_description("horizontal, vertical, diagonal or radial"),
            )
            .parameter(
                ParameterDefinition::new("interpolate_method", "linear")
                    .with_description("linear, ease_in, ease_out or ease_in_out"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let width = dimension(ctx, "width")?;
        let height = dimension(ctx, "height")?;
        let start = ctx.get_color("start_color", Color::BLACK)?;
        let end = ctx.get_color("end_color", Color::WHITE)?;
        let direction = ctx.get_enum("direction", Direction::Horizontal);
        let easing = ctx.get_enum("interpolate_method", Easing::Linear);

        let image = draw_gradient(width, height, start, end, direction, easing);
        ctx.commit(vec![Arc::new(DynamicImage::ImageRgba8(image))])
    }
}

/// Normalized progress of pixel `(x, y)` along `direction`.
fn progress(x: u32, y: u32, width: u32, height: u32, direction: Direction) -> f32 {
    match direction {
        Direction::Horizontal if width > 1 => x as f32 / (width - 1) as f32,
        Direction::Vertical if height > 1 => y as f32 / (height - 1) as f32,
        Direction::Diagonal if width + height > 2 => (x + y) as f32 / (width + height - 2) as f32,
        Direction::Radial => {
            let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
            let max = (cx * cx + cy * cy).sqrt();
            if max == 0.0 {
                0.0
            } else {
                let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                (d / max).clamp(0.0, 1.0)
            }
        }
        _ => 0.0,
    }
}

/// Render a gradient; rows are filled in parallel.
pub fn draw_gradient(
    width: u32,
    height: u32,
    start: Color,
    end: Color,
    direction: Direction,
    easing: Easing,
) -> RgbaImage {
    let from = [start.r, start.g, start.b, start.a].map(f32::from);
    let to = [end.r, end.g, end.b, end.a].map(f32::from);

    let mut image = RgbaImage::new(width, height);
    let stride = width as usize * 4;
    if stride == 0 {
        return image;
    }
    image.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            let t = easing.apply(progress(x as u32, y as u32, width, height, direction));
            for c in 0..4 {
                pixel[c] = (from[c] + (to[c] - from[c]) * t).clamp(0.0, 255.0) as u8;
            }
        }
    });
    image
}

// ============================================================================
// Image Loader
// ============================================================================

/// Loads one image, or a list of images, from `path` into the buffer.
#[derive(Debug, Clone)]
pub struct ImageLoader;

impl Processor for ImageLoader {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("image", "Image")
            .description("Load images from disk into the buffer")
            .category(Category::Generator)
            .parameter(
                ParameterDefinition::new("path", Value::Null).with_description("A path or a list of paths"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let images: Vec<ImageRef> = match ctx.get("path") {
            Some(Value::String(path)) => vec![open_image(Path::new(path))?],
            Some(Value::List(paths)) => paths
                .iter()
                .map(|p| match p.as_str() {
                    Some(path) => open_image(Path::new(path)),
                    None => Err(ctx.invalid_parameter("path", format!("expected a path, got {}", p))),
                })
                .collect::<Result<_, _>>()?,
            _ => return Err(ctx.invalid_parameter("path", "expected a path or a list of paths")),
        };
        ctx.commit(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StageSpec;
    use image::{GenericImageView, Rgba};
    use proptest::prelude::*;

    fn run(processor: &dyn Processor, spec: StageSpec) -> Result<Vec<ImageRef>, ExecutionError> {
        let mut ctx = PipelineContext::new(spec);
        processor.process(&mut ctx)?;
        ctx.take_buffer()
    }

    #[test]
    fn test_solid_color() {
        let out = run(
            &SolidColor,
            StageSpec::new("solid_color").with("width", 100).with("height", 50).with("color", "red"),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].dimensions(), (100, 50));
        assert!(out[0].to_rgba8().pixels().all(|p| *p == Rgba([255, 0, 0, 255])));
    }

    #[test]
    fn test_solid_color_requires_size() {
        let err = run(&SolidColor, StageSpec::new("solid_color").with("width", 10)).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidParameter { ref parameter, .. } if parameter == "height"));
    }

    #[test]
    fn test_gradient_directions() {
        let start = Color::new(0, 0, 0, 255);
        let end = Color::new(200, 100, 50, 255);

        let vertical = draw_gradient(3, 5, start, end, Direction::Vertical, Easing::Linear);
        assert_eq!(vertical.get_pixel(2, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(vertical.get_pixel(0, 4), &Rgba([200, 100, 50, 255]));
        assert_eq!(vertical.get_pixel(1, 2), &Rgba([100, 50, 25, 255]));

        let diagonal = draw_gradient(4, 4, start, end, Direction::Diagonal, Easing::Linear);
        assert_eq!(diagonal.get_pixel(3, 3), &Rgba([200, 100, 50, 255]));
        assert_eq!(diagonal.get_pixel(3, 0), diagonal.get_pixel(0, 3));

        let radial = draw_gradient(10, 10, start, end, Direction::Radial, Easing::Linear);
        assert_eq!(radial.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
        assert!(radial.get_pixel(0, 0)[0] > 180);
    }

    #[test]
    fn test_easing_bends_midpoint() {
        let linear = draw_gradient(11, 1, Color::BLACK, Color::WHITE, Direction::Horizontal, Easing::Linear);
        let ease_in = draw_gradient(11, 1, Color::BLACK, Color::WHITE, Direction::Horizontal, Easing::EaseIn);
        assert!(ease_in.get_pixel(5, 0)[0] < linear.get_pixel(5, 0)[0]);
        assert_eq!(ease_in.get_pixel(10, 0)[0], 255);
    }

    #[test]
    fn test_gradient_stage_resolves_names_and_values() {
        let out = run(
            &GradientColor,
            StageSpec::new("gradient_color")
                .with("width", 4)
                .with("height", 6)
                .with("start_color", "white")
                .with("end_color", "black")
                .with("direction", "VERTICAL")
                .with("interpolate_method", "ease_out"),
        )
        .unwrap();
        let img = out[0].to_rgba8();
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(0, 5), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_image_loader() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.png");
        let b = dir.path().join("b.png");
        RgbaImage::new(3, 2).save(&a).unwrap();
        RgbaImage::new(1, 1).save(&b).unwrap();

        let single = run(&ImageLoader, StageSpec::new("image").with("path", a.to_str().unwrap())).unwrap();
        assert_eq!(single[0].dimensions(), (3, 2));

        let paths = vec![Value::from(a.to_str().unwrap()), Value::from(b.to_str().unwrap())];
        let many = run(&ImageLoader, StageSpec::new("image").with("path", paths)).unwrap();
        assert_eq!(many.len(), 2);

        let missing = run(&ImageLoader, StageSpec::new("image").with("path", "/no/such/file.png"));
        assert!(matches!(missing, Err(ExecutionError::Io { .. })));
    }

    proptest! {
        #[test]
        fn prop_linear_gradient_hits_endpoints(
            width in 2u32..64,
            a in any::<[u8; 4]>(),
            b in any::<[u8; 4]>(),
        ) {
            let start = Color::new(a[0], a[1], a[2], a[3]);
            let end = Color::new(b[0], b[1], b[2], b[3]);
            let img = draw_gradient(width, 2, start, end, Direction::Horizontal, Easing::Linear);
            prop_assert_eq!(img.get_pixel(0, 1), &start.to_rgba());
            prop_assert_eq!(img.get_pixel(width - 1, 1), &end.to_rgba());
        }
    }
}
