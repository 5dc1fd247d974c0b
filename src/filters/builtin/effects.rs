//! Effect filters: drop shadow and rounded corners.

use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{Color, ImageRef};
use crate::filters::registry::ProcessorRegistry;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use std::sync::Arc;

/// Register effect filters.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(Shadow));
    registry.register(|| Box::new(RoundedCorner));
}

/// Blurred alpha below this fraction is cleared entirely.
const ALPHA_CUTOFF: f32 = 0.01;

// ============================================================================
// Shadow
// ============================================================================

/// Casts a soft drop shadow behind each image.
///
/// The silhouette comes from the image's alpha channel, tinted with
/// `shadow_color` (whose alpha scales the silhouette), blurred with sigma
/// `shadow_radius` and then pushed through a power curve so faint edges
/// fade out instead of leaving a gray halo. The canvas grows by twice the
/// radius on every side.
#[derive(Debug, Clone)]
pub struct Shadow;

impl Processor for Shadow {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("shadow", "Shadow")
            .description("Drop shadow from the image's alpha silhouette")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("shadow_color", Color::new(0, 0, 0, 180)))
            .parameter(
                ParameterDefinition::new("shadow_radius", 30)
                    .with_description("Blur radius; 0 disables the shadow"),
            )
            .parameter(
                ParameterDefinition::new("shadow_falloff", 1.5)
                    .with_description("Gamma applied to the blurred alpha; higher fades edges faster"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let color = ctx.get_color("shadow_color", Color::new(0, 0, 0, 180))?;
        let radius = ctx.get_int("shadow_radius", 30);
        let falloff = ctx.get_float("shadow_falloff", 1.5) as f32;

        let images: Vec<ImageRef> = ctx
            .buffer()?
            .iter()
            .map(|img| {
                if radius <= 0 {
                    Arc::clone(img)
                } else {
                    Arc::new(DynamicImage::ImageRgba8(cast_shadow(img, color, radius as u32, falloff)))
                }
            })
            .collect();

        ctx.commit(images)
    }
}

/// Render `image` over its own blurred silhouette.
pub fn cast_shadow(image: &DynamicImage, color: Color, radius: u32, falloff: f32) -> RgbaImage {
    let original = image.to_rgba8();
    let padding = radius * 2;
    let (width, height) = original.dimensions();

    let mut layer = RgbaImage::from_pixel(
        width + padding * 2,
        height + padding * 2,
        Rgba([color.r, color.g, color.b, 0]),
    );
    for (x, y, pixel) in original.enumerate_pixels() {
        let alpha = (u16::from(pixel[3]) * u16::from(color.a) / 255) as u8;
        layer.put_pixel(x + padding, y + padding, Rgba([color.r, color.g, color.b, alpha]));
    }

    let mut shadow = imageproc::filter::gaussian_blur_f32(&layer, radius as f32);
    for pixel in shadow.pixels_mut() {
        let alpha = (pixel[3] as f32 / 255.0).powf(falloff);
        pixel[3] = if alpha < ALPHA_CUTOFF {
            0
        } else {
            (alpha * 255.0) as u8
        };
    }

    imageops::overlay(&mut shadow, &original, i64::from(padding), i64::from(padding));
    shadow
}

// ============================================================================
// Rounded Corner
// ============================================================================

/// Rounds the corners of each image with a CSS-style `border_radius`.
///
/// The rounded-rectangle mask becomes the image's alpha channel, so the
/// output is RGBA and opaque inside the shape.
#[derive(Debug, Clone)]
pub struct RoundedCorner;

impl Processor for RoundedCorner {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("rounded_corner", "Rounded Corner")
            .description("Mask the image to a rounded rectangle")
            .category(Category::Filter)
            .parameter(ParameterDefinition::new("border_radius", 0).with_description("Corner radius in pixels"))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let radius = ctx.get_int("border_radius", 0).max(0) as u32;

        let images: Vec<ImageRef> = ctx
            .buffer()?
            .iter()
            .map(|img| Arc::new(DynamicImage::ImageRgba8(round_corners(img, radius))))
            .collect();

        ctx.commit(images)
    }
}

/// Whether pixel `(x, y)` lies inside a `width`×`height` rounded rectangle.
fn inside_rounded_rect(x: u32, y: u32, width: u32, height: u32, radius: u32) -> bool {
    if radius == 0 {
        return true;
    }
    let r = radius as f32;
    let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
    let cx = if px < r {
        r
    } else if px > width as f32 - r {
        width as f32 - r
    } else {
        return true;
    };
    let cy = if py < r {
        r
    } else if py > height as f32 - r {
        height as f32 - r
    } else {
        return true;
    };
    (px - cx).powi(2) + (py - cy).powi(2) <= r * r
}

/// Apply a rounded-rectangle alpha mask. The radius is clamped to half the
/// shorter side.
pub fn round_corners(image: &DynamicImage, radius: u32) -> RgbaImage {
    let mut output = image.to_rgba8();
    let (width, height) = output.dimensions();
    let radius = radius.min(width.min(height) / 2);
    for (x, y, pixel) in output.enumerate_pixels_mut() {
        pixel[3] = if inside_rounded_rect(x, y, width, height, radius) {
            255
        } else {
            0
        };
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StageSpec;
    use image::{GenericImageView, RgbImage};

    fn run(processor: &dyn Processor, spec: StageSpec, image: ImageRef) -> Vec<ImageRef> {
        let mut ctx = PipelineContext::new(spec);
        ctx.replace_buffer(vec![image]);
        processor.process(&mut ctx).unwrap();
        ctx.take_buffer().unwrap()
    }

    #[test]
    fn test_zero_radius_shadow_is_noop() {
        let image: ImageRef = Arc::new(DynamicImage::ImageRgb8(RgbImage::new(5, 5)));
        let out = run(&Shadow, StageSpec::new("shadow").with("shadow_radius", 0), Arc::clone(&image));
        assert_eq!(out.len(), 1);
        assert!(Arc::ptr_eq(&out[0], &image));
    }

    #[test]
    fn test_shadow_pads_and_fades() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 20, Rgba([255, 0, 0, 255])));
        let out = cast_shadow(&image, Color::new(0, 0, 0, 180), 4, 1.5);

        assert_eq!(out.dimensions(), (36, 36));
        // original on top
        assert_eq!(out.get_pixel(18, 18), &Rgba([255, 0, 0, 255]));
        // shadow just outside the image, nothing at the far corner
        assert!(out.get_pixel(7, 18)[3] > 0);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        // never darker than the configured opacity
        assert!(out.pixels().filter(|p| p[0] == 0).all(|p| p[3] <= 180));
    }

    #[test]
    fn test_rounded_corner_masks_corners() {
        let image: ImageRef = Arc::new(DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, image::Rgb([9, 9, 9]))));
        let out = run(&RoundedCorner, StageSpec::new("rounded_corner").with("border_radius", 8), image);
        let out = &out[0];

        assert_eq!(out.color(), image::ColorType::Rgba8);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(39, 19)[3], 0);
        assert_eq!(out.get_pixel(8, 8), Rgba([9, 9, 9, 255]));
        assert_eq!(out.get_pixel(20, 0)[3], 255);
    }

    #[test]
    fn test_radius_is_clamped() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let out = round_corners(&image, 1000);
        assert_eq!(out.get_pixel(5, 5)[3], 255);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }
}
