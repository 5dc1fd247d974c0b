//! Blur filter.

use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::ImageRef;
use crate::filters::registry::ProcessorRegistry;
use image::DynamicImage;
use std::sync::Arc;

/// Register blur filters.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(Blur));
}

/// Applies a Gaussian blur to every image in the buffer.
#[derive(Debug, Clone)]
pub struct Blur;

impl Processor for Blur {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("blur", "Blur")
            .description("Apply a Gaussian blur to every image; output is opaque RGB")
            .category(Category::Filter)
            .parameter(
                ParameterDefinition::new("blur_radius", 5)
                    .with_description("Blur intensity (standard deviation in pixels)"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let radius = ctx.get_float("blur_radius", 5.0) as f32;

        let images: Vec<ImageRef> = ctx
            .buffer()?
            .iter()
            .map(|img| {
                let rgb = img.to_rgb8();
                let blurred = if radius > 0.0 {
                    imageproc::filter::gaussian_blur_f32(&rgb, radius)
                } else {
                    rgb
                };
                Arc::new(DynamicImage::ImageRgb8(blurred))
            })
            .collect();

        ctx.commit(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StageSpec;
    use image::{Rgba, RgbaImage};

    fn run(spec: StageSpec, image: DynamicImage) -> DynamicImage {
        let mut ctx = PipelineContext::new(spec);
        ctx.replace_buffer(vec![Arc::new(image)]);
        Blur.process(&mut ctx).unwrap();
        (*ctx.take_buffer().unwrap()[0]).clone()
    }

    #[test]
    fn test_blur_metadata() {
        let metadata = Blur.metadata();
        assert_eq!(metadata.name, "blur");
        assert_eq!(metadata.category, Category::Filter);
    }

    #[test]
    fn test_blur_spreads_and_drops_alpha() {
        let mut image = RgbaImage::from_pixel(21, 21, Rgba([0, 0, 0, 128]));
        image.put_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let out = run(StageSpec::new("blur").with("blur_radius", 2), DynamicImage::ImageRgba8(image));

        assert_eq!(out.color(), image::ColorType::Rgb8);
        let rgb = out.to_rgb8();
        assert!(rgb.get_pixel(10, 10)[0] < 255);
        assert!(rgb.get_pixel(11, 10)[0] > 0);
        assert_eq!(rgb.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_zero_radius_copies() {
        let image = RgbaImage::from_pixel(3, 3, Rgba([7, 8, 9, 255]));
        let out = run(StageSpec::new("blur").with("blur_radius", 0), DynamicImage::ImageRgba8(image));
        assert!(out.to_rgb8().pixels().all(|p| p.0 == [7, 8, 9]));
    }
}
