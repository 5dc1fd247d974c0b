//! Built-in processor implementations.
//!
//! This module contains the filters, generators and mergers that ship with
//! Passepartout.

mod blur;
mod transform;
mod margin;
mod watermark;
mod effects;
mod generators;
mod text;
mod composite;

use crate::filters::registry::ProcessorRegistry;

/// Register all built-in processors.
pub fn register_all(registry: &mut ProcessorRegistry) {
    blur::register(registry);
    transform::register(registry);
    margin::register(registry);
    watermark::register(registry);
    effects::register(registry);
    generators::register(registry);
    text::register(registry);
    composite::register(registry);
}

// Re-export for direct access
pub use blur::Blur;
pub use transform::{foreground_bbox, BoundingBox, Resize, Trim, TrimSides};
pub use margin::{pad, parse_ratio, Insets, Margin, MarginWithRatio, RATIO_TOLERANCE};
pub use watermark::{FooterLayout, Watermark, WatermarkWithTimestamp};
pub use effects::{cast_shadow, round_corners, RoundedCorner, Shadow};
pub use generators::{draw_gradient, GradientColor, ImageLoader, SolidColor};
pub use text::{load_font, rasterize, resolve_font, MultiRichText, RichText, TextSegment, BASE_FONT_SIZE};
pub use composite::{concat, AlignmentMerger, Concat, Placement};
