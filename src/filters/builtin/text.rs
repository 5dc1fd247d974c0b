//! Text generators.
//!
//! Text is rasterized once at a large base size and then normalized to the
//! requested height by a nested `trim` + `resize` pipeline, so every
//! segment of a row shares the same cap-height regardless of font metrics.

use crate::core::color::parse_color;
use crate::core::context::PipelineContext;
use crate::core::error::ExecutionError;
use crate::core::node::{Category, ParameterDefinition, Processor, ProcessorMetadata};
use crate::core::types::{Color, ImageRef, Params, StageSpec, Value};
use crate::execution::engine::ExecutionOptions;
use crate::filters::registry::ProcessorRegistry;
use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use image::{DynamicImage, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Register text generators.
pub fn register(registry: &mut ProcessorRegistry) {
    registry.register(|| Box::new(RichText));
    registry.register(|| Box::new(MultiRichText));
}

/// Pixel size text is rasterized at before scaling.
pub const BASE_FONT_SIZE: f32 = 512.0;

/// Bold faces render this much taller to match regular cap-height.
pub const BOLD_HEIGHT_FACTOR: f64 = 1.13;

/// Fonts tried when nothing else resolves.
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

// ============================================================================
// Text Segment
// ============================================================================

/// One run of uniformly styled text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    /// Text to draw; empty text renders a single space.
    pub text: String,
    /// Font file, resolved through [`resolve_font`].
    pub font_path: Option<String>,
    /// Target height in pixels.
    pub height: f64,
    /// Render slightly taller to match regular weight.
    pub is_bold: bool,
    /// Fill color.
    pub color: Color,
    /// Trim whitespace above and below the glyphs before scaling.
    pub trim: bool,
}

impl Default for TextSegment {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_path: None,
            height: 100.0,
            is_bold: false,
            color: Color::BLACK,
            trim: false,
        }
    }
}

impl TextSegment {
    /// Read a segment from stage parameters or a `text_segments` entry.
    pub fn from_params(params: &Params) -> Result<Self, ExecutionError> {
        let get = |key: &str| params.get(key).filter(|v| !v.is_null());
        let defaults = Self::default();
        Ok(Self {
            text: match get("text") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            },
            font_path: get("font_path").and_then(Value::as_str).map(str::to_string),
            height: get("height").and_then(Value::as_float).unwrap_or(defaults.height),
            is_bold: get("is_bold").and_then(Value::as_bool).unwrap_or(false),
            color: match get("color") {
                Some(value) => parse_color(value)?,
                None => defaults.color,
            },
            trim: get("trim").and_then(Value::as_bool).unwrap_or(false),
        })
    }

    /// Height the rendered segment is resized to.
    pub fn target_height(&self) -> f64 {
        if self.is_bold {
            self.height * BOLD_HEIGHT_FACTOR
        } else {
            self.height
        }
    }
}

// ============================================================================
// Fonts
// ============================================================================

fn font_cache() -> &'static Mutex<HashMap<PathBuf, Arc<FontVec>>> {
    static FONTS: OnceLock<Mutex<HashMap<PathBuf, Arc<FontVec>>>> = OnceLock::new();
    FONTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Find the font file for `requested`.
///
/// A requested path is tried as given (absolute or relative to the working
/// directory), then under each configured font directory, then next to the
/// executable. Failing that, the configured default font and then common
/// system fonts are used.
pub fn resolve_font(requested: Option<&str>, options: &ExecutionOptions) -> Result<PathBuf, ExecutionError> {
    if let Some(requested) = requested {
        let path = Path::new(requested);
        let mut candidates = vec![path.to_path_buf()];
        if path.is_relative() {
            candidates.extend(options.font_dirs.iter().map(|dir| dir.join(path)));
            if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
                candidates.push(dir.join(path));
            }
        }
        if let Some(found) = candidates.into_iter().find(|c| c.is_file()) {
            return Ok(found);
        }
        log::warn!("Font {} not found, falling back", requested);
    }

    if let Some(default) = options.default_font.as_ref().filter(|p| p.is_file()) {
        return Ok(default.clone());
    }
    SYSTEM_FONTS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
        .ok_or_else(|| ExecutionError::Font {
            path: requested.unwrap_or("<default>").to_string(),
            error: "no usable font found; set pipeline.default_font".to_string(),
        })
}

/// Load and cache a font file.
pub fn load_font(path: &Path) -> Result<Arc<FontVec>, ExecutionError> {
    if let Some(font) = font_cache().lock().get(path) {
        return Ok(Arc::clone(font));
    }

    let font_error = |error: String| ExecutionError::Font {
        path: path.display().to_string(),
        error,
    };
    let bytes = std::fs::read(path).map_err(|e| font_error(e.to_string()))?;
    let font = Arc::new(FontVec::try_from_vec(bytes).map_err(|e| font_error(e.to_string()))?);
    font_cache().lock().insert(path.to_path_buf(), Arc::clone(&font));
    Ok(font)
}

/// Rasterize `text` at [`BASE_FONT_SIZE`] onto a transparent canvas.
///
/// The canvas spans the advance width and the full ascent-to-descent line
/// height.
pub fn rasterize(font: &FontVec, text: &str, color: Color) -> RgbaImage {
    let text = if text.is_empty() { " " } else { text };
    let scale = PxScale::from(BASE_FONT_SIZE);
    let scaled = font.as_scaled(scale);

    let mut caret = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    let mut glyphs = Vec::with_capacity(text.len());
    for ch in text.chars() {
        let id = scaled.glyph_id(ch);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, scaled.ascent())));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }

    let width = caret.ceil().max(1.0) as u32;
    let height = (scaled.ascent() - scaled.descent()).ceil().max(1.0) as u32;
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([color.r, color.g, color.b, 0]));
    for glyph in glyphs {
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|x, y, coverage| {
            let px = bounds.min.x as i64 + i64::from(x);
            let py = bounds.min.y as i64 + i64::from(y);
            if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                return;
            }
            let pixel = canvas.get_pixel_mut(px as u32, py as u32);
            let alpha = (coverage.clamp(0.0, 1.0) * f32::from(color.a)) as u8;
            pixel[3] = pixel[3].max(alpha);
        });
    }
    canvas
}

/// Render a segment and normalize it to its target height.
pub fn render_segment(ctx: &PipelineContext, segment: &TextSegment) -> Result<ImageRef, ExecutionError> {
    let path = resolve_font(segment.font_path.as_deref(), ctx.options())?;
    let font = load_font(&path)?;
    let raster = rasterize(&font, &segment.text, segment.color);

    let pipeline = vec![
        StageSpec::new("trim")
            .with("trim_top", segment.trim)
            .with("trim_bottom", segment.trim),
        StageSpec::new("resize").with("height", segment.target_height()),
    ];
    let mut images = ctx.subpipeline(pipeline, vec![Arc::new(DynamicImage::ImageRgba8(raster))])?;
    if images.is_empty() {
        return Err(ExecutionError::EmptyBuffer {
            stage: ctx.stage_name().to_string(),
        });
    }
    Ok(images.swap_remove(0))
}

// ============================================================================
// Rich Text
// ============================================================================

/// Renders one text segment taken from the stage's own parameters.
#[derive(Debug, Clone)]
pub struct RichText;

impl Processor for RichText {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("rich_text", "Rich Text")
            .description("Render a line of text normalized to a pixel height")
            .category(Category::Generator)
            .parameter(ParameterDefinition::new("text", ""))
            .parameter(ParameterDefinition::new("font_path", Value::Null))
            .parameter(ParameterDefinition::new("height", 100))
            .parameter(ParameterDefinition::new("is_bold", false))
            .parameter(ParameterDefinition::new("color", "black"))
            .parameter(
                ParameterDefinition::new("trim", false).with_description("Trim space above and below the glyphs"),
            )
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let segment = TextSegment::from_params(ctx.params())?;
        let image = render_segment(ctx, &segment)?;
        ctx.commit(vec![image])
    }
}

// ============================================================================
// Multi Rich Text
// ============================================================================

/// Renders several segments at a common height and concatenates them.
#[derive(Debug, Clone)]
pub struct MultiRichText;

impl Processor for MultiRichText {
    fn metadata(&self) -> ProcessorMetadata {
        ProcessorMetadata::builder("multi_rich_text", "Multi Rich Text")
            .description("Render a row of differently styled text segments")
            .category(Category::Generator)
            .parameter(
                ParameterDefinition::new("text_segments", Value::List(Vec::new()))
                    .with_description("List of segment maps (text, font_path, is_bold, color, trim)"),
            )
            .parameter(ParameterDefinition::new("height", 100))
            .parameter(ParameterDefinition::new("text_alignment", "BOTTOM"))
            .parameter(ParameterDefinition::new("text_spacing", 0))
            .parameter(ParameterDefinition::new("text_direction", "horizontal"))
            .build()
    }

    fn process(&self, ctx: &mut PipelineContext) -> Result<(), ExecutionError> {
        let height = ctx.get_float("height", 100.0);
        let mut images = Vec::new();
        for entry in ctx.get_list("text_segments") {
            let params = entry
                .as_map()
                .ok_or_else(|| ctx.invalid_parameter("text_segments", format!("expected a map, got {}", entry)))?;
            let segment = TextSegment {
                height,
                ..TextSegment::from_params(params)?
            };
            images.push(render_segment(ctx, &segment)?);
        }

        let concat = StageSpec::new("concat")
            .with("alignment", ctx.get("text_alignment").cloned().unwrap_or_else(|| "BOTTOM".into()))
            .with("direction", ctx.get("text_direction").cloned().unwrap_or_else(|| "horizontal".into()))
            .with("spacing", ctx.get_int("text_spacing", 0));
        let merged = ctx.subpipeline(vec![concat], images)?;
        ctx.commit(merged)
    }
}

/// DejaVu Sans Mono, checked in for tests that rasterize.
#[cfg(test)]
pub(crate) const FIXTURE_FONT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/DejaVuSansMono.ttf");

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    fn render(spec: StageSpec) -> Vec<ImageRef> {
        let mut ctx = PipelineContext::new(spec);
        RichText.process(&mut ctx).unwrap();
        ctx.take_buffer().unwrap()
    }

    #[test]
    fn test_segment_from_params() {
        let params: Params = [
            ("text".to_string(), Value::from("ISO 100")),
            ("height".to_string(), Value::from(40)),
            ("is_bold".to_string(), Value::from(true)),
            ("color".to_string(), Value::from("#ff0000")),
        ]
        .into_iter()
        .collect();
        let segment = TextSegment::from_params(&params).unwrap();

        assert_eq!(segment.text, "ISO 100");
        assert_eq!(segment.color, Color::RED);
        assert!((segment.target_height() - 45.2).abs() < 1e-9);
        assert!(!segment.trim);

        let bad: Params = [("color".to_string(), Value::from("nope"))].into_iter().collect();
        assert!(TextSegment::from_params(&bad).unwrap_err().is_configuration_error());
    }

    #[test]
    fn test_resolve_font_search_order() {
        let dir = tempfile::tempdir().unwrap();
        let fonts = dir.path().join("fonts");
        std::fs::create_dir(&fonts).unwrap();
        std::fs::write(fonts.join("brand.ttf"), b"x").unwrap();
        std::fs::write(dir.path().join("fallback.ttf"), b"x").unwrap();

        let options = ExecutionOptions {
            font_dirs: vec![fonts.clone()],
            ..ExecutionOptions::default()
        }
        .with_default_font(dir.path().join("fallback.ttf"));

        assert_eq!(resolve_font(Some("brand.ttf"), &options).unwrap(), fonts.join("brand.ttf"));
        assert_eq!(
            resolve_font(Some("missing.ttf"), &options).unwrap(),
            dir.path().join("fallback.ttf")
        );
    }

    #[test]
    fn test_invalid_font_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        std::fs::write(&path, b"not a font").unwrap();
        assert!(matches!(load_font(&path), Err(ExecutionError::Font { .. })));
    }

    #[test]
    fn test_fixture_font_rasterizes() {
        let font = load_font(Path::new(FIXTURE_FONT)).unwrap();
        let raster = rasterize(&font, "8", Color::RED);

        assert!(raster.height() + 1 >= BASE_FONT_SIZE as u32);
        assert!(raster.pixels().any(|p| p[3] == 255));
        assert!(raster.pixels().all(|p| p[0] == 255 && p[1] == 0));
        // cached instance is shared
        assert!(Arc::ptr_eq(&font, &load_font(Path::new(FIXTURE_FONT)).unwrap()));
    }

    #[test]
    fn test_rich_text_height() {
        let out = render(
            StageSpec::new("rich_text")
                .with("text", "f/2.8")
                .with("height", 30)
                .with("font_path", FIXTURE_FONT)
                .with("trim", true),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].height(), 30);
        assert!(out[0].width() > 0);
    }

    #[test]
    fn test_bold_renders_taller() {
        let spec = StageSpec::new("rich_text")
            .with("text", "ISO")
            .with("height", 100)
            .with("font_path", FIXTURE_FONT);

        let regular = render(spec.clone());
        let bold = render(spec.with("is_bold", true));

        assert_eq!(regular[0].height(), 100);
        assert_eq!(bold[0].height(), 113);
        assert!(bold[0].width() > regular[0].width());
    }

    #[test]
    fn test_multi_rich_text_concatenates() {
        let font = FIXTURE_FONT;
        let segment = |text: &str| {
            Value::Map(
                [
                    ("text".to_string(), Value::from(text)),
                    ("font_path".to_string(), Value::from(font)),
                ]
                .into_iter()
                .collect(),
            )
        };
        let mut ctx = PipelineContext::new(
            StageSpec::new("multi_rich_text")
                .with("text_segments", vec![segment("50mm"), segment("1/250s")])
                .with("height", 20)
                .with("text_spacing", 8),
        );
        MultiRichText.process(&mut ctx).unwrap();
        let out = ctx.take_buffer().unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].height(), 20);
        assert!(out[0].dimensions().0 > 8);
    }
}
