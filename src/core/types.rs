//! Core value types that flow through a pipeline.
//!
//! Stage parameters arrive as loosely-typed JSON-like data. They are held in
//! a closed [`Value`] enum so every accessor can pattern match instead of
//! probing dynamically, and so parameter maps round-trip through serde.

use crate::core::error::ConfigError;
use image::DynamicImage;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared handle to an in-memory image held in a buffer.
///
/// Buffers are snapshotted by the executor (a merger may consume several
/// earlier snapshots), so images are reference counted rather than copied.
pub type ImageRef = Arc<DynamicImage>;

/// Ordered parameter map of a stage.
pub type Params = IndexMap<String, Value>;

/// A loosely-typed parameter value.
///
/// Deserialization is untagged, so plain JSON (`1`, `"red"`, `[1, 2]`,
/// `{"a": 1}`) maps directly onto the matching variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    /// Absent / JSON null
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    List(Vec<Value>),
    /// Nested key-value map
    Map(Params),
}

// ============================================================================
// Value Implementation
// ============================================================================

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Lenient integer conversion.
    ///
    /// Floats are truncated, numeric strings are parsed and booleans map to
    /// 0/1, mirroring how template authors write numbers.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            }
            _ => None,
        }
    }

    /// Lenient float conversion. Integers and numeric strings are accepted.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Try to get this value as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        if let Value::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Try to get this value as a list reference.
    pub fn as_list(&self) -> Option<&Vec<Value>> {
        if let Value::List(list) = self {
            Some(list)
        } else {
            None
        }
    }

    /// Try to get this value as a map reference.
    pub fn as_map(&self) -> Option<&Params> {
        if let Value::Map(map) = self {
            Some(map)
        } else {
            None
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::List(list) => write!(f, "List[{}]", list.len()),
            Value::Map(map) => write!(f, "Map{{{} entries}}", map.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u8> for Value {
    fn from(value: u8) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Params> for Value {
    fn from(value: Params) -> Self {
        Value::Map(value)
    }
}

impl From<Color> for Value {
    fn from(color: Color) -> Self {
        Value::List(vec![
            Value::from(u32::from(color.r)),
            Value::from(u32::from(color.g)),
            Value::from(u32::from(color.b)),
            Value::from(u32::from(color.a)),
        ])
    }
}

// ============================================================================
// Stage Specification
// ============================================================================

/// One entry of a pipeline: a processor name plus its parameters.
///
/// Serialized as the flat JSON object produced by template rendering:
/// `{"processor_name": "margin", "left_margin": 10, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Registered processor name.
    pub processor_name: String,
    /// Every other key of the object.
    #[serde(flatten)]
    pub params: Params,
}

impl StageSpec {
    /// Create a stage with no parameters.
    pub fn new(processor_name: impl Into<String>) -> Self {
        Self {
            processor_name: processor_name.into(),
            params: Params::new(),
        }
    }

    /// Builder-style parameter setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Interpret a nested map value as a stage specification.
    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let map = value.as_map().ok_or_else(|| ConfigError::InvalidStage {
            reason: format!("expected a map, got {}", value),
        })?;
        let processor_name = map
            .get("processor_name")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::InvalidStage {
                reason: "missing 'processor_name'".to_string(),
            })?
            .to_string();
        let params = map
            .iter()
            .filter(|(k, _)| k.as_str() != "processor_name")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Self { processor_name, params })
    }
}

/// Parse a rendered pipeline (a JSON array of stage objects).
pub fn load_pipeline(json: &str) -> Result<Vec<StageSpec>, serde_json::Error> {
    serde_json::from_str(json)
}

// ============================================================================
// Color
// ============================================================================

/// RGBA color value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    /// Create a new color from RGBA components.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Create a color from RGB components (alpha = 255).
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse a hex color string.
    ///
    /// Supports formats: "#RGB", "#RGBA", "#RRGGBB", "#RRGGBBAA"
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim_start_matches('#');
        if !hex.is_ascii() {
            return Err(format!("Invalid hex color: {}", hex));
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16);

        let parsed = match hex.len() {
            3 => (nibble(0), nibble(1), nibble(2), Ok(255)),
            4 => (nibble(0), nibble(1), nibble(2), nibble(3)),
            6 => (byte(0), byte(2), byte(4), Ok(255)),
            8 => (byte(0), byte(2), byte(4), byte(6)),
            _ => {
                return Err(format!(
                    "Invalid hex color format: expected 3, 4, 6, or 8 characters, got {}",
                    hex.len()
                ))
            }
        };
        match parsed {
            (Ok(r), Ok(g), Ok(b), Ok(a)) => Ok(Self::new(r, g, b, a)),
            _ => Err(format!("Invalid hex digits in color: #{}", hex)),
        }
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// Convert to image crate's Rgba type.
    pub fn to_rgba(&self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    /// Convert to image crate's Rgb type, dropping alpha.
    pub fn to_rgb(&self) -> image::Rgb<u8> {
        image::Rgb([self.r, self.g, self.b])
    }

    /// Common colors
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ============================================================================
// Loosely-typed enums
// ============================================================================

/// An enum that stage parameters may name either symbolically or by value.
///
/// `VARIANTS` lists `(name, value, variant)` triples; aliases share a value.
pub trait ParamEnum: Sized + Copy + 'static {
    /// All accepted spellings.
    const VARIANTS: &'static [(&'static str, &'static str, Self)];

    /// Resolve by symbolic name, e.g. `"HORIZONTAL"`.
    fn from_name(name: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(n, _, _)| *n == name)
            .map(|(_, _, v)| *v)
    }

    /// Resolve by underlying value, e.g. `"horizontal"`.
    fn from_value(value: &str) -> Option<Self> {
        Self::VARIANTS
            .iter()
            .find(|(_, v, _)| *v == value)
            .map(|(_, _, v)| *v)
    }

    /// Name first, then value.
    fn resolve(value: &Value) -> Option<Self> {
        let s = value.as_str()?;
        Self::from_name(s).or_else(|| Self::from_value(s))
    }

    /// The underlying value of this variant (the first matching entry).
    fn value(&self) -> &'static str
    where
        Self: PartialEq,
    {
        Self::VARIANTS
            .iter()
            .find(|(_, _, v)| v == self)
            .map(|(_, value, _)| *value)
            .unwrap_or_default()
    }
}

/// Layout / gradient progression direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Left to right.
    Horizontal,
    /// Top to bottom.
    Vertical,
    /// Top-left to bottom-right.
    Diagonal,
    /// Center outwards.
    Radial,
}

impl ParamEnum for Direction {
    const VARIANTS: &'static [(&'static str, &'static str, Self)] = &[
        ("HORIZONTAL", "horizontal", Direction::Horizontal),
        ("VERTICAL", "vertical", Direction::Vertical),
        ("DIAGONAL", "diagonal", Direction::Diagonal),
        ("RADIAL", "radial", Direction::Radial),
    ];
}

/// Cross-axis alignment.
///
/// TOP/MIDDLE/BOTTOM read naturally for horizontal layouts and
/// LEFT/CENTER/RIGHT for vertical ones; they collapse onto START/CENTER/END.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alignment {
    /// Top / left.
    Start,
    /// Middle / center.
    Center,
    /// Bottom / right.
    End,
}

impl Alignment {
    /// Offset of an item of `size` inside `available` space.
    ///
    /// Negative when the item is larger than the space.
    pub fn offset(&self, size: u32, available: u32) -> i64 {
        let free = i64::from(available) - i64::from(size);
        match self {
            Alignment::Start => 0,
            Alignment::Center => free.div_euclid(2),
            Alignment::End => free,
        }
    }
}

impl ParamEnum for Alignment {
    const VARIANTS: &'static [(&'static str, &'static str, Self)] = &[
        ("START", "start", Alignment::Start),
        ("CENTER", "center", Alignment::Center),
        ("END", "end", Alignment::End),
        ("TOP", "start", Alignment::Start),
        ("MIDDLE", "center", Alignment::Center),
        ("BOTTOM", "end", Alignment::End),
        ("LEFT", "start", Alignment::Start),
        ("RIGHT", "end", Alignment::End),
    ];
}

/// Easing curve applied to gradient progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Easing {
    /// `t`
    Linear,
    /// `t²`
    EaseIn,
    /// `1 - (1 - t)²`
    EaseOut,
    /// Quadratic in, quadratic out.
    EaseInOut,
}

impl Easing {
    /// Apply the curve to a normalized progress value.
    pub fn apply(&self, t: f32) -> f32 {
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
            Easing::EaseInOut => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
        }
    }
}

impl ParamEnum for Easing {
    const VARIANTS: &'static [(&'static str, &'static str, Self)] = &[
        ("LINEAR", "linear", Easing::Linear),
        ("EASE_IN", "ease_in", Easing::EaseIn),
        ("EASE_OUT", "ease_out", Easing::EaseOut),
        ("EASE_IN_OUT", "ease_in_out", Easing::EaseInOut),
    ];
}
