//! Legend and visualization parameters for the two map layers.
//!
//! The categorical layer is described by a [`LandCoverLegend`] mapping each
//! class code to a label and a display color. The continuous preview layer is
//! described by [`VisParams`] (`min`, `max`, palette), the contract shared with
//! the map-layer renderer.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{CommonError, CommonResult};

/// Color representation supporting multiple formats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Color {
    /// Hex string: "#RRGGBB", "RRGGBB" or "#RRGGBBAA"
    Hex(String),

    /// RGB array: [r, g, b] or [r, g, b, a]
    Array(Vec<u8>),

    /// Explicit RGBA
    Rgba { r: u8, g: u8, b: u8, a: u8 },
}

impl Color {
    /// Parse and validate a hex color string.
    pub fn hex(s: &str) -> CommonResult<Self> {
        parse_hex_color(s)?;
        Ok(Color::Hex(s.to_string()))
    }

    /// Convert to RGBA tuple. Malformed hex strings render as opaque black.
    pub fn to_rgba(&self) -> (u8, u8, u8, u8) {
        match self {
            Color::Hex(s) => parse_hex_color(s).unwrap_or((0, 0, 0, 255)),
            Color::Array(arr) => {
                let r = arr.first().copied().unwrap_or(0);
                let g = arr.get(1).copied().unwrap_or(0);
                let b = arr.get(2).copied().unwrap_or(0);
                let a = arr.get(3).copied().unwrap_or(255);
                (r, g, b, a)
            }
            Color::Rgba { r, g, b, a } => (*r, *g, *b, *a),
        }
    }

    /// Normalized "#rrggbb" form (alpha dropped).
    pub fn to_hex(&self) -> String {
        let (r, g, b, _) = self.to_rgba();
        format!("#{:02x}{:02x}{:02x}", r, g, b)
    }
}

fn parse_hex_color(s: &str) -> CommonResult<(u8, u8, u8, u8)> {
    let hex = s.trim_start_matches('#');
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16).map_err(|_| CommonError::InvalidColor(s.to_string()))
    };

    match hex.len() {
        6 => Ok((channel(0..2)?, channel(2..4)?, channel(4..6)?, 255)),
        8 => Ok((
            channel(0..2)?,
            channel(2..4)?,
            channel(4..6)?,
            channel(6..8)?,
        )),
        _ => Err(CommonError::InvalidColor(s.to_string())),
    }
}

/// One class of a categorical raster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendEntry {
    /// Pixel code of the class.
    pub value: u8,
    /// Human-readable class name.
    pub label: String,
    /// Display color.
    pub color: Color,
}

/// Code → label → color mapping for a categorical raster.
///
/// Code 0 is reserved for "no data" and cannot appear as a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandCoverLegend {
    /// Legend title.
    pub title: String,
    /// Classes in display order.
    pub entries: Vec<LegendEntry>,
}

impl LandCoverLegend {
    /// Build a legend from parallel arrays, as stored in raster attributes.
    pub fn from_parallel(
        title: impl Into<String>,
        values: &[u8],
        names: &[String],
        palette: &[String],
    ) -> CommonResult<Self> {
        if values.len() != names.len() || values.len() != palette.len() {
            return Err(CommonError::InvalidLegend(format!(
                "{} values, {} names, {} colors",
                values.len(),
                names.len(),
                palette.len()
            )));
        }

        let entries = values
            .iter()
            .zip(names)
            .zip(palette)
            .map(|((value, name), color)| {
                let color = if color.starts_with('#') {
                    Color::hex(color)?
                } else {
                    Color::hex(&format!("#{}", color))?
                };
                Ok(LegendEntry {
                    value: *value,
                    label: name.clone(),
                    color,
                })
            })
            .collect::<CommonResult<Vec<_>>>()?;

        let legend = Self {
            title: title.into(),
            entries,
        };
        legend.validate()?;
        Ok(legend)
    }

    /// ESA WorldCover v200 classes.
    pub fn worldcover_v200() -> Self {
        let classes: [(u8, &str, &str); 11] = [
            (10, "Tree cover", "#006400"),
            (20, "Shrubland", "#ffbb22"),
            (30, "Grassland", "#ffff4c"),
            (40, "Cropland", "#f096ff"),
            (50, "Built-up", "#fa0000"),
            (60, "Bare / sparse vegetation", "#b4b4b4"),
            (70, "Snow and ice", "#f0f0f0"),
            (80, "Permanent water bodies", "#0064c8"),
            (90, "Herbaceous wetland", "#0096a0"),
            (95, "Mangroves", "#00cf75"),
            (100, "Moss and lichen", "#fae6a0"),
        ];

        Self {
            title: "Land cover classes".to_string(),
            entries: classes
                .iter()
                .map(|(value, label, color)| LegendEntry {
                    value: *value,
                    label: label.to_string(),
                    color: Color::Hex(color.to_string()),
                })
                .collect(),
        }
    }

    /// Check codes are unique and non-zero.
    pub fn validate(&self) -> CommonResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            if entry.value == 0 {
                return Err(CommonError::InvalidLegend(
                    "code 0 is reserved for no data".to_string(),
                ));
            }
            if !seen.insert(entry.value) {
                return Err(CommonError::InvalidLegend(format!(
                    "duplicate class code {}",
                    entry.value
                )));
            }
        }
        Ok(())
    }

    /// All class codes in legend order.
    pub fn codes(&self) -> Vec<u8> {
        self.entries.iter().map(|e| e.value).collect()
    }

    pub fn contains(&self, code: u8) -> bool {
        self.entries.iter().any(|e| e.value == code)
    }

    pub fn entry(&self, code: u8) -> Option<&LegendEntry> {
        self.entries.iter().find(|e| e.value == code)
    }

    /// Label for a code, falling back to "Class <code>".
    pub fn label(&self, code: u8) -> String {
        self.entry(code)
            .map(|e| e.label.clone())
            .unwrap_or_else(|| format!("Class {}", code))
    }
}

/// Visualization parameters for the continuous preview layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<Color>,
    /// Legend title, e.g. "Temperature (K)".
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for VisParams {
    fn default() -> Self {
        let palette = [
            "#000080", "#0000d9", "#4000ff", "#8000ff", "#0080ff", "#00ffff", "#00ff80",
            "#80ff00", "#daff00", "#ffff00", "#fff500", "#ffda00", "#ffb000", "#ffa400",
            "#ff4f00", "#ff2500", "#ff0a00", "#ff00ff",
        ];
        Self {
            min: 240.0,
            max: 320.0,
            palette: palette.iter().map(|c| Color::Hex(c.to_string())).collect(),
            title: Some("Temperature (K)".to_string()),
        }
    }
}

impl VisParams {
    /// Midpoint label value for a three-label color bar.
    pub fn mid(&self) -> f64 {
        (self.max - self.min) / 2.0 + self.min
    }

    pub fn validate(&self) -> CommonResult<()> {
        if !(self.min < self.max) {
            return Err(CommonError::OutOfRange(format!(
                "visualization min {} must be below max {}",
                self.min, self.max
            )));
        }
        if self.palette.is_empty() {
            return Err(CommonError::InvalidColor("empty palette".to_string()));
        }
        for color in &self.palette {
            if let Color::Hex(s) = color {
                parse_hex_color(s)?;
            }
        }
        Ok(())
    }
}
