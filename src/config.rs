//! Output configuration, as stored in the channel-output JSON.
//!
//! The JSON is loose: numbers sometimes arrive as strings, flags as `0`/`1`,
//! and most fields may be missing. Everything is deserialized permissively
//! and then turned into typed values here, applying the same defaults the
//! deployed configurations rely on.

use crate::error::{ConfigError, OutputError};
use crate::submatrix::SubMatrix;
use crate::topology::{ColorOrder, LayoutVersion, Orientation, PanelDescriptor, PanelTopology};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;

pub const DEFAULT_PANEL_WIDTH: u32 = 32;
pub const DEFAULT_PANEL_HEIGHT: u32 = 16;
pub const DEFAULT_INTERFACE: &str = "eth1";
pub const DEFAULT_DESCRIPTION: &str = "LED Panels";

/// Top-level output configuration.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    /// 0-based first channel of the canvas in the channel buffer.
    pub start_channel: usize,
    pub panel_width: Option<i64>,
    pub panel_height: Option<i64>,
    #[serde(deserialize_with = "flex_bool")]
    pub inverted_data: bool,
    pub color_order: Option<String>,
    pub cfg_version: Option<i64>,
    #[serde(deserialize_with = "flex_number")]
    pub gamma: Option<f64>,
    pub interface: Option<String>,
    pub description: Option<String>,
    pub panels: Vec<PanelConfig>,
    pub sub_matrices: Vec<SubMatrixConfig>,
}

/// One entry of `panels`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PanelConfig {
    pub output_number: i64,
    pub panel_number: i64,
    pub orientation: String,
    pub x_offset: i64,
    pub y_offset: i64,
    pub color_order: Option<String>,
}

/// One entry of `subMatrices`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubMatrixConfig {
    #[serde(deserialize_with = "flex_bool")]
    pub enabled: bool,
    /// 1-based, as shown to users.
    pub start_channel: i64,
    pub width: i64,
    pub height: i64,
    pub x_offset: i64,
    pub y_offset: i64,
}

impl OutputConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Panel size in pixels. Missing values default to 32x16; explicit
    /// zero or negative values are an error.
    pub fn panel_dimensions(&self) -> Result<(u32, u32), ConfigError> {
        let width = dimension("width", self.panel_width, DEFAULT_PANEL_WIDTH)?;
        let height = dimension("height", self.panel_height, DEFAULT_PANEL_HEIGHT)?;
        Ok((width, height))
    }

    pub fn layout(&self) -> LayoutVersion {
        LayoutVersion::from_cfg_version(self.cfg_version)
    }

    /// Colour order used by panels that do not name their own.
    pub fn default_color_order(&self) -> ColorOrder {
        self.color_order
            .as_deref()
            .and_then(ColorOrder::parse)
            .unwrap_or_default()
    }

    /// Gamma exponent; range checking happens in [`crate::gamma::GammaTable`].
    pub fn gamma(&self) -> f32 {
        self.gamma.unwrap_or(1.0) as f32
    }

    pub fn interface(&self) -> &str {
        self.interface
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_INTERFACE)
    }

    pub fn description(&self) -> &str {
        self.description
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION)
    }

    /// Panel entries as typed descriptors, in configuration order.
    pub fn panel_descriptors(&self) -> Vec<PanelDescriptor> {
        let fallback = self.default_color_order();

        self.panels
            .iter()
            .map(|p| PanelDescriptor {
                output: clamp_index(p.output_number),
                chain: clamp_index(p.panel_number),
                orientation: p
                    .orientation
                    .chars()
                    .next()
                    .map(Orientation::from_code)
                    .unwrap_or_default(),
                x_offset: clamp_u32(p.x_offset),
                y_offset: clamp_u32(p.y_offset),
                color_order: p
                    .color_order
                    .as_deref()
                    .and_then(ColorOrder::parse)
                    .unwrap_or(fallback),
            })
            .collect()
    }

    pub fn sub_matrices(&self) -> Vec<SubMatrix> {
        self.sub_matrices
            .iter()
            .map(|sm| SubMatrix {
                enabled: sm.enabled,
                start_channel: clamp_index(sm.start_channel.saturating_sub(1)),
                width: clamp_u32(sm.width),
                height: clamp_u32(sm.height),
                x_offset: clamp_u32(sm.x_offset),
                y_offset: clamp_u32(sm.y_offset),
            })
            .collect()
    }

    /// Build the panel topology described by this configuration.
    pub fn build_topology(&self) -> Result<PanelTopology, OutputError> {
        let (width, height) = self.panel_dimensions()?;
        let mut topology = PanelTopology::new(width, height, self.inverted_data, self.layout())?;
        for desc in self.panel_descriptors() {
            topology.add_panel(desc)?;
        }
        Ok(topology)
    }
}

fn dimension(axis: &'static str, value: Option<i64>, default: u32) -> Result<u32, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) if v <= 0 || v > u32::MAX as i64 => {
            Err(ConfigError::InvalidPanelDimension { axis, value: v })
        }
        Some(v) => Ok(v as u32),
    }
}

fn clamp_index(value: i64) -> usize {
    value.max(0) as usize
}

fn clamp_u32(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accept `true`, `1`, `"1"` and friends.
fn flex_bool<'de, D: Deserializer<'de>>(de: D) -> Result<bool, D::Error> {
    Ok(match Option::<Loose>::deserialize(de)? {
        None => false,
        Some(Loose::Bool(b)) => b,
        Some(Loose::Int(i)) => i != 0,
        Some(Loose::Float(f)) => f != 0.0,
        Some(Loose::Text(s)) => matches!(s.trim(), "1" | "true" | "yes"),
    })
}

/// Accept a number or a numeric string; anything else counts as missing.
fn flex_number<'de, D: Deserializer<'de>>(de: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Loose>::deserialize(de)? {
        Some(Loose::Int(i)) => Some(i as f64),
        Some(Loose::Float(f)) => Some(f),
        Some(Loose::Text(s)) => match s.trim().parse() {
            Ok(f) => Some(f),
            Err(_) => {
                tracing::warn!("ignoring non-numeric value {:?}", s);
                None
            }
        },
        _ => None,
    })
}
