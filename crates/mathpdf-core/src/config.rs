//! Enhancement configuration shared by every job in a batch.
//!
//! The same type is persisted as the JSON settings file and shipped to
//! execution units inside `WorkerCommand::Process`, so it derives both the
//! serde and rkyv traits.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Default keywords used to spot theorem-like blocks.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "Theorem",
    "Lemma",
    "Corollary",
    "Proposition",
    "Definition",
    "Remark",
    "Example",
    "Note",
];

/// Largest margin or padding accepted, in points (20 inches).
const MAX_POINTS: u32 = 1440;

/// Largest tablet edge accepted, in pixels.
const MAX_TABLET_EDGE: u32 = 16384;

/// How the page is re-laid out.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Add a fixed note-taking margin to every page.
    Fixed,
    /// Fit pages to a tablet screen aspect ratio.
    #[default]
    Tablet,
}

/// Which side of the page receives the extra space.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MarginSide {
    #[default]
    Right,
    Left,
    /// Outer margins: right on odd pages, left on even pages.
    Alternating,
}

impl MarginSide {
    pub fn description(&self) -> &'static str {
        match self {
            MarginSide::Right => "Standard for digital reading or single-sided print.",
            MarginSide::Left => "Adds space on the left side of every page.",
            MarginSide::Alternating => "Outer margins (Right on odd, Left on even).",
        }
    }
}

/// Target screen geometry for tablet mode.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(default)]
pub struct TabletGeometry {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    /// Vertical breathing room above and below content, in points.
    pub epsilon_pt: u32,
}

impl Default for TabletGeometry {
    fn default() -> Self {
        Self {
            width: 2480,
            height: 1860,
            epsilon_pt: 36,
        }
    }
}

/// Options for highlighting theorem-like blocks.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(default)]
pub struct TheoremDetection {
    pub keywords: Vec<String>,
    /// Background color as `#rrggbb`.
    pub highlight_color: String,
    pub draw_boxes: bool,
}

impl Default for TheoremDetection {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            highlight_color: "#fef3c7".to_string(),
            draw_boxes: true,
        }
    }
}

/// The layout the execution unit should apply, resolved from the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Fixed { margin_pt: u32 },
    Tablet(TabletGeometry),
}

/// Full configuration snapshot for a batch.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(default)]
pub struct EnhanceConfig {
    pub mode: LayoutMode,
    pub side: MarginSide,
    /// Margin added in fixed mode, in points.
    pub margin_pt: u32,
    pub tablet: TabletGeometry,
    pub theorem_detection: TheoremDetection,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            mode: LayoutMode::default(),
            side: MarginSide::default(),
            margin_pt: 180,
            tablet: TabletGeometry::default(),
            theorem_detection: TheoremDetection::default(),
        }
    }
}

impl EnhanceConfig {
    /// Resolve the layout for the selected mode.
    pub fn layout(&self) -> Layout {
        match self.mode {
            LayoutMode::Fixed => Layout::Fixed {
                margin_pt: self.margin_pt,
            },
            LayoutMode::Tablet => Layout::Tablet(self.tablet),
        }
    }

    /// Validate and normalize the configuration.
    ///
    /// Keywords are trimmed and empty entries dropped; the highlight color is
    /// lowercased.
    pub fn validate(mut self) -> Result<Self> {
        if self.margin_pt == 0 || self.margin_pt > MAX_POINTS {
            return Err(Error::InvalidConfig(format!(
                "margin must be between 1 and {} points, got {}",
                MAX_POINTS, self.margin_pt
            )));
        }

        let TabletGeometry {
            width,
            height,
            epsilon_pt,
        } = self.tablet;
        if width == 0 || height == 0 || width > MAX_TABLET_EDGE || height > MAX_TABLET_EDGE {
            return Err(Error::InvalidConfig(format!(
                "tablet size must be between 1 and {} pixels per edge, got {}x{}",
                MAX_TABLET_EDGE, width, height
            )));
        }
        if epsilon_pt > MAX_POINTS {
            return Err(Error::InvalidConfig(format!(
                "tablet padding must be at most {} points, got {}",
                MAX_POINTS, epsilon_pt
            )));
        }

        let detection = &mut self.theorem_detection;
        detection.keywords = detection
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();

        if !is_hex_color(&detection.highlight_color) {
            return Err(Error::InvalidConfig(format!(
                "highlight color must look like #rrggbb, got '{}'",
                detection.highlight_color
            )));
        }
        detection.highlight_color = detection.highlight_color.to_ascii_lowercase();

        Ok(self)
    }

    /// Load a settings file and validate it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()
    }

    /// Load a settings file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Split a comma separated keyword list.
pub fn parse_keywords(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}
