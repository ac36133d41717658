use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::similarity::Threshold;

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LumusConfig {
    pub extraction: ExtractionConfig,
    pub similarity: SimilarityConfig,
    pub ocr: OcrConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Share of the page width and height an embedded image must cover for
    /// the page to be treated as a scan.
    pub dominant_image_ratio: f32,
    /// Number of extracted pages kept in memory; 0 disables the cache.
    pub cache_capacity: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dominant_image_ratio: 0.8,
            cache_capacity: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub threshold: Threshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub command: String,
    pub languages: Vec<String>,
    /// Images are scaled to this height before recognition.
    pub target_height: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: "tesseract".to_owned(),
            languages: vec!["eng".to_owned(), "spa".to_owned(), "por".to_owned()],
            target_height: 1100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub extension: String,
    pub case_insensitive: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            extension: "pdf".to_owned(),
            case_insensitive: true,
        }
    }
}

impl LumusConfig {
    /// Reads `config.toml` from the platform config directory, falling back
    /// to defaults when the file does not exist.
    pub fn load(project_dirs: &ProjectDirs) -> Result<Self> {
        Self::load_from(&project_dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("failed to decode config file {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
