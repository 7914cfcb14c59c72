//! Runtime configuration: compositer options and the JSON scene description.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Tuning knobs for a compositing pass.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CompositerOptions {
    /// Pyramid depth; derived from the panorama dimensions when unset.
    pub max_levels: Option<usize>,
    /// Tile edge length in pixels.
    pub tile_size: usize,
    /// Cap on tiles held in memory at once.
    pub max_resident_tiles: usize,
    /// Directory for evicted tiles; a temp directory when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for CompositerOptions {
    fn default() -> Self {
        Self {
            max_levels: None,
            tile_size: 256,
            max_resident_tiles: 100,
            scratch_dir: None,
        }
    }
}

impl CompositerOptions {
    pub fn with_max_levels(mut self, levels: usize) -> Self {
        self.max_levels = Some(levels);
        self
    }

    pub fn with_tile_size(mut self, size: usize) -> Self {
        self.tile_size = size;
        self
    }

    pub fn with_max_resident_tiles(mut self, cap: usize) -> Self {
        self.max_resident_tiles = cap;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

/// One warped view: image paths plus its pixel offset into the panorama.
#[derive(Clone, Debug, Deserialize)]
pub struct SceneView {
    pub color: PathBuf,
    pub mask: PathBuf,
    pub weight: PathBuf,
    #[serde(default)]
    pub offset_x: i64,
    #[serde(default)]
    pub offset_y: i64,
}

/// Scene description consumed by the driver.
#[derive(Clone, Debug, Deserialize)]
pub struct SceneConfig {
    pub panorama_width: usize,
    pub panorama_height: usize,
    pub views: Vec<SceneView>,
    #[serde(default)]
    pub options: CompositerOptions,
}

/// Load a scene description from a JSON file.
pub fn load_scene(path: &Path) -> Result<SceneConfig> {
    let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let scene: SceneConfig = serde_json::from_str(&contents).map_err(|e| {
        Error::config(format!("failed to parse scene {}: {e}", path.display()))
    })?;
    Ok(scene)
}
