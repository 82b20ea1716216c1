//! Frame-set package parsing: `meta.json` + `manifest.json` into a loaded frame list.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::{Category, Direction, Energy, Frame, FrameId, FrameType, Role};

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("missing meta.json")]
    MissingMeta,
    #[error("missing manifest.json")]
    MissingManifest,
    #[error("malformed meta.json: {0}")]
    InvalidMeta(String),
    #[error("malformed manifest.json: {0}")]
    InvalidManifest(String),
    #[error("atlas size {actual_w}x{actual_h} does not match declared {declared_w}x{declared_h}")]
    AtlasSizeMismatch { declared_w: u32, declared_h: u32, actual_w: u32, actual_h: u32 },
    #[error("frame rect out of bounds: {pose} at ({x},{y},{w},{h}) exceeds atlas {atlas_w}x{atlas_h}")]
    FrameRectOutOfBounds {
        pose: String,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        atlas_w: u32,
        atlas_h: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMeta {
    pub version: String,
    pub name: String,
    pub category: String,
    pub created: String,
    pub generator: String,
    #[serde(rename = "frameCount")]
    pub frame_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFrame {
    pub pose: String,
    pub energy: String,
    #[serde(rename = "type")]
    pub frame_type: String,
    pub direction: String,
    pub role: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

fn default_cell_size() -> u32 {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "atlasWidth")]
    pub atlas_width: u32,
    #[serde(rename = "atlasHeight")]
    pub atlas_height: u32,
    #[serde(rename = "cellSize", default = "default_cell_size")]
    pub cell_size: u32,
    pub frames: Vec<ManifestFrame>,
}

/// A validated, loaded frame-set package: parsed frames plus the atlas dimensions addressing
/// them.
pub struct LoadedPackage {
    pub meta: PackageMeta,
    pub atlas_width: u32,
    pub atlas_height: u32,
    pub cell_size: u32,
    pub frames: Vec<Frame>,
}

pub fn category_from_str(s: &str) -> Category {
    match s.to_ascii_uppercase().as_str() {
        "TEXT" => Category::Text,
        "SYMBOL" => Category::Symbol,
        _ => Category::Character,
    }
}

fn direction_from_str(s: &str) -> Direction {
    match s.to_ascii_lowercase().as_str() {
        "left" => Direction::Left,
        "right" => Direction::Right,
        _ => Direction::Center,
    }
}

fn energy_from_str(s: &str) -> Energy {
    match s.to_ascii_lowercase().as_str() {
        "high" => Energy::High,
        "mid" | "medium" => Energy::Mid,
        _ => Energy::Low,
    }
}

/// Parses `meta.json` and `manifest.json` text into a validated [`LoadedPackage`]. Mirrors
/// `TrackLoader::load`'s open → probe → decode → typed-error shape, applied to JSON manifests
/// instead of an audio container. `atlas_dims`, when known (the actual decoded `atlas.webp`
/// size), is cross-checked against the manifest's declared size.
pub fn load_package(
    meta_json: &str,
    manifest_json: &str,
    atlas_dims: Option<(u32, u32)>,
) -> Result<LoadedPackage, PackageError> {
    if meta_json.trim().is_empty() {
        return Err(PackageError::MissingMeta);
    }
    if manifest_json.trim().is_empty() {
        return Err(PackageError::MissingManifest);
    }

    let meta: PackageMeta =
        serde_json::from_str(meta_json).map_err(|e| PackageError::InvalidMeta(e.to_string()))?;
    let manifest: Manifest = serde_json::from_str(manifest_json)
        .map_err(|e| PackageError::InvalidManifest(e.to_string()))?;

    if let Some((actual_w, actual_h)) = atlas_dims {
        if actual_w != manifest.atlas_width || actual_h != manifest.atlas_height {
            return Err(PackageError::AtlasSizeMismatch {
                declared_w: manifest.atlas_width,
                declared_h: manifest.atlas_height,
                actual_w,
                actual_h,
            });
        }
    }

    let mut frames = Vec::with_capacity(manifest.frames.len());
    for (i, mf) in manifest.frames.iter().enumerate() {
        if mf.x + mf.w > manifest.atlas_width || mf.y + mf.h > manifest.atlas_height {
            return Err(PackageError::FrameRectOutOfBounds {
                pose: mf.pose.clone(),
                x: mf.x,
                y: mf.y,
                w: mf.w,
                h: mf.h,
                atlas_w: manifest.atlas_width,
                atlas_h: manifest.atlas_height,
            });
        }
        frames.push(Frame {
            id: FrameId(i as u32),
            image_handle: format!("{}#{}", meta.name, i),
            energy: energy_from_str(&mf.energy),
            direction: direction_from_str(&mf.direction),
            frame_type: FrameType::from_tag(&mf.frame_type),
            role: Role::from_tag(&mf.role),
            pose: mf.pose.clone(),
            derived_from: None,
            weight: 1.0,
            preferred_transitions: Vec::new(),
            best_phases: Vec::new(),
        });
    }

    Ok(LoadedPackage {
        atlas_width: manifest.atlas_width,
        atlas_height: manifest.atlas_height,
        cell_size: manifest.cell_size,
        meta,
        frames,
    })
}

/// Column-major atlas cell rectangle for a frame index, per the manifest's declared cell size.
pub fn cell_rect(index: usize, atlas_width: u32, cell_size: u32) -> (u32, u32, u32, u32) {
    let cols = (atlas_width / cell_size.max(1)).max(1);
    let col = index as u32 % cols;
    let row = index as u32 / cols;
    (col * cell_size, row * cell_size, cell_size, cell_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    const META: &str = r#"{
        "version": "1.0",
        "name": "dancer",
        "category": "CHARACTER",
        "created": "2026-01-01T00:00:00Z",
        "generator": "choreo-test",
        "frameCount": 2
    }"#;

    const MANIFEST: &str = r#"{
        "atlasWidth": 512,
        "atlasHeight": 256,
        "cellSize": 256,
        "frames": [
            {"pose": "a", "energy": "low", "type": "body", "direction": "left", "role": "base", "x": 0, "y": 0, "w": 256, "h": 256},
            {"pose": "b", "energy": "high", "type": "body", "direction": "right", "role": "base", "x": 256, "y": 0, "w": 256, "h": 256}
        ]
    }"#;

    #[test]
    fn missing_meta_is_rejected() {
        let result = load_package("", MANIFEST, None);
        assert!(matches!(result, Err(PackageError::MissingMeta)));
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let result = load_package(META, "", None);
        assert!(matches!(result, Err(PackageError::MissingManifest)));
    }

    #[test]
    fn malformed_manifest_json_is_rejected() {
        let result = load_package(META, "not json", None);
        assert!(matches!(result, Err(PackageError::InvalidManifest(_))));
    }

    #[test]
    fn atlas_size_mismatch_is_rejected() {
        let result = load_package(META, MANIFEST, Some((999, 999)));
        assert!(matches!(result, Err(PackageError::AtlasSizeMismatch { .. })));
    }

    #[test]
    fn frame_rect_out_of_bounds_is_rejected() {
        let manifest = r#"{
            "atlasWidth": 512,
            "atlasHeight": 256,
            "cellSize": 256,
            "frames": [
                {"pose": "a", "energy": "low", "type": "body", "direction": "left", "role": "base", "x": 0, "y": 0, "w": 9000, "h": 256}
            ]
        }"#;
        let result = load_package(META, manifest, None);
        assert!(matches!(result, Err(PackageError::FrameRectOutOfBounds { .. })));
    }

    #[test]
    fn well_formed_package_loads_all_frames() {
        let loaded = load_package(META, MANIFEST, Some((512, 256))).expect("loads");
        assert_eq!(loaded.frames.len(), 2);
        assert_eq!(loaded.frames[0].direction, Direction::Left);
        assert_eq!(loaded.frames[1].energy, Energy::High);
    }

    #[test]
    fn cell_rect_is_column_major() {
        assert_eq!(cell_rect(0, 512, 256), (0, 0, 256, 256));
        assert_eq!(cell_rect(1, 512, 256), (256, 0, 256, 256));
        assert_eq!(cell_rect(2, 512, 256), (0, 256, 256, 256));
    }
}
