//! Reads a frame-set package directory (`meta.json` + `manifest.json`) into a `FramePool`,
//! running the full derive/weight/affinity pipeline so it's ready for selection immediately.

use std::path::Path;

use choreo_frames::{category_from_str, load_package, FramePool};

pub fn load_pool(dir: &Path) -> anyhow::Result<FramePool> {
    let meta_json = std::fs::read_to_string(dir.join("meta.json"))?;
    let manifest_json = std::fs::read_to_string(dir.join("manifest.json"))?;
    let loaded = load_package(&meta_json, &manifest_json, None)?;

    let mut pool = FramePool::new(category_from_str(&loaded.meta.category));
    pool.load(loaded.frames);
    pool.derive();
    pool.compute_weights();
    pool.compute_affinities();
    pool.compute_phase_affinities();
    Ok(pool)
}
