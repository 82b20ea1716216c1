//! Frame data model, pool indexer, and frame-set package I/O for the choreography engine.

mod frame;
mod package;
mod pool;

pub use frame::{Category, DerivedOp, Direction, Energy, Frame, FrameId, FrameType, Phase, Role};
pub use package::{
    cell_rect, category_from_str, load_package, LoadedPackage, Manifest, ManifestFrame,
    PackageError, PackageMeta,
};
pub use pool::FramePool;
