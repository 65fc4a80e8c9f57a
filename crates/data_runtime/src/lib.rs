//! Data access for the group server: TOML configs with env overrides,
//! JSON spec tables (maps, item prototypes), and the serde records the
//! persistence store consumes.

use std::path::PathBuf;

pub mod configs;
pub mod records;
pub mod specs;
pub mod store;

/// Resolve the workspace `data/` root so tests and tools can run from any crate.
pub(crate) fn data_root() -> PathBuf {
    let here = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
    let ws = here.join("../../data");
    if ws.is_dir() {
        ws
    } else {
        here.join("data")
    }
}
