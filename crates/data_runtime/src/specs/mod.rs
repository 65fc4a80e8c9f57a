//! Static spec tables loaded from `data/*.json`.

pub mod items;
pub mod maps;
