//! Map table: which maps are dungeons and which support a heroic tier.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
pub struct MapSpec {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub dungeon: bool,
    /// Raid maps resist blanket "reset all" requests.
    #[serde(default)]
    pub raid: bool,
    /// Whether the map has a separate heroic save tier. Maps without it
    /// collapse every difficulty onto the normal tier.
    #[serde(default)]
    pub heroic: bool,
}

#[derive(Debug, Default)]
pub struct MapDb {
    by_id: HashMap<u32, MapSpec>,
}

impl MapDb {
    pub fn load_default() -> Result<Self> {
        let path = crate::data_root().join("maps.json");
        let txt = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&txt)
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        let maps: Vec<MapSpec> = serde_json::from_str(txt).context("parse maps json")?;
        Ok(Self::from_specs(maps))
    }

    pub fn from_specs(maps: Vec<MapSpec>) -> Self {
        let mut by_id = HashMap::new();
        for m in maps {
            by_id.insert(m.id, m);
        }
        Self { by_id }
    }

    pub fn get(&self, id: u32) -> Option<&MapSpec> {
        self.by_id.get(&id)
    }

    pub fn supports_heroic(&self, id: u32) -> bool {
        self.get(id).map(|m| m.heroic).unwrap_or(false)
    }
}
