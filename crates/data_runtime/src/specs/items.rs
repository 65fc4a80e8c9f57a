//! Item prototype table. The loot core only needs identity, display name,
//! and rarity; everything else about an item is somebody else's problem.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Item rarity, ordered. A group's loot threshold is the minimum rarity
/// that requires a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemQuality {
    Poor,
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl ItemQuality {
    pub fn as_u8(self) -> u8 {
        match self {
            ItemQuality::Poor => 0,
            ItemQuality::Common => 1,
            ItemQuality::Uncommon => 2,
            ItemQuality::Rare => 3,
            ItemQuality::Epic => 4,
            ItemQuality::Legendary => 5,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ItemQuality::Poor,
            1 => ItemQuality::Common,
            2 => ItemQuality::Uncommon,
            3 => ItemQuality::Rare,
            4 => ItemQuality::Epic,
            _ => ItemQuality::Legendary,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemProto {
    pub id: u32,
    pub name: String,
    pub quality: ItemQuality,
}

/// Keyed prototype lookups. Missing entries are expected (stale loot
/// tables) and are handled by callers as a per-item skip.
#[derive(Debug, Default)]
pub struct ItemDb {
    by_id: HashMap<u32, ItemProto>,
}

impl ItemDb {
    pub fn load_default() -> Result<Self> {
        let path = crate::data_root().join("items.json");
        let txt = std::fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        Self::from_json(&txt)
    }

    pub fn from_json(txt: &str) -> Result<Self> {
        let items: Vec<ItemProto> = serde_json::from_str(txt).context("parse items json")?;
        Ok(Self::from_protos(items))
    }

    pub fn from_protos(items: Vec<ItemProto>) -> Self {
        let mut by_id = HashMap::new();
        for it in items {
            by_id.insert(it.id, it);
        }
        Self { by_id }
    }

    pub fn get(&self, id: u32) -> Option<&ItemProto> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
